// Box-defined and polygon-defined units plus the per-classifier id counter.

use super::{color_for_local_id, Color, Spike};
use crate::geometry::{Point, Polygon, WaveBox};
use crate::stats::RunningStats;

/// Monotonic global-id counter owned by one classifier; ids stay unique for
/// the electrode's lifetime.
#[derive(Debug, Clone)]
pub struct UnitIdGenerator {
    next: u32,
}

impl UnitIdGenerator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn next_id(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Make sure future ids stay above everything already in use,
    /// e.g. after restoring persisted units.
    pub fn reserve_through(&mut self, id: u32) {
        if id >= self.next {
            self.next = id + 1;
        }
    }
}

impl Default for UnitIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// Default geometry for a freshly added box, in sample-time / uV units.
pub const DEFAULT_BOX: WaveBox = WaveBox {
    channel: 0,
    x: 4.0,
    y: -30.0,
    w: 12.0,
    h: 90.0,
};

/// Offset applied when cloning a unit's last box.
const BOX_CLONE_OFFSET: f64 = 10.0;

/// A unit defined by one or more boxes, possibly on different channels.
/// A spike matches only if its waveform satisfies every box.
#[derive(Debug, Clone)]
pub struct BoxUnit {
    pub global_id: u32,
    pub local_id: u32,
    pub color: Color,
    pub boxes: Vec<WaveBox>,
    pub stats: RunningStats,
    /// Timestamp of the most recent accepted spike, for external highlighting.
    pub activated_at: Option<u64>,
}

impl BoxUnit {
    pub fn new(global_id: u32, local_id: u32, channel: usize, waveform_len: usize, sample_rate: f64) -> Self {
        let mut first_box = DEFAULT_BOX;
        first_box.channel = channel;
        Self {
            global_id,
            local_id,
            color: color_for_local_id(local_id),
            boxes: vec![first_box],
            stats: RunningStats::new(waveform_len, sample_rate),
            activated_at: None,
        }
    }

    /// AND semantics across all boxes; a unit with zero boxes matches nothing.
    pub fn is_waveform_inside_all_boxes(&self, spike: &Spike) -> bool {
        if self.boxes.is_empty() {
            return false;
        }
        self.boxes.iter().all(|b| waveform_crosses_box(spike, b))
    }

    /// Clone the last box with a fixed positional offset and append it.
    pub fn add_box(&mut self) {
        let mut new_box = self.boxes.last().cloned().unwrap_or(DEFAULT_BOX);
        new_box.x += BOX_CLONE_OFFSET;
        new_box.y += BOX_CLONE_OFFSET;
        self.boxes.push(new_box);
    }

    /// Remove one box; returns false for an out-of-range index. The caller
    /// removes the whole unit when the last box goes.
    pub fn remove_box(&mut self, index: usize) -> bool {
        if index >= self.boxes.len() {
            return false;
        }
        self.boxes.remove(index);
        true
    }
}

/// True if any segment between consecutive samples of the box's channel
/// intersects one of the box edges.
pub fn waveform_crosses_box(spike: &Spike, b: &WaveBox) -> bool {
    if b.channel >= spike.channels {
        return false;
    }
    let samples = spike.channel_samples(b.channel);
    samples.windows(2).enumerate().any(|(i, pair)| {
        b.segment_crosses(
            Point::new(i as f64, pair[0]),
            Point::new((i + 1) as f64, pair[1]),
        )
    })
}

/// A unit defined by one polygon in PC1/PC2 space.
#[derive(Debug, Clone)]
pub struct PcaUnit {
    pub global_id: u32,
    pub local_id: u32,
    pub color: Color,
    pub polygon: Polygon,
    pub stats: RunningStats,
    pub activated_at: Option<u64>,
}

impl PcaUnit {
    pub fn new(global_id: u32, local_id: u32, polygon: Polygon, waveform_len: usize, sample_rate: f64) -> Self {
        Self {
            global_id,
            local_id,
            color: color_for_local_id(local_id),
            polygon,
            stats: RunningStats::new(waveform_len, sample_rate),
            activated_at: None,
        }
    }

    pub fn contains_projection(&self, projection: [f64; 2]) -> bool {
        self.polygon.contains(Point::new(projection[0], projection[1]))
    }
}
