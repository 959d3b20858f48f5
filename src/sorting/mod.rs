// Spike sorting core: detection, feature extraction and geometric
// classification, grouped per electrode.

pub mod classifier;
pub mod electrode;
pub mod features;
pub mod spike_sorter;
pub mod units;

pub use classifier::Classifier;
pub use electrode::{Electrode, ElectrodeConfig};
pub use features::FeatureExtractor;
pub use spike_sorter::{SorterConfig, SpikeSorter};

/// RGB display color.
pub type Color = [u8; 3];

/// `sorted_id` value meaning "not assigned to any unit".
pub const UNSORTED_ID: u32 = 0;

pub const UNSORTED_COLOR: Color = [127, 127, 127];

/// Default unit palette, keyed by local id (local ids start at 1).
pub const UNIT_COLORS: [Color; 8] = [
    [255, 0, 0],
    [0, 255, 0],
    [0, 128, 255],
    [0, 255, 255],
    [255, 0, 255],
    [255, 255, 0],
    [255, 128, 0],
    [128, 0, 255],
];

pub fn color_for_local_id(local_id: u32) -> Color {
    debug_assert!(local_id >= 1);
    UNIT_COLORS[((local_id - 1) as usize) % UNIT_COLORS.len()]
}

/// One detected action-potential snippet with everything downstream
/// consumers need: raw waveform, projection and classification outcome.
#[derive(Debug, Clone)]
pub struct Spike {
    pub electrode_id: u32,
    /// Absolute sample-clock index of the refined peak.
    pub timestamp: u64,
    pub channels: usize,
    pub samples_per_channel: usize,
    /// Channel-major waveform in engineering units (uV); inactive channels
    /// are zero-filled.
    pub waveform: Vec<f64>,
    /// Per-channel conversion factor and threshold at extraction time.
    pub gains: Vec<f64>,
    pub thresholds: Vec<f64>,
    /// (PC1, PC2) projection; zeros until a basis is available.
    pub projection: [f64; 2],
    pub projected: bool,
    pub sorted_id: u32,
    pub color: Color,
}

impl Spike {
    pub fn waveform_len(&self) -> usize {
        self.channels * self.samples_per_channel
    }

    pub fn channel_samples(&self, channel: usize) -> &[f64] {
        assert!(channel < self.channels);
        let start = channel * self.samples_per_channel;
        &self.waveform[start..start + self.samples_per_channel]
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted_id != UNSORTED_ID
    }
}
