// Electrode model and per-block detection scan. An electrode groups one or
// more acquisition channels, owns its classifier, feature extractor and
// per-channel running statistics, and keeps the cross-block carry region so
// snippets straddling a block boundary come out intact.

use super::classifier::Classifier;
use super::features::FeatureExtractor;
use super::{Spike, UNSORTED_COLOR, UNSORTED_ID};
use crate::pca::scheduler::JobScheduler;
use crate::pca::PcaBasis;
use crate::stats::RunningStats;

/// Detection threshold applied to every channel until changed, in uV.
pub const DEFAULT_THRESHOLD: f64 = -50.0;

#[derive(Debug, Clone)]
pub struct ElectrodeConfig {
    pub id: u32,
    /// Indices into the acquisition block's channel list.
    pub channels: Vec<usize>,
    pub pre_peak_samples: usize,
    pub post_peak_samples: usize,
    pub sample_rate: f64,
}

pub struct Electrode {
    id: u32,
    channels: Vec<usize>,
    thresholds: Vec<f64>,
    active: Vec<bool>,
    gains: Vec<f64>,
    pre_peak: usize,
    post_peak: usize,
    sample_rate: f64,
    pub classifier: Classifier,
    features: FeatureExtractor,
    channel_stats: Vec<RunningStats>,
    // Carry region plus the block being scanned, per local channel, raw units.
    // `window_start` is the absolute sample index of window[ch][0]; the scan
    // position is an index into this window, i.e. a possibly-negative offset
    // relative to the current block's start.
    window: Vec<Vec<f64>>,
    window_start: u64,
    scan_pos: usize,
}

impl Electrode {
    pub fn new(config: ElectrodeConfig) -> Self {
        assert!(!config.channels.is_empty(), "electrode needs at least one channel");
        assert!(config.pre_peak_samples + config.post_peak_samples > 0);
        let m = config.channels.len();
        let snippet = config.pre_peak_samples + config.post_peak_samples;
        Self {
            id: config.id,
            thresholds: vec![DEFAULT_THRESHOLD; m],
            active: vec![true; m],
            gains: vec![1.0; m],
            pre_peak: config.pre_peak_samples,
            post_peak: config.post_peak_samples,
            sample_rate: config.sample_rate,
            classifier: Classifier::new(config.id, m * snippet, config.sample_rate),
            features: FeatureExtractor::new(m, snippet),
            channel_stats: (0..m)
                .map(|_| RunningStats::new(snippet, config.sample_rate))
                .collect(),
            window: vec![Vec::new(); m],
            window_start: 0,
            scan_pos: 0,
            channels: config.channels,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn channels(&self) -> &[usize] {
        &self.channels
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn pre_peak_samples(&self) -> usize {
        self.pre_peak
    }

    pub fn post_peak_samples(&self) -> usize {
        self.post_peak
    }

    pub fn snippet_len(&self) -> usize {
        self.pre_peak + self.post_peak
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn thresholds(&self) -> &[f64] {
        &self.thresholds
    }

    /// Signed threshold: positive triggers on a rising edge, negative on a
    /// falling edge. Zero disables triggering on the channel.
    pub fn set_threshold(&mut self, channel: usize, threshold: f64) {
        self.thresholds[channel] = threshold;
    }

    pub fn set_channel_active(&mut self, channel: usize, active: bool) {
        self.active[channel] = active;
    }

    pub fn is_channel_active(&self, channel: usize) -> bool {
        self.active[channel]
    }

    /// Engineering-unit conversion factor (uV per raw count).
    pub fn set_gain(&mut self, channel: usize, gain: f64) {
        self.gains[channel] = gain;
    }

    pub fn gains(&self) -> &[f64] {
        &self.gains
    }

    pub fn channel_stats(&self, channel: usize) -> &RunningStats {
        &self.channel_stats[channel]
    }

    pub fn request_pca_rerun(&mut self) {
        self.features.request_rerun();
    }

    pub fn pca_basis(&self) -> Option<PcaBasis> {
        self.features.basis().cloned()
    }

    pub fn pca_ready(&self) -> bool {
        self.features.basis_ready()
    }

    pub fn restore_pca_basis(&mut self, basis: PcaBasis) {
        self.features.restore_basis(basis);
    }

    /// Change the snippet geometry. Accumulated statistics, buffered spikes
    /// and any computed basis are no longer index-comparable and are dropped.
    pub fn set_waveform_size(&mut self, pre_peak: usize, post_peak: usize) {
        assert!(pre_peak + post_peak > 0);
        self.pre_peak = pre_peak;
        self.post_peak = post_peak;
        let m = self.channels.len();
        let snippet = self.snippet_len();
        for stats in &mut self.channel_stats {
            stats.resize(snippet);
        }
        self.classifier.resize_waveform(m * snippet);
        self.features.resize(m, snippet);
        for w in &mut self.window {
            w.clear();
        }
        self.scan_pos = 0;
    }

    // Samples of carry to retain: enough history for the pre-peak of a
    // crossing deferred at the scan limit, plus the scan-limit margin itself.
    fn overflow_len(&self) -> usize {
        self.pre_peak + 2 * self.post_peak
    }

    /// Scan one acquisition block for threshold crossings and return the
    /// extracted, projected and classified spikes in detection order.
    /// A block with no candidate is normal and yields an empty vec.
    pub fn process_block(
        &mut self,
        data: &[Vec<f64>],
        block_start: u64,
        pca_first: bool,
        scheduler: &JobScheduler,
    ) -> Vec<Spike> {
        let m = self.channels.len();
        for &src in &self.channels {
            assert!(src < data.len(), "electrode channel maps past the acquisition block");
        }
        let block_len = data[self.channels[0]].len();
        for &src in &self.channels {
            assert_eq!(data[src].len(), block_len, "ragged acquisition block");
        }

        if self.window[0].is_empty() {
            self.window_start = block_start;
            self.scan_pos = 0;
        } else {
            debug_assert_eq!(self.window_start + self.window[0].len() as u64, block_start);
        }
        for (ci, &src) in self.channels.iter().enumerate() {
            self.window[ci].extend_from_slice(&data[src]);
        }

        let total = self.window[0].len();
        let snippet = self.snippet_len();
        // Leave room to refine the peak (post samples) and to extract the
        // post-peak half of the snippet; later crossings wait for more data.
        let limit = total.saturating_sub(2 * self.post_peak);

        let mut spikes = Vec::new();
        let mut i = self.scan_pos;
        'scan: while i < limit {
            for ci in 0..m {
                if !self.active[ci] {
                    continue;
                }
                let thr = self.thresholds[ci];
                let gain = self.gains[ci];
                let v = self.window[ci][i] * gain;
                let crossed = (thr > 0.0 && v > thr) || (thr < 0.0 && v < thr);
                if !crossed {
                    continue;
                }

                // Refine to the local extremum: advance while the signal keeps
                // moving in the triggering direction, at most post_peak samples
                // past the initial crossing. Comparisons use the same scaled
                // values as the crossing test, so a sign-flipping gain keeps
                // crossing and refinement consistent.
                let mut peak = i;
                let bound = i + self.post_peak;
                if thr > 0.0 {
                    while peak < bound
                        && self.window[ci][peak + 1] * gain > self.window[ci][peak] * gain
                    {
                        peak += 1;
                    }
                } else {
                    while peak < bound
                        && self.window[ci][peak + 1] * gain < self.window[ci][peak] * gain
                    {
                        peak += 1;
                    }
                }

                if peak < self.pre_peak {
                    // Not enough history at stream start; skip this crossing
                    i = peak + 1;
                    continue 'scan;
                }

                let start = peak - self.pre_peak;
                let mut waveform = vec![0.0; m * snippet];
                for cj in 0..m {
                    if !self.active[cj] {
                        continue; // stays zero-filled
                    }
                    let gain = self.gains[cj];
                    for k in 0..snippet {
                        waveform[cj * snippet + k] = self.window[cj][start + k] * gain;
                    }
                }

                let timestamp = self.window_start + peak as u64;
                let mut spike = Spike {
                    electrode_id: self.id,
                    timestamp,
                    channels: m,
                    samples_per_channel: snippet,
                    waveform,
                    gains: self.gains.clone(),
                    thresholds: self.thresholds.clone(),
                    projection: [0.0, 0.0],
                    projected: false,
                    sorted_id: UNSORTED_ID,
                    color: UNSORTED_COLOR,
                };

                self.features.process(&mut spike, scheduler);
                self.classifier.sort_spike(&mut spike, pca_first);
                for cj in 0..m {
                    if self.active[cj] {
                        self.channel_stats[cj].update(spike.channel_samples(cj), timestamp);
                    }
                }
                spikes.push(spike);

                // Resume strictly after the extracted window
                i = peak + self.post_peak;
                continue 'scan;
            }
            i += 1;
        }
        self.scan_pos = i;

        // Trim down to the carry region for the next block
        let keep = self.overflow_len();
        if total > keep {
            let drop = total - keep;
            for w in &mut self.window {
                w.drain(..drop);
            }
            self.window_start += drop as u64;
            self.scan_pos = self.scan_pos.saturating_sub(drop);
        }

        spikes
    }
}
