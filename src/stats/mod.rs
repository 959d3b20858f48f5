// Per-unit running statistics over classified waveforms and an
// inter-spike-interval histogram driven by the spike timestamps.

/// Bin count for the ISI histogram: one bin per millisecond, 0-100 ms.
pub const ISI_BINS: usize = 101;

#[derive(Debug, Clone)]
pub struct IsiHistogram {
    bins: [u32; ISI_BINS],
}

impl IsiHistogram {
    pub fn new() -> Self {
        Self { bins: [0; ISI_BINS] }
    }

    /// Record one inter-spike interval; intervals past 100 ms land in the last bin.
    pub fn record_ms(&mut self, interval_ms: f64) {
        if interval_ms < 0.0 {
            return;
        }
        let bin = (interval_ms as usize).min(ISI_BINS - 1);
        self.bins[bin] += 1;
    }

    pub fn bin(&self, index: usize) -> u32 {
        self.bins[index]
    }

    pub fn total(&self) -> u64 {
        self.bins.iter().map(|&b| b as u64).sum()
    }

    pub fn reset(&mut self) {
        self.bins = [0; ISI_BINS];
    }
}

impl Default for IsiHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Welford single-pass mean/variance at every sample index of a waveform,
/// plus the ISI histogram of the unit the stats belong to.
#[derive(Debug, Clone)]
pub struct RunningStats {
    count: u64,
    mean: Vec<f64>,
    m2: Vec<f64>,
    sample_rate: f64,
    last_timestamp: Option<u64>,
    isi: IsiHistogram,
}

impl RunningStats {
    pub fn new(waveform_len: usize, sample_rate: f64) -> Self {
        Self {
            count: 0,
            mean: vec![0.0; waveform_len],
            m2: vec![0.0; waveform_len],
            sample_rate,
            last_timestamp: None,
            isi: IsiHistogram::new(),
        }
    }

    pub fn update(&mut self, waveform: &[f64], timestamp: u64) {
        debug_assert_eq!(waveform.len(), self.mean.len());
        self.count += 1;
        let n = self.count as f64;
        for (i, &v) in waveform.iter().enumerate() {
            let delta = v - self.mean[i];
            self.mean[i] += delta / n;
            self.m2[i] += delta * (v - self.mean[i]);
        }

        if let Some(last) = self.last_timestamp {
            if timestamp >= last && self.sample_rate > 0.0 {
                let interval_ms = (timestamp - last) as f64 * 1000.0 / self.sample_rate;
                self.isi.record_ms(interval_ms);
            }
        }
        self.last_timestamp = Some(timestamp);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Sample variance per index; zeros until at least two spikes accumulated.
    pub fn variance(&self) -> Vec<f64> {
        if self.count < 2 {
            return vec![0.0; self.m2.len()];
        }
        let denom = (self.count - 1) as f64;
        self.m2.iter().map(|&m| m / denom).collect()
    }

    pub fn isi(&self) -> &IsiHistogram {
        &self.isi
    }

    /// A new waveform length makes the accumulated shape non-comparable,
    /// so the sample count goes back to zero.
    pub fn resize(&mut self, waveform_len: usize) {
        self.count = 0;
        self.mean = vec![0.0; waveform_len];
        self.m2 = vec![0.0; waveform_len];
    }
}
