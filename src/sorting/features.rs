// PCA feature extractor: rolling spike buffer, single-flight job submission
// and projection once a basis has been computed. "No basis yet" and "no job
// submitted" are normal transient states, never errors.

use super::Spike;
use crate::pca::scheduler::JobScheduler;
use crate::pca::{new_basis_slot, AxisBounds, BasisSlot, PcaBasis, PcaJob};
use std::sync::Arc;

/// Rolling buffer capacity: the snapshot a PCA job sees.
pub const SPIKE_BUFFER_CAPACITY: usize = 200;

pub struct FeatureExtractor {
    channels: usize,
    samples_per_channel: usize,
    capacity: usize,
    // Ring of the most recent waveforms, oldest overwritten first
    buffer: Vec<Vec<f64>>,
    next: usize,
    // Submission state: `submitted` is the single-flight guard, the slot's
    // `get()` is the "computed" flag written once by the background worker.
    slot: BasisSlot,
    submitted: bool,
    rerun_pending: bool,
}

impl FeatureExtractor {
    pub fn new(channels: usize, samples_per_channel: usize) -> Self {
        Self::with_capacity(channels, samples_per_channel, SPIKE_BUFFER_CAPACITY)
    }

    pub fn with_capacity(channels: usize, samples_per_channel: usize, capacity: usize) -> Self {
        assert!(capacity >= 2);
        Self {
            channels,
            samples_per_channel,
            capacity,
            buffer: Vec::with_capacity(capacity),
            next: 0,
            slot: new_basis_slot(),
            submitted: false,
            rerun_pending: false,
        }
    }

    /// Buffer the spike, project it if a basis exists, and otherwise submit
    /// one PCA job when the buffer is full. Check-and-set of the guard runs
    /// under the caller's exclusive access, so submission is indivisible.
    pub fn process(&mut self, spike: &mut Spike, scheduler: &JobScheduler) {
        debug_assert_eq!(spike.waveform_len(), self.dim());
        self.push(spike.waveform.clone());

        // A deferred re-run takes effect the moment the in-flight job lands.
        if self.rerun_pending && self.submitted && self.slot.get().is_some() {
            self.reset_basis();
        }

        if let Some(basis) = self.slot.get() {
            spike.projection = basis.project(&spike.waveform);
            spike.projected = true;
        } else if self.buffer.len() == self.capacity && !self.submitted {
            self.submit(scheduler);
        }
    }

    /// Ask for a fresh basis. While a job is in flight this only blocks new
    /// submissions until it completes; afterwards the next full buffer
    /// submits exactly one new job.
    pub fn request_rerun(&mut self) {
        if self.submitted && self.slot.get().is_none() {
            self.rerun_pending = true;
        } else {
            self.reset_basis();
        }
    }

    pub fn basis_ready(&self) -> bool {
        self.slot.get().is_some()
    }

    pub fn job_in_flight(&self) -> bool {
        self.submitted && self.slot.get().is_none()
    }

    pub fn basis(&self) -> Option<&PcaBasis> {
        self.slot.get()
    }

    pub fn bounds(&self) -> Option<AxisBounds> {
        self.slot.get().map(|b| b.bounds)
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn dim(&self) -> usize {
        self.channels * self.samples_per_channel
    }

    /// Install a previously persisted basis, marking it computed.
    pub fn restore_basis(&mut self, basis: PcaBasis) {
        debug_assert_eq!(basis.dim(), self.dim());
        self.reset_basis();
        let _ = self.slot.set(basis);
        self.submitted = true;
    }

    /// Waveform geometry changed: drop buffered spikes and any basis.
    pub fn resize(&mut self, channels: usize, samples_per_channel: usize) {
        self.channels = channels;
        self.samples_per_channel = samples_per_channel;
        self.buffer.clear();
        self.next = 0;
        self.reset_basis();
    }

    fn push(&mut self, waveform: Vec<f64>) {
        if self.buffer.len() < self.capacity {
            self.buffer.push(waveform);
        } else {
            self.buffer[self.next] = waveform;
            self.next = (self.next + 1) % self.capacity;
        }
    }

    // Value copy of the buffer, oldest to newest.
    fn snapshot(&self) -> Vec<Vec<f64>> {
        if self.buffer.len() < self.capacity {
            self.buffer.clone()
        } else {
            let mut out = Vec::with_capacity(self.capacity);
            out.extend_from_slice(&self.buffer[self.next..]);
            out.extend_from_slice(&self.buffer[..self.next]);
            out
        }
    }

    fn submit(&mut self, scheduler: &JobScheduler) {
        let job = PcaJob::new(
            self.snapshot(),
            self.channels,
            self.samples_per_channel,
            Arc::clone(&self.slot),
        );
        scheduler.enqueue(job);
        self.submitted = true;
    }

    fn reset_basis(&mut self) {
        self.slot = new_basis_slot();
        self.submitted = false;
        self.rerun_pending = false;
    }
}
