// PCA pipeline: snapshot of recent spikes -> covariance -> symmetric
// eigen-decomposition -> two leading components plus display bounds.
// The expensive part runs on the background worker in scheduler.rs and the
// result is handed back through a write-once slot.

pub mod eigen;
pub mod scheduler;

use eigen::SquareMatrix;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};

/// Display bounds of the projected cloud, one min/max pair per axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AxisBounds {
    pub pc1_min: f64,
    pub pc1_max: f64,
    pub pc2_min: f64,
    pub pc2_max: f64,
}

/// The two projection vectors, each of length channels x samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcaBasis {
    pub channels: usize,
    pub samples_per_channel: usize,
    pub pc1: Vec<f64>,
    pub pc2: Vec<f64>,
    pub bounds: AxisBounds,
}

impl PcaBasis {
    pub fn dim(&self) -> usize {
        self.channels * self.samples_per_channel
    }

    /// Project a full waveform (engineering units, channel-major) onto the basis.
    pub fn project(&self, waveform: &[f64]) -> [f64; 2] {
        debug_assert_eq!(waveform.len(), self.pc1.len());
        let p1 = self.pc1.iter().zip(waveform).map(|(a, b)| a * b).sum();
        let p2 = self.pc2.iter().zip(waveform).map(|(a, b)| a * b).sum();
        [p1, p2]
    }
}

/// Write-once handoff between the background worker and the detection path.
/// The worker stores the finished basis exactly once; `get()` doubles as the
/// "computed" flag and is lock-free for readers afterwards.
pub type BasisSlot = Arc<OnceLock<PcaBasis>>;

pub fn new_basis_slot() -> BasisSlot {
    Arc::new(OnceLock::new())
}

/// Displayed span per axis relative to the observed range of the projections.
const BOUNDS_SPAN_FACTOR: f64 = 1.5;

const EIGEN_MAX_SWEEPS: usize = 64;
const EIGEN_TOLERANCE: f64 = 1e-12;

/// Immutable snapshot of buffered spikes plus the destination slot.
pub struct PcaJob {
    spikes: Vec<Vec<f64>>,
    channels: usize,
    samples_per_channel: usize,
    out: BasisSlot,
}

impl PcaJob {
    pub fn new(
        spikes: Vec<Vec<f64>>,
        channels: usize,
        samples_per_channel: usize,
        out: BasisSlot,
    ) -> Self {
        let dim = channels * samples_per_channel;
        debug_assert!(spikes.iter().all(|s| s.len() == dim));
        Self {
            spikes,
            channels,
            samples_per_channel,
            out,
        }
    }

    /// Runs the full covariance + eigen pipeline and stores the result.
    /// Deterministic for a given snapshot (up to eigenvector sign).
    pub fn run(self) {
        let dim = self.channels * self.samples_per_channel;
        let n = self.spikes.len();
        if dim == 0 || n < 2 {
            return;
        }

        let cov = covariance(&self.spikes, dim);
        let decomposition = cov.eigen_symmetric(EIGEN_MAX_SWEEPS, EIGEN_TOLERANCE);
        let pc1 = decomposition.vector(0);
        let pc2 = decomposition.vector(1);

        let mut pc1_min = f64::MAX;
        let mut pc1_max = f64::MIN;
        let mut pc2_min = f64::MAX;
        let mut pc2_max = f64::MIN;
        for spike in &self.spikes {
            let p1: f64 = pc1.iter().zip(spike).map(|(a, b)| a * b).sum();
            let p2: f64 = pc2.iter().zip(spike).map(|(a, b)| a * b).sum();
            pc1_min = pc1_min.min(p1);
            pc1_max = pc1_max.max(p1);
            pc2_min = pc2_min.min(p2);
            pc2_max = pc2_max.max(p2);
        }

        let (pc1_min, pc1_max) = expand_bounds(pc1_min, pc1_max);
        let (pc2_min, pc2_max) = expand_bounds(pc2_min, pc2_max);

        let basis = PcaBasis {
            channels: self.channels,
            samples_per_channel: self.samples_per_channel,
            pc1,
            pc2,
            bounds: AxisBounds {
                pc1_min,
                pc1_max,
                pc2_min,
                pc2_max,
            },
        };

        // Single writer per slot; a second set can only happen if the same
        // slot were reused for two jobs, which the single-flight guard forbids.
        let _ = self.out.set(basis);
    }
}

/// Sample covariance over all channel x sample dimensions, O(dim^2 * n).
fn covariance(spikes: &[Vec<f64>], dim: usize) -> SquareMatrix {
    let n = spikes.len();
    let mut mean = vec![0.0; dim];
    for spike in spikes {
        for (m, &v) in mean.iter_mut().zip(spike) {
            *m += v;
        }
    }
    for m in &mut mean {
        *m /= n as f64;
    }

    let mut cov = SquareMatrix::zeros(dim);
    let mut centered = vec![0.0; dim];
    for spike in spikes {
        for i in 0..dim {
            centered[i] = spike[i] - mean[i];
        }
        for i in 0..dim {
            let ci = centered[i];
            for j in i..dim {
                let acc = cov.get(i, j) + ci * centered[j];
                cov.set(i, j, acc);
            }
        }
    }
    let denom = (n - 1) as f64;
    for i in 0..dim {
        for j in i..dim {
            let v = cov.get(i, j) / denom;
            cov.set(i, j, v);
            cov.set(j, i, v);
        }
    }
    cov
}

fn expand_bounds(min: f64, max: f64) -> (f64, f64) {
    let range = max - min;
    if range <= 0.0 {
        return (min - 1.0, max + 1.0);
    }
    let pad = (BOUNDS_SPAN_FACTOR - 1.0) * range / 2.0;
    (min - pad, max + pad)
}
