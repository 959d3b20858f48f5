// SPIKE SORTER COMPONENT -----------------------------------------------------
// Owns the electrode list, the sample clock and the shared background job
// scheduler; fans each acquisition block out across electrodes and merges the
// classified spikes back into timestamp order.

use super::electrode::{Electrode, ElectrodeConfig};
use super::Spike;
use crate::pca::scheduler::JobScheduler;
use crate::utils::log::{log_csv, log_to_file};
use rayon::prelude::*;

#[derive(Debug, Clone)]
pub struct SorterConfig {
    pub sample_rate: f64,
    /// Polygon units tested before box units when true.
    pub pca_first: bool,
    pub verbose: bool,
    /// Append every classified spike to logs/spikes.csv.
    pub logging: bool,
}

impl Default for SorterConfig {
    fn default() -> Self {
        Self {
            sample_rate: 30_000.0,
            pca_first: false,
            verbose: false,
            logging: false,
        }
    }
}

pub struct SpikeSorter {
    config: SorterConfig,
    electrodes: Vec<Electrode>,
    scheduler: JobScheduler,
    sample_clock: u64,
    next_electrode_id: u32,
}

impl SpikeSorter {
    pub fn new(config: SorterConfig) -> Self {
        Self {
            config,
            electrodes: Vec::new(),
            scheduler: JobScheduler::new(),
            sample_clock: 0,
            next_electrode_id: 1,
        }
    }

    pub fn config(&self) -> &SorterConfig {
        &self.config
    }

    pub fn set_pca_first(&mut self, pca_first: bool) {
        self.config.pca_first = pca_first;
    }

    /// Create an electrode over the given acquisition channels and return
    /// its id.
    pub fn add_electrode(
        &mut self,
        channels: Vec<usize>,
        pre_peak_samples: usize,
        post_peak_samples: usize,
    ) -> u32 {
        let id = self.next_electrode_id;
        self.next_electrode_id += 1;
        self.electrodes.push(Electrode::new(ElectrodeConfig {
            id,
            channels,
            pre_peak_samples,
            post_peak_samples,
            sample_rate: self.config.sample_rate,
        }));
        id
    }

    /// Insert a pre-built electrode, e.g. from a persisted configuration.
    pub fn insert_electrode(&mut self, electrode: Electrode) {
        self.next_electrode_id = self.next_electrode_id.max(electrode.id() + 1);
        self.electrodes.push(electrode);
    }

    pub fn remove_electrode(&mut self, id: u32) -> bool {
        let before = self.electrodes.len();
        self.electrodes.retain(|e| e.id() != id);
        self.electrodes.len() < before
    }

    pub fn electrode(&self, id: u32) -> Option<&Electrode> {
        self.electrodes.iter().find(|e| e.id() == id)
    }

    pub fn electrode_mut(&mut self, id: u32) -> Option<&mut Electrode> {
        self.electrodes.iter_mut().find(|e| e.id() == id)
    }

    pub fn electrodes(&self) -> &[Electrode] {
        &self.electrodes
    }

    pub fn scheduler(&self) -> &JobScheduler {
        &self.scheduler
    }

    pub fn sample_clock(&self) -> u64 {
        self.sample_clock
    }

    /// Detect, project and classify everything in one acquisition block.
    /// `data` holds one vec per acquisition channel, all the same length.
    pub fn process_block(&mut self, data: &[Vec<f64>]) -> Vec<Spike> {
        let block_len = data.first().map(|c| c.len()).unwrap_or(0);
        debug_assert!(data.iter().all(|c| c.len() == block_len), "ragged acquisition block");

        let block_start = self.sample_clock;
        let pca_first = self.config.pca_first;
        let scheduler = &self.scheduler;

        let mut spikes: Vec<Spike> = self
            .electrodes
            .par_iter_mut()
            .map(|e| e.process_block(data, block_start, pca_first, scheduler))
            .flatten()
            .collect();
        // Stable sort: per-electrode detection order is preserved
        spikes.sort_by_key(|s| s.timestamp);

        self.sample_clock += block_len as u64;

        if self.config.logging {
            if !spikes.is_empty() {
                log_to_file(
                    "sorter.log",
                    &format!("block at {}: {} spikes", block_start, spikes.len()),
                )
                .expect("Failed to write sorter log");
            }
            for spike in &spikes {
                log_spike(spike);
            }
        }
        if self.config.verbose {
            for spike in &spikes {
                println!(
                    "electrode {} spike at {} -> unit {}",
                    spike.electrode_id, spike.timestamp, spike.sorted_id
                );
            }
        }

        spikes
    }
}

fn log_spike(spike: &Spike) {
    log_csv(
        "spikes.csv",
        &["timestamp", "electrode", "unit", "pc1", "pc2"],
        &[
            &spike.timestamp.to_string(),
            &spike.electrode_id.to_string(),
            &spike.sorted_id.to_string(),
            &format!("{:.4}", spike.projection[0]),
            &format!("{:.4}", spike.projection[1]),
        ],
    )
    .expect("Failed to write spike log");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::WaveBox;
    use crate::sorting::features::SPIKE_BUFFER_CAPACITY;
    use crate::sorting::UNSORTED_ID;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::thread;
    use std::time::{Duration, Instant};

    fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        done()
    }

    // One negative-going pulse per 100-sample block, peak near index 30
    fn pulse_block(rng: &mut StdRng) -> Vec<f64> {
        let mut block: Vec<f64> = (0..100).map(|_| rng.gen_range(-3.0..3.0)).collect();
        let depth = rng.gen_range(60.0..90.0);
        for (k, frac) in [(28, 0.4), (29, 0.8), (30, 1.0), (31, 0.7), (32, 0.3)] {
            block[k] -= depth * frac;
        }
        block
    }

    #[test]
    fn end_to_end_single_flight_and_projection() {
        let mut sorter = SpikeSorter::new(SorterConfig::default());
        let id = sorter.add_electrode(vec![0], 8, 16);
        sorter.electrode_mut(id).unwrap().set_threshold(0, -20.0);

        let mut rng = StdRng::seed_from_u64(99);
        let mut detected = 0usize;
        while detected < SPIKE_BUFFER_CAPACITY {
            detected += sorter.process_block(&[pulse_block(&mut rng)]).len();
        }

        // The buffer filled: exactly one job was submitted, not two
        assert_eq!(sorter.scheduler().enqueued_total(), 1);
        assert!(wait_until(Duration::from_secs(10), || {
            sorter.electrode(id).unwrap().pca_ready()
        }));

        // With the basis in place, new spikes carry a non-zero projection
        let mut projected = Vec::new();
        while projected.is_empty() {
            projected = sorter.process_block(&[pulse_block(&mut rng)]);
        }
        let spike = &projected[0];
        assert!(spike.projected);
        assert!(spike.projection[0].abs() > 0.0 || spike.projection[1].abs() > 0.0);
        assert_eq!(spike.sorted_id, UNSORTED_ID); // zero units configured
        assert_eq!(sorter.scheduler().enqueued_total(), 1);
    }

    #[test]
    fn classified_spikes_carry_unit_ids_across_blocks() {
        let mut sorter = SpikeSorter::new(SorterConfig::default());
        let id = sorter.add_electrode(vec![0], 8, 16);
        sorter.electrode_mut(id).unwrap().set_threshold(0, -20.0);

        let unit = sorter
            .electrode(id)
            .unwrap()
            .classifier
            .add_box_unit(0);
        // Box covering the trough of the pulse around the pre-peak offset
        sorter.electrode(id).unwrap().classifier.set_box(
            unit,
            0,
            WaveBox::new(0, 2.0, -30.0, 12.0, 90.0),
        );

        let mut rng = StdRng::seed_from_u64(7);
        let mut sorted = 0usize;
        let mut total = 0usize;
        for _ in 0..20 {
            for spike in sorter.process_block(&[pulse_block(&mut rng)]) {
                total += 1;
                if spike.sorted_id == unit {
                    sorted += 1;
                }
            }
        }
        assert!(total >= 15);
        assert_eq!(sorted, total);

        let units = sorter.electrode(id).unwrap().classifier.box_units();
        assert_eq!(units[0].stats.count() as usize, sorted);
        assert!(units[0].stats.isi().total() > 0);
    }

    #[test]
    fn spikes_from_multiple_electrodes_merge_in_time_order() {
        let mut sorter = SpikeSorter::new(SorterConfig::default());
        let a = sorter.add_electrode(vec![0], 4, 8);
        let b = sorter.add_electrode(vec![1], 4, 8);
        sorter.electrode_mut(a).unwrap().set_threshold(0, 50.0);
        sorter.electrode_mut(b).unwrap().set_threshold(0, 50.0);

        let mut ch0 = vec![0.0; 128];
        let mut ch1 = vec![0.0; 128];
        for (k, v) in [(40, 60.0), (41, 100.0), (42, 60.0)] {
            ch1[k] = v;
        }
        for (k, v) in [(80, 60.0), (81, 100.0), (82, 60.0)] {
            ch0[k] = v;
        }

        let spikes = sorter.process_block(&[ch0, ch1]);
        assert_eq!(spikes.len(), 2);
        assert_eq!(spikes[0].electrode_id, b);
        assert_eq!(spikes[1].electrode_id, a);
        assert!(spikes[0].timestamp < spikes[1].timestamp);
        assert_eq!(sorter.sample_clock(), 128);
    }

    #[test]
    fn removing_an_electrode_stops_its_detections() {
        let mut sorter = SpikeSorter::new(SorterConfig::default());
        let id = sorter.add_electrode(vec![0], 4, 8);
        sorter.electrode_mut(id).unwrap().set_threshold(0, 50.0);
        assert!(sorter.remove_electrode(id));
        assert!(!sorter.remove_electrode(id));

        let mut block = vec![0.0; 64];
        block[20] = 100.0;
        assert!(sorter.process_block(&[block]).is_empty());
    }
}
