// Console demo: run the sorter over a simulated recording or replay a CSV
// file with one column per acquisition channel.

use colored::Colorize;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spike_sorter::sorting::{SorterConfig, Spike, SpikeSorter};

const BLOCK_LEN: usize = 512;
const SAMPLE_RATE: f64 = 30_000.0;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let result = match args.get(1).map(String::as_str) {
        Some("simulate") => run_simulation(),
        Some("file") => match args.get(2) {
            Some(path) => run_file(path),
            None => Err("Usage: main file <recording.csv>".to_string()),
        },
        _ => Err("Please specify 'simulate' or 'file <recording.csv>' as argument".to_string()),
    };
    if let Err(e) = result {
        eprintln!("{}", e.red());
        std::process::exit(1);
    }
}

fn build_sorter() -> (SpikeSorter, u32) {
    let mut sorter = SpikeSorter::new(SorterConfig {
        sample_rate: SAMPLE_RATE,
        ..SorterConfig::default()
    });
    let id = sorter.add_electrode(vec![0], 8, 16);
    sorter.electrode_mut(id).unwrap().set_threshold(0, -40.0);
    sorter.electrode(id).unwrap().classifier.add_box_unit(0);
    (sorter, id)
}

fn run_simulation() -> Result<(), String> {
    let (mut sorter, id) = build_sorter();
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);

    println!("{}", "Simulated recording, 30 s at 30 kHz".bold());
    let blocks = (30.0 * SAMPLE_RATE / BLOCK_LEN as f64) as usize;
    let mut total = 0usize;
    let mut sorted = 0usize;
    for _ in 0..blocks {
        let block = simulated_block(&mut rng);
        for spike in sorter.process_block(&[block]) {
            total += 1;
            if spike.is_sorted() {
                sorted += 1;
            }
            print_spike(&spike);
        }
    }

    println!(
        "{} spikes, {} sorted, PCA basis {}",
        total,
        sorted,
        if sorter.electrode(id).unwrap().pca_ready() {
            "ready".green()
        } else {
            "pending".yellow()
        }
    );
    Ok(())
}

// Background noise plus a ~20 Hz train of negative pulses of varying depth.
fn simulated_block(rng: &mut StdRng) -> Vec<f64> {
    let mut block: Vec<f64> = (0..BLOCK_LEN).map(|_| rng.gen_range(-6.0..6.0)).collect();
    let mut t = rng.gen_range(0..BLOCK_LEN * 3);
    while t + 4 < BLOCK_LEN {
        let depth = rng.gen_range(50.0..120.0);
        for (k, frac) in [(0, 0.3), (1, 0.7), (2, 1.0), (3, 0.6), (4, 0.2)] {
            block[t + k] -= depth * frac;
        }
        t += rng.gen_range(BLOCK_LEN / 2..BLOCK_LEN * 3);
    }
    block
}

fn run_file(path: &str) -> Result<(), String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| format!("Failed to open recording: {}", e))?;

    let mut channels: Vec<Vec<f64>> = Vec::new();
    let (mut sorter, id) = build_sorter();
    let mut total = 0usize;

    for record in reader.records() {
        let record = record.map_err(|e| format!("Failed to read recording: {}", e))?;
        if channels.is_empty() {
            channels = vec![Vec::with_capacity(BLOCK_LEN); record.len()];
        }
        for (ch, field) in channels.iter_mut().zip(record.iter()) {
            let v: f64 = field
                .trim()
                .parse()
                .map_err(|e| format!("Bad sample '{}': {}", field, e))?;
            ch.push(v);
        }

        if channels[0].len() == BLOCK_LEN {
            for spike in sorter.process_block(&channels) {
                total += 1;
                print_spike(&spike);
            }
            for ch in &mut channels {
                ch.clear();
            }
        }
    }
    if !channels.is_empty() && !channels[0].is_empty() {
        for spike in sorter.process_block(&channels) {
            total += 1;
            print_spike(&spike);
        }
    }

    println!(
        "{} spikes, PCA basis {}",
        total,
        if sorter.electrode(id).unwrap().pca_ready() {
            "ready".green()
        } else {
            "pending".yellow()
        }
    );
    Ok(())
}

fn print_spike(spike: &Spike) {
    let trough = spike
        .waveform
        .iter()
        .cloned()
        .fold(f64::INFINITY, f64::min);
    let bar_len = (trough.abs() / 5.0).min(40.0) as usize;
    let [r, g, b] = spike.color;
    let label = if spike.is_sorted() {
        format!("unit {:>2}", spike.sorted_id)
    } else {
        "unsorted".to_string()
    };
    println!(
        "{:>10}  {}  {}",
        spike.timestamp,
        label,
        "|".repeat(bar_len).truecolor(r, g, b)
    );
}
