// YAML persistence for sorter configurations: electrode geometry, channel
// settings, unit definitions and any computed PCA basis. Transient state
// (buffered spikes, running statistics, selection) is deliberately excluded.

use crate::geometry::{Polygon, WaveBox};
use crate::pca::PcaBasis;
use crate::sorting::units::{BoxUnit, PcaUnit};
use crate::sorting::{Color, Electrode, ElectrodeConfig, SorterConfig, SpikeSorter};
use crate::stats::RunningStats;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SorterDocument {
    pub sample_rate: f64,
    pub pca_first: bool,
    pub electrodes: Vec<ElectrodeDocument>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ElectrodeDocument {
    pub id: u32,
    pub channels: Vec<usize>,
    pub thresholds: Vec<f64>,
    pub active: Vec<bool>,
    pub gains: Vec<f64>,
    pub pre_peak_samples: usize,
    pub post_peak_samples: usize,
    /// Present only when a basis had been computed at save time.
    pub pca_basis: Option<PcaBasis>,
    pub box_units: Vec<BoxUnitDocument>,
    pub pca_units: Vec<PcaUnitDocument>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BoxUnitDocument {
    pub global_id: u32,
    pub local_id: u32,
    pub color: Color,
    pub boxes: Vec<WaveBox>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PcaUnitDocument {
    pub global_id: u32,
    pub local_id: u32,
    pub color: Color,
    pub polygon: Polygon,
}

/// Snapshot the persistent part of a sorter.
pub fn capture(sorter: &SpikeSorter) -> SorterDocument {
    SorterDocument {
        sample_rate: sorter.config().sample_rate,
        pca_first: sorter.config().pca_first,
        electrodes: sorter.electrodes().iter().map(capture_electrode).collect(),
    }
}

fn capture_electrode(e: &Electrode) -> ElectrodeDocument {
    let box_units = e
        .classifier
        .box_units()
        .into_iter()
        .map(|u| BoxUnitDocument {
            global_id: u.global_id,
            local_id: u.local_id,
            color: u.color,
            boxes: u.boxes,
        })
        .collect();
    let pca_units = e
        .classifier
        .pca_units()
        .into_iter()
        .map(|u| PcaUnitDocument {
            global_id: u.global_id,
            local_id: u.local_id,
            color: u.color,
            polygon: u.polygon,
        })
        .collect();

    ElectrodeDocument {
        id: e.id(),
        channels: e.channels().to_vec(),
        thresholds: e.thresholds().to_vec(),
        active: (0..e.num_channels()).map(|c| e.is_channel_active(c)).collect(),
        gains: e.gains().to_vec(),
        pre_peak_samples: e.pre_peak_samples(),
        post_peak_samples: e.post_peak_samples(),
        pca_basis: e.pca_basis(),
        box_units,
        pca_units,
    }
}

/// Rebuild a sorter from a document. Unit statistics start from zero; a
/// persisted basis is installed as already computed.
pub fn restore(doc: SorterDocument) -> Result<SpikeSorter, String> {
    let mut sorter = SpikeSorter::new(SorterConfig {
        sample_rate: doc.sample_rate,
        pca_first: doc.pca_first,
        ..SorterConfig::default()
    });
    for e in doc.electrodes {
        sorter.insert_electrode(restore_electrode(e, doc.sample_rate)?);
    }
    Ok(sorter)
}

fn restore_electrode(doc: ElectrodeDocument, sample_rate: f64) -> Result<Electrode, String> {
    let m = doc.channels.len();
    if m == 0 {
        return Err(format!("Electrode {} has no channels", doc.id));
    }
    if doc.thresholds.len() != m || doc.active.len() != m || doc.gains.len() != m {
        return Err(format!("Electrode {} has mismatched channel settings", doc.id));
    }

    let mut electrode = Electrode::new(ElectrodeConfig {
        id: doc.id,
        channels: doc.channels,
        pre_peak_samples: doc.pre_peak_samples,
        post_peak_samples: doc.post_peak_samples,
        sample_rate,
    });
    for c in 0..m {
        electrode.set_threshold(c, doc.thresholds[c]);
        electrode.set_channel_active(c, doc.active[c]);
        electrode.set_gain(c, doc.gains[c]);
    }

    let waveform_len = m * electrode.snippet_len();
    let box_units = doc
        .box_units
        .into_iter()
        .map(|u| BoxUnit {
            global_id: u.global_id,
            local_id: u.local_id,
            color: u.color,
            boxes: u.boxes,
            stats: RunningStats::new(waveform_len, sample_rate),
            activated_at: None,
        })
        .collect();
    let pca_units = doc
        .pca_units
        .into_iter()
        .map(|u| PcaUnit {
            global_id: u.global_id,
            local_id: u.local_id,
            color: u.color,
            polygon: u.polygon,
            stats: RunningStats::new(waveform_len, sample_rate),
            activated_at: None,
        })
        .collect();
    electrode.classifier.restore(box_units, pca_units);

    if let Some(basis) = doc.pca_basis {
        if basis.dim() != waveform_len {
            return Err(format!(
                "Electrode {} basis dimension {} does not match waveform length {}",
                doc.id,
                basis.dim(),
                waveform_len
            ));
        }
        electrode.restore_pca_basis(basis);
    }
    Ok(electrode)
}

pub fn load_document<P: AsRef<Path>>(path: P) -> Result<SorterDocument, String> {
    let config_str = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config file: {}", e))?;

    serde_yaml::from_str(&config_str)
        .map_err(|e| format!("Failed to parse config file: {}", e))
}

pub fn save_document<P: AsRef<Path>>(doc: &SorterDocument, path: P) -> Result<(), String> {
    let yaml = serde_yaml::to_string(doc)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;

    fs::write(path, yaml)
        .map_err(|e| format!("Failed to write config file: {}", e))
}

pub fn load<P: AsRef<Path>>(path: P) -> Result<SpikeSorter, String> {
    restore(load_document(path)?)
}

pub fn save<P: AsRef<Path>>(sorter: &SpikeSorter, path: P) -> Result<(), String> {
    save_document(&capture(sorter), path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    fn sample_sorter() -> SpikeSorter {
        let mut sorter = SpikeSorter::new(SorterConfig {
            sample_rate: 24_000.0,
            pca_first: true,
            ..SorterConfig::default()
        });
        let a = sorter.add_electrode(vec![0, 1], 8, 16);
        sorter.electrode_mut(a).unwrap().set_threshold(0, -35.0);
        sorter.electrode_mut(a).unwrap().set_threshold(1, 40.0);
        sorter.electrode_mut(a).unwrap().set_channel_active(1, false);
        sorter.electrode_mut(a).unwrap().set_gain(0, 0.25);

        let unit = sorter.electrode(a).unwrap().classifier.add_box_unit(1);
        sorter.electrode(a).unwrap().classifier.add_box_to_unit(unit);
        sorter.electrode(a).unwrap().classifier.add_pca_unit(Polygon::new(
            vec![
                Point::new(-1.0, -1.0),
                Point::new(1.0, -1.0),
                Point::new(0.0, 1.0),
            ],
            Point::new(0.5, 0.0),
        ));

        sorter.add_electrode(vec![2], 4, 12);
        sorter
    }

    #[test]
    fn yaml_round_trip_preserves_the_document() {
        let doc = capture(&sample_sorter());
        let yaml = serde_yaml::to_string(&doc).unwrap();
        let parsed: SorterDocument = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn restore_rebuilds_electrodes_units_and_settings() {
        let doc = capture(&sample_sorter());
        let sorter = restore(doc.clone()).unwrap();

        assert_eq!(sorter.config().sample_rate, 24_000.0);
        assert!(sorter.config().pca_first);
        assert_eq!(sorter.electrodes().len(), 2);

        let e = sorter.electrode(1).unwrap();
        assert_eq!(e.channels(), &[0, 1]);
        assert_eq!(e.thresholds(), &[-35.0, 40.0]);
        assert!(!e.is_channel_active(1));
        assert_eq!(e.gains()[0], 0.25);
        assert!(!e.pca_ready()); // no basis had been computed

        let boxes = e.classifier.box_units();
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].boxes.len(), 2);
        assert_eq!(boxes[0].global_id, doc.electrodes[0].box_units[0].global_id);
        assert_eq!(boxes[0].local_id, doc.electrodes[0].box_units[0].local_id);
        assert_eq!(boxes[0].color, doc.electrodes[0].box_units[0].color);
        assert_eq!(boxes[0].stats.count(), 0); // transient state not persisted

        let polys = e.classifier.pca_units();
        assert_eq!(polys.len(), 1);
        assert_eq!(polys[0].polygon, doc.electrodes[0].pca_units[0].polygon);
    }

    #[test]
    fn restored_id_counter_moves_past_persisted_units() {
        let sorter = restore(capture(&sample_sorter())).unwrap();
        let e = sorter.electrode(1).unwrap();
        let existing: Vec<u32> = e
            .classifier
            .box_units()
            .iter()
            .map(|u| u.global_id)
            .chain(e.classifier.pca_units().iter().map(|u| u.global_id))
            .collect();
        let fresh = e.classifier.add_box_unit(0);
        assert!(existing.iter().all(|&id| fresh > id));
    }

    #[test]
    fn persisted_basis_is_installed_as_computed() {
        use crate::pca::AxisBounds;

        let mut doc = capture(&sample_sorter());
        let dim = 2 * (8 + 16);
        doc.electrodes[0].pca_basis = Some(PcaBasis {
            channels: 2,
            samples_per_channel: 24,
            pc1: vec![1.0 / (dim as f64).sqrt(); dim],
            pc2: vec![0.0; dim],
            bounds: AxisBounds::default(),
        });

        let sorter = restore(doc).unwrap();
        assert!(sorter.electrode(1).unwrap().pca_ready());
    }

    #[test]
    fn mismatched_channel_settings_are_rejected() {
        let mut doc = capture(&sample_sorter());
        doc.electrodes[0].thresholds.pop();
        assert!(restore(doc).is_err());
    }

    #[test]
    fn save_and_load_through_a_file() {
        let path = std::env::temp_dir().join("spike_sorter_config_test.yaml");
        let doc = capture(&sample_sorter());
        save_document(&doc, &path).unwrap();
        let loaded = load_document(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, doc);
    }
}
