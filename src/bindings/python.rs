use crate::config;
use crate::geometry::{Point, Polygon, WaveBox};
use crate::sorting::{SorterConfig, SpikeSorter};

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

#[pyclass]
pub struct PySpikeSorter {
    sorter: SpikeSorter,
}

fn electrode_err(id: u32) -> PyErr {
    PyValueError::new_err(format!("Unknown electrode id {}", id))
}

#[pymethods]
impl PySpikeSorter {
    #[new]
    pub fn new(sample_rate: f64, pca_first: bool, verbose: bool) -> Self {
        let config = SorterConfig {
            sample_rate,
            pca_first,
            verbose,
            ..SorterConfig::default()
        };
        PySpikeSorter {
            sorter: SpikeSorter::new(config),
        }
    }

    #[staticmethod]
    pub fn load(path: String) -> PyResult<Self> {
        let sorter = config::load(&path).map_err(PyValueError::new_err)?;
        Ok(PySpikeSorter { sorter })
    }

    pub fn save(&self, path: String) -> PyResult<()> {
        config::save(&self.sorter, &path).map_err(PyValueError::new_err)
    }

    pub fn add_electrode(
        &mut self,
        channels: Vec<usize>,
        pre_peak_samples: usize,
        post_peak_samples: usize,
    ) -> u32 {
        self.sorter
            .add_electrode(channels, pre_peak_samples, post_peak_samples)
    }

    pub fn remove_electrode(&mut self, electrode_id: u32) -> bool {
        self.sorter.remove_electrode(electrode_id)
    }

    pub fn set_threshold(&mut self, electrode_id: u32, channel: usize, threshold: f64) -> PyResult<()> {
        let e = self
            .sorter
            .electrode_mut(electrode_id)
            .ok_or_else(|| electrode_err(electrode_id))?;
        e.set_threshold(channel, threshold);
        Ok(())
    }

    pub fn set_channel_active(&mut self, electrode_id: u32, channel: usize, active: bool) -> PyResult<()> {
        let e = self
            .sorter
            .electrode_mut(electrode_id)
            .ok_or_else(|| electrode_err(electrode_id))?;
        e.set_channel_active(channel, active);
        Ok(())
    }

    pub fn set_gain(&mut self, electrode_id: u32, channel: usize, gain: f64) -> PyResult<()> {
        let e = self
            .sorter
            .electrode_mut(electrode_id)
            .ok_or_else(|| electrode_err(electrode_id))?;
        e.set_gain(channel, gain);
        Ok(())
    }

    pub fn set_waveform_size(
        &mut self,
        electrode_id: u32,
        pre_peak_samples: usize,
        post_peak_samples: usize,
    ) -> PyResult<()> {
        let e = self
            .sorter
            .electrode_mut(electrode_id)
            .ok_or_else(|| electrode_err(electrode_id))?;
        e.set_waveform_size(pre_peak_samples, post_peak_samples);
        Ok(())
    }

    pub fn add_box_unit(&mut self, electrode_id: u32, channel: usize) -> PyResult<u32> {
        let e = self
            .sorter
            .electrode(electrode_id)
            .ok_or_else(|| electrode_err(electrode_id))?;
        Ok(e.classifier.add_box_unit(channel))
    }

    pub fn add_pca_unit(
        &mut self,
        electrode_id: u32,
        vertices: Vec<(f64, f64)>,
    ) -> PyResult<u32> {
        let e = self
            .sorter
            .electrode(electrode_id)
            .ok_or_else(|| electrode_err(electrode_id))?;
        let polygon = Polygon::new(
            vertices.into_iter().map(|(x, y)| Point::new(x, y)).collect(),
            Point::new(0.0, 0.0),
        );
        Ok(e.classifier.add_pca_unit(polygon))
    }

    pub fn add_box_to_unit(&mut self, electrode_id: u32, unit_id: u32) -> PyResult<bool> {
        let e = self
            .sorter
            .electrode(electrode_id)
            .ok_or_else(|| electrode_err(electrode_id))?;
        Ok(e.classifier.add_box_to_unit(unit_id))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_box(
        &mut self,
        electrode_id: u32,
        unit_id: u32,
        box_index: usize,
        channel: usize,
        x: f64,
        y: f64,
        w: f64,
        h: f64,
    ) -> PyResult<bool> {
        let e = self
            .sorter
            .electrode(electrode_id)
            .ok_or_else(|| electrode_err(electrode_id))?;
        Ok(e.classifier
            .set_box(unit_id, box_index, WaveBox::new(channel, x, y, w, h)))
    }

    pub fn remove_box_from_unit(
        &mut self,
        electrode_id: u32,
        unit_id: u32,
        box_index: usize,
    ) -> PyResult<bool> {
        let e = self
            .sorter
            .electrode(electrode_id)
            .ok_or_else(|| electrode_err(electrode_id))?;
        Ok(e.classifier.remove_box_from_unit(unit_id, box_index))
    }

    pub fn remove_unit(&mut self, electrode_id: u32, unit_id: u32) -> PyResult<bool> {
        let e = self
            .sorter
            .electrode(electrode_id)
            .ok_or_else(|| electrode_err(electrode_id))?;
        Ok(e.classifier.remove_unit(unit_id))
    }

    pub fn remove_all_units(&mut self, electrode_id: u32) -> PyResult<()> {
        let e = self
            .sorter
            .electrode(electrode_id)
            .ok_or_else(|| electrode_err(electrode_id))?;
        e.classifier.remove_all_units();
        Ok(())
    }

    pub fn request_pca_rerun(&mut self, electrode_id: u32) -> PyResult<()> {
        let e = self
            .sorter
            .electrode_mut(electrode_id)
            .ok_or_else(|| electrode_err(electrode_id))?;
        e.request_pca_rerun();
        Ok(())
    }

    pub fn pca_ready(&self, electrode_id: u32) -> PyResult<bool> {
        let e = self
            .sorter
            .electrode(electrode_id)
            .ok_or_else(|| electrode_err(electrode_id))?;
        Ok(e.pca_ready())
    }

    /// (pc1_min, pc1_max, pc2_min, pc2_max) of the current basis, if any.
    pub fn pca_bounds(&self, electrode_id: u32) -> PyResult<Option<(f64, f64, f64, f64)>> {
        let e = self
            .sorter
            .electrode(electrode_id)
            .ok_or_else(|| electrode_err(electrode_id))?;
        Ok(e.pca_basis().map(|b| {
            (
                b.bounds.pc1_min,
                b.bounds.pc1_max,
                b.bounds.pc2_min,
                b.bounds.pc2_max,
            )
        }))
    }

    /// One tuple per detected spike:
    /// (electrode_id, timestamp, unit_id, pc1, pc2).
    pub fn process_chunk(&mut self, data: Vec<Vec<f64>>) -> Vec<(u32, u64, u32, f64, f64)> {
        self.sorter
            .process_block(&data)
            .into_iter()
            .map(|s| {
                (
                    s.electrode_id,
                    s.timestamp,
                    s.sorted_id,
                    s.projection[0],
                    s.projection[1],
                )
            })
            .collect()
    }
}

/// A Python module implemented in Rust.
#[pymodule]
pub fn spike_sorter(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PySpikeSorter>()?;
    Ok(())
}
