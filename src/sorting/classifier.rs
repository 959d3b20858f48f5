// Classifier: the authoritative, guard-protected unit collections for one
// electrode. Mutations and bulk reads both go through the internal lock and
// bulk reads hand out value copies, so no shared references cross threads.

use super::units::{BoxUnit, PcaUnit, UnitIdGenerator};
use super::Spike;
use crate::geometry::Polygon;
use std::sync::Mutex;

/// `box_id` value for "no box selected" / polygon unit selected.
pub const NO_BOX: i32 = -1;
/// `unit_id` value for "nothing selected".
pub const NO_UNIT: i32 = -1;

pub struct Classifier {
    electrode_id: u32,
    state: Mutex<ClassifierState>,
}

struct ClassifierState {
    waveform_len: usize,
    sample_rate: f64,
    box_units: Vec<BoxUnit>,
    pca_units: Vec<PcaUnit>,
    id_gen: UnitIdGenerator,
    selected_unit: i32,
    selected_box: i32,
}

impl Classifier {
    pub fn new(electrode_id: u32, waveform_len: usize, sample_rate: f64) -> Self {
        Self {
            electrode_id,
            state: Mutex::new(ClassifierState {
                waveform_len,
                sample_rate,
                box_units: Vec::new(),
                pca_units: Vec::new(),
                id_gen: UnitIdGenerator::new(),
                selected_unit: NO_UNIT,
                selected_box: NO_BOX,
            }),
        }
    }

    pub fn electrode_id(&self) -> u32 {
        self.electrode_id
    }

    /// Assign the spike to the first matching unit in list order. Kind order
    /// is caller-chosen: polygons first when `pca_first`, boxes first
    /// otherwise. No match leaves the spike unsorted; that is not an error.
    pub fn sort_spike(&self, spike: &mut Spike, pca_first: bool) -> bool {
        let mut state = self.state.lock().unwrap();
        if pca_first {
            try_pca_units(&mut state, spike) || try_box_units(&mut state, spike)
        } else {
            try_box_units(&mut state, spike) || try_pca_units(&mut state, spike)
        }
    }

    /// Create a box unit with one default-positioned box on `channel`.
    /// Returns the new unit's global id.
    pub fn add_box_unit(&self, channel: usize) -> u32 {
        let mut state = self.state.lock().unwrap();
        let global_id = state.id_gen.next_id();
        let local_id = generate_local_id(&state);
        let unit = BoxUnit::new(global_id, local_id, channel, state.waveform_len, state.sample_rate);
        state.box_units.push(unit);
        global_id
    }

    /// Create a polygon unit from a caller-supplied polygon.
    pub fn add_pca_unit(&self, polygon: Polygon) -> u32 {
        let mut state = self.state.lock().unwrap();
        let global_id = state.id_gen.next_id();
        let local_id = generate_local_id(&state);
        let unit = PcaUnit::new(global_id, local_id, polygon, state.waveform_len, state.sample_rate);
        state.pca_units.push(unit);
        global_id
    }

    pub fn add_box_to_unit(&self, unit_id: u32) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.box_units.iter_mut().find(|u| u.global_id == unit_id) {
            Some(unit) => {
                unit.add_box();
                true
            }
            None => false,
        }
    }

    /// Replace one box of a unit, e.g. after an external edit.
    pub fn set_box(&self, unit_id: u32, box_index: usize, new_box: crate::geometry::WaveBox) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.box_units.iter_mut().find(|u| u.global_id == unit_id) {
            Some(unit) if box_index < unit.boxes.len() => {
                unit.boxes[box_index] = new_box;
                true
            }
            _ => false,
        }
    }

    /// Delete one box; deleting the last box silently deletes the unit.
    pub fn remove_box_from_unit(&self, unit_id: u32, box_index: usize) -> bool {
        let mut state = self.state.lock().unwrap();
        let Some(pos) = state.box_units.iter().position(|u| u.global_id == unit_id) else {
            return false;
        };
        if !state.box_units[pos].remove_box(box_index) {
            return false;
        }
        if state.box_units[pos].boxes.is_empty() {
            state.box_units.remove(pos);
            clear_selection_if(&mut state, unit_id);
        }
        true
    }

    pub fn remove_unit(&self, unit_id: u32) -> bool {
        let mut state = self.state.lock().unwrap();
        let before = state.box_units.len() + state.pca_units.len();
        state.box_units.retain(|u| u.global_id != unit_id);
        state.pca_units.retain(|u| u.global_id != unit_id);
        let removed = state.box_units.len() + state.pca_units.len() < before;
        if removed {
            clear_selection_if(&mut state, unit_id);
        }
        removed
    }

    pub fn remove_all_units(&self) {
        let mut state = self.state.lock().unwrap();
        state.box_units.clear();
        state.pca_units.clear();
        state.selected_unit = NO_UNIT;
        state.selected_box = NO_BOX;
    }

    /// Reassign every unit's global id, preserving local id and color.
    pub fn generate_new_ids(&self) {
        let mut state = self.state.lock().unwrap();
        let mut id_gen = state.id_gen.clone();
        for unit in &mut state.box_units {
            unit.global_id = id_gen.next_id();
        }
        for unit in &mut state.pca_units {
            unit.global_id = id_gen.next_id();
        }
        state.id_gen = id_gen;
        state.selected_unit = NO_UNIT;
        state.selected_box = NO_BOX;
    }

    pub fn set_selection(&self, unit_id: i32, box_id: i32) {
        let mut state = self.state.lock().unwrap();
        state.selected_unit = unit_id;
        state.selected_box = box_id;
    }

    pub fn selection(&self) -> (i32, i32) {
        let state = self.state.lock().unwrap();
        (state.selected_unit, state.selected_box)
    }

    /// Value copy of the box-unit list.
    pub fn box_units(&self) -> Vec<BoxUnit> {
        self.state.lock().unwrap().box_units.clone()
    }

    /// Value copy of the polygon-unit list.
    pub fn pca_units(&self) -> Vec<PcaUnit> {
        self.state.lock().unwrap().pca_units.clone()
    }

    pub fn num_units(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.box_units.len() + state.pca_units.len()
    }

    /// Smallest positive local id not held by any unit.
    pub fn next_local_id(&self) -> u32 {
        generate_local_id(&self.state.lock().unwrap())
    }

    /// Replace the unit lists wholesale, e.g. when loading a persisted
    /// configuration. The id counter moves past every restored global id.
    pub fn restore(&self, box_units: Vec<BoxUnit>, pca_units: Vec<PcaUnit>) {
        let mut state = self.state.lock().unwrap();
        let max_id = box_units
            .iter()
            .map(|u| u.global_id)
            .chain(pca_units.iter().map(|u| u.global_id))
            .max()
            .unwrap_or(0);
        state.id_gen.reserve_through(max_id);
        state.box_units = box_units;
        state.pca_units = pca_units;
        state.selected_unit = NO_UNIT;
        state.selected_box = NO_BOX;
    }

    /// Waveform geometry changed: accumulated unit statistics are no longer
    /// index-comparable and are reset.
    pub fn resize_waveform(&self, waveform_len: usize) {
        let mut state = self.state.lock().unwrap();
        state.waveform_len = waveform_len;
        for unit in &mut state.box_units {
            unit.stats.resize(waveform_len);
        }
        for unit in &mut state.pca_units {
            unit.stats.resize(waveform_len);
        }
    }
}

fn try_pca_units(state: &mut ClassifierState, spike: &mut Spike) -> bool {
    if !spike.projected {
        return false;
    }
    for unit in &mut state.pca_units {
        if unit.contains_projection(spike.projection) {
            spike.sorted_id = unit.global_id;
            spike.color = unit.color;
            unit.stats.update(&spike.waveform, spike.timestamp);
            unit.activated_at = Some(spike.timestamp);
            return true;
        }
    }
    false
}

fn try_box_units(state: &mut ClassifierState, spike: &mut Spike) -> bool {
    for unit in &mut state.box_units {
        if unit.is_waveform_inside_all_boxes(spike) {
            spike.sorted_id = unit.global_id;
            spike.color = unit.color;
            unit.stats.update(&spike.waveform, spike.timestamp);
            unit.activated_at = Some(spike.timestamp);
            return true;
        }
    }
    false
}

fn generate_local_id(state: &ClassifierState) -> u32 {
    let mut candidate = 1u32;
    loop {
        let taken = state.box_units.iter().any(|u| u.local_id == candidate)
            || state.pca_units.iter().any(|u| u.local_id == candidate);
        if !taken {
            return candidate;
        }
        candidate += 1;
    }
}

fn clear_selection_if(state: &mut ClassifierState, unit_id: u32) {
    if state.selected_unit == unit_id as i32 {
        state.selected_unit = NO_UNIT;
        state.selected_box = NO_BOX;
    }
}
