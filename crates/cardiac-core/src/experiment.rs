//! Experiment results with memoised APD measurements.

use crate::measurements::{extract_last_beat, measure_apd};
use crate::{CardiacError, CellModel, ModelSolution, Result, Time};
use ndarray::ArrayView1;
use std::collections::BTreeMap;

/// A solved run, its last beat, and every APD asked of it so far.
///
/// The last beat is extracted when the result is built; APD values are
/// computed on first request and then served from the cache for as long as
/// the result lives.
#[derive(Debug, Clone)]
pub struct ExperimentResult {
    experiment_id: String,
    model_name: String,
    voltage_index: usize,
    cycle_length: Time,
    solution: ModelSolution,
    last_beat: ModelSolution,
    apd_x: BTreeMap<u32, Time>,
}

impl ExperimentResult {
    pub fn new<M: CellModel + ?Sized>(
        model: &M,
        solution: ModelSolution,
        cycle_length: Time,
        experiment_id: impl Into<String>,
    ) -> Result<Self> {
        let voltage_index = model.voltage_index();
        if voltage_index >= solution.state_vars().ncols() {
            return Err(CardiacError::DimensionError {
                expected: solution.state_vars().ncols(),
                got: voltage_index,
            });
        }
        let last_beat = extract_last_beat(&solution, cycle_length)?;

        Ok(Self {
            experiment_id: experiment_id.into(),
            model_name: model.name().to_string(),
            voltage_index,
            cycle_length,
            solution,
            last_beat,
            apd_x: BTreeMap::new(),
        })
    }

    /// APD at `percent` % repolarisation of the last beat
    pub fn apd(&mut self, percent: u32) -> Result<Time> {
        if let Some(&apd) = self.apd_x.get(&percent) {
            return Ok(apd);
        }
        let apd = measure_apd(
            self.last_beat.t().view(),
            self.last_beat.voltage(self.voltage_index)?,
            percent,
        )?;
        self.apd_x.insert(percent, apd);
        Ok(apd)
    }

    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn cycle_length(&self) -> Time {
        self.cycle_length
    }

    pub fn solution(&self) -> &ModelSolution {
        &self.solution
    }

    pub fn last_beat(&self) -> &ModelSolution {
        &self.last_beat
    }

    /// Voltage-like variable over the whole run
    pub fn ap_signal(&self) -> ArrayView1<'_, f64> {
        self.solution.state_vars().column(self.voltage_index)
    }

    /// APD values measured so far, keyed by percentage
    pub fn cached_apds(&self) -> &BTreeMap<u32, Time> {
        &self.apd_x
    }
}
