//! Steady-state experiment: pace a cell for a number of cycles and report the
//! last beat.

use cardiac_core::{
    run_cycles_with, CardiacError, CellModel, CycleSummary, ExperimentResult, PacingProtocol,
    Result, SolverOptions, Time, Voltage,
};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

pub const EXPERIMENT_ID: &str = "steady_state";

/// Steady-state protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteadyStateConfig {
    pub cell_type: String,
    pub num_cycles: usize,
    pub cycle_length: Time,
    /// Repolarisation percentages to measure on the last beat
    pub apd_percents: Vec<u32>,
    pub solver: SolverOptions,
}

impl Default for SteadyStateConfig {
    fn default() -> Self {
        Self {
            cell_type: "endo".to_string(),
            num_cycles: 50,
            cycle_length: 1000.0,
            apd_percents: vec![30, 50, 90],
            solver: SolverOptions::default(),
        }
    }
}

impl SteadyStateConfig {
    pub fn protocol(&self) -> PacingProtocol {
        PacingProtocol::new(self.num_cycles, self.cycle_length)
    }
}

/// Time series of one beat, labelled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatTrace {
    pub t: Vec<Time>,
    pub state_variable_names: Vec<String>,
    pub state_vars: Array2<f64>,
    pub current_names: Vec<String>,
    pub currents: Array2<f64>,
    /// Voltage in mV
    pub action_potential: Vec<Voltage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SteadyStateReport {
    pub experiment_id: String,
    pub model: String,
    pub cell_type: String,
    pub num_cycles: usize,
    pub cycle_length: Time,
    /// APD in ms, keyed by repolarisation percentage
    pub apd: BTreeMap<u32, Time>,
    pub peak_voltage: Voltage,
    /// Voltage at the end of the last beat
    pub resting_voltage: Voltage,
    pub last_beat: BeatTrace,
}

impl SteadyStateReport {
    /// File stem used when writing the report
    pub fn file_stem(&self) -> String {
        format!(
            "{}_{}_{}_{}cycles_{}cl",
            self.experiment_id, self.model, self.cell_type, self.num_cycles, self.cycle_length
        )
    }
}

/// Pace `model` per `config` and measure the last beat.
pub fn run_steady_state<M, F>(model: &M, config: &SteadyStateConfig, on_cycle: F) -> Result<SteadyStateReport>
where
    M: CellModel + ?Sized,
    F: FnMut(&CycleSummary),
{
    info!(
        model = model.name(),
        cell_type = %config.cell_type,
        num_cycles = config.num_cycles,
        cycle_length = config.cycle_length,
        "steady-state experiment started"
    );

    let solution = run_cycles_with(
        model,
        &config.cell_type,
        &config.protocol(),
        None,
        &config.solver,
        on_cycle,
    )?;
    let mut result = ExperimentResult::new(model, solution, config.cycle_length, EXPERIMENT_ID)?;

    for &percent in &config.apd_percents {
        result.apd(percent)?;
    }

    let beat = result.last_beat();
    let action_potential = model.rescale_voltage(beat.state_vars().view());
    let peak_voltage = action_potential
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let resting_voltage = action_potential.last().copied().ok_or_else(|| {
        CardiacError::InsufficientDataError("last beat holds no samples".into())
    })?;

    let labels = |names: &[&str]| names.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    let report = SteadyStateReport {
        experiment_id: result.experiment_id().to_string(),
        model: result.model_name().to_string(),
        cell_type: config.cell_type.clone(),
        num_cycles: config.num_cycles,
        cycle_length: config.cycle_length,
        apd: result.cached_apds().clone(),
        peak_voltage,
        resting_voltage,
        last_beat: BeatTrace {
            t: beat.t().to_vec(),
            state_variable_names: labels(model.state_variable_names()),
            state_vars: beat.state_vars().clone(),
            current_names: labels(model.current_names()),
            currents: beat.currents().clone(),
            action_potential: action_potential.to_vec(),
        },
    };

    info!(
        apd = ?report.apd,
        peak_mv = report.peak_voltage,
        rest_mv = report.resting_voltage,
        "steady-state experiment finished"
    );
    Ok(report)
}
