//! Repeated stimulation.
//!
//! A run is a fold over cycle index: each cycle integrates the model over
//! `[0, cycle_length]` on its own clock, starting from the state the previous
//! cycle ended in, and is shifted by `cycle_length * k`. Every cycle keeps its
//! initial sample, so the concatenated time series repeats the boundary time
//! once per boundary and the two rows at a boundary hold the same state.

use crate::solver::{dopri5, SolverOptions};
use crate::{
    CardiacError, CellModel, EvalMode, ModelSolution, OdeSystem, Result, StateVector, Time,
};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Pacing protocol: `num_cycles` stimuli, one every `cycle_length` ms
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PacingProtocol {
    pub num_cycles: usize,
    pub cycle_length: Time,
}

impl PacingProtocol {
    pub fn new(num_cycles: usize, cycle_length: Time) -> Self {
        Self {
            num_cycles,
            cycle_length,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_cycles == 0 {
            return Err(CardiacError::InvalidParameterError(
                "num_cycles must be at least 1".into(),
            ));
        }
        if !self.cycle_length.is_finite() || self.cycle_length <= 0.0 {
            return Err(CardiacError::InvalidParameterError(format!(
                "cycle_length must be finite and > 0, got {}",
                self.cycle_length
            )));
        }
        Ok(())
    }

    /// Total paced time
    pub fn duration(&self) -> Time {
        self.num_cycles as f64 * self.cycle_length
    }
}

/// Reported to the progress callback after each cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleSummary {
    pub index: usize,
    pub num_cycles: usize,
    pub samples: usize,
    pub end_voltage: f64,
}

/// A cell model bound to one parameter set, seen as a plain ODE system
struct PacedCell<'a, M: CellModel + ?Sized> {
    model: &'a M,
    params: &'a M::Params,
    dimension: usize,
}

impl<M: CellModel + ?Sized> OdeSystem for PacedCell<'_, M> {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn derivatives(&self, t: Time, y: &StateVector) -> StateVector {
        self.model
            .evaluate(t, y.view(), self.params, EvalMode::Derivatives)
    }
}

/// Samples of all cycles so far, stored row-major
#[derive(Default)]
struct Accumulated {
    t: Vec<f64>,
    states: Vec<f64>,
    currents: Vec<f64>,
}

/// Pace `model` for `num_cycles` cycles of `cycle_length` ms with the default
/// solver options.
///
/// `initial_state` overrides the model's own initial state for the first
/// cycle.
pub fn run_cycles<M: CellModel + ?Sized>(
    model: &M,
    cell_type: &str,
    num_cycles: usize,
    cycle_length: Time,
    initial_state: Option<&StateVector>,
) -> Result<ModelSolution> {
    run_cycles_with(
        model,
        cell_type,
        &PacingProtocol::new(num_cycles, cycle_length),
        initial_state,
        &SolverOptions::default(),
        |_| {},
    )
}

/// Pace `model` according to `protocol`.
///
/// The parameter lookup happens before any integration, so an unknown
/// `cell_type` fails without doing work. `on_cycle` is called after every
/// completed cycle.
pub fn run_cycles_with<M, F>(
    model: &M,
    cell_type: &str,
    protocol: &PacingProtocol,
    initial_state: Option<&StateVector>,
    options: &SolverOptions,
    mut on_cycle: F,
) -> Result<ModelSolution>
where
    M: CellModel + ?Sized,
    F: FnMut(&CycleSummary),
{
    let params = model.parameters(cell_type)?;
    protocol.validate()?;
    options.validate()?;

    let seed = match initial_state {
        Some(state) => state.clone(),
        None => model.initial_state(),
    };
    let system = PacedCell {
        model,
        params: &params,
        dimension: model.state_variable_names().len(),
    };
    if seed.len() != system.dimension() {
        return Err(CardiacError::DimensionError {
            expected: system.dimension(),
            got: seed.len(),
        });
    }
    let n_states = system.dimension();
    let n_currents = model.current_names().len();
    let voltage_index = model.voltage_index();

    let (_, acc) = (0..protocol.num_cycles).try_fold(
        (seed, Accumulated::default()),
        |(y0, mut acc): (StateVector, Accumulated), cycle| -> Result<_> {
            let window = dopri5(&system, &y0, 0.0, protocol.cycle_length, options)
                .map_err(|source| CardiacError::IntegrationError { cycle, source })?;

            let local_t = Array1::from(window.t);
            let mut states = Array2::zeros((local_t.len(), n_states));
            for (mut row, y) in states.rows_mut().into_iter().zip(&window.y) {
                row.assign(y);
            }
            let currents =
                model.evaluate_series(local_t.view(), states.view(), &params, EvalMode::Currents)?;

            let offset = protocol.cycle_length * cycle as f64;
            acc.t.extend(local_t.iter().map(|t| t + offset));
            // Window ends on the next cycle's start, bit for bit
            if let Some(end) = acc.t.last_mut() {
                *end = protocol.cycle_length * (cycle + 1) as f64;
            }
            acc.states.extend(states.iter());
            acc.currents.extend(currents.iter());

            let end_state = match window.y.last() {
                Some(state) => state.clone(),
                None => y0,
            };
            let summary = CycleSummary {
                index: cycle,
                num_cycles: protocol.num_cycles,
                samples: local_t.len(),
                end_voltage: end_state[voltage_index],
            };
            debug!(
                cycle,
                samples = summary.samples,
                end_voltage = summary.end_voltage,
                "cycle integrated"
            );
            on_cycle(&summary);

            Ok((end_state, acc))
        },
    )?;

    let n = acc.t.len();
    let states = Array2::from_shape_vec((n, n_states), acc.states)?;
    let currents = Array2::from_shape_vec((n, n_currents), acc.currents)?;
    ModelSolution::new(Array1::from(acc.t), states, currents)
}

/// Last state row of a solution, for continuing a run from where it stopped
pub fn final_state(solution: &ModelSolution) -> Result<StateVector> {
    let rows = solution.state_vars().nrows();
    if rows == 0 {
        return Err(CardiacError::InsufficientDataError(
            "cannot continue from an empty solution".into(),
        ));
    }
    Ok(solution.state_vars().row(rows - 1).to_owned())
}

/// State row at the first sample at or after `t`
pub fn state_at(solution: &ModelSolution, t: Time) -> Result<(usize, ArrayView1<'_, f64>)> {
    solution
        .t()
        .iter()
        .position(|&ti| ti >= t)
        .map(|index| (index, solution.state_vars().row(index)))
        .ok_or_else(|| {
            CardiacError::InsufficientDataError(format!(
                "no sample at or after t = {} (solution ends at {})",
                t,
                solution.t().last().copied().unwrap_or(0.0)
            ))
        })
}
