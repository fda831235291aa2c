//! # Cardiac Core
//!
//! Shared types and numerics for single-cell cardiac electrophysiology.
//!
//! ## Layers
//!
//! | Layer | Module | Purpose |
//! |-------|--------|---------|
//! | Cell model contract | (this file) | What an ionic model must provide |
//! | Adaptive solver | [`solver`] | Dormand-Prince 5(4) with step bounds |
//! | Pacing engine | [`cycles`] | Repeated stimulation windows, state threaded between them |
//! | Measurements | [`measurements`] | Last-beat extraction, APDx |
//! | Result cache | [`experiment`] | Solution plus memoised APD values |
//!
//! ## Conventions
//!
//! 1. Time is in milliseconds, and every cycle is integrated on its own local
//!    clock starting at zero (the stimulus fires at the start of that clock).
//! 2. State series are `time x variable`, current series are `time x current`.
//! 3. Measurements work on the model's normalised voltage-like variable; use
//!    [`CellModel::rescale_voltage`] for millivolts.

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod cycles;
pub mod experiment;
pub mod measurements;
pub mod solver;

pub use cycles::{final_state, run_cycles, run_cycles_with, state_at, CycleSummary, PacingProtocol};
pub use experiment::ExperimentResult;
pub use measurements::{extract_last_beat, measure_apd};
pub use solver::{dopri5, OdeSolution, SolverError, SolverOptions};

/// Common errors
#[derive(Debug, Error)]
pub enum CardiacError {
    #[error("Unknown cell type '{cell_type}' for {model} (supported: {})", .supported.join(", "))]
    UnknownCellTypeError {
        model: String,
        cell_type: String,
        supported: Vec<String>,
    },

    #[error("Unknown cell model '{0}'")]
    UnknownModelError(String),

    #[error("Integration failed in cycle {cycle}: {source}")]
    IntegrationError {
        cycle: usize,
        #[source]
        source: SolverError,
    },

    #[error("Insufficient data: {0}")]
    InsufficientDataError(String),

    #[error("Ambiguous signal: {peaks} action potentials in a single-beat window")]
    AmbiguousSignalError { peaks: usize },

    #[error("Signal never repolarised to {percent}% after its peak")]
    IncompleteRepolarizationError { percent: u32 },

    #[error("Invalid parameter: {0}")]
    InvalidParameterError(String),

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionError { expected: usize, got: usize },

    #[error("Shape error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type Result<T> = std::result::Result<T, CardiacError>;

/// Time point (ms)
pub type Time = f64;

/// Membrane voltage (mV)
pub type Voltage = f64;

/// State vector for ODE systems
pub type StateVector = Array1<f64>;

// =============================================================================
// ODE SYSTEMS
// =============================================================================

/// ODE system trait (for solvers)
pub trait OdeSystem {
    /// System dimension
    fn dimension(&self) -> usize;

    /// Compute derivatives: dy/dt = f(t, y)
    fn derivatives(&self, t: Time, y: &StateVector) -> StateVector;
}

// =============================================================================
// MODEL SOLUTION
// =============================================================================

/// Time series produced by integrating a cell model.
///
/// The three series always share the same number of samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSolution {
    t: Array1<f64>,
    state_vars: Array2<f64>,
    currents: Array2<f64>,
}

impl ModelSolution {
    pub fn new(t: Array1<f64>, state_vars: Array2<f64>, currents: Array2<f64>) -> Result<Self> {
        if state_vars.nrows() != t.len() {
            return Err(CardiacError::DimensionError {
                expected: t.len(),
                got: state_vars.nrows(),
            });
        }
        if currents.nrows() != t.len() {
            return Err(CardiacError::DimensionError {
                expected: t.len(),
                got: currents.nrows(),
            });
        }
        Ok(Self { t, state_vars, currents })
    }

    /// Sample times
    pub fn t(&self) -> &Array1<f64> {
        &self.t
    }

    /// State variables, one row per sample
    pub fn state_vars(&self) -> &Array2<f64> {
        &self.state_vars
    }

    /// Ionic currents, one row per sample
    pub fn currents(&self) -> &Array2<f64> {
        &self.currents
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    /// Time between the first and last sample
    pub fn duration(&self) -> Time {
        match (self.t.first(), self.t.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }

    /// Column of a single state variable
    pub fn voltage(&self, index: usize) -> Result<ArrayView1<'_, f64>> {
        if index >= self.state_vars.ncols() {
            return Err(CardiacError::DimensionError {
                expected: self.state_vars.ncols(),
                got: index,
            });
        }
        Ok(self.state_vars.column(index))
    }

    /// Tail of the solution starting at `start`, with time shifted so the
    /// first retained sample sits at zero.
    pub(crate) fn rebased_from(&self, start: usize) -> Self {
        let origin = self.t[start];
        Self {
            t: self.t.slice(s![start..]).mapv(|t| t - origin),
            state_vars: self.state_vars.slice(s![start.., ..]).to_owned(),
            currents: self.currents.slice(s![start.., ..]).to_owned(),
        }
    }
}

// =============================================================================
// CELL MODEL CONTRACT
// =============================================================================

/// What the model function should return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvalMode {
    /// Rate of change of every state variable
    Derivatives,
    /// Instantaneous value of every named current
    Currents,
}

/// Ionic cell model.
///
/// Everything the pacing engine and the measurements need to know about a
/// model goes through this trait, so new models only have to implement it.
pub trait CellModel {
    /// Parameter record for one cell subtype
    type Params: Clone + std::fmt::Debug;

    /// Model name used in reports and errors
    fn name(&self) -> &'static str;

    /// Default starting state
    fn initial_state(&self) -> StateVector;

    /// Index of the voltage-like state variable
    fn voltage_index(&self) -> usize;

    /// Labels of the state variables, in state-vector order
    fn state_variable_names(&self) -> &'static [&'static str];

    /// Labels of the currents, in current-vector order
    fn current_names(&self) -> &'static [&'static str];

    /// Cell subtypes accepted by [`CellModel::parameters`]
    fn supported_cell_types(&self) -> &'static [&'static str];

    /// Parameter record for `cell_type`.
    ///
    /// Fails with [`CardiacError::UnknownCellTypeError`] for anything not in
    /// [`CellModel::supported_cell_types`].
    fn parameters(&self, cell_type: &str) -> Result<Self::Params>;

    /// Model right-hand side at a single point.
    ///
    /// Returns the state derivative or the current vector depending on `mode`.
    fn evaluate(
        &self,
        t: Time,
        state: ArrayView1<f64>,
        params: &Self::Params,
        mode: EvalMode,
    ) -> Array1<f64>;

    /// [`CellModel::evaluate`] over a series: one output row per time point.
    fn evaluate_series(
        &self,
        t: ArrayView1<f64>,
        states: ArrayView2<f64>,
        params: &Self::Params,
        mode: EvalMode,
    ) -> Result<Array2<f64>> {
        if states.nrows() != t.len() {
            return Err(CardiacError::DimensionError {
                expected: t.len(),
                got: states.nrows(),
            });
        }
        let n_states = self.state_variable_names().len();
        if states.ncols() != n_states {
            return Err(CardiacError::DimensionError {
                expected: n_states,
                got: states.ncols(),
            });
        }
        let width = match mode {
            EvalMode::Derivatives => n_states,
            EvalMode::Currents => self.current_names().len(),
        };

        let mut out = Array2::zeros((t.len(), width));
        for ((&ti, state), mut row) in t.iter().zip(states.rows()).zip(out.rows_mut()) {
            let values = self.evaluate(ti, state, params, mode);
            if values.len() != width {
                return Err(CardiacError::DimensionError {
                    expected: width,
                    got: values.len(),
                });
            }
            row.assign(&values);
        }
        Ok(out)
    }

    /// Voltage column of a state series converted to millivolts
    fn rescale_voltage(&self, state_vars: ArrayView2<f64>) -> Array1<f64>;
}

/// Build the unknown-cell-type error for `model`
pub fn unknown_cell_type<M: CellModel + ?Sized>(model: &M, cell_type: &str) -> CardiacError {
    CardiacError::UnknownCellTypeError {
        model: model.name().to_string(),
        cell_type: cell_type.to_string(),
        supported: model
            .supported_cell_types()
            .iter()
            .map(|s| s.to_string())
            .collect(),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Small linear model used by the unit tests of this crate.

    use super::*;
    use ndarray::array;

    /// du/dt = -u/tau + stimulus, single variable plus a recovery variable
    /// that follows u.
    #[derive(Debug, Clone, Copy)]
    pub struct LeakyCell;

    #[derive(Debug, Clone, PartialEq)]
    pub struct LeakyParams {
        pub tau: f64,
        pub stim: f64,
    }

    impl CellModel for LeakyCell {
        type Params = LeakyParams;

        fn name(&self) -> &'static str {
            "leaky"
        }

        fn initial_state(&self) -> StateVector {
            array![0.0, 0.0]
        }

        fn voltage_index(&self) -> usize {
            0
        }

        fn state_variable_names(&self) -> &'static [&'static str] {
            &["u", "r"]
        }

        fn current_names(&self) -> &'static [&'static str] {
            &["Jleak", "Jstim"]
        }

        fn supported_cell_types(&self) -> &'static [&'static str] {
            &["fast", "slow"]
        }

        fn parameters(&self, cell_type: &str) -> Result<LeakyParams> {
            match cell_type {
                "fast" => Ok(LeakyParams { tau: 10.0, stim: 1.0 }),
                "slow" => Ok(LeakyParams { tau: 50.0, stim: 0.5 }),
                other => Err(unknown_cell_type(self, other)),
            }
        }

        fn evaluate(
            &self,
            t: Time,
            state: ArrayView1<f64>,
            params: &LeakyParams,
            mode: EvalMode,
        ) -> Array1<f64> {
            let (u, r) = (state[0], state[1]);
            let j_leak = u / params.tau;
            let j_stim = if t < 1.0 { params.stim } else { 0.0 };
            match mode {
                EvalMode::Derivatives => array![j_stim - j_leak, (u - r) / (2.0 * params.tau)],
                EvalMode::Currents => array![j_leak, j_stim],
            }
        }

        fn rescale_voltage(&self, state_vars: ArrayView2<f64>) -> Array1<f64> {
            state_vars.column(0).mapv(|u| 100.0 * u - 80.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::LeakyCell;
    use super::*;
    use ndarray::array;

    #[test]
    fn test_solution_rejects_mismatched_series() {
        let t = array![0.0, 1.0, 2.0];
        let states = Array2::zeros((2, 2));
        let currents = Array2::zeros((3, 2));
        let err = ModelSolution::new(t, states, currents).unwrap_err();
        assert!(matches!(err, CardiacError::DimensionError { expected: 3, got: 2 }));
    }

    #[test]
    fn test_rebased_tail() {
        let t = array![0.0, 1.0, 2.5, 4.0];
        let states = array![[0.0, 1.0], [1.0, 1.0], [2.0, 1.0], [3.0, 1.0]];
        let currents = Array2::zeros((4, 1));
        let solution = ModelSolution::new(t, states, currents).unwrap();

        let tail = solution.rebased_from(2);
        assert_eq!(tail.t(), &array![0.0, 1.5]);
        assert_eq!(tail.state_vars().column(0), array![2.0, 3.0]);
        assert_eq!(tail.currents().nrows(), 2);
        assert_eq!(solution.duration(), 4.0);
    }

    #[test]
    fn test_voltage_column_bounds() {
        let solution =
            ModelSolution::new(array![0.0], array![[0.5, 0.1]], Array2::zeros((1, 1))).unwrap();
        assert_eq!(solution.voltage(0).unwrap()[0], 0.5);
        assert!(solution.voltage(2).is_err());
    }

    #[test]
    fn test_evaluate_series_matches_pointwise() {
        let model = LeakyCell;
        let params = model.parameters("fast").unwrap();
        let t = array![0.0, 0.5, 2.0];
        let states = array![[0.0, 0.0], [0.2, 0.1], [0.5, 0.3]];

        let series = model
            .evaluate_series(t.view(), states.view(), &params, EvalMode::Currents)
            .unwrap();
        assert_eq!(series.dim(), (3, 2));
        for i in 0..3 {
            let point = model.evaluate(t[i], states.row(i), &params, EvalMode::Currents);
            assert_eq!(series.row(i), point);
        }
        // Stimulus only during the first millisecond
        assert_eq!(series[[1, 1]], 1.0);
        assert_eq!(series[[2, 1]], 0.0);
    }

    #[test]
    fn test_evaluate_series_length_mismatch() {
        let model = LeakyCell;
        let params = model.parameters("slow").unwrap();
        let result = model.evaluate_series(
            array![0.0, 1.0].view(),
            Array2::zeros((3, 2)).view(),
            &params,
            EvalMode::Derivatives,
        );
        assert!(matches!(result, Err(CardiacError::DimensionError { .. })));
    }

    #[test]
    fn test_evaluate_series_column_mismatch() {
        let model = LeakyCell;
        let params = model.parameters("fast").unwrap();
        for mode in [EvalMode::Derivatives, EvalMode::Currents] {
            let result = model.evaluate_series(
                array![0.0, 1.0].view(),
                Array2::zeros((2, 1)).view(),
                &params,
                mode,
            );
            assert!(matches!(
                result,
                Err(CardiacError::DimensionError { expected: 2, got: 1 })
            ));
        }
    }

    #[test]
    fn test_unknown_cell_type_message() {
        let err = LeakyCell.parameters("medium").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("medium"));
        assert!(message.contains("fast, slow"));
    }
}
