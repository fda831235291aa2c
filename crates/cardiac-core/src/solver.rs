//! Adaptive explicit integration.
//!
//! Windows are integrated with the Dormand-Prince 5(4) stepper of
//! `ode_solvers`. The step size is bounded above by
//! [`SolverOptions::max_step`] so that short events (the stimulus pulse at the
//! start of every cycle) cannot be stepped over, and the first attempted step
//! is [`SolverOptions::first_step`] so the upstroke is resolved from the very
//! beginning of a window.

use crate::{CardiacError, OdeSystem, Result, StateVector, Time};
use ode_solvers::dop_shared::OutputType;
use ode_solvers::dopri5::Dopri5;
use ode_solvers::{DVector, System};
use serde::{Deserialize, Serialize};
use thiserror::Error;

type Precision = f64;
type State = DVector<Precision>;

// Step-size controller, as in Hairer's DOPRI5
const SAFETY: f64 = 0.9;
const BETA: f64 = 0.04;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;
const STIFFNESS_TEST_INTERVAL: u32 = 1000;

/// Why an integration window could not be completed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error("integration towards t = {t_end} stopped: {reason}")]
    Stopped { t_end: Time, reason: String },

    #[error("state became non-finite at t = {t}")]
    NonFinite { t: Time },
}

/// Solver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Relative tolerance
    pub rtol: f64,
    /// Absolute tolerance
    pub atol: f64,
    /// First attempted step (ms)
    pub first_step: f64,
    /// Step ceiling (ms)
    pub max_step: f64,
    /// Attempted steps per window, accepted or not
    pub max_steps: u32,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            rtol: 1e-3,
            atol: 1e-6,
            first_step: 0.01,
            // APDs are read off the accepted steps, so this is also their resolution
            max_step: 0.5,
            max_steps: 1_000_000,
        }
    }
}

impl SolverOptions {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("rtol", self.rtol),
            ("atol", self.atol),
            ("first_step", self.first_step),
            ("max_step", self.max_step),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(CardiacError::InvalidParameterError(format!(
                    "solver option {} must be finite and > 0, got {}",
                    name, value
                )));
            }
        }
        if self.first_step > self.max_step {
            return Err(CardiacError::InvalidParameterError(format!(
                "solver first_step ({}) exceeds max_step ({})",
                self.first_step, self.max_step
            )));
        }
        if self.max_steps == 0 {
            return Err(CardiacError::InvalidParameterError(
                "solver max_steps must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Accepted points of one integration window, starting with the initial point
#[derive(Debug, Clone, Default)]
pub struct OdeSolution {
    pub t: Vec<Time>,
    pub y: Vec<StateVector>,
}

impl OdeSolution {
    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }
}

/// An [`OdeSystem`] seen through the `ode_solvers` interface
struct Rhs<'a, S: ?Sized> {
    system: &'a S,
}

impl<S: OdeSystem + ?Sized> System<Precision, State> for Rhs<'_, S> {
    fn system(&self, t: Precision, y: &State, dy: &mut State) {
        let y = StateVector::from_iter(y.iter().copied());
        let derivatives = self.system.derivatives(t, &y);
        for (out, value) in dy.iter_mut().zip(derivatives.iter()) {
            *out = *value;
        }
    }
}

/// Integrate `system` from `t0` to `t1`, recording every accepted step.
///
/// The final recorded time is exactly `t1`. Options are expected to be
/// validated by the caller.
pub fn dopri5<S: OdeSystem + ?Sized>(
    system: &S,
    y0: &StateVector,
    t0: Time,
    t1: Time,
    options: &SolverOptions,
) -> std::result::Result<OdeSolution, SolverError> {
    let start = State::from_iterator(y0.len(), y0.iter().copied());
    let mut stepper = Dopri5::from_param(
        Rhs { system },
        t0,
        t1,
        0.0,
        start,
        options.rtol,
        options.atol,
        SAFETY,
        BETA,
        MIN_FACTOR,
        MAX_FACTOR,
        options.max_step,
        options.first_step,
        options.max_steps,
        STIFFNESS_TEST_INTERVAL,
        OutputType::Sparse,
    );
    stepper.integrate().map_err(|e| SolverError::Stopped {
        t_end: t1,
        reason: e.to_string(),
    })?;

    let mut solution = OdeSolution {
        t: stepper.x_out().clone(),
        y: stepper
            .y_out()
            .iter()
            .map(|y| StateVector::from_iter(y.iter().copied()))
            .collect(),
    };
    if solution.t.first() != Some(&t0) {
        solution.t.insert(0, t0);
        solution.y.insert(0, y0.clone());
    }
    // The clipped last step can miss t1 by rounding
    if let Some(last) = solution.t.last_mut() {
        if (*last - t1).abs() <= 1e-9 * t1.abs().max(1.0) {
            *last = t1;
        }
    }

    if let Some(i) = solution
        .y
        .iter()
        .position(|y| y.iter().any(|v| !v.is_finite()))
    {
        return Err(SolverError::NonFinite { t: solution.t[i] });
    }
    Ok(solution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    struct Decay {
        rate: f64,
    }

    impl OdeSystem for Decay {
        fn dimension(&self) -> usize {
            1
        }

        fn derivatives(&self, _t: Time, y: &StateVector) -> StateVector {
            y.mapv(|v| -self.rate * v)
        }
    }

    struct Oscillator;

    impl OdeSystem for Oscillator {
        fn dimension(&self) -> usize {
            2
        }

        fn derivatives(&self, _t: Time, y: &StateVector) -> StateVector {
            array![y[1], -y[0]]
        }
    }

    /// Blows up in finite time: dy/dt = y^2, y(0) = 1 diverges at t = 1
    struct Blowup;

    impl OdeSystem for Blowup {
        fn dimension(&self) -> usize {
            1
        }

        fn derivatives(&self, _t: Time, y: &StateVector) -> StateVector {
            y.mapv(|v| v * v)
        }
    }

    #[test]
    fn test_exponential_decay() {
        let options = SolverOptions {
            rtol: 1e-8,
            atol: 1e-10,
            ..SolverOptions::default()
        };
        let solution = dopri5(&Decay { rate: 0.5 }, &array![2.0], 0.0, 4.0, &options).unwrap();

        let exact = 2.0 * (-0.5f64 * 4.0).exp();
        let last = solution.y.last().unwrap()[0];
        assert!((last - exact).abs() < 1e-7, "got {}, expected {}", last, exact);
        assert_eq!(*solution.t.last().unwrap(), 4.0);
    }

    #[test]
    fn test_harmonic_oscillator_one_period() {
        let period = 2.0 * std::f64::consts::PI;
        let options = SolverOptions {
            rtol: 1e-9,
            atol: 1e-12,
            ..SolverOptions::default()
        };
        let solution = dopri5(&Oscillator, &array![1.0, 0.0], 0.0, period, &options).unwrap();
        let end = solution.y.last().unwrap();
        assert!((end[0] - 1.0).abs() < 1e-6);
        assert!(end[1].abs() < 1e-6);
    }

    #[test]
    fn test_times_strictly_increasing_and_step_ceiling() {
        let options = SolverOptions {
            max_step: 0.25,
            ..SolverOptions::default()
        };
        let solution = dopri5(&Decay { rate: 0.01 }, &array![1.0], 0.0, 10.0, &options).unwrap();

        assert_eq!(solution.t[0], 0.0);
        assert_eq!(solution.y[0], array![1.0]);
        for pair in solution.t.windows(2) {
            assert!(pair[1] > pair[0]);
            assert!(pair[1] - pair[0] <= 0.25 + 1e-9);
        }
        // Slow decay and a 0.25 ceiling: at least 40 steps
        assert!(solution.len() >= 41);
        assert_eq!(solution.t.len(), solution.y.len());
    }

    #[test]
    fn test_first_step_is_respected() {
        let options = SolverOptions::default();
        let solution = dopri5(&Decay { rate: 1.0 }, &array![1.0], 0.0, 1.0, &options).unwrap();
        assert!((solution.t[1] - options.first_step).abs() < 1e-12);
    }

    #[test]
    fn test_blowup_is_reported() {
        let result = dopri5(&Blowup, &array![1.0], 0.0, 2.0, &SolverOptions::default());
        assert!(result.is_err(), "integrated through a singularity");
    }

    #[test]
    fn test_step_budget() {
        let options = SolverOptions {
            max_step: 0.1,
            max_steps: 5,
            ..SolverOptions::default()
        };
        let result = dopri5(&Decay { rate: 1.0 }, &array![1.0], 0.0, 10.0, &options);
        match result {
            Err(SolverError::Stopped { t_end, .. }) => assert_eq!(t_end, 10.0),
            other => panic!("expected the step budget to stop the window, got {:?}", other),
        }
    }

    #[test]
    fn test_options_validation() {
        assert!(SolverOptions::default().validate().is_ok());

        let bad = SolverOptions {
            max_step: -1.0,
            ..SolverOptions::default()
        };
        assert!(matches!(bad.validate(), Err(CardiacError::InvalidParameterError(_))));

        let inverted = SolverOptions {
            first_step: 2.0,
            max_step: 1.0,
            ..SolverOptions::default()
        };
        assert!(inverted.validate().is_err());

        let no_budget = SolverOptions {
            max_steps: 0,
            ..SolverOptions::default()
        };
        assert!(no_budget.validate().is_err());
    }
}
