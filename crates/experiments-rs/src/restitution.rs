//! S1-S2 action-potential restitution.
//!
//! A train of S1 stimuli brings the cell to steady state. For every diastolic
//! interval `DI`, a premature S2 stimulus is delivered `DI` ms after the last
//! S1 beat reaches APD90: the state of the last S1 beat at that instant seeds
//! a single S2 cycle, whose APD90 is recorded.

use cardiac_core::{
    run_cycles_with, state_at, CardiacError, CellModel, CycleSummary, ExperimentResult,
    PacingProtocol, Result, SolverOptions, StateVector, Time,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Restitution protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestitutionConfig {
    pub cell_type: String,
    /// First diastolic interval (ms)
    pub min_di: Time,
    /// Exclusive upper bound of the diastolic intervals (ms)
    pub max_di: Time,
    pub di_step: Time,
    pub s1_cycle_length: Time,
    /// Number of S1 stimuli before the first S2
    pub steady_state_cycles: usize,
    /// Length of the window solved after each S2 stimulus
    pub s2_cycle_length: Time,
    pub solver: SolverOptions,
}

impl Default for RestitutionConfig {
    fn default() -> Self {
        Self {
            cell_type: "endo".to_string(),
            min_di: 50.0,
            max_di: 500.0,
            di_step: 50.0,
            s1_cycle_length: 1000.0,
            steady_state_cycles: 50,
            s2_cycle_length: 1000.0,
            solver: SolverOptions::default(),
        }
    }
}

impl RestitutionConfig {
    pub fn validate(&self) -> Result<()> {
        let finite = [
            ("min_di", self.min_di),
            ("max_di", self.max_di),
            ("di_step", self.di_step),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                return Err(CardiacError::InvalidParameterError(format!(
                    "{} must be finite, got {}",
                    name, value
                )));
            }
        }
        if self.min_di < 0.0 {
            return Err(CardiacError::InvalidParameterError(format!(
                "min_di must be >= 0, got {}",
                self.min_di
            )));
        }
        if self.di_step <= 0.0 {
            return Err(CardiacError::InvalidParameterError(format!(
                "di_step must be > 0, got {}",
                self.di_step
            )));
        }
        if self.min_di >= self.max_di {
            return Err(CardiacError::InvalidParameterError(format!(
                "min_di ({}) must be below max_di ({})",
                self.min_di, self.max_di
            )));
        }
        if self.max_di >= self.s1_cycle_length {
            return Err(CardiacError::InvalidParameterError(format!(
                "cannot use a diastolic interval of {} ms with an S1 cycle length of {} ms",
                self.max_di, self.s1_cycle_length
            )));
        }
        PacingProtocol::new(self.steady_state_cycles, self.s1_cycle_length).validate()?;
        PacingProtocol::new(1, self.s2_cycle_length).validate()?;
        self.solver.validate()
    }

    /// `min_di, min_di + di_step, ...` below `max_di`
    pub fn diastolic_intervals(&self) -> Vec<Time> {
        (0..)
            .map(|k| self.min_di + k as f64 * self.di_step)
            .take_while(|&di| di < self.max_di)
            .collect()
    }
}

/// One point of the restitution curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RestitutionPoint {
    pub di: Time,
    pub apd90: Time,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestitutionCurve {
    pub model: String,
    pub cell_type: String,
    pub s1_cycle_length: Time,
    pub steady_state_apd90: Time,
    /// Ordered by diastolic interval
    pub points: Vec<RestitutionPoint>,
}

impl RestitutionCurve {
    /// File stem used when writing the curve
    pub fn file_stem(&self) -> String {
        format!(
            "apd_res_{}_{}_{}s1cl",
            self.model, self.cell_type, self.s1_cycle_length
        )
    }
}

/// Progress events of a restitution run
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RestitutionProgress {
    /// An S1 cycle finished
    SteadyState(CycleSummary),
    /// The S2 beat at one diastolic interval was measured
    Point(RestitutionPoint),
}

/// Run the S1-S2 protocol on `model`.
///
/// The S2 beats are independent of each other and are solved in parallel;
/// `on_progress` may therefore be called from several threads.
pub fn run_restitution<M, F>(model: &M, config: &RestitutionConfig, on_progress: F) -> Result<RestitutionCurve>
where
    M: CellModel + Sync + ?Sized,
    F: Fn(&RestitutionProgress) + Sync,
{
    // Unknown cell types fail before any validation or integration
    model.parameters(&config.cell_type)?;
    config.validate()?;
    let intervals = config.diastolic_intervals();
    info!(
        model = model.name(),
        cell_type = %config.cell_type,
        s1_cycle_length = config.s1_cycle_length,
        intervals = intervals.len(),
        "restitution experiment started"
    );

    let s1 = run_cycles_with(
        model,
        &config.cell_type,
        &PacingProtocol::new(config.steady_state_cycles, config.s1_cycle_length),
        None,
        &config.solver,
        |summary| on_progress(&RestitutionProgress::SteadyState(*summary)),
    )?;
    let mut steady = ExperimentResult::new(model, s1, config.s1_cycle_length, "ap_res_ss")?;
    let steady_state_apd90 = steady.apd(90)?;

    let seeds = intervals
        .iter()
        .map(|&di| {
            let s2_time = steady_state_apd90 + di;
            match state_at(steady.last_beat(), s2_time) {
                Ok((_, state)) => Ok((di, state.to_owned())),
                Err(e) => {
                    warn!(di, s2_time, "S2 stimulus falls outside the last S1 beat");
                    Err(e)
                }
            }
        })
        .collect::<Result<Vec<(Time, StateVector)>>>()?;

    let s2_protocol = PacingProtocol::new(1, config.s2_cycle_length);
    let points = seeds
        .par_iter()
        .map(|(di, seed)| -> Result<RestitutionPoint> {
            let solution = run_cycles_with(
                model,
                &config.cell_type,
                &s2_protocol,
                Some(seed),
                &config.solver,
                |_| {},
            )?;
            let mut beat = ExperimentResult::new(
                model,
                solution,
                config.s2_cycle_length,
                format!("ap_res_{}di", di),
            )?;
            let point = RestitutionPoint {
                di: *di,
                apd90: beat.apd(90)?,
            };
            on_progress(&RestitutionProgress::Point(point));
            Ok(point)
        })
        .collect::<Result<Vec<_>>>()?;

    info!(steady_state_apd90, points = points.len(), "restitution experiment finished");
    Ok(RestitutionCurve {
        model: model.name().to_string(),
        cell_type: config.cell_type.clone(),
        s1_cycle_length: config.s1_cycle_length,
        steady_state_apd90,
        points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardiac_minimal::MinimalModel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_diastolic_intervals() {
        let config = RestitutionConfig {
            min_di: 100.0,
            max_di: 400.0,
            di_step: 100.0,
            ..Default::default()
        };
        assert_eq!(config.diastolic_intervals(), vec![100.0, 200.0, 300.0]);

        let uneven = RestitutionConfig {
            min_di: 10.0,
            max_di: 45.0,
            di_step: 10.0,
            ..Default::default()
        };
        assert_eq!(uneven.diastolic_intervals(), vec![10.0, 20.0, 30.0, 40.0]);
    }

    #[test]
    fn test_validation() {
        assert!(RestitutionConfig::default().validate().is_ok());

        let bad = [
            RestitutionConfig { max_di: 1000.0, ..Default::default() },
            RestitutionConfig { max_di: 1200.0, ..Default::default() },
            RestitutionConfig { di_step: 0.0, ..Default::default() },
            RestitutionConfig { di_step: -10.0, ..Default::default() },
            RestitutionConfig { min_di: 500.0, ..Default::default() },
            RestitutionConfig { min_di: -1.0, ..Default::default() },
            RestitutionConfig { steady_state_cycles: 0, ..Default::default() },
            RestitutionConfig { s2_cycle_length: 0.0, ..Default::default() },
        ];
        for config in bad {
            assert!(
                matches!(config.validate(), Err(CardiacError::InvalidParameterError(_))),
                "{:?} passed validation",
                config
            );
        }
    }

    #[test]
    fn test_invalid_config_does_no_work() {
        let config = RestitutionConfig {
            max_di: 2000.0,
            ..Default::default()
        };
        let calls = AtomicUsize::new(0);
        let result = run_restitution(&MinimalModel, &config, |_| {
            calls.fetch_add(1, Ordering::Relaxed);
        });
        assert!(matches!(result, Err(CardiacError::InvalidParameterError(_))));
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_unknown_cell_type() {
        let config = RestitutionConfig {
            cell_type: "atrial".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            run_restitution(&MinimalModel, &config, |_| {}),
            Err(CardiacError::UnknownCellTypeError { .. })
        ));
    }

    #[test]
    fn test_file_stem() {
        let curve = RestitutionCurve {
            model: "minimal_model".to_string(),
            cell_type: "endo".to_string(),
            s1_cycle_length: 800.0,
            steady_state_apd90: 250.0,
            points: Vec::new(),
        };
        assert_eq!(curve.file_stem(), "apd_res_minimal_model_endo_800s1cl");
    }
}
