//! Measurements on action potentials.
//!
//! APDx here is measured on a baseline-zero signal (the normalised voltage
//! of the cell model): the threshold is `(1 - x/100) * peak` and the returned
//! value is the time stamp of the first sample at or below it after the peak.
//! Stimulation is assumed to happen at t = 0, so that time stamp is the
//! duration.

use crate::{CardiacError, ModelSolution, Result, Time};
use ndarray::ArrayView1;

/// Fraction of the peak a second upstroke has to reach to count as another
/// action potential.
const EXCURSION_LEVEL: f64 = 0.5;

/// The last `cycle_length` ms of `solution`, with time re-based to zero.
///
/// Starts at the first sample at or after `final_time - cycle_length`.
pub fn extract_last_beat(solution: &ModelSolution, cycle_length: Time) -> Result<ModelSolution> {
    if !cycle_length.is_finite() || cycle_length <= 0.0 {
        return Err(CardiacError::InvalidParameterError(format!(
            "cycle_length must be finite and > 0, got {}",
            cycle_length
        )));
    }
    let t = solution.t();
    let last = match t.last() {
        Some(&last) => last,
        None => {
            return Err(CardiacError::InsufficientDataError(
                "cannot extract a beat from an empty solution".into(),
            ))
        }
    };
    if solution.duration() < cycle_length {
        return Err(CardiacError::InsufficientDataError(format!(
            "solution spans {} ms, shorter than one cycle of {} ms",
            solution.duration(),
            cycle_length
        )));
    }

    let beat_start = last - cycle_length;
    let start = t.iter().position(|&ti| ti >= beat_start).ok_or_else(|| {
        CardiacError::InsufficientDataError(format!("no sample at or after t = {}", beat_start))
    })?;
    Ok(solution.rebased_from(start))
}

/// Action-potential duration at `percent` % repolarisation.
///
/// `signal` must hold a single action potential with a positive peak and
/// stimulation at `t = 0`. Signals with more than one upstroke through half
/// the peak are rejected with [`CardiacError::AmbiguousSignalError`].
pub fn measure_apd(t: ArrayView1<f64>, signal: ArrayView1<f64>, percent: u32) -> Result<Time> {
    if percent > 100 {
        return Err(CardiacError::InvalidParameterError(format!(
            "repolarisation percentage must be within 0..=100, got {}",
            percent
        )));
    }
    if signal.len() != t.len() {
        return Err(CardiacError::DimensionError {
            expected: t.len(),
            got: signal.len(),
        });
    }
    if signal.is_empty() {
        return Err(CardiacError::InsufficientDataError(
            "cannot measure an empty signal".into(),
        ));
    }

    // First occurrence of the maximum
    let (peak_index, peak) = signal
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best_i, best), (i, &v)| {
            if v > best {
                (i, v)
            } else {
                (best_i, best)
            }
        });
    if peak <= 0.0 {
        return Err(CardiacError::InsufficientDataError(format!(
            "signal has no positive peak (max = {})",
            peak
        )));
    }

    let upstrokes = count_upstrokes(signal, EXCURSION_LEVEL * peak);
    if upstrokes > 1 {
        return Err(CardiacError::AmbiguousSignalError { peaks: upstrokes });
    }

    let threshold = (1.0 - f64::from(percent) / 100.0) * peak;
    signal
        .iter()
        .skip(peak_index)
        .position(|&v| v <= threshold)
        .map(|offset| t[peak_index + offset])
        .ok_or(CardiacError::IncompleteRepolarizationError { percent })
}

/// Number of times the signal rises through `level`
fn count_upstrokes(signal: ArrayView1<f64>, level: f64) -> usize {
    let mut above = false;
    let mut count = 0;
    for &v in signal.iter() {
        let now = v > level;
        if now && !above {
            count += 1;
        }
        above = now;
    }
    count
}
