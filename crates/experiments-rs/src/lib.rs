//! # Cardiac Experiments
//!
//! Pacing protocols run on top of [`cardiac_core`]:
//!
//! | Experiment | Protocol | Reports |
//! |------------|----------|---------|
//! | Steady state | `n` regular stimuli at a fixed cycle length | APDx, peak/rest voltage, last-beat traces |
//! | Restitution | S1 train to steady state, then one S2 per diastolic interval | APD90 against DI |
//!
//! Models are selected by name through [`CellModelKind`].

pub mod registry;
pub mod restitution;
pub mod steady_state;

pub use registry::CellModelKind;
pub use restitution::{
    run_restitution, RestitutionConfig, RestitutionCurve, RestitutionPoint, RestitutionProgress,
};
pub use steady_state::{run_steady_state, BeatTrace, SteadyStateConfig, SteadyStateReport};
