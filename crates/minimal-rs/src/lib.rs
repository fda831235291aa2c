//! # CARDIAC-MINIMAL
//!
//! The minimal model for human ventricular action potentials of
//! Bueno-Orovio, Cherry and Fenton (J. Theor. Biol. 253, 2008).
//!
//! ## Model
//!
//! Four state variables:
//!
//! | Index | Name | Meaning |
//! |-------|------|---------|
//! | 0 | `u` | normalised transmembrane voltage |
//! | 1 | `v` | fast gate (sodium-like) |
//! | 2 | `w` | slow gate (calcium-like) |
//! | 3 | `s` | slow auxiliary gate |
//!
//! and three ionic currents plus the stimulus: `Jfi` (fast inward),
//! `Jso` (slow outward), `Jsi` (slow inward) and `Jstim`.
//!
//! Time constants switch either abruptly through a Heaviside step or smoothly
//! through a `tanh` blend. The three published parameter sets (epicardial,
//! endocardial and midmyocardial) are available as fixed presets.
//!
//! ```no_run
//! use cardiac_core::{run_cycles, CellModel, ExperimentResult};
//! use cardiac_minimal::MinimalModel;
//!
//! let model = MinimalModel::new();
//! let solution = run_cycles(&model, "endo", 10, 1000.0, None)?;
//! let mut result = ExperimentResult::new(&model, solution, 1000.0, "steady_state")?;
//! println!("APD90 = {} ms", result.apd(90)?);
//! # Ok::<(), cardiac_core::CardiacError>(())
//! ```

use cardiac_core::{
    unknown_cell_type, CardiacError, CellModel, EvalMode, Result, StateVector, Time, Voltage,
};
use ndarray::{array, Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// mV per unit of `u`
pub const MV_PER_UNIT: f64 = 85.7;

/// Resting membrane potential in mV, the value `u = 0` maps to
pub const RESTING_POTENTIAL_MV: Voltage = -84.0;

/// Stimulus current applied during the first millisecond of each cycle
pub const STIMULUS_AMPLITUDE: f64 = 0.4;

/// Stimulus duration (ms, local cycle time)
pub const STIMULUS_DURATION: Time = 1.0;

const STATE_VARIABLES: [&str; 4] = ["u", "v", "w", "s"];
const CURRENTS: [&str; 4] = ["Jfi", "Jso", "Jsi", "Jstim"];
const CELL_TYPES: [&str; 3] = ["epi", "endo", "m"];

// =============================================================================
// CELL TYPES
// =============================================================================

/// Ventricular cell subtypes with a published parameter set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellType {
    /// Epicardial
    #[serde(rename = "epi")]
    Epi,
    /// Endocardial
    #[serde(rename = "endo")]
    Endo,
    /// Midmyocardial (M cell)
    #[serde(rename = "m")]
    Mid,
}

impl CellType {
    pub const ALL: [CellType; 3] = [CellType::Epi, CellType::Endo, CellType::Mid];

    pub fn as_str(&self) -> &'static str {
        match self {
            CellType::Epi => "epi",
            CellType::Endo => "endo",
            CellType::Mid => "m",
        }
    }

    /// Published parameter set for this subtype
    pub fn parameters(&self) -> MinimalParams {
        match self {
            CellType::Epi => EPI,
            CellType::Endo => ENDO,
            CellType::Mid => MID,
        }
    }
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact, case-sensitive match on `"epi"`, `"endo"` or `"m"`
impl FromStr for CellType {
    type Err = CardiacError;

    fn from_str(s: &str) -> Result<Self> {
        CellType::ALL
            .into_iter()
            .find(|cell| cell.as_str() == s)
            .ok_or_else(|| unknown_cell_type(&MinimalModel, s))
    }
}

// =============================================================================
// PARAMETERS
// =============================================================================

/// Parameter record of the minimal model.
///
/// Names follow the paper: `th_*` are thresholds on `u`, `tau_*` time
/// constants in ms, `kappa_*`/`u_*` slope and midpoint of the `tanh` blends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinimalParams {
    pub u_o: f64,
    pub u_u: f64,
    pub th_v: f64,
    pub th_w: f64,
    pub th_v_minus: f64,
    pub th_o: f64,
    pub tau_v1: f64,
    pub tau_v2: f64,
    /// `tau_v+`
    pub tau_v: f64,
    pub tau_w1: f64,
    pub tau_w2: f64,
    pub kappa_w: f64,
    pub u_w: f64,
    /// `tau_w+`
    pub tau_w: f64,
    pub tau_fi: f64,
    pub tau_o1: f64,
    pub tau_o2: f64,
    pub tau_so1: f64,
    pub tau_so2: f64,
    pub kappa_so: f64,
    pub u_so: f64,
    pub tau_s1: f64,
    pub tau_s2: f64,
    pub kappa_s: f64,
    pub u_s: f64,
    pub tau_si: f64,
    pub tau_w_inf: f64,
    pub w_inf_star: f64,
}

/// Epicardial preset
pub const EPI: MinimalParams = MinimalParams {
    u_o: 0.0,
    u_u: 1.55,
    th_v: 0.3,
    th_w: 0.13,
    th_v_minus: 0.006,
    th_o: 0.006,
    tau_v1: 60.0,
    tau_v2: 1150.0,
    tau_v: 1.4506,
    tau_w1: 60.0,
    tau_w2: 15.0,
    kappa_w: 65.0,
    u_w: 0.03,
    tau_w: 200.0,
    tau_fi: 0.11,
    tau_o1: 400.0,
    tau_o2: 6.0,
    tau_so1: 30.0181,
    tau_so2: 0.9957,
    kappa_so: 2.0458,
    u_so: 0.65,
    tau_s1: 2.7342,
    tau_s2: 16.0,
    kappa_s: 2.0994,
    u_s: 0.9087,
    tau_si: 1.8875,
    tau_w_inf: 0.07,
    w_inf_star: 0.94,
};

/// Endocardial preset
pub const ENDO: MinimalParams = MinimalParams {
    u_o: 0.0,
    u_u: 1.56,
    th_v: 0.3,
    th_w: 0.13,
    th_v_minus: 0.2,
    th_o: 0.006,
    tau_v1: 75.0,
    tau_v2: 10.0,
    tau_v: 1.4506,
    tau_w1: 6.0,
    tau_w2: 140.0,
    kappa_w: 200.0,
    u_w: 0.016,
    tau_w: 280.0,
    tau_fi: 0.1,
    tau_o1: 470.0,
    tau_o2: 6.0,
    tau_so1: 40.0,
    tau_so2: 1.2,
    kappa_so: 2.0,
    u_so: 0.65,
    tau_s1: 2.7342,
    tau_s2: 2.0,
    kappa_s: 2.0994,
    u_s: 0.9087,
    tau_si: 2.9013,
    tau_w_inf: 0.0273,
    w_inf_star: 0.78,
};

/// Midmyocardial preset
pub const MID: MinimalParams = MinimalParams {
    u_o: 0.0,
    u_u: 1.61,
    th_v: 0.3,
    th_w: 0.13,
    th_v_minus: 0.1,
    th_o: 0.005,
    tau_v1: 80.0,
    tau_v2: 1.4506,
    tau_v: 1.4506,
    tau_w1: 70.0,
    tau_w2: 8.0,
    kappa_w: 200.0,
    u_w: 0.016,
    tau_w: 280.0,
    tau_fi: 0.078,
    tau_o1: 410.0,
    tau_o2: 7.0,
    tau_so1: 91.0,
    tau_so2: 0.8,
    kappa_so: 2.1,
    u_so: 0.6,
    tau_s1: 2.7342,
    tau_s2: 4.0,
    kappa_s: 2.0994,
    u_s: 0.9087,
    tau_si: 3.3849,
    tau_w_inf: 0.01,
    w_inf_star: 0.5,
};

// =============================================================================
// KINETICS
// =============================================================================

/// Unit step, 1 at and above zero
#[inline]
pub fn heaviside(x: f64) -> f64 {
    if x >= 0.0 {
        1.0
    } else {
        0.0
    }
}

/// `lo` far below `mid`, `hi` far above, switching with slope `kappa`
#[inline]
fn tanh_blend(x: f64, lo: f64, hi: f64, kappa: f64, mid: f64) -> f64 {
    lo + (hi - lo) * (1.0 + (kappa * (x - mid)).tanh()) / 2.0
}

/// Normalised voltage to millivolts
#[inline]
pub fn u_to_millivolts(u: f64) -> Voltage {
    MV_PER_UNIT * u + RESTING_POTENTIAL_MV
}

/// Right-hand side and currents at one point
#[derive(Debug, Clone, Copy)]
struct Rates {
    du: f64,
    dv: f64,
    dw: f64,
    ds: f64,
    j_fi: f64,
    j_so: f64,
    j_si: f64,
    j_stim: f64,
}

fn rates(t: Time, u: f64, v: f64, w: f64, s: f64, p: &MinimalParams) -> Rates {
    let h_v = heaviside(u - p.th_v);
    let h_w = heaviside(u - p.th_w);
    let h_o = heaviside(u - p.th_o);
    let h_v_minus = heaviside(u - p.th_v_minus);

    let tau_v_minus = (1.0 - h_v_minus) * p.tau_v1 + h_v_minus * p.tau_v2;
    let tau_w_minus = tanh_blend(u, p.tau_w1, p.tau_w2, p.kappa_w, p.u_w);
    let tau_so = tanh_blend(u, p.tau_so1, p.tau_so2, p.kappa_so, p.u_so);
    let tau_s = (1.0 - h_w) * p.tau_s1 + h_w * p.tau_s2;
    let tau_o = (1.0 - h_o) * p.tau_o1 + h_o * p.tau_o2;

    let v_inf = 1.0 - h_v_minus;
    let w_inf = (1.0 - h_o) * (1.0 - u / p.tau_w_inf) + h_o * p.w_inf_star;
    let s_inf = tanh_blend(u, 0.0, 1.0, p.kappa_s, p.u_s);

    let j_fi = -v * h_v * (u - p.th_v) * (p.u_u - u) / p.tau_fi;
    let j_so = (u - p.u_o) * (1.0 - h_w) / tau_o + h_w / tau_so;
    let j_si = -h_w * w * s / p.tau_si;
    let j_stim = if t < STIMULUS_DURATION {
        STIMULUS_AMPLITUDE
    } else {
        0.0
    };

    Rates {
        du: -(j_fi + j_so + j_si) + j_stim,
        dv: (1.0 - h_v) * (v_inf - v) / tau_v_minus - h_v * v / p.tau_v,
        dw: (1.0 - h_w) * (w_inf - w) / tau_w_minus - h_w * w / p.tau_w,
        ds: (s_inf - s) / tau_s,
        j_fi,
        j_so,
        j_si,
        j_stim,
    }
}

// =============================================================================
// MODEL
// =============================================================================

/// The minimal ventricular model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MinimalModel;

impl MinimalModel {
    pub fn new() -> Self {
        Self
    }
}

impl CellModel for MinimalModel {
    type Params = MinimalParams;

    fn name(&self) -> &'static str {
        "minimal_model"
    }

    fn initial_state(&self) -> StateVector {
        array![0.0, 1.0, 1.0, 0.0]
    }

    fn voltage_index(&self) -> usize {
        0
    }

    fn state_variable_names(&self) -> &'static [&'static str] {
        &STATE_VARIABLES
    }

    fn current_names(&self) -> &'static [&'static str] {
        &CURRENTS
    }

    fn supported_cell_types(&self) -> &'static [&'static str] {
        &CELL_TYPES
    }

    fn parameters(&self, cell_type: &str) -> Result<MinimalParams> {
        cell_type.parse::<CellType>().map(|cell| cell.parameters())
    }

    fn evaluate(
        &self,
        t: Time,
        state: ArrayView1<f64>,
        params: &MinimalParams,
        mode: EvalMode,
    ) -> Array1<f64> {
        let r = rates(t, state[0], state[1], state[2], state[3], params);
        match mode {
            EvalMode::Derivatives => array![r.du, r.dv, r.dw, r.ds],
            EvalMode::Currents => array![r.j_fi, r.j_so, r.j_si, r.j_stim],
        }
    }

    fn rescale_voltage(&self, state_vars: ArrayView2<f64>) -> Array1<f64> {
        state_vars.column(self.voltage_index()).mapv(u_to_millivolts)
    }
}
