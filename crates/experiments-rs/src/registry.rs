//! Closed registry of the available cell models.

use crate::restitution::{run_restitution, RestitutionConfig, RestitutionCurve, RestitutionProgress};
use crate::steady_state::{run_steady_state, SteadyStateConfig, SteadyStateReport};
use cardiac_core::{CardiacError, CellModel, CycleSummary, Result};
use cardiac_minimal::MinimalModel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every cell model that can be selected by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellModelKind {
    /// Bueno-Orovio minimal ventricular model
    #[serde(rename = "minimal_model")]
    Minimal,
}

impl CellModelKind {
    pub const ALL: [CellModelKind; 1] = [CellModelKind::Minimal];

    /// Canonical name
    pub fn key(&self) -> &'static str {
        match self {
            CellModelKind::Minimal => "minimal_model",
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            CellModelKind::Minimal => &["minimal"],
        }
    }

    /// Canonical names of all registered models
    pub fn valid_models() -> Vec<&'static str> {
        Self::ALL.iter().map(|kind| kind.key()).collect()
    }

    pub fn cell_types(&self) -> &'static [&'static str] {
        match self {
            CellModelKind::Minimal => MinimalModel.supported_cell_types(),
        }
    }

    pub fn state_variable_names(&self) -> &'static [&'static str] {
        match self {
            CellModelKind::Minimal => MinimalModel.state_variable_names(),
        }
    }

    pub fn current_names(&self) -> &'static [&'static str] {
        match self {
            CellModelKind::Minimal => MinimalModel.current_names(),
        }
    }

    /// Parameter record of `cell_type` as a JSON object
    pub fn parameters_json(&self, cell_type: &str) -> Result<serde_json::Value> {
        let value = match self {
            CellModelKind::Minimal => serde_json::to_value(MinimalModel.parameters(cell_type)?),
        };
        value.map_err(|e| CardiacError::SerializationError(e.to_string()))
    }

    pub fn steady_state<F>(&self, config: &SteadyStateConfig, on_cycle: F) -> Result<SteadyStateReport>
    where
        F: FnMut(&CycleSummary),
    {
        match self {
            CellModelKind::Minimal => run_steady_state(&MinimalModel, config, on_cycle),
        }
    }

    pub fn restitution<F>(&self, config: &RestitutionConfig, on_progress: F) -> Result<RestitutionCurve>
    where
        F: Fn(&RestitutionProgress) + Sync,
    {
        match self {
            CellModelKind::Minimal => run_restitution(&MinimalModel, config, on_progress),
        }
    }
}

impl fmt::Display for CellModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Case-insensitive; accepts the canonical name or an alias
impl FromStr for CellModelKind {
    type Err = CardiacError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.key() == wanted || kind.aliases().contains(&wanted.as_str()))
            .ok_or_else(|| CardiacError::UnknownModelError(s.to_string()))
    }
}
