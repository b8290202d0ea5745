//! Round result input (server-computed)

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SequencerResult;
use crate::grid::Grid;
use crate::resolver::WinDescriptor;

/// One-shot special effect run under the critical lock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialEffect {
    pub name: String,
    #[serde(default = "SpecialEffect::default_duration_ms")]
    pub duration_ms: f64,
}

impl SpecialEffect {
    pub fn new(name: impl Into<String>, duration_ms: f64) -> Self {
        Self {
            name: name.into(),
            duration_ms,
        }
    }

    fn default_duration_ms() -> f64 {
        1500.0
    }

    /// Lock hold limit; twice the nominal duration, at least one second
    pub fn timeout_ms(&self) -> f64 {
        (self.duration_ms * 2.0).max(1000.0)
    }
}

/// Everything the core consumes from a round result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundResult {
    /// Reel-major symbol ids
    pub grid: Grid,
    #[serde(default)]
    pub wins: Vec<WinDescriptor>,
    #[serde(default, alias = "specialEffects")]
    pub special_effects: Vec<SpecialEffect>,
    /// Round leads into a scatter-triggered feature
    #[serde(default, alias = "scatterTransition")]
    pub scatter_transition: bool,
}

impl RoundResult {
    pub fn new(grid: Grid) -> Self {
        Self {
            grid,
            wins: Vec::new(),
            special_effects: Vec::new(),
            scatter_transition: false,
        }
    }

    pub fn with_wins(mut self, wins: Vec<WinDescriptor>) -> Self {
        self.wins = wins;
        self
    }

    pub fn with_effect(mut self, effect: SpecialEffect) -> Self {
        self.special_effects.push(effect);
        self
    }

    pub fn with_scatter_transition(mut self, transition: bool) -> Self {
        self.scatter_transition = transition;
        self
    }

    pub fn from_json_str(json: &str) -> SequencerResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a single result or a list of results from a JSON file
    pub fn load_all(path: impl AsRef<Path>) -> SequencerResult<Vec<Self>> {
        let text = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&text)?;
        if value.is_array() {
            Ok(serde_json::from_value(value)?)
        } else {
            Ok(vec![serde_json::from_value(value)?])
        }
    }
}
