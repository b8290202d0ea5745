//! StageEvent — A stage occurrence with metadata
//!
//! Wraps a Stage with timing, payload, and source information.

use serde::{Deserialize, Serialize};

use crate::stage::Stage;

/// A stage event with full metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEvent {
    /// The canonical stage
    pub stage: Stage,

    /// Timestamp in milliseconds (from start of the round)
    pub timestamp_ms: f64,

    /// Additional payload data
    #[serde(default)]
    pub payload: StagePayload,

    /// Component that emitted the event (for debugging)
    #[serde(default)]
    pub source: Option<String>,

    /// Custom tags for filtering/routing
    #[serde(default)]
    pub tags: Vec<String>,
}

impl StageEvent {
    /// Create a new stage event
    pub fn new(stage: Stage, timestamp_ms: f64) -> Self {
        Self {
            stage,
            timestamp_ms,
            payload: StagePayload::default(),
            source: None,
            tags: Vec::new(),
        }
    }

    /// Create with payload
    pub fn with_payload(stage: Stage, timestamp_ms: f64, payload: StagePayload) -> Self {
        Self {
            stage,
            timestamp_ms,
            payload,
            source: None,
            tags: Vec::new(),
        }
    }

    /// Add source component
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Add a tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Get stage type name
    pub fn type_name(&self) -> &'static str {
        self.stage.type_name()
    }
}

/// Additional payload data for a stage event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StagePayload {
    /// Round the event belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_id: Option<u64>,

    /// Win amount (server-reported, display only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub win_amount: Option<f64>,

    /// Highlighted cells (column, row)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cells: Vec<(u8, u8)>,

    /// Spins remaining in an autoplay session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spins_remaining: Option<u32>,

    /// Duration of the phase the event opens (ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
}

impl StagePayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set round id
    pub fn round(mut self, round_id: u64) -> Self {
        self.round_id = Some(round_id);
        self
    }

    /// Builder: set win amount
    pub fn win_amount(mut self, amount: f64) -> Self {
        self.win_amount = Some(amount);
        self
    }

    /// Builder: set highlighted cells
    pub fn cells(mut self, cells: Vec<(u8, u8)>) -> Self {
        self.cells = cells;
        self
    }

    /// Builder: set spins remaining
    pub fn spins_remaining(mut self, spins: u32) -> Self {
        self.spins_remaining = Some(spins);
        self
    }

    /// Builder: set duration
    pub fn duration(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}
