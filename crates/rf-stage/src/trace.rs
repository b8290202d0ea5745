//! StageTrace — A complete sequence of stage events for one round/session
//!
//! A trace captures the full timeline of a round and can check the
//! lifecycle guarantees hosts rely on (one win stop per round, balanced
//! anticipation stages, one stop per reel).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::StageEvent;
use crate::stage::{Stage, StageCategory};
use crate::taxonomy::ScatterThreshold;
use crate::timing::TimingProfile;

/// Trace (de)serialization errors
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Trace JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A complete trace of stage events for one round or session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTrace {
    /// Unique identifier for this trace
    pub trace_id: String,

    /// Round counter, when the trace covers a single round
    #[serde(default)]
    pub round_id: Option<u64>,

    /// All events in emission order
    pub events: Vec<StageEvent>,

    /// When this trace was recorded
    pub recorded_at: DateTime<Utc>,

    /// Timing profile active when the round started
    #[serde(default)]
    pub timing_profile: Option<TimingProfile>,

    /// Custom metadata
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl StageTrace {
    /// Create a new empty trace
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            round_id: None,
            events: Vec::new(),
            recorded_at: Utc::now(),
            timing_profile: None,
            metadata: serde_json::Map::new(),
        }
    }

    /// Add an event to the trace
    pub fn push(&mut self, event: StageEvent) {
        self.events.push(event);
    }

    /// Set round id
    pub fn with_round(mut self, round_id: u64) -> Self {
        self.round_id = Some(round_id);
        self
    }

    /// Set timing profile
    pub fn with_profile(mut self, profile: TimingProfile) -> Self {
        self.timing_profile = Some(profile);
        self
    }

    /// Add metadata
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Parse a trace from JSON
    pub fn from_json(json: &str) -> Result<Self, TraceError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String, TraceError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Get total duration in milliseconds
    pub fn duration_ms(&self) -> f64 {
        if self.events.is_empty() {
            return 0.0;
        }
        let first = self.events.first().map(|e| e.timestamp_ms).unwrap_or(0.0);
        let last = self.events.last().map(|e| e.timestamp_ms).unwrap_or(0.0);
        last - first
    }

    /// Get events by category
    pub fn events_by_category(&self, category: StageCategory) -> Vec<&StageEvent> {
        self.events
            .iter()
            .filter(|e| e.stage.category() == category)
            .collect()
    }

    /// Get events by stage type name
    pub fn events_by_type(&self, type_name: &str) -> Vec<&StageEvent> {
        self.events
            .iter()
            .filter(|e| e.stage.type_name() == type_name)
            .collect()
    }

    /// Count events of a stage type
    pub fn count(&self, type_name: &str) -> usize {
        self.events
            .iter()
            .filter(|e| e.stage.type_name() == type_name)
            .count()
    }

    /// Find first event matching a predicate
    pub fn find_event<F>(&self, predicate: F) -> Option<&StageEvent>
    where
        F: Fn(&StageEvent) -> bool,
    {
        self.events.iter().find(|e| predicate(e))
    }

    /// Position of the first event of a type
    pub fn position_of(&self, type_name: &str) -> Option<usize> {
        self.events
            .iter()
            .position(|e| e.stage.type_name() == type_name)
    }

    /// Check if trace contains a specific stage type
    pub fn has_stage(&self, type_name: &str) -> bool {
        self.events.iter().any(|e| e.stage.type_name() == type_name)
    }

    /// Get all reel stop events
    pub fn reel_stops(&self) -> Vec<&StageEvent> {
        self.events_by_type("reel_stop")
    }

    /// Reel indices in the order they stopped
    pub fn reel_stop_order(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|e| match &e.stage {
                Stage::ReelStop { reel_index, .. } => Some(*reel_index),
                _ => None,
            })
            .collect()
    }

    /// Anticipation thresholds in the order their stages opened
    pub fn anticipation_targets(&self) -> Vec<(ScatterThreshold, u8)> {
        self.events
            .iter()
            .filter_map(|e| match &e.stage {
                Stage::AnticipationStageStart { target, reel_index } => {
                    Some((*target, *reel_index))
                }
                _ => None,
            })
            .collect()
    }

    /// Validate the round lifecycle recorded in this trace
    pub fn validate(&self) -> TraceValidation {
        let mut stops_per_reel: BTreeMap<u8, usize> = BTreeMap::new();
        for reel in self.reel_stop_order() {
            *stops_per_reel.entry(reel).or_default() += 1;
        }

        let targets = self.anticipation_targets();
        let targets_ascending = targets.windows(2).all(|w| w[0].0 < w[1].0);

        let win_start = self.position_of("win_sequence_start");
        let win_stop = self.position_of("win_sequence_stop");

        TraceValidation {
            has_round_start: self.has_stage("round_start"),
            has_all_reels_stop: self.has_stage("all_reels_stop"),
            reel_stop_count: stops_per_reel.len() as u8,
            duplicate_reel_stops: stops_per_reel.values().filter(|&&n| n > 1).count() as u8,
            win_start_count: self.count("win_sequence_start") as u8,
            win_stop_count: self.count("win_sequence_stop") as u8,
            win_start_before_stop: match (win_start, win_stop) {
                (Some(start), Some(stop)) => start < stop,
                (None, _) => true,
                (Some(_), None) => false,
            },
            anticipation_opened: self.count("anticipation_stage_start") as u8,
            anticipation_closed: self.count("anticipation_stage_end") as u8,
            anticipation_ascending: targets_ascending,
            critical_started: self.count("critical_sequence_start") as u8,
            critical_ended: self.count("critical_sequence_end") as u8,
        }
    }

    /// Get summary of trace
    pub fn summary(&self) -> TraceSummary {
        TraceSummary {
            trace_id: self.trace_id.clone(),
            round_id: self.round_id,
            event_count: self.events.len(),
            duration_ms: self.duration_ms(),
            reels_stopped: self.reel_stops().len(),
            win_lines_shown: self.count("win_line_show"),
            anticipation_stages: self.count("anticipation_stage_start"),
            skipped: self.has_stage("skip_accepted"),
        }
    }
}

/// Validation result for a round trace
#[derive(Debug, Clone, Default)]
pub struct TraceValidation {
    pub has_round_start: bool,
    pub has_all_reels_stop: bool,
    /// Distinct reels that reported a stop
    pub reel_stop_count: u8,
    /// Reels that reported more than one stop
    pub duplicate_reel_stops: u8,
    pub win_start_count: u8,
    pub win_stop_count: u8,
    pub win_start_before_stop: bool,
    pub anticipation_opened: u8,
    pub anticipation_closed: u8,
    pub anticipation_ascending: bool,
    pub critical_started: u8,
    pub critical_ended: u8,
}

impl TraceValidation {
    /// Check a single-round trace for a grid with `reels` columns
    pub fn is_valid(&self, reels: u8) -> bool {
        self.has_round_start
            && self.has_all_reels_stop
            && self.reel_stop_count == reels
            && self.duplicate_reel_stops == 0
            && self.win_stop_count == 1
            && self.win_start_count <= 1
            && self.win_start_before_stop
            && self.anticipation_opened == self.anticipation_closed
            && self.anticipation_ascending
            && self.critical_started == self.critical_ended
    }

    /// Get list of warnings
    pub fn warnings(&self) -> Vec<&'static str> {
        let mut warnings = Vec::new();

        if !self.has_round_start {
            warnings.push("Missing ROUND_START event");
        }
        if !self.has_all_reels_stop {
            warnings.push("Missing ALL_REELS_STOP event");
        }
        if self.duplicate_reel_stops > 0 {
            warnings.push("Reel reported more than one stop");
        }
        if self.win_stop_count != 1 {
            warnings.push("WIN_SEQUENCE_STOP must fire exactly once");
        }
        if !self.win_start_before_stop {
            warnings.push("WIN_SEQUENCE_START without a following stop");
        }
        if self.anticipation_opened != self.anticipation_closed {
            warnings.push("Anticipation stage opened but not closed");
        }
        if !self.anticipation_ascending {
            warnings.push("Anticipation thresholds fired out of order");
        }
        if self.critical_started != self.critical_ended {
            warnings.push("Critical sequence lock not released");
        }

        warnings
    }
}

/// Summary of a trace for quick overview
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceSummary {
    pub trace_id: String,
    pub round_id: Option<u64>,
    pub event_count: usize,
    pub duration_ms: f64,
    pub reels_stopped: usize,
    pub win_lines_shown: usize,
    pub anticipation_stages: usize,
    pub skipped: bool,
}
