//! Stage Taxonomy — Enums classifying lifecycle details
//!
//! Small closed vocabularies carried inside stages: why a held reel was
//! released, why a skip was refused, how a win sequence is displayed and
//! why an autoplay session ended.

use serde::{Deserialize, Serialize};

/// Scatter count thresholds that can open an anticipation stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScatterThreshold {
    Three,
    Four,
    Five,
}

impl ScatterThreshold {
    /// All thresholds in firing order
    pub const ALL: [ScatterThreshold; 3] = [Self::Three, Self::Four, Self::Five];

    /// Number of scatters this threshold stands for
    pub fn count(&self) -> u8 {
        match self {
            Self::Three => 3,
            Self::Four => 4,
            Self::Five => 5,
        }
    }

    /// Threshold for a raw scatter count
    pub fn from_count(count: u8) -> Option<Self> {
        match count {
            3 => Some(Self::Three),
            4 => Some(Self::Four),
            5 => Some(Self::Five),
            _ => None,
        }
    }

    /// Next higher threshold
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Three => Some(Self::Four),
            Self::Four => Some(Self::Five),
            Self::Five => None,
        }
    }
}

/// Why a reel left its hold-and-spin loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldRelease {
    /// The anticipation stage for this reel's target became active
    StageActive,
    /// The reel to the left settled (sequential stop)
    PreviousReelStopped,
    /// Player skip
    Skip,
    /// Safety-net timer fired
    Timeout,
}

/// Why a skip request was ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipRefusal {
    /// An anticipation stage is running
    AnticipationStage,
    /// A critical sequence holds the lock
    CriticalSequence,
    /// No reel drop is running
    NotSpinning,
    /// Skip already requested this round
    AlreadyActive,
}

/// Win display mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WinDisplayMode {
    /// Cycle lines until the next spin (manual spins, final autoplay spin)
    #[default]
    Looping,
    /// Show every line once (mid-autoplay, scatter transitions)
    SinglePass,
}

impl WinDisplayMode {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Looping => "Looping",
            Self::SinglePass => "Single Pass",
        }
    }
}

/// Why a win sequence stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinStopReason {
    /// First (or only) pass finished
    PassComplete,
    /// No wins to display
    NoWins,
    /// A spin request interrupted the first pass
    Interrupted,
}

/// Why an autoplay session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoplayEndReason {
    /// All spins consumed
    Exhausted,
    /// Host cancelled the session
    Cancelled,
    /// Waited for a progression signal that never came
    ProgressionTimeout,
}
