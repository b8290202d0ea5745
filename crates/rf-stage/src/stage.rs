//! Stage — The core enum defining all round lifecycle signals
//!
//! A Stage is NOT an animation, NOT a timer callback.
//! A Stage is the SEMANTIC MEANING of a moment in the round flow.

use serde::{Deserialize, Serialize};

use crate::taxonomy::{
    AutoplayEndReason, HoldRelease, ScatterThreshold, SkipRefusal, WinDisplayMode, WinStopReason,
};

/// Canonical round stage, the shared language of round sequencing
///
/// Audio, UI and the autoplay gate respond to stages, never to raw timers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Stage {
    // ═══════════════════════════════════════════════════════════════════════
    // ROUND LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════
    /// New grid accepted, reel drop about to start
    RoundStart {
        /// Monotonic round counter
        round_id: u64,
    },

    /// Reel timeline started
    ReelSpinStart {
        /// Which reel (0-indexed)
        reel_index: u8,
    },

    /// Reel entered its hold-and-spin filler loop
    ReelHoldStart {
        /// Which reel (0-indexed)
        reel_index: u8,
    },

    /// Reel left its hold-and-spin loop
    ReelHoldRelease {
        /// Which reel (0-indexed)
        reel_index: u8,
        /// What released it
        released_by: HoldRelease,
    },

    /// Reel settled, showing final symbols
    ReelStop {
        /// Which reel stopped (0-indexed)
        reel_index: u8,
        /// Symbols on this reel (top to bottom)
        #[serde(default)]
        symbols: Vec<u32>,
    },

    /// Every reel of the round has settled
    AllReelsStop,

    /// Round fully sequenced (win display handed over)
    RoundEnd {
        round_id: u64,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // ANTICIPATION
    // ═══════════════════════════════════════════════════════════════════════
    /// Anticipation stage opened for a scatter threshold
    AnticipationStageStart {
        /// Threshold being anticipated
        target: ScatterThreshold,
        /// Reel whose drop is being extended
        reel_index: u8,
    },

    /// Anticipation stage closed
    AnticipationStageEnd {
        target: ScatterThreshold,
        reel_index: u8,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // PLAYER CONTROLS
    // ═══════════════════════════════════════════════════════════════════════
    /// Skip accepted, running timelines collapse to the fast path
    SkipAccepted,

    /// Skip ignored
    SkipRefused {
        reason: SkipRefusal,
    },

    /// Turbo toggled
    TurboChanged {
        enabled: bool,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // CRITICAL SEQUENCES
    // ═══════════════════════════════════════════════════════════════════════
    /// One-shot special effect acquired the critical lock
    CriticalSequenceStart {
        name: String,
    },

    /// Critical lock released (on every exit path)
    CriticalSequenceEnd {
        name: String,
        /// False when the sequence failed or timed out
        #[serde(default)]
        completed: bool,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // WIN SEQUENCE
    // ═══════════════════════════════════════════════════════════════════════
    /// Win display starting
    WinSequenceStart {
        /// Number of resolved lines
        line_count: u8,
        /// Display mode
        mode: WinDisplayMode,
    },

    /// Individual win line being highlighted
    WinLineShow {
        /// Position of the line in the display list
        line_index: u8,
        /// Winline template used for the shape (None = synthetic)
        #[serde(default)]
        template_index: Option<u16>,
        /// Number of highlighted cells
        #[serde(default)]
        cell_count: u8,
    },

    /// Win display finished its first pass (emitted exactly once per round)
    WinSequenceStop {
        reason: WinStopReason,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // AUTOPLAY
    // ═══════════════════════════════════════════════════════════════════════
    /// Automated spin session started
    AutoplayStart {
        spins: u32,
    },

    /// Gate requested the next automated spin
    AutoplaySpinRequested {
        spins_remaining: u32,
    },

    /// Queued spin credit applied to the session
    AutoplayCreditApplied {
        spins: u32,
    },

    /// Automated spin session ended
    AutoplayEnd {
        reason: AutoplayEndReason,
    },
}

/// Stage category for grouping and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageCategory {
    Round,
    Reel,
    Anticipation,
    Control,
    Critical,
    Win,
    Autoplay,
}

impl Stage {
    /// Get the category of this stage
    pub fn category(&self) -> StageCategory {
        match self {
            Stage::RoundStart { .. } | Stage::AllReelsStop | Stage::RoundEnd { .. } => {
                StageCategory::Round
            }
            Stage::ReelSpinStart { .. }
            | Stage::ReelHoldStart { .. }
            | Stage::ReelHoldRelease { .. }
            | Stage::ReelStop { .. } => StageCategory::Reel,
            Stage::AnticipationStageStart { .. } | Stage::AnticipationStageEnd { .. } => {
                StageCategory::Anticipation
            }
            Stage::SkipAccepted | Stage::SkipRefused { .. } | Stage::TurboChanged { .. } => {
                StageCategory::Control
            }
            Stage::CriticalSequenceStart { .. } | Stage::CriticalSequenceEnd { .. } => {
                StageCategory::Critical
            }
            Stage::WinSequenceStart { .. }
            | Stage::WinLineShow { .. }
            | Stage::WinSequenceStop { .. } => StageCategory::Win,
            Stage::AutoplayStart { .. }
            | Stage::AutoplaySpinRequested { .. }
            | Stage::AutoplayCreditApplied { .. }
            | Stage::AutoplayEnd { .. } => StageCategory::Autoplay,
        }
    }

    /// Get the canonical type name (matches serde tag)
    pub fn type_name(&self) -> &'static str {
        match self {
            Stage::RoundStart { .. } => "round_start",
            Stage::ReelSpinStart { .. } => "reel_spin_start",
            Stage::ReelHoldStart { .. } => "reel_hold_start",
            Stage::ReelHoldRelease { .. } => "reel_hold_release",
            Stage::ReelStop { .. } => "reel_stop",
            Stage::AllReelsStop => "all_reels_stop",
            Stage::RoundEnd { .. } => "round_end",
            Stage::AnticipationStageStart { .. } => "anticipation_stage_start",
            Stage::AnticipationStageEnd { .. } => "anticipation_stage_end",
            Stage::SkipAccepted => "skip_accepted",
            Stage::SkipRefused { .. } => "skip_refused",
            Stage::TurboChanged { .. } => "turbo_changed",
            Stage::CriticalSequenceStart { .. } => "critical_sequence_start",
            Stage::CriticalSequenceEnd { .. } => "critical_sequence_end",
            Stage::WinSequenceStart { .. } => "win_sequence_start",
            Stage::WinLineShow { .. } => "win_line_show",
            Stage::WinSequenceStop { .. } => "win_sequence_stop",
            Stage::AutoplayStart { .. } => "autoplay_start",
            Stage::AutoplaySpinRequested { .. } => "autoplay_spin_requested",
            Stage::AutoplayCreditApplied { .. } => "autoplay_credit_applied",
            Stage::AutoplayEnd { .. } => "autoplay_end",
        }
    }

    /// Reel this stage refers to, if any
    pub fn reel_index(&self) -> Option<u8> {
        match self {
            Stage::ReelSpinStart { reel_index }
            | Stage::ReelHoldStart { reel_index }
            | Stage::ReelHoldRelease { reel_index, .. }
            | Stage::ReelStop { reel_index, .. }
            | Stage::AnticipationStageStart { reel_index, .. }
            | Stage::AnticipationStageEnd { reel_index, .. } => Some(*reel_index),
            _ => None,
        }
    }

    /// Check if this stage is a looping presentation (audio should loop)
    pub fn is_looping(&self) -> bool {
        matches!(
            self,
            Stage::ReelSpinStart { .. }
                | Stage::ReelHoldStart { .. }
                | Stage::AnticipationStageStart { .. }
        )
    }

    /// Check if the continuation gate listens for this stage
    pub fn is_gate_signal(&self) -> bool {
        matches!(
            self,
            Stage::AllReelsStop
                | Stage::WinSequenceStop { .. }
                | Stage::CriticalSequenceEnd { .. }
        )
    }
}
