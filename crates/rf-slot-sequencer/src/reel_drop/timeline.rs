//! Per-reel timeline construction
//!
//! Pure arithmetic: distances, durations, easing and where a reel may have
//! to hold. Nothing here touches timers.

use serde::{Deserialize, Serialize};

use crate::anticipation::{AnticipationPlan, StageKey};
use crate::config::ReelDropConfig;
use crate::timing::{Easing, TimingProfile};

/// Kind of motion phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    /// Start delay before the reel moves
    Pause,
    /// Short reverse motion
    WindUp,
    /// Main drop (linear)
    Drop,
    /// Final part of the drop (may be held back)
    DropTail,
    /// Fresh filler rows after a hold
    Release,
    SettleDown,
    SettleUp,
    /// Skip fast path
    SkipCollapse,
}

impl PhaseKind {
    /// Counts toward the distance still to fall
    pub fn is_drop(&self) -> bool {
        matches!(self, Self::Drop | Self::DropTail | Self::Release)
    }
}

/// One motion segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionPhase {
    pub kind: PhaseKind,
    /// Signed distance, positive = downwards (px)
    pub distance_px: f64,
    pub duration_ms: f64,
    pub easing: Easing,
}

impl MotionPhase {
    pub fn new(kind: PhaseKind, distance_px: f64, duration_ms: f64, easing: Easing) -> Self {
        Self {
            kind,
            distance_px,
            duration_ms: duration_ms.max(0.0),
            easing,
        }
    }

    pub fn pause(duration_ms: f64) -> Self {
        Self::new(PhaseKind::Pause, 0.0, duration_ms, Easing::Linear)
    }

    /// Release animation after a hold
    pub fn release(config: &ReelDropConfig, scale: f64) -> Self {
        Self::new(
            PhaseKind::Release,
            config.release_rows as f64 * config.cell_pitch_px,
            config.release_ms * scale,
            Easing::EaseOut,
        )
    }

    /// Single short linear motion over what is still visible
    pub fn collapse(remaining_px: f64, rows: u8, config: &ReelDropConfig) -> Self {
        let visible = remaining_px.clamp(0.0, rows as f64 * config.cell_pitch_px);
        Self::new(
            PhaseKind::SkipCollapse,
            visible,
            visible / config.base_speed_px_per_ms,
            Easing::Linear,
        )
    }

    /// Distance covered after `progress` (0..=1) of the phase duration
    pub fn travelled(&self, progress: f64) -> f64 {
        self.distance_px * self.easing.apply(progress)
    }

    /// Drop distance left in this phase after travelling `travelled`
    pub fn remaining_drop(&self, travelled: f64) -> f64 {
        if self.kind.is_drop() {
            (self.distance_px - travelled).max(0.0)
        } else {
            0.0
        }
    }
}

/// Drop distance left across a slice of phases
pub fn remaining_drop(phases: &[MotionPhase]) -> f64 {
    phases.iter().map(|p| p.remaining_drop(0.0)).sum()
}

/// What a held reel waits for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldGate {
    /// Anticipation stage that must become active
    pub stage: Option<StageKey>,
    /// Reel that must have stopped first
    pub previous_reel: Option<u8>,
}

impl HoldGate {
    pub fn is_unconditional(&self) -> bool {
        self.stage.is_none() && self.previous_reel.is_none()
    }
}

/// Full motion plan for one reel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReelTimeline {
    pub reel: u8,
    pub start_delay_ms: f64,
    pub phases: Vec<MotionPhase>,
    /// Phase index the reel may hold before
    pub hold_at: Option<usize>,
    pub gate: HoldGate,
    pub extended: bool,
    pub extra_rows: u32,
    pub drop_distance_px: f64,
}

impl ReelTimeline {
    /// Build the timeline for `reel`
    ///
    /// Turbo scales base durations first; anticipation extension is added
    /// on top and converted to whole extra rows. A skip already active
    /// at build time yields the collapsed plan directly.
    pub fn build(
        config: &ReelDropConfig,
        reel: u8,
        rows: u8,
        plan: &AnticipationPlan,
        profile: TimingProfile,
        skip: bool,
    ) -> Self {
        let pitch = config.cell_pitch_px;
        let speed = config.base_speed_px_per_ms;
        let scale = profile.duration_scale(config.turbo_scale);
        let start_delay_ms = if profile.is_fast() || skip {
            0.0
        } else {
            reel as f64 * config.start_stagger_ms
        };

        if skip {
            return Self {
                reel,
                start_delay_ms,
                phases: vec![MotionPhase::collapse(f64::INFINITY, rows, config)],
                hold_at: None,
                gate: HoldGate::default(),
                extended: false,
                extra_rows: 0,
                drop_distance_px: rows as f64 * pitch,
            };
        }

        let extended = plan.is_extended(reel);
        let base_rows = config.filler_rows + rows as u32;
        let base_ms = base_rows as f64 * pitch / speed * scale;
        let anticipation_ms = if extended { config.anticipation_extra_ms } else { 0.0 };
        let extra_ms = config.stop_interval_ms * reel as f64 * scale + anticipation_ms;
        let extra_rows = ((extra_ms * speed / pitch).ceil() as u32).min(config.max_extra_rows);

        let drop_distance_px = (base_rows + extra_rows) as f64 * pitch + config.wind_up_px;
        let drop_ms = base_ms + extra_ms;

        let mut phases = vec![MotionPhase::new(
            PhaseKind::WindUp,
            -config.wind_up_px,
            config.wind_up_ms * scale,
            Easing::EaseOut,
        )];

        let gated = plan.has_extension() && reel > 0;
        let hold_at = if extended {
            let lead_px = drop_distance_px * config.anticipation_distance_split;
            let lead_ms = drop_ms * config.anticipation_duration_split;
            phases.push(MotionPhase::new(PhaseKind::Drop, lead_px, lead_ms, Easing::Linear));
            phases.push(MotionPhase::new(
                PhaseKind::DropTail,
                drop_distance_px - lead_px,
                drop_ms - lead_ms,
                Easing::EaseOut,
            ));
            Some(2)
        } else if gated {
            let tail_px = ((rows as f64 + 1.0) * pitch).min(drop_distance_px);
            let tail_ms = if drop_distance_px > 0.0 {
                drop_ms * tail_px / drop_distance_px
            } else {
                0.0
            };
            phases.push(MotionPhase::new(
                PhaseKind::Drop,
                drop_distance_px - tail_px,
                drop_ms - tail_ms,
                Easing::Linear,
            ));
            phases.push(MotionPhase::new(PhaseKind::DropTail, tail_px, tail_ms, Easing::Linear));
            Some(2)
        } else {
            phases.push(MotionPhase::new(PhaseKind::Drop, drop_distance_px, drop_ms, Easing::Linear));
            None
        };

        let settle_ms = config.settle_ms * scale / 2.0;
        phases.push(MotionPhase::new(
            PhaseKind::SettleDown,
            config.settle_bounce_px,
            settle_ms,
            Easing::EaseOut,
        ));
        phases.push(MotionPhase::new(
            PhaseKind::SettleUp,
            -config.settle_bounce_px,
            settle_ms,
            Easing::EaseIn,
        ));

        let gate = HoldGate {
            stage: if extended { plan.hold_key(reel) } else { None },
            previous_reel: gated.then(|| reel - 1),
        };

        Self {
            reel,
            start_delay_ms,
            phases,
            hold_at,
            gate,
            extended,
            extra_rows,
            drop_distance_px,
        }
    }

    /// Phase time without holds (ms)
    pub fn motion_ms(&self) -> f64 {
        self.phases.iter().map(|p| p.duration_ms).sum()
    }

    /// Earliest landing time relative to the run start (ms)
    pub fn landing_ms(&self) -> f64 {
        self.start_delay_ms + self.motion_ms()
    }

    pub fn may_hold(&self) -> bool {
        self.hold_at.is_some() && !self.gate.is_unconditional()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SymbolRules;
    use crate::grid::Grid;
    use approx::assert_relative_eq;

    fn plan(columns: Vec<Vec<u32>>) -> AnticipationPlan {
        AnticipationPlan::from_grid(&Grid::from_columns(columns).unwrap(), &SymbolRules::default())
    }

    fn no_scatter_plan() -> AnticipationPlan {
        plan(vec![vec![1, 2, 3]; 5])
    }

    fn scatter_plan() -> AnticipationPlan {
        plan(vec![
            vec![3, 12, 4],
            vec![5, 6, 7],
            vec![2, 12, 8],
            vec![9, 4, 3],
            vec![4, 12, 3],
        ])
    }

    #[test]
    fn test_plain_reel_distance() {
        let config = ReelDropConfig::default();
        let tl = ReelTimeline::build(&config, 0, 3, &no_scatter_plan(), TimingProfile::Normal, false);
        // (6 filler + 3 rows) × 120 + 24 wind-up
        assert_relative_eq!(tl.drop_distance_px, 1104.0);
        assert_eq!(tl.extra_rows, 0);
        assert!(tl.hold_at.is_none());
        let kinds: Vec<PhaseKind> = tl.phases.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![PhaseKind::WindUp, PhaseKind::Drop, PhaseKind::SettleDown, PhaseKind::SettleUp]
        );
    }

    #[test]
    fn test_stop_interval_adds_rows() {
        let config = ReelDropConfig::default();
        let tl = ReelTimeline::build(&config, 2, 3, &no_scatter_plan(), TimingProfile::Normal, false);
        // 300ms × 2.4px/ms = 720px = 6 rows
        assert_eq!(tl.extra_rows, 6);
        assert_relative_eq!(tl.start_delay_ms, 160.0);
    }

    #[test]
    fn test_extended_reel_split() {
        let config = ReelDropConfig::default();
        let tl = ReelTimeline::build(&config, 4, 3, &scatter_plan(), TimingProfile::Normal, false);
        assert!(tl.extended);
        assert_eq!(tl.hold_at, Some(2));
        assert_eq!(tl.gate.previous_reel, Some(3));
        assert_eq!(tl.gate.stage.map(|k| k.column), Some(4));

        // 600ms stagger + 1800ms anticipation = 2400ms × 2.4 / 120 = 48 rows, capped
        assert_eq!(tl.extra_rows, 40);

        let lead = tl.phases[1];
        let tail = tl.phases[2];
        assert_eq!(tail.kind, PhaseKind::DropTail);
        assert_eq!(tail.easing, Easing::EaseOut);
        assert_relative_eq!(lead.distance_px / tl.drop_distance_px, 0.85, epsilon = 1e-9);
        assert_relative_eq!(
            lead.duration_ms / (lead.duration_ms + tail.duration_ms),
            0.75,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_gated_reel_after_extension_round() {
        let config = ReelDropConfig::default();
        let tl = ReelTimeline::build(&config, 3, 3, &scatter_plan(), TimingProfile::Normal, false);
        assert!(!tl.extended);
        assert!(tl.may_hold());
        assert_eq!(tl.gate.stage, None);
        assert_relative_eq!(tl.phases[2].distance_px, 480.0);

        let first = ReelTimeline::build(&config, 0, 3, &scatter_plan(), TimingProfile::Normal, false);
        assert!(!first.may_hold());
    }

    #[test]
    fn test_turbo_scales_before_extension() {
        let config = ReelDropConfig::default();
        let normal = ReelTimeline::build(&config, 4, 3, &scatter_plan(), TimingProfile::Normal, false);
        let turbo = ReelTimeline::build(&config, 4, 3, &scatter_plan(), TimingProfile::Turbo, false);
        assert_eq!(turbo.start_delay_ms, 0.0);
        assert!(turbo.motion_ms() < normal.motion_ms());
        // Anticipation time is not compressed
        assert!(turbo.motion_ms() > config.anticipation_extra_ms);
    }

    #[test]
    fn test_skip_at_build_is_collapsed() {
        let config = ReelDropConfig::default();
        let tl = ReelTimeline::build(&config, 4, 3, &scatter_plan(), TimingProfile::Turbo, true);
        assert_eq!(tl.phases.len(), 1);
        assert_eq!(tl.phases[0].kind, PhaseKind::SkipCollapse);
        assert_relative_eq!(tl.phases[0].distance_px, 360.0);
        assert_relative_eq!(tl.phases[0].duration_ms, 150.0);
        assert!(!tl.may_hold());
    }

    #[test]
    fn test_collapse_uses_visible_distance() {
        let config = ReelDropConfig::default();
        let short = MotionPhase::collapse(96.0, 3, &config);
        assert_relative_eq!(short.duration_ms, 40.0);
        let long = MotionPhase::collapse(5000.0, 3, &config);
        assert_relative_eq!(long.distance_px, 360.0);
    }

    #[test]
    fn test_remaining_drop_ignores_settle_and_wind_up() {
        let config = ReelDropConfig::default();
        let tl = ReelTimeline::build(&config, 0, 3, &no_scatter_plan(), TimingProfile::Normal, false);
        assert_relative_eq!(remaining_drop(&tl.phases), tl.drop_distance_px);
        assert_relative_eq!(remaining_drop(&tl.phases[2..]), 0.0);
    }
}
