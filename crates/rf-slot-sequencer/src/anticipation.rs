//! Scatter anticipation state machine
//!
//! Tracks scatters revealed reel by reel and escalates through the
//! thresholds 3 → 4 → 5. The per-grid plan (which reel carries which
//! threshold, which reels get a longer drop) is computed once when the grid
//! arrives and reused by every reel stop of the round.
//!
//! ```text
//! Idle ──schedule──> Armed(target) ──start──> Staged(target, reel)
//!   ^                                               │
//!   └───────────── reel ≥ stage reel stops ─────────┘
//! ```

use serde::{Deserialize, Serialize};

use rf_stage::ScatterThreshold;

use crate::config::SymbolRules;
use crate::grid::{Grid, ScatterPosition};

// ═══════════════════════════════════════════════════════════════════════════════
// PLAN
// ═══════════════════════════════════════════════════════════════════════════════

/// Identity of one anticipation stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageKey {
    pub threshold: ScatterThreshold,
    /// Reel carrying the Nth scatter
    pub column: u8,
    pub row: u8,
}

/// Threshold mapped onto the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnticipationTarget {
    pub threshold: ScatterThreshold,
    pub column: u8,
    pub row: u8,
    /// Enough scatters land left of `column` to make this reel worth holding
    pub extends: bool,
}

impl AnticipationTarget {
    pub fn key(&self) -> StageKey {
        StageKey {
            threshold: self.threshold,
            column: self.column,
            row: self.row,
        }
    }
}

/// Per-grid anticipation plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnticipationPlan {
    pub scatters: Vec<ScatterPosition>,
    pub targets: Vec<AnticipationTarget>,
    /// Reels whose drop is lengthened, ascending
    pub extended_reels: Vec<u8>,
    /// Scatter count per reel
    pub scatter_tally: Vec<u8>,
}

impl AnticipationPlan {
    pub fn from_grid(grid: &Grid, rules: &SymbolRules) -> Self {
        let scatters = grid.scatter_positions(rules);
        let scatter_tally = grid.scatter_tally(rules);

        let targets: Vec<AnticipationTarget> = ScatterThreshold::ALL
            .iter()
            .filter_map(|threshold| {
                let nth = scatters.get(threshold.count() as usize - 1)?;
                let before = scatters.iter().filter(|s| s.col < nth.col).count();
                Some(AnticipationTarget {
                    threshold: *threshold,
                    column: nth.col,
                    row: nth.row,
                    extends: before >= threshold.count() as usize - 1,
                })
            })
            .collect();

        let mut extended_reels: Vec<u8> = targets
            .iter()
            .filter(|t| t.extends)
            .map(|t| t.column)
            .collect();
        extended_reels.dedup();

        Self {
            scatters,
            targets,
            extended_reels,
            scatter_tally,
        }
    }

    pub fn is_extended(&self, reel: u8) -> bool {
        self.extended_reels.contains(&reel)
    }

    pub fn has_extension(&self) -> bool {
        !self.extended_reels.is_empty()
    }

    /// Stage a held reel waits for (lowest extending threshold on that reel)
    pub fn hold_key(&self, reel: u8) -> Option<StageKey> {
        self.targets
            .iter()
            .find(|t| t.extends && t.column == reel)
            .map(AnticipationTarget::key)
    }

    pub fn target(&self, threshold: ScatterThreshold) -> Option<&AnticipationTarget> {
        self.targets.iter().find(|t| t.threshold == threshold)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATE MACHINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AnticipationState {
    #[default]
    Idle,
    /// Stage scheduled, waiting for the un-dim gap
    Armed { target: ScatterThreshold },
    /// Stage running for the reel being held
    Staged { target: ScatterThreshold, reel: u8 },
}

/// Stage to open after a delay
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledStage {
    pub key: StageKey,
    pub delay_ms: f64,
}

/// Result of one reel stop
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReelStopOutcome {
    /// Stage closed by this stop
    pub closed: Option<StageKey>,
    /// Next stage to open
    pub scheduled: Option<ScheduledStage>,
}

/// Result of a stage start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStart {
    /// Opened; `replaced` is a stage that had to be closed first
    Started { replaced: Option<StageKey> },
    /// Same key already running
    AlreadyActive,
    /// Its reel already stopped
    Stale,
}

/// Scatter anticipation controller
#[derive(Debug, Default)]
pub struct ScatterAnticipation {
    plan: AnticipationPlan,
    state: AnticipationState,
    revealed: u8,
    highest_stopped: Option<u8>,
    active: Option<StageKey>,
    pending: Option<StageKey>,
    fired: Vec<StageKey>,
    round_active: bool,
}

impl ScatterAnticipation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for a new grid and memoize its plan
    pub fn on_new_grid(&mut self, grid: &Grid, rules: &SymbolRules) -> &AnticipationPlan {
        self.plan = AnticipationPlan::from_grid(grid, rules);
        self.state = AnticipationState::Idle;
        self.revealed = 0;
        self.highest_stopped = None;
        self.active = None;
        self.pending = None;
        self.fired.clear();
        self.round_active = self.plan.has_extension();
        if self.round_active {
            log::debug!(
                "[Anticipation] {} scatters, extended reels {:?}",
                self.plan.scatters.len(),
                self.plan.extended_reels
            );
        }
        &self.plan
    }

    pub fn plan(&self) -> &AnticipationPlan {
        &self.plan
    }

    pub fn state(&self) -> AnticipationState {
        self.state
    }

    pub fn revealed(&self) -> u8 {
        self.revealed
    }

    pub fn active_stage(&self) -> Option<StageKey> {
        self.active
    }

    /// Round-level "anticipation active" flag
    pub fn is_round_active(&self) -> bool {
        self.round_active
    }

    /// Stages opened this round, in order
    pub fn fired(&self) -> &[StageKey] {
        &self.fired
    }

    /// Reel `reel` settled. `fast` collapses the un-dim gap; `skip` schedules nothing.
    pub fn on_reel_stop(&mut self, reel: u8, fast: bool, skip: bool, undim_gap_ms: f64) -> ReelStopOutcome {
        let mut outcome = ReelStopOutcome::default();

        self.revealed = self
            .revealed
            .saturating_add(self.plan.scatter_tally.get(reel as usize).copied().unwrap_or(0));
        self.highest_stopped = Some(self.highest_stopped.map_or(reel, |h| h.max(reel)));

        if let Some(active) = self.active.filter(|a| a.column <= reel) {
            outcome.closed = Some(active);
            self.active = None;
            self.state = AnticipationState::Idle;
            log::debug!("[Anticipation] stage {:?} closed by reel {reel}", active.threshold);
        }

        if self.pending.is_some_and(|p| p.column <= reel) {
            self.pending = None;
            self.state = AnticipationState::Idle;
        }

        if skip || self.active.is_some() || self.pending.is_some() {
            return outcome;
        }

        let revealed = self.revealed;
        let next = self
            .plan
            .targets
            .iter()
            .find(|t| t.threshold.count() > revealed)
            .filter(|t| {
                t.column > reel
                    && revealed + 1 >= t.threshold.count()
                    && !self.fired.contains(&t.key())
            });

        if let Some(target) = next {
            let key = target.key();
            self.pending = Some(key);
            self.state = AnticipationState::Armed {
                target: key.threshold,
            };
            outcome.scheduled = Some(ScheduledStage {
                key,
                delay_ms: if fast { 0.0 } else { undim_gap_ms },
            });
            log::debug!(
                "[Anticipation] {revealed} revealed, stage {:?} armed for reel {}",
                key.threshold,
                key.column
            );
        }

        outcome
    }

    /// Open a stage (idempotent per key)
    pub fn start_stage(&mut self, key: StageKey) -> StageStart {
        if self.active == Some(key) {
            return StageStart::AlreadyActive;
        }
        if self.highest_stopped.is_some_and(|h| h >= key.column) {
            if self.pending == Some(key) {
                self.pending = None;
                self.state = AnticipationState::Idle;
            }
            return StageStart::Stale;
        }

        let replaced = self.active.take();
        if self.pending == Some(key) {
            self.pending = None;
        }
        self.active = Some(key);
        self.fired.push(key);
        self.state = AnticipationState::Staged {
            target: key.threshold,
            reel: key.column,
        };
        StageStart::Started { replaced }
    }

    /// Last reel stopped: close whatever is open
    pub fn finish(&mut self) -> Option<StageKey> {
        let closed = self.active.take();
        self.pending = None;
        self.state = AnticipationState::Idle;
        self.round_active = false;
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const S: u32 = 12;

    fn grid(columns: Vec<Vec<u32>>) -> Grid {
        Grid::from_columns(columns).unwrap()
    }

    fn three_scatter_grid() -> Grid {
        grid(vec![
            vec![3, S, 4],
            vec![5, 6, 7],
            vec![2, S, 8],
            vec![9, 4, 3],
            vec![4, S, 3],
        ])
    }

    #[test]
    fn test_plan_three_scatters() {
        let plan = AnticipationPlan::from_grid(&three_scatter_grid(), &SymbolRules::default());
        assert_eq!(plan.targets.len(), 1);
        let target = plan.target(ScatterThreshold::Three).unwrap();
        assert_eq!((target.column, target.row), (4, 1));
        assert!(target.extends);
        assert_eq!(plan.extended_reels, vec![4]);
        assert_eq!(plan.hold_key(4).unwrap().threshold, ScatterThreshold::Three);
        assert!(plan.hold_key(3).is_none());
    }

    #[test]
    fn test_fewer_than_three_stays_idle() {
        let g = grid(vec![
            vec![3, S, 4],
            vec![5, 6, 7],
            vec![2, 3, 8],
            vec![9, 4, 3],
            vec![4, S, 3],
        ]);
        let mut machine = ScatterAnticipation::new();
        assert!(!machine.on_new_grid(&g, &SymbolRules::default()).has_extension());
        for reel in 0..5 {
            let outcome = machine.on_reel_stop(reel, false, false, 350.0);
            assert_eq!(outcome, ReelStopOutcome::default());
        }
        assert_eq!(machine.state(), AnticipationState::Idle);
    }

    #[test]
    fn test_same_column_reveal_does_not_extend() {
        let g = grid(vec![
            vec![S, 1, 2],
            vec![5, 6, 7],
            vec![2, 3, 8],
            vec![S, S, 3],
            vec![4, 5, 3],
        ]);
        let plan = AnticipationPlan::from_grid(&g, &SymbolRules::default());
        let target = plan.target(ScatterThreshold::Three).unwrap();
        assert_eq!(target.column, 3);
        assert!(!target.extends);
        assert!(!plan.has_extension());
    }

    #[test]
    fn test_stage_scheduled_after_second_scatter() {
        let mut machine = ScatterAnticipation::new();
        machine.on_new_grid(&three_scatter_grid(), &SymbolRules::default());

        assert!(machine.on_reel_stop(0, false, false, 350.0).scheduled.is_none());
        assert!(machine.on_reel_stop(1, false, false, 350.0).scheduled.is_none());
        let outcome = machine.on_reel_stop(2, false, false, 350.0);
        let scheduled = outcome.scheduled.unwrap();
        assert_eq!(scheduled.key.column, 4);
        assert_eq!(scheduled.delay_ms, 350.0);
        assert!(matches!(machine.state(), AnticipationState::Armed { .. }));

        assert_eq!(
            machine.start_stage(scheduled.key),
            StageStart::Started { replaced: None }
        );
        assert_eq!(machine.start_stage(scheduled.key), StageStart::AlreadyActive);

        // Reel 3 is behind the stage reel: stage stays open
        assert!(machine.on_reel_stop(3, false, false, 350.0).closed.is_none());
        let closed = machine.on_reel_stop(4, false, false, 350.0).closed;
        assert_eq!(closed, Some(scheduled.key));
        assert_eq!(machine.revealed(), 3);
        assert!(machine.finish().is_none());
        assert!(!machine.is_round_active());
    }

    #[test]
    fn test_turbo_collapses_gap_and_skip_schedules_nothing() {
        let mut machine = ScatterAnticipation::new();
        machine.on_new_grid(&three_scatter_grid(), &SymbolRules::default());
        machine.on_reel_stop(0, true, false, 350.0);
        let scheduled = machine.on_reel_stop(2, true, false, 350.0).scheduled.unwrap();
        assert_eq!(scheduled.delay_ms, 0.0);

        let mut skipped = ScatterAnticipation::new();
        skipped.on_new_grid(&three_scatter_grid(), &SymbolRules::default());
        skipped.on_reel_stop(0, false, true, 350.0);
        assert!(skipped.on_reel_stop(2, false, true, 350.0).scheduled.is_none());
    }

    #[test]
    fn test_thresholds_fire_in_order() {
        let g = grid(vec![
            vec![S, 1, 2],
            vec![S, 6, 7],
            vec![2, S, 8],
            vec![9, S, 3],
            vec![4, 5, S],
        ]);
        let mut machine = ScatterAnticipation::new();
        let plan = machine.on_new_grid(&g, &SymbolRules::default()).clone();
        assert_eq!(plan.extended_reels, vec![2, 3, 4]);

        for reel in 0..5u8 {
            let outcome = machine.on_reel_stop(reel, false, false, 0.0);
            if let Some(scheduled) = outcome.scheduled {
                assert!(scheduled.key.column > reel);
                machine.start_stage(scheduled.key);
            }
        }
        let order: Vec<u8> = machine.fired().iter().map(|k| k.threshold.count()).collect();
        assert_eq!(order, vec![3, 4, 5]);
    }

    #[test]
    fn test_stale_stage_rejected() {
        let mut machine = ScatterAnticipation::new();
        machine.on_new_grid(&three_scatter_grid(), &SymbolRules::default());
        machine.on_reel_stop(0, false, false, 350.0);
        let key = machine.on_reel_stop(2, false, false, 350.0).scheduled.unwrap().key;
        machine.on_reel_stop(4, false, false, 350.0);
        assert_eq!(machine.start_stage(key), StageStart::Stale);
        assert!(machine.fired().is_empty());
    }

    #[test]
    fn test_new_grid_invalidates_plan() {
        let mut machine = ScatterAnticipation::new();
        machine.on_new_grid(&three_scatter_grid(), &SymbolRules::default());
        machine.on_reel_stop(0, false, false, 350.0);
        let empty = grid(vec![vec![1, 2, 3]; 5]);
        assert!(machine.on_new_grid(&empty, &SymbolRules::default()).targets.is_empty());
        assert_eq!(machine.revealed(), 0);
        assert!(machine.active_stage().is_none());
    }
}
