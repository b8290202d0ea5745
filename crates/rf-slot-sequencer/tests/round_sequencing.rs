//! Round Sequencing Test Suite
//!
//! End-to-end checks of the round flow:
//! - Payline resolution (exact count, longest streak, bidirectional runs)
//! - Anticipation escalation and reel hold-and-spin release
//! - Skip / turbo compression and completion tokens
//! - Win sequence stop and critical lock lifecycle

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use rf_slot_sequencer::{
    Cell, Collaborators, Grid, LineShape, PaylineResolver, RoundContext, RoundOutcome, RoundReport,
    RoundResult, RoundSequencer, ScatterAnticipation, SequencerConfig, SpecialEffect, SymbolRules,
    WinDescriptor, WinSequenceConfig, WinSequenceController, WinlineSet,
};
use rf_stage::{
    HoldRelease, ScatterThreshold, SkipRefusal, Stage, TimingProfile, WinDisplayMode, WinStopReason,
};

// ═══════════════════════════════════════════════════════════════════════════════
// TEST FIXTURES
// ═══════════════════════════════════════════════════════════════════════════════

fn config() -> SequencerConfig {
    let mut config = SequencerConfig::default();
    config.symbols.filler_seed = Some(42);
    config
}

fn sequencer(config: SequencerConfig) -> RoundSequencer {
    RoundSequencer::new(config, Collaborators::silent()).unwrap()
}

fn resolver() -> PaylineResolver {
    PaylineResolver::new(SymbolRules::default(), WinlineSet::standard_5x3())
}

fn rows(rows: Vec<Vec<u32>>) -> Grid {
    Grid::from_rows(rows).unwrap()
}

/// Scatters (12) at reels 0, 2 and 4, middle row
fn scatter_024() -> Grid {
    rows(vec![
        vec![4, 5, 6, 7, 8],
        vec![12, 6, 12, 5, 12],
        vec![3, 8, 2, 7, 6],
    ])
}

/// One scatter on every reel, middle row
fn scatter_every_reel() -> Grid {
    rows(vec![
        vec![4, 5, 6, 7, 8],
        vec![12, 12, 12, 12, 12],
        vec![3, 8, 2, 7, 6],
    ])
}

fn plain_grid() -> Grid {
    rows(vec![
        vec![4, 4, 4, 4, 7],
        vec![4, 4, 4, 8, 9],
        vec![2, 3, 5, 6, 9],
    ])
}

fn completed(outcome: RoundOutcome) -> Box<RoundReport> {
    match outcome {
        RoundOutcome::Completed(report) => report,
        RoundOutcome::Rejected(e) => panic!("round rejected: {e}"),
    }
}

fn event_index(report: &RoundReport, stage: &Stage) -> usize {
    report
        .trace
        .events
        .iter()
        .position(|e| &e.stage == stage)
        .unwrap_or_else(|| panic!("missing {stage:?}"))
}

// ═══════════════════════════════════════════════════════════════════════════════
// PAYLINE RESOLVER
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_resolver_prefers_exact_count() {
    let line = resolver()
        .resolve(&plain_grid(), &WinDescriptor::new(1, 4, 3))
        .unwrap();
    // Template 1 (top row) holds four 4s; template 0 (middle) holds exactly three
    assert_eq!(line.shape, LineShape::Template(0));
    assert_eq!(line.streak_len(), 3);
}

#[test]
fn test_resolver_falls_back_to_longest_streak() {
    let line = resolver()
        .resolve(&plain_grid(), &WinDescriptor::new(0, 4, 5))
        .unwrap();
    assert_eq!(line.shape, LineShape::Template(1));
    assert_eq!(line.streak_len(), 4);
}

#[test]
fn test_resolver_is_deterministic() {
    let resolver = resolver();
    let wins = vec![
        WinDescriptor::new(1, 4, 3),
        WinDescriptor::new(0, 4, 5),
        WinDescriptor::new(7, 4, 4),
    ];
    let first = resolver.resolve_all(&plain_grid(), &wins);
    for _ in 0..10 {
        assert_eq!(resolver.resolve_all(&plain_grid(), &wins), first);
    }
}

#[test]
fn test_bidirectional_mid_line_pair() {
    let grid = rows(vec![
        vec![5, 6, 1, 1, 7],
        vec![2, 3, 4, 5, 6],
        vec![7, 8, 9, 10, 2],
    ]);
    let line = resolver()
        .resolve(&grid, &WinDescriptor::new(1, 1, 2))
        .unwrap();
    assert_eq!(line.shape, LineShape::Template(1));
    assert_eq!(line.cells, vec![Cell::new(2, 0, 1), Cell::new(3, 0, 1)]);
}

#[test]
fn test_minimum_streak_lengths_hold() {
    let grid = rows(vec![
        vec![5, 5, 1, 6, 1],
        vec![2, 3, 4, 5, 6],
        vec![7, 8, 9, 10, 2],
    ]);
    let resolver = resolver();
    // Ordinary symbol 5 only reaches two cells from reel 0
    assert!(resolver.resolve(&grid, &WinDescriptor::new(1, 5, 2)).is_none());
    // Bidirectional symbol 1 never forms a pair
    assert!(resolver.resolve(&grid, &WinDescriptor::new(1, 1, 2)).is_none());

    for line in resolver.resolve_all(&plain_grid(), &[WinDescriptor::new(1, 4, 3)]) {
        assert!(line.streak_len() >= 3);
    }
}

#[test]
fn test_unresolvable_win_skipped_not_fatal() {
    let wins = vec![WinDescriptor::new(3, 9, 3), WinDescriptor::new(1, 4, 3)];
    let lines = resolver().resolve_all(&plain_grid(), &wins);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].descriptor.symbol, 4);
}

// ═══════════════════════════════════════════════════════════════════════════════
// ANTICIPATION + HOLD
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_scatters_024_target_three_on_reel_four() {
    let mut anticipation = ScatterAnticipation::new();
    let plan = anticipation.on_new_grid(&scatter_024(), &SymbolRules::default());
    let target = plan.target(ScatterThreshold::Three).unwrap();
    assert_eq!(target.column, 4);
    assert_eq!(target.row, 1);
    assert!(plan.is_extended(4));
}

#[tokio::test(start_paused = true)]
async fn test_reel_four_held_until_stage_three_active() {
    let mut config = config();
    // Long un-dim gap so reel 4 is already spinning in place when the stage opens
    config.anticipation.undim_gap_ms = 5000.0;
    let mut seq = sequencer(config);

    let report = completed(seq.run_round(RoundResult::new(scatter_024())).await);

    let reel4 = report.reels.iter().find(|r| r.reel == 4).unwrap();
    assert_eq!(reel4.held, Some(HoldRelease::StageActive));
    assert!(reel4.recycled > 0);

    let hold = event_index(&report, &Stage::ReelHoldStart { reel_index: 4 });
    let stage = event_index(
        &report,
        &Stage::AnticipationStageStart {
            target: ScatterThreshold::Three,
            reel_index: 4,
        },
    );
    let release = event_index(
        &report,
        &Stage::ReelHoldRelease {
            reel_index: 4,
            released_by: HoldRelease::StageActive,
        },
    );
    assert!(hold < stage && stage < release);
    assert_eq!(report.stop_order, vec![0, 1, 2, 3, 4]);
    assert!(report.trace.validate().is_valid(5));
}

#[tokio::test(start_paused = true)]
async fn test_targets_escalate_and_stay_ahead_of_stopped_reels() {
    let mut seq = sequencer(config());
    let report = completed(seq.run_round(RoundResult::new(scatter_every_reel())).await);

    let thresholds: Vec<ScatterThreshold> = report.stages.iter().map(|k| k.threshold).collect();
    assert_eq!(
        thresholds,
        vec![ScatterThreshold::Three, ScatterThreshold::Four, ScatterThreshold::Five]
    );

    let mut highest_stopped: Option<u8> = None;
    for event in &report.trace.events {
        match &event.stage {
            Stage::ReelStop { reel_index, .. } => {
                highest_stopped = Some(highest_stopped.map_or(*reel_index, |h| h.max(*reel_index)));
            }
            Stage::AnticipationStageStart { reel_index, .. } => {
                assert!(highest_stopped.is_none_or(|h| h < *reel_index));
            }
            _ => {}
        }
    }
    let validation = report.trace.validate();
    assert!(validation.anticipation_ascending);
    assert_eq!(validation.anticipation_opened, 3);
    assert_eq!(validation.anticipation_closed, 3);
}

#[tokio::test(start_paused = true)]
async fn test_fewer_than_three_scatters_never_extend() {
    let grid = rows(vec![
        vec![4, 5, 6, 7, 8],
        vec![12, 6, 12, 5, 9],
        vec![3, 8, 2, 7, 6],
    ]);
    let mut seq = sequencer(config());
    let report = completed(seq.run_round(RoundResult::new(grid)).await);
    assert!(report.extended_reels.is_empty());
    assert!(report.stages.is_empty());
    assert!(report.reels.iter().all(|r| r.held.is_none()));
}

// ═══════════════════════════════════════════════════════════════════════════════
// SKIP + TURBO
// ═══════════════════════════════════════════════════════════════════════════════

/// Request skip as soon as the first reel starts spinning
fn skip_on_first_spin(ctx: &RoundContext) -> tokio::task::JoinHandle<bool> {
    let ctx = ctx.clone();
    let mut rx = ctx.bus().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            if matches!(event.stage, Stage::ReelSpinStart { .. }) {
                return ctx.request_skip().is_ok();
            }
        }
        false
    })
}

#[tokio::test(start_paused = true)]
async fn test_turbo_skip_plain_round_is_fast_and_complete() {
    let mut seq = sequencer(config());
    seq.set_turbo(true);
    let skipper = skip_on_first_spin(&seq.context());

    let report = completed(seq.run_round(RoundResult::new(plain_grid())).await);
    assert!(skipper.await.unwrap());

    assert!(report.skip_used);
    assert!(report.all_reels_completed());
    assert!(report.reels.iter().all(|r| r.collapsed));
    assert_eq!(report.trace.count("reel_hold_start"), 0);
    assert_eq!(report.trace.validate().duplicate_reel_stops, 0);
    assert_eq!(report.trace.timing_profile, Some(TimingProfile::Turbo));

    let all_stopped = report
        .trace
        .events
        .iter()
        .find(|e| e.stage == Stage::AllReelsStop)
        .unwrap();
    // One frame to notice + one 150ms visible-rows collapse
    assert!(all_stopped.timestamp_ms <= 200.0, "took {}ms", all_stopped.timestamp_ms);
}

#[tokio::test(start_paused = true)]
async fn test_skip_refused_during_anticipation_stage() {
    let mut config = config();
    config.anticipation.undim_gap_ms = 0.0;
    let mut seq = sequencer(config);
    let ctx = seq.context();

    let refusals = Arc::new(Mutex::new(Vec::new()));
    let watcher = {
        let ctx = ctx.clone();
        let refusals = refusals.clone();
        let mut rx = ctx.bus().subscribe();
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                if matches!(event.stage, Stage::AnticipationStageStart { .. }) {
                    refusals.lock().push(ctx.request_skip());
                    return;
                }
            }
        })
    };

    let report = completed(seq.run_round(RoundResult::new(scatter_024())).await);
    watcher.await.unwrap();

    assert_eq!(
        *refusals.lock(),
        vec![Err(SkipRefusal::AnticipationStage)]
    );
    assert!(!report.skip_used);
    assert!(report.all_reels_completed());
}

#[tokio::test(start_paused = true)]
async fn test_skip_during_hold_resolves_every_token_once() {
    let mut config = config();
    config.anticipation.undim_gap_ms = 5000.0;
    let mut seq = sequencer(config);
    let ctx = seq.context();

    let skipper = {
        let ctx = ctx.clone();
        let mut rx = ctx.bus().subscribe();
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                if event.stage == (Stage::ReelHoldStart { reel_index: 4 }) {
                    return ctx.request_skip().is_ok();
                }
            }
            false
        })
    };

    let report = completed(seq.run_round(RoundResult::new(scatter_024())).await);
    assert!(skipper.await.unwrap());

    let reel4 = report.reels.iter().find(|r| r.reel == 4).unwrap();
    assert_eq!(reel4.held, Some(HoldRelease::Skip));
    assert!(reel4.collapsed);
    assert!(report.all_reels_completed());
    assert_eq!(report.trace.count("reel_stop"), 5);
    assert_eq!(report.trace.validate().duplicate_reel_stops, 0);
    // Stage 3 was pending when skip arrived; it never opens
    assert_eq!(report.trace.count("anticipation_stage_start"), 0);
}

// ═══════════════════════════════════════════════════════════════════════════════
// WIN SEQUENCE + CRITICAL LOCK
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn test_exactly_one_stop_with_zero_wins() {
    let mut seq = sequencer(config());
    let report = completed(seq.run_round(RoundResult::new(plain_grid())).await);
    assert_eq!(report.trace.count("win_sequence_stop"), 1);
    assert_eq!(report.trace.count("win_sequence_start"), 0);
    assert!(
        report
            .trace
            .events
            .iter()
            .any(|e| e.stage == Stage::WinSequenceStop { reason: WinStopReason::NoWins })
    );
}

#[tokio::test(start_paused = true)]
async fn test_exactly_one_stop_single_pass() {
    let mut seq = sequencer(config());
    let result = RoundResult::new(plain_grid())
        .with_wins(vec![WinDescriptor::new(1, 4, 3), WinDescriptor::new(0, 4, 5)])
        .with_scatter_transition(true);
    let report = completed(seq.run_round(result).await);
    assert_eq!(report.win_mode, WinDisplayMode::SinglePass);
    assert_eq!(report.trace.count("win_line_show"), 2);
    assert_eq!(report.trace.count("win_sequence_stop"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_exactly_one_stop_on_manual_interrupt() {
    let bus = rf_slot_sequencer::SignalBus::new();
    let lines = resolver().resolve_all(
        &plain_grid(),
        &[WinDescriptor::new(1, 4, 3), WinDescriptor::new(0, 4, 5)],
    );
    let handle = WinSequenceController::new(WinSequenceConfig::default()).start(
        lines,
        WinDisplayMode::Looping,
        TimingProfile::Normal,
        &bus,
        Arc::new(rf_slot_sequencer::SilentPorts),
    );
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!handle.is_stopped());
    let run = handle.interrupt().await;
    assert!(run.interrupted);
    assert_eq!(bus.count("win_sequence_stop"), 1);
    assert!(
        bus.trace_snapshot()
            .events
            .iter()
            .any(|e| e.stage == Stage::WinSequenceStop { reason: WinStopReason::Interrupted })
    );
}

#[tokio::test(start_paused = true)]
async fn test_lock_never_held_after_round_completion() {
    let mut seq = sequencer(config());
    let ctx = seq.context();

    let observed = Arc::new(Mutex::new(Vec::new()));
    let watcher = {
        let ctx = ctx.clone();
        let observed = observed.clone();
        let mut rx = ctx.bus().subscribe();
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                if matches!(event.stage, Stage::RoundEnd { .. }) {
                    observed.lock().push(ctx.lock().is_held());
                    return;
                }
            }
        })
    };

    let result = RoundResult::new(scatter_024())
        .with_wins(vec![WinDescriptor::new(1, 4, 3)])
        .with_effect(SpecialEffect::new("collector_burst", 1200.0))
        .with_effect(SpecialEffect::new("multiplier_reveal", 600.0));
    let report = completed(seq.run_round(result).await);
    watcher.await.unwrap();

    assert_eq!(*observed.lock(), vec![false]);
    assert!(!ctx.lock().is_held());
    assert!(report.effects.iter().all(|e| e.completed));
    let validation = report.trace.validate();
    assert_eq!(validation.critical_started, 2);
    assert_eq!(validation.critical_ended, 2);
}

#[tokio::test(start_paused = true)]
async fn test_new_grid_rejected_until_lock_released() {
    let mut seq = sequencer(config());
    let guard = seq.context().lock().try_acquire("bonus_intro").unwrap();
    assert!(matches!(
        seq.run_round(RoundResult::new(plain_grid())).await,
        RoundOutcome::Rejected(_)
    ));
    drop(guard);
    assert!(matches!(
        seq.run_round(RoundResult::new(plain_grid())).await,
        RoundOutcome::Completed(_)
    ));
}
