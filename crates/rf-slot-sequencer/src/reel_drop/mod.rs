//! Reel Drop Scheduler
//!
//! Runs one task per reel. Each task walks its precomputed timeline,
//! may park in a hold-and-spin loop before its final drop segment, and
//! resolves its completion token exactly once on every exit path. The
//! orchestrator side feeds reel stops to the anticipation machine and
//! opens/closes anticipation stages.
//!
//! ```text
//! reel task ──stop──> orchestrator ──on_reel_stop──> ScatterAnticipation
//!     ^                    │
//!     └── stage reached ───┘ (RoundContext)
//! ```

pub mod hold;
mod timeline;

pub use hold::{FillerConveyor, HoldLoop, PhaseOutcome, play_phase};
pub use timeline::*;

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

use rf_stage::{HoldRelease, Stage, TimingProfile};

use crate::anticipation::{AnticipationPlan, ScatterAnticipation, StageKey, StageStart};
use crate::config::{AnticipationTiming, ReelDropConfig, SequencerConfig};
use crate::context::RoundContext;
use crate::grid::Grid;
use crate::ports::{Collaborators, EffectPosition, ReelPresenter, VariantResolver};
use crate::symbols::FillerPool;
use crate::timing::ms;
use crate::token::{CompletionToken, wait_all};

const SOURCE: &str = "reel_drop";

/// What one reel went through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReelRun {
    pub reel: u8,
    /// Set when the reel entered its hold loop
    pub held: Option<HoldRelease>,
    /// Remaining motion was collapsed by skip
    pub collapsed: bool,
    /// Filler symbols recycled while held
    pub recycled: u32,
    /// Phases actually started, in order
    pub phases: Vec<PhaseKind>,
}

/// Result of one drop run
#[derive(Debug, Clone)]
pub struct DropReport {
    pub timelines: Vec<ReelTimeline>,
    pub reels: Vec<ReelRun>,
    /// Reels in the order they reported completion
    pub stop_order: Vec<u8>,
    /// Anticipation stages opened, in order
    pub stages: Vec<StageKey>,
    pub tokens: Vec<CompletionToken>,
    pub skip_used: bool,
    pub elapsed_ms: f64,
}

impl DropReport {
    pub fn all_resolved(&self) -> bool {
        self.tokens.iter().all(CompletionToken::is_resolved)
    }

    pub fn reel(&self, reel: u8) -> Option<&ReelRun> {
        self.reels.iter().find(|r| r.reel == reel)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPLETION GUARD
// ═══════════════════════════════════════════════════════════════════════════════

/// Resolves the reel token and reports the stop when dropped
///
/// Lives inside the reel task, so a panicking or aborted task still reports.
struct ReelCompletion {
    reel: u8,
    token: CompletionToken,
    stops: mpsc::UnboundedSender<u8>,
}

impl Drop for ReelCompletion {
    fn drop(&mut self) {
        if self.token.resolve() {
            // Closed receiver means the run itself was dropped
            let _ = self.stops.send(self.reel);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REEL TASK
// ═══════════════════════════════════════════════════════════════════════════════

struct ReelTask {
    timeline: ReelTimeline,
    rows: u8,
    symbols: Vec<u32>,
    scale: f64,
    config: Arc<ReelDropConfig>,
    ctx: RoundContext,
    tokens: Vec<CompletionToken>,
    pool: Arc<Mutex<FillerPool>>,
    presenter: Arc<dyn ReelPresenter>,
    completion: ReelCompletion,
}

impl ReelTask {
    async fn run(self) -> ReelRun {
        let reel = self.timeline.reel;
        let frame = ms(self.config.frame_ms);
        let mut run = ReelRun {
            reel,
            held: None,
            collapsed: false,
            recycled: 0,
            phases: Vec::new(),
        };

        let mut remaining = None;
        if self.timeline.start_delay_ms > 0.0 {
            let pause = MotionPhase::pause(self.timeline.start_delay_ms);
            if let PhaseOutcome::Skipped { .. } = play_phase(&pause, &self.ctx, frame).await {
                remaining = Some(remaining_drop(&self.timeline.phases));
            }
        }

        self.ctx
            .bus()
            .emit(Stage::ReelSpinStart { reel_index: reel }, SOURCE);

        if remaining.is_none() {
            remaining = self.walk_phases(&mut run, frame).await;
        }

        if let Some(remaining_px) = remaining {
            let collapse = MotionPhase::collapse(remaining_px, self.rows, &self.config);
            self.play_uninterrupted(&collapse, &mut run).await;
            run.collapsed = true;
        }

        self.presenter.reel_settled(reel, &self.symbols);
        log::debug!("[ReelDrop] reel {reel} settled (collapsed: {})", run.collapsed);
        run
    }

    /// Play the timeline; `Some(remaining drop)` when skip cut it short
    async fn walk_phases(&self, run: &mut ReelRun, frame: Duration) -> Option<f64> {
        let timeline = &self.timeline;
        let reel = timeline.reel;

        for (i, phase) in timeline.phases.iter().enumerate() {
            if phase.kind == PhaseKind::SkipCollapse {
                self.play_uninterrupted(phase, run).await;
                run.collapsed = true;
                continue;
            }

            if timeline.hold_at == Some(i)
                && timeline.may_hold()
                && !timeline.gate.is_open(&self.ctx, &self.tokens)
            {
                let after = remaining_drop(&timeline.phases[i..]);
                match self.hold(run).await {
                    HoldRelease::Skip => return Some(after),
                    _ => {
                        let release = MotionPhase::release(&self.config, self.scale);
                        let fresh = self.pool.lock().strip(self.config.release_rows as usize);
                        self.presenter.release_spawned(reel, &fresh);
                        self.presenter.phase_started(reel, &release);
                        run.phases.push(release.kind);
                        if let PhaseOutcome::Skipped { travelled } =
                            play_phase(&release, &self.ctx, frame).await
                        {
                            return Some(release.remaining_drop(travelled) + after);
                        }
                    }
                }
            }

            self.presenter.phase_started(reel, phase);
            run.phases.push(phase.kind);
            if let PhaseOutcome::Skipped { travelled } = play_phase(phase, &self.ctx, frame).await {
                return Some(phase.remaining_drop(travelled) + remaining_drop(&timeline.phases[i + 1..]));
            }
        }
        None
    }

    async fn hold(&self, run: &mut ReelRun) -> HoldRelease {
        let reel = self.timeline.reel;
        let bus = self.ctx.bus();
        bus.emit(Stage::ReelHoldStart { reel_index: reel }, SOURCE);
        log::debug!("[ReelDrop] reel {reel} holding for {:?}", self.timeline.gate);

        let (released_by, recycled) = HoldLoop {
            reel,
            rows: self.rows,
            gate: self.timeline.gate,
            config: &self.config,
            ctx: &self.ctx,
            tokens: &self.tokens,
            pool: &self.pool,
            presenter: self.presenter.as_ref(),
        }
        .run()
        .await;

        run.held = Some(released_by);
        run.recycled += recycled;
        bus.emit(
            Stage::ReelHoldRelease {
                reel_index: reel,
                released_by,
            },
            SOURCE,
        );
        released_by
    }

    /// Skip collapse ignores the skip flag it was born from
    async fn play_uninterrupted(&self, phase: &MotionPhase, run: &mut ReelRun) {
        self.presenter.phase_started(self.timeline.reel, phase);
        run.phases.push(phase.kind);
        tokio::time::sleep(ms(phase.duration_ms)).await;
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCHEDULER
// ═══════════════════════════════════════════════════════════════════════════════

/// Plans and runs the per-reel drop timelines of a round
#[derive(Debug, Clone)]
pub struct ReelDropScheduler {
    config: Arc<ReelDropConfig>,
    timing: AnticipationTiming,
    pool: Arc<Mutex<FillerPool>>,
}

impl ReelDropScheduler {
    pub fn new(config: ReelDropConfig, timing: AnticipationTiming, pool: FillerPool) -> Self {
        Self {
            config: Arc::new(config),
            timing,
            pool: Arc::new(Mutex::new(pool)),
        }
    }

    pub fn from_config(config: &SequencerConfig) -> Self {
        Self::new(
            config.reel_drop.clone(),
            config.anticipation.clone(),
            FillerPool::from_rules(&config.symbols),
        )
    }

    pub fn config(&self) -> &ReelDropConfig {
        &self.config
    }

    /// Timelines for every reel, without running them
    pub fn plan(
        &self,
        plan: &AnticipationPlan,
        reels: u8,
        rows: u8,
        profile: TimingProfile,
        skip: bool,
    ) -> Vec<ReelTimeline> {
        (0..reels)
            .map(|reel| ReelTimeline::build(&self.config, reel, rows, plan, profile, skip))
            .collect()
    }

    /// Run the drop for `grid`; returns once every reel reported completion
    ///
    /// `anticipation` must already hold the plan for `grid`.
    pub async fn run(
        &self,
        grid: &Grid,
        anticipation: &mut ScatterAnticipation,
        ctx: &RoundContext,
        ports: &Collaborators,
    ) -> DropReport {
        let started = Instant::now();
        let profile = ctx.profile();
        let reels = grid.reels();
        let timelines = self.plan(anticipation.plan(), reels, grid.rows(), profile, ctx.is_skip_active());
        let tokens: Vec<CompletionToken> = (0..reels)
            .map(|r| CompletionToken::new(format!("reel-{r}")))
            .collect();

        let (stop_tx, mut stop_rx) = mpsc::unbounded_channel();
        ctx.set_spinning(true);
        log::debug!(
            "[ReelDrop] {reels} reels, profile {profile:?}, extended {:?}",
            anticipation.plan().extended_reels
        );

        let handles: Vec<_> = timelines
            .iter()
            .map(|timeline| {
                let task = ReelTask {
                    timeline: timeline.clone(),
                    rows: grid.rows(),
                    symbols: grid.column(timeline.reel).map(<[u32]>::to_vec).unwrap_or_default(),
                    scale: profile.duration_scale(self.config.turbo_scale),
                    config: self.config.clone(),
                    ctx: ctx.clone(),
                    tokens: tokens.clone(),
                    pool: self.pool.clone(),
                    presenter: ports.reels.clone(),
                    completion: ReelCompletion {
                        reel: timeline.reel,
                        token: tokens[timeline.reel as usize].clone(),
                        stops: stop_tx.clone(),
                    },
                };
                tokio::spawn(task.run())
            })
            .collect();
        drop(stop_tx);

        let mut stop_order = Vec::with_capacity(reels as usize);
        let mut stages = Vec::new();
        let mut pending: Option<(StageKey, Instant)> = None;

        while stop_order.len() < reels as usize {
            let deadline = pending.map(|(_, at)| at);
            tokio::select! {
                biased;
                stopped = stop_rx.recv() => {
                    let Some(reel) = stopped else { break };
                    stop_order.push(reel);
                    if let Some(scheduled) = self.on_reel_stopped(reel, grid, anticipation, ctx, ports) {
                        pending = Some(scheduled);
                    }
                }
                _ = sleep_until(deadline) => {
                    if let Some((key, _)) = pending.take() {
                        if ctx.is_skip_active() {
                            log::debug!("[ReelDrop] skip active, stage {:?} dropped", key.threshold);
                        } else {
                            self.try_open_stage(key, anticipation, ctx, ports, &mut stages);
                        }
                    }
                }
            }
        }

        if let Some(key) = anticipation.finish() {
            close_stage(key, ctx, ports);
        }
        wait_all(&tokens).await;
        ctx.bus().emit(Stage::AllReelsStop, SOURCE);

        let mut runs = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(run) => runs.push(run),
                Err(e) => log::error!("[ReelDrop] reel task failed: {e}"),
            }
        }
        ctx.set_spinning(false);

        let skip_used = ctx.is_skip_active();
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        log::debug!("[ReelDrop] all reels stopped after {elapsed_ms:.0}ms, order {stop_order:?}");

        DropReport {
            timelines,
            reels: runs,
            stop_order,
            stages,
            tokens,
            skip_used,
            elapsed_ms,
        }
    }

    fn on_reel_stopped(
        &self,
        reel: u8,
        grid: &Grid,
        anticipation: &mut ScatterAnticipation,
        ctx: &RoundContext,
        ports: &Collaborators,
    ) -> Option<(StageKey, Instant)> {
        let symbols = grid.column(reel).map(<[u32]>::to_vec).unwrap_or_default();
        ctx.bus().emit(Stage::ReelStop { reel_index: reel, symbols }, SOURCE);
        ports.effects.play_sound("reel_stop");

        let outcome = anticipation.on_reel_stop(
            reel,
            ctx.profile().is_fast(),
            ctx.is_skip_active(),
            self.timing.undim_gap_ms,
        );
        if let Some(key) = outcome.closed {
            close_stage(key, ctx, ports);
        }
        outcome
            .scheduled
            .map(|s| (s.key, Instant::now() + ms(s.delay_ms)))
    }

    fn try_open_stage(
        &self,
        key: StageKey,
        anticipation: &mut ScatterAnticipation,
        ctx: &RoundContext,
        ports: &Collaborators,
        stages: &mut Vec<StageKey>,
    ) {
        match anticipation.start_stage(key) {
            StageStart::Started { replaced } => {
                if let Some(old) = replaced {
                    close_stage(old, ctx, ports);
                }
                ctx.set_active_stage(Some(key));
                ctx.bus().emit(
                    Stage::AnticipationStageStart {
                        target: key.threshold,
                        reel_index: key.column,
                    },
                    SOURCE,
                );
                stages.push(key);

                let name = format!("anticipation_{}", key.threshold.count());
                ports.effects.darken_background();
                VariantResolver::for_effect(&name).run(
                    ports.effects.as_ref(),
                    EffectPosition::Reel { reel: key.column },
                    ms(self.timing.stage_effect_ms),
                );
                ports.effects.play_sound(&name);
                log::debug!("[ReelDrop] stage {:?} opened on reel {}", key.threshold, key.column);
            }
            StageStart::AlreadyActive => {}
            StageStart::Stale => {
                log::debug!("[ReelDrop] stage {:?} stale, reel {} already stopped", key.threshold, key.column);
            }
        }
    }
}

fn close_stage(key: StageKey, ctx: &RoundContext, ports: &Collaborators) {
    ctx.set_active_stage(None);
    ctx.bus().emit(
        Stage::AnticipationStageEnd {
            target: key.threshold,
            reel_index: key.column,
        },
        SOURCE,
    );
    ports.effects.restore_background();
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
