//! Round orchestrator
//!
//! Wires the components in round order:
//!
//! ```text
//! RoundResult ─> PaylineResolver ─> ScatterAnticipation plan
//!             ─> ReelDropScheduler (all reels stop)
//!             ─> special effects under the critical lock
//!             ─> WinSequenceController (first pass stop)
//!             ─> AutoplayGate (next spin?)
//! ```

use std::collections::VecDeque;

use serde::Serialize;

use rf_stage::{AutoplayEndReason, Stage, StagePayload, StageTrace, WinDisplayMode};

use crate::anticipation::{ScatterAnticipation, StageKey};
use crate::autoplay::{AutoplayGate, Continuation, GateInputs};
use crate::config::SequencerConfig;
use crate::context::RoundContext;
use crate::error::{SequencerError, SequencerResult};
use crate::ports::{Collaborators, EffectPosition, VariantResolver};
use crate::reel_drop::{ReelDropScheduler, ReelRun};
use crate::resolver::{PaylineResolver, ResolvedPayline};
use crate::result::{RoundResult, SpecialEffect};
use crate::timing::ms;
use crate::win_sequence::{WinSequenceController, WinSequenceHandle};
use crate::winlines::WinlineSet;

const SOURCE: &str = "round";

/// Special effect outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectRun {
    pub name: String,
    /// False when it failed to acquire the lock or timed out
    pub completed: bool,
}

/// Everything one round did
#[derive(Debug, Clone, Serialize)]
pub struct RoundReport {
    pub round_id: u64,
    pub lines: Vec<ResolvedPayline>,
    pub extended_reels: Vec<u8>,
    pub stages: Vec<StageKey>,
    pub reels: Vec<ReelRun>,
    pub stop_order: Vec<u8>,
    /// Per-reel completion token state after the drop
    pub reels_completed: Vec<bool>,
    pub skip_used: bool,
    pub effects: Vec<EffectRun>,
    pub win_mode: WinDisplayMode,
    pub trace: StageTrace,
    pub elapsed_ms: f64,
}

impl RoundReport {
    pub fn all_reels_completed(&self) -> bool {
        self.reels_completed.iter().all(|done| *done)
    }
}

/// Result of [`RoundSequencer::run_round`]
#[derive(Debug)]
pub enum RoundOutcome {
    Completed(Box<RoundReport>),
    /// Grid not accepted; nothing was sequenced
    Rejected(SequencerError),
}

impl RoundOutcome {
    pub fn report(&self) -> Option<&RoundReport> {
        match self {
            Self::Completed(report) => Some(report.as_ref()),
            Self::Rejected(_) => None,
        }
    }
}

/// Supplies automated rounds and observes them
pub trait RoundSource {
    /// Result for the next automated spin; `None` ends the session
    fn next_round(&mut self, round_id: u64) -> Option<RoundResult>;

    /// Called after each round's win stop, before the gate decides
    fn after_round(&mut self, _report: &RoundReport, _gate: &mut AutoplayGate) {}
}

impl RoundSource for VecDeque<RoundResult> {
    fn next_round(&mut self, _round_id: u64) -> Option<RoundResult> {
        self.pop_front()
    }
}

/// Outcome of an autoplay session
#[derive(Debug)]
pub struct AutoplaySummary {
    pub rounds: Vec<RoundReport>,
    pub end: Option<AutoplayEndReason>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SEQUENCER
// ═══════════════════════════════════════════════════════════════════════════════

/// Round sequencer for one game session
pub struct RoundSequencer {
    config: SequencerConfig,
    resolver: PaylineResolver,
    anticipation: ScatterAnticipation,
    reel_drop: ReelDropScheduler,
    wins: WinSequenceController,
    autoplay: AutoplayGate,
    ctx: RoundContext,
    ports: Collaborators,
    round_id: u64,
    display: Option<WinSequenceHandle>,
}

impl RoundSequencer {
    pub fn new(config: SequencerConfig, ports: Collaborators) -> SequencerResult<Self> {
        config.validate()?;
        let winlines = WinlineSet::for_grid(config.winlines.as_deref(), &config.grid)?;
        let resolver = PaylineResolver::new(config.symbols.clone(), winlines).with_policy(config.resolver_policy);
        let ctx = RoundContext::default();

        Ok(Self {
            resolver,
            anticipation: ScatterAnticipation::new(),
            reel_drop: ReelDropScheduler::from_config(&config),
            wins: WinSequenceController::new(config.win_sequence.clone()),
            autoplay: AutoplayGate::new(config.autoplay.clone(), ctx.bus().clone()),
            ctx,
            ports,
            round_id: 0,
            display: None,
            config,
        })
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    /// Shared handle for host controls (skip, turbo, signal subscription)
    pub fn context(&self) -> RoundContext {
        self.ctx.clone()
    }

    pub fn resolver(&self) -> &PaylineResolver {
        &self.resolver
    }

    pub fn scheduler(&self) -> &ReelDropScheduler {
        &self.reel_drop
    }

    pub fn autoplay(&self) -> &AutoplayGate {
        &self.autoplay
    }

    pub fn autoplay_mut(&mut self) -> &mut AutoplayGate {
        &mut self.autoplay
    }

    pub fn round_id(&self) -> u64 {
        self.round_id
    }

    pub fn trace(&self) -> StageTrace {
        self.ctx.bus().trace_snapshot()
    }

    // ─── host control surface ───────────────────────────────────────────────

    /// No-op (refused) while a stage runs or the critical lock is held
    pub fn request_skip(&self) -> bool {
        self.ctx.request_skip().is_ok()
    }

    pub fn is_skip_active(&self) -> bool {
        self.ctx.is_skip_active()
    }

    pub fn set_turbo(&self, enabled: bool) {
        self.ctx.set_turbo(enabled);
    }

    pub fn start_autoplay(&mut self, spins: u32) -> SequencerResult<()> {
        self.autoplay.start(spins).map(|_| ())
    }

    pub fn stop_autoplay(&mut self) -> Option<AutoplayEndReason> {
        self.autoplay.stop()
    }

    /// Stop a still-cycling win display (manual spin)
    pub async fn interrupt_wins(&mut self) {
        if let Some(display) = self.display.take() {
            let run = display.interrupt().await;
            log::debug!("[Round] win display interrupted after {} lines", run.shown);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ROUND
    // ═══════════════════════════════════════════════════════════════════════

    /// Sequence one round through to the win sequence stop
    ///
    /// Looping win displays keep cycling afterwards until the next round
    /// or [`Self::interrupt_wins`].
    pub async fn run_round(&mut self, result: RoundResult) -> RoundOutcome {
        if let Some(holder) = self.ctx.lock().holder() {
            log::warn!("[Round] new grid rejected, '{holder}' holds the critical lock");
            return RoundOutcome::Rejected(SequencerError::CriticalSequenceHeld(holder));
        }
        if !result.grid.matches(&self.config.grid) {
            let reason = format!(
                "{}x{} grid, expected {}x{}",
                result.grid.reels(),
                result.grid.rows(),
                self.config.grid.reels,
                self.config.grid.rows
            );
            log::warn!("[Round] new grid rejected: {reason}");
            return RoundOutcome::Rejected(SequencerError::InvalidGrid(reason));
        }

        self.interrupt_wins().await;

        self.round_id += 1;
        let round_id = self.round_id;
        let profile = self.ctx.profile();
        self.ctx.reset_round();
        let bus = self.ctx.bus().clone();
        bus.begin_round(round_id, profile);
        bus.emit_with(
            Stage::RoundStart { round_id },
            StagePayload::new().round(round_id),
            SOURCE,
        );
        log::info!("[Round] {round_id} started ({profile:?})");

        let lines = self.resolver.resolve_all(&result.grid, &result.wins);
        if lines.len() < result.wins.len() {
            log::warn!(
                "[Round] {} of {} win lines could not be resolved",
                result.wins.len() - lines.len(),
                result.wins.len()
            );
        }
        self.anticipation.on_new_grid(&result.grid, &self.config.symbols);
        let extended_reels = self.anticipation.plan().extended_reels.clone();

        let drop = self
            .reel_drop
            .run(&result.grid, &mut self.anticipation, &self.ctx, &self.ports)
            .await;
        self.autoplay.on_reels_stopped();

        let mut effects = Vec::with_capacity(result.special_effects.len());
        for effect in &result.special_effects {
            effects.push(self.run_special_effect(effect).await);
        }

        let mode = WinSequenceController::choose_mode(
            self.autoplay.is_active() && self.autoplay.continues_after_current(),
            result.scatter_transition,
        );
        let display = self.wins.start(
            lines.clone(),
            mode,
            self.ctx.profile(),
            &bus,
            self.ports.wins.clone(),
        );
        display.wait_first_pass().await;
        self.display = Some(display);

        bus.emit(Stage::RoundEnd { round_id }, SOURCE);
        let trace = bus.trace_snapshot();
        let validation = trace.validate();
        if !validation.is_valid(self.config.grid.reels) {
            log::warn!("[Round] {round_id} trace issues: {:?}", validation.warnings());
        }

        RoundOutcome::Completed(Box::new(RoundReport {
            round_id,
            lines,
            extended_reels,
            stages: drop.stages,
            reels: drop.reels,
            stop_order: drop.stop_order,
            reels_completed: drop.tokens.iter().map(|t| t.is_resolved()).collect(),
            skip_used: drop.skip_used,
            effects,
            win_mode: mode,
            trace,
            elapsed_ms: bus.elapsed_ms(),
        }))
    }

    async fn run_special_effect(&self, effect: &SpecialEffect) -> EffectRun {
        let bus = self.ctx.bus();
        let effects = self.ports.effects.clone();
        let resolver = VariantResolver::for_effect(&effect.name);
        let duration = ms(effect.duration_ms);

        let sequence = async {
            bus.emit(
                Stage::CriticalSequenceStart {
                    name: effect.name.clone(),
                },
                SOURCE,
            );
            resolver
                .run(effects.as_ref(), EffectPosition::Screen, duration)
                .wait()
                .await;
        };

        let completed = match self
            .ctx
            .lock()
            .run_exclusive(&effect.name, ms(effect.timeout_ms()), sequence)
            .await
        {
            Ok(Some(())) => true,
            Ok(None) => {
                log::warn!("[Round] effect '{}' timed out, continuing", effect.name);
                false
            }
            Err(e) => {
                log::warn!("[Round] effect '{}' skipped: {e}", effect.name);
                return EffectRun {
                    name: effect.name.clone(),
                    completed: false,
                };
            }
        };

        bus.emit(
            Stage::CriticalSequenceEnd {
                name: effect.name.clone(),
                completed,
            },
            SOURCE,
        );
        EffectRun {
            name: effect.name.clone(),
            completed,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // AUTOPLAY
    // ═══════════════════════════════════════════════════════════════════════

    /// Run an automated session of `spins` rounds pulled from `source`
    pub async fn run_autoplay<S: RoundSource>(&mut self, spins: u32, source: &mut S) -> SequencerResult<AutoplaySummary> {
        let mut decision = self.autoplay.start(spins)?;
        let mut rounds = Vec::new();

        let end = loop {
            let next = self
                .autoplay
                .resolve_continuation(decision, &self.ctx, self.ports.overlays.as_ref())
                .await;
            match next {
                Continuation::NextSpin => {}
                Continuation::Finished(reason) => break Some(reason),
                Continuation::Idle => break None,
            }

            self.autoplay.on_spin_requested()?;
            let Some(result) = source.next_round(self.round_id + 1) else {
                log::info!("[Autoplay] source exhausted, stopping");
                break self.autoplay.stop();
            };

            match self.run_round(result).await {
                RoundOutcome::Completed(report) => {
                    source.after_round(&report, &mut self.autoplay);
                    rounds.push(*report);
                }
                RoundOutcome::Rejected(e) => {
                    log::warn!("[Autoplay] round rejected: {e}");
                    break self.autoplay.stop();
                }
            }

            let inputs = GateInputs::observe(&self.ctx, self.ports.overlays.as_ref());
            decision = self.autoplay.on_win_sequence_stopped(inputs);
        };

        Ok(AutoplaySummary { rounds, end })
    }
}

impl std::fmt::Debug for RoundSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundSequencer")
            .field("round_id", &self.round_id)
            .field("autoplay", &self.autoplay.session())
            .finish_non_exhaustive()
    }
}
