//! Autoplay Continuation Gate
//!
//! Decides when the next automated spin may be requested. The gate is a
//! single-owner state machine: every input arrives through a named
//! transition and every transition returns a [`GateDecision`]. The async
//! side ([`AutoplayGate::resolve_continuation`]) turns waiting decisions
//! into bounded waits on overlays, the critical lock and stage-complete
//! signals.
//!
//! ```text
//! spin requested ──> waiting reels ──reels stopped──> waiting winlines
//!        ^                                                  │ win stop
//!        │                                                  v
//!        └──── SpinAfter ◄── overlay / lock / progression gates
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use rf_stage::{AutoplayEndReason, Stage, StagePayload};

use crate::config::AutoplayConfig;
use crate::context::RoundContext;
use crate::error::{SequencerError, SequencerResult};
use crate::ports::OverlayQueue;
use crate::signals::{SignalBus, wait_for};
use crate::timing::ms;
use crate::token::CompletionToken;

const SOURCE: &str = "autoplay";

/// Live autoplay session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoplaySession {
    pub active: bool,
    pub spins_remaining: u32,
    pub waiting_for_reels_stop: bool,
    pub waiting_for_winlines: bool,
    pub waiting_for_overlay: bool,
}

/// Host state the gate reads when deciding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateInputs {
    pub overlay_blocking: bool,
    pub lock_held: bool,
    pub turbo: bool,
    /// Last overlay closed by the player
    pub user_dismissed_overlay: bool,
}

impl GateInputs {
    pub fn observe(ctx: &RoundContext, overlays: &dyn OverlayQueue) -> Self {
        Self {
            overlay_blocking: overlays.is_blocking(),
            lock_held: ctx.lock().is_held(),
            turbo: ctx.is_turbo(),
            user_dismissed_overlay: overlays.last_close_user_dismissed(),
        }
    }
}

/// What the gate wants next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Nothing to do (no session, or still waiting on the round)
    Idle,
    SpinAfter(Duration),
    AwaitOverlay,
    AwaitLock,
    /// Stage-complete signal outstanding with credit queued
    AwaitProgression(Duration),
    Concluded(AutoplayEndReason),
}

/// Outcome of [`AutoplayGate::resolve_continuation`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    NextSpin,
    Finished(AutoplayEndReason),
    Idle,
}

/// Autoplay continuation gate
#[derive(Debug)]
pub struct AutoplayGate {
    config: AutoplayConfig,
    bus: SignalBus,
    session: Option<AutoplaySession>,
    pending_credit: u32,
    progression: Option<CompletionToken>,
}

impl AutoplayGate {
    pub fn new(config: AutoplayConfig, bus: SignalBus) -> Self {
        Self {
            config,
            bus,
            session: None,
            pending_credit: 0,
            progression: None,
        }
    }

    pub fn session(&self) -> Option<&AutoplaySession> {
        self.session.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.active)
    }

    pub fn spins_remaining(&self) -> u32 {
        self.session.as_ref().map_or(0, |s| s.spins_remaining)
    }

    pub fn pending_credit(&self) -> u32 {
        self.pending_credit
    }

    /// More automated spins follow the one in flight
    pub fn continues_after_current(&self) -> bool {
        self.spins_remaining() > 0 || self.pending_credit > 0
    }

    // ═══════════════════════════════════════════════════════════════════════
    // TRANSITIONS
    // ═══════════════════════════════════════════════════════════════════════

    pub fn start(&mut self, spins: u32) -> SequencerResult<GateDecision> {
        if spins == 0 {
            return Err(SequencerError::Autoplay("cannot start with zero spins".into()));
        }
        if self.is_active() {
            return Err(SequencerError::Autoplay("session already running".into()));
        }
        self.session = Some(AutoplaySession {
            active: true,
            spins_remaining: spins,
            ..Default::default()
        });
        log::info!("[Autoplay] started with {spins} spins");
        self.bus.set_autoplay(true);
        self.bus.emit(Stage::AutoplayStart { spins }, SOURCE);
        Ok(GateDecision::SpinAfter(Duration::ZERO))
    }

    /// Player cancel; no-op without a session
    pub fn stop(&mut self) -> Option<AutoplayEndReason> {
        self.session.as_ref()?;
        Some(self.conclude(AutoplayEndReason::Cancelled))
    }

    /// Spin about to be requested; returns spins left after it
    ///
    /// A second call before the reels stopped does not decrement again.
    pub fn on_spin_requested(&mut self) -> SequencerResult<u32> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| SequencerError::Autoplay("no session".into()))?;
        if session.waiting_for_reels_stop {
            log::debug!("[Autoplay] spin already in flight, not decrementing");
            return Ok(session.spins_remaining);
        }
        if session.spins_remaining == 0 {
            return Err(SequencerError::Autoplay("no spins remaining".into()));
        }
        session.spins_remaining -= 1;
        session.waiting_for_reels_stop = true;
        session.waiting_for_winlines = false;
        let spins_remaining = session.spins_remaining;
        self.bus.emit_with(
            Stage::AutoplaySpinRequested { spins_remaining },
            StagePayload::new().spins_remaining(spins_remaining),
            SOURCE,
        );
        Ok(spins_remaining)
    }

    pub fn on_reels_stopped(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.waiting_for_reels_stop = false;
            session.waiting_for_winlines = true;
        }
    }

    pub fn on_win_sequence_stopped(&mut self, inputs: GateInputs) -> GateDecision {
        let Some(session) = self.session.as_mut() else {
            return GateDecision::Idle;
        };
        if !session.waiting_for_winlines {
            log::debug!("[Autoplay] win stop outside a pending spin, ignored");
            return GateDecision::Idle;
        }
        session.waiting_for_winlines = false;
        self.evaluate(inputs)
    }

    /// Blocking overlay went away (or its safety poll ran out)
    pub fn on_overlay_closed(&mut self, inputs: GateInputs) -> GateDecision {
        match self.session.as_mut() {
            Some(session) if session.waiting_for_overlay => {
                session.waiting_for_overlay = false;
                self.evaluate(GateInputs {
                    overlay_blocking: false,
                    ..inputs
                })
            }
            _ => GateDecision::Idle,
        }
    }

    pub fn on_lock_released(&mut self, inputs: GateInputs) -> GateDecision {
        if self.session.is_none() {
            return GateDecision::Idle;
        }
        self.evaluate(GateInputs {
            lock_held: false,
            ..inputs
        })
    }

    /// Extra spins (e.g. retrigger) to apply once the current ones run out
    pub fn queue_credit(&mut self, spins: u32) {
        self.pending_credit = self.pending_credit.saturating_add(spins);
        log::debug!("[Autoplay] {spins} spins queued ({} pending)", self.pending_credit);
    }

    /// Register an outstanding stage-complete signal
    pub fn expect_progression(&mut self) -> CompletionToken {
        let token = CompletionToken::new("stage-complete");
        self.progression = Some(token.clone());
        token
    }

    pub fn on_progression_complete(&mut self, inputs: GateInputs) -> GateDecision {
        if let Some(token) = self.progression.take() {
            token.resolve();
        }
        if self.session.is_none() {
            return GateDecision::Idle;
        }
        self.evaluate(inputs)
    }

    pub fn on_progression_timeout(&mut self) -> GateDecision {
        log::warn!(
            "[Autoplay] stage-complete signal missing after {}ms, ending session",
            self.config.progression_timeout_ms
        );
        self.progression = None;
        if self.session.is_none() {
            return GateDecision::Idle;
        }
        GateDecision::Concluded(self.conclude(AutoplayEndReason::ProgressionTimeout))
    }

    fn evaluate(&mut self, inputs: GateInputs) -> GateDecision {
        let outstanding = self.progression.as_ref().is_some_and(|t| !t.is_resolved());
        let Some(session) = self.session.as_mut() else {
            return GateDecision::Idle;
        };

        if session.spins_remaining == 0 {
            if self.pending_credit == 0 {
                return GateDecision::Concluded(self.conclude(AutoplayEndReason::Exhausted));
            }
            if outstanding {
                return GateDecision::AwaitProgression(ms(self.config.progression_timeout_ms));
            }
            let spins = std::mem::take(&mut self.pending_credit);
            session.spins_remaining = spins;
            log::info!("[Autoplay] credit of {spins} spins applied");
            self.bus.emit(Stage::AutoplayCreditApplied { spins }, SOURCE);
        }

        if inputs.overlay_blocking {
            session.waiting_for_overlay = true;
            return GateDecision::AwaitOverlay;
        }
        if inputs.lock_held {
            return GateDecision::AwaitLock;
        }
        let delay = if inputs.turbo || inputs.user_dismissed_overlay {
            Duration::ZERO
        } else {
            ms(self.config.spin_delay_ms)
        };
        GateDecision::SpinAfter(delay)
    }

    fn conclude(&mut self, reason: AutoplayEndReason) -> AutoplayEndReason {
        self.session = None;
        self.pending_credit = 0;
        self.progression = None;
        log::info!("[Autoplay] ended ({reason:?})");
        self.bus.emit(Stage::AutoplayEnd { reason }, SOURCE);
        self.bus.set_autoplay(false);
        reason
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ASYNC RESOLUTION
    // ═══════════════════════════════════════════════════════════════════════

    /// Drive `decision` to a next spin, an end, or idle; every wait is bounded
    pub async fn resolve_continuation(
        &mut self,
        mut decision: GateDecision,
        ctx: &RoundContext,
        overlays: &dyn OverlayQueue,
    ) -> Continuation {
        loop {
            decision = match decision {
                GateDecision::Idle => return Continuation::Idle,
                GateDecision::Concluded(reason) => return Continuation::Finished(reason),
                GateDecision::SpinAfter(delay) => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    if !self.is_active() {
                        return Continuation::Idle;
                    }
                    return Continuation::NextSpin;
                }
                GateDecision::AwaitOverlay => {
                    self.wait_overlay(overlays).await;
                    self.on_overlay_closed(GateInputs::observe(ctx, overlays))
                }
                GateDecision::AwaitLock => {
                    let limit = ms(self.config.lock_wait_timeout_ms);
                    if !ctx.lock().wait_released(limit).await {
                        ctx.lock().force_release();
                    }
                    self.on_lock_released(GateInputs::observe(ctx, overlays))
                }
                GateDecision::AwaitProgression(limit) => {
                    let Some(token) = self.progression.clone() else {
                        return Continuation::Idle;
                    };
                    match wait_for(token.wait(), limit, "stage-complete signal").await {
                        Some(()) => self.on_progression_complete(GateInputs::observe(ctx, overlays)),
                        None => self.on_progression_timeout(),
                    }
                }
            };
        }
    }

    /// Close signal when offered, raced against a bounded poll of `is_blocking`
    async fn wait_overlay(&self, overlays: &dyn OverlayQueue) {
        let interval = ms(self.config.overlay_poll_interval_ms);
        let attempts = self.config.overlay_poll_attempts;

        let poll = async {
            for _ in 0..attempts {
                tokio::time::sleep(interval).await;
                if !overlays.is_blocking() {
                    return true;
                }
            }
            false
        };

        let cleared = match overlays.closed_signal() {
            Some(signal) => tokio::select! {
                _ = signal.wait() => true,
                cleared = poll => cleared,
            },
            None => poll.await,
        };
        if !cleared {
            log::warn!("[Autoplay] overlay still blocking after {attempts} polls, continuing");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> AutoplayGate {
        AutoplayGate::new(AutoplayConfig::default(), SignalBus::new())
    }

    fn run_spin(gate: &mut AutoplayGate, inputs: GateInputs) -> GateDecision {
        gate.on_spin_requested().unwrap();
        gate.on_reels_stopped();
        gate.on_win_sequence_stopped(inputs)
    }

    #[test]
    fn test_start_rejects_zero_and_double_start() {
        let mut gate = gate();
        assert!(gate.start(0).is_err());
        assert_eq!(gate.start(3).unwrap(), GateDecision::SpinAfter(Duration::ZERO));
        assert!(gate.start(3).is_err());
    }

    #[test]
    fn test_transitions_track_waiting_flags() {
        let mut gate = gate();
        gate.start(2).unwrap();
        assert_eq!(gate.on_spin_requested().unwrap(), 1);
        let session = gate.session().unwrap();
        assert!(session.waiting_for_reels_stop);
        assert!(!session.waiting_for_winlines);

        gate.on_reels_stopped();
        let session = gate.session().unwrap();
        assert!(!session.waiting_for_reels_stop);
        assert!(session.waiting_for_winlines);

        let decision = gate.on_win_sequence_stopped(GateInputs::default());
        assert_eq!(decision, GateDecision::SpinAfter(Duration::from_millis(400)));
        assert!(!gate.session().unwrap().waiting_for_winlines);
    }

    #[test]
    fn test_double_request_does_not_decrement() {
        let mut gate = gate();
        gate.start(5).unwrap();
        assert_eq!(gate.on_spin_requested().unwrap(), 4);
        assert_eq!(gate.on_spin_requested().unwrap(), 4);
        assert_eq!(gate.bus.count("autoplay_spin_requested"), 1);
    }

    #[test]
    fn test_turbo_and_user_dismissal_skip_delay() {
        let mut gate = gate();
        gate.start(3).unwrap();
        let turbo = GateInputs {
            turbo: true,
            ..Default::default()
        };
        assert_eq!(run_spin(&mut gate, turbo), GateDecision::SpinAfter(Duration::ZERO));
        let dismissed = GateInputs {
            user_dismissed_overlay: true,
            ..Default::default()
        };
        assert_eq!(run_spin(&mut gate, dismissed), GateDecision::SpinAfter(Duration::ZERO));
    }

    #[test]
    fn test_overlay_then_lock() {
        let mut gate = gate();
        gate.start(3).unwrap();
        let blocked = GateInputs {
            overlay_blocking: true,
            lock_held: true,
            ..Default::default()
        };
        assert_eq!(run_spin(&mut gate, blocked), GateDecision::AwaitOverlay);
        assert!(gate.session().unwrap().waiting_for_overlay);
        assert_eq!(gate.on_overlay_closed(blocked), GateDecision::AwaitLock);
        assert_eq!(
            gate.on_lock_released(blocked),
            GateDecision::AwaitOverlay,
            "a still-blocking overlay gates again after the lock"
        );
    }

    #[test]
    fn test_exhaustion_concludes_once() {
        let mut gate = gate();
        gate.start(1).unwrap();
        assert_eq!(
            run_spin(&mut gate, GateInputs::default()),
            GateDecision::Concluded(AutoplayEndReason::Exhausted)
        );
        assert!(gate.session().is_none());
        assert_eq!(gate.stop(), None);
        assert_eq!(gate.bus.count("autoplay_end"), 1);
    }

    #[test]
    fn test_credit_applied_without_outstanding_signal() {
        let mut gate = gate();
        gate.start(1).unwrap();
        gate.queue_credit(5);
        assert_eq!(
            run_spin(&mut gate, GateInputs::default()),
            GateDecision::SpinAfter(Duration::from_millis(400))
        );
        assert_eq!(gate.spins_remaining(), 5);
        assert_eq!(gate.pending_credit(), 0);
        assert_eq!(gate.bus.count("autoplay_credit_applied"), 1);
    }

    #[test]
    fn test_zero_spins_with_outstanding_signal_waits() {
        let mut gate = gate();
        gate.start(1).unwrap();
        gate.queue_credit(3);
        let _signal = gate.expect_progression();
        assert_eq!(
            run_spin(&mut gate, GateInputs::default()),
            GateDecision::AwaitProgression(Duration::from_millis(5000))
        );
        assert!(gate.is_active());

        assert_eq!(
            gate.on_progression_complete(GateInputs::default()),
            GateDecision::SpinAfter(Duration::from_millis(400))
        );
        assert_eq!(gate.spins_remaining(), 3);
    }

    #[test]
    fn test_stop_cancels() {
        let mut gate = gate();
        gate.start(10).unwrap();
        gate.on_spin_requested().unwrap();
        assert_eq!(gate.stop(), Some(AutoplayEndReason::Cancelled));
        assert!(!gate.is_active());
        assert_eq!(gate.on_win_sequence_stopped(GateInputs::default()), GateDecision::Idle);
    }

    #[test]
    fn test_cancelled_credit_not_carried_into_next_session() {
        let mut gate = gate();
        gate.start(1).unwrap();
        gate.queue_credit(3);
        assert_eq!(gate.stop(), Some(AutoplayEndReason::Cancelled));
        assert_eq!(gate.pending_credit(), 0);

        gate.start(1).unwrap();
        assert_eq!(
            run_spin(&mut gate, GateInputs::default()),
            GateDecision::Concluded(AutoplayEndReason::Exhausted)
        );
        assert_eq!(gate.bus.count("autoplay_credit_applied"), 0);
    }

    #[test]
    fn test_session_events_carry_autoplay_tag() {
        let mut gate = gate();
        gate.start(1).unwrap();
        run_spin(&mut gate, GateInputs::default());
        gate.bus.emit(Stage::AllReelsStop, "reel_drop");

        let trace = gate.bus.trace_snapshot();
        let tagged = |name: &str| {
            trace
                .events
                .iter()
                .filter(|e| e.type_name() == name)
                .all(|e| e.tags.iter().any(|t| t == crate::signals::TAG_AUTOPLAY))
        };
        assert!(tagged("autoplay_start"));
        assert!(tagged("autoplay_spin_requested"));
        assert!(tagged("autoplay_end"));
        assert!(trace.events.last().is_some_and(|e| e.tags.is_empty()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_progression_timeout_ends_session() {
        let mut gate = gate();
        let ctx = RoundContext::default();
        gate.start(1).unwrap();
        gate.queue_credit(2);
        let _signal = gate.expect_progression();
        let decision = run_spin(&mut gate, GateInputs::default());

        let started = tokio::time::Instant::now();
        let next = gate
            .resolve_continuation(decision, &ctx, &crate::ports::SilentPorts)
            .await;
        assert_eq!(next, Continuation::Finished(AutoplayEndReason::ProgressionTimeout));
        assert_eq!(started.elapsed(), Duration::from_millis(5000));
        assert_eq!(gate.pending_credit(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_lock_is_forced() {
        let mut gate = gate();
        let ctx = RoundContext::default();
        gate.start(2).unwrap();
        let guard = ctx.lock().try_acquire("stuck").unwrap();
        let decision = run_spin(
            &mut gate,
            GateInputs {
                lock_held: true,
                ..Default::default()
            },
        );
        assert_eq!(decision, GateDecision::AwaitLock);

        let next = gate
            .resolve_continuation(decision, &ctx, &crate::ports::SilentPorts)
            .await;
        assert_eq!(next, Continuation::NextSpin);
        assert!(!ctx.lock().is_held());
        drop(guard);
    }
}
