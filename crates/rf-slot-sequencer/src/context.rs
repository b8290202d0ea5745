//! Round context — shared flags every component reads
//!
//! Turbo, skip, the active anticipation stage and the critical lock live
//! here instead of in globals. Cloning is cheap; all clones see the same state.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;

use rf_stage::{SkipRefusal, Stage, TimingProfile};

use crate::anticipation::StageKey;
use crate::lock::CriticalSequenceLock;
use crate::signals::SignalBus;

#[derive(Debug)]
struct ContextInner {
    turbo: AtomicBool,
    spinning: AtomicBool,
    skip: watch::Sender<bool>,
    active_stage: watch::Sender<Option<StageKey>>,
    opened_stages: Mutex<HashSet<StageKey>>,
    lock: CriticalSequenceLock,
    bus: SignalBus,
}

/// Shared per-session state handle
#[derive(Debug, Clone)]
pub struct RoundContext {
    inner: Arc<ContextInner>,
}

impl RoundContext {
    pub fn new(bus: SignalBus, lock: CriticalSequenceLock) -> Self {
        let (skip, _) = watch::channel(false);
        let (active_stage, _) = watch::channel(None);
        Self {
            inner: Arc::new(ContextInner {
                turbo: AtomicBool::new(false),
                spinning: AtomicBool::new(false),
                skip,
                active_stage,
                opened_stages: Mutex::new(HashSet::new()),
                lock,
                bus,
            }),
        }
    }

    pub fn bus(&self) -> &SignalBus {
        &self.inner.bus
    }

    pub fn lock(&self) -> &CriticalSequenceLock {
        &self.inner.lock
    }

    // ─── turbo ──────────────────────────────────────────────────────────────

    pub fn is_turbo(&self) -> bool {
        self.inner.turbo.load(Ordering::Acquire)
    }

    pub fn set_turbo(&self, enabled: bool) {
        let previous = self.inner.turbo.swap(enabled, Ordering::AcqRel);
        if previous != enabled {
            self.inner.bus.emit(Stage::TurboChanged { enabled }, "control");
        }
    }

    pub fn profile(&self) -> TimingProfile {
        TimingProfile::from_turbo(self.is_turbo())
    }

    // ─── skip ───────────────────────────────────────────────────────────────

    pub fn is_skip_active(&self) -> bool {
        *self.inner.skip.borrow()
    }

    pub fn skip_receiver(&self) -> watch::Receiver<bool> {
        self.inner.skip.subscribe()
    }

    /// Player skip; refused while a stage runs or the critical lock is held
    pub fn request_skip(&self) -> Result<(), SkipRefusal> {
        let refusal = if !self.is_spinning() {
            Some(SkipRefusal::NotSpinning)
        } else if self.is_skip_active() {
            Some(SkipRefusal::AlreadyActive)
        } else if self.inner.lock.is_held() {
            Some(SkipRefusal::CriticalSequence)
        } else if self.active_stage().is_some() {
            Some(SkipRefusal::AnticipationStage)
        } else {
            None
        };

        match refusal {
            Some(reason) => {
                log::debug!("[ReelDrop] skip refused: {reason:?}");
                self.inner.bus.emit(Stage::SkipRefused { reason }, "control");
                Err(reason)
            }
            None => {
                self.inner.skip.send_replace(true);
                self.inner.bus.emit(Stage::SkipAccepted, "control");
                Ok(())
            }
        }
    }

    // ─── spinning ───────────────────────────────────────────────────────────

    pub fn is_spinning(&self) -> bool {
        self.inner.spinning.load(Ordering::Acquire)
    }

    pub fn set_spinning(&self, spinning: bool) {
        self.inner.spinning.store(spinning, Ordering::Release);
    }

    // ─── anticipation stage ─────────────────────────────────────────────────

    pub fn active_stage(&self) -> Option<StageKey> {
        *self.inner.active_stage.borrow()
    }

    pub fn set_active_stage(&self, key: Option<StageKey>) {
        if let Some(key) = key {
            self.inner.opened_stages.lock().insert(key);
        }
        self.inner.active_stage.send_replace(key);
    }

    /// Has this exact stage been opened this round?
    pub fn stage_reached(&self, key: &StageKey) -> bool {
        self.inner.opened_stages.lock().contains(key)
    }

    pub fn stage_receiver(&self) -> watch::Receiver<Option<StageKey>> {
        self.inner.active_stage.subscribe()
    }

    /// Clear per-round flags (turbo persists)
    pub fn reset_round(&self) {
        self.inner.skip.send_replace(false);
        self.inner.active_stage.send_replace(None);
        self.inner.opened_stages.lock().clear();
        self.set_spinning(false);
    }
}

impl Default for RoundContext {
    fn default() -> Self {
        Self::new(SignalBus::new(), CriticalSequenceLock::new())
    }
}
