//! Lifecycle signal bus
//!
//! Every stage the core emits goes out on a broadcast channel (UI, audio,
//! the autoplay gate) and into the round's `StageTrace`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use rf_stage::{Stage, StageEvent, StagePayload, StageTrace, TimingProfile};

use crate::timing::RoundClock;

const CHANNEL_CAPACITY: usize = 256;

/// Tag on events emitted while an autoplay session runs
pub const TAG_AUTOPLAY: &str = "autoplay";

/// Routing tags applied to every emitted event
#[derive(Debug, Default)]
struct Tagging {
    profile: Option<&'static str>,
    autoplay: bool,
}

impl Tagging {
    fn apply(&self, mut event: StageEvent) -> StageEvent {
        if let Some(profile) = self.profile {
            event = event.with_tag(profile);
        }
        if self.autoplay {
            event = event.with_tag(TAG_AUTOPLAY);
        }
        event
    }
}

fn profile_tag(profile: TimingProfile) -> Option<&'static str> {
    match profile {
        TimingProfile::Normal => None,
        TimingProfile::Turbo => Some("turbo"),
        TimingProfile::Instant => Some("instant"),
    }
}

/// Broadcast + trace sink for stage events
#[derive(Debug, Clone)]
pub struct SignalBus {
    tx: broadcast::Sender<StageEvent>,
    trace: Arc<Mutex<StageTrace>>,
    clock: Arc<Mutex<RoundClock>>,
    tagging: Arc<Mutex<Tagging>>,
}

impl SignalBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            trace: Arc::new(Mutex::new(StageTrace::new("idle"))),
            clock: Arc::new(Mutex::new(RoundClock::start())),
            tagging: Arc::new(Mutex::new(Tagging::default())),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StageEvent> {
        self.tx.subscribe()
    }

    /// Fresh trace and clock for a round
    pub fn begin_round(&self, round_id: u64, profile: TimingProfile) {
        *self.clock.lock() = RoundClock::start();
        *self.trace.lock() = StageTrace::new(format!("round-{round_id}"))
            .with_round(round_id)
            .with_profile(profile);
        self.tagging.lock().profile = profile_tag(profile);
    }

    /// Toggle the autoplay tag for subsequent events
    pub fn set_autoplay(&self, active: bool) {
        self.tagging.lock().autoplay = active;
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.clock.lock().elapsed_ms()
    }

    /// Emit a stage with an empty payload
    pub fn emit(&self, stage: Stage, source: &str) {
        self.emit_with(stage, StagePayload::default(), source);
    }

    pub fn emit_with(&self, stage: Stage, payload: StagePayload, source: &str) {
        let event = StageEvent::with_payload(stage, self.elapsed_ms(), payload).with_source(source);
        let event = self.tagging.lock().apply(event);
        log::trace!("[Round] {} @ {:.0}ms", event.type_name(), event.timestamp_ms);
        self.trace.lock().push(event.clone());
        // No subscribers is fine: the trace still records the event
        let _ = self.tx.send(event);
    }

    pub fn trace_snapshot(&self) -> StageTrace {
        self.trace.lock().clone()
    }

    /// Count of a stage type in the current trace
    pub fn count(&self, type_name: &str) -> usize {
        self.trace.lock().count(type_name)
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Await an external signal with a bounded fallback
///
/// Returns `None` when `limit` elapsed first; the timeout is logged, never fatal.
pub async fn wait_for<F, T>(signal: F, limit: Duration, what: &str) -> Option<T>
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(limit, signal).await {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("[Round] gave up waiting for {what} after {}ms", limit.as_millis());
            None
        }
    }
}
