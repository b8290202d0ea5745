//! Hold-and-spin loop and frame-polled phase playback

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::{Duration, Instant};

use rf_stage::HoldRelease;

use crate::config::ReelDropConfig;
use crate::context::RoundContext;
use crate::ports::ReelPresenter;
use crate::symbols::FillerPool;
use crate::timing::ms;
use crate::token::CompletionToken;

use super::timeline::{HoldGate, MotionPhase};

/// How a phase ended
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PhaseOutcome {
    Completed,
    /// Skip observed; distance covered so far
    Skipped { travelled: f64 },
}

/// Play one phase, polling the skip flag every frame
pub async fn play_phase(phase: &MotionPhase, ctx: &RoundContext, frame: Duration) -> PhaseOutcome {
    let total = ms(phase.duration_ms);
    let started = Instant::now();
    loop {
        let elapsed = started.elapsed();
        if ctx.is_skip_active() {
            let progress = if total.is_zero() {
                1.0
            } else {
                elapsed.as_secs_f64() / total.as_secs_f64()
            };
            return PhaseOutcome::Skipped {
                travelled: phase.travelled(progress),
            };
        }
        if elapsed >= total {
            return PhaseOutcome::Completed;
        }
        tokio::time::sleep((total - elapsed).min(frame)).await;
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILLER CONVEYOR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq)]
struct FillerSlot {
    offset_px: f64,
    symbol: u32,
}

/// Endless strip of filler symbols for a held reel
///
/// Slots move down; one that passes the bottom edge jumps back above the
/// top with a fresh symbol.
#[derive(Debug, Clone)]
pub struct FillerConveyor {
    reel: u8,
    slots: Vec<FillerSlot>,
    visible_px: f64,
    span_px: f64,
    recycled: u32,
}

impl FillerConveyor {
    pub fn new(reel: u8, rows: u8, pitch: f64, pool: &mut FillerPool) -> Self {
        let count = rows as usize + 1;
        let slots = (0..count)
            .map(|i| FillerSlot {
                offset_px: (i as f64 - 1.0) * pitch,
                symbol: pool.pick(),
            })
            .collect();
        Self {
            reel,
            slots,
            visible_px: rows as f64 * pitch,
            span_px: count as f64 * pitch,
            recycled: 0,
        }
    }

    /// Move every slot down by `distance_px`; returns how many were recycled
    pub fn advance(&mut self, distance_px: f64, pool: &mut FillerPool, presenter: &dyn ReelPresenter) -> u32 {
        let mut recycled = 0;
        for slot in &mut self.slots {
            slot.offset_px += distance_px;
            while slot.offset_px >= self.visible_px {
                slot.offset_px -= self.span_px;
                slot.symbol = pool.pick();
                presenter.filler_recycled(self.reel, slot.symbol);
                recycled += 1;
            }
        }
        self.recycled += recycled;
        recycled
    }

    /// Symbols top to bottom
    pub fn symbols(&self) -> Vec<u32> {
        let mut slots = self.slots.clone();
        slots.sort_by(|a, b| a.offset_px.total_cmp(&b.offset_px));
        slots.into_iter().map(|s| s.symbol).collect()
    }

    pub fn recycled(&self) -> u32 {
        self.recycled
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HOLD LOOP
// ═══════════════════════════════════════════════════════════════════════════════

impl HoldGate {
    /// Stage reached and left neighbour stopped
    pub fn is_open(&self, ctx: &RoundContext, tokens: &[CompletionToken]) -> bool {
        let stage_ok = self.stage.is_none_or(|key| ctx.stage_reached(&key));
        let previous_ok = self
            .previous_reel
            .is_none_or(|p| tokens.get(p as usize).is_none_or(CompletionToken::is_resolved));
        stage_ok && previous_ok
    }

    fn release_reason(&self) -> HoldRelease {
        if self.stage.is_some() {
            HoldRelease::StageActive
        } else {
            HoldRelease::PreviousReelStopped
        }
    }
}

/// Everything a hold loop needs
pub struct HoldLoop<'a> {
    pub reel: u8,
    pub rows: u8,
    pub gate: HoldGate,
    pub config: &'a ReelDropConfig,
    pub ctx: &'a RoundContext,
    pub tokens: &'a [CompletionToken],
    pub pool: &'a Arc<Mutex<FillerPool>>,
    pub presenter: &'a dyn ReelPresenter,
}

impl HoldLoop<'_> {
    /// Spin fillers until the gate opens, skip arrives or the safety timer fires
    pub async fn run(&self) -> (HoldRelease, u32) {
        let frame = ms(self.config.frame_ms);
        let deadline = Instant::now() + ms(self.config.hold_timeout_ms);
        let mut conveyor = FillerConveyor::new(
            self.reel,
            self.rows,
            self.config.cell_pitch_px,
            &mut self.pool.lock(),
        );

        loop {
            if self.ctx.is_skip_active() {
                return (HoldRelease::Skip, conveyor.recycled());
            }
            if self.gate.is_open(self.ctx, self.tokens) {
                return (self.gate.release_reason(), conveyor.recycled());
            }
            if Instant::now() >= deadline {
                log::warn!(
                    "[ReelDrop] reel {} hold timed out after {}ms, releasing",
                    self.reel,
                    self.config.hold_timeout_ms
                );
                return (HoldRelease::Timeout, conveyor.recycled());
            }

            let boost = if self.ctx.active_stage().is_some() {
                self.config.hold_stage_boost
            } else {
                1.0
            };
            let speed = self.config.base_speed_px_per_ms * self.config.hold_speed_multiplier * boost;
            {
                let mut pool = self.pool.lock();
                conveyor.advance(speed * self.config.frame_ms, &mut pool, self.presenter);
            }
            tokio::time::sleep(frame).await;
        }
    }
}
