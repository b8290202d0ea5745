//! Win Sequencing Controller
//!
//! Cycles resolved paylines: highlight, line draw, hold for the pacing
//! interval, tear down, next. Emits `win_sequence_start` at most once and
//! `win_sequence_stop` exactly once per round, whichever path ends the
//! first pass (pass complete, no wins, interrupt, dropped task).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use rf_stage::{Stage, StagePayload, TimingProfile, WinDisplayMode, WinStopReason};

use crate::config::WinSequenceConfig;
use crate::ports::WinPresenter;
use crate::resolver::ResolvedPayline;
use crate::signals::SignalBus;
use crate::timing::ms;
use crate::token::CompletionToken;

const SOURCE: &str = "win_sequence";

/// Summary of a finished (or interrupted) display
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinRun {
    /// Line presentations shown, across all loops
    pub shown: u32,
    /// Completed passes
    pub loops: u32,
    pub interrupted: bool,
}

fn fire_stop(latch: &CompletionToken, bus: &SignalBus, reason: WinStopReason) {
    if latch.resolve() {
        log::debug!("[WinSeq] stop ({reason:?})");
        bus.emit(Stage::WinSequenceStop { reason }, SOURCE);
    }
}

/// Fires `Interrupted` if the task ends without having stopped
struct StopOnDrop {
    latch: CompletionToken,
    bus: SignalBus,
}

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        fire_stop(&self.latch, &self.bus, WinStopReason::Interrupted);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONTROLLER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default)]
pub struct WinSequenceController {
    config: WinSequenceConfig,
}

impl WinSequenceController {
    pub fn new(config: WinSequenceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WinSequenceConfig {
        &self.config
    }

    /// Single pass mid-autoplay and on scatter transitions, looping otherwise
    pub fn choose_mode(autoplay_continues: bool, scatter_transition: bool) -> WinDisplayMode {
        if autoplay_continues || scatter_transition {
            WinDisplayMode::SinglePass
        } else {
            WinDisplayMode::Looping
        }
    }

    /// Time each line stays on screen (ms)
    pub fn line_interval_ms(&self, mode: WinDisplayMode, line_count: usize, profile: TimingProfile) -> f64 {
        let cfg = &self.config;
        match mode {
            WinDisplayMode::SinglePass => {
                let budget = if profile.is_fast() {
                    cfg.single_pass_budget_turbo_ms
                } else {
                    cfg.single_pass_budget_ms
                };
                (budget / line_count.max(1) as f64).max(cfg.single_pass_min_line_ms)
            }
            WinDisplayMode::Looping => {
                if profile.is_fast() {
                    cfg.loop_min_line_ms
                } else {
                    cfg.loop_default_line_ms.max(cfg.loop_min_line_ms)
                }
            }
        }
    }

    /// Start displaying `lines`
    ///
    /// With no lines the stop signal goes out immediately and no start is emitted.
    pub fn start(
        &self,
        lines: Vec<ResolvedPayline>,
        mode: WinDisplayMode,
        profile: TimingProfile,
        bus: &SignalBus,
        presenter: Arc<dyn WinPresenter>,
    ) -> WinSequenceHandle {
        let stopped = CompletionToken::new("win-first-pass");
        let cancel = CompletionToken::new("win-cancel");

        if lines.is_empty() {
            fire_stop(&stopped, bus, WinStopReason::NoWins);
            return WinSequenceHandle {
                mode,
                line_count: 0,
                stopped,
                cancel,
                bus: bus.clone(),
                task: None,
            };
        }

        let line_count = lines.len();
        let interval_ms = self.line_interval_ms(mode, line_count, profile);
        bus.emit(
            Stage::WinSequenceStart {
                line_count: u8::try_from(line_count).unwrap_or(u8::MAX),
                mode,
            },
            SOURCE,
        );
        log::debug!("[WinSeq] {line_count} lines, {mode:?}, {interval_ms:.0}ms each");

        let display = LineDisplay {
            lines,
            mode,
            interval_ms,
            draw_ms: self.config.line_draw_ms.min(interval_ms),
            max_loops: self.config.max_loops,
            presenter,
            bus: bus.clone(),
            cancel: cancel.clone(),
            guard: StopOnDrop {
                latch: stopped.clone(),
                bus: bus.clone(),
            },
        };

        WinSequenceHandle {
            mode,
            line_count,
            stopped,
            cancel,
            bus: bus.clone(),
            task: Some(tokio::spawn(display.run())),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DISPLAY TASK
// ═══════════════════════════════════════════════════════════════════════════════

struct LineDisplay {
    lines: Vec<ResolvedPayline>,
    mode: WinDisplayMode,
    interval_ms: f64,
    draw_ms: f64,
    max_loops: Option<u32>,
    presenter: Arc<dyn WinPresenter>,
    bus: SignalBus,
    cancel: CompletionToken,
    guard: StopOnDrop,
}

impl LineDisplay {
    async fn run(self) -> WinRun {
        let mut run = WinRun::default();
        let mut previous: Option<usize> = None;

        'passes: loop {
            for (i, line) in self.lines.iter().enumerate() {
                if let Some(prev) = previous.take() {
                    self.presenter.clear_line(prev);
                }
                self.show(i, line);
                previous = Some(i);
                run.shown += 1;

                tokio::select! {
                    _ = tokio::time::sleep(ms(self.interval_ms)) => {}
                    _ = self.cancel.wait() => {
                        run.interrupted = true;
                        break 'passes;
                    }
                }
            }

            run.loops += 1;
            if run.loops == 1 {
                fire_stop(&self.guard.latch, &self.bus, WinStopReason::PassComplete);
            }
            if self.mode == WinDisplayMode::SinglePass || self.max_loops.is_some_and(|m| run.loops >= m) {
                break;
            }
        }

        if let Some(prev) = previous {
            self.presenter.clear_line(prev);
        }
        run
    }

    fn show(&self, index: usize, line: &ResolvedPayline) {
        self.presenter.highlight(index, &line.cells);
        if let Err(e) = self.presenter.draw_line(index, &line.line_cells, ms(self.draw_ms)) {
            log::warn!("[WinSeq] line {index} draw failed: {e}, highlighting only");
        }
        let payload = StagePayload::new()
            .cells(line.positions())
            .win_amount(line.descriptor.win)
            .duration(self.interval_ms);
        self.bus.emit_with(
            Stage::WinLineShow {
                line_index: u8::try_from(index).unwrap_or(u8::MAX),
                template_index: line.shape.template_index(),
                cell_count: u8::try_from(line.cells.len()).unwrap_or(u8::MAX),
            },
            payload,
            SOURCE,
        );
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Running win display; dropping it cancels the display
pub struct WinSequenceHandle {
    mode: WinDisplayMode,
    line_count: usize,
    stopped: CompletionToken,
    cancel: CompletionToken,
    bus: SignalBus,
    task: Option<JoinHandle<WinRun>>,
}

impl WinSequenceHandle {
    pub fn mode(&self) -> WinDisplayMode {
        self.mode
    }

    pub fn line_count(&self) -> usize {
        self.line_count
    }

    /// Has the stop signal gone out?
    pub fn is_stopped(&self) -> bool {
        self.stopped.is_resolved()
    }

    /// Token resolved together with the stop signal
    pub fn stop_token(&self) -> CompletionToken {
        self.stopped.clone()
    }

    pub async fn wait_first_pass(&self) {
        self.stopped.wait().await;
    }

    /// Stop now (manual spin); stop is signalled before lines are torn down
    pub async fn interrupt(mut self) -> WinRun {
        fire_stop(&self.stopped, &self.bus, WinStopReason::Interrupted);
        self.cancel.resolve();
        self.join().await
    }

    /// Wait for the display to end on its own
    pub async fn finish(mut self) -> WinRun {
        self.join().await
    }

    async fn join(&mut self) -> WinRun {
        match self.task.take() {
            Some(task) => match task.await {
                Ok(run) => run,
                Err(e) => {
                    log::error!("[WinSeq] display task failed: {e}");
                    WinRun {
                        interrupted: true,
                        ..WinRun::default()
                    }
                }
            },
            None => WinRun::default(),
        }
    }
}

impl Drop for WinSequenceHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.cancel.resolve();
        }
    }
}

impl std::fmt::Debug for WinSequenceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WinSequenceHandle")
            .field("mode", &self.mode)
            .field("line_count", &self.line_count)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
