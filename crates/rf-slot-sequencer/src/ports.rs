//! Collaborator ports
//!
//! The core never renders, plays audio or shows dialogs itself. It talks to
//! the host through these narrow traits; every long-running request hands
//! back a [`CompletionToken`] the sequencer may await.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EffectError;
use crate::grid::Cell;
use crate::reel_drop::MotionPhase;
use crate::token::CompletionToken;

/// Where a named effect plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "at", rename_all = "snake_case")]
pub enum EffectPosition {
    #[default]
    Screen,
    Reel { reel: u8 },
    Cell { col: u8, row: u8 },
}

/// Audio + visual effect requests
pub trait EffectPort: Send + Sync {
    fn play_sound(&self, _name: &str) {}

    fn darken_background(&self) -> CompletionToken {
        CompletionToken::resolved("darken")
    }

    fn restore_background(&self) -> CompletionToken {
        CompletionToken::resolved("restore")
    }

    /// Is this asset loaded and playable?
    fn has_asset(&self, _name: &str) -> bool {
        true
    }

    /// Run a named effect; the token resolves when it ends
    fn run_effect(
        &self,
        name: &str,
        _at: EffectPosition,
        _duration: Duration,
    ) -> Result<CompletionToken, EffectError> {
        Ok(CompletionToken::resolved(name))
    }
}

/// Reel motion presentation
pub trait ReelPresenter: Send + Sync {
    fn phase_started(&self, _reel: u8, _phase: &MotionPhase) {}
    fn filler_recycled(&self, _reel: u8, _symbol: u32) {}
    fn release_spawned(&self, _reel: u8, _symbols: &[u32]) {}
    fn reel_settled(&self, _reel: u8, _symbols: &[u32]) {}
}

/// Win line presentation
pub trait WinPresenter: Send + Sync {
    fn highlight(&self, _line_index: usize, _cells: &[Cell]) {}

    /// Directional line draw across the full shape
    fn draw_line(&self, line_index: usize, _shape: &[(u8, u8)], _duration: Duration) -> Result<CompletionToken, EffectError> {
        Ok(CompletionToken::resolved(format!("line-{line_index}")))
    }

    fn clear_line(&self, _line_index: usize) {}
}

/// Dialog / overlay queue state
pub trait OverlayQueue: Send + Sync {
    fn is_blocking(&self) -> bool {
        false
    }

    /// One-shot signal for the currently blocking overlay, if it offers one
    fn closed_signal(&self) -> Option<CompletionToken> {
        None
    }

    /// Was the last overlay closed by the player?
    fn last_close_user_dismissed(&self) -> bool {
        false
    }
}

/// No-op collaborators (headless runs)
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentPorts;

impl EffectPort for SilentPorts {}
impl ReelPresenter for SilentPorts {}
impl WinPresenter for SilentPorts {}
impl OverlayQueue for SilentPorts {}

/// Collaborators that describe every request in the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingPorts;

impl EffectPort for LoggingPorts {
    fn play_sound(&self, name: &str) {
        log::info!("[Effects] sound {name}");
    }

    fn darken_background(&self) -> CompletionToken {
        log::info!("[Effects] darken background");
        CompletionToken::resolved("darken")
    }

    fn restore_background(&self) -> CompletionToken {
        log::info!("[Effects] restore background");
        CompletionToken::resolved("restore")
    }

    fn run_effect(&self, name: &str, at: EffectPosition, duration: Duration) -> Result<CompletionToken, EffectError> {
        log::info!("[Effects] {name} at {at:?} for {}ms", duration.as_millis());
        Ok(CompletionToken::resolved(name))
    }
}

impl ReelPresenter for LoggingPorts {
    fn phase_started(&self, reel: u8, phase: &MotionPhase) {
        log::debug!(
            "[Reels] reel {reel} {:?} {:.0}px over {:.0}ms",
            phase.kind,
            phase.distance_px,
            phase.duration_ms
        );
    }

    fn reel_settled(&self, reel: u8, symbols: &[u32]) {
        log::info!("[Reels] reel {reel} settled {symbols:?}");
    }
}

impl WinPresenter for LoggingPorts {
    fn highlight(&self, line_index: usize, cells: &[Cell]) {
        let positions: Vec<(u8, u8)> = cells.iter().map(Cell::position).collect();
        log::info!("[Wins] line {line_index} cells {positions:?}");
    }
}

impl OverlayQueue for LoggingPorts {}

/// Every collaborator the sequencer talks to
#[derive(Clone)]
pub struct Collaborators {
    pub effects: Arc<dyn EffectPort>,
    pub reels: Arc<dyn ReelPresenter>,
    pub wins: Arc<dyn WinPresenter>,
    pub overlays: Arc<dyn OverlayQueue>,
}

impl Collaborators {
    pub fn silent() -> Self {
        Self::uniform(Arc::new(SilentPorts))
    }

    pub fn logging() -> Self {
        Self::uniform(Arc::new(LoggingPorts))
    }

    /// One object serving every port
    pub fn uniform<P>(ports: Arc<P>) -> Self
    where
        P: EffectPort + ReelPresenter + WinPresenter + OverlayQueue + 'static,
    {
        Self {
            effects: ports.clone(),
            reels: ports.clone(),
            wins: ports.clone(),
            overlays: ports,
        }
    }

    pub fn with_effects(mut self, effects: Arc<dyn EffectPort>) -> Self {
        self.effects = effects;
        self
    }

    pub fn with_reels(mut self, reels: Arc<dyn ReelPresenter>) -> Self {
        self.reels = reels;
        self
    }

    pub fn with_wins(mut self, wins: Arc<dyn WinPresenter>) -> Self {
        self.wins = wins;
        self
    }

    pub fn with_overlays(mut self, overlays: Arc<dyn OverlayQueue>) -> Self {
        self.overlays = overlays;
        self
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::silent()
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VARIANT RESOLVER
// ═══════════════════════════════════════════════════════════════════════════════

/// Prioritized effect asset lookup with a static fallback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantResolver {
    candidates: Vec<String>,
    fallback: String,
}

impl VariantResolver {
    pub fn new(candidates: Vec<String>, fallback: impl Into<String>) -> Self {
        Self {
            candidates,
            fallback: fallback.into(),
        }
    }

    /// `<name>_anim`, then `<name>`, falling back to `<name>_static`
    pub fn for_effect(name: &str) -> Self {
        Self::new(
            vec![format!("{name}_anim"), name.to_string()],
            format!("{name}_static"),
        )
    }

    /// First available candidate, else the fallback
    pub fn resolve(&self, effects: &dyn EffectPort) -> &str {
        self.candidates
            .iter()
            .find(|c| effects.has_asset(c))
            .map(String::as_str)
            .unwrap_or(self.fallback.as_str())
    }

    /// Run the best available variant; degrades down the list on failure
    ///
    /// Never fails: when nothing can be played, an already-resolved token comes back.
    pub fn run(&self, effects: &dyn EffectPort, at: EffectPosition, duration: Duration) -> CompletionToken {
        let available = self
            .candidates
            .iter()
            .filter(|c| effects.has_asset(c))
            .chain(std::iter::once(&self.fallback));

        for name in available {
            match effects.run_effect(name, at, duration) {
                Ok(token) => return token,
                Err(e) => log::warn!("[Effects] {name} failed: {e}, trying next variant"),
            }
        }
        log::warn!("[Effects] no playable variant for {}, continuing without it", self.fallback);
        CompletionToken::resolved(self.fallback.clone())
    }
}
