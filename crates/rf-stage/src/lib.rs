//! # rf-stage — FluxForge Round Lifecycle Stages
//!
//! Defines the canonical signals a reel round passes through.
//! Hosts (audio, UI, autoplay) never observe sequencer internals, only STAGES.
//!
//! ## Philosophy
//!
//! Every round, regardless of the game skin, passes through the same phases:
//! - Round starts → Reels stop (one by one) → Wins displayed → Next spin gated
//!
//! This crate defines those stages, the event wrapper carrying timing and
//! payload, and the trace used to verify a round's lifecycle.

pub mod stage;
pub mod event;
pub mod trace;
pub mod timing;
pub mod taxonomy;

pub use stage::*;
pub use event::*;
pub use trace::*;
pub use timing::*;
pub use taxonomy::*;
