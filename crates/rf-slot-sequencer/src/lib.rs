//! # rf-slot-sequencer — Round Sequencing Core for FluxForge reel games
//!
//! Takes a server-computed round result and sequences its presentation:
//! which paylines are shown, when scatter anticipation escalates, how each
//! reel drops and settles, how wins are cycled and when the next automated
//! spin may go.
//!
//! ## Features
//!
//! - **Payline Resolver**: exact matched cells per win, honoring collector substitution
//! - **Scatter Anticipation**: 3 → 4 → 5 staged suspense with per-grid reel extension
//! - **Reel Drop Scheduler**: per-reel timelines, hold-and-spin, turbo and skip compression
//! - **Win Sequencing**: looping / single-pass display with exactly-once stop signal
//! - **Autoplay Gate**: overlay, critical lock and stage-complete gating for automated spins
//!
//! ## Architecture
//!
//! ```text
//! RoundSequencer
//!     │
//!     ├── PaylineResolver (WinlineSet + SymbolRules)
//!     ├── ScatterAnticipation (AnticipationPlan per grid)
//!     ├── ReelDropScheduler (ReelTimeline per reel, CompletionToken per reel)
//!     ├── WinSequenceController
//!     └── AutoplayGate
//!           │
//!           v
//!     RoundContext (turbo / skip / active stage / CriticalSequenceLock)
//!           │
//!           v
//!     SignalBus → StageEvent stream + StageTrace
//! ```

pub mod anticipation;
pub mod autoplay;
pub mod config;
pub mod context;
pub mod error;
pub mod grid;
pub mod lock;
pub mod ports;
pub mod reel_drop;
pub mod resolver;
pub mod result;
pub mod round;
pub mod signals;
pub mod symbols;
pub mod timing;
pub mod token;
pub mod win_sequence;
pub mod winlines;

pub use anticipation::*;
pub use autoplay::*;
pub use config::*;
pub use context::*;
pub use error::*;
pub use grid::*;
pub use lock::*;
pub use ports::*;
pub use reel_drop::{DropReport, ReelDropScheduler, ReelRun, ReelTimeline};
pub use resolver::*;
pub use result::*;
pub use round::*;
pub use signals::*;
pub use symbols::*;
pub use timing::*;
pub use token::*;
pub use win_sequence::*;
pub use winlines::*;
