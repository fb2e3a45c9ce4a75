//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Load manifest → Open ISR cache → Build server → Listen
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Finish in-flight → Flush ISR → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then manifest, then listeners
//! - The ISR flush has no deadline; exiting early would lose rendered pages

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{drain, Shutdown};
pub use signals::{spawn_signal_listener, wait_for_termination};
pub use startup::{prepare, prepare_with_renderer, read_build_id, StartupError};
