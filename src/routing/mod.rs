//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path, If-None-Match)
//!     → router.rs (percent-decode, exact manifest lookup)
//!     → dispatch.rs (ordered rule chain)
//!     → NotModified | Static | Render | Regenerate
//!
//! Startup:
//!     static-manifest.json
//!     → StaticManifest (validated)
//!     → Freeze as immutable Router
//! ```
//!
//! # Design Decisions
//! - Manifest loaded once, immutable at runtime
//! - Deterministic: same input always yields the same dispatch
//! - First claiming rule wins; static assets always beat dynamic paths

pub mod dispatch;
pub mod router;

pub use dispatch::{classify, Dispatch, DispatchContext, Rule, RULES};
pub use router::{decode_path, Route, Router, RoutingError};
