//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID)
//!     → routing (manifest lookup, dispatch)
//!     → response.rs (304 / static body) or render / ISR collaborator
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{request_id_of, MakeRequestUuidV4, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
