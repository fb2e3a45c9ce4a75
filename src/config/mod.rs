//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → consumed once by startup and by the manifest builder
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no hot reload, the
//!   manifest it points at is frozen for the process lifetime anyway
//! - All fields have defaults to allow minimal configs
//! - `HOST`/`PORT` environment variables override the listener section

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BuildConfig, IsrConfig, ListenerConfig, ObservabilityConfig, PathsConfig, RenderConfig,
    RouteHeaders, ServerConfig,
};
