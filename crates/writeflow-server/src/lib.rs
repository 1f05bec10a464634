//! HTTP surface of writeflow.
//!
//! Pipeline, code and chat runs stream their progress as server-sent events;
//! errors found before a stream opens come back as JSON error bodies.

pub mod config;
pub mod error;
pub mod routes;
pub mod sse;
pub mod state;

pub use config::{ConfigError, ServerConfig};
pub use routes::build_app;
pub use state::AppState;
