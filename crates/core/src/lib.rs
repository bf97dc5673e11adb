//! Shared data model, configuration and error types for the funnel builder.

pub mod config;
pub mod error;
pub mod event_bus;
pub mod types;

pub use config::AppConfig;
pub use error::{FunnelError, FunnelResult};
