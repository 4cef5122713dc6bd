//! Core utilities, configuration, and common functionality

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod retry;
pub mod utils;

// Re-exports for convenience
pub use error::AppError;
pub use logging::{init_logger, log_pipeline_configuration};
