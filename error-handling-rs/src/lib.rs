//! # Error Handling Framework
//!
//! Shared error handling for the failure diagnostics workspace:
//!
//! - A single error taxonomy covering every way a diagnosis can degrade or fail
//! - Structured logging initialisation on top of `tracing-subscriber`
//! - A fallback helper for operations that must always yield a value
//!

pub mod types;
pub mod logging;
pub mod fallback;

// Re-export commonly used types
pub use types::{Error, Result, ErrorKind, Severity};
pub use logging::{init_logging, log_structured_error, LoggingConfig};
pub use fallback::{with_fallback, FallbackResult};

/// Initializes logging for `service_name` using environment configuration
pub fn init(service_name: &str) -> Result<()> {
    init_logging(LoggingConfig::from_env(service_name))
}
