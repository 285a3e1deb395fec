//! # Structured Logging
//!
//! Subscriber setup for every binary in the workspace. Output is either
//! flattened JSON or human-readable text, optionally mirrored into a daily
//! rolling file. Records emitted through the `log` facade are bridged into
//! the same subscriber.

use std::sync::atomic::{AtomicBool, Ordering};
use serde::{Serialize, Deserialize};
use tracing_subscriber::{fmt, EnvFilter, layer::SubscriberExt, util::SubscriberInitExt, Registry};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_appender::non_blocking::NonBlocking;
use crate::types::{Result, Error, ErrorKind, Severity};

// Flag to track if logging has been initialized
static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Configuration for the logging system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// The log level to use (trace, debug, info, warn, error)
    pub level: String,
    /// The service name for identification
    pub service_name: String,
    /// Directory for the rolling log file; no file output when unset
    pub log_dir: Option<String>,
    /// Whether to use JSON formatting
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            service_name: "unknown-service".to_string(),
            log_dir: None,
            json_format: true,
        }
    }
}

impl LoggingConfig {
    /// Builds the configuration from `LOG_LEVEL`, `LOG_JSON` and `LOG_DIR`
    pub fn from_env(service_name: &str) -> Self {
        let defaults = Self::default();
        Self {
            level: config_rs::get_env_string("LOG_LEVEL").unwrap_or(defaults.level),
            service_name: service_name.to_string(),
            log_dir: config_rs::get_env_string("LOG_DIR"),
            json_format: config_rs::get_env_bool("LOG_JSON", defaults.json_format),
        }
    }
}

/// Initializes the structured logging system.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    if LOGGING_INITIALIZED.load(Ordering::SeqCst) {
        return Ok(());
    }

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let json_layer = config.json_format.then(|| {
        fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_target(true)
            .with_span_list(true)
    });

    let text_layer = (!config.json_format).then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
    });

    let file_layer = config.log_dir.as_ref().map(|log_dir| {
        let file_appender = RollingFileAppender::new(
            Rotation::DAILY,
            log_dir,
            format!("{}.log", config.service_name),
        );
        let (non_blocking, guard) = NonBlocking::new(file_appender);

        // The guard flushes on drop; keep it for the life of the process
        let _ = Box::leak(Box::new(guard));

        fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
    });

    Registry::default()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| {
            Error::new(ErrorKind::Configuration, format!("Failed to set global subscriber: {}", e))
                .service(config.service_name.clone())
        })?;

    LOGGING_INITIALIZED.store(true, Ordering::SeqCst);

    tracing::info!(
        service = %config.service_name,
        level = %config.level,
        json = %config.json_format,
        file = ?config.log_dir,
        "Structured logging initialized"
    );

    Ok(())
}

/// Logs an error at the level matching its severity
pub fn log_structured_error(error: &Error) {
    use tracing::{error, warn, info};

    let correlation_id = error.correlation_id.as_deref().unwrap_or("unknown");
    let service = error.service.as_deref().unwrap_or("unknown");

    match error.severity {
        Severity::Critical => {
            error!(
                error_id = %error.id,
                error_kind = %error.kind,
                code = error.kind.code(),
                correlation_id = %correlation_id,
                service = %service,
                message = %error.message,
                severity = %error.severity,
                timestamp = %error.timestamp,
                context = ?error.context,
                "Critical error occurred"
            );
        }
        Severity::Major => {
            error!(
                error_id = %error.id,
                error_kind = %error.kind,
                code = error.kind.code(),
                correlation_id = %correlation_id,
                service = %service,
                message = %error.message,
                severity = %error.severity,
                "Error occurred"
            );
        }
        Severity::Minor => {
            warn!(
                error_id = %error.id,
                error_kind = %error.kind,
                code = error.kind.code(),
                correlation_id = %correlation_id,
                service = %service,
                message = %error.message,
                "Degraded operation"
            );
        }
        Severity::Info => {
            info!(
                error_kind = %error.kind,
                code = error.kind.code(),
                correlation_id = %correlation_id,
                service = %service,
                message = %error.message,
                "Informational outcome"
            );
        }
    }
}
