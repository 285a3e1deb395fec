//! # Standardized Error Types
//!
//! The error taxonomy shared by every crate in the diagnostics workspace.
//! Crate-local error enums map onto [`ErrorKind`] so that logging and
//! metrics see one consistent vocabulary.

use std::fmt;
use std::error::Error as StdError;
use serde::{Serialize, Deserialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

/// A type alias for Result with the error type defaulting to our Error
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The severity level of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Expected outcome, not an actual error
    Info,
    /// A degraded but still successful outcome
    Minor,
    /// A significant issue that may impact some functionality
    Major,
    /// A critical issue that aborts the current operation
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Minor => write!(f, "MINOR"),
            Severity::Major => write!(f, "MAJOR"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Major
    }
}

/// Categorizes the ways a diagnosis can degrade or fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The input does not look like a failure notification
    RejectedInput,
    /// A single probe failed; isolated to that probe
    ProbeFailure,
    /// The global collection deadline elapsed with probes outstanding
    DeadlineExceeded,
    /// Credentials could not be resolved; fatal to the diagnosis
    CredentialFailure,
    /// The analysis provider failed; recovered with fallback text
    AnalysisFailure,
    /// Delivering the result to the transport failed
    TransportFailure,
    /// Invalid or missing configuration
    Configuration,
    /// Unexpected internal error
    Internal,
}

impl ErrorKind {
    /// Severity used when an error of this kind is created
    pub fn default_severity(&self) -> Severity {
        match self {
            ErrorKind::RejectedInput => Severity::Info,
            ErrorKind::ProbeFailure | ErrorKind::DeadlineExceeded | ErrorKind::AnalysisFailure => {
                Severity::Minor
            }
            ErrorKind::TransportFailure => Severity::Major,
            ErrorKind::CredentialFailure | ErrorKind::Configuration | ErrorKind::Internal => {
                Severity::Critical
            }
        }
    }

    /// Whether an error of this kind fails the whole diagnosis
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ErrorKind::CredentialFailure | ErrorKind::Configuration | ErrorKind::Internal
        )
    }

    /// Stable short code used in logs and metric names
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::RejectedInput => "rejected_input",
            ErrorKind::ProbeFailure => "probe_failure",
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
            ErrorKind::CredentialFailure => "credential_failure",
            ErrorKind::AnalysisFailure => "analysis_failure",
            ErrorKind::TransportFailure => "transport_failure",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::RejectedInput => write!(f, "Rejected Input"),
            ErrorKind::ProbeFailure => write!(f, "Probe Failure"),
            ErrorKind::DeadlineExceeded => write!(f, "Deadline Exceeded"),
            ErrorKind::CredentialFailure => write!(f, "Credential Failure"),
            ErrorKind::AnalysisFailure => write!(f, "Analysis Failure"),
            ErrorKind::TransportFailure => write!(f, "Transport Failure"),
            ErrorKind::Configuration => write!(f, "Configuration Error"),
            ErrorKind::Internal => write!(f, "Internal Error"),
        }
    }
}

/// Structured error record used for logging and reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Error {
    /// A unique identifier for this error instance
    pub id: Uuid,
    /// The kind of error that occurred
    pub kind: ErrorKind,
    /// Detailed error message
    pub message: String,
    /// The time when the error occurred
    pub timestamp: DateTime<Utc>,
    /// Error severity level
    pub severity: Severity,
    /// The component where the error originated
    pub service: Option<String>,
    /// Correlation ID (the diagnosis id) for request tracing
    pub correlation_id: Option<String>,
    /// Additional context as key-value pairs
    #[serde(default)]
    pub context: serde_json::Map<String, serde_json::Value>,
}

impl Error {
    /// Creates a new error with the specified kind and message
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            message: message.into(),
            timestamp: Utc::now(),
            severity: kind.default_severity(),
            service: None,
            correlation_id: None,
            context: serde_json::Map::new(),
        }
    }

    /// Sets the error severity
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Sets the originating component
    pub fn service<S: Into<String>>(mut self, service: S) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Sets the correlation id
    pub fn correlation_id<S: Into<String>>(mut self, correlation_id: S) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Adds context information to the error
    pub fn context<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Serialize,
    {
        if let Ok(value) = serde_json::to_value(value) {
            self.context.insert(key.into(), value);
        }
        self
    }

    /// Returns true if this error fails the whole diagnosis
    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.kind, self.message)?;

        if let Some(service) = &self.service {
            write!(f, " [Service: {}]", service)?;
        }

        if let Some(correlation_id) = &self.correlation_id {
            write!(f, " [CorrelationID: {}]", correlation_id)?;
        }

        Ok(())
    }
}

impl StdError for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorKind::Internal, format!("I/O error: {}", err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorKind::Internal, format!("JSON error: {}", err))
    }
}
