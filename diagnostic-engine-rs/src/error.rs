// diagnostic-engine-rs/src/error.rs
//
// Failures that end a diagnosis without a result. Probe and analysis
// errors never get here; they degrade the result instead.

use error_handling::{Error, ErrorKind};
use thiserror::Error;

use crate::config::ConfigError;
use crate::credentials::CredentialError;

pub const SERVICE_NAME: &str = "diagnostic-engine";

#[derive(Debug, Error)]
pub enum DiagnosisError {
    #[error("credential resolution failed: {0}")]
    Credentials(#[from] CredentialError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to initialize {component}: {reason}")]
    Setup { component: &'static str, reason: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl DiagnosisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DiagnosisError::Credentials(_) => ErrorKind::CredentialFailure,
            DiagnosisError::Config(_) | DiagnosisError::Setup { .. } => ErrorKind::Configuration,
            DiagnosisError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Structured record for logging, tagged with the diagnosis id
    pub fn to_structured(&self, diagnosis_id: &str) -> Error {
        let error = Error::new(self.kind(), self.to_string())
            .service(SERVICE_NAME)
            .correlation_id(diagnosis_id);

        match self {
            DiagnosisError::Credentials(CredentialError::Missing { scope, .. })
            | DiagnosisError::Credentials(CredentialError::Backend { scope, .. }) => error.context("scope", scope),
            DiagnosisError::Setup { component, .. } => error.context("component", component),
            _ => error,
        }
    }
}

impl From<regex::Error> for DiagnosisError {
    fn from(err: regex::Error) -> Self {
        DiagnosisError::Setup {
            component: "pattern set",
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use error_handling::Severity;

    #[test]
    fn credential_failures_are_critical() {
        let err = DiagnosisError::from(CredentialError::Missing {
            scope: "llm".to_string(),
            variable: "DIAG_CREDENTIAL_LLM".to_string(),
        });
        let structured = err.to_structured("diag-1");

        assert_eq!(structured.kind, ErrorKind::CredentialFailure);
        assert_eq!(structured.severity, Severity::Critical);
        assert_eq!(structured.correlation_id.as_deref(), Some("diag-1"));
        assert_eq!(structured.context["scope"], "llm");
        assert!(structured.is_fatal());
    }

    #[test]
    fn internal_errors_map_to_internal_kind() {
        assert_eq!(DiagnosisError::Internal("boom".to_string()).kind(), ErrorKind::Internal);
    }
}
