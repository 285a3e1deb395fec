// diagnostic-engine-rs/src/analysis/mod.rs
//
// Root cause analysis of a collected context.
//
// The provider is optional; when it is missing or fails, the orchestrator
// substitutes `fallback_summary`.

pub mod llm_client;
pub mod prompt;

use async_trait::async_trait;
use error_handling::ErrorKind;
use thiserror::Error;

use crate::credentials::CredentialSet;
use crate::model::{ContextClues, DiagnosticContext, ParsedFailure};

pub use llm_client::LlmClient;
pub use prompt::PromptBuilder;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("missing credential for scope '{0}'")]
    MissingCredential(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("empty response from analysis provider")]
    EmptyResponse,
}

impl AnalysisError {
    /// Every analysis error is recovered with the fallback summary
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::AnalysisFailure
    }
}

#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Reported in `services_called`
    fn name(&self) -> &str;

    fn credential_scope(&self) -> Option<&str> {
        None
    }

    async fn analyze(
        &self,
        context: &DiagnosticContext,
        clues: &ContextClues,
        credentials: &CredentialSet,
    ) -> Result<String, AnalysisError>;
}

/// Basic troubleshooting guide used when analysis is unavailable
pub fn fallback_summary(failure: &ParsedFailure) -> String {
    let task = failure.task_id.as_deref().unwrap_or("unknown");

    format!(
        "## Analysis Unavailable - Basic Troubleshooting Guide\n\n\
         **DAG**: {dag}\n\
         **Task**: {task}\n\
         **Error Type**: {error_type}\n\n\
         ## General Troubleshooting Steps\n\n\
         1. **Check Task Logs**: Review the task logs in the Airflow UI for detailed error messages\n\
         2. **Verify Connections**: Ensure all required connections are properly configured\n\
         3. **Check Resources**: Verify sufficient memory and CPU allocation\n\
         4. **Review Dependencies**: Check if upstream tasks completed successfully\n\
         5. **Validate Data Sources**: Ensure all required tables/files are available\n\n\
         ## Escalation\n\
         Contact the data engineering team if the issue persists after basic troubleshooting.\n",
        dag = failure.dag_id,
        task = task,
        error_type = failure.error_type,
    )
}
