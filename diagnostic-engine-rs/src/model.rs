// diagnostic-engine-rs/src/model.rs
//
// Records that flow through a diagnosis: the inbound event, the parsed
// failure, the per-diagnosis context accumulator and the final result.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::planner::ProbeName;

/// Sentinel used when no DAG id can be extracted
pub const UNKNOWN_DAG: &str = "unknown_dag";

/// Normalized event handed over by the chat transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEvent {
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub thread_ref: Option<String>,
    #[serde(default)]
    pub message_ts: String,
    #[serde(default)]
    pub raw_text: String,
    /// Set when a bot authored the message
    #[serde(default)]
    pub bot_id: Option<String>,
}

impl FailureEvent {
    pub fn new(channel: impl Into<String>, message_ts: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            thread_ref: None,
            message_ts: message_ts.into(),
            raw_text: raw_text.into(),
            bot_id: None,
        }
    }

    /// Thread to reply into: the existing thread, else the message itself
    pub fn reply_thread(&self) -> &str {
        self.thread_ref.as_deref().unwrap_or(&self.message_ts)
    }
}

/// Closed failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    Timeout,
    Connection,
    Memory,
    Permission,
    Sql,
    Dbt,
    Python,
    Resource,
    General,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Timeout => "timeout",
            ErrorType::Connection => "connection",
            ErrorType::Memory => "memory",
            ErrorType::Permission => "permission",
            ErrorType::Sql => "sql",
            ErrorType::Dbt => "dbt",
            ErrorType::Python => "python",
            ErrorType::Resource => "resource",
            ErrorType::General => "general",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured view of one failure notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedFailure {
    /// Never empty; `unknown_dag` when nothing matched
    pub dag_id: String,
    pub task_id: Option<String>,
    /// Kept as written in the message
    pub execution_date: Option<String>,
    pub error_type: ErrorType,
    /// Always populated
    pub error_message: String,
    pub log_url: Option<String>,
    pub channel: String,
    pub thread_ref: Option<String>,
    pub original_text: String,
}

impl ParsedFailure {
    pub fn has_known_dag(&self) -> bool {
        self.dag_id != UNKNOWN_DAG
    }
}

/// Auxiliary hints pulled from the failure text for the analysis prompt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextClues {
    pub table_names: Vec<String>,
    pub model_names: Vec<String>,
    pub sql_keywords: Vec<String>,
    pub file_paths: Vec<String>,
    pub timestamps: Vec<String>,
}

impl ContextClues {
    pub fn is_empty(&self) -> bool {
        self.table_names.is_empty()
            && self.model_names.is_empty()
            && self.sql_keywords.is_empty()
            && self.file_paths.is_empty()
            && self.timestamps.is_empty()
    }
}

/// Bookkeeping written by the collector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionMetadata {
    /// Probe errors keyed `<probe>_error`
    #[serde(flatten)]
    pub errors: BTreeMap<String, String>,
    pub completed_tasks: Vec<ProbeName>,
    pub total_tasks: usize,
}

impl CollectionMetadata {
    pub fn error_key(name: ProbeName) -> String {
        format!("{}_error", name)
    }

    pub fn error_for(&self, name: ProbeName) -> Option<&str> {
        self.errors.get(&Self::error_key(name)).map(String::as_str)
    }

    pub fn completion_ratio(&self) -> f64 {
        if self.total_tasks == 0 {
            return 0.0;
        }
        self.completed_tasks.len() as f64 / self.total_tasks as f64
    }
}

/// Per-diagnosis accumulator of probe results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticContext {
    pub failure: ParsedFailure,
    pub mwaa_logs: Option<String>,
    pub redshift_audit: Option<Vec<serde_json::Map<String, Value>>>,
    pub cloudwatch_errors: Option<Vec<String>>,
    pub dag_state: Option<serde_json::Map<String, Value>>,
    pub metadata: CollectionMetadata,
}

impl DiagnosticContext {
    pub fn new(failure: ParsedFailure) -> Self {
        Self {
            failure,
            mwaa_logs: None,
            redshift_audit: None,
            cloudwatch_errors: None,
            dag_state: None,
            metadata: CollectionMetadata::default(),
        }
    }

    pub fn has_logs(&self) -> bool {
        self.mwaa_logs.as_deref().map_or(false, |logs| !logs.is_empty())
    }

    pub fn has_dag_state(&self) -> bool {
        self.dag_state.as_ref().map_or(false, |state| !state.is_empty())
    }

    pub fn has_audit_records(&self) -> bool {
        self.redshift_audit.as_ref().map_or(false, |records| !records.is_empty())
    }

    pub fn has_aggregated_errors(&self) -> bool {
        self.cloudwatch_errors.as_ref().map_or(false, |lines| !lines.is_empty())
    }
}

/// Final output of one diagnosis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticResult {
    pub diagnosis_id: String,
    pub context: DiagnosticContext,
    pub analysis: Option<String>,
    pub confidence_score: f64,
    pub processing_time_ms: u64,
    pub services_called: Vec<String>,
    pub errors_encountered: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_thread_prefers_existing_thread() {
        let mut event = FailureEvent::new("C1", "171.5", "DAG x failed");
        assert_eq!(event.reply_thread(), "171.5");

        event.thread_ref = Some("170.1".to_string());
        assert_eq!(event.reply_thread(), "170.1");
    }

    #[test]
    fn event_deserializes_with_missing_optionals() {
        let event: FailureEvent =
            serde_json::from_str(r#"{"channel":"C1","message_ts":"1.0","raw_text":"etl failed"}"#).unwrap();
        assert!(event.thread_ref.is_none());
        assert!(event.bot_id.is_none());
    }

    #[test]
    fn metadata_serializes_errors_flat() {
        let mut metadata = CollectionMetadata::default();
        metadata
            .errors
            .insert(CollectionMetadata::error_key(ProbeName::CloudwatchErrors), "timed out".to_string());
        metadata.completed_tasks.push(ProbeName::DagState);
        metadata.total_tasks = 2;

        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["cloudwatch_errors_error"], "timed out");
        assert_eq!(json["completed_tasks"][0], "dag_state");
        assert_eq!(json["total_tasks"], 2);
        assert_eq!(metadata.error_for(ProbeName::CloudwatchErrors), Some("timed out"));
        assert_eq!(metadata.completion_ratio(), 0.5);
    }

    #[test]
    fn empty_slots_do_not_count_as_present() {
        let failure = ParsedFailure {
            dag_id: UNKNOWN_DAG.to_string(),
            task_id: None,
            execution_date: None,
            error_type: ErrorType::General,
            error_message: "x".to_string(),
            log_url: None,
            channel: String::new(),
            thread_ref: None,
            original_text: "x".to_string(),
        };
        let mut context = DiagnosticContext::new(failure);
        context.mwaa_logs = Some(String::new());
        context.dag_state = Some(serde_json::Map::new());
        context.redshift_audit = Some(Vec::new());

        assert!(!context.has_logs());
        assert!(!context.has_dag_state());
        assert!(!context.has_audit_records());
        assert!(!context.has_aggregated_errors());
        assert!(!context.failure.has_known_dag());
    }
}
