// diagnostic-engine-rs/src/probes.rs
//
// Probe capability contract and registry.
//
// Concrete data sources (DAG state API, warehouse, log aggregation) live
// outside the engine and are registered per ProbeKind. The collector looks
// the capability up for each planned task.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use error_handling::ErrorKind;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::credentials::CredentialSet;
use crate::planner::{ProbeArgs, ProbeKind, ProbePlan};

/// What a probe returns
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ProbeOutput {
    DagState(Option<serde_json::Map<String, Value>>),
    Logs(Option<String>),
    Records(Vec<serde_json::Map<String, Value>>),
    Lines(Vec<String>),
}

impl ProbeOutput {
    pub fn variant_name(&self) -> &'static str {
        match self {
            ProbeOutput::DagState(_) => "dag_state",
            ProbeOutput::Logs(_) => "logs",
            ProbeOutput::Records(_) => "records",
            ProbeOutput::Lines(_) => "lines",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("not configured: no probe registered for {0:?}")]
    NotConfigured(ProbeKind),

    #[error("probe cannot serve {0:?} requests")]
    UnsupportedArgs(ProbeKind),

    #[error("missing credential for scope '{0}'")]
    MissingCredential(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("unexpected {got} output, expected {expected}")]
    UnexpectedOutput {
        expected: &'static str,
        got: &'static str,
    },

    #[error("timed out")]
    TimedOut,

    #[error("abandoned: global deadline exceeded")]
    Abandoned,

    #[error("panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Failed(String),
}

impl ProbeError {
    /// Shared taxonomy kind; only abandonment at the global deadline differs
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProbeError::Abandoned => ErrorKind::DeadlineExceeded,
            _ => ErrorKind::ProbeFailure,
        }
    }
}

/// A single data-gathering capability
#[async_trait]
pub trait Probe: Send + Sync {
    /// Credential scope this probe needs, resolved before collection starts
    fn credential_scope(&self) -> Option<&str> {
        None
    }

    async fn invoke(&self, args: &ProbeArgs, credentials: &CredentialSet) -> Result<ProbeOutput, ProbeError>;
}

/// Stand-in for log lookup by dag/task/date; always yields no data
#[derive(Debug, Default, Clone)]
pub struct TaskLogLookupPlaceholder;

#[async_trait]
impl Probe for TaskLogLookupPlaceholder {
    async fn invoke(&self, args: &ProbeArgs, _credentials: &CredentialSet) -> Result<ProbeOutput, ProbeError> {
        match args {
            ProbeArgs::TaskLogLookup { dag_id, task_id, .. } => {
                debug!(dag_id = %dag_id, task_id = %task_id, "No log lookup available for task");
                Ok(ProbeOutput::Logs(None))
            }
            other => Err(ProbeError::UnsupportedArgs(other.kind())),
        }
    }
}

/// Probe capabilities keyed by kind
#[derive(Clone)]
pub struct ProbeRegistry {
    probes: HashMap<ProbeKind, Arc<dyn Probe>>,
}

impl ProbeRegistry {
    /// Registry with only the log lookup placeholder
    pub fn new() -> Self {
        Self::empty().with(ProbeKind::TaskLogLookup, Arc::new(TaskLogLookupPlaceholder))
    }

    pub fn empty() -> Self {
        Self {
            probes: HashMap::new(),
        }
    }

    pub fn register(&mut self, kind: ProbeKind, probe: Arc<dyn Probe>) -> &mut Self {
        self.probes.insert(kind, probe);
        self
    }

    pub fn with(mut self, kind: ProbeKind, probe: Arc<dyn Probe>) -> Self {
        self.register(kind, probe);
        self
    }

    pub fn get(&self, kind: ProbeKind) -> Option<Arc<dyn Probe>> {
        self.probes.get(&kind).cloned()
    }

    /// Scopes needed by the probes serving `plan`
    pub fn credential_scopes(&self, plan: &ProbePlan) -> BTreeSet<String> {
        plan.iter()
            .filter_map(|task| self.probes.get(&task.args.kind()))
            .filter_map(|probe| probe.credential_scope().map(str::to_string))
            .collect()
    }
}

impl Default for ProbeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProbeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeRegistry")
            .field("kinds", &self.probes.keys().collect::<Vec<_>>())
            .finish()
    }
}
