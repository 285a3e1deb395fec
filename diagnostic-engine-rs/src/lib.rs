//! # Failure Diagnostics Engine
//!
//! Turns a free-text workflow failure notification into a scored
//! diagnostic context:
//!
//! - `parser` classifies the text into a [`ParsedFailure`]
//! - `planner` selects the probes worth running
//! - `collector` runs them in parallel under a global deadline
//! - `scoring` rates how complete the collected evidence is
//! - `orchestrator` ties the stages together behind `diagnose`
//!
//! Concrete data sources plug in through [`Probe`]; credentials through
//! [`CredentialProvider`]; root cause analysis through [`AnalysisProvider`].

pub mod analysis;
pub mod collector;
pub mod config;
pub mod credentials;
pub mod error;
pub mod log_fetch;
pub mod model;
pub mod orchestrator;
pub mod parser;
pub mod planner;
pub mod probes;
pub mod scoring;

pub use analysis::{fallback_summary, AnalysisError, AnalysisProvider, LlmClient, PromptBuilder};
pub use collector::ProbeCollector;
pub use config::{ConfigError, EngineConfig, LlmConfig};
pub use credentials::{CredentialError, CredentialProvider, CredentialSet, EnvCredentialProvider};
pub use error::DiagnosisError;
pub use log_fetch::HttpLogProbe;
pub use model::{
    CollectionMetadata, ContextClues, DiagnosticContext, DiagnosticResult, ErrorType, FailureEvent, ParsedFailure,
    UNKNOWN_DAG,
};
pub use orchestrator::{DiagnosticOrchestrator, DiagnosticOrchestratorBuilder, Stage};
pub use parser::{FailureParser, Rejection};
pub use planner::{ProbeArgs, ProbeKind, ProbeName, ProbePlan, ProbeTask, TaskPlanner};
pub use probes::{Probe, ProbeError, ProbeOutput, ProbeRegistry};
pub use scoring::ConfidenceScorer;
