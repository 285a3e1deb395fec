// diagnostic-engine-rs/src/orchestrator.rs
//
// End-to-end diagnosis of one failure event:
//
//   Received -> Parsed -> Planned -> Collecting -> Scored -> Done
//                 \-> Rejected
//
// The orchestrator holds configuration and collaborators only; nothing is
// carried over from one diagnosis to the next.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use error_handling::{log_structured_error, with_fallback, Error, ErrorKind, Severity};
use telemetrist::{MetricDatum, MetricUnit, MetricsSink, NoopSink};
use tokio::time::Instant;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::analysis::{fallback_summary, AnalysisProvider};
use crate::collector::ProbeCollector;
use crate::config::EngineConfig;
use crate::credentials::{resolve_all, CredentialProvider, EnvCredentialProvider};
use crate::error::{DiagnosisError, SERVICE_NAME};
use crate::model::{DiagnosticContext, DiagnosticResult, FailureEvent};
use crate::parser::FailureParser;
use crate::planner::{ProbePlan, TaskPlanner};
use crate::probes::ProbeRegistry;
use crate::scoring::ConfidenceScorer;

/// Progress of a single diagnosis, reported in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Parsed,
    Planned,
    Collecting,
    Scored,
    Done,
    Rejected,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Parsed => "parsed",
            Stage::Planned => "planned",
            Stage::Collecting => "collecting",
            Stage::Scored => "scored",
            Stage::Done => "done",
            Stage::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

pub struct DiagnosticOrchestrator {
    parser: FailureParser,
    planner: TaskPlanner,
    collector: ProbeCollector,
    scorer: ConfidenceScorer,
    credentials: Arc<dyn CredentialProvider>,
    analysis: Option<Arc<dyn AnalysisProvider>>,
    metrics: Arc<dyn MetricsSink>,
}

impl DiagnosticOrchestrator {
    pub fn builder() -> DiagnosticOrchestratorBuilder {
        DiagnosticOrchestratorBuilder::default()
    }

    /// Diagnose `event`; failures are logged and reported as `None`
    pub async fn diagnose(&self, event: &FailureEvent) -> Option<DiagnosticResult> {
        let diagnosis_id = Uuid::new_v4().to_string();
        match self.execute(event, &diagnosis_id).await {
            Ok(result) => result,
            Err(err) => {
                log_structured_error(&err.to_structured(&diagnosis_id));
                None
            }
        }
    }

    /// Diagnose `event`, returning `Ok(None)` when it is not a failure
    pub async fn try_diagnose(&self, event: &FailureEvent) -> Result<Option<DiagnosticResult>, DiagnosisError> {
        let diagnosis_id = Uuid::new_v4().to_string();
        self.execute(event, &diagnosis_id).await
    }

    async fn execute(&self, event: &FailureEvent, diagnosis_id: &str) -> Result<Option<DiagnosticResult>, DiagnosisError> {
        let span = info_span!("diagnosis", diagnosis_id = %diagnosis_id, channel = %event.channel);
        let outcome = self.run(event, diagnosis_id).instrument(span).await;
        if outcome.is_err() {
            self.count("diagnosis.failed").await;
        }
        outcome
    }

    async fn run(&self, event: &FailureEvent, diagnosis_id: &str) -> Result<Option<DiagnosticResult>, DiagnosisError> {
        let started = Instant::now();
        debug!(stage = %Stage::Received, "Failure event received");

        let parsed = std::panic::catch_unwind(AssertUnwindSafe(|| self.parser.classify_event(event)))
            .map_err(|_| DiagnosisError::Internal("failure parser panicked".to_string()))?;
        let failure = match parsed {
            Ok(failure) => failure,
            Err(rejection) => {
                log_structured_error(
                    &Error::new(ErrorKind::RejectedInput, rejection.to_string())
                        .service(SERVICE_NAME)
                        .correlation_id(diagnosis_id)
                        .context("stage", Stage::Rejected.to_string()),
                );
                self.count("diagnosis.rejected").await;
                return Ok(None);
            }
        };
        info!(
            stage = %Stage::Parsed,
            dag_id = %failure.dag_id,
            error_type = %failure.error_type,
            "Failure classified"
        );

        let clues = self.parser.context_clues(&failure.original_text);
        let plan = self.planner.plan(&failure);
        info!(
            stage = %Stage::Planned,
            probes = ?plan.names().map(|n| n.as_str()).collect::<Vec<_>>(),
            "Probe plan ready"
        );

        let mut scopes = self.collector.registry().credential_scopes(&plan);
        if let Some(scope) = self.analysis.as_ref().and_then(|a| a.credential_scope()) {
            scopes.insert(scope.to_string());
        }
        let credentials = resolve_all(self.credentials.as_ref(), scopes).await?;

        debug!(stage = %Stage::Collecting, "Collecting diagnostic context");
        let collection_started = Instant::now();
        let context = self.collector.collect(failure, &plan, &credentials).await;
        let collection_ms = collection_started.elapsed().as_millis() as u64;

        let confidence_score = self.scorer.score(&context);
        info!(
            stage = %Stage::Scored,
            confidence_score,
            completed = context.metadata.completed_tasks.len(),
            total = context.metadata.total_tasks,
            collection_ms,
            "Context collected"
        );

        let mut services_called: Vec<String> = plan.names().map(|name| name.to_string()).collect();
        let mut errors_encountered = collection_errors(&plan, &context);

        let mut analysis_fell_back = false;
        let analysis = match &self.analysis {
            Some(provider) => {
                services_called.push(provider.name().to_string());
                let outcome = with_fallback(
                    "analysis",
                    provider.analyze(&context, &clues, &credentials),
                    |_| fallback_summary(&context.failure),
                )
                .await;
                let (text, error) = outcome.into_parts();
                if let Some(error) = error {
                    log_structured_error(
                        &Error::new(error.kind(), error.to_string())
                            .severity(Severity::Minor)
                            .service(SERVICE_NAME)
                            .correlation_id(diagnosis_id)
                            .context("provider", provider.name()),
                    );
                    errors_encountered.push(format!("analysis: {}", error));
                    analysis_fell_back = true;
                }
                Some(text)
            }
            None => None,
        };

        // Read before publishing metrics so a slow sink never shows up here
        let processing_time_ms = started.elapsed().as_millis() as u64;

        self.record_probe_outcomes(&plan, &context).await;
        self.metrics
            .record(MetricDatum::millis("collection_time_ms", collection_ms))
            .await;
        if analysis_fell_back {
            self.count("analysis.fallback").await;
        }
        self.metrics
            .record(MetricDatum::millis("processing_time_ms", processing_time_ms))
            .await;
        self.metrics
            .record(MetricDatum::new("confidence_score", confidence_score, MetricUnit::None))
            .await;
        self.count("diagnosis.completed").await;

        info!(
            stage = %Stage::Done,
            processing_time_ms,
            errors = errors_encountered.len(),
            "Diagnosis complete"
        );

        Ok(Some(DiagnosticResult {
            diagnosis_id: diagnosis_id.to_string(),
            context,
            analysis,
            confidence_score,
            processing_time_ms,
            services_called,
            errors_encountered,
        }))
    }

    async fn record_probe_outcomes(&self, plan: &ProbePlan, context: &DiagnosticContext) {
        for name in plan.names() {
            let metric = if context.metadata.completed_tasks.contains(&name) {
                "probe.success"
            } else {
                "probe.failure"
            };
            self.metrics
                .record(MetricDatum::count(metric).with_dimension("probe", name.as_str()))
                .await;
        }
    }

    async fn count(&self, name: &str) {
        self.metrics.record(MetricDatum::count(name)).await;
    }
}

/// `<probe>: <error>` for every probe that did not complete
fn collection_errors(plan: &ProbePlan, context: &DiagnosticContext) -> Vec<String> {
    plan.names()
        .filter_map(|name| {
            context
                .metadata
                .error_for(name)
                .map(|err| format!("{}: {}", name, err))
        })
        .collect()
}

/// Builder for DiagnosticOrchestrator
#[derive(Default)]
pub struct DiagnosticOrchestratorBuilder {
    config: Option<EngineConfig>,
    registry: Option<ProbeRegistry>,
    credentials: Option<Arc<dyn CredentialProvider>>,
    analysis: Option<Arc<dyn AnalysisProvider>>,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl DiagnosticOrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn registry(mut self, registry: ProbeRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn credentials(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(provider);
        self
    }

    pub fn analysis(mut self, provider: Arc<dyn AnalysisProvider>) -> Self {
        self.analysis = Some(provider);
        self
    }

    pub fn metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    /// Validates the configuration and compiles the pattern sets
    pub fn build(self) -> Result<DiagnosticOrchestrator, DiagnosisError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let registry = Arc::new(self.registry.unwrap_or_default());
        debug!(registry = ?registry, max_workers = config.max_workers, "Building orchestrator");

        Ok(DiagnosticOrchestrator {
            parser: FailureParser::new()?,
            planner: TaskPlanner::new(&config)?,
            collector: ProbeCollector::new(registry, &config),
            scorer: ConfidenceScorer::new(),
            credentials: self
                .credentials
                .unwrap_or_else(|| Arc::new(EnvCredentialProvider::new())),
            analysis: self.analysis,
            metrics: self.metrics.unwrap_or_else(|| Arc::new(NoopSink)),
        })
    }
}
