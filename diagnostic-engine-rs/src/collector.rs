// diagnostic-engine-rs/src/collector.rs
//
// Bounded-parallel probe collection.
//
// Every planned probe runs as its own tokio task, gated by a semaphore of
// `max_workers` permits. A probe's own timeout starts once it holds a
// permit; the global deadline covers the whole collection. Workers only
// return `(name, outcome)`; the context is written by this module's
// aggregation loop alone, one result at a time.

use std::any::Any;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use error_handling::{log_structured_error, Error, Severity};
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::SERVICE_NAME;
use crate::credentials::CredentialSet;
use crate::model::{CollectionMetadata, DiagnosticContext, ParsedFailure};
use crate::planner::{ProbeName, ProbePlan, ProbeTask};
use crate::probes::{Probe, ProbeError, ProbeOutput, ProbeRegistry};

pub type ProbeOutcome = Result<ProbeOutput, ProbeError>;

#[derive(Debug, Clone)]
pub struct ProbeCollector {
    registry: Arc<ProbeRegistry>,
    max_workers: usize,
    global_deadline: Duration,
}

impl ProbeCollector {
    pub fn new(registry: Arc<ProbeRegistry>, config: &EngineConfig) -> Self {
        Self {
            registry,
            max_workers: config.max_workers.max(1),
            global_deadline: config.global_deadline,
        }
    }

    pub fn registry(&self) -> &ProbeRegistry {
        &self.registry
    }

    /// Run every task in `plan`; always returns a context
    pub async fn collect(
        &self,
        failure: ParsedFailure,
        plan: &ProbePlan,
        credentials: &CredentialSet,
    ) -> DiagnosticContext {
        let mut context = DiagnosticContext::new(failure);
        context.metadata.total_tasks = plan.len();
        if plan.is_empty() {
            return context;
        }

        let deadline = Instant::now() + self.global_deadline;
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let credentials = Arc::new(credentials.clone());
        let mut pending: BTreeSet<ProbeName> = plan.names().collect();
        let mut workers = JoinSet::new();

        for task in plan.iter() {
            let probe = self.registry.get(task.args.kind());
            let task = task.clone();
            let semaphore = Arc::clone(&semaphore);
            let credentials = Arc::clone(&credentials);

            workers.spawn(async move {
                let name = task.name;
                let outcome = run_probe(probe, task, semaphore, credentials).await;
                (name, outcome)
            });
        }

        loop {
            match timeout_at(deadline, workers.join_next()).await {
                Ok(Some(Ok((name, outcome)))) => {
                    pending.remove(&name);
                    apply_outcome(&mut context, name, outcome);
                }
                Ok(Some(Err(join_error))) => {
                    warn!(error = %join_error, "Probe worker did not complete");
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        outstanding = pending.len(),
                        deadline_secs = self.global_deadline.as_secs(),
                        "Global collection deadline exceeded, abandoning probes"
                    );
                    workers.abort_all();
                    for name in std::mem::take(&mut pending) {
                        record_error(&mut context, name, &ProbeError::Abandoned);
                    }
                    break;
                }
            }
        }

        // Only reachable if a worker was cancelled outside the deadline path
        for name in pending {
            record_error(&mut context, name, &ProbeError::Failed("worker cancelled".to_string()));
        }

        context
    }
}

async fn run_probe(
    probe: Option<Arc<dyn Probe>>,
    task: ProbeTask,
    semaphore: Arc<Semaphore>,
    credentials: Arc<CredentialSet>,
) -> ProbeOutcome {
    let probe = probe.ok_or_else(|| ProbeError::NotConfigured(task.args.kind()))?;

    let _permit = semaphore
        .acquire_owned()
        .await
        .map_err(|_| ProbeError::Failed("worker pool closed".to_string()))?;

    debug!(probe = %task.name, "Running probe");
    let call = AssertUnwindSafe(probe.invoke(&task.args, &credentials)).catch_unwind();

    match timeout(task.timeout, call).await {
        Err(_) => Err(ProbeError::TimedOut),
        Ok(Err(panic)) => Err(ProbeError::Panicked(panic_message(panic.as_ref()))),
        Ok(Ok(outcome)) => outcome,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Merge one probe outcome into the context
pub fn apply_outcome(context: &mut DiagnosticContext, name: ProbeName, outcome: ProbeOutcome) {
    match outcome.and_then(|output| apply_output(context, name, output)) {
        Ok(()) => {
            debug!(probe = %name, "Probe completed");
            context.metadata.completed_tasks.push(name);
        }
        Err(error) => record_error(context, name, &error),
    }
}

fn apply_output(context: &mut DiagnosticContext, name: ProbeName, output: ProbeOutput) -> Result<(), ProbeError> {
    match (name, output) {
        (ProbeName::DagState, ProbeOutput::DagState(state)) => context.dag_state = state,
        (ProbeName::MwaaLogs, ProbeOutput::Logs(logs)) => context.mwaa_logs = logs,
        (ProbeName::RedshiftAudit | ProbeName::RedshiftErrors, ProbeOutput::Records(records)) => {
            context
                .redshift_audit
                .get_or_insert_with(Vec::new)
                .extend(records);
        }
        (ProbeName::CloudwatchErrors, ProbeOutput::Lines(lines)) => context.cloudwatch_errors = Some(lines),
        (name, output) => {
            return Err(ProbeError::UnexpectedOutput {
                expected: expected_output(name),
                got: output.variant_name(),
            })
        }
    }
    Ok(())
}

fn expected_output(name: ProbeName) -> &'static str {
    match name {
        ProbeName::DagState => "dag_state",
        ProbeName::MwaaLogs => "logs",
        ProbeName::RedshiftAudit | ProbeName::RedshiftErrors => "records",
        ProbeName::CloudwatchErrors => "lines",
    }
}

fn record_error(context: &mut DiagnosticContext, name: ProbeName, error: &ProbeError) {
    log_structured_error(
        &Error::new(error.kind(), error.to_string())
            .severity(Severity::Minor)
            .service(SERVICE_NAME)
            .context("probe", name.as_str())
            .context("dag_id", &context.failure.dag_id),
    );
    context
        .metadata
        .errors
        .insert(CollectionMetadata::error_key(name), error.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ErrorType;
    use crate::planner::{ProbeArgs, ProbeKind};
    use async_trait::async_trait;
    use serde_json::json;

    fn failure() -> ParsedFailure {
        ParsedFailure {
            dag_id: "etl_orders".to_string(),
            task_id: Some("load_data".to_string()),
            execution_date: None,
            error_type: ErrorType::Sql,
            error_message: "boom".to_string(),
            log_url: None,
            channel: String::new(),
            thread_ref: None,
            original_text: "boom".to_string(),
        }
    }

    fn record(key: &str) -> serde_json::Map<String, serde_json::Value> {
        json!({ "query": key }).as_object().cloned().unwrap()
    }

    struct Fixed(ProbeOutcome);

    #[async_trait]
    impl Probe for Fixed {
        async fn invoke(&self, _args: &ProbeArgs, _credentials: &CredentialSet) -> ProbeOutcome {
            self.0.clone()
        }
    }

    struct Panicking;

    #[async_trait]
    impl Probe for Panicking {
        async fn invoke(&self, _args: &ProbeArgs, _credentials: &CredentialSet) -> ProbeOutcome {
            panic!("probe exploded")
        }
    }

    fn plan_of(tasks: Vec<(ProbeName, ProbeArgs)>, timeout: Duration) -> ProbePlan {
        let mut plan = ProbePlan::default();
        for (name, args) in tasks {
            plan.insert(ProbeTask { name, args, timeout });
        }
        plan
    }

    #[test]
    fn redshift_probes_append_to_one_sequence() {
        let mut context = DiagnosticContext::new(failure());
        apply_outcome(&mut context, ProbeName::RedshiftErrors, Ok(ProbeOutput::Records(vec![record("b")])));
        apply_outcome(&mut context, ProbeName::RedshiftAudit, Ok(ProbeOutput::Records(vec![record("a")])));

        assert_eq!(context.redshift_audit.as_ref().map(Vec::len), Some(2));
        assert_eq!(context.metadata.completed_tasks.len(), 2);
    }

    #[test]
    fn mismatched_output_is_a_failure() {
        let mut context = DiagnosticContext::new(failure());
        apply_outcome(&mut context, ProbeName::DagState, Ok(ProbeOutput::Lines(vec![])));

        assert!(context.dag_state.is_none());
        assert!(context.metadata.completed_tasks.is_empty());
        assert_eq!(
            context.metadata.error_for(ProbeName::DagState),
            Some("unexpected lines output, expected dag_state")
        );
    }

    #[test]
    fn lookup_without_data_still_completes() {
        let mut context = DiagnosticContext::new(failure());
        apply_outcome(&mut context, ProbeName::MwaaLogs, Ok(ProbeOutput::Logs(None)));

        assert!(context.mwaa_logs.is_none());
        assert_eq!(context.metadata.completed_tasks, vec![ProbeName::MwaaLogs]);
    }

    #[tokio::test]
    async fn empty_plan_returns_empty_context() {
        let collector = ProbeCollector::new(Arc::new(ProbeRegistry::empty()), &EngineConfig::default());
        let context = collector
            .collect(failure(), &ProbePlan::default(), &CredentialSet::new())
            .await;
        assert_eq!(context.metadata.total_tasks, 0);
        assert!(context.metadata.completed_tasks.is_empty());
    }

    #[tokio::test]
    async fn unregistered_kind_is_not_configured() {
        let collector = ProbeCollector::new(Arc::new(ProbeRegistry::empty()), &EngineConfig::default());
        let plan = plan_of(
            vec![(ProbeName::DagState, ProbeArgs::DagState { dag_id: "d".to_string() })],
            Duration::from_secs(1),
        );
        let context = collector.collect(failure(), &plan, &CredentialSet::new()).await;

        assert_eq!(
            context.metadata.error_for(ProbeName::DagState),
            Some("not configured: no probe registered for DagState")
        );
        assert_eq!(context.metadata.total_tasks, 1);
    }

    #[tokio::test]
    async fn panic_is_isolated() {
        let registry = ProbeRegistry::empty()
            .with(ProbeKind::DagState, Arc::new(Panicking))
            .with(
                ProbeKind::FunctionErrors,
                Arc::new(Fixed(Ok(ProbeOutput::Lines(vec!["ERROR x".to_string()])))),
            );
        let collector = ProbeCollector::new(Arc::new(registry), &EngineConfig::default());
        let plan = plan_of(
            vec![
                (ProbeName::DagState, ProbeArgs::DagState { dag_id: "d".to_string() }),
                (
                    ProbeName::CloudwatchErrors,
                    ProbeArgs::FunctionErrors {
                        function_name: "d".to_string(),
                        window_minutes: 60,
                    },
                ),
            ],
            Duration::from_secs(1),
        );
        let context = collector.collect(failure(), &plan, &CredentialSet::new()).await;

        assert_eq!(context.metadata.error_for(ProbeName::DagState), Some("panicked: probe exploded"));
        assert_eq!(context.cloudwatch_errors, Some(vec!["ERROR x".to_string()]));
        assert_eq!(context.metadata.completed_tasks, vec![ProbeName::CloudwatchErrors]);
    }

    struct Sleeping(Duration);

    #[async_trait]
    impl Probe for Sleeping {
        async fn invoke(&self, _args: &ProbeArgs, _credentials: &CredentialSet) -> ProbeOutcome {
            tokio::time::sleep(self.0).await;
            Ok(ProbeOutput::DagState(None))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_probe_times_out() {
        let registry = ProbeRegistry::empty().with(ProbeKind::DagState, Arc::new(Sleeping(Duration::from_secs(60))));
        let collector = ProbeCollector::new(Arc::new(registry), &EngineConfig::default());
        let plan = plan_of(
            vec![(ProbeName::DagState, ProbeArgs::DagState { dag_id: "d".to_string() })],
            Duration::from_secs(5),
        );
        let context = collector.collect(failure(), &plan, &CredentialSet::new()).await;

        assert_eq!(context.metadata.error_for(ProbeName::DagState), Some("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn global_deadline_abandons_outstanding_probes() {
        let registry = ProbeRegistry::empty()
            .with(ProbeKind::DagState, Arc::new(Sleeping(Duration::from_secs(600))))
            .with(
                ProbeKind::FunctionErrors,
                Arc::new(Fixed(Ok(ProbeOutput::Lines(vec!["ERROR y".to_string()])))),
            );
        let config = EngineConfig {
            global_deadline: Duration::from_secs(10),
            ..EngineConfig::default()
        };
        let collector = ProbeCollector::new(Arc::new(registry), &config);
        let plan = plan_of(
            vec![
                (ProbeName::DagState, ProbeArgs::DagState { dag_id: "d".to_string() }),
                (
                    ProbeName::CloudwatchErrors,
                    ProbeArgs::FunctionErrors {
                        function_name: "d".to_string(),
                        window_minutes: 60,
                    },
                ),
            ],
            Duration::from_secs(300),
        );

        let started = Instant::now();
        let context = collector.collect(failure(), &plan, &CredentialSet::new()).await;

        assert!(started.elapsed() < Duration::from_secs(11));
        assert_eq!(
            context.metadata.error_for(ProbeName::DagState),
            Some("abandoned: global deadline exceeded")
        );
        assert_eq!(context.metadata.completed_tasks, vec![ProbeName::CloudwatchErrors]);
        assert_eq!(context.metadata.total_tasks, 2);
    }

    struct Tracking {
        running: Arc<std::sync::atomic::AtomicUsize>,
        peak: Arc<std::sync::atomic::AtomicUsize>,
    }

    #[async_trait]
    impl Probe for Tracking {
        async fn invoke(&self, args: &ProbeArgs, _credentials: &CredentialSet) -> ProbeOutcome {
            use std::sync::atomic::Ordering;
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(match args.kind() {
                ProbeKind::DagState => ProbeOutput::DagState(None),
                ProbeKind::TaskLogs => ProbeOutput::Logs(None),
                ProbeKind::FunctionErrors => ProbeOutput::Lines(Vec::new()),
                _ => ProbeOutput::Records(Vec::new()),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded_by_worker_count() {
        let running = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let peak = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let probe: Arc<dyn Probe> = Arc::new(Tracking {
            running: Arc::clone(&running),
            peak: Arc::clone(&peak),
        });
        let mut registry = ProbeRegistry::empty();
        for kind in [
            ProbeKind::DagState,
            ProbeKind::TaskLogs,
            ProbeKind::AuditLog,
            ProbeKind::RecentWarehouseErrors,
            ProbeKind::FunctionErrors,
        ] {
            registry.register(kind, Arc::clone(&probe));
        }
        let config = EngineConfig {
            max_workers: 2,
            ..EngineConfig::default()
        };
        let collector = ProbeCollector::new(Arc::new(registry), &config);
        let plan = plan_of(
            vec![
                (ProbeName::DagState, ProbeArgs::DagState { dag_id: "d".to_string() }),
                (ProbeName::MwaaLogs, ProbeArgs::TaskLogs { log_url: "http://x".to_string() }),
                (ProbeName::RedshiftAudit, ProbeArgs::AuditLog { filter: "d".to_string() }),
                (ProbeName::RedshiftErrors, ProbeArgs::RecentWarehouseErrors { lookback_hours: 24 }),
                (
                    ProbeName::CloudwatchErrors,
                    ProbeArgs::FunctionErrors {
                        function_name: "d".to_string(),
                        window_minutes: 60,
                    },
                ),
            ],
            Duration::from_secs(5),
        );

        let context = collector.collect(failure(), &plan, &CredentialSet::new()).await;

        assert_eq!(peak.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(context.metadata.completed_tasks.len(), 5);
        assert!(context.metadata.errors.is_empty());
    }
}
