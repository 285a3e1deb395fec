// diagnostic-engine-rs/src/planner.rs
//
// Probe planning: decides which diagnostic probes to run for a failure.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::model::{ErrorType, ParsedFailure};

/// Name of a planned probe; unique within a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeName {
    DagState,
    MwaaLogs,
    RedshiftAudit,
    RedshiftErrors,
    CloudwatchErrors,
}

impl ProbeName {
    pub const ALL: [ProbeName; 5] = [
        ProbeName::DagState,
        ProbeName::MwaaLogs,
        ProbeName::RedshiftAudit,
        ProbeName::RedshiftErrors,
        ProbeName::CloudwatchErrors,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeName::DagState => "dag_state",
            ProbeName::MwaaLogs => "mwaa_logs",
            ProbeName::RedshiftAudit => "redshift_audit",
            ProbeName::RedshiftErrors => "redshift_errors",
            ProbeName::CloudwatchErrors => "cloudwatch_errors",
        }
    }
}

impl fmt::Display for ProbeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability a probe request is served by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    DagState,
    TaskLogs,
    TaskLogLookup,
    AuditLog,
    RecentWarehouseErrors,
    FunctionErrors,
}

/// Typed request for one probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeArgs {
    DagState {
        dag_id: String,
    },
    /// Direct fetch of task logs by URL
    TaskLogs {
        log_url: String,
    },
    /// Log lookup when only the task is known
    TaskLogLookup {
        dag_id: String,
        task_id: String,
        execution_date: Option<String>,
    },
    AuditLog {
        filter: String,
    },
    RecentWarehouseErrors {
        lookback_hours: u32,
    },
    FunctionErrors {
        function_name: String,
        window_minutes: u32,
    },
}

impl ProbeArgs {
    pub fn kind(&self) -> ProbeKind {
        match self {
            ProbeArgs::DagState { .. } => ProbeKind::DagState,
            ProbeArgs::TaskLogs { .. } => ProbeKind::TaskLogs,
            ProbeArgs::TaskLogLookup { .. } => ProbeKind::TaskLogLookup,
            ProbeArgs::AuditLog { .. } => ProbeKind::AuditLog,
            ProbeArgs::RecentWarehouseErrors { .. } => ProbeKind::RecentWarehouseErrors,
            ProbeArgs::FunctionErrors { .. } => ProbeKind::FunctionErrors,
        }
    }
}

/// A named unit of work in a plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTask {
    pub name: ProbeName,
    pub args: ProbeArgs,
    pub timeout: Duration,
}

/// The probes selected for one diagnosis, keyed by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbePlan {
    tasks: BTreeMap<ProbeName, ProbeTask>,
}

impl ProbePlan {
    pub fn insert(&mut self, task: ProbeTask) {
        self.tasks.insert(task.name, task);
    }

    pub fn get(&self, name: ProbeName) -> Option<&ProbeTask> {
        self.tasks.get(&name)
    }

    pub fn contains(&self, name: ProbeName) -> bool {
        self.tasks.contains_key(&name)
    }

    pub fn names(&self) -> impl Iterator<Item = ProbeName> + '_ {
        self.tasks.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProbeTask> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Builds a ProbePlan from a ParsedFailure
#[derive(Debug, Clone)]
pub struct TaskPlanner {
    probe_timeout: Duration,
    redshift_lookback_hours: u32,
    cloudwatch_window_minutes: u32,
    model_name: Vec<Regex>,
}

impl TaskPlanner {
    pub fn new(config: &EngineConfig) -> Result<Self, regex::Error> {
        let model_name = vec![
            Regex::new(r#"(?i)model\s+["`']*([a-zA-Z_][a-zA-Z0-9_]*)"#)?,
            Regex::new(r#"(?i)relation\s+["`']*([a-zA-Z_][a-zA-Z0-9_.]*)"#)?,
            Regex::new(r#"(?i)table\s+["`']*([a-zA-Z_][a-zA-Z0-9_.]*)"#)?,
        ];

        Ok(Self {
            probe_timeout: config.probe_timeout,
            redshift_lookback_hours: config.redshift_lookback_hours,
            cloudwatch_window_minutes: config.cloudwatch_window_minutes,
            model_name,
        })
    }

    pub fn plan(&self, failure: &ParsedFailure) -> ProbePlan {
        let mut plan = ProbePlan::default();

        plan.insert(self.task(
            ProbeName::DagState,
            ProbeArgs::DagState {
                dag_id: failure.dag_id.clone(),
            },
        ));

        if let Some(log_url) = &failure.log_url {
            plan.insert(self.task(
                ProbeName::MwaaLogs,
                ProbeArgs::TaskLogs {
                    log_url: log_url.clone(),
                },
            ));
        } else if let Some(task_id) = &failure.task_id {
            plan.insert(self.task(
                ProbeName::MwaaLogs,
                ProbeArgs::TaskLogLookup {
                    dag_id: failure.dag_id.clone(),
                    task_id: task_id.clone(),
                    execution_date: failure.execution_date.clone(),
                },
            ));
        }

        let warehouse_related = matches!(failure.error_type, ErrorType::Sql | ErrorType::Dbt)
            || failure.error_message.to_lowercase().contains("dbt");
        if warehouse_related {
            let filter = self
                .model_name(failure)
                .unwrap_or_else(|| failure.dag_id.clone());
            plan.insert(self.task(ProbeName::RedshiftAudit, ProbeArgs::AuditLog { filter }));
            plan.insert(self.task(
                ProbeName::RedshiftErrors,
                ProbeArgs::RecentWarehouseErrors {
                    lookback_hours: self.redshift_lookback_hours,
                },
            ));
        }

        if matches!(
            failure.error_type,
            ErrorType::Timeout | ErrorType::Connection | ErrorType::Python
        ) {
            // The DAG id stands in for the function name
            plan.insert(self.task(
                ProbeName::CloudwatchErrors,
                ProbeArgs::FunctionErrors {
                    function_name: failure.dag_id.clone(),
                    window_minutes: self.cloudwatch_window_minutes,
                },
            ));
        }

        plan
    }

    /// Model/relation/table name, looked for in the error message first
    pub fn model_name(&self, failure: &ParsedFailure) -> Option<String> {
        [&failure.error_message, &failure.original_text]
            .into_iter()
            .find_map(|text| {
                self.model_name.iter().find_map(|pattern| {
                    pattern
                        .captures(text)
                        .and_then(|caps| caps.get(1))
                        .map(|m| m.as_str().to_string())
                })
            })
    }

    fn task(&self, name: ProbeName, args: ProbeArgs) -> ProbeTask {
        ProbeTask {
            name,
            args,
            timeout: self.probe_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::FailureParser;

    fn planner() -> TaskPlanner {
        TaskPlanner::new(&EngineConfig::default()).unwrap()
    }

    fn parse(text: &str) -> ParsedFailure {
        FailureParser::new().unwrap().classify(text).unwrap()
    }

    #[test]
    fn dag_state_is_always_planned() {
        let plan = planner().plan(&parse("pipeline exploded"));
        assert_eq!(plan.names().collect::<Vec<_>>(), vec![ProbeName::DagState]);
        assert_eq!(
            plan.get(ProbeName::DagState).map(|t| &t.args),
            Some(&ProbeArgs::DagState { dag_id: "unknown_dag".to_string() })
        );
    }

    #[test]
    fn log_url_beats_task_lookup() {
        let plan = planner().plan(&parse("Task: load in DAG x\nhttp://airflow.local/log?x=1"));
        assert_eq!(plan.get(ProbeName::MwaaLogs).map(|t| t.args.kind()), Some(ProbeKind::TaskLogs));
    }

    #[test]
    fn task_only_plans_lookup() {
        let failure = parse("Task load_data in DAG etl_orders failed, run_id: 2024-01-01T00:00:00");
        let plan = planner().plan(&failure);
        assert_eq!(
            plan.get(ProbeName::MwaaLogs).map(|t| &t.args),
            Some(&ProbeArgs::TaskLogLookup {
                dag_id: "etl_orders".to_string(),
                task_id: "load_data".to_string(),
                execution_date: Some("2024-01-01T00:00:00".to_string()),
            })
        );
    }

    #[test]
    fn dbt_failure_plans_warehouse_probes_only() {
        let failure = parse("DAG sales_dbt failed\nCosmosDbtRunError Database Error in model dim_customers");
        let plan = planner().plan(&failure);

        assert!(plan.contains(ProbeName::RedshiftAudit));
        assert!(plan.contains(ProbeName::RedshiftErrors));
        assert!(!plan.contains(ProbeName::CloudwatchErrors));
        assert_eq!(
            plan.get(ProbeName::RedshiftAudit).map(|t| &t.args),
            Some(&ProbeArgs::AuditLog { filter: "dim_customers".to_string() })
        );
        assert_eq!(
            plan.get(ProbeName::RedshiftErrors).map(|t| &t.args),
            Some(&ProbeArgs::RecentWarehouseErrors { lookback_hours: 24 })
        );
    }

    #[test]
    fn audit_filter_falls_back_to_dag_id() {
        let failure = parse("DAG orders_sql failed: SQL syntax near WHERE");
        let plan = planner().plan(&failure);
        assert_eq!(
            plan.get(ProbeName::RedshiftAudit).map(|t| &t.args),
            Some(&ProbeArgs::AuditLog { filter: "orders_sql".to_string() })
        );
    }

    #[test]
    fn timeout_plans_cloudwatch_scoped_to_dag() {
        let plan = planner().plan(&parse("DAG etl_orders failed: sensor timed out"));
        assert_eq!(
            plan.get(ProbeName::CloudwatchErrors).map(|t| &t.args),
            Some(&ProbeArgs::FunctionErrors {
                function_name: "etl_orders".to_string(),
                window_minutes: 60,
            })
        );
        assert!(!plan.contains(ProbeName::RedshiftAudit));
    }

    #[test]
    fn planning_is_deterministic() {
        let failure = parse("Task t1 in DAG d1 failed: connection refused\nhttp://x/log");
        let p = planner();
        assert_eq!(p.plan(&failure), p.plan(&failure.clone()));
    }

    #[test]
    fn tasks_carry_configured_timeout() {
        let config = EngineConfig {
            probe_timeout: Duration::from_secs(7),
            ..EngineConfig::default()
        };
        let plan = TaskPlanner::new(&config).unwrap().plan(&parse("DAG x failed"));
        assert!(plan.iter().all(|t| t.timeout == Duration::from_secs(7)));
    }
}
