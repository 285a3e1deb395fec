// diagnostic-engine-rs/src/analysis/prompt.rs
//
// Prompt construction for the analysis model. The system prompt is chosen
// by error type; the user prompt carries the failure details and whatever
// evidence the probes collected, each section trimmed to a fixed size.

use serde_json::Value;

use crate::model::{ContextClues, DiagnosticContext, ErrorType, ParsedFailure};

const LOG_EXCERPT_CHARS: usize = 2000;
const MAX_AUDIT_ENTRIES: usize = 5;
const AUDIT_QUERY_CHARS: usize = 200;
const MAX_AGGREGATED_ERRORS: usize = 10;
const AGGREGATED_ERROR_CHARS: usize = 300;

const GENERAL_PROMPT: &str = "You are DE-Bot, an expert data engineering assistant specializing in Apache Airflow failure diagnosis.
You have deep knowledge of:
- Apache Airflow architecture and common failure patterns
- AWS services (MWAA, Redshift, Lambda, CloudWatch)
- DBT models and SQL debugging
- Python error analysis
- Infrastructure and connectivity issues

Analyze failure information from multiple sources and provide:
1. Root cause analysis with confidence level
2. Specific remediation steps
3. Prevention recommendations
4. Escalation guidance when needed

Be concise but thorough. Use technical language appropriate for data engineers.";

const SQL_PROMPT: &str = "You are DE-Bot, an expert SQL and data warehouse troubleshooting assistant.
Focus on:
- SQL syntax and logic errors
- Database connection and permission issues
- Table/column existence problems
- Data quality and integrity issues
- Performance and timeout problems
- DBT compilation and execution errors

Provide specific SQL debugging steps and query optimization recommendations.";

const TIMEOUT_PROMPT: &str = "You are DE-Bot, specializing in performance and timeout issue diagnosis.
Focus on:
- Resource allocation problems
- Query performance issues
- Network connectivity problems
- Service limits and throttling
- Memory and CPU constraints
- Concurrent execution conflicts

Provide performance optimization and resource scaling recommendations.";

const DBT_PROMPT: &str = "You are DE-Bot, an expert in DBT (data build tool) troubleshooting.
Focus on:
- DBT model compilation errors
- Dependency resolution issues
- Macro and jinja templating problems
- Source and seed issues
- Test failures and data quality
- Incremental model problems

Provide DBT-specific debugging steps.";

const OUTPUT_FORMAT: &str = "Respond in the following structured format:

## Root Cause Analysis
[Brief summary of the most likely cause]

## Confidence Level
[High/Medium/Low] - [Justification]

## Immediate Actions
1. [First step to take]
2. [Second step to take]
3. [Additional steps...]

## Detailed Investigation
[Specific commands, queries, or checks to perform]

## Prevention Recommendations
[How to prevent this issue in the future]

## Escalation Triggers
[When to escalate and to whom]";

#[derive(Debug, Default, Clone, Copy)]
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn system_prompt(&self, error_type: ErrorType) -> &'static str {
        match error_type {
            ErrorType::Sql => SQL_PROMPT,
            ErrorType::Timeout => TIMEOUT_PROMPT,
            ErrorType::Dbt => DBT_PROMPT,
            _ => GENERAL_PROMPT,
        }
    }

    /// User prompt for `context`
    pub fn build(&self, context: &DiagnosticContext, clues: &ContextClues) -> String {
        let mut parts = vec![
            "## Context Information".to_string(),
            "### Failure Details".to_string(),
            failure_details(&context.failure),
        ];

        if let Some(logs) = context.mwaa_logs.as_deref().filter(|l| !l.is_empty()) {
            parts.push("### Task Logs".to_string());
            parts.push(format!("```\n{}\n```", truncate_chars(logs, LOG_EXCERPT_CHARS)));
        }

        if let Some(records) = context.redshift_audit.as_ref().filter(|r| !r.is_empty()) {
            parts.push("### Warehouse Audit Records".to_string());
            parts.push(audit_records(records));
        }

        if let Some(lines) = context.cloudwatch_errors.as_ref().filter(|l| !l.is_empty()) {
            parts.push("### Aggregated Errors".to_string());
            parts.push(aggregated_errors(lines));
        }

        if let Some(state) = context.dag_state.as_ref().filter(|s| !s.is_empty()) {
            parts.push("### DAG State Information".to_string());
            parts.push(serde_json::to_string_pretty(state).unwrap_or_default());
        }

        if !clues.is_empty() {
            parts.push("### Context Clues".to_string());
            parts.push(context_clues(clues));
        }

        parts.push("## Required Output Format".to_string());
        parts.push(OUTPUT_FORMAT.to_string());

        parts.join("\n\n")
    }
}

fn failure_details(failure: &ParsedFailure) -> String {
    let mut details = vec![format!("**DAG ID**: {}", failure.dag_id)];

    if let Some(task_id) = &failure.task_id {
        details.push(format!("**Task ID**: {}", task_id));
    }
    if let Some(execution_date) = &failure.execution_date {
        details.push(format!("**Execution Date**: {}", execution_date));
    }
    details.push(format!("**Error Type**: {}", failure.error_type));
    details.push(format!("**Error Message**: {}", failure.error_message));
    if let Some(log_url) = &failure.log_url {
        details.push(format!("**Log URL**: {}", log_url));
    }

    details.join("\n")
}

fn audit_records(records: &[serde_json::Map<String, Value>]) -> String {
    let field = |record: &serde_json::Map<String, Value>, key: &str| -> String {
        match record.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => "N/A".to_string(),
            Some(other) => other.to_string(),
        }
    };

    let mut lines = Vec::new();
    for (i, record) in records.iter().take(MAX_AUDIT_ENTRIES).enumerate() {
        let query = field(record, "query");
        lines.push(format!("**Entry {}**:", i + 1));
        lines.push(format!("- Query: {}...", truncate_chars(&query, AUDIT_QUERY_CHARS)));
        lines.push(format!("- Status: {}", field(record, "status")));
        lines.push(format!("- Error: {}", field(record, "error_message")));
        lines.push(format!("- Timestamp: {}", field(record, "timestamp")));
        lines.push(String::new());
    }
    lines.join("\n")
}

fn aggregated_errors(errors: &[String]) -> String {
    errors
        .iter()
        .take(MAX_AGGREGATED_ERRORS)
        .enumerate()
        .map(|(i, error)| format!("**Error {}**: {}...", i + 1, truncate_chars(error, AGGREGATED_ERROR_CHARS)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn context_clues(clues: &ContextClues) -> String {
    let groups = [
        ("Tables", &clues.table_names),
        ("Models", &clues.model_names),
        ("SQL keywords", &clues.sql_keywords),
        ("Files", &clues.file_paths),
        ("Timestamps", &clues.timestamps),
    ];

    groups
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(label, values)| format!("- {}: {}", label, values.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prefix of at most `max` characters
pub(crate) fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(error_type: ErrorType) -> DiagnosticContext {
        DiagnosticContext::new(ParsedFailure {
            dag_id: "etl_orders".to_string(),
            task_id: Some("load_data".to_string()),
            execution_date: None,
            error_type,
            error_message: "Task timed out".to_string(),
            log_url: Some("http://x/log".to_string()),
            channel: "C1".to_string(),
            thread_ref: None,
            original_text: "DAG etl_orders failed".to_string(),
        })
    }

    #[test]
    fn system_prompt_follows_error_type() {
        let builder = PromptBuilder::new();
        assert!(builder.system_prompt(ErrorType::Dbt).contains("DBT (data build tool)"));
        assert!(builder.system_prompt(ErrorType::Sql).contains("SQL and data warehouse"));
        assert!(builder.system_prompt(ErrorType::Timeout).contains("timeout issue"));
        assert_eq!(builder.system_prompt(ErrorType::Memory), GENERAL_PROMPT);
    }

    #[test]
    fn prompt_includes_only_present_sections() {
        let prompt = PromptBuilder::new().build(&context(ErrorType::Timeout), &ContextClues::default());

        assert!(prompt.contains("**DAG ID**: etl_orders"));
        assert!(prompt.contains("**Task ID**: load_data"));
        assert!(prompt.contains("**Log URL**: http://x/log"));
        assert!(!prompt.contains("### Task Logs"));
        assert!(!prompt.contains("### Context Clues"));
        assert!(prompt.ends_with("[When to escalate and to whom]"));
    }

    #[test]
    fn sections_are_trimmed() {
        let mut ctx = context(ErrorType::Sql);
        ctx.mwaa_logs = Some("x".repeat(5000));
        ctx.redshift_audit = Some(
            (0..8)
                .map(|i| json!({ "query": "q".repeat(500), "status": i }).as_object().cloned().unwrap())
                .collect(),
        );
        ctx.cloudwatch_errors = Some((0..20).map(|i| format!("ERROR {}", i)).collect());

        let prompt = PromptBuilder::new().build(&ctx, &ContextClues::default());

        assert!(prompt.contains(&format!("```\n{}\n```", "x".repeat(2000))));
        assert!(prompt.contains("**Entry 5**"));
        assert!(!prompt.contains("**Entry 6**"));
        assert!(prompt.contains(&format!("- Query: {}...", "q".repeat(200))));
        assert!(prompt.contains("- Error: N/A"));
        assert!(prompt.contains("**Error 10**"));
        assert!(!prompt.contains("**Error 11**"));
    }

    #[test]
    fn clues_are_listed() {
        let clues = ContextClues {
            model_names: vec!["dim_customers".to_string()],
            ..ContextClues::default()
        };
        let prompt = PromptBuilder::new().build(&context(ErrorType::Dbt), &clues);
        assert!(prompt.contains("- Models: dim_customers"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}
