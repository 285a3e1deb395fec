// diagnostic-engine-rs/src/parser.rs
//
// Failure notification parsing.
//
// Turns the free text posted by the workflow platform into a ParsedFailure.
// Field extraction uses ordered (pattern, capture group) cascades: the first
// pattern that matches wins, so the order of each cascade is significant.

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::model::{ContextClues, ErrorType, FailureEvent, ParsedFailure, UNKNOWN_DAG};

/// Words that mark a message as a failure notification (lowercase)
const FAILURE_INDICATORS: [&str; 9] = [
    "dag", "task", "airflow", "failed", "error", "exception", "workflow", "pipeline", "etl",
];

/// Words that mark a line as carrying the error (lowercase)
const ERROR_LINE_WORDS: [&str; 3] = ["error", "failed", "exception"];

const SQL_KEYWORDS: [&str; 8] = [
    "select", "insert", "update", "delete", "create", "drop", "alter", "truncate",
];

/// Word budget for the fallback error message
const MESSAGE_WORD_LIMIT: usize = 20;

/// Why a message was not diagnosed. Rejection is a normal outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("message text is empty")]
    Empty,
    #[error("message does not look like a failure notification")]
    NotAFailure,
    #[error("message was posted by a bot")]
    BotMessage,
}

/// Ordered list of patterns; the first one that matches supplies the value
#[derive(Debug, Clone)]
struct Cascade {
    stages: Vec<(Regex, usize)>,
}

impl Cascade {
    fn new(stages: Vec<(Regex, usize)>) -> Self {
        Self { stages }
    }

    fn first_match<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.stages.iter().find_map(|(pattern, group)| {
            pattern
                .captures(text)
                .and_then(|caps| caps.get(*group))
                .map(|m| m.as_str())
        })
    }
}

/// Parser for workflow failure notifications
#[derive(Debug, Clone)]
pub struct FailureParser {
    dag_id: Cascade,
    task_id: Cascade,
    execution_date: Cascade,
    log_url: Regex,
    exception: Regex,
    error_types: Vec<(ErrorType, Regex)>,
    clue_tables: Regex,
    clue_models: Regex,
    clue_sql_keywords: Vec<(&'static str, Regex)>,
    clue_paths: Regex,
    clue_timestamps: Regex,
}

impl FailureParser {
    pub fn new() -> Result<Self, regex::Error> {
        let dag_failure = Regex::new(r"(?i)DAG\s+([a-zA-Z_][a-zA-Z0-9_]*)\s+(?:failed|error)")?;
        let task_in_dag =
            Regex::new(r"(?i)Task\s+([a-zA-Z_][a-zA-Z0-9_.]*)\s+in\s+DAG\s+([a-zA-Z_][a-zA-Z0-9_]*)")?;
        let dag_label = Regex::new(r"(?i)\bDAG\s*:\s*([a-zA-Z_][a-zA-Z0-9_]*)")?;
        let dag_generic = Regex::new(r"(?i)dag[:\s]+([a-zA-Z_][a-zA-Z0-9_]*)")?;
        let task_label = Regex::new(r"(?i)\bTask\s*:\s*([a-zA-Z_][a-zA-Z0-9_.]*)")?;
        let task_generic = Regex::new(r"(?i)task[:\s]+([a-zA-Z_][a-zA-Z0-9_.]*)")?;

        let dag_id = Cascade::new(vec![
            (dag_failure, 1),
            (task_in_dag.clone(), 2),
            (dag_label, 1),
            (dag_generic, 1),
        ]);
        let task_id = Cascade::new(vec![(task_in_dag, 1), (task_label, 1), (task_generic, 1)]);
        let execution_date = Cascade::new(vec![
            (Regex::new(r"(?i)(?:execution_date|run_id):\s*([0-9T:\-+Z]+)")?, 1),
            (Regex::new(r"20\d{2}-\d{2}-\d{2}[T\s]\d{2}:\d{2}:\d{2}")?, 0),
        ]);

        // Chat markup wraps links in [..], <..> and |, none of which belong to the URL
        let log_url = Regex::new(r"(?i)https?://[^\s\[\]<>|]*(?:log|airflow)[^\s\[\]<>|]*")?;
        let exception = Regex::new(r"(?i)(?:Exception|Error):\s*([^\n]+)")?;

        // dbt sits ahead of sql: dbt failures are reported as "Database Error"
        let error_types = vec![
            (ErrorType::Timeout, Regex::new(r"(?i)timeout|timed?\s*out")?),
            (ErrorType::Connection, Regex::new(r"(?i)connection|network|unreachable")?),
            (ErrorType::Memory, Regex::new(r"(?i)memory|oom|out\s*of\s*memory")?),
            (ErrorType::Permission, Regex::new(r"(?i)permission|access\s*denied|unauthorized")?),
            (ErrorType::Dbt, Regex::new(r"(?i)dbt|compilation|model.*failed")?),
            (ErrorType::Sql, Regex::new(r"(?i)sql|query|database|relation.*does.*not.*exist")?),
            (ErrorType::Python, Regex::new(r"(?i)python|import|module|syntax")?),
            (ErrorType::Resource, Regex::new(r"(?i)disk|space|resource|quota")?),
        ];

        let clue_sql_keywords = SQL_KEYWORDS
            .iter()
            .map(|kw| Ok((*kw, Regex::new(&format!(r"(?i)\b{}\b", kw))?)))
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self {
            dag_id,
            task_id,
            execution_date,
            log_url,
            exception,
            error_types,
            clue_tables: Regex::new(r#"(?i)\b(?:table|model|view)\s+["`']*([a-zA-Z_][a-zA-Z0-9_.]*)"#)?,
            clue_models: Regex::new(r#"(?i)\bmodel\s+["`']*([a-zA-Z_][a-zA-Z0-9_]*)"#)?,
            clue_sql_keywords,
            clue_paths: Regex::new(r"[/\\][\w/\\.-]+\.\w+")?,
            clue_timestamps: Regex::new(
                r"\d{4}-\d{2}-\d{2}[T\s]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:[+-]\d{2}:?\d{2}|Z)?",
            )?,
        })
    }

    /// Whether `text` carries any failure indicator word
    pub fn is_failure_text(text: &str) -> bool {
        let lower = text.to_lowercase();
        FAILURE_INDICATORS.iter().any(|word| lower.contains(word))
    }

    /// Classify bare text with no routing information
    pub fn classify(&self, text: &str) -> Result<ParsedFailure, Rejection> {
        self.classify_routed(text, "", None)
    }

    /// Classify a transport event, carrying its channel and reply thread
    pub fn classify_event(&self, event: &FailureEvent) -> Result<ParsedFailure, Rejection> {
        if event.bot_id.is_some() {
            debug!(channel = %event.channel, "Skipping bot message");
            return Err(Rejection::BotMessage);
        }
        self.classify_routed(&event.raw_text, &event.channel, Some(event.reply_thread()))
    }

    fn classify_routed(
        &self,
        text: &str,
        channel: &str,
        thread_ref: Option<&str>,
    ) -> Result<ParsedFailure, Rejection> {
        if text.trim().is_empty() {
            return Err(Rejection::Empty);
        }
        if !Self::is_failure_text(text) {
            debug!("Message doesn't appear to be a failure notification");
            return Err(Rejection::NotAFailure);
        }

        let failure = ParsedFailure {
            dag_id: self.extract_dag_id(text),
            task_id: self.task_id.first_match(text).map(str::to_string),
            execution_date: self.execution_date.first_match(text).map(str::to_string),
            error_type: self.classify_error_type(text),
            error_message: self.extract_error_message(text),
            log_url: self.log_url.find(text).map(|m| m.as_str().to_string()),
            channel: channel.to_string(),
            thread_ref: thread_ref.map(str::to_string),
            original_text: text.to_string(),
        };

        debug!(
            dag_id = %failure.dag_id,
            task_id = ?failure.task_id,
            error_type = %failure.error_type,
            "Parsed failure notification"
        );
        Ok(failure)
    }

    pub fn extract_dag_id(&self, text: &str) -> String {
        self.dag_id
            .first_match(text)
            .unwrap_or(UNKNOWN_DAG)
            .to_string()
    }

    pub fn extract_error_message(&self, text: &str) -> String {
        if let Some(caps) = self.exception.captures(text) {
            if let Some(m) = caps.get(1) {
                return m.as_str().trim().to_string();
            }
        }

        if let Some(line) = text.lines().find(|line| {
            let lower = line.to_lowercase();
            ERROR_LINE_WORDS.iter().any(|word| lower.contains(word))
        }) {
            return line.trim().to_string();
        }

        let words: Vec<&str> = text.split_whitespace().collect();
        let mut message = words
            .iter()
            .take(MESSAGE_WORD_LIMIT)
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        if words.len() > MESSAGE_WORD_LIMIT {
            message.push_str("...");
        }
        message
    }

    pub fn classify_error_type(&self, text: &str) -> ErrorType {
        self.error_types
            .iter()
            .find(|(_, pattern)| pattern.is_match(text))
            .map(|(error_type, _)| *error_type)
            .unwrap_or(ErrorType::General)
    }

    /// Hints for the analysis prompt: tables, models, SQL verbs, paths, timestamps
    pub fn context_clues(&self, text: &str) -> ContextClues {
        let captures = |pattern: &Regex| -> Vec<String> {
            pattern
                .captures_iter(text)
                .filter_map(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
                .collect()
        };
        let matches = |pattern: &Regex| -> Vec<String> {
            pattern.find_iter(text).map(|m| m.as_str().to_string()).collect()
        };

        ContextClues {
            table_names: captures(&self.clue_tables),
            model_names: captures(&self.clue_models),
            sql_keywords: self
                .clue_sql_keywords
                .iter()
                .filter(|(_, pattern)| pattern.is_match(text))
                .map(|(kw, _)| kw.to_uppercase())
                .collect(),
            file_paths: matches(&self.clue_paths),
            timestamps: matches(&self.clue_timestamps),
        }
    }
}
