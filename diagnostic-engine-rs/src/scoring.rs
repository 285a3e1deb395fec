// diagnostic-engine-rs/src/scoring.rs
//
// Completeness score for a diagnostic context.

use crate::model::DiagnosticContext;

const KNOWN_DAG_WEIGHT: f64 = 0.2;
const TASK_LOGS_WEIGHT: f64 = 0.3;
const DAG_STATE_WEIGHT: f64 = 0.15;
const AUDIT_WEIGHT: f64 = 0.2;
const AGGREGATED_ERRORS_WEIGHT: f64 = 0.2;
const COMPLETION_WEIGHT: f64 = 0.1;

/// Scores how much diagnostic evidence a context holds.
///
/// The denominator is fixed at 1.0: categories that were never planned
/// still count against the score.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfidenceScorer;

impl ConfidenceScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, context: &DiagnosticContext) -> f64 {
        let mut score = 0.0;

        if context.failure.has_known_dag() {
            score += KNOWN_DAG_WEIGHT;
        }

        // Task logs subsume DAG state
        if context.has_logs() {
            score += TASK_LOGS_WEIGHT;
        } else if context.has_dag_state() {
            score += DAG_STATE_WEIGHT;
        }

        if context.has_audit_records() {
            score += AUDIT_WEIGHT;
        }
        if context.has_aggregated_errors() {
            score += AGGREGATED_ERRORS_WEIGHT;
        }

        score += COMPLETION_WEIGHT * context.metadata.completion_ratio();

        score.clamp(0.0, 1.0)
    }
}
