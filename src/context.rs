// src/context.rs

//! Plan Round Context: the query plus everything earlier rounds produced.
//!
//! The context is immutable within a round; [`PlanContext::next_round`]
//! returns the context for the following round instead of mutating this
//! one.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::dag::{RoundExit, TaskId, TaskOutcome, TaskRecord};
use crate::engine::RoundReport;

/// Outcome of one finished round plus the joiner's feedback on it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundRecord {
    pub round: u32,
    pub exit: RoundExit,
    pub records: Vec<TaskRecord>,
    pub feedback: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanContext {
    pub query: String,
    /// 1-based round counter.
    pub round: u32,
    pub history: Vec<RoundRecord>,
}

impl PlanContext {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            round: 1,
            history: Vec::new(),
        }
    }

    /// Whether this round follows a replan decision.
    pub fn is_replan(&self) -> bool {
        !self.history.is_empty()
    }

    /// Feedback from the joiner that triggered this round, if any.
    pub fn latest_feedback(&self) -> Option<&str> {
        self.history.last().map(|r| r.feedback.as_str())
    }

    /// Done results of earlier rounds, by task id.
    ///
    /// When several rounds used the same id, the latest result wins.
    pub fn carried_results(&self) -> BTreeMap<TaskId, Value> {
        self.history
            .iter()
            .flat_map(|round| &round.records)
            .filter_map(|record| match &record.outcome {
                TaskOutcome::Done { result } => Some((record.id, result.clone())),
                TaskOutcome::Failed { .. } | TaskOutcome::Skipped { .. } => None,
            })
            .collect()
    }

    /// Context for the next round, carrying this round's outcome.
    pub fn next_round(&self, report: RoundReport, feedback: impl Into<String>) -> Self {
        let mut history = self.history.clone();
        history.push(RoundRecord {
            round: self.round,
            exit: report.exit,
            records: report.records,
            feedback: feedback.into(),
        });
        Self {
            query: self.query.clone(),
            round: self.round + 1,
            history,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn next_round_accumulates_history_and_leaves_prior_context_intact() {
        let first = PlanContext::new("q");
        let report = RoundReport {
            exit: RoundExit::Completed,
            records: Vec::new(),
        };
        let second = first.next_round(report, "need more detail");

        assert_eq!(first.round, 1);
        assert!(!first.is_replan());
        assert_eq!(second.round, 2);
        assert_eq!(second.latest_feedback(), Some("need more detail"));
        assert_eq!(second.history[0].round, 1);
    }

    #[test]
    fn carried_results_keep_the_latest_done_outcome() {
        let record = |id, outcome| TaskRecord {
            id,
            tool: "echo".into(),
            args: json!({}),
            outcome,
        };
        let done = |v: Value| TaskOutcome::Done { result: v };

        let first = PlanContext::new("q").next_round(
            RoundReport {
                exit: RoundExit::Completed,
                records: vec![record(1, done(json!("a"))), record(2, done(json!("b")))],
            },
            "again",
        );
        let second = first.next_round(
            RoundReport {
                exit: RoundExit::Completed,
                records: vec![
                    record(1, done(json!("a2"))),
                    record(
                        3,
                        TaskOutcome::Failed {
                            error: "boom".into(),
                        },
                    ),
                ],
            },
            "once more",
        );

        let carried = second.carried_results();
        assert_eq!(carried.get(&1), Some(&json!("a2")));
        assert_eq!(carried.get(&2), Some(&json!("b")));
        assert!(!carried.contains_key(&3));
    }
}
