// src/joiner/summary.rs

use std::fmt::Write as _;

use crate::dag::placeholder::as_text;
use crate::dag::{RoundExit, SkipReason, TaskOutcome};
use crate::joiner::{JoinFuture, JoinInput, Joiner, JoinerDecision};

/// Joiner that always finishes, answering with a plain-text summary of
/// every task outcome in the round.
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryJoiner;

impl SummaryJoiner {
    pub fn summarize(input: &JoinInput) -> String {
        if input.records.is_empty() {
            return "No tasks were executed.".to_string();
        }

        let mut out = String::from("Task execution completed. Here's what was accomplished:\n");
        for record in &input.records {
            let line = match &record.outcome {
                TaskOutcome::Done { result } => as_text(result),
                TaskOutcome::Failed { error } => format!("FAILED: {error}"),
                TaskOutcome::Skipped {
                    reason: SkipReason::UpstreamFailed { dependency },
                } => format!("SKIPPED (task {dependency} did not complete)"),
                TaskOutcome::Skipped {
                    reason: SkipReason::Cancelled,
                } => "SKIPPED (round ended early)".to_string(),
            };
            let _ = write!(out, "\nTask {} ({}): {line}", record.id, record.tool);
        }

        if input.exit == RoundExit::Cancelled {
            out.push_str("\n\nThe run was cancelled before every task finished.");
        }
        out
    }
}

impl Joiner for SummaryJoiner {
    fn decide<'a>(&'a self, input: &'a JoinInput) -> JoinFuture<'a> {
        let answer = Self::summarize(input);
        Box::pin(async move { Ok(JoinerDecision::Finish(answer)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::TaskRecord;
    use serde_json::json;

    fn input(records: Vec<TaskRecord>) -> JoinInput {
        JoinInput {
            query: "q".into(),
            round: 1,
            exit: RoundExit::Completed,
            records,
            history: Vec::new(),
        }
    }

    #[test]
    fn summary_lists_every_outcome() {
        let text = SummaryJoiner::summarize(&input(vec![
            TaskRecord {
                id: 1,
                tool: "search".into(),
                args: json!({}),
                outcome: TaskOutcome::Done {
                    result: json!("found it"),
                },
            },
            TaskRecord {
                id: 2,
                tool: "fetch".into(),
                args: json!({}),
                outcome: TaskOutcome::Failed {
                    error: "boom".into(),
                },
            },
            TaskRecord {
                id: 3,
                tool: "sum".into(),
                args: json!({}),
                outcome: TaskOutcome::Skipped {
                    reason: SkipReason::UpstreamFailed { dependency: 2 },
                },
            },
        ]));

        assert!(text.contains("Task 1 (search): found it"));
        assert!(text.contains("Task 2 (fetch): FAILED: boom"));
        assert!(text.contains("Task 3 (sum): SKIPPED (task 2 did not complete)"));
    }

    #[test]
    fn empty_round_has_a_fixed_answer() {
        assert_eq!(SummaryJoiner::summarize(&input(vec![])), "No tasks were executed.");
    }
}
