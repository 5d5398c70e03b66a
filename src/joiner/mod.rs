// src/joiner/mod.rs

//! Joiner: decides, after each round, whether to answer or to plan again.
//!
//! The decision itself is external (a command, a model, a fixed summary).
//! [`machine::JoinerMachine`] enforces the protocol around it: one decision
//! per round and the replan cap.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::context::{PlanContext, RoundRecord};
use crate::dag::{RoundExit, TaskRecord};
use crate::engine::RoundReport;
use crate::errors::{FetchdagError, Result};

pub mod command;
pub mod machine;
pub mod summary;

pub use command::CommandJoiner;
pub use machine::{JoinerMachine, JoinerState, NextStep};
pub use summary::SummaryJoiner;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "text", rename_all = "snake_case")]
pub enum JoinerDecision {
    /// Final answer.
    Finish(String),
    /// Feedback for the next planning round.
    Replan(String),
}

/// Everything the joiner sees for one round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinInput {
    pub query: String,
    pub round: u32,
    pub exit: RoundExit,
    pub records: Vec<TaskRecord>,
    pub history: Vec<RoundRecord>,
}

impl JoinInput {
    pub fn new(ctx: &PlanContext, report: &RoundReport) -> Self {
        Self {
            query: ctx.query.clone(),
            round: ctx.round,
            exit: report.exit,
            records: report.records.clone(),
            history: ctx.history.clone(),
        }
    }
}

pub type JoinFuture<'a> = Pin<Box<dyn Future<Output = Result<JoinerDecision>> + Send + 'a>>;

pub trait Joiner: Send + Sync {
    fn decide<'a>(&'a self, input: &'a JoinInput) -> JoinFuture<'a>;
}

/// Parse a textual joiner reply.
///
/// The first non-empty line must start with `FINISH` (or `END`) or
/// `REPLAN`, case-insensitively, optionally followed by `:`. The rest of
/// that line plus every following line is the answer or feedback.
pub fn parse_decision(text: &str) -> Result<JoinerDecision> {
    let trimmed = text.trim_start();
    let (first, rest) = trimmed.split_once('\n').unwrap_or((trimmed, ""));
    let first = first.trim();

    let keyword_len = first
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(first.len());
    let (keyword, tail) = first.split_at(keyword_len);
    let tail = tail.trim_start();
    let tail = tail.strip_prefix(':').unwrap_or(tail).trim();

    let body = match (tail.is_empty(), rest.trim().is_empty()) {
        (_, true) => tail.to_string(),
        (true, false) => rest.trim().to_string(),
        (false, false) => format!("{tail}\n{}", rest.trim_end()),
    };

    match keyword.to_ascii_uppercase().as_str() {
        "FINISH" | "END" => Ok(JoinerDecision::Finish(body)),
        "REPLAN" => Ok(JoinerDecision::Replan(body)),
        _ => Err(FetchdagError::JoinerProtocol(format!(
            "expected FINISH or REPLAN, got {first:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_with_inline_answer() {
        assert_eq!(
            parse_decision("FINISH: 42").unwrap(),
            JoinerDecision::Finish("42".into())
        );
        assert_eq!(
            parse_decision("\n  end the answer\n").unwrap(),
            JoinerDecision::Finish("the answer".into())
        );
    }

    #[test]
    fn replan_feedback_spans_lines() {
        assert_eq!(
            parse_decision("Replan:\nsearch failed\ntry another source").unwrap(),
            JoinerDecision::Replan("search failed\ntry another source".into())
        );
        assert_eq!(
            parse_decision("REPLAN: missing data\nretry 2").unwrap(),
            JoinerDecision::Replan("missing data\nretry 2".into())
        );
    }

    #[test]
    fn anything_else_is_a_protocol_error() {
        for reply in ["", "   ", "Maybe later", "FINISHED: x"] {
            let err = parse_decision(reply).unwrap_err();
            assert!(
                matches!(err, FetchdagError::JoinerProtocol(_)),
                "{reply:?} gave {err:?}"
            );
        }
    }
}
