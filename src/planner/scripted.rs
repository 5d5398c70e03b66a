// src/planner/scripted.rs

use std::time::Duration;

use tracing::debug;

use crate::context::PlanContext;
use crate::planner::parser::parse_plan;
use crate::planner::{PlanFuture, PlanSink, Planner};

/// Planner that replays fixed plan text, one entry per round.
///
/// Round `r` uses entry `r - 1`; once the entries run out the last one is
/// reused. An optional delay before each task emulates a streaming model.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPlanner {
    rounds: Vec<String>,
    line_delay: Option<Duration>,
}

impl ScriptedPlanner {
    pub fn new<I, S>(rounds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rounds: rounds.into_iter().map(Into::into).collect(),
            line_delay: None,
        }
    }

    pub fn with_line_delay(mut self, delay: Duration) -> Self {
        self.line_delay = Some(delay);
        self
    }

    /// Plan text used for `round` (1-based).
    pub fn script_for(&self, round: u32) -> &str {
        let idx = (round.max(1) as usize - 1).min(self.rounds.len().saturating_sub(1));
        self.rounds.get(idx).map(String::as_str).unwrap_or("")
    }

    async fn replay(&self, ctx: &PlanContext, sink: PlanSink) -> crate::errors::Result<()> {
        for spec in parse_plan(self.script_for(ctx.round)) {
            if let Some(delay) = self.line_delay {
                tokio::time::sleep(delay).await;
            }
            if !sink.emit(spec).await {
                debug!(round = ctx.round, "round ended while replaying the plan");
                break;
            }
        }
        Ok(())
    }
}

impl Planner for ScriptedPlanner {
    fn plan<'a>(&'a self, ctx: &'a PlanContext, sink: PlanSink) -> PlanFuture<'a> {
        Box::pin(self.replay(ctx, sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_script_is_reused_for_later_rounds() {
        let planner = ScriptedPlanner::new(["1. a()", "1. b()"]);
        assert_eq!(planner.script_for(1), "1. a()");
        assert_eq!(planner.script_for(2), "1. b()");
        assert_eq!(planner.script_for(7), "1. b()");
        assert_eq!(ScriptedPlanner::default().script_for(1), "");
    }
}
