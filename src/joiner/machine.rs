// src/joiner/machine.rs

use tracing::{debug, info};

use crate::errors::{FetchdagError, Result};
use crate::joiner::JoinerDecision;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinerState {
    /// Waiting for the decision on the current round.
    Deciding,
    /// A final answer was produced (or the replan cap was hit).
    Done,
}

/// What the compiler loop should do after a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    Finish(String),
    Replan { feedback: String, next_round: u32 },
}

/// Enforces the joiner protocol across rounds.
///
/// Rounds are numbered from 1. A replan requested at round `r` is allowed
/// only while `r + 1 <= max_rounds`; otherwise the run fails with
/// [`FetchdagError::ReplanLimitExceeded`]. Any decision after `Done` is a
/// protocol error.
#[derive(Debug, Clone)]
pub struct JoinerMachine {
    state: JoinerState,
    round: u32,
    max_rounds: u32,
}

impl JoinerMachine {
    pub fn new(max_rounds: u32) -> Self {
        Self {
            state: JoinerState::Deciding,
            round: 1,
            max_rounds,
        }
    }

    pub fn state(&self) -> JoinerState {
        self.state
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    pub fn on_decision(&mut self, decision: JoinerDecision) -> Result<NextStep> {
        if self.state == JoinerState::Done {
            return Err(FetchdagError::JoinerProtocol(format!(
                "decision received after the joiner finished at round {}",
                self.round
            )));
        }

        match decision {
            JoinerDecision::Finish(answer) => {
                info!(round = self.round, "joiner finished");
                self.state = JoinerState::Done;
                Ok(NextStep::Finish(answer))
            }
            JoinerDecision::Replan(feedback) => {
                if self.round + 1 > self.max_rounds {
                    info!(
                        round = self.round,
                        max_rounds = self.max_rounds,
                        "joiner asked to replan past the round cap"
                    );
                    self.state = JoinerState::Done;
                    return Err(FetchdagError::ReplanLimitExceeded {
                        max_rounds: self.max_rounds,
                    });
                }
                self.round += 1;
                debug!(next_round = self.round, %feedback, "joiner requested a replan");
                Ok(NextStep::Replan {
                    feedback,
                    next_round: self.round,
                })
            }
        }
    }
}
