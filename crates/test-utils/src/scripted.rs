//! Scripted planner/joiner doubles for compiler-loop tests.

use std::sync::{Arc, Mutex};

use fetchdag::context::PlanContext;
use fetchdag::joiner::{JoinFuture, JoinInput, Joiner, JoinerDecision};
use fetchdag::planner::{PlanFuture, PlanSink, Planner};

/// Returns the queued decisions in order, repeating the last one.
pub struct ScriptedJoiner {
    decisions: Vec<JoinerDecision>,
    inputs: Mutex<Vec<JoinInput>>,
}

impl ScriptedJoiner {
    pub fn new(decisions: Vec<JoinerDecision>) -> Arc<Self> {
        Arc::new(Self {
            decisions,
            inputs: Mutex::new(Vec::new()),
        })
    }

    /// Always asks for another round.
    pub fn always_replan() -> Arc<Self> {
        Self::new(vec![JoinerDecision::Replan("try again".to_string())])
    }

    /// Every input the joiner was asked to decide on.
    pub fn inputs(&self) -> Vec<JoinInput> {
        self.inputs.lock().unwrap().clone()
    }
}

impl Joiner for ScriptedJoiner {
    fn decide<'a>(&'a self, input: &'a JoinInput) -> JoinFuture<'a> {
        let decision = {
            let mut inputs = self.inputs.lock().unwrap();
            inputs.push(input.clone());
            let idx = (inputs.len() - 1).min(self.decisions.len().saturating_sub(1));
            self.decisions.get(idx).cloned()
        };
        Box::pin(async move {
            Ok(decision.unwrap_or_else(|| JoinerDecision::Finish(String::new())))
        })
    }
}

/// Wraps a planner and records the context of every call.
pub struct RecordingPlanner<P> {
    inner: P,
    contexts: Mutex<Vec<PlanContext>>,
}

impl<P: Planner> RecordingPlanner<P> {
    pub fn new(inner: P) -> Arc<Self> {
        Arc::new(Self {
            inner,
            contexts: Mutex::new(Vec::new()),
        })
    }

    pub fn contexts(&self) -> Vec<PlanContext> {
        self.contexts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.contexts.lock().unwrap().len()
    }
}

impl<P: Planner> Planner for RecordingPlanner<P> {
    fn plan<'a>(&'a self, ctx: &'a PlanContext, sink: PlanSink) -> PlanFuture<'a> {
        self.contexts.lock().unwrap().push(ctx.clone());
        self.inner.plan(ctx, sink)
    }
}
