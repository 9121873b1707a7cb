//! Advancement policies: what a running stage does on a tick

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stagehand_config::EngineConfig;
use stagehand_types::Stage;

/// What the scheduler knows when it asks a policy for a decision
#[derive(Debug, Clone, Copy)]
pub struct TickContext {
    /// Ticks applied to the operation so far, including this one
    pub tick: u64,
    /// Position of the running stage
    pub stage_index: usize,
    pub now: DateTime<Utc>,
}

/// Outcome requested for the running stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageDecision {
    /// Stay running, nothing changes
    Hold,
    /// Reach the next checkpoint, or succeed for a pass/fail stage
    Advance,
    /// Fail the stage and stop the operation
    Fail { reason: String },
}

impl StageDecision {
    #[must_use]
    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Fail {
            reason: reason.into(),
        }
    }
}

/// Decides how the running stage of an operation moves on each tick
///
/// Policies are shared between the registry and the scheduler task, so they
/// take `&self` and keep any mutable state behind their own lock.
pub trait AdvancePolicy: Send + Sync {
    fn decide(&self, stage: &Stage, ctx: &TickContext) -> StageDecision;
}

/// Probabilistic completion with an optional failure chance
///
/// One uniform draw per tick: below `failure_probability` the stage fails;
/// otherwise checkpoint stages always advance, and pass/fail stages advance
/// when the draw is below `failure_probability + completion_probability`.
#[derive(Debug)]
pub struct RandomPolicy {
    completion_probability: f64,
    failure_probability: f64,
    rng: Mutex<StdRng>,
}

impl RandomPolicy {
    #[must_use]
    pub fn new(completion_probability: f64, failure_probability: f64) -> Self {
        Self::with_rng(
            completion_probability,
            failure_probability,
            StdRng::from_os_rng(),
        )
    }

    /// Reproducible sequence of decisions for a given seed
    #[must_use]
    pub fn seeded(completion_probability: f64, failure_probability: f64, seed: u64) -> Self {
        Self::with_rng(
            completion_probability,
            failure_probability,
            StdRng::seed_from_u64(seed),
        )
    }

    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.completion_probability, config.failure_probability)
    }

    fn with_rng(completion_probability: f64, failure_probability: f64, rng: StdRng) -> Self {
        Self {
            completion_probability: completion_probability.clamp(0.0, 1.0),
            failure_probability: failure_probability.clamp(0.0, 1.0),
            rng: Mutex::new(rng),
        }
    }

    fn draw(&self) -> f64 {
        // A poisoned RNG is still a usable RNG
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.random::<f64>()
    }
}

impl Default for RandomPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl AdvancePolicy for RandomPolicy {
    fn decide(&self, stage: &Stage, ctx: &TickContext) -> StageDecision {
        let roll = self.draw();
        if roll < self.failure_probability {
            return StageDecision::fail(format!("gave up on tick {}", ctx.tick));
        }
        if stage.is_progress_driven()
            || roll < self.failure_probability + self.completion_probability
        {
            StageDecision::Advance
        } else {
            StageDecision::Hold
        }
    }
}

/// Replays a fixed queue of decisions, then holds
#[derive(Debug, Default)]
pub struct ScriptedPolicy {
    script: Mutex<VecDeque<StageDecision>>,
}

impl ScriptedPolicy {
    pub fn new(decisions: impl IntoIterator<Item = StageDecision>) -> Self {
        Self {
            script: Mutex::new(decisions.into_iter().collect()),
        }
    }

    pub fn push(&self, decision: StageDecision) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(decision);
    }

    /// Decisions not yet consumed
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl AdvancePolicy for ScriptedPolicy {
    fn decide(&self, _stage: &Stage, _ctx: &TickContext) -> StageDecision {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(StageDecision::Hold)
    }
}

/// Every tick advances
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAdvance;

impl AdvancePolicy for AlwaysAdvance {
    fn decide(&self, _stage: &Stage, _ctx: &TickContext) -> StageDecision {
        StageDecision::Advance
    }
}
