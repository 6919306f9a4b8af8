#![forbid(unsafe_code)]

//! Top-level owner of a running sequence or scenario.

use std::fmt;

use tracing::{debug, warn};

use crate::director::Director;
use crate::scenario::Scenario;
use crate::scene::Stage;
use crate::sequence::{Phase, SceneSequence};

enum Production<S: Stage> {
    Sequence(SceneSequence<S>),
    Scenario(Scenario<S>),
}

/// Owns a started [`SceneSequence`] or [`Scenario`].
///
/// A producer only exists in the started state: [`run`](Self::run) and
/// [`run_scenario`](Self::run_scenario) start what they are given before
/// returning. Dropping the producer exits the production.
pub struct Producer<S: Stage> {
    production: Production<S>,
}

impl<S: Stage> Producer<S> {
    /// Start `sequence` and take ownership of it.
    pub fn run(sequence: SceneSequence<S>) -> Self {
        if !sequence.start() {
            warn!(phase = ?sequence.phase(), "producer given a sequence that was already started");
        }
        Self {
            production: Production::Sequence(sequence),
        }
    }

    pub fn run_scenario(scenario: Scenario<S>) -> Self {
        if !scenario.start() {
            warn!("producer given a scenario that was already started");
        }
        Self {
            production: Production::Scenario(scenario),
        }
    }

    /// Director of the running sequence (or the scenario's running act).
    #[must_use]
    pub fn director(&self) -> Option<Director<S>> {
        match &self.production {
            Production::Sequence(sequence) => Some(sequence.director()),
            Production::Scenario(scenario) => scenario.current_director(),
        }
    }

    /// Exit the production. Only the first call returns true.
    pub fn exit(&self) -> bool {
        match &self.production {
            Production::Sequence(sequence) => sequence.exit(),
            Production::Scenario(scenario) => scenario.exit(),
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        match &self.production {
            Production::Sequence(sequence) => sequence.phase() == Phase::Exited,
            Production::Scenario(scenario) => scenario.is_finished(),
        }
    }

    #[must_use]
    pub fn sequence(&self) -> Option<&SceneSequence<S>> {
        match &self.production {
            Production::Sequence(sequence) => Some(sequence),
            Production::Scenario(_) => None,
        }
    }

    #[must_use]
    pub fn scenario(&self) -> Option<&Scenario<S>> {
        match &self.production {
            Production::Sequence(_) => None,
            Production::Scenario(scenario) => Some(scenario),
        }
    }
}

impl<S: Stage> Drop for Producer<S> {
    fn drop(&mut self) {
        if self.exit() {
            debug!("producer dropped; production exited");
        }
    }
}

impl<S: Stage> fmt::Debug for Producer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.production {
            Production::Sequence(sequence) => f.debug_tuple("Producer").field(sequence).finish(),
            Production::Scenario(scenario) => f.debug_tuple("Producer").field(scenario).finish(),
        }
    }
}
