#![forbid(unsafe_code)]

//! Non-owning handle to a running [`SceneSequence`](crate::SceneSequence).
//!
//! Scenes and actions receive a `Director` rather than the sequence itself.
//! It never keeps the sequence alive: once the owning
//! [`Producer`](crate::Producer) is dropped, every operation reports
//! [`SequenceError::Detached`] (or `false` / `None`).

use std::fmt;
use std::rc::{Rc, Weak};

use crate::activator::ActionActivator;
use crate::config::ActivatorConfig;
use crate::error::{Result, SequenceError};
use crate::scene::{Scene, Shared, Stage};
use crate::sequence::{Phase, SequenceInner};
use crate::transition::{SceneRequest, SceneTransition};

pub struct Director<S: Stage> {
    sequence: Weak<SequenceInner<S>>,
}

impl<S: Stage> Director<S> {
    pub(crate) fn new(sequence: Weak<SequenceInner<S>>) -> Self {
        Self { sequence }
    }

    /// A director bound to no sequence.
    #[must_use]
    pub fn detached() -> Self {
        Self {
            sequence: Weak::new(),
        }
    }

    fn upgrade(&self) -> Result<Rc<SequenceInner<S>>> {
        self.sequence.upgrade().ok_or(SequenceError::Detached)
    }

    /// Tear down the sequence. Idempotent: only the first call returns true.
    pub fn exit(&self) -> bool {
        self.sequence
            .upgrade()
            .is_some_and(|sequence| sequence.exit())
    }

    pub fn push(&self, transition: SceneTransition<S>) -> Result<()> {
        self.upgrade()?.push(transition)
    }

    /// Resolve `request` against the current top entry and push the result.
    ///
    /// `Ok(false)` means the request declined.
    pub fn forward(&self, request: impl Into<SceneRequest<S>>) -> Result<bool> {
        self.upgrade()?.forward(request.into())
    }

    /// Release `scene` if it is the removable top of a multi-entry stack.
    ///
    /// Refused (false, with a warning) while `scene` is borrowed elsewhere,
    /// including by the caller: end any `scene.borrow()` before calling.
    pub fn release<T: Scene<S>>(&self, scene: &Shared<T>) -> bool {
        self.sequence
            .upgrade()
            .is_some_and(|sequence| sequence.release(scene))
    }

    pub fn release_current(&self) -> bool {
        self.sequence
            .upgrade()
            .is_some_and(|sequence| sequence.release_current())
    }

    #[must_use]
    pub fn current_scene<T: 'static>(&self) -> Option<Shared<T>> {
        self.sequence.upgrade()?.current_scene()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.sequence.upgrade().map_or(0, |sequence| sequence.depth())
    }

    /// Whether the sequence is alive and has not exited.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.sequence
            .upgrade()
            .is_some_and(|sequence| sequence.phase() != Phase::Exited)
    }

    /// A fresh activator whose actions are invoked with this director.
    #[must_use]
    pub fn activator(&self) -> ActionActivator<S> {
        ActionActivator::new(self.clone())
    }

    #[must_use]
    pub fn activator_with(&self, config: ActivatorConfig) -> ActionActivator<S> {
        ActionActivator::with_config(self.clone(), config)
    }
}

impl<S: Stage> Clone for Director<S> {
    fn clone(&self) -> Self {
        Self {
            sequence: Weak::clone(&self.sequence),
        }
    }
}

impl<S: Stage> fmt::Debug for Director<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Director")
            .field("attached", &self.is_attached())
            .field("depth", &self.depth())
            .finish()
    }
}
