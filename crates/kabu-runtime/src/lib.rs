#![forbid(unsafe_code)]

//! Scene navigation and action lifecycle.
//!
//! A [`SceneSequence`] is a stack of [`Scene`]s for one navigation flow.
//! Scenes hold a non-owning [`Director`] and use it to push
//! [`SceneTransition`]s (directly, or by routing a [`Destination`] through
//! their [`Router`]). Background behavior lives in [`Action`]s, which an
//! [`ActionActivator`] activates and deactivates by type, restarting failed
//! streams according to each action's [`RecoverPattern`].
//!
//! [`Producer`] owns a started sequence or a multi-act [`Scenario`].
//!
//! Everything here is single-threaded (`Rc`, `RefCell`) and synchronous.

pub mod action;
pub mod activator;
pub mod config;
pub mod director;
pub mod error;
pub mod producer;
pub mod scenario;
pub mod scene;
pub mod sequence;
pub mod transition;

pub use action::{Action, RecoverPattern};
pub use activator::ActionActivator;
pub use config::{ActivatorConfig, SequenceConfig};
pub use director::Director;
pub use error::{ActionError, Result, SequenceError};
pub use producer::Producer;
pub use scenario::Scenario;
pub use scene::{Attachment, Destination, Router, Routes, Scene, Shared, Stage, Unreachable, shared};
pub use sequence::{Phase, SceneSequence};
pub use transition::{SceneRequest, SceneTransition, TransitionContext};
