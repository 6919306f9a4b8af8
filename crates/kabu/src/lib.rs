#![forbid(unsafe_code)]

//! kabu public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub use kabu_core as core;
pub use kabu_runtime as runtime;

pub mod prelude {
    pub use kabu_core::reactive::{create, fail, just, never};
    pub use kabu_core::{
        ActionEvent, Disposable, Observer, Source, SourceExt, StreamError, Subject,
    };
    pub use kabu_runtime::{
        Action, ActionActivator, ActionError, ActivatorConfig, Attachment, Destination, Director,
        Phase, Producer, RecoverPattern, Router, Routes, Scenario, Scene, SceneRequest,
        SceneSequence, SceneTransition, SequenceConfig, SequenceError, Shared, Stage,
        TransitionContext, Unreachable, shared,
    };
}
