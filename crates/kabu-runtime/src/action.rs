#![forbid(unsafe_code)]

//! Background behavior bound to a scene.

use std::fmt;

use kabu_core::ActionEvent;

use crate::director::Director;
use crate::error::ActionError;
use crate::scene::Stage;

/// A unit of background behavior: a set of streams that are live while the
/// action is active.
///
/// At most one instance of a given action type is active per
/// [`ActionActivator`](crate::ActionActivator).
pub trait Action<S: Stage>: 'static {
    /// Produce the streams to subscribe. Called on every activation.
    fn invoke(&self, director: &Director<S>) -> Vec<ActionEvent>;

    /// Choose how to recover from a stream failure. Default: drop it.
    fn on_error(&self, error: &ActionError) -> RecoverPattern {
        let _ = error;
        RecoverPattern::DoNothing
    }

    /// Called once per deactivation, after every stream is disposed.
    fn on_stop(&self) {}
}

/// Recovery for a failed stream.
pub enum RecoverPattern {
    /// Restart the failed stream, then run the callback.
    ReloadErrorSignal(Box<dyn FnOnce()>),
    /// Leave the stream stopped.
    DoNothing,
}

impl RecoverPattern {
    #[must_use]
    pub fn reload() -> Self {
        Self::ReloadErrorSignal(Box::new(|| {}))
    }

    pub fn reload_then(on_start: impl FnOnce() + 'static) -> Self {
        Self::ReloadErrorSignal(Box::new(on_start))
    }

    #[must_use]
    pub fn is_reload(&self) -> bool {
        matches!(self, Self::ReloadErrorSignal(_))
    }
}

impl fmt::Debug for RecoverPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReloadErrorSignal(_) => f.write_str("ReloadErrorSignal(..)"),
            Self::DoNothing => f.write_str("DoNothing"),
        }
    }
}
