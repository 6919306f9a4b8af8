#![forbid(unsafe_code)]

//! Runtime error types.
//!
//! Soft rejections (activating an active action, releasing a non-top scene)
//! are reported as `false`, not as errors. The types here cover misuse of a
//! sequence and stream failures inside an action.

use kabu_core::StreamError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SequenceError>;

/// Why a sequence refused a push or navigation request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceError {
    #[error("scene sequence has not been started")]
    NotStarted,

    #[error("scene sequence has already exited")]
    Exited,

    #[error("director is not attached to a live sequence")]
    Detached,

    #[error("scene `{scene}` is already on the sequence stack")]
    AlreadyPresent { scene: &'static str },

    #[error("scene stack depth limit of {limit} reached")]
    DepthExceeded { limit: usize },
}

/// A stream failure inside an active action.
///
/// Handed to [`Action::on_error`](crate::Action::on_error), which picks the
/// [`RecoverPattern`](crate::RecoverPattern).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "action `{action}` event #{index} ({}) failed: {source}",
    .label.as_deref().unwrap_or("unlabeled")
)]
pub struct ActionError {
    action: &'static str,
    index: usize,
    label: Option<String>,
    #[source]
    source: StreamError,
}

impl ActionError {
    pub(crate) fn new(
        action: &'static str,
        index: usize,
        label: Option<String>,
        source: StreamError,
    ) -> Self {
        Self {
            action,
            index,
            label,
            source,
        }
    }

    /// Type name of the action whose stream failed.
    #[must_use]
    pub fn action(&self) -> &'static str {
        self.action
    }

    /// Position of the failed event in the action's event list.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Label of the failed event, if it has one.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// The underlying stream error.
    #[must_use]
    pub fn cause(&self) -> &StreamError {
        &self.source
    }
}
