#![forbid(unsafe_code)]

//! Uniform, restartable wrapper around any [`Source`].
//!
//! An [`ActionEvent`] erases the value type of a stream and keeps only what
//! the runtime cares about: starting it with error/completion handlers,
//! disposing it, and an optional label for diagnostics.
//!
//! ```
//! use kabu_core::reactive::{SourceExt, just};
//!
//! let event = just(1).labeled("clock");
//! assert_eq!(event.label(), Some("clock"));
//! assert!(!event.is_subscribed());
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::marker::PhantomData;

use tracing::trace;

use crate::disposable::Disposable;
use crate::error::StreamError;
use crate::reactive::{Observer, Source};

/// Error and completion handlers for one run of an [`ActionEvent`].
pub struct EventSink {
    on_error: Box<dyn FnMut(StreamError)>,
    on_complete: Box<dyn FnMut()>,
}

impl EventSink {
    pub fn new(on_error: impl FnMut(StreamError) + 'static) -> Self {
        Self {
            on_error: Box::new(on_error),
            on_complete: Box::new(|| {}),
        }
    }

    #[must_use]
    pub fn on_complete(mut self, on_complete: impl FnMut() + 'static) -> Self {
        self.on_complete = Box::new(on_complete);
        self
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink").finish_non_exhaustive()
    }
}

trait EventSource {
    fn start(&self, sink: EventSink) -> Disposable;
}

struct Erased<S, T> {
    source: S,
    _values: PhantomData<fn(&T)>,
}

impl<S, T> EventSource for Erased<S, T>
where
    S: Source<T>,
    T: 'static,
{
    fn start(&self, sink: EventSink) -> Disposable {
        let EventSink {
            on_error,
            on_complete,
        } = sink;
        self.source.subscribe(
            Observer::ignoring()
                .on_error(on_error)
                .on_complete(on_complete),
        )
    }
}

/// One stream of an action, plus its live subscription.
pub struct ActionEvent {
    source: Box<dyn EventSource>,
    label: Option<String>,
    subscription: RefCell<Option<Disposable>>,
    /// Bumped on every dispose; detects disposal racing a start.
    generation: Cell<u64>,
    starts: Cell<u64>,
}

impl ActionEvent {
    /// Wrap a source. Values are consumed by whatever the source itself does
    /// with them (see [`SourceExt::inspect`](crate::reactive::SourceExt::inspect)).
    pub fn new<S, T>(source: S) -> Self
    where
        S: Source<T> + 'static,
        T: 'static,
    {
        Self {
            source: Box::new(Erased {
                source,
                _values: PhantomData,
            }),
            label: None,
            subscription: RefCell::new(None),
            generation: Cell::new(0),
            starts: Cell::new(0),
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Subscribe the wrapped source, disposing any previous subscription
    /// first.
    pub fn start(&self, sink: EventSink) {
        self.dispose();
        let generation = self.generation.get();
        let handle = self.source.start(sink);
        self.starts.set(self.starts.get() + 1);
        trace!(label = self.label.as_deref(), starts = self.starts.get(), "action event started");
        if self.generation.get() != generation {
            // Disposed while the source was starting.
            handle.dispose();
            return;
        }
        let previous = self.subscription.replace(Some(handle));
        drop(previous);
    }

    /// Cancel the live subscription, if any.
    pub fn dispose(&self) {
        self.generation.set(self.generation.get() + 1);
        let handle = self.subscription.borrow_mut().take();
        if let Some(handle) = handle {
            handle.dispose();
        }
    }

    /// Whether a subscription is currently held.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.subscription
            .borrow()
            .as_ref()
            .is_some_and(|handle| !handle.is_disposed())
    }

    /// How many times this event has been started.
    #[must_use]
    pub fn start_count(&self) -> u64 {
        self.starts.get()
    }
}

impl fmt::Debug for ActionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionEvent")
            .field("label", &self.label)
            .field("subscribed", &self.is_subscribed())
            .field("starts", &self.starts.get())
            .finish()
    }
}
