#![forbid(unsafe_code)]

//! Observers, the [`Source`] trait, and cold sources built from closures.
//!
//! # Design
//!
//! A [`Source<T>`] hands every subscriber its own [`Disposable`]. Cold
//! sources built with [`create`] run their producer once per subscription,
//! which makes them *restartable*: disposing and re-subscribing starts the
//! stream over from scratch.
//!
//! # Invariants
//!
//! 1. An observer sees at most one terminal signal (error or completion),
//!    and nothing after it.
//! 2. Nothing is delivered after the subscription's handle is disposed.
//! 3. Callbacks run with no emitter borrow held; an observer may dispose its
//!    own subscription or signal a terminal event from inside `on_next`.
//!
//! # Failure Modes
//!
//! - **Re-entrant `next`**: a value emitted from inside the same observer's
//!   `on_next` is dropped rather than delivered recursively.

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::disposable::Disposable;
use crate::error::StreamError;
use crate::event::ActionEvent;

type NextFn<T> = Box<dyn FnMut(&T)>;
type ErrorFn = Box<dyn FnMut(StreamError)>;
type CompleteFn = Box<dyn FnMut()>;

/// Callbacks receiving a stream's values and terminal signal.
pub struct Observer<T> {
    on_next: NextFn<T>,
    on_error: ErrorFn,
    on_complete: CompleteFn,
}

impl<T: 'static> Observer<T> {
    /// Observe values with `on_next`; errors and completion are ignored
    /// until handlers are attached.
    pub fn new(on_next: impl FnMut(&T) + 'static) -> Self {
        Self {
            on_next: Box::new(on_next),
            on_error: Box::new(|_| {}),
            on_complete: Box::new(|| {}),
        }
    }

    /// An observer that discards values.
    pub fn ignoring() -> Self {
        Self::new(|_| {})
    }

    /// Attach an error handler.
    #[must_use]
    pub fn on_error(mut self, on_error: impl FnMut(StreamError) + 'static) -> Self {
        self.on_error = Box::new(on_error);
        self
    }

    /// Attach a completion handler.
    #[must_use]
    pub fn on_complete(mut self, on_complete: impl FnMut() + 'static) -> Self {
        self.on_complete = Box::new(on_complete);
        self
    }

    /// Run `tap` ahead of the existing value handler.
    #[must_use]
    pub(crate) fn tap(mut self, mut tap: impl FnMut(&T) + 'static) -> Self {
        let mut on_next = self.on_next;
        self.on_next = Box::new(move |value| {
            tap(value);
            on_next(value);
        });
        self
    }

    pub fn next(&mut self, value: &T) {
        (self.on_next)(value);
    }

    pub fn error(&mut self, error: StreamError) {
        (self.on_error)(error);
    }

    pub fn complete(&mut self) {
        (self.on_complete)();
    }
}

impl<T> fmt::Debug for Observer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer").finish_non_exhaustive()
    }
}

/// A subscribable stream of `T`.
pub trait Source<T> {
    /// Start a new, independent subscription.
    fn subscribe(&self, observer: Observer<T>) -> Disposable;
}

/// Combinators and [`ActionEvent`] conversions for every [`Source`].
pub trait SourceExt<T: 'static>: Source<T> + Sized + 'static {
    /// Run `f` on each value before it reaches the subscriber.
    fn inspect<F>(self, f: F) -> Inspect<Self, F>
    where
        F: Fn(&T) + 'static,
    {
        Inspect {
            source: self,
            f: Rc::new(f),
        }
    }

    /// Wrap this source as an unlabeled [`ActionEvent`].
    fn to_event(self) -> ActionEvent {
        ActionEvent::new(self)
    }

    /// Wrap this source as an [`ActionEvent`] carrying a diagnostic label.
    fn labeled(self, label: impl Into<String>) -> ActionEvent {
        ActionEvent::new(self).with_label(label)
    }
}

impl<T: 'static, S: Source<T> + 'static> SourceExt<T> for S {}

/// Source returned by [`SourceExt::inspect`].
pub struct Inspect<S, F> {
    source: S,
    f: Rc<F>,
}

impl<T, S, F> Source<T> for Inspect<S, F>
where
    T: 'static,
    S: Source<T>,
    F: Fn(&T) + 'static,
{
    fn subscribe(&self, observer: Observer<T>) -> Disposable {
        let f = Rc::clone(&self.f);
        self.source.subscribe(observer.tap(move |value| f(value)))
    }
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// A terminal signal that could not be delivered immediately.
pub(crate) enum Terminal {
    Error(StreamError),
    Complete,
}

impl Terminal {
    pub(crate) fn deliver<T: 'static>(self, observer: &mut Observer<T>) {
        match self {
            Self::Error(error) => observer.error(error),
            Self::Complete => observer.complete(),
        }
    }
}

struct EmitterState<T> {
    /// `None` while a value is being delivered, or once closed.
    observer: Option<Observer<T>>,
    closed: bool,
    /// Terminal signal raised while the observer was checked out.
    deferred: Option<Terminal>,
}

/// Producer-side handle of one subscription made through [`create`].
///
/// Cloning yields another handle to the same subscription.
pub struct Emitter<T> {
    state: Rc<RefCell<EmitterState<T>>>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T: 'static> Emitter<T> {
    fn new(observer: Observer<T>) -> Self {
        Self {
            state: Rc::new(RefCell::new(EmitterState {
                observer: Some(observer),
                closed: false,
                deferred: None,
            })),
        }
    }

    /// Deliver a value unless the subscription is closed.
    pub fn next(&self, value: T) {
        let observer = {
            let mut state = self.state.borrow_mut();
            if state.closed {
                return;
            }
            state.observer.take()
        };
        let Some(mut observer) = observer else {
            return;
        };
        observer.next(&value);

        let deferred = {
            let mut state = self.state.borrow_mut();
            if !state.closed {
                state.observer = Some(observer);
                return;
            }
            state.deferred.take()
        };
        if let Some(terminal) = deferred {
            terminal.deliver(&mut observer);
        }
    }

    /// Fail the subscription. Later signals are ignored.
    pub fn error(&self, error: StreamError) {
        self.terminate(Terminal::Error(error));
    }

    /// Complete the subscription. Later signals are ignored.
    pub fn complete(&self) {
        self.terminate(Terminal::Complete);
    }

    /// Whether the subscription has terminated or been disposed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    fn terminate(&self, terminal: Terminal) {
        let mut observer = {
            let mut state = self.state.borrow_mut();
            if state.closed {
                return;
            }
            state.closed = true;
            match state.observer.take() {
                Some(observer) => observer,
                None => {
                    state.deferred = Some(terminal);
                    return;
                }
            }
        };
        terminal.deliver(&mut observer);
    }

    fn close(&self) {
        let dropped = {
            let mut state = self.state.borrow_mut();
            state.closed = true;
            state.deferred = None;
            state.observer.take()
        };
        drop(dropped);
    }
}

// ---------------------------------------------------------------------------
// Cold sources
// ---------------------------------------------------------------------------

/// Cold source that runs its producer once per subscription.
pub struct Create<T> {
    producer: Rc<dyn Fn(Emitter<T>) -> Disposable>,
    _values: PhantomData<fn(&T)>,
}

impl<T> Clone for Create<T> {
    fn clone(&self) -> Self {
        Self {
            producer: Rc::clone(&self.producer),
            _values: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Create<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Create").finish_non_exhaustive()
    }
}

impl<T: 'static> Source<T> for Create<T> {
    fn subscribe(&self, observer: Observer<T>) -> Disposable {
        let emitter = Emitter::new(observer);
        let teardown = (self.producer)(emitter.clone());
        Disposable::new(move || {
            emitter.close();
            teardown.dispose();
        })
    }
}

/// Build a cold source from a producer.
///
/// The producer receives an [`Emitter`] for the new subscription and returns
/// the [`Disposable`] that releases whatever it set up.
pub fn create<T: 'static>(producer: impl Fn(Emitter<T>) -> Disposable + 'static) -> Create<T> {
    Create {
        producer: Rc::new(producer),
        _values: PhantomData,
    }
}

/// Emit `value` once, then complete.
pub fn just<T: Clone + 'static>(value: T) -> Create<T> {
    create(move |emitter| {
        emitter.next(value.clone());
        emitter.complete();
        Disposable::empty()
    })
}

/// Fail immediately on every subscription.
pub fn fail<T: 'static>(error: StreamError) -> Create<T> {
    create(move |emitter| {
        emitter.error(error.clone());
        Disposable::empty()
    })
}

/// Never emit and never terminate.
pub fn never<T: 'static>() -> Create<T> {
    create(|_| Disposable::empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    fn recorder<T: Clone + 'static>() -> (Observer<T>, Rc<RefCell<Vec<T>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        (Observer::new(move |v: &T| sink.borrow_mut().push(v.clone())), seen)
    }

    #[test]
    fn just_emits_then_completes() {
        let completed = Rc::new(Cell::new(false));
        let done = Rc::clone(&completed);
        let (observer, seen) = recorder::<i32>();
        let _sub = just(7).subscribe(observer.on_complete(move || done.set(true)));
        assert_eq!(*seen.borrow(), vec![7]);
        assert!(completed.get());
    }

    #[test]
    fn fail_delivers_error_on_each_subscription() {
        let errors = Rc::new(Cell::new(0));
        let source = fail::<()>(StreamError::new("boom"));
        for _ in 0..3 {
            let e = Rc::clone(&errors);
            let _sub = source.subscribe(Observer::ignoring().on_error(move |err| {
                assert_eq!(err.message(), "boom");
                e.set(e.get() + 1);
            }));
        }
        assert_eq!(errors.get(), 3);
    }

    #[test]
    fn create_runs_producer_per_subscription() {
        let runs = Rc::new(Cell::new(0));
        let r = Rc::clone(&runs);
        let source = create::<u8>(move |_| {
            r.set(r.get() + 1);
            Disposable::empty()
        });
        let _a = source.subscribe(Observer::ignoring());
        let _b = source.subscribe(Observer::ignoring());
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn disposal_stops_delivery_and_runs_teardown() {
        let slot: Rc<RefCell<Option<Emitter<i32>>>> = Rc::new(RefCell::new(None));
        let torn_down = Rc::new(Cell::new(false));
        let (s, t) = (Rc::clone(&slot), Rc::clone(&torn_down));
        let source = create(move |emitter| {
            *s.borrow_mut() = Some(emitter);
            let t = Rc::clone(&t);
            Disposable::new(move || t.set(true))
        });
        let (observer, seen) = recorder();
        let sub = source.subscribe(observer);
        let emitter = slot.borrow().clone().expect("producer ran");
        emitter.next(1);
        sub.dispose();
        emitter.next(2);
        assert_eq!(*seen.borrow(), vec![1]);
        assert!(torn_down.get());
        assert!(emitter.is_closed());
    }

    #[test]
    fn nothing_after_terminal() {
        let slot: Rc<RefCell<Option<Emitter<i32>>>> = Rc::new(RefCell::new(None));
        let s = Rc::clone(&slot);
        let source = create(move |emitter| {
            *s.borrow_mut() = Some(emitter);
            Disposable::empty()
        });
        let errors = Rc::new(Cell::new(0));
        let e = Rc::clone(&errors);
        let (observer, seen) = recorder();
        let _sub = source.subscribe(observer.on_error(move |_| e.set(e.get() + 1)));
        let emitter = slot.borrow().clone().expect("producer ran");
        emitter.error(StreamError::new("first"));
        emitter.error(StreamError::new("second"));
        emitter.next(9);
        emitter.complete();
        assert!(seen.borrow().is_empty());
        assert_eq!(errors.get(), 1);
    }

    #[test]
    fn error_raised_inside_on_next_is_delivered_after() {
        let slot: Rc<RefCell<Option<Emitter<i32>>>> = Rc::new(RefCell::new(None));
        let s = Rc::clone(&slot);
        let source = create(move |emitter| {
            *s.borrow_mut() = Some(emitter);
            Disposable::empty()
        });
        let log = Rc::new(RefCell::new(Vec::new()));
        let (on_next_log, on_error_log) = (Rc::clone(&log), Rc::clone(&log));
        let inner = Rc::clone(&slot);
        let _sub = source.subscribe(
            Observer::new(move |v: &i32| {
                on_next_log.borrow_mut().push(format!("next {v}"));
                if let Some(emitter) = inner.borrow().as_ref() {
                    emitter.error(StreamError::new("nested"));
                }
            })
            .on_error(move |err| on_error_log.borrow_mut().push(format!("error {err}"))),
        );
        let emitter = slot.borrow().clone().expect("producer ran");
        emitter.next(1);
        assert_eq!(*log.borrow(), vec!["next 1", "error nested"]);
    }

    #[test]
    fn inspect_sees_each_value() {
        let tapped = Rc::new(RefCell::new(Vec::new()));
        let t = Rc::clone(&tapped);
        let (observer, seen) = recorder();
        let _sub = just(3)
            .inspect(move |v| t.borrow_mut().push(*v * 10))
            .subscribe(observer);
        assert_eq!(*tapped.borrow(), vec![30]);
        assert_eq!(*seen.borrow(), vec![3]);
    }

    #[test]
    fn never_stays_silent() {
        let (observer, seen) = recorder::<i32>();
        let sub = never().subscribe(observer);
        assert!(seen.borrow().is_empty());
        assert!(!sub.is_disposed());
    }
}
