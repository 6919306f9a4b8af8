#![forbid(unsafe_code)]

//! Per-owner registry of [`Action`]s and their live streams.
//!
//! # Design
//!
//! Actions are keyed by [`TypeId`]. The registry keeps the first instance
//! registered for each type; the live table maps a type to its current
//! *activation* (an epoch plus the subscribed events). A type is active iff
//! it has a live entry.
//!
//! Stream failures do not recover inline. The failing event's sink queues
//! the failure and the activator drains the queue outside any table borrow,
//! so a stream that fails synchronously on restart is retried iteratively
//! rather than recursively.
//!
//! # Invariants
//!
//! 1. At most one live activation per action type.
//! 2. `activate` on an active type is a no-op returning false.
//! 3. `deactivate` disposes every stream of the activation before it
//!    returns, then calls `on_stop`.
//! 4. A failure is only recovered if its activation is still the live one;
//!    failures of deactivated or replaced activations are dropped.
//! 5. With `max_retries = Some(n)`, an event is restarted at most `n` times
//!    per activation.
//!
//! # Failure Modes
//!
//! - **Unbounded retry of a synchronously failing stream**: with the default
//!   config and a `ReloadErrorSignal` policy, a stream that fails on every
//!   subscribe never lets the drain loop finish. Set `max_retries` for
//!   such sources.

use std::any::{Any, TypeId, type_name};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::collections::hash_map::Entry;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use kabu_core::{ActionEvent, EventSink, StreamError};
use tracing::{debug, trace, warn};

use crate::action::{Action, RecoverPattern};
use crate::config::ActivatorConfig;
use crate::director::Director;
use crate::error::ActionError;
use crate::scene::Stage;

struct Registration<S: Stage> {
    name: &'static str,
    action: Rc<dyn Action<S>>,
    any: Rc<dyn Any>,
}

impl<S: Stage> Registration<S> {
    fn new<A: Action<S>>(action: A) -> Self {
        let action = Rc::new(action);
        Self {
            name: type_name::<A>(),
            any: Rc::clone(&action) as Rc<dyn Any>,
            action,
        }
    }
}

impl<S: Stage> Clone for Registration<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            action: Rc::clone(&self.action),
            any: Rc::clone(&self.any),
        }
    }
}

struct Activation {
    epoch: u64,
    events: Rc<[ActionEvent]>,
    retries: Vec<u32>,
}

struct Failure {
    key: TypeId,
    epoch: u64,
    index: usize,
    error: StreamError,
}

/// Marks the failure queue as being drained; cleared on drop.
struct FailureScope<'a> {
    draining: &'a Cell<bool>,
}

impl<'a> FailureScope<'a> {
    /// `None` if a drain is already in progress further up the stack.
    fn enter(draining: &'a Cell<bool>) -> Option<Self> {
        if draining.replace(true) {
            return None;
        }
        Some(Self { draining })
    }
}

impl Drop for FailureScope<'_> {
    fn drop(&mut self) {
        self.draining.set(false);
    }
}

struct ActivatorInner<S: Stage> {
    director: Director<S>,
    config: ActivatorConfig,
    registry: RefCell<AHashMap<TypeId, Registration<S>>>,
    /// Registration order, for `deactivate_all`.
    order: RefCell<Vec<TypeId>>,
    live: RefCell<AHashMap<TypeId, Activation>>,
    pending: RefCell<VecDeque<Failure>>,
    draining: Cell<bool>,
    next_epoch: Cell<u64>,
    closed: Cell<bool>,
}

impl<S: Stage> ActivatorInner<S> {
    fn activate<A: Action<S>>(self: &Rc<Self>, action: A, on_start: impl FnOnce()) -> bool {
        let name = type_name::<A>();
        if self.closed.get() {
            warn!(action = name, "activate after close ignored");
            return false;
        }
        let key = TypeId::of::<A>();
        if self.live.borrow().contains_key(&key) {
            debug!(action = name, "action already active");
            return false;
        }

        let registration = match self.registry.borrow_mut().entry(key) {
            Entry::Occupied(existing) => {
                debug!(action = name, "reusing first registered instance");
                existing.get().clone()
            }
            Entry::Vacant(slot) => {
                self.order.borrow_mut().push(key);
                slot.insert(Registration::new(action)).clone()
            }
        };

        let events: Rc<[ActionEvent]> = registration.action.invoke(&self.director).into();
        // `invoke` is user code; it may have activated this type or closed us.
        if self.closed.get() || self.live.borrow().contains_key(&key) {
            debug!(action = name, "activation superseded during invoke");
            return false;
        }

        let epoch = self.next_epoch.get();
        self.next_epoch.set(epoch + 1);
        self.live.borrow_mut().insert(
            key,
            Activation {
                epoch,
                events: Rc::clone(&events),
                retries: vec![0; events.len()],
            },
        );
        debug!(action = name, events = events.len(), epoch, "action activated");

        self.batch(|| {
            for (index, event) in events.iter().enumerate() {
                event.start(self.sink(key, epoch, index));
            }
            on_start();
        });
        true
    }

    fn deactivate(&self, key: TypeId) -> bool {
        let removed = self.live.borrow_mut().remove(&key);
        let Some(activation) = removed else {
            return false;
        };
        for event in activation.events.iter() {
            event.dispose();
        }
        self.pending.borrow_mut().retain(|failure| failure.key != key);

        let registration = self.registry.borrow().get(&key).cloned();
        if let Some(registration) = registration {
            debug!(action = registration.name, epoch = activation.epoch, "action deactivated");
            registration.action.on_stop();
        }
        true
    }

    fn deactivate_all(&self) -> usize {
        let keys = self.order.borrow().clone();
        keys.into_iter().filter(|&key| self.deactivate(key)).count()
    }

    fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        let stopped = self.deactivate_all();
        self.registry.borrow_mut().clear();
        self.order.borrow_mut().clear();
        self.pending.borrow_mut().clear();
        debug!(stopped, "action activator closed");
    }

    fn sink(self: &Rc<Self>, key: TypeId, epoch: u64, index: usize) -> EventSink {
        let weak: Weak<Self> = Rc::downgrade(self);
        EventSink::new(move |error| {
            if let Some(inner) = weak.upgrade() {
                inner.report(Failure {
                    key,
                    epoch,
                    index,
                    error,
                });
            }
        })
        .on_complete(move || trace!(epoch, index, "action event completed"))
    }

    fn report(self: &Rc<Self>, failure: Failure) {
        self.pending.borrow_mut().push_back(failure);
        self.batch(|| {});
    }

    /// Run `f`, then drain failures it queued. Inside an ongoing drain, `f`
    /// just runs and the outer drain picks the failures up.
    fn batch(self: &Rc<Self>, f: impl FnOnce()) {
        let Some(scope) = FailureScope::enter(&self.draining) else {
            f();
            return;
        };
        f();
        loop {
            let next = self.pending.borrow_mut().pop_front();
            let Some(failure) = next else {
                break;
            };
            self.recover(failure);
        }
        drop(scope);
    }

    /// The live events of `key`, if `epoch` is still its activation.
    fn current(&self, key: TypeId, epoch: u64) -> Option<Rc<[ActionEvent]>> {
        self.live
            .borrow()
            .get(&key)
            .filter(|activation| activation.epoch == epoch)
            .map(|activation| Rc::clone(&activation.events))
    }

    fn recover(self: &Rc<Self>, failure: Failure) {
        let Failure {
            key,
            epoch,
            index,
            error,
        } = failure;
        let Some(events) = self.current(key, epoch) else {
            trace!(epoch, index, "stale failure dropped");
            return;
        };
        let Some(event) = events.get(index) else {
            return;
        };
        let Some(registration) = self.registry.borrow().get(&key).cloned() else {
            return;
        };

        let error = ActionError::new(registration.name, index, event.label().map(str::to_owned), error);
        debug!(action = registration.name, %error, "action event failed");

        match registration.action.on_error(&error) {
            RecoverPattern::DoNothing => event.dispose(),
            RecoverPattern::ReloadErrorSignal(on_start) => {
                // `on_error` may have deactivated the action.
                if self.current(key, epoch).is_none() {
                    return;
                }
                let attempt = {
                    let mut live = self.live.borrow_mut();
                    let Some(slot) = live
                        .get_mut(&key)
                        .and_then(|activation| activation.retries.get_mut(index))
                    else {
                        return;
                    };
                    *slot += 1;
                    *slot
                };
                if let Some(max) = self.config.max_retries
                    && attempt > max
                {
                    warn!(
                        action = registration.name,
                        index,
                        max_retries = max,
                        "retry limit reached; event left stopped"
                    );
                    event.dispose();
                    return;
                }
                event.start(self.sink(key, epoch, index));
                trace!(action = registration.name, index, attempt, "action event restarted");
                on_start();
            }
        }
    }
}

/// Activates and deactivates [`Action`]s by type.
///
/// Dropping the activator closes it.
pub struct ActionActivator<S: Stage> {
    inner: Rc<ActivatorInner<S>>,
}

impl<S: Stage> ActionActivator<S> {
    /// An activator whose actions are invoked with `director`.
    pub fn new(director: Director<S>) -> Self {
        Self::with_config(director, ActivatorConfig::default())
    }

    pub fn with_config(director: Director<S>, config: ActivatorConfig) -> Self {
        Self {
            inner: Rc::new(ActivatorInner {
                director,
                config,
                registry: RefCell::new(AHashMap::new()),
                order: RefCell::new(Vec::new()),
                live: RefCell::new(AHashMap::new()),
                pending: RefCell::new(VecDeque::new()),
                draining: Cell::new(false),
                next_epoch: Cell::new(0),
                closed: Cell::new(false),
            }),
        }
    }

    /// Activate `action`. False if its type is already active.
    ///
    /// The first instance registered for a type is kept: if the type was
    /// activated before, `action` is dropped and the stored instance is
    /// invoked again.
    pub fn activate<A: Action<S>>(&self, action: A) -> bool {
        self.inner.activate(action, || {})
    }

    /// Like [`activate`](Self::activate), running `on_start` after every
    /// stream is subscribed.
    pub fn activate_with<A: Action<S>>(&self, action: A, on_start: impl FnOnce()) -> bool {
        self.inner.activate(action, on_start)
    }

    /// Dispose every stream of `A` and call its `on_stop`. False if `A` was
    /// not active.
    pub fn deactivate<A: Action<S>>(&self) -> bool {
        self.inner.deactivate(TypeId::of::<A>())
    }

    /// Deactivate every registered type. Returns how many were active.
    pub fn deactivate_all(&self) -> usize {
        self.inner.deactivate_all()
    }

    #[must_use]
    pub fn is_active<A: Action<S>>(&self) -> bool {
        self.inner.live.borrow().contains_key(&TypeId::of::<A>())
    }

    /// The stored instance of `A`, active or not.
    #[must_use]
    pub fn resolve<A: Action<S>>(&self) -> Option<Rc<A>> {
        let any = Rc::clone(&self.inner.registry.borrow().get(&TypeId::of::<A>())?.any);
        any.downcast::<A>().ok()
    }

    /// Number of `A`'s events currently holding a subscription.
    #[must_use]
    pub fn live_event_count<A: Action<S>>(&self) -> usize {
        self.inner
            .live
            .borrow()
            .get(&TypeId::of::<A>())
            .map_or(0, |activation| {
                activation
                    .events
                    .iter()
                    .filter(|event| event.is_subscribed())
                    .count()
            })
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.live.borrow().len()
    }

    #[must_use]
    pub fn director(&self) -> &Director<S> {
        &self.inner.director
    }

    #[must_use]
    pub fn config(&self) -> ActivatorConfig {
        self.inner.config
    }

    /// Deactivate everything and forget every registration. Later
    /// activations are refused.
    pub fn close(&self) {
        self.inner.close();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.get()
    }
}

impl<S: Stage> Drop for ActionActivator<S> {
    fn drop(&mut self) {
        self.inner.close();
    }
}

impl<S: Stage> fmt::Debug for ActionActivator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&'static str> = {
            let registry = self.inner.registry.borrow();
            let live = self.inner.live.borrow();
            self.inner
                .order
                .borrow()
                .iter()
                .filter(|key| live.contains_key(*key))
                .filter_map(|key| registry.get(key).map(|r| r.name))
                .collect()
        };
        f.debug_struct("ActionActivator")
            .field("active", &names)
            .field("closed", &self.inner.closed.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kabu_core::Disposable;
    use kabu_core::reactive::{SourceExt, Subject, create};
    use tracing_test::traced_test;

    #[derive(Default)]
    struct Tally {
        stops: Cell<u32>,
        errors: RefCell<Vec<String>>,
    }

    struct Ticker {
        ticks: Subject<u32>,
        tally: Rc<Tally>,
        reload: bool,
    }

    impl Action<()> for Ticker {
        fn invoke(&self, _director: &Director<()>) -> Vec<ActionEvent> {
            vec![self.ticks.clone().labeled("ticks")]
        }

        fn on_error(&self, error: &ActionError) -> RecoverPattern {
            self.tally.errors.borrow_mut().push(error.to_string());
            if self.reload {
                RecoverPattern::reload()
            } else {
                RecoverPattern::DoNothing
            }
        }

        fn on_stop(&self) {
            self.tally.stops.set(self.tally.stops.get() + 1);
        }
    }

    fn ticker(reload: bool) -> (Ticker, Subject<u32>, Rc<Tally>) {
        let ticks = Subject::new();
        let tally = Rc::new(Tally::default());
        let action = Ticker {
            ticks: ticks.clone(),
            tally: Rc::clone(&tally),
            reload,
        };
        (action, ticks, tally)
    }

    /// Fails synchronously on the first `failures` subscriptions.
    struct Flaky {
        failures: u32,
        attempts: Rc<Cell<u32>>,
    }

    impl Action<()> for Flaky {
        fn invoke(&self, _director: &Director<()>) -> Vec<ActionEvent> {
            let attempts = Rc::clone(&self.attempts);
            let failures = self.failures;
            vec![
                create::<()>(move |emitter| {
                    attempts.set(attempts.get() + 1);
                    if attempts.get() <= failures {
                        emitter.error(StreamError::new("flaky"));
                    }
                    Disposable::empty()
                })
                .to_event(),
            ]
        }

        fn on_error(&self, _error: &ActionError) -> RecoverPattern {
            RecoverPattern::reload()
        }
    }

    fn activator() -> ActionActivator<()> {
        ActionActivator::new(Director::detached())
    }

    #[test]
    fn on_start_runs_after_subscription() {
        let (action, ticks, _) = ticker(false);
        let seen = Rc::new(Cell::new(0));
        let s = Rc::clone(&seen);
        let subject = ticks.clone();
        let activator = activator();
        assert!(activator.activate_with(action, move || s.set(subject.subscriber_count())));
        assert_eq!(seen.get(), 1);
        assert_eq!(ticks.subscriber_count(), 1);
    }

    #[test]
    fn do_nothing_leaves_event_stopped() {
        let (action, ticks, tally) = ticker(false);
        let activator = activator();
        activator.activate(action);
        ticks.fail(StreamError::new("lost"));
        let errors = tally.errors.borrow();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].ends_with("Ticker` event #0 (ticks) failed: lost"));
        drop(errors);
        assert_eq!(ticks.subscriber_count(), 0);
        assert!(activator.is_active::<Ticker>());
        assert_eq!(activator.live_event_count::<Ticker>(), 0);
    }

    #[test]
    fn reload_resubscribes_same_event() {
        let (action, ticks, tally) = ticker(true);
        let activator = activator();
        activator.activate(action);
        ticks.fail(StreamError::new("lost"));
        assert_eq!(tally.errors.borrow().len(), 1);
        assert_eq!(ticks.subscriber_count(), 1);
        assert_eq!(activator.live_event_count::<Ticker>(), 1);
    }

    #[test]
    fn synchronous_failures_retry_without_recursion() {
        let attempts = Rc::new(Cell::new(0));
        let activator = activator();
        activator.activate(Flaky {
            failures: 500,
            attempts: Rc::clone(&attempts),
        });
        assert_eq!(attempts.get(), 501);
        assert_eq!(activator.live_event_count::<Flaky>(), 1);
    }

    #[traced_test]
    #[test]
    fn retry_cap_stops_restarts() {
        let attempts = Rc::new(Cell::new(0));
        let activator = ActionActivator::with_config(
            Director::detached(),
            ActivatorConfig::default().with_max_retries(3),
        );
        activator.activate(Flaky {
            failures: u32::MAX,
            attempts: Rc::clone(&attempts),
        });
        assert_eq!(attempts.get(), 4);
        assert!(activator.is_active::<Flaky>());
        assert_eq!(activator.live_event_count::<Flaky>(), 0);
        assert!(logs_contain("retry limit reached"));
    }

    /// Fails its own source from inside `on_next` when it sees `poison`.
    struct SelfFailing {
        source: Subject<u32>,
        poison: u32,
        errors: Rc<Cell<u32>>,
        restarts: Rc<RefCell<Vec<usize>>>,
    }

    impl Action<()> for SelfFailing {
        fn invoke(&self, _director: &Director<()>) -> Vec<ActionEvent> {
            let (source, poison) = (self.source.clone(), self.poison);
            vec![
                self.source
                    .clone()
                    .inspect(move |v: &u32| {
                        if *v == poison {
                            source.fail(StreamError::new("poisoned"));
                        }
                    })
                    .labeled("self-failing"),
            ]
        }

        fn on_error(&self, _error: &ActionError) -> RecoverPattern {
            self.errors.set(self.errors.get() + 1);
            let (source, restarts) = (self.source.clone(), Rc::clone(&self.restarts));
            RecoverPattern::reload_then(move || {
                restarts.borrow_mut().push(source.subscriber_count());
            })
        }
    }

    fn self_failing(source: &Subject<u32>) -> (SelfFailing, Rc<Cell<u32>>, Rc<RefCell<Vec<usize>>>) {
        let errors = Rc::new(Cell::new(0));
        let restarts = Rc::new(RefCell::new(Vec::new()));
        let action = SelfFailing {
            source: source.clone(),
            poison: 1,
            errors: Rc::clone(&errors),
            restarts: Rc::clone(&restarts),
        };
        (action, errors, restarts)
    }

    #[test]
    fn failure_raised_inside_delivery_is_recovered() {
        let source = Subject::new();
        let (action, errors, _) = self_failing(&source);
        let activator = activator();
        activator.activate(action);

        source.emit(1);
        assert_eq!(errors.get(), 1);
        assert_eq!(source.subscriber_count(), 1);
        assert_eq!(activator.live_event_count::<SelfFailing>(), 1);

        source.emit(2);
        assert_eq!(errors.get(), 1);
    }

    #[test]
    fn reload_then_runs_once_after_resubscribing() {
        let source = Subject::new();
        let (action, _, restarts) = self_failing(&source);
        let activator = activator();
        activator.activate(action);
        assert!(restarts.borrow().is_empty());

        source.fail(StreamError::new("lost"));
        assert_eq!(*restarts.borrow(), vec![1]);

        source.emit(1);
        assert_eq!(*restarts.borrow(), vec![1, 1]);
    }

    #[test]
    fn deactivate_disposes_then_stops() {
        let (action, ticks, tally) = ticker(false);
        let activator = activator();
        activator.activate(action);
        assert!(activator.deactivate::<Ticker>());
        assert!(!activator.deactivate::<Ticker>());
        assert_eq!(ticks.subscriber_count(), 0);
        assert_eq!(tally.stops.get(), 1);
        assert!(activator.resolve::<Ticker>().is_some());
    }

    #[test]
    fn failure_after_deactivate_is_ignored() {
        let (action, ticks, tally) = ticker(true);
        let activator = activator();
        activator.activate(action);
        let stale = ticks.clone();
        activator.deactivate::<Ticker>();
        stale.fail(StreamError::new("late"));
        assert!(tally.errors.borrow().is_empty());
        assert_eq!(ticks.subscriber_count(), 0);
    }

    #[test]
    fn on_error_may_deactivate_its_own_action() {
        struct SelfStopping {
            source: Subject<()>,
            activator: Rc<RefCell<Option<Weak<ActivatorInner<()>>>>>,
        }

        impl Action<()> for SelfStopping {
            fn invoke(&self, _director: &Director<()>) -> Vec<ActionEvent> {
                vec![self.source.clone().to_event()]
            }

            fn on_error(&self, _error: &ActionError) -> RecoverPattern {
                if let Some(inner) = self.activator.borrow().as_ref().and_then(Weak::upgrade) {
                    inner.deactivate(TypeId::of::<Self>());
                }
                RecoverPattern::reload()
            }
        }

        let source = Subject::new();
        let slot = Rc::new(RefCell::new(None));
        let activator = activator();
        *slot.borrow_mut() = Some(Rc::downgrade(&activator.inner));
        activator.activate(SelfStopping {
            source: source.clone(),
            activator: Rc::clone(&slot),
        });
        source.fail(StreamError::new("stop"));
        assert!(!activator.is_active::<SelfStopping>());
        assert_eq!(source.subscriber_count(), 0);
    }

    #[traced_test]
    #[test]
    fn close_refuses_further_activation() {
        let (action, ticks, tally) = ticker(false);
        let activator = activator();
        activator.activate(action);
        activator.close();
        assert!(activator.is_closed());
        assert_eq!(ticks.subscriber_count(), 0);
        assert_eq!(tally.stops.get(), 1);
        assert!(activator.resolve::<Ticker>().is_none());

        let (again, _, _) = ticker(false);
        assert!(!activator.activate(again));
        assert!(logs_contain("activate after close ignored"));
    }

    #[test]
    fn drop_closes() {
        let (action, ticks, tally) = ticker(false);
        {
            let activator = activator();
            activator.activate(action);
            activator.activate_with(
                Flaky {
                    failures: 0,
                    attempts: Rc::new(Cell::new(0)),
                },
                || {},
            );
            assert_eq!(activator.active_count(), 2);
        }
        assert_eq!(ticks.subscriber_count(), 0);
        assert_eq!(tally.stops.get(), 1);
    }

    #[test]
    fn debug_lists_active_actions() {
        let activator = activator();
        activator.activate(Flaky {
            failures: 0,
            attempts: Rc::new(Cell::new(0)),
        });
        let rendered = format!("{activator:?}");
        assert!(rendered.contains("Flaky"));
    }
}
