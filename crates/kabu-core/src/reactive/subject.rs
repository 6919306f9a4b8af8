#![forbid(unsafe_code)]

//! Hot, multicast source driven by its owner.
//!
//! # Design
//!
//! [`Subject<T>`] keeps its subscribers in shared `Rc<RefCell<..>>` storage.
//! Each subscriber lives in a slot with an `alive` flag; disposing the
//! subscription clears the flag and removes the slot. Notification walks a
//! snapshot of the slots so that callbacks may subscribe or dispose freely.
//!
//! # Invariants
//!
//! 1. Subscribers are notified in registration order.
//! 2. A slot whose subscription was disposed is never notified again, even
//!    within the notification cycle in progress.
//! 3. `fail()` and `complete()` terminate the subscribers registered at that
//!    moment. The subject itself stays open: later subscribers observe later
//!    values, which is what lets a failed subscription be restarted.
//! 4. `emitted()` increments exactly once per `emit()`.
//! 5. A subscriber that fails or completes the subject from inside its own
//!    `on_next` still receives that terminal signal, right after `on_next`
//!    returns.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::source::{Observer, Source, Terminal};
use crate::disposable::Disposable;
use crate::error::StreamError;

struct Slot<T> {
    id: u64,
    alive: Cell<bool>,
    observer: RefCell<Observer<T>>,
    /// Terminal raised while this slot's observer was mid-delivery.
    deferred: Cell<Option<Terminal>>,
}

struct SubjectInner<T> {
    slots: Vec<Rc<Slot<T>>>,
    next_id: u64,
    emitted: u64,
}

/// Multicast source whose values are pushed by its owner.
///
/// Cloning a `Subject` creates a new handle to the **same** subscriber list.
pub struct Subject<T> {
    inner: Rc<RefCell<SubjectInner<T>>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Subject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Subject")
            .field("subscribers", &inner.slots.len())
            .field("emitted", &inner.emitted)
            .finish()
    }
}

impl<T: 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Subject<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(SubjectInner {
                slots: Vec::new(),
                next_id: 0,
                emitted: 0,
            })),
        }
    }

    /// Push a value to every live subscriber.
    pub fn emit(&self, value: T) {
        let slots = {
            let mut inner = self.inner.borrow_mut();
            inner.emitted += 1;
            inner.slots.clone()
        };
        for slot in slots {
            if !slot.alive.get() {
                continue;
            }
            // A value emitted from inside the same subscriber's delivery is dropped.
            let Ok(mut observer) = slot.observer.try_borrow_mut() else {
                continue;
            };
            observer.next(&value);
            if let Some(terminal) = slot.deferred.take() {
                terminal.deliver(&mut observer);
            }
        }
    }

    /// Fail every current subscriber.
    pub fn fail(&self, error: StreamError) {
        self.terminate(|| Terminal::Error(error.clone()));
    }

    /// Complete every current subscriber.
    pub fn complete(&self) {
        self.terminate(|| Terminal::Complete);
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().slots.len()
    }

    /// Number of values emitted so far.
    #[must_use]
    pub fn emitted(&self) -> u64 {
        self.inner.borrow().emitted
    }

    fn terminate(&self, terminal: impl Fn() -> Terminal) {
        for slot in self.take_live() {
            match slot.observer.try_borrow_mut() {
                Ok(mut observer) => terminal().deliver(&mut observer),
                // Mid-delivery: `emit` hands it over once `on_next` returns.
                Err(_) => slot.deferred.set(Some(terminal())),
            }
        }
    }

    fn take_live(&self) -> Vec<Rc<Slot<T>>> {
        let slots = std::mem::take(&mut self.inner.borrow_mut().slots);
        slots
            .into_iter()
            .filter(|slot| slot.alive.replace(false))
            .collect()
    }
}

impl<T: 'static> Source<T> for Subject<T> {
    fn subscribe(&self, observer: Observer<T>) -> Disposable {
        let slot = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id;
            inner.next_id += 1;
            let slot = Rc::new(Slot {
                id,
                alive: Cell::new(true),
                observer: RefCell::new(observer),
                deferred: Cell::new(None),
            });
            inner.slots.push(Rc::clone(&slot));
            slot
        };

        let weak = Rc::downgrade(&self.inner);
        Disposable::new(move || {
            if !slot.alive.replace(false) {
                return;
            }
            if let Some(inner) = weak.upgrade() {
                inner.borrow_mut().slots.retain(|s| s.id != slot.id);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording(subject: &Subject<i32>) -> (Disposable, Rc<RefCell<Vec<i32>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let sub = subject.subscribe(Observer::new(move |v: &i32| sink.borrow_mut().push(*v)));
        (sub, seen)
    }

    #[test]
    fn emit_reaches_all_subscribers_in_order() {
        let subject = Subject::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        let (a, b) = (Rc::clone(&order), Rc::clone(&order));
        let _s1 = subject.subscribe(Observer::new(move |_: &i32| a.borrow_mut().push("first")));
        let _s2 = subject.subscribe(Observer::new(move |_: &i32| b.borrow_mut().push("second")));
        subject.emit(1);
        assert_eq!(*order.borrow(), vec!["first", "second"]);
        assert_eq!(subject.emitted(), 1);
    }

    #[test]
    fn disposed_subscriber_stops_receiving() {
        let subject = Subject::new();
        let (sub, seen) = recording(&subject);
        subject.emit(1);
        sub.dispose();
        subject.emit(2);
        assert_eq!(*seen.borrow(), vec![1]);
        assert_eq!(subject.subscriber_count(), 0);
    }

    #[test]
    fn fail_terminates_current_subscribers_only() {
        let subject = Subject::new();
        let errors = Rc::new(Cell::new(0));
        let e = Rc::clone(&errors);
        let _sub = subject.subscribe(Observer::ignoring().on_error(move |_| e.set(e.get() + 1)));
        subject.fail(StreamError::new("lost"));
        assert_eq!(errors.get(), 1);
        assert_eq!(subject.subscriber_count(), 0);

        // The subject stays open for a restarted subscription.
        let (_again, seen) = recording(&subject);
        subject.emit(5);
        assert_eq!(*seen.borrow(), vec![5]);
    }

    #[test]
    fn dispose_during_emit_skips_later_slot() {
        let subject = Subject::new();
        let victim: Rc<RefCell<Option<Disposable>>> = Rc::new(RefCell::new(None));
        let v = Rc::clone(&victim);
        let _killer = subject.subscribe(Observer::new(move |_: &i32| {
            if let Some(sub) = v.borrow_mut().take() {
                sub.dispose();
            }
        }));
        let (sub, seen) = recording(&subject);
        *victim.borrow_mut() = Some(sub);
        subject.emit(1);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn complete_reaches_subscribers() {
        let subject = Subject::<i32>::new();
        let done = Rc::new(Cell::new(false));
        let d = Rc::clone(&done);
        let _sub = subject.subscribe(Observer::ignoring().on_complete(move || d.set(true)));
        subject.complete();
        assert!(done.get());
    }

    #[test]
    fn fail_from_own_on_next_is_delivered_after_it_returns() {
        let subject = Subject::<i32>::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let (on_next, on_error) = (Rc::clone(&log), Rc::clone(&log));
        let handle = subject.clone();
        let _sub = subject.subscribe(
            Observer::new(move |v: &i32| {
                if *v == 1 {
                    handle.fail(StreamError::new("bad value"));
                }
                on_next.borrow_mut().push(format!("next {v}"));
            })
            .on_error(move |err| on_error.borrow_mut().push(format!("error {}", err.message()))),
        );
        subject.emit(1);
        assert_eq!(*log.borrow(), vec!["next 1", "error bad value"]);
        assert_eq!(subject.subscriber_count(), 0);

        subject.emit(2);
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn complete_from_own_on_next_is_delivered_once() {
        let subject = Subject::<i32>::new();
        let completions = Rc::new(Cell::new(0));
        let c = Rc::clone(&completions);
        let handle = subject.clone();
        let _sub = subject.subscribe(
            Observer::new(move |_: &i32| {
                handle.complete();
                handle.complete();
            })
            .on_complete(move || c.set(c.get() + 1)),
        );
        subject.emit(1);
        assert_eq!(completions.get(), 1);
    }

    #[test]
    fn dispose_after_fail_is_harmless() {
        let subject = Subject::<i32>::new();
        let (sub, _) = recording(&subject);
        let (_other, seen) = recording(&subject);
        subject.fail(StreamError::new("x"));
        let (_fresh, fresh_seen) = recording(&subject);
        sub.dispose();
        subject.emit(3);
        assert!(seen.borrow().is_empty());
        assert_eq!(*fresh_seen.borrow(), vec![3]);
    }
}
