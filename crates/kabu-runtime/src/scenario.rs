#![forbid(unsafe_code)]

//! Multi-act flows.
//!
//! A [`Scenario`] is an ordered list of *acts*, each a factory for a
//! [`SceneSequence`]. Acts run one at a time: when the running act's
//! sequence exits, the next act is built and started. After the last act
//! the scenario is finished and its `on_finish` hook fires once.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::director::Director;
use crate::scene::Stage;
use crate::sequence::SceneSequence;

type Act<S> = Box<dyn FnOnce() -> SceneSequence<S>>;

struct ScenarioInner<S: Stage> {
    acts: RefCell<VecDeque<Act<S>>>,
    current: RefCell<Option<SceneSequence<S>>>,
    completed: Cell<usize>,
    started: Cell<bool>,
    aborting: Cell<bool>,
    finished: Cell<bool>,
    on_finish: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl<S: Stage> ScenarioInner<S> {
    fn advance(self: &Rc<Self>) {
        let next = self.acts.borrow_mut().pop_front();
        let Some(act) = next else {
            self.finish();
            return;
        };

        let sequence = act();
        let weak = Rc::downgrade(self);
        sequence.set_exit_hook(move || {
            if let Some(inner) = weak.upgrade() {
                inner.act_exited();
            }
        });
        let handle = sequence.share();
        let previous = self.current.borrow_mut().replace(sequence);
        drop(previous);

        debug!(act = self.completed.get(), "scenario act starting");
        // Setup may exit the act at once; that re-enters `advance`.
        handle.start();
    }

    fn act_exited(self: &Rc<Self>) {
        if self.finished.get() {
            return;
        }
        if !self.aborting.get() {
            self.completed.set(self.completed.get() + 1);
        }
        self.advance();
    }

    fn finish(&self) {
        if self.finished.replace(true) {
            return;
        }
        debug!(completed = self.completed.get(), "scenario finished");
        let hook = self.on_finish.borrow_mut().take();
        if let Some(hook) = hook {
            hook();
        }
    }

    fn current(&self) -> Option<SceneSequence<S>> {
        self.current.borrow().as_ref().map(SceneSequence::share)
    }
}

/// An ordered series of scene sequences run back to back.
pub struct Scenario<S: Stage> {
    inner: Rc<ScenarioInner<S>>,
}

impl<S: Stage> Scenario<S> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ScenarioInner {
                acts: RefCell::new(VecDeque::new()),
                current: RefCell::new(None),
                completed: Cell::new(0),
                started: Cell::new(false),
                aborting: Cell::new(false),
                finished: Cell::new(false),
                on_finish: RefCell::new(None),
            }),
        }
    }

    /// Append an act. The factory runs when the act's turn comes.
    #[must_use]
    pub fn then(self, act: impl FnOnce() -> SceneSequence<S> + 'static) -> Self {
        self.inner.acts.borrow_mut().push_back(Box::new(act));
        self
    }

    #[must_use]
    pub fn on_finish(self, hook: impl FnOnce() + 'static) -> Self {
        *self.inner.on_finish.borrow_mut() = Some(Box::new(hook));
        self
    }

    pub(crate) fn start(&self) -> bool {
        if self.inner.started.replace(true) {
            return false;
        }
        self.inner.advance();
        true
    }

    /// Director of the running act.
    #[must_use]
    pub fn current_director(&self) -> Option<Director<S>> {
        if self.inner.finished.get() {
            return None;
        }
        self.inner.current().map(|sequence| sequence.director())
    }

    /// Acts whose sequence has exited on its own.
    #[must_use]
    pub fn completed_acts(&self) -> usize {
        self.inner.completed.get()
    }

    #[must_use]
    pub fn remaining_acts(&self) -> usize {
        self.inner.acts.borrow().len()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.inner.finished.get()
    }

    /// Exit the running act and drop the rest. The scenario finishes.
    pub fn exit(&self) -> bool {
        if self.inner.finished.get() {
            return false;
        }
        self.inner.aborting.set(true);
        self.inner.acts.borrow_mut().clear();
        match self.inner.current() {
            Some(sequence) if sequence.exit() => {}
            _ => self.inner.finish(),
        }
        true
    }
}

impl<S: Stage> Default for Scenario<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Stage> fmt::Debug for Scenario<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario")
            .field("completed", &self.completed_acts())
            .field("remaining", &self.remaining_acts())
            .field("finished", &self.is_finished())
            .finish()
    }
}
