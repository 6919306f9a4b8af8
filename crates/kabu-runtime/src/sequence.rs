#![forbid(unsafe_code)]

//! Ordered stack of scenes for one navigation flow.
//!
//! # Design
//!
//! [`SceneSequence`] owns its entries; each entry pairs a scene with the
//! stage it was attached to. Scenes see the sequence only through a
//! [`Director`], which holds a `Weak` reference.
//!
//! Every callback (setup, `will_remove`, request resolution) runs with the
//! stack borrow released, so a callback may push, release, or exit.
//!
//! # Invariants
//!
//! 1. The stack is never empty before [`exit`](SceneSequence::exit).
//! 2. A scene occupies at most one entry.
//! 3. Release only ever removes the top entry, and never the root.
//! 4. A pushed transition's setup runs exactly once, before `push` returns.
//! 5. Once exited, a sequence accepts no further pushes.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::config::SequenceConfig;
use crate::director::Director;
use crate::error::{Result, SequenceError};
use crate::scene::{Scene, SceneHandle, Shared, Stage};
use crate::transition::{ResolvedTransition, SceneRequest, SceneTransition, TransitionContext};

/// Lifecycle of a [`SceneSequence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Phase {
    /// Built, root entry present, setup not yet run.
    Idle,
    Running,
    Exited,
}

struct Entry<S: Stage> {
    stage: S,
    scene: SceneHandle<S>,
}

type ExitHook = Box<dyn FnOnce()>;

pub(crate) struct SequenceInner<S: Stage> {
    config: Cell<SequenceConfig>,
    phase: Cell<Phase>,
    stack: RefCell<Vec<Entry<S>>>,
    /// Root attachment deferred until `start`.
    root: RefCell<Option<ResolvedTransition<S>>>,
    exit_hook: RefCell<Option<ExitHook>>,
}

impl<S: Stage> SequenceInner<S> {
    fn director(self: &Rc<Self>) -> Director<S> {
        Director::new(Rc::downgrade(self))
    }

    pub(crate) fn phase(&self) -> Phase {
        self.phase.get()
    }

    pub(crate) fn depth(&self) -> usize {
        self.stack.borrow().len()
    }

    fn ensure_running(&self) -> Result<()> {
        match self.phase.get() {
            Phase::Idle => Err(SequenceError::NotStarted),
            Phase::Running => Ok(()),
            Phase::Exited => Err(SequenceError::Exited),
        }
    }

    fn start(self: &Rc<Self>) -> bool {
        if self.phase.get() != Phase::Idle {
            warn!(phase = ?self.phase.get(), "scene sequence already started");
            return false;
        }
        self.phase.set(Phase::Running);

        let root = self.root.borrow_mut().take();
        let stage = self.stack.borrow().first().map(|entry| entry.stage.clone());
        if let (Some(root), Some(stage)) = (root, stage) {
            root.scene.attach(self.director(), root.argument);
            debug!(scene = root.scene.type_name(), "scene sequence started");
            (root.setup)(&stage, &root.scene);
        }
        true
    }

    pub(crate) fn push(self: &Rc<Self>, transition: SceneTransition<S>) -> Result<()> {
        self.ensure_running()?;
        if let Some(limit) = self.config.get().max_depth
            && self.depth() >= limit
        {
            warn!(scene = transition.scene_type(), limit, "scene stack depth limit reached");
            return Err(SequenceError::DepthExceeded { limit });
        }

        let ResolvedTransition {
            stage,
            argument,
            scene,
            setup,
        } = transition.resolve();

        let (stage, depth) = {
            let mut stack = self.stack.borrow_mut();
            if stack.iter().any(|entry| entry.scene.same(&scene)) {
                return Err(SequenceError::AlreadyPresent {
                    scene: scene.type_name(),
                });
            }
            let Some(stage) = stage.or_else(|| stack.last().map(|entry| entry.stage.clone()))
            else {
                return Err(SequenceError::Exited);
            };
            stack.push(Entry {
                stage: stage.clone(),
                scene: scene.clone(),
            });
            (stage, stack.len())
        };

        if !scene.attach(self.director(), argument) {
            debug!(scene = scene.type_name(), "scene was attached before; keeping its first director");
        }
        debug!(scene = scene.type_name(), depth, "scene pushed");
        setup(&stage, &scene);
        Ok(())
    }

    pub(crate) fn forward(self: &Rc<Self>, request: SceneRequest<S>) -> Result<bool> {
        self.ensure_running()?;
        let Some((stage, depth)) = ({
            let stack = self.stack.borrow();
            stack.last().map(|entry| (entry.stage.clone(), stack.len()))
        }) else {
            return Err(SequenceError::Exited);
        };

        let director = self.director();
        let context = TransitionContext::new(&stage, depth, &director);
        match request.resolve(&context) {
            Some(transition) => self.push(transition).map(|()| true),
            None => {
                debug!(depth, "scene request declined");
                Ok(false)
            }
        }
    }

    pub(crate) fn release<T: Scene<S>>(&self, scene: &Shared<T>) -> bool {
        self.release_top(|top| top.is(scene))
    }

    pub(crate) fn release_current(&self) -> bool {
        self.release_top(|_| true)
    }

    fn release_top(&self, matches: impl FnOnce(&SceneHandle<S>) -> bool) -> bool {
        if self.phase.get() != Phase::Running {
            return false;
        }
        let (stage, handle) = {
            let stack = self.stack.borrow();
            if stack.len() <= 1 {
                return false;
            }
            let Some(top) = stack.last() else {
                return false;
            };
            if !matches(&top.scene) {
                return false;
            }
            (top.stage.clone(), top.scene.clone())
        };

        match handle.is_removable() {
            Some(true) => {}
            Some(false) => {
                debug!(scene = handle.type_name(), "scene is not removable");
                return false;
            }
            None => {
                warn!(scene = handle.type_name(), "scene busy; release refused");
                return false;
            }
        }
        if !handle.will_remove(&stage) {
            warn!(scene = handle.type_name(), "scene busy; release refused");
            return false;
        }

        // `will_remove` may have pushed on top of the scene being released.
        let removed = {
            let mut stack = self.stack.borrow_mut();
            stack
                .iter()
                .rposition(|entry| entry.scene.same(&handle))
                .filter(|&index| index > 0)
                .map(|index| (stack.remove(index), stack.len()))
        };
        let Some((entry, depth)) = removed else {
            return false;
        };
        debug!(scene = handle.type_name(), depth, "scene released");
        drop(entry);
        true
    }

    pub(crate) fn current_scene<T: 'static>(&self) -> Option<Shared<T>> {
        self.stack.borrow().last()?.scene.downcast::<T>()
    }

    pub(crate) fn exit(&self) -> bool {
        if self.phase.replace(Phase::Exited) == Phase::Exited {
            return false;
        }
        let mut entries = std::mem::take(&mut *self.stack.borrow_mut());
        let root = self.root.borrow_mut().take();
        drop(root);
        debug!(depth = entries.len(), "scene sequence exiting");
        // Top-down, one at a time: a scene's teardown may consult the
        // director, which now reports an empty stack.
        while let Some(entry) = entries.pop() {
            drop(entry);
        }
        let hook = self.exit_hook.borrow_mut().take();
        if let Some(hook) = hook {
            hook();
        }
        true
    }
}

/// An ordered stack of scenes.
///
/// ```
/// use kabu_runtime::{Attachment, Routes, Scene, SceneSequence, Unreachable, shared};
///
/// #[derive(Default)]
/// struct Home {
///     attachment: Attachment<&'static str>,
/// }
///
/// impl Scene<&'static str> for Home {
///     type Router = Routes<Unreachable>;
///     type Argument = ();
///
///     fn router(&self) -> Self::Router {
///         Routes::new()
///     }
///
///     fn attachment(&self) -> &Attachment<&'static str> {
///         &self.attachment
///     }
/// }
///
/// let home = shared(Home::default());
/// let sequence = SceneSequence::new("window", home.clone(), None, |_, _| {});
/// assert!(sequence.start());
/// assert!(home.borrow().director().is_some());
/// assert_eq!(sequence.depth(), 1);
/// ```
pub struct SceneSequence<S: Stage> {
    inner: Rc<SequenceInner<S>>,
}

impl<S: Stage> SceneSequence<S> {
    /// A sequence rooted at `scene`, hosted on `stage`. `setup` runs on
    /// [`start`](Self::start).
    pub fn new<T: Scene<S>>(
        stage: S,
        scene: Shared<T>,
        argument: Option<T::Argument>,
        setup: impl FnOnce(&S, &mut T) + 'static,
    ) -> Self {
        let root = SceneTransition::new(scene, argument, setup).resolve();
        let entry = Entry {
            stage,
            scene: root.scene.clone(),
        };
        Self {
            inner: Rc::new(SequenceInner {
                config: Cell::new(SequenceConfig::default()),
                phase: Cell::new(Phase::Idle),
                stack: RefCell::new(vec![entry]),
                root: RefCell::new(Some(root)),
                exit_hook: RefCell::new(None),
            }),
        }
    }

    #[must_use]
    pub fn with_config(self, config: SequenceConfig) -> Self {
        self.inner.config.set(config);
        self
    }

    /// Attach the root scene and run its setup. False if not idle.
    pub fn start(&self) -> bool {
        self.inner.start()
    }

    pub fn push(&self, transition: SceneTransition<S>) -> Result<()> {
        self.inner.push(transition)
    }

    /// Release `scene` if it is the removable top of a multi-entry stack.
    ///
    /// Calls `will_remove` with the entry's stage, then pops the entry.
    pub fn release<T: Scene<S>>(&self, scene: &Shared<T>) -> bool {
        self.inner.release(scene)
    }

    pub fn release_current(&self) -> bool {
        self.inner.release_current()
    }

    /// The top scene as `T`; `None` if the top is another type.
    #[must_use]
    pub fn current_scene<T: 'static>(&self) -> Option<Shared<T>> {
        self.inner.current_scene()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.inner.depth()
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.inner.phase()
    }

    /// Type names of the entries, root first.
    #[must_use]
    pub fn scene_types(&self) -> Vec<&'static str> {
        self.inner
            .stack
            .borrow()
            .iter()
            .map(|entry| entry.scene.type_name())
            .collect()
    }

    #[must_use]
    pub fn director(&self) -> Director<S> {
        self.inner.director()
    }

    /// Unwind every entry and mark the sequence exited. Only the first
    /// call returns true.
    pub fn exit(&self) -> bool {
        self.inner.exit()
    }

    /// Another handle to the same sequence.
    pub(crate) fn share(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }

    /// Runs once, after the sequence has exited.
    pub(crate) fn set_exit_hook(&self, hook: impl FnOnce() + 'static) {
        *self.inner.exit_hook.borrow_mut() = Some(Box::new(hook));
    }
}

impl<S: Stage> fmt::Debug for SceneSequence<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneSequence")
            .field("phase", &self.phase())
            .field("scenes", &self.scene_types())
            .finish()
    }
}
