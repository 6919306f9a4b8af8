#![forbid(unsafe_code)]

//! Transitions and the requests that produce them.
//!
//! # State Machine
//!
//! ```text
//! SceneRequest ──resolve(ctx)──▶ Option<SceneTransition> ──push──▶ consumed
//! ```
//!
//! A [`SceneRequest`] is a deferred closure over the navigation context. It
//! may decline by resolving to `None` (a guard condition, for instance).
//! A [`SceneTransition`] is consumed by value when pushed, so its setup
//! callback runs at most once by construction.

use std::any::{Any, type_name};
use std::fmt;

use tracing::warn;

use crate::director::Director;
use crate::scene::{Scene, SceneHandle, Shared, Stage};

type SceneProvider<S> = Box<dyn FnOnce() -> SceneHandle<S>>;
type SceneSetup<S> = Box<dyn FnOnce(&S, &SceneHandle<S>)>;
type RequestFn<S> = Box<dyn FnOnce(&TransitionContext<'_, S>) -> Option<SceneTransition<S>>>;

/// "Attach scene X, then run setup Y against the hosting stage."
pub struct SceneTransition<S: Stage> {
    scene_type: &'static str,
    stage: Option<S>,
    argument: Option<Box<dyn Any>>,
    provider: SceneProvider<S>,
    setup: SceneSetup<S>,
}

impl<S: Stage> SceneTransition<S> {
    /// Transition to an existing scene.
    pub fn new<T: Scene<S>>(
        scene: Shared<T>,
        argument: Option<T::Argument>,
        setup: impl FnOnce(&S, &mut T) + 'static,
    ) -> Self {
        Self::lazy(move || scene, argument, setup)
    }

    /// Transition to a scene built on push, not before.
    pub fn lazy<T: Scene<S>>(
        provider: impl FnOnce() -> Shared<T> + 'static,
        argument: Option<T::Argument>,
        setup: impl FnOnce(&S, &mut T) + 'static,
    ) -> Self {
        Self {
            scene_type: type_name::<T>(),
            stage: None,
            argument: argument.map(|argument| Box::new(argument) as Box<dyn Any>),
            provider: Box::new(move || SceneHandle::new(provider())),
            setup: erase_setup(setup),
        }
    }

    /// Attach the scene to `stage` instead of the current top entry's stage.
    #[must_use]
    pub fn on_stage(mut self, stage: S) -> Self {
        self.stage = Some(stage);
        self
    }

    /// Type name of the target scene.
    #[must_use]
    pub fn scene_type(&self) -> &'static str {
        self.scene_type
    }

    #[must_use]
    pub fn target_stage(&self) -> Option<&S> {
        self.stage.as_ref()
    }

    /// Build the scene. The setup callback is handed back unfired.
    pub(crate) fn resolve(self) -> ResolvedTransition<S> {
        ResolvedTransition {
            stage: self.stage,
            argument: self.argument,
            scene: (self.provider)(),
            setup: self.setup,
        }
    }
}

impl<S: Stage> fmt::Debug for SceneTransition<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneTransition")
            .field("scene_type", &self.scene_type)
            .field("has_stage", &self.stage.is_some())
            .field("has_argument", &self.argument.is_some())
            .finish_non_exhaustive()
    }
}

pub(crate) struct ResolvedTransition<S: Stage> {
    pub(crate) stage: Option<S>,
    pub(crate) argument: Option<Box<dyn Any>>,
    pub(crate) scene: SceneHandle<S>,
    pub(crate) setup: SceneSetup<S>,
}

fn erase_setup<S: Stage, T: Scene<S>>(setup: impl FnOnce(&S, &mut T) + 'static) -> SceneSetup<S> {
    Box::new(move |stage, handle| {
        let Some(scene) = handle.downcast::<T>() else {
            return;
        };
        match scene.try_borrow_mut() {
            Ok(mut scene) => setup(stage, &mut scene),
            Err(_) => warn!(scene = handle.type_name(), "scene busy during setup; skipped"),
        }
    })
}

/// A deferred, context-resolved transition.
pub struct SceneRequest<S: Stage> {
    request: RequestFn<S>,
}

impl<S: Stage> SceneRequest<S> {
    pub fn new(
        request: impl FnOnce(&TransitionContext<'_, S>) -> Option<SceneTransition<S>> + 'static,
    ) -> Self {
        Self {
            request: Box::new(request),
        }
    }

    /// A request that never transitions.
    #[must_use]
    pub fn none() -> Self {
        Self::new(|_| None)
    }

    pub fn resolve(self, context: &TransitionContext<'_, S>) -> Option<SceneTransition<S>> {
        (self.request)(context)
    }
}

impl<S: Stage> From<SceneTransition<S>> for SceneRequest<S> {
    fn from(transition: SceneTransition<S>) -> Self {
        Self::new(move |_| Some(transition))
    }
}

impl<S: Stage> fmt::Debug for SceneRequest<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneRequest").finish_non_exhaustive()
    }
}

/// What a request sees when it is resolved.
pub struct TransitionContext<'a, S: Stage> {
    stage: &'a S,
    depth: usize,
    director: &'a Director<S>,
}

impl<'a, S: Stage> TransitionContext<'a, S> {
    pub fn new(stage: &'a S, depth: usize, director: &'a Director<S>) -> Self {
        Self {
            stage,
            depth,
            director,
        }
    }

    /// Stage of the current top entry.
    #[must_use]
    pub fn stage(&self) -> &'a S {
        self.stage
    }

    /// Number of entries on the stack.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[must_use]
    pub fn director(&self) -> &'a Director<S> {
        self.director
    }

    /// Shorthand for `Some(SceneTransition::new(..))`.
    pub fn specify<T: Scene<S>>(
        &self,
        scene: Shared<T>,
        argument: Option<T::Argument>,
        setup: impl FnOnce(&S, &mut T) + 'static,
    ) -> Option<SceneTransition<S>> {
        Some(SceneTransition::new(scene, argument, setup))
    }
}

impl<S: Stage + fmt::Debug> fmt::Debug for TransitionContext<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionContext")
            .field("stage", self.stage)
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}
