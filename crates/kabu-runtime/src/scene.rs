#![forbid(unsafe_code)]

//! Scenes, routers, and destinations.
//!
//! A [`Scene`] is a navigable unit hosted on a stage (`S`, the UI
//! container type supplied by the embedding toolkit). Every scene carries an
//! [`Attachment`] that the owning sequence fills in exactly once, when the
//! scene is attached: a non-owning [`Director`] handle and the optional
//! argument the transition carried.
//!
//! A scene's [`Router`] turns [`Destination`] values into
//! [`SceneRequest`]s, which the director resolves and pushes.
//!
//! ```
//! use kabu_runtime::{Attachment, Routes, Scene, Unreachable};
//!
//! #[derive(Default)]
//! struct About {
//!     attachment: Attachment<String>,
//! }
//!
//! impl Scene<String> for About {
//!     type Router = Routes<Unreachable>;
//!     type Argument = ();
//!
//!     fn router(&self) -> Self::Router {
//!         Routes::new()
//!     }
//!
//!     fn attachment(&self) -> &Attachment<String> {
//!         &self.attachment
//!     }
//! }
//!
//! let about = About::default();
//! assert!(about.director().is_none());
//! ```

use std::any::{Any, type_name};
use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::director::Director;
use crate::error::{Result, SequenceError};
use crate::transition::{SceneRequest, SceneTransition, TransitionContext};

/// Host container a scene is attached to.
pub trait Stage: Clone + 'static {}

impl<T: Clone + 'static> Stage for T {}

/// Shared, interior-mutable scene storage.
pub type Shared<T> = Rc<RefCell<T>>;

/// Wrap a value as [`Shared`].
pub fn shared<T>(value: T) -> Shared<T> {
    Rc::new(RefCell::new(value))
}

/// Per-scene slot for the director handle and transition argument.
///
/// Both are set at most once, by the sequence that attaches the scene.
pub struct Attachment<S: Stage, A = ()> {
    director: OnceCell<Director<S>>,
    argument: OnceCell<A>,
}

impl<S: Stage, A> Attachment<S, A> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            director: OnceCell::new(),
            argument: OnceCell::new(),
        }
    }

    /// The director of the sequence this scene was attached to.
    #[must_use]
    pub fn director(&self) -> Option<&Director<S>> {
        self.director.get()
    }

    #[must_use]
    pub fn argument(&self) -> Option<&A> {
        self.argument.get()
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.director.get().is_some()
    }

    /// Returns false, leaving both slots untouched, if already attached.
    pub(crate) fn attach(&self, director: Director<S>, argument: Option<A>) -> bool {
        if self.director.set(director).is_err() {
            return false;
        }
        if let Some(argument) = argument {
            let _ = self.argument.set(argument);
        }
        true
    }
}

impl<S: Stage, A> Default for Attachment<S, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Stage, A: fmt::Debug> fmt::Debug for Attachment<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("attached", &self.is_attached())
            .field("argument", &self.argument.get())
            .finish()
    }
}

/// A navigable unit whose lifetime is governed by a
/// [`SceneSequence`](crate::SceneSequence).
pub trait Scene<S: Stage>: Sized + 'static {
    /// Router producing this scene's outgoing transitions.
    type Router: Router<S>;
    /// Argument a transition may hand to the scene on attach.
    type Argument: 'static;

    fn router(&self) -> Self::Router;

    fn attachment(&self) -> &Attachment<S, Self::Argument>;

    /// Whether the sequence may release this scene. Default: true.
    fn is_removable(&self) -> bool {
        true
    }

    /// Called on release, before the scene leaves the stack, with the stage
    /// it was attached to.
    fn will_remove(&mut self, stage: &S) {
        let _ = stage;
    }

    /// The director of the sequence this scene is attached to.
    ///
    /// Releasing a scene needs to borrow it mutably (for `will_remove`), so
    /// clone the director out and drop the borrow first:
    ///
    /// ```ignore
    /// let director = scene.borrow().director().cloned();
    /// if let Some(director) = director {
    ///     director.release(&scene);
    /// }
    /// ```
    ///
    /// `scene.borrow().director().map(|d| d.release(&scene))` still holds
    /// the borrow during the call and the release is refused.
    fn director(&self) -> Option<&Director<S>> {
        self.attachment().director()
    }

    fn argument(&self) -> Option<&Self::Argument> {
        self.attachment().argument()
    }

    /// Route `destination` through this scene's router and forward the
    /// resulting request to the director.
    ///
    /// Returns `Ok(false)` when the request declined to transition.
    fn navigate(&self, destination: <Self::Router as Router<S>>::Destination) -> Result<bool> {
        let director = self.director().ok_or(SequenceError::Detached)?.clone();
        director.forward(self.router().route(destination))
    }
}

/// Produces transition requests for a scene.
pub trait Router<S: Stage> {
    type Destination: Destination<S>;

    fn route(&self, destination: Self::Destination) -> SceneRequest<S> {
        SceneRequest::new(move |context| destination.request(context))
    }
}

/// Target of a transition, resolved against the current context.
///
/// Returning `None` declines the transition (e.g. a guard condition).
pub trait Destination<S: Stage>: 'static {
    fn request(self, context: &TransitionContext<'_, S>) -> Option<SceneTransition<S>>;
}

/// Router that forwards destinations of type `D` unchanged.
pub struct Routes<D>(PhantomData<fn() -> D>);

impl<D> Routes<D> {
    #[must_use]
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<D> Default for Routes<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> Clone for Routes<D> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<D> fmt::Debug for Routes<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Routes<{}>", type_name::<D>())
    }
}

impl<S: Stage, D: Destination<S>> Router<S> for Routes<D> {
    type Destination = D;
}

/// Destination type for scenes with no outgoing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unreachable {}

impl<S: Stage> Destination<S> for Unreachable {
    fn request(self, _context: &TransitionContext<'_, S>) -> Option<SceneTransition<S>> {
        match self {}
    }
}

// ---------------------------------------------------------------------------
// Type-erased scene storage
// ---------------------------------------------------------------------------

pub(crate) trait AnyScene<S: Stage> {
    fn is_removable(&self) -> bool;
    fn will_remove(&mut self, stage: &S);
    fn attach(&self, director: Director<S>, argument: Option<Box<dyn Any>>) -> bool;
}

impl<S: Stage, T: Scene<S>> AnyScene<S> for T {
    fn is_removable(&self) -> bool {
        <T as Scene<S>>::is_removable(self)
    }

    fn will_remove(&mut self, stage: &S) {
        <T as Scene<S>>::will_remove(self, stage);
    }

    fn attach(&self, director: Director<S>, argument: Option<Box<dyn Any>>) -> bool {
        let argument = argument
            .and_then(|argument| argument.downcast::<<T as Scene<S>>::Argument>().ok())
            .map(|argument| *argument);
        <T as Scene<S>>::attachment(self).attach(director, argument)
    }
}

/// A scene on (or about to enter) a sequence stack.
pub(crate) struct SceneHandle<S: Stage> {
    scene: Rc<RefCell<dyn AnyScene<S>>>,
    any: Rc<dyn Any>,
    type_name: &'static str,
}

impl<S: Stage> Clone for SceneHandle<S> {
    fn clone(&self) -> Self {
        Self {
            scene: Rc::clone(&self.scene),
            any: Rc::clone(&self.any),
            type_name: self.type_name,
        }
    }
}

impl<S: Stage> SceneHandle<S> {
    pub(crate) fn new<T: Scene<S>>(scene: Shared<T>) -> Self {
        let any: Rc<dyn Any> = scene.clone();
        Self {
            scene,
            any,
            type_name: type_name::<T>(),
        }
    }

    pub(crate) fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The scene as `T`, or `None` if it is some other type.
    pub(crate) fn downcast<T: 'static>(&self) -> Option<Shared<T>> {
        Rc::clone(&self.any).downcast::<RefCell<T>>().ok()
    }

    pub(crate) fn is<T>(&self, scene: &Shared<T>) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.any), Rc::as_ptr(scene))
    }

    pub(crate) fn same(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.any), Rc::as_ptr(&other.any))
    }

    /// `None` if the scene is currently borrowed elsewhere.
    pub(crate) fn is_removable(&self) -> Option<bool> {
        self.scene.try_borrow().ok().map(|scene| scene.is_removable())
    }

    /// Returns false if the scene is currently borrowed elsewhere.
    pub(crate) fn will_remove(&self, stage: &S) -> bool {
        match self.scene.try_borrow_mut() {
            Ok(mut scene) => {
                scene.will_remove(stage);
                true
            }
            Err(_) => false,
        }
    }

    /// Returns false if already attached or mutably borrowed elsewhere.
    pub(crate) fn attach(&self, director: Director<S>, argument: Option<Box<dyn Any>>) -> bool {
        self.scene
            .try_borrow()
            .is_ok_and(|scene| scene.attach(director, argument))
    }
}

impl<S: Stage> fmt::Debug for SceneHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SceneHandle").field(&self.type_name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Plain {
        attachment: Attachment<u8, String>,
        removed_from: Vec<u8>,
    }

    impl Scene<u8> for Plain {
        type Router = Routes<Unreachable>;
        type Argument = String;

        fn router(&self) -> Self::Router {
            Routes::new()
        }

        fn attachment(&self) -> &Attachment<u8, String> {
            &self.attachment
        }

        fn will_remove(&mut self, stage: &u8) {
            self.removed_from.push(*stage);
        }
    }

    struct Other;

    #[test]
    fn attachment_is_set_once() {
        let attachment: Attachment<u8, String> = Attachment::new();
        assert!(!attachment.is_attached());
        assert!(attachment.attach(Director::detached(), Some("first".into())));
        assert!(!attachment.attach(Director::detached(), Some("second".into())));
        assert_eq!(attachment.argument().map(String::as_str), Some("first"));
    }

    #[test]
    fn handle_downcasts_to_its_own_type_only() {
        let scene = shared(Plain::default());
        let handle = SceneHandle::new(Rc::clone(&scene));
        let back = handle.downcast::<Plain>().expect("same type");
        assert!(Rc::ptr_eq(&back, &scene));
        assert!(handle.downcast::<Other>().is_none());
        assert!(handle.is(&scene));
        assert!(!handle.is(&shared(Plain::default())));
    }

    #[test]
    fn handle_attach_passes_typed_argument() {
        let scene = shared(Plain::default());
        let handle = SceneHandle::new(Rc::clone(&scene));
        assert!(handle.attach(Director::detached(), Some(Box::new(String::from("hello")))));
        assert_eq!(scene.borrow().argument().map(String::as_str), Some("hello"));
    }

    #[test]
    fn handle_attach_drops_mistyped_argument() {
        let scene = shared(Plain::default());
        let handle = SceneHandle::new(Rc::clone(&scene));
        assert!(handle.attach(Director::detached(), Some(Box::new(42_u32))));
        assert!(scene.borrow().argument().is_none());
        assert!(scene.borrow().attachment().is_attached());
    }

    #[test]
    fn busy_scene_refuses_removal() {
        let scene = shared(Plain::default());
        let handle = SceneHandle::new(Rc::clone(&scene));
        let guard = scene.borrow_mut();
        assert_eq!(handle.is_removable(), None);
        assert!(!handle.will_remove(&1));
        drop(guard);
        assert_eq!(handle.is_removable(), Some(true));
        assert!(handle.will_remove(&1));
        assert_eq!(scene.borrow().removed_from, vec![1]);
    }
}
