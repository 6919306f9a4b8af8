#![forbid(unsafe_code)]

//! Single-threaded reactive sources for action streams.
//!
//! This module provides the stream primitives that actions hand to the
//! runtime:
//!
//! - [`Source`]: anything that can be subscribed with an [`Observer`],
//!   returning a [`Disposable`](crate::Disposable).
//! - [`Subject`]: hot multicast source pushed by its owner.
//! - [`create`]: cold source that runs a producer per subscription, plus the
//!   [`just`], [`fail`], and [`never`] shorthands.
//! - [`SourceExt`]: `inspect`, and conversion into an
//!   [`ActionEvent`](crate::ActionEvent) via `to_event()` / `labeled()`.
//!
//! # Architecture
//!
//! Shared state uses `Rc<RefCell<..>>`; nothing here is `Send`. Callbacks
//! always run with internal borrows released, so observers may dispose their
//! own subscription or subscribe again from inside a callback.
//!
//! # Invariants
//!
//! 1. Every `subscribe` call is an independent subscription.
//! 2. An observer receives at most one terminal signal.
//! 3. Nothing is delivered through a disposed subscription.

pub mod source;
pub mod subject;

pub use source::{Create, Emitter, Inspect, Observer, Source, SourceExt, create, fail, just, never};
pub use subject::Subject;
