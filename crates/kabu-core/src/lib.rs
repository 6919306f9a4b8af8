#![forbid(unsafe_code)]

//! Core: disposal handles, reactive sources, and the action event adapter.

pub mod disposable;
pub mod error;
pub mod event;
pub mod reactive;

pub use disposable::Disposable;
pub use error::StreamError;
pub use event::{ActionEvent, EventSink};
pub use reactive::{Observer, Source, SourceExt, Subject};
