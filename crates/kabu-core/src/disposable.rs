#![forbid(unsafe_code)]

//! RAII disposal handles for live subscriptions.
//!
//! A [`Disposable`] is the only cancellation primitive in kabu: every
//! subscription hands one back, and disposing it (explicitly or by dropping
//! it) tears the subscription down.
//!
//! # Invariants
//!
//! 1. The teardown closure runs at most once.
//! 2. `dispose()` is idempotent.
//! 3. Dropping an undisposed handle disposes it.
//! 4. The teardown runs with no internal borrow held, so it may re-enter the
//!    handle (e.g. query `is_disposed()`).

use std::cell::RefCell;
use std::fmt;

type Teardown = Box<dyn FnOnce()>;

/// Handle that cancels a subscription when disposed or dropped.
#[must_use = "dropping a Disposable immediately cancels its subscription"]
pub struct Disposable {
    teardown: RefCell<Option<Teardown>>,
}

impl Disposable {
    /// Create a handle that runs `teardown` on disposal.
    pub fn new(teardown: impl FnOnce() + 'static) -> Self {
        Self {
            teardown: RefCell::new(Some(Box::new(teardown))),
        }
    }

    /// A handle with nothing to tear down. Reports itself as disposed.
    pub fn empty() -> Self {
        Self {
            teardown: RefCell::new(None),
        }
    }

    /// Run the teardown if it has not run yet.
    pub fn dispose(&self) {
        let teardown = self.teardown.borrow_mut().take();
        if let Some(teardown) = teardown {
            teardown();
        }
    }

    /// Whether the teardown has already run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.teardown.borrow().is_none()
    }
}

impl Drop for Disposable {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl Default for Disposable {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
