#![forbid(unsafe_code)]

//! Runtime configuration.
//!
//! Both config structs follow the same shape: documented defaults,
//! `with_*` builders, and `from_env()` which applies environment overrides
//! on top of the defaults. Unparseable values are ignored.
//!
//! | variable               | field                          |
//! |------------------------|--------------------------------|
//! | `KABU_MAX_RETRIES`     | [`ActivatorConfig::max_retries`] |
//! | `KABU_MAX_SCENE_DEPTH` | [`SequenceConfig::max_depth`]    |
//!
//! Either variable accepts `unbounded` (or `none`) to clear the limit.

use std::env;

const MAX_RETRIES_VAR: &str = "KABU_MAX_RETRIES";
const MAX_SCENE_DEPTH_VAR: &str = "KABU_MAX_SCENE_DEPTH";

/// Configuration for an [`ActionActivator`](crate::ActionActivator).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ActivatorConfig {
    /// Maximum automatic restarts of a single event within one activation.
    /// `None` retries forever, immediately, with no backoff.
    /// Default: `None`.
    pub max_retries: Option<u32>,
}

impl ActivatorConfig {
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    #[must_use]
    pub fn unbounded(mut self) -> Self {
        self.max_retries = None;
        self
    }

    /// Defaults overridden by `KABU_MAX_RETRIES`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(val) = lookup(MAX_RETRIES_VAR)
            && let Some(limit) = parse_limit(&val)
        {
            config.max_retries = limit;
        }
        config
    }
}

/// Configuration for a [`SceneSequence`](crate::SceneSequence).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SequenceConfig {
    /// Maximum number of stack entries, root included.
    /// Default: `None` (unbounded).
    pub max_depth: Option<usize>,
}

impl SequenceConfig {
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    /// Defaults overridden by `KABU_MAX_SCENE_DEPTH`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(val) = lookup(MAX_SCENE_DEPTH_VAR)
            && let Some(limit) = parse_limit(&val)
        {
            config.max_depth = limit;
        }
        config
    }
}

/// `Some(None)` for an explicit "no limit", `Some(Some(n))` for a number,
/// `None` when the value is not understood.
fn parse_limit<N: std::str::FromStr>(val: &str) -> Option<Option<N>> {
    let val = val.trim();
    if val.eq_ignore_ascii_case("unbounded") || val.eq_ignore_ascii_case("none") {
        return Some(None);
    }
    val.parse().ok().map(Some)
}
