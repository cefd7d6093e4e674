//! Per-loader configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How long a batch window stays open after its first key, unless it fills
/// up first.
pub const DEFAULT_WAIT: Duration = Duration::from_millis(20);

/// How many distinct keys a batch window accepts before it's dispatched.
pub const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(100) {
    Some(capacity) => capacity,
    None => panic!("default capacity must be non-zero"),
};

/// Configuration for a single [`Loader`][crate::Loader]. Every loader
/// carries its own copy, so different entity types (and tests) can be tuned
/// independently.
///
/// A window is dispatched when `wait` has elapsed since it was opened, or
/// when it holds `capacity` distinct keys, whichever comes first. A zero
/// `wait` dispatches the window as soon as one of its thunks is polled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Used to identify the loader in log events.
    pub name: String,
    pub wait: Duration,
    pub capacity: NonZeroUsize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            name: String::from("loader"),
            wait: DEFAULT_WAIT,
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl LoaderConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.capacity = capacity;
        self
    }
}
