//! The request-scoped memo cache.

use std::fmt::{self, Debug, Formatter};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// A concurrent map from encoded key to a cached handle (in practice, a
/// [`Thunk`][crate::Thunk]). Entries are never evicted on their own; they
/// live until they're explicitly cleared or the cache is dropped along with
/// its loader at the end of the request.
pub struct RequestCache<T> {
    entries: DashMap<String, T>,
}

impl<T> Default for RequestCache<T> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<T> Debug for RequestCache<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCache")
            .field("len", &self.entries.len())
            .finish()
    }
}

impl<T: Clone> RequestCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<T> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Unconditionally store a handle for a key, replacing any existing one.
    pub fn set(&self, key: impl Into<String>, value: T) {
        self.entries.insert(key.into(), value);
    }

    /// Store a handle for a key only if the key isn't present. Returns true
    /// if the value was stored.
    pub fn set_if_absent(&self, key: impl Into<String>, value: T) -> bool {
        match self.entries.entry(key.into()) {
            Entry::Occupied(..) => false,
            Entry::Vacant(entry) => {
                entry.insert(value);
                true
            }
        }
    }

    /// Get the handle for a key, or create and store one. `create` runs
    /// while this key's shard is locked, so concurrent callers for the same
    /// key always observe a single handle. The bool is true on a cache hit.
    pub fn get_or_insert_with(&self, key: String, create: impl FnOnce() -> T) -> (T, bool) {
        match self.entries.entry(key) {
            Entry::Occupied(entry) => (entry.get().clone(), true),
            Entry::Vacant(entry) => (entry.insert(create()).value().clone(), false),
        }
    }
}

impl<T> RequestCache<T> {
    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
