//! Keys, and the data structures for passing keys into a batch window.

use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::mem;
use std::num::NonZeroUsize;

/// A secondary payload that can be attached to a [`Key`]. Payloads are
/// grouped by their signature: every key in a window with the same signature
/// lands in the same fetch call, and two keys with the same id and the same
/// signature are the same request.
///
/// The signature must be stable: two payloads describing the same
/// requirements must produce the same string, regardless of how they were
/// built. Don't derive it from `Debug` output.
pub trait Signature {
    fn signature(&self) -> String;
}

/// Bare-id loaders use `()` as their payload. It has an empty signature, so
/// all of its keys share a single group.
impl Signature for () {
    fn signature(&self) -> String {
        String::new()
    }
}

impl Signature for String {
    fn signature(&self) -> String {
        self.clone()
    }
}

impl Signature for &'static str {
    fn signature(&self) -> String {
        (*self).to_owned()
    }
}

/// A request for a single entity: its primary id plus a secondary payload
/// (usually a [`Projection`][crate::Projection]) describing what's needed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key<P = ()> {
    id: String,
    payload: P,
}

impl Key<()> {
    /// Create a key with no secondary payload.
    pub fn bare(id: impl Into<String>) -> Self {
        Self::new(id, ())
    }
}

impl<P> Key<P> {
    pub fn new(id: impl Into<String>, payload: P) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn into_parts(self) -> (String, P) {
        (self.id, self.payload)
    }
}

impl<P: Signature> Key<P> {
    /// The stable encoding of this key. Keys with equal encodings are
    /// treated as the same request by the cache and by a window. The id is
    /// length-prefixed so that no choice of id can collide with a different
    /// (id, signature) pair.
    pub fn encode(&self) -> String {
        let signature = self.payload.signature();
        format!("{}:{}{}", self.id.len(), self.id, signature)
    }
}

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Token(NonZeroUsize);

impl Token {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0.get() - 1
    }
}

/// The ordered set of keys accumulated by a single batch window. Keys are
/// kept in arrival order, because that's the order results are aligned to.
/// Each distinct key is associated with a Token, which its thunks use to pull
/// the outcome back out once the window is done.
pub(crate) struct KeySet<P> {
    // Encoded key -> Token. Tokens are created from the len of `keys`, so
    // keys are never removed from this table.
    tokens: HashMap<String, Token>,
    keys: Vec<Key<P>>,
}

impl<P: Debug> Debug for KeySet<P> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.keys.iter()).finish()
    }
}

impl<P> Default for KeySet<P> {
    fn default() -> Self {
        Self {
            tokens: HashMap::new(),
            keys: Vec::new(),
        }
    }
}

impl<P: Signature> KeySet<P> {
    /// Add a key to this KeySet, and return the token associated with that
    /// key. A key that's already present (by encoding) reuses its token.
    pub(crate) fn add_key(&mut self, key: Key<P>) -> Token {
        let encoded = key.encode();
        if let Some(&token) = self.tokens.get(&encoded) {
            return token;
        }

        let token = Token(NonZeroUsize::MIN.saturating_add(self.keys.len()));
        self.tokens.insert(encoded, token);
        self.keys.push(key);
        token
    }
}

impl<P> KeySet<P> {
    /// Get the number of unique keys in this keyset.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }

    /// Take the keys out of this set in arrival order, leaving it empty. A
    /// key's position in the returned Vec is its Token's index.
    pub(crate) fn take(&mut self) -> Vec<Key<P>> {
        self.tokens.clear();
        mem::take(&mut self.keys)
    }
}
