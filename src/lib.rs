//! Graphloader is a request-scoped implementation of the
//! [dataloader pattern](https://github.com/graphql/dataloader) for graph
//! query resolvers. It batches the many independent single-entity lookups
//! that sibling resolvers make into a few bulk fetches, deduplicates
//! identical lookups, and hands each resolver exactly the entity it asked
//! for: the classic cure for "N+1" query explosions.
//!
//! ## Overview
//!
//! Suppose your persistence layer can read users in bulk, and can restrict
//! the read to the fields a query actually selected:
//!
//! ```
//! use graphloader::Projection;
//!
//! #[derive(Debug, Clone)]
//! struct User {
//!     id: String,
//!     name: String,
//! }
//!
//! #[derive(Debug, Clone)]
//! struct DbError(String);
//!
//! async fn read_users(ids: Vec<String>, fields: Projection) ->
//!     Result<Vec<User>, DbError>
//! {
//!     todo!()
//! }
//! ```
//!
//! The only thing graphloader needs from the entity is a way to recover its
//! id from a fetch result, so that results can be matched back to requests:
//!
//! ```
//! # #[derive(Debug, Clone)] struct User { id: String }
//! use graphloader::KeyedEntry;
//!
//! impl KeyedEntry for User {
//!     fn entry_key(&self) -> &str {
//!         &self.id
//!     }
//! }
//! ```
//!
//! For every request, build a [`Loader`] around that fetch function.
//! [`Loader::load`] takes a [`Key`]: the entity's id plus a secondary
//! payload, usually a [`Projection`] of the fields the caller needs. It
//! returns a [`Thunk`] immediately; the caller only suspends when it awaits
//! the thunk.
//!
//! ```
//! # use graphloader::{KeyedEntry, Projection};
//! # #[derive(Debug, Clone)] struct User { id: String }
//! # impl KeyedEntry for User { fn entry_key(&self) -> &str { &self.id } }
//! # #[derive(Debug, Clone)] struct DbError;
//! # async fn read_users(ids: Vec<String>, fields: Projection) ->
//! #     Result<Vec<User>, DbError> { Ok(ids.into_iter().map(|id| User { id }).collect()) }
//! use graphloader::{Key, Loader};
//!
//! let users = Loader::new(read_users);
//! let fields = Projection::from_paths(["name"]);
//!
//! let alice = users.load(Key::new("alice", fields.clone()));
//! let bob = users.load(Key::new("bob", fields.clone()));
//!
//! // Both keys are fetched by a single call to read_users
//! # futures::executor::block_on(async {
//! let alice = alice.await.unwrap().expect("alice exists");
//! let bob = bob.await.unwrap();
//! # });
//! ```
//!
//! Keys are collected into a batch window. The window is dispatched when its
//! wait has elapsed (20ms by default) or when it holds its capacity of
//! distinct keys (100 by default), whichever comes first; see
//! [`LoaderConfig`]. On dispatch, the keys are grouped by the signature of
//! their payload, and the fetch function is called once per group, so
//! callers that need different shapes of the same entity are never merged
//! into one read.
//!
//! Each key resolves to a `Result<Option<V>, E>`:
//!
//! - `Ok(Some(entity))`: the fetch returned the entity with that id.
//! - `Ok(None)`: the fetch didn't return it. Missing is not an error here;
//!   the caller decides what "not found" means.
//! - `Err(error)`: the fetch call for the key's group failed. Every key in
//!   that group gets (a clone of) the same error; other groups in the same
//!   window are unaffected.
//!
//! ## Design notes
//!
//! ### Request scope
//!
//! A loader remembers every key it's seen, and returns the same [`Thunk`]
//! for repeated loads of the same key, so each key is fetched at most once.
//! Nothing is ever evicted. This is only sound because a loader lives for
//! exactly one request: build the request's loaders with [`BindLoaders`],
//! put the resulting [`Loaders`] bundle where your resolvers can reach it,
//! and drop it at the end of the request.
//!
//! ### Key identity
//!
//! Two keys are the same request when their [`Key::encode`] strings are
//! equal. The encoding is built from the id and the payload's
//! [`Signature`], which every payload type must provide explicitly; it's
//! never derived from `Debug` output.
//!
//! ### Poll-driven design
//!
//! In keeping with Rust's polling async design, all of the asynchronous
//! work in graphloader is driven through polling [`Thunk`]s. Fetches are not
//! scheduled in any runtime or run in the background; they're driven
//! directly in the foreground by whichever task awaits a thunk. A window
//! nobody awaits is never fetched.
//!
//! The polling is designed to be as lazy as possible. Because a window only
//! needs to be driven by a single task, thunks track and notify only a
//! single task to drive it forward. The other thunks are woken only when
//! outcomes are available (or when the driving thunk is dropped).
//!
//! No timeout is applied to the fetch itself; a fetch that never completes
//! stalls every key in its window. If you need one, put it in the fetch.

mod bundle;
mod cache;
mod config;
mod error;
mod fetch;
mod key;
mod loader;
mod projection;
mod rearrange;
mod wakerset;
mod window;

#[cfg(test)]
mod test;

pub use bundle::{BindLoaders, Loaders};
pub use cache::RequestCache;
pub use config::{LoaderConfig, DEFAULT_CAPACITY, DEFAULT_WAIT};
pub use error::{LoaderError, LoaderResult};
pub use fetch::Fetch;
pub use key::{Key, Signature};
pub use loader::{EntitiesLoader, LoadMany, Loader, Thunk};
pub use projection::Projection;
pub use rearrange::{fan_out, rearrange, KeyedEntry};
pub use window::Outcome;
