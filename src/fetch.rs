use std::future::Future;

use crate::rearrange::KeyedEntry;

/// The bulk read behind a loader. A `Fetch` is called once per group of a
/// batch window, with the distinct ids of that group (in request order) and
/// the payload shared by the group.
///
/// The returned entities may come back in any order, and ids that weren't
/// found may simply be left out; each is matched back to its key through
/// [`KeyedEntry`]. An error fails every key in the group. Whatever request
/// context the read needs (a connection, the caller's identity) should be
/// captured by the fetch when the request's loaders are bound.
///
/// This is implemented for any `Fn(Vec<String>, P) -> impl Future`, so an
/// async closure is usually all you need:
///
/// ```
/// use graphloader::{KeyedEntry, Loader};
///
/// #[derive(Debug, Clone)]
/// struct User { id: String }
///
/// impl KeyedEntry for User {
///     fn entry_key(&self) -> &str { &self.id }
/// }
///
/// let loader = Loader::new(|ids: Vec<String>, _: ()| async move {
///     Ok::<_, String>(ids.into_iter().map(|id| User { id }).collect())
/// });
/// ```
pub trait Fetch<P> {
    type Entity: KeyedEntry + Clone;
    type Error: Clone;
    type Future: Future<Output = Result<Vec<Self::Entity>, Self::Error>>;

    fn fetch(&self, ids: Vec<String>, payload: P) -> Self::Future;
}

impl<P, Func, Fut, Entity, Error> Fetch<P> for Func
where
    Func: Fn(Vec<String>, P) -> Fut,
    Fut: Future<Output = Result<Vec<Entity>, Error>>,
    Entity: KeyedEntry + Clone,
    Error: Clone,
{
    type Entity = Entity;
    type Error = Error;
    type Future = Fut;

    #[inline]
    fn fetch(&self, ids: Vec<String>, payload: P) -> Fut {
        (self)(ids, payload)
    }
}
