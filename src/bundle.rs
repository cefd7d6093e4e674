//! Binding loaders to a request.
//!
//! Loaders are strictly request scoped: the request's middleware builds a
//! fresh [`Loaders`] bundle when the request comes in, attaches it to the
//! request's context so every resolver can reach it, and drops it when the
//! request is done. Dropping the bundle drops every loader and its cache.

use std::{
    any::{type_name, Any, TypeId},
    collections::HashMap,
    fmt::{self, Debug, Formatter},
};

use crate::error::{LoaderError, LoaderResult};

/// A set of loaders, at most one of each type. Loaders are looked up by
/// their concrete type, which is usually a [`Loader`][crate::Loader] or
/// [`EntitiesLoader`][crate::EntitiesLoader] with a named fetch type (or
/// a newtype around one).
#[derive(Default)]
pub struct Loaders {
    loaders: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    names: Vec<&'static str>,
}

impl Debug for Loaders {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names.iter()).finish()
    }
}

impl Loaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a loader to the bundle. Builder flavor of [`insert`][Loaders::insert].
    pub fn with<L: Any + Send + Sync>(mut self, loader: L) -> Self {
        self.insert(loader);
        self
    }

    /// Add a loader to the bundle, replacing any existing loader of the same
    /// type. Returns true if one was replaced.
    pub fn insert<L: Any + Send + Sync>(&mut self, loader: L) -> bool {
        let replaced = self
            .loaders
            .insert(TypeId::of::<L>(), Box::new(loader))
            .is_some();

        if !replaced {
            self.names.push(type_name::<L>());
        }

        replaced
    }

    pub fn get<L: Any>(&self) -> Option<&L> {
        self.loaders
            .get(&TypeId::of::<L>())
            .and_then(|loader| loader.downcast_ref())
    }

    /// Like [`get`][Loaders::get], but a missing loader is an error. Use this
    /// from resolvers, where a missing loader means the request binding is
    /// misconfigured.
    pub fn require<L: Any>(&self) -> LoaderResult<&L> {
        self.get().ok_or(LoaderError::Missing {
            type_name: type_name::<L>(),
        })
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }
}

/// Builds the loaders for one request from that request's context. This is
/// the hook the request middleware calls once per request; the context is
/// usually captured by the loaders' fetch functions.
///
/// Implemented for any `Fn(&Ctx) -> Loaders`.
pub trait BindLoaders<Ctx> {
    fn bind(&self, ctx: &Ctx) -> Loaders;
}

impl<Ctx, F> BindLoaders<Ctx> for F
where
    F: Fn(&Ctx) -> Loaders,
{
    fn bind(&self, ctx: &Ctx) -> Loaders {
        (self)(ctx)
    }
}
