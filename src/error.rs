//! Errors raised by the loader layer itself.
//!
//! Fetch failures are not represented here: they're whatever error type the
//! fetch function returns, and they're delivered verbatim to every key of the
//! failing group.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoaderError {
    /// A resolver asked the request's bundle for a loader that was never
    /// bound to it.
    #[error("no loader of type `{type_name}` is bound to this request")]
    Missing { type_name: &'static str },
}

pub type LoaderResult<T> = Result<T, LoaderError>;
