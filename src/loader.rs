use std::{
    fmt::{self, Debug, Formatter},
    future::Future,
    num::NonZeroUsize,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use arc_swap::ArcSwapOption;
use futures::{executor, future::JoinAll};
use tracing::trace;

use crate::{
    cache::RequestCache,
    config::LoaderConfig,
    fetch::Fetch,
    key::{Key, Signature, Token as KeyToken},
    wakerset::Token as WakerToken,
    window::{FetchOutcome, Push, Window},
};

enum Source<P, F: Fetch<P>> {
    Window {
        window: Arc<Window<P, F>>,
        key_token: KeyToken,
    },
    // Primed values never touch a window
    Ready(FetchOutcome<P, F>),
}

/// A thunk is a request for a single key, which shares its window with the
/// other keys loaded around the same time, such that the request can be
/// batched. It's created by [`Loader::load`], and when awaited, it will wait
/// along with the rest of its window until the window is dispatched, then
/// resolve with the outcome for its specific key.
///
/// Every `load` of the same key (for the lifetime of the loader) returns a
/// clone of the same thunk, and every clone resolves to the same outcome.
/// A thunk can be awaited (or [peeked][Thunk::try_get]) again after it has
/// resolved; it returns the same outcome each time.
pub struct Thunk<P, F: Fetch<P>> {
    source: Source<P, F>,
    waker_token: Option<WakerToken>,
}

impl<P, F: Fetch<P>> Thunk<P, F> {
    fn pending(window: Arc<Window<P, F>>, key_token: KeyToken) -> Self {
        Self {
            source: Source::Window { window, key_token },
            waker_token: None,
        }
    }

    fn ready(outcome: FetchOutcome<P, F>) -> Self {
        Self {
            source: Source::Ready(outcome),
            waker_token: None,
        }
    }
}

impl<P, F> Thunk<P, F>
where
    P: Signature + Clone,
    F: Fetch<P>,
{
    /// Get the outcome without waiting, if the thunk's window is done. This
    /// never drives the window; while another task is in the middle of
    /// driving it, this returns None.
    pub fn try_get(&self) -> Option<FetchOutcome<P, F>> {
        match self.source {
            Source::Window {
                ref window,
                key_token,
            } => window.peek(key_token),
            Source::Ready(ref outcome) => Some(outcome.clone()),
        }
    }

    /// Block the current thread until the thunk resolves. For synchronous
    /// callers only; in async code, `.await` the thunk instead.
    pub fn wait(self) -> FetchOutcome<P, F> {
        executor::block_on(self)
    }
}

impl<P, F: Fetch<P>> Clone for Thunk<P, F> {
    fn clone(&self) -> Self {
        let source = match self.source {
            Source::Window {
                ref window,
                key_token,
            } => Source::Window {
                window: Arc::clone(window),
                key_token,
            },
            Source::Ready(ref outcome) => Source::Ready(outcome.clone()),
        };

        // The waker token belongs to whichever task polled the original.
        Self {
            source,
            waker_token: None,
        }
    }
}

impl<P, F: Fetch<P>> Debug for Thunk<P, F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.source {
            Source::Window { key_token, .. } => f
                .debug_struct("Thunk")
                .field("key_token", &key_token)
                .field("waker_token", &self.waker_token)
                .finish(),
            Source::Ready(..) => f.debug_struct("Thunk").field("ready", &true).finish(),
        }
    }
}

// The window is behind an Arc and the primed outcome is never pinned.
impl<P, F: Fetch<P>> Unpin for Thunk<P, F> {}

impl<P, F> Future for Thunk<P, F>
where
    P: Signature + Clone,
    F: Fetch<P>,
{
    type Output = FetchOutcome<P, F>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = Pin::into_inner(self);

        match this.source {
            Source::Window {
                ref window,
                key_token,
            } => window.poll_key(key_token, &mut this.waker_token, ctx),
            Source::Ready(ref outcome) => Poll::Ready(outcome.clone()),
        }
    }
}

impl<P, F: Fetch<P>> Drop for Thunk<P, F> {
    fn drop(&mut self) {
        // The window is only ever being driven by a single task. If that was
        // us, another task has to be woken to take over.
        if let Source::Window { ref window, .. } = self.source {
            if let Some(waker_token) = self.waker_token.take() {
                window.forget_waker(waker_token);
            }
        }
    }
}

/// Awaiting several keys at once; see [`Loader::load_many`].
pub type LoadMany<P, F> = JoinAll<Thunk<P, F>>;

/// A Loader is the per-request entry point for one entity type. It
/// maintains a "currently accumulating" window, and each time you call
/// [`load`][Loader::load] with a key it hasn't seen, the key is added to that
/// window until:
///
/// - the window's wait runs out (this is usually very short)
/// - the window reaches its capacity
///
/// At this point the window is "launched": it's detached from the loader
/// and replaced with a fresh one. The thunks associated with the old window
/// share ownership of it and drive it to completion, independent of the
/// loader.
///
/// Every key is also remembered in the loader's cache, so it's fetched at
/// most once for the lifetime of the loader. Build a fresh loader for every
/// request and drop it when the request is done.
pub struct Loader<P, F: Fetch<P>> {
    name: Arc<str>,
    wait: Duration,
    capacity: NonZeroUsize,
    fetch: Arc<F>,
    cache: RequestCache<Thunk<P, F>>,
    window: ArcSwapOption<Window<P, F>>,
}

impl<P, F: Fetch<P>> Debug for Loader<P, F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("name", &self.name)
            .field("wait", &self.wait)
            .field("capacity", &self.capacity)
            .field("cache", &self.cache)
            .field("fetch", &"<closure>")
            .finish()
    }
}

impl<P, F> Loader<P, F>
where
    P: Signature + Clone,
    F: Fetch<P>,
{
    /// Create a loader with the default config: a 20ms window of up to 100
    /// keys.
    pub fn new(fetch: F) -> Self {
        Self::with_config(LoaderConfig::default(), fetch)
    }

    pub fn with_config(config: LoaderConfig, fetch: F) -> Self {
        Self {
            name: Arc::from(config.name),
            wait: config.wait,
            capacity: config.capacity,
            fetch: Arc::new(fetch),
            cache: RequestCache::new(),
            window: ArcSwapOption::empty(),
        }
    }

    /// Request a single key. If the key has been loaded before, the existing
    /// thunk is returned and no new work is scheduled; otherwise the key is
    /// added to the open window. This never waits: the calling task only
    /// suspends when it awaits the thunk.
    pub fn load(&self, key: Key<P>) -> Thunk<P, F> {
        let encoded = key.encode();

        let (thunk, hit) = self
            .cache
            .get_or_insert_with(encoded.clone(), move || self.enqueue(key));

        if hit {
            trace!(loader = %self.name, key = %encoded, "loader cache hit");
        }

        thunk
    }

    /// Request several keys, resolving to their outcomes in the same order.
    pub fn load_many<I>(&self, keys: I) -> LoadMany<P, F>
    where
        I: IntoIterator<Item = Key<P>>,
    {
        keys.into_iter().map(|key| self.load(key)).collect()
    }

    /// Seed the cache with an already known value, such as an entity that
    /// was fetched as part of its parent. Does nothing if the key is already
    /// cached; returns true if the value was stored.
    pub fn prime(&self, key: Key<P>, value: F::Entity) -> bool {
        self.cache
            .set_if_absent(key.encode(), Thunk::ready(Ok(Some(value))))
    }

    /// Forget a single key, so that the next load fetches it again. Returns
    /// true if the key was cached.
    pub fn clear(&self, key: &Key<P>) -> bool {
        self.cache.remove(&key.encode())
    }

    /// Forget every cached key.
    pub fn clear_all(&self) {
        self.cache.clear()
    }

    /// The number of distinct keys this loader has seen.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Add a key to the open window, opening a new one if there's no open
    /// window or it's already been launched.
    fn enqueue(&self, mut key: Key<P>) -> Thunk<P, F> {
        loop {
            let current = self.window.load_full();

            if let Some(ref window) = current {
                match window.push(key) {
                    Push::Added(key_token) => return Thunk::pending(Arc::clone(window), key_token),
                    Push::AddedLast(key_token) => {
                        // Detach the full window, unless another task has
                        // already replaced it.
                        let _ = self
                            .window
                            .compare_and_swap(&current, None::<Arc<Window<P, F>>>);
                        return Thunk::pending(Arc::clone(window), key_token);
                    }
                    Push::Closed(returned) => key = returned,
                }
            }

            // Either install a fresh window or lose the race to a task that
            // installed one first; both ways, the next loop pushes into
            // whatever is current.
            let fresh = Arc::new(Window::open(
                Arc::clone(&self.name),
                self.wait,
                self.capacity,
                Arc::clone(&self.fetch),
            ));
            let _ = self.window.compare_and_swap(&current, Some(fresh));
        }
    }
}

/// A loader keyed by bare id. The projection is computed once per request
/// (usually from the request's whole field selection) and shared by every
/// key, so all of a window's keys land in a single fetch.
pub struct EntitiesLoader<P, F: Fetch<P>> {
    projection: P,
    loader: Loader<P, F>,
}

impl<P: Debug, F: Fetch<P>> Debug for EntitiesLoader<P, F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitiesLoader")
            .field("projection", &self.projection)
            .field("loader", &self.loader)
            .finish()
    }
}

impl<P, F> EntitiesLoader<P, F>
where
    P: Signature + Clone,
    F: Fetch<P>,
{
    pub fn new(projection: P, fetch: F) -> Self {
        Self::with_config(LoaderConfig::default(), projection, fetch)
    }

    pub fn with_config(config: LoaderConfig, projection: P, fetch: F) -> Self {
        Self {
            projection,
            loader: Loader::with_config(config, fetch),
        }
    }

    fn key(&self, id: impl Into<String>) -> Key<P> {
        Key::new(id, self.projection.clone())
    }

    pub fn load(&self, id: impl Into<String>) -> Thunk<P, F> {
        self.loader.load(self.key(id))
    }

    pub fn load_many<I, S>(&self, ids: I) -> LoadMany<P, F>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ids.into_iter().map(|id| self.load(id)).collect()
    }

    pub fn prime(&self, id: impl Into<String>, value: F::Entity) -> bool {
        self.loader.prime(self.key(id), value)
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    /// The underlying loader, for clearing or inspecting the cache.
    pub fn loader(&self) -> &Loader<P, F> {
        &self.loader
    }
}
