use std::{
    collections::hash_map::{Entry, HashMap},
    fmt::{self, Debug, Formatter},
    num::NonZeroUsize,
    sync::{Arc, Mutex},
    task::{Context, Poll},
    time::{Duration, Instant},
};

use futures::{ready, stream::FuturesOrdered, FutureExt, StreamExt};
use futures_timer::Delay;
use tracing::{debug, trace, warn};

use crate::{
    fetch::Fetch,
    key::{Key, KeySet, Signature, Token as KeyToken},
    rearrange::{fan_out, rearrange, KeyedEntry},
    wakerset::{Token as WakerToken, WakerSet},
};

/// What a single key resolves to: the entity, `None` if the fetch didn't
/// return it, or the error of the fetch call its group was part of.
pub type Outcome<V, E> = Result<Option<V>, E>;

pub(crate) type FetchOutcome<P, F> = Outcome<<F as Fetch<P>>::Entity, <F as Fetch<P>>::Error>;

/// The result of trying to add a key to a Window. This fails if the window
/// has already been dispatched. If the window is still accumulating keys it
/// succeeds, but if it hits capacity it's closed immediately and will not
/// accept any more keys, indicated by AddedLast.
#[derive(Debug)]
pub(crate) enum Push<P> {
    Added(KeyToken),
    AddedLast(KeyToken),
    Closed(Key<P>),
}

/// The part of a window that `load` touches. It's locked only briefly and
/// never while user code (the fetch) runs.
struct Intake<P> {
    keys: KeySet<P>,
    open: bool,
    wakers: WakerSet,
}

/// All the keys of a window that share a payload signature. Each group is
/// one fetch call.
struct Group<P> {
    payload: P,
    ids: Vec<String>,
    // Position of each id in the window, ie, its KeyToken's index
    slots: Vec<usize>,
}

struct Running<P, F: Fetch<P>> {
    groups: Vec<Group<P>>,
    fetches: FuturesOrdered<F::Future>,
    results: Vec<Result<Vec<F::Entity>, F::Error>>,
    len: usize,
}

enum Phase<P, F: Fetch<P>> {
    /// Still accepting keys. The delay is None for a zero wait.
    Waiting(Option<Delay>),

    /// The fetches have been issued and are pending
    Running(Running<P, F>),

    /// Every key's outcome, indexed by KeyToken
    Done(Vec<Option<FetchOutcome<P, F>>>),
}

impl<P, F: Fetch<P>> Debug for Phase<P, F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Waiting(delay) => f.debug_tuple("Waiting").field(delay).finish(),
            Phase::Running(running) => f
                .debug_struct("Running")
                .field("groups", &running.groups.len())
                .field("finished", &running.results.len())
                .finish(),
            Phase::Done(outcomes) => f.debug_struct("Done").field("keys", &outcomes.len()).finish(),
        }
    }
}

/// A Window encodes the state of a single collection of keys through its
/// lifespan: accumulating keys, issuing one fetch per payload group, and
/// distributing the outcomes to the individual thunks.
///
/// A set of thunks shares ownership of a single Window. There is no
/// background execution; all the polling is driven by the thunks. Lock order
/// is always `phase` then `intake`.
///
/// The fetch futures are created and polled while `phase` is held, so a fetch
/// must never await a thunk of its own window. Peeking one with
/// [`try_get`][crate::Thunk::try_get] is fine; it reports the window as not
/// yet done.
pub(crate) struct Window<P, F: Fetch<P>> {
    name: Arc<str>,
    capacity: NonZeroUsize,
    // When the wait runs out. None for a zero wait, which keeps the window
    // open until its first poll.
    deadline: Option<Instant>,
    fetch: Arc<F>,
    intake: Mutex<Intake<P>>,
    phase: Mutex<Phase<P, F>>,
}

impl<P, F: Fetch<P>> Debug for Window<P, F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Window")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("fetch", &"<closure>")
            .field("phase", &self.phase.try_lock().ok())
            .finish()
    }
}

impl<P, F> Window<P, F>
where
    P: Signature + Clone,
    F: Fetch<P>,
{
    /// Open a new, empty window. The wait starts now.
    pub(crate) fn open(
        name: Arc<str>,
        wait: Duration,
        capacity: NonZeroUsize,
        fetch: Arc<F>,
    ) -> Self {
        let (delay, deadline) = if wait.is_zero() {
            (None, None)
        } else {
            (Some(Delay::new(wait)), Some(Instant::now() + wait))
        };

        Self {
            name,
            capacity,
            deadline,
            fetch,
            intake: Mutex::new(Intake {
                keys: KeySet::default(),
                open: true,
                wakers: WakerSet::default(),
            }),
            phase: Mutex::new(Phase::Waiting(delay)),
        }
    }

    /// Attempt to add a key to this window. A window whose wait has run out
    /// is closed, even if none of its thunks has noticed yet. If this key
    /// makes the window full, it's closed, and the driving task is woken so
    /// that it dispatches the window without waiting for the delay.
    pub(crate) fn push(&self, key: Key<P>) -> Push<P> {
        // Polls never hold this lock across user code, and we require
        // panic=abort, so poisoning isn't a concern.
        let mut intake = self.intake.lock().unwrap();

        if intake.open && self.deadline.map_or(false, |deadline| Instant::now() >= deadline) {
            trace!(loader = %self.name, keys = intake.keys.len(), "batch window wait elapsed");
            intake.open = false;
        }

        if !intake.open {
            return Push::Closed(key);
        }

        let token = intake.keys.add_key(key);

        if intake.keys.len() >= self.capacity.get() {
            trace!(loader = %self.name, keys = intake.keys.len(), "batch window full");
            intake.open = false;
            intake.wakers.wake_driver();
            Push::AddedLast(token)
        } else {
            Push::Added(token)
        }
    }

    /// Drive this window forward on behalf of the thunk holding `key_token`,
    /// and return that key's outcome once the window is done.
    pub(crate) fn poll_key(
        &self,
        key_token: KeyToken,
        waker_token: &mut Option<WakerToken>,
        ctx: &mut Context<'_>,
    ) -> Poll<FetchOutcome<P, F>> {
        // Note about this mutex: the lock is released when poll returns (it
        // isn't held between polls), so it's safe to use in async code.
        let mut phase = self.phase.lock().unwrap();

        if let Phase::Waiting(ref mut delay) = *phase {
            let mut intake = self.intake.lock().unwrap();

            // A closed intake means the window filled up; don't bother with
            // the delay
            let elapsed = !intake.open
                || match delay {
                    Some(delay) => delay.poll_unpin(ctx).is_ready(),
                    None => true,
                };

            if !elapsed {
                // This waker is now the driving waker for the Delay.
                intake.wakers.register(waker_token, ctx.waker());
                return Poll::Pending;
            }

            intake.open = false;
            let keys = intake.keys.take();
            drop(intake);

            // This drops the delay in place
            *phase = Phase::Running(self.dispatch(keys));
        }

        if let Phase::Running(ref mut running) = *phase {
            if running.poll_fetches(ctx).is_pending() {
                self.intake
                    .lock()
                    .unwrap()
                    .wakers
                    .register(waker_token, ctx.waker());
                return Poll::Pending;
            }

            let outcomes = running.settle(&self.name);

            // Now that we have outcomes, signal all the waiting thunks to
            // wake up so they can get theirs. We're about to grab ours, so
            // we don't need to wake ourself.
            self.intake
                .lock()
                .unwrap()
                .wakers
                .discard_wake_all(waker_token.take());

            *phase = Phase::Done(outcomes);
        }

        match *phase {
            Phase::Done(ref outcomes) => match outcomes.get(key_token.index()) {
                Some(Some(outcome)) => Poll::Ready(outcome.clone()),
                _ => {
                    // Explicitly drop the guard to prevent mutex poisoning
                    drop(phase);
                    panic!("Unknown logic error: no outcome in window associated with Token");
                }
            },
            _ => unreachable!("Window contained invalid phase"),
        }
    }

    /// The outcome for a key, if the window is done. Never drives the window,
    /// and never waits for a task that's driving it.
    pub(crate) fn peek(&self, key_token: KeyToken) -> Option<FetchOutcome<P, F>> {
        match *self.phase.try_lock().ok()? {
            Phase::Done(ref outcomes) => outcomes.get(key_token.index()).cloned().flatten(),
            _ => None,
        }
    }

    /// Partition the window's keys by payload signature, and issue one fetch
    /// per group. Groups are in order of their first key.
    fn dispatch(&self, keys: Vec<Key<P>>) -> Running<P, F> {
        let len = keys.len();
        let mut groups: Vec<Group<P>> = Vec::new();
        let mut by_signature: HashMap<String, usize> = HashMap::new();

        for (slot, key) in keys.into_iter().enumerate() {
            let signature = key.payload().signature();
            let (id, payload) = key.into_parts();

            let index = match by_signature.entry(signature) {
                Entry::Occupied(entry) => *entry.get(),
                Entry::Vacant(entry) => {
                    groups.push(Group {
                        payload,
                        ids: Vec::new(),
                        slots: Vec::new(),
                    });
                    *entry.insert(groups.len() - 1)
                }
            };

            let group = &mut groups[index];
            group.ids.push(id);
            group.slots.push(slot);
        }

        debug!(
            loader = %self.name,
            keys = len,
            groups = groups.len(),
            "dispatching batch window"
        );

        let fetches = groups
            .iter()
            .map(|group| self.fetch.fetch(group.ids.clone(), group.payload.clone()))
            .collect();

        Running {
            results: Vec::with_capacity(groups.len()),
            groups,
            fetches,
            len,
        }
    }
}

impl<P, F> Running<P, F>
where
    P: Signature,
    F: Fetch<P>,
{
    /// Poll every outstanding fetch. Groups are independent; one failing
    /// doesn't stop the others from being driven to completion.
    fn poll_fetches(&mut self, ctx: &mut Context<'_>) -> Poll<()> {
        while let Some(result) = ready!(self.fetches.poll_next_unpin(ctx)) {
            self.results.push(result);
        }

        Poll::Ready(())
    }

    /// Turn the per-group results into per-key outcomes, in window order.
    /// Only called once all the fetches are finished.
    fn settle(&mut self, name: &str) -> Vec<Option<FetchOutcome<P, F>>> {
        let mut outcomes: Vec<Option<FetchOutcome<P, F>>> = (0..self.len).map(|_| None).collect();

        for (group, result) in self.groups.drain(..).zip(self.results.drain(..)) {
            let resolved: Vec<FetchOutcome<P, F>> = match result {
                Ok(entities) => {
                    rearrange(&group.ids, entities, <F::Entity as KeyedEntry>::entry_key)
                        .into_iter()
                        .map(Ok)
                        .collect()
                }
                Err(error) => {
                    warn!(
                        loader = %name,
                        projection = %group.payload.signature(),
                        keys = group.ids.len(),
                        "fetch failed; failing every key in its group"
                    );
                    fan_out(error, group.ids.len())
                }
            };

            for (slot, outcome) in group.slots.into_iter().zip(resolved) {
                outcomes[slot] = Some(outcome);
            }
        }

        outcomes
    }
}

impl<P, F: Fetch<P>> Window<P, F> {
    /// Called when a thunk that has polled this window is dropped. If it was
    /// the driving task, another one is woken to take over.
    pub(crate) fn forget_waker(&self, waker_token: WakerToken) {
        // Currently, we don't do any cleanup if the mutex is poisoned; we
        // require panic=abort.
        if let Ok(mut intake) = self.intake.lock() {
            intake.wakers.discard_and_wake(waker_token);
        }
    }
}
