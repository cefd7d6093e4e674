use std::{collections::HashMap, num::NonZeroUsize, task::Waker};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub(crate) struct Token(NonZeroUsize);

/// Data structure for managing a collection of wakers that are all interested
/// in a single shared computation (one batch window). Only a single task
/// needs to actually do the work of driving the window to completion, but
/// other tasks can take its place if that one is dropped.
///
/// The WakerSet maintains the notion of the "driving waker"; this is the
/// waker that most recently polled the window. If the driving waker is
/// discarded from the set, another is selected and awoken, so that so long as
/// thunks discard their tokens when dropped, the window always has a path
/// forward.
#[derive(Debug)]
pub(crate) struct WakerSet {
    wakers: HashMap<Token, Waker>,
    driving_waker: Option<Token>,

    // Tokens are an ever-increasing integer. WakerSets live as long as one
    // window, so there's no chance of running out of these.
    next_token: NonZeroUsize,
}

impl Default for WakerSet {
    fn default() -> Self {
        Self {
            wakers: HashMap::with_capacity(1),
            next_token: NonZeroUsize::MIN,
            driving_waker: None,
        }
    }
}

impl WakerSet {
    /// Record the waker that just polled the window, and make it the driving
    /// waker. If `token` is None, the waker is new to this set, and the new
    /// token is written back.
    pub(crate) fn register(&mut self, token: &mut Option<Token>, waker: &Waker) {
        match *token {
            Some(existing) if self.wakers.contains_key(&existing) => {
                self.replace_waker(existing, waker)
            }
            _ => *token = Some(self.add_waker(waker.clone())),
        }
    }

    #[must_use]
    fn add_waker(&mut self, waker: Waker) -> Token {
        let token = Token(self.next_token);
        self.next_token = self.next_token.saturating_add(1);

        self.wakers.insert(token, waker);
        self.driving_waker = Some(token);
        token
    }

    fn replace_waker(&mut self, token: Token, waker: &Waker) {
        if let Some(slot) = self.wakers.get_mut(&token) {
            if !slot.will_wake(waker) {
                slot.clone_from(waker);
            }
        }

        self.driving_waker = Some(token);
    }

    /// Discard a waker from this set. If that waker was the current driving
    /// waker (or there is currently no driving waker), an arbitrary waker is
    /// made the current driving waker and awoken.
    pub(crate) fn discard_and_wake(&mut self, token: Token) {
        self.wakers.remove(&token);
        if self.driving_waker == Some(token) || self.driving_waker.is_none() {
            self.driving_waker = None;
            self.wake_any();
        }
    }

    /// Wake the driving waker, or an arbitrary waker if there isn't one. Used
    /// when the window fills up, so that a parked task dispatches it.
    pub(crate) fn wake_driver(&mut self) {
        match self.driving_waker.and_then(|token| self.wakers.get(&token)) {
            Some(waker) => waker.wake_by_ref(),
            None => self.wake_any(),
        }
    }

    fn wake_any(&mut self) {
        if let Some((&token, waker)) = self.wakers.iter().next() {
            self.driving_waker = Some(token);
            waker.wake_by_ref();
        }
    }

    /// Wake everything except `token`, which belongs to the task that's
    /// currently completing the window, and empty the set.
    pub(crate) fn discard_wake_all(&mut self, token: Option<Token>) {
        if let Some(token) = token {
            self.wakers.remove(&token);
        }

        self.driving_waker = None;
        self.wakers.drain().for_each(|(_token, waker)| waker.wake());
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.wakers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use std::task::Wake;

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl Wake for Counter {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counted() -> (Arc<Counter>, Waker) {
        let counter = Arc::new(Counter::default());
        let waker = Waker::from(counter.clone());
        (counter, waker)
    }

    fn count(counter: &Counter) -> usize {
        counter.0.load(Ordering::SeqCst)
    }

    #[test]
    fn dropping_the_driver_wakes_another() {
        let mut set = WakerSet::default();
        let (c1, w1) = counted();
        let (c2, w2) = counted();

        let mut t1 = None;
        let mut t2 = None;
        set.register(&mut t1, &w1);
        set.register(&mut t2, &w2);

        // t2 polled last, so it's the driver. Dropping t1 wakes nobody.
        set.discard_and_wake(t1.unwrap());
        assert_eq!(count(&c1) + count(&c2), 0);

        set.register(&mut t1, &w1);
        set.discard_and_wake(t1.unwrap());
        assert_eq!(count(&c2), 1);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn wake_all_skips_the_finisher() {
        let mut set = WakerSet::default();
        let (c1, w1) = counted();
        let (c2, w2) = counted();

        let mut t1 = None;
        let mut t2 = None;
        set.register(&mut t1, &w1);
        set.register(&mut t2, &w2);

        set.wake_driver();
        assert_eq!(count(&c2), 1);

        set.discard_wake_all(t2);
        assert_eq!(count(&c1), 1);
        assert_eq!(count(&c2), 1);
        assert_eq!(set.len(), 0);
    }
}
