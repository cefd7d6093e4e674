#![cfg(test)]

use crate::{Key, Loader, LoaderConfig};
use core::cell::{Cell, RefCell};
use std::future::{ready, Ready};
use std::num::NonZeroUsize;
use std::rc::Rc;
use std::time::Duration;

use futures::executor;

type Batch = Result<Vec<String>, ()>;

fn stringify(ids: Vec<String>, _: ()) -> Ready<Batch> {
    ready(Ok(ids))
}

fn call_counter<'a, A, B, R>(
    counter: &'a Cell<usize>,
    function: impl Fn(A, B) -> R + 'a,
) -> impl Fn(A, B) -> R + 'a {
    move |a, b| {
        counter.set(counter.get() + 1);
        function(a, b)
    }
}

fn config(capacity: usize) -> LoaderConfig {
    LoaderConfig::default()
        .with_wait(Duration::from_secs(0))
        .with_capacity(NonZeroUsize::new(capacity).unwrap())
}

#[test]
fn simple_test() {
    let counter = Cell::new(0);
    let loader = Loader::with_config(config(10), call_counter(&counter, stringify));

    let fut1 = loader.load(Key::bare("10"));
    let fut2 = loader.load(Key::bare("20"));

    let res1 = executor::block_on(fut1);
    let res2 = executor::block_on(fut2);

    assert_eq!(res1.unwrap().unwrap(), "10");
    assert_eq!(res2.unwrap().unwrap(), "20");
    assert_eq!(counter.get(), 1);
}

#[test]
fn low_key_test() {
    let counter = Cell::new(0);
    let loader = Loader::with_config(config(2), call_counter(&counter, stringify));

    let fut1 = loader.load(Key::bare("10"));
    let fut2 = loader.load(Key::bare("20"));
    let fut3 = loader.load(Key::bare("30"));

    let res1 = executor::block_on(fut1);
    let res2 = executor::block_on(fut2);
    let res3 = executor::block_on(fut3);

    assert_eq!(res1.unwrap().unwrap(), "10");
    assert_eq!(res2.unwrap().unwrap(), "20");
    assert_eq!(res3.unwrap().unwrap(), "30");
    assert_eq!(counter.get(), 2);
}

#[test]
fn test_duplicate_keys() {
    let seen = RefCell::new(Vec::new());
    let loader = Loader::with_config(config(2), |ids: Vec<String>, _: ()| {
        seen.borrow_mut().push(ids.clone());
        ready(Ok::<_, ()>(ids))
    });

    let fut1 = loader.load(Key::bare("10"));
    let fut2 = loader.load(Key::bare("10"));
    let fut3 = loader.load(Key::bare("10"));

    // Duplicates are served from the cache, so they don't count towards the
    // window's capacity
    let fut4 = loader.load(Key::bare("20"));

    let res1 = executor::block_on(fut1);
    let res2 = executor::block_on(fut2);
    let res3 = executor::block_on(fut3);
    let res4 = executor::block_on(fut4);

    assert_eq!(res1.unwrap().unwrap(), "10");
    assert_eq!(res2.unwrap().unwrap(), "10");
    assert_eq!(res3.unwrap().unwrap(), "10");
    assert_eq!(res4.unwrap().unwrap(), "20");
    assert_eq!(*seen.borrow(), [vec!["10", "20"]]);
}

#[test]
fn test_cached_across_windows() {
    let counter = Cell::new(0);
    let loader = Loader::with_config(config(10), call_counter(&counter, stringify));

    let first = executor::block_on(loader.load(Key::bare("a")));

    // The first window is done; this is served by the same thunk
    let again = loader.load(Key::bare("a"));
    assert_eq!(again.try_get(), Some(Ok(Some(String::from("a")))));
    assert_eq!(executor::block_on(again), first);
    assert_eq!(counter.get(), 1);
    assert_eq!(loader.cached(), 1);
}

#[test]
fn test_fetch_peeks_its_own_window() {
    // The fetch is created while its window is being driven; peeking a thunk
    // of that window from inside it must not block.
    let peek: Rc<RefCell<Option<Box<dyn Fn() -> bool>>>> = Rc::default();
    let seen = Rc::new(Cell::new(None));

    let loader = Loader::with_config(config(10), {
        let peek = Rc::clone(&peek);
        let seen = Rc::clone(&seen);

        move |ids: Vec<String>, _: ()| {
            if let Some(peek) = peek.borrow().as_ref() {
                seen.set(Some(peek()));
            }
            ready(Ok::<_, ()>(ids))
        }
    });

    let thunk = loader.load(Key::bare("a"));
    let watched = thunk.clone();
    *peek.borrow_mut() = Some(Box::new(move || watched.try_get().is_some()));

    assert_eq!(executor::block_on(thunk), Ok(Some(String::from("a"))));
    assert_eq!(seen.get(), Some(false));
}
