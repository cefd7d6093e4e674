//! Aligning fetch results back to the requested ids.

use std::collections::HashMap;
use std::iter;

/// An entity that knows its own primary id. This is how fetch results are
/// matched back to the keys that requested them.
pub trait KeyedEntry {
    fn entry_key(&self) -> &str;
}

impl KeyedEntry for String {
    fn entry_key(&self) -> &str {
        self
    }
}

/// Arrange `items` into one slot per requested id, in the order of `ids`.
/// `identity` recovers an item's id.
///
/// The fetch may return items in any order, and may return fewer items than
/// were requested; ids with no matching item get `None`. This is not an
/// error: it's up to the caller to decide what a missing entity means. Items
/// whose id wasn't requested are discarded, and if several items share an id
/// the first one wins. `ids` is expected to be free of duplicates.
pub fn rearrange<V, I>(ids: &[String], items: Vec<V>, identity: I) -> Vec<Option<V>>
where
    I: Fn(&V) -> &str,
{
    match ids {
        // Nothing to look up against; just find the one match.
        [id] => vec![items
            .into_iter()
            .find(|item| identity(item) == id.as_str())],
        _ => {
            let mut by_id: HashMap<String, V> = HashMap::with_capacity(items.len());
            for item in items {
                by_id.entry(identity(&item).to_owned()).or_insert(item);
            }

            ids.iter().map(|id| by_id.remove(id.as_str())).collect()
        }
    }
}

/// Deliver one failure to every key of a failed fetch: `count` copies of
/// `error`.
pub fn fan_out<V, E: Clone>(error: E, count: usize) -> Vec<Result<V, E>> {
    iter::repeat(error).take(count).map(Err).collect()
}
