//! Field-selection projections.
//!
//! A [`Projection`] describes which fields (and which fields of which related
//! entities) a resolver needs. It's passed through to the fetch function so
//! that the underlying read can be shaped, and its signature is used to group
//! keys that need identical treatment.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::key::Signature;

/// A tree of selected fields. Leaf fields have an empty sub-projection.
/// Fields are stored sorted, so the signature doesn't depend on the order in
/// which the selection was built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Projection {
    fields: BTreeMap<String, Projection>,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a projection from dotted field paths, such as the paths
    /// collected from a request's whole selection set. `"author.name"`
    /// selects the `name` field of the `author` relation.
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut projection = Self::new();
        paths
            .into_iter()
            .for_each(|path| projection.insert_path(path.as_ref()));
        projection
    }

    /// Select a single field.
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.entry(name.into()).or_default();
        self
    }

    /// Select a relation along with the given projection of it. Selecting
    /// the same relation twice merges the two projections.
    pub fn relation(mut self, name: impl Into<String>, projection: Projection) -> Self {
        self.fields.entry(name.into()).or_default().merge(projection);
        self
    }

    /// Add every field of `other` to this projection.
    pub fn merge(&mut self, other: Projection) {
        for (name, sub) in other.fields {
            self.fields.entry(name).or_default().merge(sub);
        }
    }

    fn insert_path(&mut self, path: &str) {
        path.split('.')
            .filter(|segment| !segment.is_empty())
            .fold(self, |node, segment| {
                node.fields.entry(segment.to_owned()).or_default()
            });
    }

    /// Check if a top-level field is selected
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// The projection of a selected relation, if it's selected.
    pub fn get(&self, name: &str) -> Option<&Projection> {
        self.fields.get(name)
    }

    /// Iterate the selected top-level field names, in sorted order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// The canonical form: `{a,b{c,d}}`. Field names are sorted.
impl Display for Projection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, sub)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(name)?;
            if !sub.is_empty() {
                Display::fmt(sub, f)?;
            }
        }
        f.write_str("}")
    }
}

impl Signature for Projection {
    fn signature(&self) -> String {
        self.to_string()
    }
}
