//! Field-level update directives
//!
//! An update carries a map from field key to an optional value. A present
//! value sets the field; an absent value deletes it. On the wire this is a
//! JSON object whose `null` members are deletions:
//!
//! ```text
//! {"a": null, "c": "3"}   // delete a, set c = "3"
//! ```

use std::collections::btree_map;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::Fields;

/// A single per-field instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive<'a> {
    /// Set the field to the value
    Set(&'a str),
    /// Remove the field if present
    Delete,
}

/// Set of per-field directives, at most one per key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Directives {
    entries: BTreeMap<String, Option<String>>,
}

impl Directives {
    /// Create an empty directive set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `set` directive (builder style)
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert_set(key, value);
        self
    }

    /// Add a `delete` directive (builder style)
    pub fn delete(mut self, key: impl Into<String>) -> Self {
        self.insert_delete(key);
        self
    }

    /// Add or replace a `set` directive
    pub fn insert_set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), Some(value.into()));
    }

    /// Add or replace a `delete` directive
    pub fn insert_delete(&mut self, key: impl Into<String>) {
        self.entries.insert(key.into(), None);
    }

    /// Directive for a key, if any
    pub fn get(&self, key: &str) -> Option<Directive<'_>> {
        self.entries.get(key).map(|value| match value {
            Some(v) => Directive::Set(v.as_str()),
            None => Directive::Delete,
        })
    }

    /// Iterate over `(key, directive)` in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, Directive<'_>)> {
        self.entries.iter().map(|(k, v)| {
            let directive = match v {
                Some(value) => Directive::Set(value.as_str()),
                None => Directive::Delete,
            };
            (k.as_str(), directive)
        })
    }

    /// Number of directives
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no directives
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Only the `set` directives, as a field map.
    ///
    /// Used when an upsert has to create the record: deletions of fields
    /// that never existed are dropped.
    pub fn set_fields(&self) -> Fields {
        self.entries
            .iter()
            .filter_map(|(k, v)| v.as_ref().map(|value| (k.clone(), value.clone())))
            .collect()
    }
}

impl FromIterator<(String, Option<String>)> for Directives {
    fn from_iter<I: IntoIterator<Item = (String, Option<String>)>>(iter: I) -> Self {
        Directives {
            entries: iter.into_iter().collect(),
        }
    }
}

impl From<BTreeMap<String, Option<String>>> for Directives {
    fn from(entries: BTreeMap<String, Option<String>>) -> Self {
        Directives { entries }
    }
}

impl From<Fields> for Directives {
    /// Every field becomes a `set` directive
    fn from(fields: Fields) -> Self {
        fields.into_iter().map(|(k, v)| (k, Some(v))).collect()
    }
}

impl IntoIterator for Directives {
    type Item = (String, Option<String>);
    type IntoIter = btree_map::IntoIter<String, Option<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
