//! Record snapshots and snapshot history
//!
//! A [`Record`] is one stored version of a record. It owns its field map, so
//! cloning a record yields a fully independent copy: no later mutation of
//! either copy is visible through the other. The version is carried through
//! every copy.

use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::types::{Fields, RecordId, Version};

/// One snapshot of a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Record identifier
    pub id: RecordId,
    /// Field map of this snapshot
    #[serde(rename = "data")]
    pub fields: Fields,
    /// Version of this snapshot
    pub version: Version,
}

impl Record {
    /// Create a snapshot
    pub fn new(id: RecordId, version: Version, fields: Fields) -> Self {
        Record {
            id,
            fields,
            version,
        }
    }

    /// Get a field value
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Consume and return the field map
    pub fn into_fields(self) -> Fields {
        self.fields
    }
}

/// A non-empty sequence of snapshots of one record, ordered newest-first.
///
/// `h[0]` is the latest version, `h[1]` the one stored before it. Gaps left by
/// version-scoped deletes are not filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHistory {
    /// Snapshots ordered newest-first. Always non-empty.
    snapshots: Vec<Record>,
}

impl RecordHistory {
    /// Wrap a list of snapshots ordered newest-first.
    ///
    /// Returns `None` if the list is empty (record does not exist).
    pub fn new(snapshots: Vec<Record>) -> Option<Self> {
        if snapshots.is_empty() {
            None
        } else {
            Some(Self { snapshots })
        }
    }

    /// The latest snapshot
    pub fn latest(&self) -> &Record {
        &self.snapshots[0]
    }

    /// The oldest snapshot still stored
    pub fn oldest(&self) -> &Record {
        &self.snapshots[self.snapshots.len() - 1]
    }

    /// Number of stored snapshots
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Snapshot with the given version, if still stored
    pub fn get(&self, version: Version) -> Option<&Record> {
        self.snapshots.iter().find(|r| r.version == version)
    }

    /// Versions newest-first
    pub fn versions(&self) -> Vec<Version> {
        self.snapshots.iter().map(|r| r.version).collect()
    }

    /// All snapshots (newest-first)
    pub fn snapshots(&self) -> &[Record] {
        &self.snapshots
    }

    /// Consume and return the snapshots
    pub fn into_snapshots(self) -> Vec<Record> {
        self.snapshots
    }
}

impl Index<usize> for RecordHistory {
    type Output = Record;

    fn index(&self, index: usize) -> &Self::Output {
        &self.snapshots[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(version: u64, key: &str, value: &str) -> Record {
        let mut fields = Fields::new();
        fields.insert(key.to_string(), value.to_string());
        Record::new(
            RecordId::new(1).unwrap(),
            Version::new(version).unwrap(),
            fields,
        )
    }

    #[test]
    fn test_clone_is_independent() {
        let original = record(1, "hello", "x");
        let mut copy = original.clone();
        copy.fields.insert("hello".to_string(), "z".to_string());

        assert_eq!(original.field("hello"), Some("x"));
        assert_eq!(copy.field("hello"), Some("z"));
        assert_eq!(copy.version, original.version);
    }

    #[test]
    fn test_record_json_shape() {
        let json = serde_json::to_string(&record(2, "hello", "z")).unwrap();
        assert_eq!(json, r#"{"id":1,"data":{"hello":"z"},"version":2}"#);
    }

    #[test]
    fn test_empty_string_is_not_absence() {
        let r = record(1, "blank", "");
        assert_eq!(r.field("blank"), Some(""));
        assert_eq!(r.field("missing"), None);
    }

    #[test]
    fn test_history_new_returns_none_for_empty() {
        assert!(RecordHistory::new(vec![]).is_none());
    }

    #[test]
    fn test_history_latest_and_indexing() {
        let history =
            RecordHistory::new(vec![record(3, "k", "c"), record(1, "k", "a")]).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.latest().version.as_u64(), 3);
        assert_eq!(history.oldest().version.as_u64(), 1);
        assert_eq!(history[1].field("k"), Some("a"));
        assert!(history.get(Version::new(2).unwrap()).is_none());
        assert_eq!(
            history.versions(),
            vec![Version::new(3).unwrap(), Version::FIRST]
        );
    }
}
