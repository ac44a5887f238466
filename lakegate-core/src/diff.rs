//! Revision diff model and client

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Result, ValidationError};
use crate::store::VersionedStore;

/// Kind of change a diff entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
}

impl ChangeType {
    /// Added or Modified: the change writes content.
    pub fn writes_content(self) -> bool {
        matches!(self, ChangeType::Added | ChangeType::Modified)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::Added => "added",
            ChangeType::Removed => "removed",
            ChangeType::Modified => "modified",
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One changed path between two revisions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub path: String,
    pub change_type: ChangeType,
    /// Object size; absent for removals
    pub size_bytes: Option<u64>,
}

impl DiffEntry {
    pub fn added(path: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            path: path.into(),
            change_type: ChangeType::Added,
            size_bytes: Some(size_bytes),
        }
    }

    pub fn modified(path: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            path: path.into(),
            change_type: ChangeType::Modified,
            size_bytes: Some(size_bytes),
        }
    }

    pub fn removed(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            change_type: ChangeType::Removed,
            size_bytes: None,
        }
    }
}

/// Ordered set of changes for a (source, destination) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff {
    source_ref: String,
    destination_ref: String,
    prefix: String,
    entries: Vec<DiffEntry>,
}

impl Diff {
    /// Build a diff from entries in store order. A repeated path keeps its
    /// first occurrence.
    pub fn new(
        source_ref: impl Into<String>,
        destination_ref: impl Into<String>,
        entries: Vec<DiffEntry>,
    ) -> Self {
        let mut seen = HashSet::new();
        let entries = entries
            .into_iter()
            .filter(|e| seen.insert(e.path.clone()))
            .collect();
        Self {
            source_ref: source_ref.into(),
            destination_ref: destination_ref.into(),
            prefix: String::new(),
            entries,
        }
    }

    pub fn source_ref(&self) -> &str {
        &self.source_ref
    }

    pub fn destination_ref(&self) -> &str {
        &self.destination_ref
    }

    /// Prefix of the most recent filter applied, `""` if none.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn entries(&self) -> &[DiffEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A new diff holding only the entries under `prefix`.
    pub fn filter_prefix(&self, prefix: &str) -> Diff {
        Diff {
            source_ref: self.source_ref.clone(),
            destination_ref: self.destination_ref.clone(),
            prefix: prefix.to_string(),
            entries: self.under(prefix).cloned().collect(),
        }
    }

    /// Entries whose path starts with `prefix`.
    pub fn under<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a DiffEntry> + 'a {
        self.entries.iter().filter(move |e| e.path.starts_with(prefix))
    }

    /// Added or Modified entries under `prefix`.
    pub fn writes_under<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a DiffEntry> + 'a {
        self.under(prefix).filter(|e| e.change_type.writes_content())
    }
}

/// Pages through the store's diff with a bounded entry count
pub struct DiffClient<'a> {
    store: &'a dyn VersionedStore,
    page_size: usize,
    max_entries: usize,
}

impl<'a> DiffClient<'a> {
    pub fn new(store: &'a dyn VersionedStore, page_size: usize, max_entries: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
            max_entries,
        }
    }

    /// Fetch the diff between `source` and `destination` under `prefix`.
    ///
    /// Stops as soon as more than `max_entries` entries have been seen.
    pub async fn fetch_diff(
        &self,
        repo: &str,
        source: &str,
        destination: &str,
        prefix: &str,
    ) -> Result<Diff> {
        let mut entries = Vec::new();
        let mut after = String::new();
        let mut pages = 0usize;

        loop {
            let page = self
                .store
                .diff_page(repo, source, destination, prefix, &after, self.page_size)
                .await
                .map_err(|e| ValidationError::DiffUnavailable {
                    source_ref: source.to_string(),
                    destination_ref: destination.to_string(),
                    reason: e.to_string(),
                })?;
            pages += 1;

            for entry in page.entries {
                if !entry.path.starts_with(prefix) {
                    continue;
                }
                if entries.len() >= self.max_entries {
                    return Err(ValidationError::DiffTooLarge {
                        limit: self.max_entries,
                    });
                }
                entries.push(entry);
            }

            match page.next_offset {
                Some(next) if next != after => after = next,
                _ => break,
            }
        }

        tracing::debug!(
            "diff {}..{} under '{}': {} entries in {} page(s)",
            source,
            destination,
            prefix,
            entries.len(),
            pages
        );

        Ok(Diff::new(source, destination, entries).filter_prefix(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use proptest::prelude::*;

    fn sample() -> Diff {
        Diff::new(
            "feature",
            "main",
            vec![
                DiffEntry::added("production/a.parquet", 10),
                DiffEntry::modified("production/b/c.parquet", 20),
                DiffEntry::removed("staging/d.csv"),
            ],
        )
    }

    #[test]
    fn test_filter_prefix() {
        let diff = sample();
        let filtered = diff.filter_prefix("production/");
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered.prefix(), "production/");
        assert_eq!(diff.len(), 3, "filtering must not touch the original");
        assert_eq!(diff.filter_prefix("").len(), 3);
    }

    #[test]
    fn test_duplicate_paths_keep_first() {
        let diff = Diff::new(
            "a",
            "b",
            vec![DiffEntry::added("x", 1), DiffEntry::removed("x")],
        );
        assert_eq!(diff.len(), 1);
        assert_eq!(diff.entries()[0].change_type, ChangeType::Added);
    }

    #[test]
    fn test_writes_under() {
        let diff = sample();
        let writes: Vec<_> = diff.writes_under("").map(|e| e.path.as_str()).collect();
        assert_eq!(writes, vec!["production/a.parquet", "production/b/c.parquet"]);
    }

    fn arb_entry() -> impl Strategy<Value = DiffEntry> {
        ("[ab]{0,2}/?[a-c]{1,3}", 0u8..3, 0u64..100).prop_map(|(path, kind, size)| match kind {
            0 => DiffEntry::added(path, size),
            1 => DiffEntry::modified(path, size),
            _ => DiffEntry::removed(path),
        })
    }

    proptest! {
        #[test]
        fn prop_filter_is_idempotent(
            entries in proptest::collection::vec(arb_entry(), 0..20),
            prefix in "[ab]{0,2}/?",
        ) {
            let diff = Diff::new("src", "dst", entries);
            let once = diff.filter_prefix(&prefix);
            let twice = once.filter_prefix(&prefix);
            prop_assert_eq!(once, twice);
        }
    }

    #[tokio::test]
    async fn test_fetch_diff_pages_and_filters() {
        let store = MemoryStore::new();
        store.put_object("repo", "main", "production/old.parquet", b"old".to_vec()).await;
        for i in 0..5 {
            store
                .put_object("repo", "feature", &format!("production/p{}.parquet", i), b"x".to_vec())
                .await;
        }
        store.put_object("repo", "feature", "scratch/tmp.csv", b"y".to_vec()).await;

        let client = DiffClient::new(&store, 2, 100);
        let diff = client.fetch_diff("repo", "feature", "main", "production/").await.unwrap();
        assert_eq!(diff.len(), 6);
        assert!(diff.entries().iter().all(|e| e.path.starts_with("production/")));
        assert_eq!(
            diff.entries().iter().filter(|e| e.change_type == ChangeType::Removed).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_fetch_diff_too_large() {
        let store = MemoryStore::new();
        for i in 0..10 {
            store.put_object("repo", "feature", &format!("f{}", i), b"x".to_vec()).await;
        }
        store.create_ref("repo", "main").await;

        let client = DiffClient::new(&store, 3, 4);
        let err = client.fetch_diff("repo", "feature", "main", "").await.unwrap_err();
        assert_eq!(err, ValidationError::DiffTooLarge { limit: 4 });
    }

    #[tokio::test]
    async fn test_fetch_diff_unknown_ref() {
        let store = MemoryStore::new();
        store.create_ref("repo", "main").await;

        let client = DiffClient::new(&store, 10, 10);
        let err = client.fetch_diff("repo", "nope", "main", "").await.unwrap_err();
        assert!(matches!(err, ValidationError::DiffUnavailable { .. }), "got {:?}", err);
    }
}
