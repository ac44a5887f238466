//! Partition classification
//!
//! Partitions are directories that producing jobs are expected to write
//! atomically: either a brand-new directory (or new files next to untouched
//! ones), or a complete replacement of everything that was there. A partial
//! overlap between old and new content is what a failed or concurrent job
//! leaves behind.
//!
//! Classification of one partition, given its diff entries and the objects
//! that existed before the change:
//!
//! 1. no pre-existing object removed or modified, only additions → `PureAddition`
//! 2. every pre-existing object removed or modified → `FullReplace`
//! 3. anything else → `Dirty`
//!
//! Zero-byte objects (directory markers) are ignored on both sides.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::diff::{ChangeType, Diff, DiffEntry};
use crate::error::{Result, ValidationError};
use crate::path;
use crate::store::{VersionedStore, list_all};

/// Mutation kind of one partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionVerdict {
    FullReplace,
    PureAddition,
    Dirty,
}

impl PartitionVerdict {
    pub fn as_str(self) -> &'static str {
        match self {
            PartitionVerdict::FullReplace => "full replace",
            PartitionVerdict::PureAddition => "pure addition",
            PartitionVerdict::Dirty => "dirty",
        }
    }
}

/// Diff entries sharing one partition key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionGroup {
    /// Directory prefix including the trailing `/`
    pub key: String,
    pub entries: Vec<DiffEntry>,
}

/// Classification of one partition with the counts behind it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionReport {
    pub key: String,
    pub verdict: PartitionVerdict,
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
    pub pre_existing: usize,
    /// Pre-existing objects the change did not touch
    pub untouched: Vec<String>,
}

impl PartitionReport {
    /// e.g. `partition t/dt=1/: 3 files added, 1 pre-existing file untouched (dirty)`
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        for (count, what) in [
            (self.added, "added"),
            (self.removed, "removed"),
            (self.modified, "modified"),
        ] {
            if count > 0 {
                parts.push(format!("{} {} {}", count, plural(count, "file", "files"), what));
            }
        }
        if !self.untouched.is_empty() {
            parts.push(format!(
                "{} pre-existing {} untouched",
                self.untouched.len(),
                plural(self.untouched.len(), "file", "files")
            ));
        }
        if parts.is_empty() {
            parts.push("no data files changed".to_string());
        }
        format!("partition {}: {} ({})", self.key, parts.join(", "), self.verdict.as_str())
    }
}

fn plural<'s>(n: usize, one: &'s str, many: &'s str) -> &'s str {
    if n == 1 { one } else { many }
}

/// Bucket the entries under `scoped_prefix` by partition key, in key order.
pub fn group_partitions(diff: &Diff, scoped_prefix: &str) -> Vec<PartitionGroup> {
    let mut groups: BTreeMap<String, Vec<DiffEntry>> = BTreeMap::new();
    for entry in diff.under(scoped_prefix) {
        groups
            .entry(path::partition_key(&entry.path).to_string())
            .or_default()
            .push(entry.clone());
    }
    groups
        .into_iter()
        .map(|(key, entries)| PartitionGroup { key, entries })
        .collect()
}

/// Classify one group against the data objects that existed before the
/// change. Returns `None` when there is nothing to classify.
pub fn classify_group(group: &PartitionGroup, pre_existing: &BTreeSet<String>) -> Option<PartitionReport> {
    let relevant: Vec<&DiffEntry> = group
        .entries
        .iter()
        .filter(|e| match e.change_type {
            // zero-byte markers
            ChangeType::Added => e.size_bytes != Some(0),
            ChangeType::Removed => pre_existing.contains(&e.path),
            ChangeType::Modified => true,
        })
        .collect();

    if relevant.is_empty() && pre_existing.is_empty() {
        return None;
    }

    let count = |kind: ChangeType| relevant.iter().filter(|e| e.change_type == kind).count();
    let touched: BTreeSet<&str> = relevant
        .iter()
        .filter(|e| e.change_type != ChangeType::Added && pre_existing.contains(&e.path))
        .map(|e| e.path.as_str())
        .collect();
    let untouched: Vec<String> = pre_existing
        .iter()
        .filter(|p| !touched.contains(p.as_str()))
        .cloned()
        .collect();
    let only_added = relevant.iter().all(|e| e.change_type == ChangeType::Added);

    let verdict = if touched.is_empty() && only_added {
        PartitionVerdict::PureAddition
    } else if untouched.is_empty() {
        PartitionVerdict::FullReplace
    } else {
        PartitionVerdict::Dirty
    };

    Some(PartitionReport {
        key: group.key.clone(),
        verdict,
        added: count(ChangeType::Added),
        removed: count(ChangeType::Removed),
        modified: count(ChangeType::Modified),
        pre_existing: pre_existing.len(),
        untouched,
    })
}

/// Classifies partitions against a baseline ref's listings
pub struct PartitionClassifier<'a> {
    store: &'a dyn VersionedStore,
    repo: &'a str,
    baseline_ref: &'a str,
    page_size: usize,
    fanout: usize,
}

impl<'a> PartitionClassifier<'a> {
    pub fn new(
        store: &'a dyn VersionedStore,
        repo: &'a str,
        baseline_ref: &'a str,
        page_size: usize,
        fanout: usize,
    ) -> Self {
        Self {
            store,
            repo,
            baseline_ref,
            page_size: page_size.max(1),
            fanout: fanout.max(1),
        }
    }

    /// Classify every partition touched under `scoped_prefix`.
    ///
    /// A failed listing only affects its own key, which maps to
    /// [`ValidationError::ListingUnavailable`].
    pub async fn classify(
        &self,
        diff: &Diff,
        scoped_prefix: &str,
    ) -> BTreeMap<String, Result<PartitionReport>> {
        let groups = group_partitions(diff, scoped_prefix);
        tracing::debug!(
            "classifying {} partition(s) under '{}' against {}",
            groups.len(),
            scoped_prefix,
            self.baseline_ref
        );

        let results: Vec<(String, Option<Result<PartitionReport>>)> = stream::iter(groups)
            .map(|group| async move {
                let outcome = match self.pre_existing(&group.key).await {
                    Ok(before) => classify_group(&group, &before).map(Ok),
                    Err(err) => Some(Err(err)),
                };
                (group.key, outcome)
            })
            .buffer_unordered(self.fanout)
            .collect()
            .await;

        results
            .into_iter()
            .filter_map(|(key, outcome)| outcome.map(|o| (key, o)))
            .collect()
    }

    async fn pre_existing(&self, key: &str) -> Result<BTreeSet<String>> {
        let listing = list_all(self.store, self.repo, self.baseline_ref, key, self.page_size)
            .await
            .map_err(|e| ValidationError::ListingUnavailable {
                partition: key.to_string(),
                reason: e.to_string(),
            })?;
        Ok(listing
            .into_iter()
            .filter(|o| o.is_data_object())
            .map(|o| o.path)
            .collect())
    }
}
