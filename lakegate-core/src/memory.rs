//! In-memory versioned store
//!
//! Every ref is a full snapshot (path → bytes). Diffs are computed by
//! comparing two snapshots; uncommitted changes of a branch `b` are the
//! difference between the snapshot `b` and the snapshot `b@`.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::diff::{ChangeType, DiffEntry};
use crate::store::{DiffPage, ListPage, ObjectStat, PathType, Result, StoreError, VersionedStore};

type Snapshot = BTreeMap<String, Bytes>;

/// In-memory store
#[derive(Default)]
pub struct MemoryStore {
    /// repo -> ref -> snapshot
    refs: Arc<RwLock<HashMap<String, HashMap<String, Snapshot>>>>,

    /// (repo, ref) -> commit metadata
    metadata: Arc<RwLock<HashMap<(String, String), BTreeMap<String, String>>>>,

    /// Listing prefixes that fail
    failing_listings: Arc<RwLock<HashSet<String>>>,

    /// Object paths whose reads fail
    failing_reads: Arc<RwLock<HashSet<String>>>,

    range_reads: AtomicUsize,
    bytes_read: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty ref (no-op if it exists)
    pub async fn create_ref(&self, repo: &str, reference: &str) {
        let mut refs = self.refs.write().await;
        refs.entry(repo.to_string())
            .or_default()
            .entry(reference.to_string())
            .or_default();
    }

    /// Copy the snapshot of `from` into `to`, replacing `to`
    pub async fn copy_ref(&self, repo: &str, from: &str, to: &str) {
        let mut refs = self.refs.write().await;
        let repo_refs = refs.entry(repo.to_string()).or_default();
        let snapshot = repo_refs.get(from).cloned().unwrap_or_default();
        repo_refs.insert(to.to_string(), snapshot);
    }

    /// Write an object, creating the ref if needed
    pub async fn put_object(&self, repo: &str, reference: &str, path: &str, data: Vec<u8>) {
        let mut refs = self.refs.write().await;
        refs.entry(repo.to_string())
            .or_default()
            .entry(reference.to_string())
            .or_default()
            .insert(path.to_string(), Bytes::from(data));
    }

    /// Delete an object from a ref
    pub async fn remove_object(&self, repo: &str, reference: &str, path: &str) {
        let mut refs = self.refs.write().await;
        if let Some(snapshot) = refs.get_mut(repo).and_then(|r| r.get_mut(reference)) {
            snapshot.remove(path);
        }
    }

    /// Set the commit metadata `reference` resolves to
    pub async fn set_commit_metadata(
        &self,
        repo: &str,
        reference: &str,
        metadata: BTreeMap<String, String>,
    ) {
        self.metadata
            .write()
            .await
            .insert((repo.to_string(), reference.to_string()), metadata);
    }

    /// Make listings of exactly `prefix` fail
    pub async fn fail_listing(&self, prefix: &str) {
        self.failing_listings.write().await.insert(prefix.to_string());
    }

    /// Make stat and range reads of `path` fail
    pub async fn fail_reads(&self, path: &str) {
        self.failing_reads.write().await.insert(path.to_string());
    }

    /// Number of range reads served so far
    pub fn range_reads(&self) -> usize {
        self.range_reads.load(Ordering::SeqCst)
    }

    /// Total bytes returned by range reads
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::SeqCst)
    }

    async fn snapshot(&self, repo: &str, reference: &str) -> Result<Snapshot> {
        let refs = self.refs.read().await;
        refs.get(repo)
            .ok_or_else(|| StoreError::NotFound(format!("repository '{}'", repo)))?
            .get(reference)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("ref '{}'", reference)))
    }

    async fn check_readable(&self, path: &str) -> Result<()> {
        if self.failing_reads.read().await.contains(path) {
            return Err(StoreError::Backend(format!("read of '{}' failed", path)));
        }
        Ok(())
    }
}

#[async_trait]
impl VersionedStore for MemoryStore {
    async fn diff_page(
        &self,
        repo: &str,
        source: &str,
        destination: &str,
        prefix: &str,
        after: &str,
        amount: usize,
    ) -> Result<DiffPage> {
        let src = self.snapshot(repo, source).await?;
        let dst = if source == destination {
            self.snapshot(repo, &format!("{}@", destination)).await?
        } else {
            self.snapshot(repo, destination).await?
        };

        let mut changes: BTreeMap<&str, DiffEntry> = BTreeMap::new();
        for (path, data) in &src {
            let change = match dst.get(path) {
                None => ChangeType::Added,
                Some(old) if old != data => ChangeType::Modified,
                Some(_) => continue,
            };
            changes.insert(
                path,
                DiffEntry {
                    path: path.clone(),
                    change_type: change,
                    size_bytes: Some(data.len() as u64),
                },
            );
        }
        for path in dst.keys() {
            if !src.contains_key(path) {
                changes.insert(path, DiffEntry::removed(path.clone()));
            }
        }

        let mut remaining = changes
            .into_iter()
            .filter(|(path, _)| path.starts_with(prefix) && (after.is_empty() || *path > after))
            .map(|(_, entry)| entry);

        let entries: Vec<DiffEntry> = remaining.by_ref().take(amount).collect();
        let next_offset = if remaining.next().is_some() {
            entries.last().map(|e| e.path.clone())
        } else {
            None
        };
        Ok(DiffPage {
            entries,
            next_offset,
        })
    }

    async fn list_page(
        &self,
        repo: &str,
        reference: &str,
        prefix: &str,
        after: &str,
        amount: usize,
    ) -> Result<ListPage> {
        if self.failing_listings.read().await.contains(prefix) {
            return Err(StoreError::Backend(format!("listing of '{}' failed", prefix)));
        }
        let snapshot = self.snapshot(repo, reference).await?;

        let mut items: Vec<ObjectStat> = Vec::new();
        let mut seen_dirs = HashSet::new();
        for (path, data) in snapshot.range(prefix.to_string()..) {
            let Some(rest) = path.strip_prefix(prefix) else {
                break;
            };
            match rest.find('/') {
                Some(idx) => {
                    let dir = format!("{}{}", prefix, &rest[..=idx]);
                    if seen_dirs.insert(dir.clone()) {
                        items.push(ObjectStat {
                            path: dir,
                            path_type: PathType::CommonPrefix,
                            size_bytes: 0,
                        });
                    }
                }
                None => items.push(ObjectStat::object(path.clone(), data.len() as u64)),
            }
        }

        let mut remaining = items
            .into_iter()
            .filter(|item| after.is_empty() || item.path.as_str() > after);
        let results: Vec<ObjectStat> = remaining.by_ref().take(amount).collect();
        let next_offset = if remaining.next().is_some() {
            results.last().map(|r| r.path.clone())
        } else {
            None
        };
        Ok(ListPage {
            results,
            next_offset,
        })
    }

    async fn stat_object(&self, repo: &str, reference: &str, path: &str) -> Result<ObjectStat> {
        self.check_readable(path).await?;
        let snapshot = self.snapshot(repo, reference).await?;
        snapshot
            .get(path)
            .map(|data| ObjectStat::object(path, data.len() as u64))
            .ok_or_else(|| StoreError::NotFound(format!("object '{}'", path)))
    }

    async fn read_range(
        &self,
        repo: &str,
        reference: &str,
        path: &str,
        start: u64,
        end: u64,
    ) -> Result<Bytes> {
        self.check_readable(path).await?;
        let snapshot = self.snapshot(repo, reference).await?;
        let data = snapshot
            .get(path)
            .ok_or_else(|| StoreError::NotFound(format!("object '{}'", path)))?;

        let len = data.len() as u64;
        let end = end.min(len);
        if start > end {
            return Err(StoreError::Backend(format!(
                "invalid range {}..{} for '{}' ({} bytes)",
                start, end, path, len
            )));
        }
        let slice = data.slice(start as usize..end as usize);
        self.range_reads.fetch_add(1, Ordering::SeqCst);
        self.bytes_read.fetch_add(slice.len() as u64, Ordering::SeqCst);
        Ok(slice)
    }

    async fn commit_metadata(&self, repo: &str, reference: &str) -> Result<BTreeMap<String, String>> {
        self.metadata
            .read()
            .await
            .get(&(repo.to_string(), reference.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("commit '{}'", reference)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::list_all;

    #[tokio::test]
    async fn test_diff_against_destination() {
        let store = MemoryStore::new();
        store.put_object("r", "main", "t/a", b"1".to_vec()).await;
        store.put_object("r", "main", "t/b", b"2".to_vec()).await;
        store.copy_ref("r", "main", "feature").await;
        store.put_object("r", "feature", "t/a", b"changed".to_vec()).await;
        store.remove_object("r", "feature", "t/b").await;
        store.put_object("r", "feature", "t/c", b"3".to_vec()).await;

        let page = store.diff_page("r", "feature", "main", "", "", 100).await.unwrap();
        let kinds: Vec<_> = page.entries.iter().map(|e| (e.path.as_str(), e.change_type)).collect();
        assert_eq!(
            kinds,
            vec![
                ("t/a", ChangeType::Modified),
                ("t/b", ChangeType::Removed),
                ("t/c", ChangeType::Added),
            ]
        );
        assert!(page.next_offset.is_none());
    }

    #[tokio::test]
    async fn test_uncommitted_diff_uses_committed_snapshot() {
        let store = MemoryStore::new();
        store.put_object("r", "main", "a", b"1".to_vec()).await;
        store.copy_ref("r", "main", "main@").await;
        store.put_object("r", "main", "b", b"2".to_vec()).await;

        let page = store.diff_page("r", "main", "main", "", "", 10).await.unwrap();
        assert_eq!(page.entries, vec![DiffEntry::added("b", 1)]);
    }

    #[tokio::test]
    async fn test_listing_is_non_recursive() {
        let store = MemoryStore::new();
        store.put_object("r", "main", "t/dt=1/a", b"1".to_vec()).await;
        store.put_object("r", "main", "t/dt=1/b", b"22".to_vec()).await;
        store.put_object("r", "main", "t/dt=1/sub/c", b"3".to_vec()).await;
        store.put_object("r", "main", "t/dt=2/d", b"4".to_vec()).await;

        let all = list_all(&store, "r", "main", "t/dt=1/", 1).await.unwrap();
        let paths: Vec<_> = all.iter().map(|o| (o.path.as_str(), o.path_type)).collect();
        assert_eq!(
            paths,
            vec![
                ("t/dt=1/a", PathType::Object),
                ("t/dt=1/b", PathType::Object),
                ("t/dt=1/sub/", PathType::CommonPrefix),
            ]
        );
    }

    #[tokio::test]
    async fn test_read_range_counts() {
        let store = MemoryStore::new();
        store.put_object("r", "main", "f", b"0123456789".to_vec()).await;
        let tail = store.read_range("r", "main", "f", 6, 100).await.unwrap();
        assert_eq!(&tail[..], b"6789");
        assert_eq!(store.range_reads(), 1);
        assert_eq!(store.bytes_read(), 4);

        store.fail_reads("f").await;
        assert!(store.read_range("r", "main", "f", 0, 1).await.is_err());
    }
}
