//! Versioned object store abstraction
//!
//! The engine never talks to a concrete store directly: diff retrieval,
//! listings, byte-range reads and commit metadata all go through
//! [`VersionedStore`]. [`crate::remote::LakeFsClient`] talks to a lakeFS
//! server; [`crate::memory::MemoryStore`] keeps everything in memory.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;

use crate::diff::DiffEntry;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur while talking to the store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Kind of a listing entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathType {
    Object,
    CommonPrefix,
}

/// One entry of a listing, or the result of a stat call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStat {
    pub path: String,
    pub path_type: PathType,
    pub size_bytes: u64,
}

impl ObjectStat {
    /// A regular object entry.
    pub fn object(path: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            path: path.into(),
            path_type: PathType::Object,
            size_bytes,
        }
    }

    /// Objects with content; zero-byte directory markers are excluded.
    pub fn is_data_object(&self) -> bool {
        self.path_type == PathType::Object && self.size_bytes > 0
    }
}

/// One page of a diff
#[derive(Debug, Clone, Default)]
pub struct DiffPage {
    pub entries: Vec<DiffEntry>,
    /// Cursor for the next page; `None` when this was the last one
    pub next_offset: Option<String>,
}

/// One page of a listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub results: Vec<ObjectStat>,
    pub next_offset: Option<String>,
}

/// Read-only view of a versioned object store
#[async_trait]
pub trait VersionedStore: Send + Sync {
    /// Changes `source` introduces relative to `destination`, restricted to
    /// paths starting with `prefix`, in lexicographic path order, starting
    /// strictly after `after`.
    ///
    /// When `source == destination` the page describes the branch's
    /// uncommitted changes.
    async fn diff_page(
        &self,
        repo: &str,
        source: &str,
        destination: &str,
        prefix: &str,
        after: &str,
        amount: usize,
    ) -> Result<DiffPage>;

    /// Non-recursive listing of `prefix` at `reference`: objects directly
    /// under it plus one common-prefix entry per sub-directory.
    async fn list_page(
        &self,
        repo: &str,
        reference: &str,
        prefix: &str,
        after: &str,
        amount: usize,
    ) -> Result<ListPage>;

    /// Stat a single object
    async fn stat_object(&self, repo: &str, reference: &str, path: &str) -> Result<ObjectStat>;

    /// Read bytes `[start, end)` of an object
    async fn read_range(
        &self,
        repo: &str,
        reference: &str,
        path: &str,
        start: u64,
        end: u64,
    ) -> Result<Bytes>;

    /// User metadata of the commit `reference` points at
    async fn commit_metadata(&self, repo: &str, reference: &str) -> Result<BTreeMap<String, String>>;
}

/// Collect every listing page for `prefix`.
pub async fn list_all(
    store: &dyn VersionedStore,
    repo: &str,
    reference: &str,
    prefix: &str,
    page_size: usize,
) -> Result<Vec<ObjectStat>> {
    let mut results = Vec::new();
    let mut after = String::new();
    loop {
        let page = store.list_page(repo, reference, prefix, &after, page_size).await?;
        results.extend(page.results);
        match page.next_offset {
            Some(next) if next != after => after = next,
            _ => return Ok(results),
        }
    }
}
