//! Object metadata accessor
//!
//! Reads only the trailing bytes of an object and hands them to the footer
//! parser registered for its extension.

use serde::Serialize;

use crate::error::{Result, ValidationError};
use crate::footer::{FooterError, FormatRegistry};
use crate::path;
use crate::store::VersionedStore;

/// Default size of the first tail read
pub const DEFAULT_FOOTER_TAIL_BYTES: u64 = 64 * 1024;

/// Column names and row count from an object's footer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectMetadata {
    /// Top-level column names in schema order
    pub column_names: Vec<String>,
    pub row_count: u64,
}

/// Fetches [`ObjectMetadata`] for objects of one repository
pub struct MetadataAccessor<'a> {
    store: &'a dyn VersionedStore,
    formats: &'a FormatRegistry,
    repo: &'a str,
    tail_bytes: u64,
}

impl<'a> MetadataAccessor<'a> {
    pub fn new(
        store: &'a dyn VersionedStore,
        formats: &'a FormatRegistry,
        repo: &'a str,
        tail_bytes: u64,
    ) -> Self {
        Self {
            store,
            formats,
            repo,
            tail_bytes: tail_bytes.max(1),
        }
    }

    /// Read the footer of `path` at `reference`.
    pub async fn read_metadata(&self, reference: &str, path: &str) -> Result<ObjectMetadata> {
        self.read_metadata_sized(reference, path, None).await
    }

    /// Like [`read_metadata`](Self::read_metadata), skipping the stat call
    /// when the object size is already known (diff entries carry it).
    pub async fn read_metadata_sized(
        &self,
        reference: &str,
        path: &str,
        size_hint: Option<u64>,
    ) -> Result<ObjectMetadata> {
        let extension = path::extension(path);
        let parser = self
            .formats
            .get(&extension)
            .ok_or_else(|| ValidationError::UnsupportedFormat {
                path: path.to_string(),
                reason: format!("no footer parser for extension '{}'", extension),
            })?;

        let size = match size_hint {
            Some(size) => size,
            None => {
                self.store
                    .stat_object(self.repo, reference, path)
                    .await
                    .map_err(|e| unavailable(path, e))?
                    .size_bytes
            }
        };

        let mut want = self.tail_bytes.min(size);
        let mut reread = false;
        loop {
            let tail = self
                .store
                .read_range(self.repo, reference, path, size - want, size)
                .await
                .map_err(|e| unavailable(path, e))?;

            match parser.parse(&tail, size) {
                Ok(metadata) => return Ok(metadata),
                Err(FooterError::Truncated { required, .. })
                    if !reread && required > want && required <= size =>
                {
                    tracing::debug!(
                        "{} footer of {} needs {} bytes (read {}), re-reading",
                        parser.format(),
                        path,
                        required,
                        want
                    );
                    want = required;
                    reread = true;
                }
                Err(err @ FooterError::Truncated { .. }) | Err(err @ FooterError::Corrupt(_)) => {
                    return Err(ValidationError::CorruptFooter {
                        path: path.to_string(),
                        reason: err.to_string(),
                    });
                }
                Err(FooterError::Unsupported(reason)) => {
                    return Err(ValidationError::UnsupportedFormat {
                        path: path.to_string(),
                        reason: format!("{} file uses unsupported {}", parser.format(), reason),
                    });
                }
                Err(FooterError::BadMagic(reason)) => {
                    return Err(ValidationError::UnsupportedFormat {
                        path: path.to_string(),
                        reason: format!("not a {} file: {}", parser.format(), reason),
                    });
                }
            }
        }
    }
}

fn unavailable(path: &str, err: crate::store::StoreError) -> ValidationError {
    ValidationError::ObjectUnavailable {
        path: path.to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::footer::FooterParser;
    use crate::footer::tests::parquet_bytes;
    use crate::memory::MemoryStore;
    use std::sync::Arc;

    const SCHEMA: &str =
        "message schema { REQUIRED INT64 id; REQUIRED INT64 ts; REQUIRED DOUBLE amount; }";

    #[tokio::test]
    async fn test_reads_only_the_tail() {
        let store = MemoryStore::new();
        // pad the front so the object is larger than the tail read
        let mut data = vec![0u8; 2 * DEFAULT_FOOTER_TAIL_BYTES as usize];
        data.extend_from_slice(&parquet_bytes(SCHEMA));
        let size = data.len() as u64;
        store.put_object("repo", "main", "t/a.parquet", data).await;

        let formats = FormatRegistry::with_defaults();
        let accessor = MetadataAccessor::new(&store, &formats, "repo", DEFAULT_FOOTER_TAIL_BYTES);
        let meta = accessor.read_metadata("main", "t/a.parquet").await.unwrap();
        assert_eq!(meta.column_names, vec!["id", "ts", "amount"]);
        assert_eq!(store.range_reads(), 1);
        assert_eq!(store.bytes_read(), DEFAULT_FOOTER_TAIL_BYTES);
        assert!(store.bytes_read() < size);
    }

    #[tokio::test]
    async fn test_short_first_read_is_retried_once() {
        let store = MemoryStore::new();
        let file = parquet_bytes(SCHEMA);
        let size = file.len() as u64;
        store.put_object("repo", "main", "t/a.parquet", file).await;

        let formats = FormatRegistry::with_defaults();
        let accessor = MetadataAccessor::new(&store, &formats, "repo", 16);
        let meta = accessor
            .read_metadata_sized("main", "t/a.parquet", Some(size))
            .await
            .unwrap();
        assert_eq!(meta.column_names.len(), 3);
        assert_eq!(store.range_reads(), 2);
        assert!(store.bytes_read() < size + 16);
    }

    /// Always claims it needs one more byte than it got.
    struct Greedy;

    impl FooterParser for Greedy {
        fn format(&self) -> &'static str {
            "greedy"
        }

        fn parse(&self, tail: &[u8], _object_size: u64) -> std::result::Result<ObjectMetadata, FooterError> {
            Err(FooterError::Truncated {
                required: tail.len() as u64 + 1,
                available: tail.len() as u64,
            })
        }
    }

    #[tokio::test]
    async fn test_reread_is_bounded() {
        let store = MemoryStore::new();
        store.put_object("repo", "main", "x.greedy", vec![1u8; 100]).await;

        let mut formats = FormatRegistry::empty();
        formats.register("greedy", Arc::new(Greedy));
        let accessor = MetadataAccessor::new(&store, &formats, "repo", 10);
        let err = accessor.read_metadata("main", "x.greedy").await.unwrap_err();
        assert!(matches!(err, ValidationError::CorruptFooter { .. }), "got {:?}", err);
        assert_eq!(store.range_reads(), 2);
    }

    #[tokio::test]
    async fn test_unsupported_and_unavailable() {
        let store = MemoryStore::new();
        store.put_object("repo", "main", "t/data.csv", b"a,b\n".to_vec()).await;
        store.put_object("repo", "main", "t/fake.parquet", b"not parquet at all".to_vec()).await;

        let formats = FormatRegistry::with_defaults();
        let accessor = MetadataAccessor::new(&store, &formats, "repo", 1024);

        let err = accessor.read_metadata("main", "t/data.csv").await.unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedFormat { .. }));

        let err = accessor.read_metadata("main", "t/fake.parquet").await.unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedFormat { .. }));

        let err = accessor.read_metadata("main", "t/missing.parquet").await.unwrap_err();
        assert!(matches!(err, ValidationError::ObjectUnavailable { .. }));
    }
}
