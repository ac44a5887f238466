//! Columnar footer parsers
//!
//! A parser receives the trailing bytes of an object and either produces the
//! object's [`ObjectMetadata`] or tells the caller how many trailing bytes it
//! actually needs.

use std::collections::HashMap;
use std::sync::Arc;

use crate::metadata::ObjectMetadata;
use crate::orc::OrcFooterParser;

/// Footer parse failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FooterError {
    /// The tail is shorter than the footer; `required` trailing bytes are needed
    #[error("footer needs {required} trailing bytes, got {available}")]
    Truncated { required: u64, available: u64 },

    #[error("bad magic bytes: {0}")]
    BadMagic(String),

    #[error("{0}")]
    Corrupt(String),

    /// Valid file using a feature the parser cannot read
    #[error("unsupported {0}")]
    Unsupported(String),
}

/// Reads column names and row count from an object's trailing bytes
pub trait FooterParser: Send + Sync {
    /// Short format name used in messages
    fn format(&self) -> &'static str;

    /// Parse `tail`, the last `tail.len()` bytes of an object of
    /// `object_size` bytes.
    fn parse(&self, tail: &[u8], object_size: u64) -> Result<ObjectMetadata, FooterError>;
}

const PARQUET_MAGIC: &[u8; 4] = b"PAR1";
/// 4-byte little-endian metadata length followed by the magic
const PARQUET_TRAILER_LEN: u64 = 8;

/// Apache Parquet footer parser
#[derive(Debug, Default, Clone, Copy)]
pub struct ParquetFooterParser;

impl FooterParser for ParquetFooterParser {
    fn format(&self) -> &'static str {
        "parquet"
    }

    fn parse(&self, tail: &[u8], object_size: u64) -> Result<ObjectMetadata, FooterError> {
        let available = tail.len() as u64;
        if available < PARQUET_TRAILER_LEN {
            return Err(FooterError::Truncated {
                required: PARQUET_TRAILER_LEN,
                available,
            });
        }

        let trailer = &tail[tail.len() - PARQUET_TRAILER_LEN as usize..];
        if &trailer[4..] != PARQUET_MAGIC {
            return Err(FooterError::BadMagic(format!(
                "expected {:?}, found {:?}",
                String::from_utf8_lossy(PARQUET_MAGIC),
                String::from_utf8_lossy(&trailer[4..])
            )));
        }

        let metadata_len = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]) as u64;
        let required = metadata_len + PARQUET_TRAILER_LEN;
        // leading magic + footer must fit in the object
        if required + PARQUET_MAGIC.len() as u64 > object_size {
            return Err(FooterError::Corrupt(format!(
                "footer length {} exceeds object size {}",
                metadata_len, object_size
            )));
        }
        if available < required {
            return Err(FooterError::Truncated { required, available });
        }

        let start = (available - required) as usize;
        let end = tail.len() - PARQUET_TRAILER_LEN as usize;
        let metadata = parquet::file::footer::decode_metadata(&tail[start..end])
            .map_err(|e| FooterError::Corrupt(e.to_string()))?;

        let file_metadata = metadata.file_metadata();
        let column_names = file_metadata
            .schema()
            .get_fields()
            .iter()
            .map(|field| field.name().to_string())
            .collect();

        Ok(ObjectMetadata {
            column_names,
            row_count: file_metadata.num_rows().max(0) as u64,
        })
    }
}

/// Maps lowercase file extensions to footer parsers
#[derive(Clone, Default)]
pub struct FormatRegistry {
    parsers: HashMap<String, Arc<dyn FooterParser>>,
}

impl FormatRegistry {
    /// Registry without any parser
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the built-in parsers (`parquet`, `orc`)
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("parquet", Arc::new(ParquetFooterParser));
        registry.register("orc", Arc::new(OrcFooterParser));
        registry
    }

    pub fn register(&mut self, extension: &str, parser: Arc<dyn FooterParser>) {
        self.parsers.insert(extension.to_ascii_lowercase(), parser);
    }

    pub fn get(&self, extension: &str) -> Option<Arc<dyn FooterParser>> {
        self.parsers.get(&extension.to_ascii_lowercase()).cloned()
    }

    pub fn supports(&self, extension: &str) -> bool {
        self.parsers.contains_key(&extension.to_ascii_lowercase())
    }
}

impl std::fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut extensions: Vec<_> = self.parsers.keys().collect();
        extensions.sort();
        f.debug_struct("FormatRegistry")
            .field("extensions", &extensions)
            .finish()
    }
}
