//! Apache ORC footer parser
//!
//! File tail layout: `... | Footer | PostScript | ps_len: u8`. The PostScript
//! is never compressed. The Footer is compressed with the codec named in the
//! PostScript, as a sequence of chunks each prefixed by a 3-byte
//! little-endian header `(chunk_len << 1) | is_original`.

use std::borrow::Cow;
use std::io::Read;

use prost::Message;

use crate::footer::{FooterError, FooterParser};
use crate::metadata::ObjectMetadata;

const ORC_MAGIC: &str = "ORC";
const CHUNK_HEADER_LEN: usize = 3;
/// `Type.Kind.STRUCT`
const STRUCT_KIND: i32 = 12;

#[derive(Clone, PartialEq, Message)]
pub(crate) struct PostScript {
    #[prost(uint64, optional, tag = "1")]
    pub footer_length: Option<u64>,
    /// `CompressionKind`
    #[prost(int32, optional, tag = "2")]
    pub compression: Option<i32>,
    #[prost(uint64, optional, tag = "3")]
    pub compression_block_size: Option<u64>,
    #[prost(string, optional, tag = "8000")]
    pub magic: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub(crate) struct Footer {
    #[prost(message, repeated, tag = "4")]
    pub types: Vec<OrcType>,
    #[prost(uint64, optional, tag = "6")]
    pub number_of_rows: Option<u64>,
}

#[derive(Clone, PartialEq, Message)]
pub(crate) struct OrcType {
    #[prost(int32, optional, tag = "1")]
    pub kind: Option<i32>,
    #[prost(uint32, repeated, packed = "true", tag = "2")]
    pub subtypes: Vec<u32>,
    #[prost(string, repeated, tag = "3")]
    pub field_names: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
enum Codec {
    Zlib,
    Zstd,
}

/// Apache ORC footer parser
#[derive(Debug, Default, Clone, Copy)]
pub struct OrcFooterParser;

impl FooterParser for OrcFooterParser {
    fn format(&self) -> &'static str {
        "orc"
    }

    fn parse(&self, tail: &[u8], object_size: u64) -> Result<ObjectMetadata, FooterError> {
        let available = tail.len() as u64;
        let Some(&ps_len) = tail.last() else {
            return Err(FooterError::Truncated { required: 1, available });
        };
        let ps_len = u64::from(ps_len);
        if ps_len == 0 || ps_len + 1 + ORC_MAGIC.len() as u64 > object_size {
            return Err(FooterError::BadMagic(format!(
                "postscript length {} does not fit an object of {} bytes",
                ps_len, object_size
            )));
        }
        if available < ps_len + 1 {
            return Err(FooterError::Truncated {
                required: ps_len + 1,
                available,
            });
        }

        let ps_end = tail.len() - 1;
        let ps_start = ps_end - ps_len as usize;
        let postscript = PostScript::decode(&tail[ps_start..ps_end])
            .map_err(|e| FooterError::BadMagic(format!("no ORC postscript: {}", e)))?;
        if postscript.magic.as_deref() != Some(ORC_MAGIC) {
            return Err(FooterError::BadMagic(format!(
                "expected {:?} in postscript, found {:?}",
                ORC_MAGIC, postscript.magic
            )));
        }

        let footer_len = postscript.footer_length.unwrap_or(0);
        let required = footer_len + ps_len + 1;
        // leading magic + tail must fit in the object
        if required + ORC_MAGIC.len() as u64 > object_size {
            return Err(FooterError::Corrupt(format!(
                "footer length {} exceeds object size {}",
                footer_len, object_size
            )));
        }
        if available < required {
            return Err(FooterError::Truncated { required, available });
        }

        let raw = &tail[ps_start - footer_len as usize..ps_start];
        let footer_bytes = decompress(postscript.compression.unwrap_or(0), raw)?;
        let footer = Footer::decode(footer_bytes.as_ref())
            .map_err(|e| FooterError::Corrupt(format!("ORC footer: {}", e)))?;

        let root = footer
            .types
            .first()
            .ok_or_else(|| FooterError::Corrupt("ORC footer has no types".to_string()))?;
        if root.kind != Some(STRUCT_KIND) {
            return Err(FooterError::Corrupt(format!(
                "ORC root type is not a struct (kind {:?})",
                root.kind
            )));
        }

        Ok(ObjectMetadata {
            column_names: root.field_names.clone(),
            row_count: footer.number_of_rows.unwrap_or(0),
        })
    }
}

fn decompress(kind: i32, data: &[u8]) -> Result<Cow<'_, [u8]>, FooterError> {
    let codec = match kind {
        0 => return Ok(Cow::Borrowed(data)),
        1 => Codec::Zlib,
        5 => Codec::Zstd,
        2 => return Err(FooterError::Unsupported("compression 'snappy'".to_string())),
        3 => return Err(FooterError::Unsupported("compression 'lzo'".to_string())),
        4 => return Err(FooterError::Unsupported("compression 'lz4'".to_string())),
        other => return Err(FooterError::Corrupt(format!("unknown ORC compression kind {}", other))),
    };

    let mut out = Vec::new();
    let mut rest = data;
    while !rest.is_empty() {
        if rest.len() < CHUNK_HEADER_LEN {
            return Err(FooterError::Corrupt("truncated ORC chunk header".to_string()));
        }
        let header = u32::from_le_bytes([rest[0], rest[1], rest[2], 0]);
        let len = (header >> 1) as usize;
        let chunk = rest
            .get(CHUNK_HEADER_LEN..CHUNK_HEADER_LEN + len)
            .ok_or_else(|| FooterError::Corrupt(format!("ORC chunk of {} bytes overruns footer", len)))?;

        if header & 1 == 1 {
            out.extend_from_slice(chunk);
        } else {
            match codec {
                Codec::Zlib => {
                    flate2::read::DeflateDecoder::new(chunk)
                        .read_to_end(&mut out)
                        .map_err(|e| FooterError::Corrupt(format!("ORC zlib chunk: {}", e)))?;
                }
                Codec::Zstd => {
                    let decoded = zstd::decode_all(chunk)
                        .map_err(|e| FooterError::Corrupt(format!("ORC zstd chunk: {}", e)))?;
                    out.extend_from_slice(&decoded);
                }
            }
        }
        rest = &rest[CHUNK_HEADER_LEN + len..];
    }
    Ok(Cow::Owned(out))
}
