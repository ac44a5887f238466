//! Format allow-list rule
//!
//! Every object written under `prefix` must have one of the allowed
//! extensions. Hadoop-hidden objects (`_SUCCESS`, `.crc` files) are not data
//! and are skipped. The token `delta_lake` allows a Delta Lake transaction
//! log (`_delta_log/*.json` and checkpoint `.parquet` files).

use serde::{Deserialize, Serialize};

use super::{Verdict, Violation};
use crate::diff::Diff;
use crate::error::{Result, ValidationError};
use crate::params::Params;
use crate::path;

pub const NAME: &str = "format";

const DELTA_LAKE: &str = "delta_lake";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatRule {
    /// Allowed extensions (lowercase, no leading dot) or `delta_lake`
    pub allow: Vec<String>,
    #[serde(default)]
    pub prefix: String,
}

impl FormatRule {
    pub fn new<S: Into<String>>(allow: impl IntoIterator<Item = S>, prefix: &str) -> Self {
        Self {
            allow: allow.into_iter().map(Into::into).collect(),
            prefix: prefix.to_string(),
        }
    }

    pub fn from_params(params: &Params) -> Result<Self> {
        params.expect_only(&["allow", "prefix"])?;
        Self {
            allow: params.get_list("allow"),
            prefix: params.get_single("prefix")?.unwrap_or_default().to_string(),
        }
        .validated()
    }

    pub fn validated(self) -> Result<Self> {
        let allow: Vec<String> = self
            .allow
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        if allow.is_empty() {
            return Err(ValidationError::config(
                "format rule needs at least one 'allow' extension",
            ));
        }
        Ok(Self {
            allow,
            prefix: self.prefix,
        })
    }

    /// Whether an object at `path` has an allowed format.
    pub fn allows(&self, object_path: &str) -> bool {
        let extension = path::extension(object_path);
        self.allow.iter().any(|token| {
            if token == DELTA_LAKE {
                path::is_delta_lake_log(object_path)
            } else {
                *token == extension
            }
        })
    }

    pub fn evaluate(&self, diff: &Diff) -> Verdict {
        let violations = diff
            .writes_under(&self.prefix)
            .filter(|e| !path::is_hadoop_hidden(&e.path))
            .filter(|e| !self.allows(&e.path))
            .map(|e| {
                let extension = path::extension(&e.path);
                let found = if extension.is_empty() {
                    "no extension".to_string()
                } else {
                    format!("'{}'", extension)
                };
                Violation::new(
                    NAME,
                    &e.path,
                    format!(
                        "file format not allowed: {} (allowed: {})",
                        found,
                        self.allow.join(", ")
                    ),
                )
            })
            .collect();
        Verdict::from_violations(violations)
    }
}
