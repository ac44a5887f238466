//! Schema column blacklist rule
//!
//! Reads the footer of every columnar object written under `prefix` and
//! rejects columns whose name starts with a disallowed prefix. Objects
//! without a registered footer parser are skipped. Footer reads run
//! concurrently, bounded by the engine fan-out.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use super::{RuleContext, Verdict, Violation};
use crate::diff::Diff;
use crate::error::{Result, ValidationError};
use crate::metadata::{MetadataAccessor, ObjectMetadata};
use crate::params::Params;
use crate::path;

pub const NAME: &str = "schema";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaRule {
    /// Disallowed column-name prefixes
    pub disallow: Vec<String>,
    #[serde(default)]
    pub prefix: String,
}

impl SchemaRule {
    pub fn new<S: Into<String>>(disallow: impl IntoIterator<Item = S>, prefix: &str) -> Self {
        Self {
            disallow: disallow.into_iter().map(Into::into).collect(),
            prefix: prefix.to_string(),
        }
    }

    pub fn from_params(params: &Params) -> Result<Self> {
        params.expect_only(&["disallow", "prefix"])?;
        Self {
            disallow: params.get_list("disallow"),
            prefix: params.get_single("prefix")?.unwrap_or_default().to_string(),
        }
        .validated()
    }

    pub fn validated(self) -> Result<Self> {
        // an empty prefix would match every column
        let disallow: Vec<String> = self.disallow.into_iter().filter(|p| !p.is_empty()).collect();
        if disallow.is_empty() {
            return Err(ValidationError::config(
                "schema rule needs at least one non-empty 'disallow' prefix",
            ));
        }
        Ok(Self {
            disallow,
            prefix: self.prefix,
        })
    }

    /// First disallowed prefix matching `column`, if any.
    pub fn disallowed_by(&self, column: &str) -> Option<&str> {
        self.disallow
            .iter()
            .find(|p| column.starts_with(p.as_str()))
            .map(String::as_str)
    }

    pub async fn evaluate(&self, diff: &Diff, ctx: &RuleContext<'_>) -> Verdict {
        let accessor = MetadataAccessor::new(
            ctx.store,
            ctx.formats,
            ctx.repo,
            ctx.settings.footer_tail_bytes,
        );
        let candidates: Vec<(String, Option<u64>)> = diff
            .writes_under(&self.prefix)
            .filter(|e| ctx.formats.supports(&path::extension(&e.path)))
            .map(|e| (e.path.clone(), e.size_bytes))
            .collect();
        tracing::debug!(
            "schema rule: reading {} footer(s) under '{}'",
            candidates.len(),
            self.prefix
        );

        let accessor = &accessor;
        let source = ctx.refs.source.as_str();
        let results: Vec<(String, Result<ObjectMetadata>)> = stream::iter(candidates)
            .map(|(object_path, size)| async move {
                let metadata = accessor.read_metadata_sized(source, &object_path, size).await;
                (object_path, metadata)
            })
            .buffer_unordered(ctx.settings.fanout.max(1))
            .collect()
            .await;

        let mut violations = Vec::new();
        for (object_path, metadata) in results {
            match metadata {
                Ok(metadata) => {
                    for column in &metadata.column_names {
                        if let Some(prefix) = self.disallowed_by(column) {
                            violations.push(Violation::new(
                                NAME,
                                &object_path,
                                format!(
                                    "column name not allowed: {} (disallowed prefix '{}')",
                                    column, prefix
                                ),
                            ));
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!("schema rule could not read {}: {}", object_path, err);
                    violations.push(Violation::from_error(NAME, &object_path, &err));
                }
            }
        }
        Verdict::from_violations(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::diff::DiffEntry;
    use crate::event::ResolvedRefs;
    use crate::footer::FormatRegistry;
    use crate::memory::MemoryStore;
    use crate::orc::tests::orc_bytes;

    #[test]
    fn test_disallowed_by() {
        let rule = SchemaRule::new(["user_", "private_"], "").validated().unwrap();
        assert_eq!(rule.disallowed_by("user_id"), Some("user_"));
        assert_eq!(rule.disallowed_by("private_email"), Some("private_"));
        assert_eq!(rule.disallowed_by("amount"), None);
    }

    #[test]
    fn test_from_params() {
        let rule = SchemaRule::from_params(&Params::parse("disallow=user_&disallow=private_&prefix=public/"))
            .unwrap();
        assert_eq!(rule.disallow, vec!["user_", "private_"]);
        assert_eq!(rule.prefix, "public/");

        assert!(SchemaRule::from_params(&Params::parse("prefix=public/")).is_err());
        assert!(SchemaRule::from_params(&Params::parse("disallow=")).is_err());
    }

    #[tokio::test]
    async fn test_orc_columns_are_checked() {
        let store = MemoryStore::new();
        let users = orc_bytes(&["user_id", "amount"], 10);
        let events = orc_bytes(&["id", "ts"], 10);
        store.put_object("repo", "main", "public/users.orc", users.clone()).await;
        store.put_object("repo", "main", "public/events.orc", events.clone()).await;

        let diff = Diff::new(
            "main",
            "main",
            vec![
                DiffEntry::added("public/events.orc", events.len() as u64),
                DiffEntry::added("public/users.orc", users.len() as u64),
            ],
        );
        let formats = FormatRegistry::with_defaults();
        let settings = EngineConfig::default();
        let refs = ResolvedRefs::uncommitted("main");
        let ctx = RuleContext {
            store: &store,
            formats: &formats,
            settings: &settings,
            repo: "repo",
            refs: &refs,
            commit_metadata: None,
        };

        let verdict = SchemaRule::new(["user_"], "public/").evaluate(&diff, &ctx).await;
        assert!(!verdict.accepted);
        assert_eq!(verdict.violations.len(), 1);
        assert_eq!(verdict.violations[0].path, "public/users.orc");
        assert!(verdict.message.contains("user_id"), "{}", verdict.message);
    }
}
