//! Commit metadata rule
//!
//! A commit that writes under `prefix` must carry every required metadata
//! field with a non-empty value. Metadata sent with the event is used as-is;
//! otherwise it is read from the source ref's commit.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use super::{RuleContext, Verdict, Violation};
use crate::diff::Diff;
use crate::error::{Result, ValidationError};
use crate::params::Params;

pub const NAME: &str = "commit_metadata";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMetadataRule {
    #[serde(default)]
    pub prefix: String,
    /// Required metadata keys, in report order
    pub fields: Vec<String>,
}

impl CommitMetadataRule {
    pub fn new<S: Into<String>>(fields: impl IntoIterator<Item = S>, prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_params(params: &Params) -> Result<Self> {
        params.expect_only(&["fields", "prefix"])?;
        Self {
            prefix: params.get_single("prefix")?.unwrap_or_default().to_string(),
            fields: params.get_list("fields"),
        }
        .validated()
    }

    pub fn validated(self) -> Result<Self> {
        let mut fields: Vec<String> = Vec::with_capacity(self.fields.len());
        for field in self.fields {
            let field = field.trim().to_string();
            if !field.is_empty() && !fields.contains(&field) {
                fields.push(field);
            }
        }
        if fields.is_empty() {
            return Err(ValidationError::config(
                "commit metadata rule needs at least one 'fields' entry",
            ));
        }
        Ok(Self {
            prefix: self.prefix,
            fields,
        })
    }

    pub async fn evaluate(&self, diff: &Diff, ctx: &RuleContext<'_>) -> Verdict {
        if diff.under(&self.prefix).next().is_none() {
            return Verdict::accept();
        }

        let metadata = match ctx.commit_metadata {
            Some(metadata) => Cow::Borrowed(metadata),
            None => match ctx.store.commit_metadata(ctx.repo, &ctx.refs.source).await {
                Ok(metadata) => Cow::Owned(metadata),
                Err(e) => {
                    let err = ValidationError::CommitMetadataUnavailable {
                        reference: ctx.refs.source.clone(),
                        reason: e.to_string(),
                    };
                    tracing::warn!("{}", err);
                    return Verdict::from_violations(vec![Violation::from_error(NAME, &self.prefix, &err)]);
                }
            },
        };

        let violations = self
            .fields
            .iter()
            .filter_map(|field| match metadata.get(field) {
                None => Some(format!("missing commit metadata field: {}", field)),
                Some(value) if value.is_empty() => Some(format!("commit metadata field is empty: {}", field)),
                Some(_) => None,
            })
            .map(|error| Violation::new(NAME, &self.prefix, error))
            .collect();
        Verdict::from_violations(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_params_dedups_fields() {
        let rule = CommitMetadataRule::from_params(&Params::parse(
            "prefix=data/daily/&fields=job_id&fields=owning_team&fields=job_id",
        ))
        .unwrap();
        assert_eq!(rule.fields, vec!["job_id", "owning_team"]);
        assert_eq!(rule.prefix, "data/daily/");
    }

    #[test]
    fn test_fields_required() {
        let err = CommitMetadataRule::from_params(&Params::parse("prefix=data/")).unwrap_err();
        assert!(err.is_configuration());
    }
}
