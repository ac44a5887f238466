//! Acceptance rules
//!
//! The rule catalog is closed: every rule kind is a variant of [`Rule`] and
//! is evaluated through [`Rule::evaluate`]. A rule never fails; external
//! errors become rejections that name what could not be checked.

pub mod commit_metadata;
pub mod dirty;
pub mod format;
pub mod schema;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use commit_metadata::CommitMetadataRule;
pub use dirty::DirtyCheckRule;
pub use format::FormatRule;
pub use schema::SchemaRule;

use crate::config::EngineConfig;
use crate::diff::Diff;
use crate::error::{Result, ValidationError};
use crate::event::ResolvedRefs;
use crate::footer::FormatRegistry;
use crate::params::Params;
use crate::store::VersionedStore;

/// One reason a rule rejected a change
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Violation {
    pub path: String,
    pub error: String,
    pub rule: &'static str,
}

impl Violation {
    pub fn new(rule: &'static str, path: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            rule,
            path: path.into(),
            error: error.into(),
        }
    }

    /// Fail-closed violation for an external error.
    pub fn from_error(rule: &'static str, fallback_path: &str, err: &ValidationError) -> Self {
        Self::new(rule, err.subject().unwrap_or(fallback_path), err.to_string())
    }
}

/// Outcome of evaluating one rule or rule set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub accepted: bool,
    pub message: String,
    #[serde(rename = "errors")]
    pub violations: Vec<Violation>,
}

impl Verdict {
    pub fn accept() -> Self {
        Self {
            accepted: true,
            message: "accepted".to_string(),
            violations: Vec::new(),
        }
    }

    /// Accepts when `violations` is empty; otherwise the message lists each
    /// violation as `path: error`, sorted by path.
    pub fn from_violations(mut violations: Vec<Violation>) -> Self {
        if violations.is_empty() {
            return Self::accept();
        }
        violations.sort();
        violations.dedup();
        let message = violations
            .iter()
            .map(|v| {
                let path = if v.path.is_empty() { "<repository root>" } else { v.path.as_str() };
                format!("{}: {}", path, v.error)
            })
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            accepted: false,
            message,
            violations,
        }
    }

    /// Logical AND of several verdicts.
    pub fn all(verdicts: impl IntoIterator<Item = Verdict>) -> Self {
        Self::from_violations(verdicts.into_iter().flat_map(|v| v.violations).collect())
    }
}

/// Everything a rule may read besides the diff
pub struct RuleContext<'a> {
    pub store: &'a dyn VersionedStore,
    pub formats: &'a FormatRegistry,
    pub settings: &'a EngineConfig,
    pub repo: &'a str,
    pub refs: &'a ResolvedRefs,
    /// Commit metadata carried by the event, if any
    pub commit_metadata: Option<&'a BTreeMap<String, String>>,
}

/// A configured acceptance rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Rule {
    Format(FormatRule),
    Schema(SchemaRule),
    DirtyCheck(DirtyCheckRule),
    CommitMetadata(CommitMetadataRule),
}

impl Rule {
    /// Endpoint / config name of the rule kind
    pub fn name(&self) -> &'static str {
        match self {
            Rule::Format(_) => format::NAME,
            Rule::Schema(_) => schema::NAME,
            Rule::DirtyCheck(_) => dirty::NAME,
            Rule::CommitMetadata(_) => commit_metadata::NAME,
        }
    }

    pub fn prefix(&self) -> &str {
        match self {
            Rule::Format(r) => &r.prefix,
            Rule::Schema(r) => &r.prefix,
            Rule::DirtyCheck(r) => &r.prefix,
            Rule::CommitMetadata(r) => &r.prefix,
        }
    }

    /// Build a rule of kind `kind` from hook URL parameters.
    pub fn from_params(kind: &str, params: &Params) -> Result<Rule> {
        match kind {
            format::NAME => FormatRule::from_params(params).map(Rule::Format),
            schema::NAME => SchemaRule::from_params(params).map(Rule::Schema),
            dirty::NAME => DirtyCheckRule::from_params(params).map(Rule::DirtyCheck),
            commit_metadata::NAME => CommitMetadataRule::from_params(params).map(Rule::CommitMetadata),
            other => Err(ValidationError::config(format!("unknown rule '{}'", other))),
        }
    }

    /// Check and normalize options; every constructor path ends here.
    pub fn validated(self) -> Result<Rule> {
        Ok(match self {
            Rule::Format(r) => Rule::Format(r.validated()?),
            Rule::Schema(r) => Rule::Schema(r.validated()?),
            Rule::DirtyCheck(r) => Rule::DirtyCheck(r),
            Rule::CommitMetadata(r) => Rule::CommitMetadata(r.validated()?),
        })
    }

    pub async fn evaluate(&self, diff: &Diff, ctx: &RuleContext<'_>) -> Verdict {
        match self {
            Rule::Format(r) => r.evaluate(diff),
            Rule::Schema(r) => r.evaluate(diff, ctx).await,
            Rule::DirtyCheck(r) => r.evaluate(diff, ctx).await,
            Rule::CommitMetadata(r) => r.evaluate(diff, ctx).await,
        }
    }
}

/// Rules evaluated together; accepts only if every rule accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Result<Self> {
        if rules.is_empty() {
            return Err(ValidationError::config("rule set is empty"));
        }
        let rules = rules
            .into_iter()
            .map(Rule::validated)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn single(rule: Rule) -> Result<Self> {
        Self::new(vec![rule])
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Longest common prefix of the rules' prefixes; the diff is fetched
    /// under it once and each rule narrows it further.
    pub fn diff_prefix(&self) -> String {
        let mut prefixes = self.rules.iter().map(Rule::prefix);
        let Some(first) = prefixes.next() else {
            return String::new();
        };
        let mut common = first.to_string();
        for prefix in prefixes {
            let len = common
                .char_indices()
                .zip(prefix.chars())
                .take_while(|((_, a), b)| a == b)
                .last()
                .map(|((i, c), _)| i + c.len_utf8())
                .unwrap_or(0);
            common.truncate(len);
        }
        common
    }

    pub async fn evaluate(&self, diff: &Diff, ctx: &RuleContext<'_>) -> Verdict {
        let mut verdicts = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            let verdict = rule.evaluate(diff, ctx).await;
            tracing::debug!(
                "rule {} (prefix '{}'): {}",
                rule.name(),
                rule.prefix(),
                if verdict.accepted { "accepted" } else { "rejected" }
            );
            verdicts.push(verdict);
        }
        Verdict::all(verdicts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_message_lists_violations() {
        let verdict = Verdict::from_violations(vec![
            Violation::new("format", "p/b.csv", "file format not allowed"),
            Violation::new("format", "p/a.csv", "file format not allowed"),
        ]);
        assert!(!verdict.accepted);
        assert_eq!(
            verdict.message,
            "p/a.csv: file format not allowed\np/b.csv: file format not allowed"
        );
        assert!(Verdict::from_violations(vec![]).accepted);
    }

    #[test]
    fn test_all_is_logical_and() {
        let ok = Verdict::accept();
        let bad = Verdict::from_violations(vec![Violation::new("schema", "x", "nope")]);
        assert!(Verdict::all(vec![ok.clone(), ok.clone()]).accepted);
        let combined = Verdict::all(vec![ok, bad]);
        assert!(!combined.accepted);
        assert_eq!(combined.violations.len(), 1);
    }

    #[test]
    fn test_from_params_dispatch() {
        let params = Params::parse("prefix=hive/");
        let rule = Rule::from_params("dirty_check", &params).unwrap();
        assert_eq!(rule.name(), "dirty_check");
        assert_eq!(rule.prefix(), "hive/");
        assert!(Rule::from_params("nope", &params).unwrap_err().is_configuration());
    }

    #[test]
    fn test_diff_prefix_is_common_prefix() {
        let set = RuleSet::new(vec![
            Rule::DirtyCheck(DirtyCheckRule::new("tables/hive/")),
            Rule::Format(FormatRule::new(["parquet"], "tables/raw/")),
        ])
        .unwrap();
        assert_eq!(set.diff_prefix(), "tables/");
        assert!(RuleSet::new(vec![]).is_err());
    }

    #[test]
    fn test_rules_deserialize_from_tagged_form() {
        let rules: Vec<Rule> = serde_json::from_str(
            r#"[
                {"rule": "format", "allow": ["parquet"], "prefix": "production/"},
                {"rule": "commit_metadata", "fields": ["job_id"]}
            ]"#,
        )
        .unwrap();
        assert_eq!(rules[0].name(), "format");
        assert_eq!(rules[1].prefix(), "");
    }
}
