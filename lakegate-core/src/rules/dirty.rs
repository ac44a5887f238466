//! Partition dirty-check rule
//!
//! Rejects a change that leaves any partition under `prefix` partially
//! rewritten. A partition that could not be listed is rejected as well.

use serde::{Deserialize, Serialize};

use super::{RuleContext, Verdict, Violation};
use crate::diff::Diff;
use crate::error::Result;
use crate::params::Params;
use crate::partition::{PartitionClassifier, PartitionVerdict};

pub const NAME: &str = "dirty_check";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DirtyCheckRule {
    #[serde(default)]
    pub prefix: String,
}

impl DirtyCheckRule {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    pub fn from_params(params: &Params) -> Result<Self> {
        params.expect_only(&["prefix"])?;
        Ok(Self::new(params.get_single("prefix")?.unwrap_or_default()))
    }

    pub async fn evaluate(&self, diff: &Diff, ctx: &RuleContext<'_>) -> Verdict {
        let classifier = PartitionClassifier::new(
            ctx.store,
            ctx.repo,
            &ctx.refs.baseline,
            ctx.settings.page_size,
            ctx.settings.fanout,
        );
        let reports = classifier.classify(diff, &self.prefix).await;

        let mut violations = Vec::new();
        for (key, report) in &reports {
            match report {
                Ok(report) if report.verdict == PartitionVerdict::Dirty => {
                    violations.push(Violation::new(NAME, key, report.describe()));
                }
                Ok(report) => tracing::debug!("{}", report.describe()),
                Err(err) => {
                    tracing::warn!("dirty check could not classify {}: {}", key, err);
                    violations.push(Violation::from_error(NAME, key, err));
                }
            }
        }
        Verdict::from_violations(violations)
    }
}
