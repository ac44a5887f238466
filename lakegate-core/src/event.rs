//! Hook events sent by the store's hook dispatcher

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, ValidationError};

/// Lifecycle event a hook is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    PreCommit,
    PreMerge,
    #[serde(other)]
    Unsupported,
}

/// Webhook payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookEvent {
    pub event_type: EventType,
    #[serde(default)]
    pub event_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub action_name: String,
    #[serde(default)]
    pub hook_id: String,
    pub repository_id: String,
    pub branch_id: String,
    #[serde(default)]
    pub source_ref: Option<String>,
    #[serde(default)]
    pub commit_message: String,
    #[serde(default)]
    pub committer: String,
    #[serde(default)]
    pub commit_metadata: Option<BTreeMap<String, String>>,
}

/// Refs a request is evaluated against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRefs {
    /// Where the new content lives
    pub source: String,
    /// Branch the change lands on
    pub destination: String,
    /// Ref whose listings describe the state before the change
    pub baseline: String,
}

impl ResolvedRefs {
    /// Pre-commit: uncommitted changes of `branch` against its last commit.
    pub fn uncommitted(branch: &str) -> Self {
        Self {
            source: branch.to_string(),
            destination: branch.to_string(),
            baseline: format!("{}@", branch),
        }
    }

    /// Pre-merge: `source` merged into `destination`.
    pub fn merge(source: &str, destination: &str) -> Self {
        Self {
            source: source.to_string(),
            destination: destination.to_string(),
            baseline: destination.to_string(),
        }
    }
}

impl HookEvent {
    /// Minimal pre-merge event.
    pub fn pre_merge(repo: &str, branch: &str, source_ref: &str) -> Self {
        Self {
            event_type: EventType::PreMerge,
            event_time: None,
            action_name: String::new(),
            hook_id: String::new(),
            repository_id: repo.to_string(),
            branch_id: branch.to_string(),
            source_ref: Some(source_ref.to_string()),
            commit_message: String::new(),
            committer: String::new(),
            commit_metadata: None,
        }
    }

    /// Minimal pre-commit event.
    pub fn pre_commit(repo: &str, branch: &str, metadata: Option<BTreeMap<String, String>>) -> Self {
        Self {
            event_type: EventType::PreCommit,
            source_ref: Some(branch.to_string()),
            commit_metadata: metadata,
            ..Self::pre_merge(repo, branch, branch)
        }
    }

    /// Work out which refs to diff and list.
    pub fn resolve_refs(&self) -> Result<ResolvedRefs> {
        if self.repository_id.is_empty() {
            return Err(ValidationError::config("event has no repository_id"));
        }
        if self.branch_id.is_empty() {
            return Err(ValidationError::config("event has no branch_id"));
        }
        match self.event_type {
            EventType::PreCommit => Ok(ResolvedRefs::uncommitted(&self.branch_id)),
            EventType::PreMerge => match self.source_ref.as_deref() {
                Some(source) if !source.is_empty() => Ok(ResolvedRefs::merge(source, &self.branch_id)),
                _ => Err(ValidationError::config("pre-merge event has no source_ref")),
            },
            EventType::Unsupported => Err(ValidationError::config(
                "unsupported event type; attach this hook to pre-commit or pre-merge",
            )),
        }
    }
}
