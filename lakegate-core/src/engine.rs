//! Validation engine
//!
//! One call to [`Engine::evaluate`] handles one hook request end to end:
//! resolve refs from the event, fetch the diff once, run the rules. Nothing
//! survives the call.

use std::sync::Arc;
use std::time::Instant;

use crate::config::EngineConfig;
use crate::diff::{Diff, DiffClient};
use crate::error::{Result, ValidationError};
use crate::event::HookEvent;
use crate::footer::FormatRegistry;
use crate::rules::{RuleContext, RuleSet, Verdict, Violation};
use crate::store::VersionedStore;

/// Evaluates rule sets against hook events
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn VersionedStore>,
    formats: FormatRegistry,
    config: EngineConfig,
}

impl Engine {
    /// Engine with the built-in footer parsers
    pub fn new(store: Arc<dyn VersionedStore>, config: EngineConfig) -> Self {
        Self {
            store,
            formats: FormatRegistry::with_defaults(),
            config,
        }
    }

    /// Replace the footer parser registry
    pub fn with_formats(mut self, formats: FormatRegistry) -> Self {
        self.formats = formats;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn VersionedStore {
        self.store.as_ref()
    }

    /// Diff `source` against `destination` under `prefix`.
    pub async fn fetch_diff(
        &self,
        repo: &str,
        source: &str,
        destination: &str,
        prefix: &str,
    ) -> Result<Diff> {
        DiffClient::new(self.store.as_ref(), self.config.page_size, self.config.max_diff_entries)
            .fetch_diff(repo, source, destination, prefix)
            .await
    }

    /// Evaluate `rules` for `event`.
    ///
    /// Returns `Err` only for configuration errors found before any store
    /// call; every other failure is a rejected [`Verdict`].
    pub async fn evaluate(&self, event: &HookEvent, rules: &RuleSet) -> Result<Verdict> {
        let started = Instant::now();
        let refs = event.resolve_refs()?;
        let repo = event.repository_id.as_str();
        let prefix = rules.diff_prefix();

        let diff = match self
            .fetch_diff(repo, &refs.source, &refs.destination, &prefix)
            .await
        {
            Ok(diff) => diff,
            Err(err) => {
                tracing::warn!("{}: {}", repo, err);
                return Ok(rejected_by(rules, &prefix, &err));
            }
        };

        let ctx = RuleContext {
            store: self.store.as_ref(),
            formats: &self.formats,
            settings: &self.config,
            repo,
            refs: &refs,
            commit_metadata: event.commit_metadata.as_ref(),
        };
        let verdict = rules.evaluate(&diff, &ctx).await;

        tracing::info!(
            "{} {}..{} ({} change(s) under '{}'): {} in {:?}",
            repo,
            refs.source,
            refs.destination,
            diff.len(),
            prefix,
            if verdict.accepted { "accepted" } else { "rejected" },
            started.elapsed()
        );
        Ok(verdict)
    }
}

/// Every rule in the set rejects with the same diff error.
fn rejected_by(rules: &RuleSet, prefix: &str, err: &ValidationError) -> Verdict {
    Verdict::from_violations(
        rules
            .rules()
            .iter()
            .map(|rule| Violation::from_error(rule.name(), prefix, err))
            .collect(),
    )
}
