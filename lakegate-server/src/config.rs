//! Server configuration file
//!
//! ```toml
//! listen = "0.0.0.0:8080"
//!
//! [lakefs]
//! endpoint = "http://lakefs:8000"
//! access_key_id = "AKIA..."
//! secret_access_key = "..."
//!
//! [engine]
//! fanout = 16
//!
//! [policies.production]
//! rules = [
//!   { rule = "format", allow = ["parquet"], prefix = "production/" },
//!   { rule = "commit_metadata", fields = ["job_id"], prefix = "production/" },
//! ]
//! ```

use anyhow::{Context, Result};
use lakegate_core::{EngineConfig, LakeFsSettings, Rule, RuleSet};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default)]
    pub lakefs: LakeFsSettings,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub policies: BTreeMap<String, PolicyConfig>,
}

/// A named rule set
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    pub rules: Vec<Rule>,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            lakefs: LakeFsSettings::default(),
            engine: EngineConfig::default(),
            policies: BTreeMap::new(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen
            .parse()
            .with_context(|| format!("invalid listen address '{}'", self.listen))
    }

    /// Check every setting and build the policy rule sets.
    pub fn validate(&self) -> Result<BTreeMap<String, RuleSet>> {
        self.listen_addr()?;
        self.engine.validate()?;
        if self.lakefs.endpoint.trim().is_empty() {
            anyhow::bail!("lakefs.endpoint is empty");
        }
        self.policies
            .iter()
            .map(|(name, policy)| {
                RuleSet::new(policy.rules.clone())
                    .map(|rules| (name.clone(), rules))
                    .with_context(|| format!("policy '{}'", name))
            })
            .collect()
    }
}
