//! lakeFS REST API client
//!
//! Implements [`VersionedStore`] on top of the lakeFS `/api/v1` endpoints:
//! - `GET /repositories/{repo}/refs/{left}/diff/{right}` (ref diff)
//! - `GET /repositories/{repo}/branches/{branch}/diff` (uncommitted changes)
//! - `GET /repositories/{repo}/refs/{ref}/objects/ls` (listing)
//! - `GET /repositories/{repo}/refs/{ref}/objects/stat`
//! - `GET /repositories/{repo}/refs/{ref}/objects` with a `Range` header
//! - `GET /repositories/{repo}/refs/{ref}/commits?amount=1`

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{StatusCode, Url, header};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::diff::{ChangeType, DiffEntry};
use crate::store::{DiffPage, ListPage, ObjectStat, PathType, Result, StoreError, VersionedStore};

const API_PREFIX: &str = "/api/v1";

/// Connection settings for a lakeFS server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LakeFsSettings {
    /// Server address, e.g. `http://localhost:8000`
    pub endpoint: String,
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub secret_access_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for LakeFsSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000".to_string(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Pagination {
    has_more: bool,
    #[serde(default)]
    next_offset: String,
}

impl Pagination {
    fn next(self) -> Option<String> {
        if self.has_more && !self.next_offset.is_empty() {
            Some(self.next_offset)
        } else {
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct DiffResult {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    path_type: Option<String>,
    #[serde(default)]
    size_bytes: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct DiffList {
    results: Vec<DiffResult>,
    pagination: Pagination,
}

#[derive(Debug, Deserialize)]
struct ObjectStats {
    path: String,
    path_type: String,
    #[serde(default)]
    size_bytes: Option<u64>,
}

impl From<ObjectStats> for ObjectStat {
    fn from(stats: ObjectStats) -> Self {
        let path_type = if stats.path_type == "common_prefix" {
            PathType::CommonPrefix
        } else {
            PathType::Object
        };
        ObjectStat {
            path: stats.path,
            path_type,
            size_bytes: stats.size_bytes.unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ObjectStatsList {
    results: Vec<ObjectStats>,
    pagination: Pagination,
}

#[derive(Debug, Deserialize)]
struct Commit {
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct CommitList {
    results: Vec<Commit>,
}

/// HTTP client for a lakeFS server
pub struct LakeFsClient {
    api_base: Url,
    access_key_id: String,
    secret_access_key: String,
    http: reqwest::Client,
}

impl LakeFsClient {
    pub fn new(settings: &LakeFsSettings) -> Result<Self> {
        let mut base = settings.endpoint.trim_end_matches('/').to_string();
        if !base.ends_with(API_PREFIX) {
            base.push_str(API_PREFIX);
        }
        let api_base = Url::parse(&base)
            .map_err(|e| StoreError::Transport(format!("invalid lakeFS endpoint '{}': {}", settings.endpoint, e)))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| StoreError::Transport(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            api_base,
            access_key_id: settings.access_key_id.clone(),
            secret_access_key: settings.secret_access_key.clone(),
            http,
        })
    }

    /// `{api_base}/{segments...}` with each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Transport(format!("endpoint '{}' cannot be a base URL", self.api_base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        let req = self.http.get(url);
        if self.access_key_id.is_empty() {
            req
        } else {
            req.basic_auth(&self.access_key_id, Some(&self.secret_access_key))
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder, what: &str) -> Result<reqwest::Response> {
        let resp = req
            .send()
            .await
            .map_err(|e| StoreError::Transport(format!("{}: {}", what, e)))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(format!("{}: {}", what, body.trim())));
        }
        Err(StoreError::Http {
            status: status.as_u16(),
            message: format!("{}: {}", what, body.trim()),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
        what: &str,
    ) -> Result<T> {
        let url = self.url(segments)?;
        let resp = self.send(self.get(url).query(query), what).await?;
        resp.json()
            .await
            .map_err(|e| StoreError::Decode(format!("{}: {}", what, e)))
    }
}

#[async_trait]
impl VersionedStore for LakeFsClient {
    async fn diff_page(
        &self,
        repo: &str,
        source: &str,
        destination: &str,
        prefix: &str,
        after: &str,
        amount: usize,
    ) -> Result<DiffPage> {
        let amount = amount.to_string();
        let query = [("after", after), ("amount", amount.as_str()), ("prefix", prefix)];
        let list: DiffList = if source == destination {
            self.get_json(
                &["repositories", repo, "branches", source, "diff"],
                &query,
                &format!("diff of uncommitted changes on {}", source),
            )
            .await?
        } else {
            self.get_json(
                &["repositories", repo, "refs", source, "diff", destination],
                &query,
                &format!("diff {}..{}", source, destination),
            )
            .await?
        };

        let mut entries = Vec::with_capacity(list.results.len());
        for result in list.results {
            if result.path_type.as_deref() == Some("common_prefix") {
                continue;
            }
            let change_type = match result.kind.as_str() {
                "added" => ChangeType::Added,
                "removed" => ChangeType::Removed,
                "changed" | "conflict" => ChangeType::Modified,
                other => {
                    tracing::debug!("skipping diff entry {} of type '{}'", result.path, other);
                    continue;
                }
            };
            entries.push(DiffEntry {
                path: result.path,
                change_type,
                size_bytes: match change_type {
                    ChangeType::Removed => None,
                    _ => result.size_bytes,
                },
            });
        }

        Ok(DiffPage {
            entries,
            next_offset: list.pagination.next(),
        })
    }

    async fn list_page(
        &self,
        repo: &str,
        reference: &str,
        prefix: &str,
        after: &str,
        amount: usize,
    ) -> Result<ListPage> {
        let amount = amount.to_string();
        let list: ObjectStatsList = self
            .get_json(
                &["repositories", repo, "refs", reference, "objects", "ls"],
                &[
                    ("prefix", prefix),
                    ("after", after),
                    ("amount", amount.as_str()),
                    ("delimiter", "/"),
                ],
                &format!("list {}@{}", prefix, reference),
            )
            .await?;
        Ok(ListPage {
            results: list.results.into_iter().map(ObjectStat::from).collect(),
            next_offset: list.pagination.next(),
        })
    }

    async fn stat_object(&self, repo: &str, reference: &str, path: &str) -> Result<ObjectStat> {
        let stats: ObjectStats = self
            .get_json(
                &["repositories", repo, "refs", reference, "objects", "stat"],
                &[("path", path)],
                &format!("stat {}@{}", path, reference),
            )
            .await?;
        Ok(stats.into())
    }

    async fn read_range(
        &self,
        repo: &str,
        reference: &str,
        path: &str,
        start: u64,
        end: u64,
    ) -> Result<Bytes> {
        if end <= start {
            return Ok(Bytes::new());
        }
        let what = format!("read {}@{} bytes {}..{}", path, reference, start, end);
        let url = self.url(&["repositories", repo, "refs", reference, "objects"])?;
        let req = self
            .get(url)
            .query(&[("path", path)])
            .header(header::RANGE, format!("bytes={}-{}", start, end - 1));
        let resp = self.send(req, &what).await?;
        let status = resp.status();
        if status != StatusCode::PARTIAL_CONTENT {
            // a full-object reply to a ranged read is not downloaded
            return Err(StoreError::Http {
                status: status.as_u16(),
                message: format!("{}: range not honored", what),
            });
        }
        resp.bytes()
            .await
            .map_err(|e| StoreError::Transport(format!("{}: {}", what, e)))
    }

    async fn commit_metadata(&self, repo: &str, reference: &str) -> Result<BTreeMap<String, String>> {
        let list: CommitList = self
            .get_json(
                &["repositories", repo, "refs", reference, "commits"],
                &[("amount", "1")],
                &format!("log {}", reference),
            )
            .await?;
        list.results
            .into_iter()
            .next()
            .map(|commit| commit.metadata)
            .ok_or_else(|| StoreError::NotFound(format!("no commit at '{}'", reference)))
    }
}
