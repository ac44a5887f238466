//! Lakegate webhook endpoints
//!
//! Routes lakeFS hook requests to rule sets and turns verdicts into HTTP
//! responses.

pub mod handlers;

pub use handlers::handle_webhook_request;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use lakegate_core::{Engine, RuleSet};
use std::collections::BTreeMap;

/// Webhook configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
    /// Named rule sets served at `/webhooks/policy/<name>`
    pub policies: BTreeMap<String, RuleSet>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_body_size: 1024 * 1024, // 1 MB
            policies: BTreeMap::new(),
        }
    }
}

/// Webhook request handler
pub struct WebhookHandler {
    engine: Engine,
    config: Config,
}

impl WebhookHandler {
    /// Create a handler with default config
    pub fn new(engine: Engine) -> Self {
        Self::with_config(engine, Config::default())
    }

    /// Create a handler with custom config
    pub fn with_config(engine: Engine, config: Config) -> Self {
        Self { engine, config }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn policy(&self, name: &str) -> Option<&RuleSet> {
        self.config.policies.get(name)
    }

    /// Handle an incoming HTTP request
    pub async fn handle(&self, req: Request<Incoming>) -> Result<Response<Full<Bytes>>, WebhookError> {
        let (parts, body) = req.into_parts();
        let body = Limited::new(body, self.config.max_body_size)
            .collect()
            .await
            .map_err(|e| {
                if e.downcast_ref::<LengthLimitError>().is_some() {
                    WebhookError::BodyTooLarge(self.config.max_body_size)
                } else {
                    WebhookError::Body(e.to_string())
                }
            })?
            .to_bytes();

        Ok(handle_webhook_request(
            parts.uri.path(),
            parts.method.as_str(),
            &body,
            parts.uri.query().unwrap_or(""),
            self,
        )
        .await)
    }
}

/// Request-level errors raised before routing
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(usize),

    #[error("failed to read request body: {0}")]
    Body(String),
}

impl WebhookError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            WebhookError::Body(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn into_response(self) -> Response<Full<Bytes>> {
        handlers::json_error(self.status(), &self.to_string())
    }
}
