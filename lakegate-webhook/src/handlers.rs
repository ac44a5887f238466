//! HTTP handlers for the hook endpoints.
//!
//! Endpoints:
//!   POST /webhooks/format            → file format allow-list
//!   POST /webhooks/schema            → column-name blacklist
//!   POST /webhooks/dirty_check       → partition dirty check
//!   POST /webhooks/commit_metadata   → required commit metadata
//!   POST /webhooks/policy/<name>     → configured rule set
//!   GET  /healthz                    → liveness
//!   GET  /                           → usage

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::{Response, StatusCode};
use lakegate_core::rules::{commit_metadata, dirty, format, schema};
use lakegate_core::{HookEvent, Params, Rule, RuleSet, ValidationError, Verdict};

use crate::WebhookHandler;

const WEBHOOKS_PREFIX: &str = "/webhooks/";
const POLICY_PREFIX: &str = "policy/";

const USAGE: &str = "lakegate: lakeFS pre-commit / pre-merge validation webhooks

POST /webhooks/format?allow=parquet&allow=orc&prefix=production/
POST /webhooks/schema?disallow=user_&prefix=public/
POST /webhooks/dirty_check?prefix=tables/hive/
POST /webhooks/commit_metadata?fields=job_id,owning_team&prefix=data/
POST /webhooks/policy/<name>
GET  /healthz
";

// ─────────────────────────────────────────────────────
// Public dispatch
// ─────────────────────────────────────────────────────

/// Route a request. `body` is the raw hook payload.
pub async fn handle_webhook_request(
    path: &str,
    method: &str,
    body: &[u8],
    query: &str,
    handler: &WebhookHandler,
) -> Response<Full<Bytes>> {
    match (method, path) {
        ("GET", "/") => text(StatusCode::OK, USAGE),
        ("GET", "/healthz") => text(StatusCode::OK, "ok"),
        ("POST", p) if p.starts_with(WEBHOOKS_PREFIX) => {
            let endpoint = &p[WEBHOOKS_PREFIX.len()..];
            match resolve_rules(endpoint, query, handler) {
                Some(Ok(rules)) => handle_hook(endpoint, body, &rules, handler).await,
                Some(Err(err)) => {
                    tracing::warn!("{}{}: {}", WEBHOOKS_PREFIX, endpoint, err);
                    json_error(StatusCode::UNPROCESSABLE_ENTITY, &err.to_string())
                }
                None => not_found(method, path),
            }
        }
        (_, p) if p.starts_with(WEBHOOKS_PREFIX) => json_error(
            StatusCode::METHOD_NOT_ALLOWED,
            &format!("{} not allowed on {}; hooks are POST", method, path),
        ),
        _ => not_found(method, path),
    }
}

/// Rule set for an endpoint, or `None` if the endpoint does not exist.
fn resolve_rules(
    endpoint: &str,
    query: &str,
    handler: &WebhookHandler,
) -> Option<Result<RuleSet, ValidationError>> {
    let params = Params::parse(query);

    if let Some(name) = endpoint.strip_prefix(POLICY_PREFIX) {
        let policy = handler.policy(name)?;
        if !params.is_empty() {
            return Some(Err(ValidationError::config(format!(
                "policy '{}' takes no query parameters",
                name
            ))));
        }
        return Some(Ok(policy.clone()));
    }

    match endpoint {
        format::NAME | schema::NAME | dirty::NAME | commit_metadata::NAME => {
            Some(Rule::from_params(endpoint, &params).and_then(RuleSet::single))
        }
        _ => None,
    }
}

// ─────────────────────────────────────────────────────
// POST /webhooks/*
// ─────────────────────────────────────────────────────

async fn handle_hook(
    endpoint: &str,
    body: &[u8],
    rules: &RuleSet,
    handler: &WebhookHandler,
) -> Response<Full<Bytes>> {
    let event: HookEvent = match serde_json::from_slice(body) {
        Ok(event) => event,
        Err(e) => {
            return json_error(StatusCode::BAD_REQUEST, &format!("invalid hook payload: {}", e));
        }
    };
    tracing::debug!(
        "{} hook '{}' on {}/{} ({:?})",
        endpoint,
        event.hook_id,
        event.repository_id,
        event.branch_id,
        event.event_type
    );

    match handler.engine().evaluate(&event, rules).await {
        Ok(verdict) => verdict_response(&verdict),
        Err(err) if err.is_configuration() => {
            tracing::warn!("{}: {}", endpoint, err);
            json_error(StatusCode::UNPROCESSABLE_ENTITY, &err.to_string())
        }
        Err(err) => {
            tracing::error!("{}: {}", endpoint, err);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
        }
    }
}

fn verdict_response(verdict: &Verdict) -> Response<Full<Bytes>> {
    let status = if verdict.accepted {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    json(status, verdict)
}

// ─────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────

fn respond(status: StatusCode, content_type: &'static str, body: Vec<u8>) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::from(body)));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    resp
}

fn json<T: serde::Serialize>(status: StatusCode, data: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(data).unwrap_or_default();
    respond(status, "application/json", body)
}

fn text(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    respond(status, "text/plain; charset=utf-8", body.as_bytes().to_vec())
}

pub(crate) fn json_error(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    #[derive(serde::Serialize)]
    struct ErrorBody<'a> {
        error: &'a str,
    }
    json(status, &ErrorBody { error: message })
}

fn not_found(method: &str, path: &str) -> Response<Full<Bytes>> {
    json_error(
        StatusCode::NOT_FOUND,
        &format!("unknown endpoint: {} {}", method, path),
    )
}
