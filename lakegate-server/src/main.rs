//! Lakegate Server - lakeFS validation webhooks
//!
//! Serves pre-commit and pre-merge hooks that inspect the diff of a change
//! and accept or reject it.

mod config;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use config::ServerConfig;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use lakegate_core::{Engine, LakeFsClient};
use lakegate_webhook::{Config, WebhookHandler};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "lakegate")]
#[command(author = "Lakegate Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Validation webhooks for lakeFS commits and merges", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the server
    Start {
        /// Config file (TOML)
        #[arg(short, long, env = "LAKEGATE_CONFIG")]
        config: Option<PathBuf>,

        /// Listen address (e.g., 0.0.0.0:8080)
        #[arg(short, long, env = "LAKEGATE_LISTEN")]
        addr: Option<String>,

        /// lakeFS server address
        #[arg(long, env = "LAKEFS_ENDPOINT")]
        lakefs_endpoint: Option<String>,

        #[arg(long, env = "LAKEFS_ACCESS_KEY_ID")]
        access_key_id: Option<String>,

        #[arg(long, env = "LAKEFS_SECRET_ACCESS_KEY", hide_env_values = true)]
        secret_access_key: Option<String>,

        /// Enable debug logging
        #[arg(long)]
        debug: bool,
    },

    /// Validate a config file and exit
    CheckConfig {
        /// Config file (TOML)
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            config,
            addr,
            lakefs_endpoint,
            access_key_id,
            secret_access_key,
            debug,
        } => {
            init_tracing(debug);

            let mut settings = match &config {
                Some(path) => ServerConfig::load(path)?,
                None => ServerConfig::default(),
            };
            if let Some(addr) = addr {
                settings.listen = addr;
            }
            if let Some(endpoint) = lakefs_endpoint {
                settings.lakefs.endpoint = endpoint;
            }
            if let Some(key) = access_key_id {
                settings.lakefs.access_key_id = key;
            }
            if let Some(secret) = secret_access_key {
                settings.lakefs.secret_access_key = secret;
            }

            let policies = settings.validate()?;
            let addr = settings.listen_addr()?;

            info!("lakeFS endpoint: {}", settings.lakefs.endpoint);
            info!(
                "Engine: max_diff_entries={} page_size={} fanout={} footer_tail_bytes={}",
                settings.engine.max_diff_entries,
                settings.engine.page_size,
                settings.engine.fanout,
                settings.engine.footer_tail_bytes
            );
            for (name, rules) in &policies {
                info!("Policy '{}': {} rule(s)", name, rules.rules().len());
            }

            let client = LakeFsClient::new(&settings.lakefs).context("failed to create lakeFS client")?;
            let engine = Engine::new(Arc::new(client), settings.engine.clone());
            let handler = Arc::new(WebhookHandler::with_config(
                engine,
                Config {
                    policies,
                    ..Config::default()
                },
            ));

            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind {}", addr))?;
            info!("Server listening on {}", addr);

            loop {
                let (stream, peer) = listener.accept().await?;
                let handler = handler.clone();
                let io = TokioIo::new(stream);

                tokio::spawn(async move {
                    if let Err(e) = http1::Builder::new()
                        .serve_connection(io, service_fn(move |req| handle_request(req, handler.clone())))
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", peer, e);
                    }
                });
            }
        }

        Commands::CheckConfig { path } => {
            let settings = ServerConfig::load(&path)?;
            let policies = settings.validate()?;
            println!("{}: OK", path.display());
            println!("  listen: {}", settings.listen);
            println!("  lakeFS endpoint: {}", settings.lakefs.endpoint);
            for (name, rules) in &policies {
                let kinds: Vec<&str> = rules.rules().iter().map(|r| r.name()).collect();
                println!("  policy {}: {}", name, kinds.join(", "));
            }
        }
    }

    Ok(())
}

fn init_tracing(debug: bool) {
    let env_filter = if debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();
}

/// Handle incoming HTTP request
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    handler: Arc<WebhookHandler>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match handler.handle(req).await {
        Ok(resp) => resp,
        Err(e) => {
            error!("Request error: {}", e);
            e.into_response()
        }
    };

    info!("{} {} -> {}", method, path, response.status());
    Ok(response)
}
