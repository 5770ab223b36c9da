//! promflush Agent
//!
//! This crate runs the remote-write output: it accepts samples from the test
//! runner over HTTP, buffers them, and periodically flushes them to a
//! Prometheus remote-write endpoint together with a cumulative latency
//! histogram.
//!
//! # Architecture
//!
//! The agent is built on Axum and Tokio, providing:
//! - An ingestion API that fills the sample buffer
//! - A flush loop that drains the buffer once per flush period
//! - A pluggable remote-write transport
//!
//! # Example
//!
//! ```no_run
//! use agent::run_agent;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     run_agent().await
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod buffer;
mod config;
pub mod output;
pub mod pipeline;
mod routes;
mod state;
pub mod transport;

pub use config::Config;
pub use output::{Output, OutputError, OutputHandle};
pub use routes::{SampleIngestRequest, SampleIngestResponse};
pub use state::AppState;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::Router;
use shared::config::OutputConfig;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Largest accepted ingestion request body.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Environment variable naming an optional JSON output configuration file.
pub const OUTPUT_CONFIG_ENV: &str = "PROMFLUSH_OUTPUT_CONFIG";

/// Runs the promflush agent.
///
/// Loads the server and output configuration from environment variables
/// (the output configuration may start from the JSON file named by
/// `PROMFLUSH_OUTPUT_CONFIG`), starts the flush loop and serves the ingestion
/// API until SIGTERM/SIGINT or until the flush loop ends. On shutdown the
/// flush loop is stopped after a final flush.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration cannot be loaded from environment or the JSON file
/// - The server fails to bind to the configured address
/// - The flush loop ends with a fatal error
pub async fn run_agent() -> Result<()> {
    let config = Config::from_env()?;
    let output_config = load_output_config(std::env::vars())?;
    let output = Output::with_http_client(output_config)?;
    run_agent_with(config, output).await
}

/// Runs the agent with the provided configuration and output.
///
/// This is useful for testing or when you want to provide configuration programmatically.
///
/// # Errors
///
/// Returns an error if:
/// - The server fails to bind to the configured address
/// - The flush loop ends with a fatal error
pub async fn run_agent_with(config: Config, mut output: Output) -> Result<()> {
    let addr = config.socket_addr()?;

    tracing::info!(
        host = %config.host,
        port = %config.port,
        output = %output.description(),
        "promflush agent starting"
    );

    let state = AppState::new(output.buffer());
    let handle = output.start()?;

    let app = create_router(state);
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(%addr, "Listening for connections");

    let flush_ended = handle.finished();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                () = shutdown_signal() => {}
                () = flush_ended => {
                    tracing::error!("Flush loop ended, shutting down ingestion");
                }
            }
        })
        .await;

    handle.stop().await?;
    served?;

    tracing::info!("Agent shutdown complete");
    Ok(())
}

/// Builds the output configuration from `vars`, layered over the JSON file
/// named by [`OUTPUT_CONFIG_ENV`] when it is set.
fn load_output_config<I>(vars: I) -> Result<OutputConfig>
where
    I: IntoIterator<Item = (String, String)>,
{
    let vars: Vec<(String, String)> = vars.into_iter().collect();
    let json = match vars.iter().find(|(key, _)| key == OUTPUT_CONFIG_ENV) {
        Some((_, path)) => {
            tracing::info!(%path, "Loading remote write configuration file");
            Some(
                std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {OUTPUT_CONFIG_ENV} file {path}"))?,
            )
        }
        None => None,
    };

    OutputConfig::load(json.as_deref(), vars).context("Failed to load remote write configuration")
}

/// Creates the main application router with all routes and middleware.
///
/// This function is public to allow testing the router without starting a full server.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health_routes(state.clone()))
        .merge(routes::samples_routes(state))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{RemoteWriteClient, TransportError};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    struct PanickingClient;

    #[async_trait]
    impl RemoteWriteClient for PanickingClient {
        async fn store(&self, _batch: Vec<u8>) -> Result<(), TransportError> {
            panic!("remote write client crashed");
        }
    }

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_agent_exits_when_flush_loop_dies() {
        let output_config = OutputConfig {
            flush_period: Duration::from_millis(10),
            ..OutputConfig::default()
        };
        let output = Output::new(output_config, Arc::new(PanickingClient)).unwrap();
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 0,
        };

        let result = tokio::time::timeout(Duration::from_secs(5), run_agent_with(config, output))
            .await
            .unwrap();

        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OutputError>(),
            Some(OutputError::Join(_))
        ));
    }

    #[test]
    fn test_load_output_config_env_overrides_file() {
        let path = std::env::temp_dir().join(format!(
            "promflush-output-config-{}.json",
            std::process::id()
        ));
        std::fs::write(
            &path,
            r#"{"url": "https://file.example.com/write", "mapping": "Raw", "keepNameTag": true}"#,
        )
        .unwrap();

        let config = load_output_config(vars(&[
            (OUTPUT_CONFIG_ENV, path.to_str().unwrap()),
            ("K6_PROMETHEUS_REMOTE_URL", "https://env.example.com/write"),
        ]))
        .unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.url, "https://env.example.com/write");
        assert_eq!(config.mapping, shared::mapping::MappingKind::Raw);
        assert!(config.keep_name_tag);
    }

    #[test]
    fn test_load_output_config_without_file() {
        let config = load_output_config(vars(&[("K6_KEEP_TAGS", "false")])).unwrap();
        assert!(!config.keep_tags);
        assert_eq!(config.url, OutputConfig::default().url);
    }

    #[test]
    fn test_load_output_config_missing_file() {
        let result = load_output_config(vars(&[(
            OUTPUT_CONFIG_ENV,
            "/nonexistent/promflush-output.json",
        )]));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_router_serves_health() {
        let app = create_router(AppState::default());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok());
        assert!(content_type.is_some_and(|ct| ct.contains("application/json")));
    }

    #[tokio::test]
    async fn test_router_unknown_route() {
        let app = create_router(AppState::default());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
