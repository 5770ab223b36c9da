//! promflush CLI
//!
//! Command-line interface for a running promflush agent and for captured
//! remote-write payloads.
//!
//! # Usage
//!
//! ```bash
//! promflush --help
//! promflush health
//! promflush push samples.json
//! promflush decode payload.bin
//! ```

#![deny(unsafe_code)]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use shared::models::SampleContainer;
use shared::remote::{codec, proto::WriteRequest};
use std::path::{Path, PathBuf};

/// promflush CLI - remote-write flush agent command-line interface
#[derive(Parser)]
#[command(name = "promflush")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Agent URL
    #[arg(
        short,
        long,
        env = "PROMFLUSH_AGENT_URL",
        default_value = "http://localhost:6566"
    )]
    agent_url: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check agent health
    Health,
    /// Push a JSON file of sample containers to the agent
    Push {
        /// File holding one container or an array of containers
        file: PathBuf,
    },
    /// Decode a snappy-compressed remote-write payload and print it as JSON
    Decode {
        /// Captured request body
        file: PathBuf,
        /// Print only the number of series and points
        #[arg(long)]
        summary: bool,
    },
}

/// Series and point totals of a payload.
#[derive(Debug, Serialize, PartialEq)]
struct PayloadSummary {
    series: usize,
    points: usize,
}

impl PayloadSummary {
    fn of(request: &WriteRequest) -> Self {
        Self {
            series: request.timeseries.len(),
            points: request.timeseries.iter().map(|ts| ts.samples.len()).sum(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Health) => health(&cli.agent_url).await,
        Some(Commands::Push { file }) => push(&cli.agent_url, &file).await,
        Some(Commands::Decode { file, summary }) => decode(&file, summary),
        None => {
            println!("promflush CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for usage information");
            Ok(())
        }
    }
}

async fn health(agent_url: &str) -> Result<()> {
    let url = format!("{}/health", agent_url.trim_end_matches('/'));
    tracing::debug!(%url, "Checking agent health");

    let response = reqwest::get(&url)
        .await
        .with_context(|| format!("Failed to reach agent at {agent_url}"))?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        bail!("Agent returned {status}: {body}");
    }
    println!("{body}");
    Ok(())
}

async fn push(agent_url: &str, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let containers = parse_containers(&content)?;
    let samples: usize = containers.iter().map(SampleContainer::len).sum();

    let url = format!("{}/api/v1/samples", agent_url.trim_end_matches('/'));
    let response = reqwest::Client::new()
        .post(&url)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(serde_json::to_string(&containers)?)
        .send()
        .await
        .with_context(|| format!("Failed to reach agent at {agent_url}"))?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        bail!("Agent rejected {samples} sample(s) with {status}: {body}");
    }
    println!("{body}");
    Ok(())
}

fn decode(file: &Path, summary: bool) -> Result<()> {
    let payload =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let request = codec::decode(&payload).context("Payload is not a remote-write request")?;

    let output = if summary {
        serde_json::to_string_pretty(&PayloadSummary::of(&request))?
    } else {
        serde_json::to_string_pretty(&request)?
    };
    println!("{output}");
    Ok(())
}

/// Accepts either a single container or an array of containers.
fn parse_containers(content: &str) -> Result<Vec<SampleContainer>> {
    let value: serde_json::Value = serde_json::from_str(content).context("Invalid JSON")?;
    let containers = if value.is_array() {
        serde_json::from_value::<Vec<SampleContainer>>(value)?
    } else {
        vec![serde_json::from_value::<SampleContainer>(value)?]
    };

    if containers.iter().all(SampleContainer::is_empty) {
        bail!("No samples to push");
    }
    Ok(containers)
}
