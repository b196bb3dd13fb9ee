//! material-origin - where is this object's material from?
//!
//! # Usage
//!
//! ```bash
//! # One-shot analysis of a local image
//! GEMINI_API_KEY=... material-origin analyze --image chair.jpg
//!
//! # One-shot analysis of an image URL
//! GEMINI_API_KEY=... material-origin analyze --url https://example.com/chair.png
//!
//! # HTTP API
//! GEMINI_API_KEY=... material-origin serve --addr 127.0.0.1:8080
//! ```
//!
//! # Environment Variables
//!
//! - `GEMINI_API_KEY`: Inference service credential (name configurable)
//! - `MATERIAL_ORIGIN_CONFIG`: Path to a TOML config file
//! - `MATERIAL_ORIGIN_MODEL`: Override the model name
//! - `MATERIAL_ORIGIN_SERVER_ADDR`: Override the listen address
//! - `MATERIAL_ORIGIN_CORS_ORIGINS`: Comma-separated allowed CORS origins
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use material_origin::api::{create_app, ApiState};
use material_origin::config::AppConfig;
use material_origin::ingest;
use material_origin::llm::{GeminiBackend, InferenceBackend};
use material_origin::pipeline::{AnalysisPipeline, AnalysisSession, PipelineSettings, Submission};
use material_origin::types::{display_text, ImagePayload};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "material-origin")]
#[command(about = "Identify an object's materials and where they come from")]
#[command(version)]
struct CliArgs {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Analyze one image and print the coordinates list
    Analyze {
        /// Local image file
        #[arg(long, conflicts_with = "url", required_unless_present = "url")]
        image: Option<PathBuf>,

        /// Image URL (http(s) or data:image/...)
        #[arg(long)]
        url: Option<String>,
    },
    /// Run the HTTP API
    Serve {
        /// Override the server address (default: "0.0.0.0:8080")
        #[arg(short, long)]
        addr: Option<String>,
    },
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Build the shared backend and session. Fails fast without a credential.
fn build_session(config: &AppConfig) -> Result<AnalysisSession> {
    let backend = GeminiBackend::from_config(&config.inference)
        .context("Failed to initialize inference backend")?;
    info!(
        backend = backend.backend_name(),
        model = backend.model(),
        "Inference backend ready"
    );
    let pipeline = AnalysisPipeline::new(Arc::new(backend), PipelineSettings::from(config));
    Ok(AnalysisSession::new(Arc::new(pipeline)))
}

fn fetch_client(config: &AppConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(config.inference.connect_timeout())
        .timeout(config.inference.stage_timeout())
        .build()
        .context("Failed to build HTTP client")
}

// ============================================================================
// Subcommands
// ============================================================================

async fn run_analyze(
    config: &AppConfig,
    image: Option<PathBuf>,
    url: Option<String>,
) -> Result<bool> {
    let session = build_session(config)?;

    let loaded = match (image, url) {
        (Some(path), _) => ingest::from_path(&path).await.map(Some),
        (None, Some(url)) => {
            let client = fetch_client(config)?;
            ingest::from_url(&client, &url, config.server.max_image_bytes)
                .await
                .map(Some)
        }
        (None, None) => Ok(None),
    };
    let payload: Option<ImagePayload> = match loaded {
        Ok(payload) => payload,
        Err(e) => {
            println!("{}", e.display_text());
            return Ok(false);
        }
    };

    match session.submit(payload).await {
        Submission::Completed { result, .. } => {
            println!("{}", display_text(&result));
            Ok(result.is_ok())
        }
        other => {
            error!(status = other.status(), "Image was not analyzed");
            Ok(false)
        }
    }
}

async fn run_serve(config: &AppConfig, addr: Option<String>) -> Result<()> {
    let session = build_session(config)?;
    let state = ApiState::new(session, fetch_client(config)?, config.server.max_image_bytes);
    let app = create_app(state);

    let server_addr = addr.unwrap_or_else(|| config.server.addr.clone());
    let listener = tokio::net::TcpListener::bind(&server_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", server_addr))?;
    info!("HTTP server listening on {}", server_addr);

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel_token.cancelled().await;
        })
        .await
        .context("HTTP server error")?;

    info!("Graceful shutdown complete");
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.json_logs);

    let config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    match args.command {
        SubCommand::Analyze { image, url } => {
            if !run_analyze(&config, image, url).await? {
                std::process::exit(1);
            }
            Ok(())
        }
        SubCommand::Serve { addr } => run_serve(&config, addr).await,
    }
}
