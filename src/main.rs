#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use leadwatch::config::Config;
use leadwatch::sheets::{normalize_sheet_id, Credentials, RowSource, SheetsClient};

/// Watch a Google Sheet for new rows and push them to connected clients.
#[derive(Parser, Debug)]
#[command(name = "leadwatch")]
#[command(version = "0.1.0")]
#[command(about = "Near-real-time lead notifications from Google Sheets.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway server (WebSocket lead monitoring)
    Serve {
        /// Host to bind to; defaults to config gateway.host
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (use 0 for random available port); defaults to config gateway.port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Read a sheet once and print its current row count
    Check {
        /// Sheet id or full Google Sheets URL
        sheet: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install default crypto provider for Rustls TLS.
    // This prevents the error: "could not automatically determine the process-level CryptoProvider"
    // when both aws-lc-rs and ring features are available (or neither is explicitly selected).
    if let Err(e) = rustls::crypto::ring::default_provider().install_default() {
        eprintln!("Warning: Failed to install default crypto provider: {e:?}");
    }

    let cli = Cli::parse();

    // Initialize logging - respects RUST_LOG env var, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = Config::load_or_init()?;

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.gateway.host.clone());
            let port = port.unwrap_or(config.gateway.port);
            leadwatch::gateway::run_gateway(&host, port, config).await
        }

        Commands::Check { sheet } => check_sheet(&config, &sheet).await,
    }
}

/// One-shot read: resolve the sheet reference, fetch the configured range,
/// and report what a monitoring session would baseline.
async fn check_sheet(config: &Config, sheet: &str) -> Result<()> {
    let sheet_id = normalize_sheet_id(sheet)
        .with_context(|| format!("Invalid sheet reference: {sheet}"))?;
    let token = config
        .sheets
        .access_token
        .clone()
        .context("No Sheets access token configured (set LEADWATCH_SHEETS_TOKEN)")?;

    let client = SheetsClient::new(config.sheets.api_base.clone(), config.sheets.range.clone());
    let rows = client
        .fetch_rows(&Credentials::new(token), &sheet_id)
        .await?;

    println!("📋 Sheet {sheet_id}");
    println!("  Range: {}", config.sheets.range);
    println!("  Rows:  {}", rows.len());
    if let Some(header) = rows.first() {
        println!("  First row: {}", header.join(" | "));
    }
    Ok(())
}
