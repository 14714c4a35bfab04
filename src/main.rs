mod api;
mod capture;
mod cli;
mod models;
mod render;
mod session;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::ApiClient;
use crate::capture::{BarcodeDecoder, CameraSource, ZbarDecoder};
use crate::cli::Shell;
use crate::session::{BellFeedback, ScanSession};

/// Terminal client for the inventory reconciliation service.
#[derive(Parser)]
#[command(name = "stocktake", version, about)]
struct Cli {
    /// Base URL of the service
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    server: String,

    /// Capture device for camera scanning
    #[arg(long, default_value = "/dev/video0")]
    device: String,

    /// Sampling cadence of the capture loop in milliseconds
    #[arg(long, default_value_t = 100)]
    frame_interval_ms: u64,

    /// Allowance in seconds for a sleeping service to wake up
    #[arg(long, default_value_t = 30)]
    wake_timeout_secs: u64,

    /// Trust self-signed certificates on the service
    #[arg(long)]
    insecure: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Upload an inventory spreadsheet
    Upload { path: PathBuf },
    /// Submit a barcode manually
    Scan {
        barcode: String,
        location: Option<String>,
    },
    /// Run the camera capture loop until Ctrl-C
    Watch,
    /// Show inventory statistics
    Stats,
    /// Download the reconciliation report
    Export { dest: Option<PathBuf> },
    /// Clear all scan data (keeps the inventory)
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let api = ApiClient::builder()
        .base_url(cli.server.clone())
        .wake_timeout(Duration::from_secs(cli.wake_timeout_secs))
        .accept_invalid_certs(cli.insecure)
        .build()?;

    let mut session = ScanSession::new(api, Box::new(BellFeedback))
        .with_frame_interval(Duration::from_millis(cli.frame_interval_ms));

    match cli.command {
        None => {
            let mut shell = Shell::new(cli.device)?;
            shell.run(&mut session).await?;
        }
        Some(Command::Upload { path }) => {
            if !path.is_file() {
                println!("{} {}", "No such file:".red(), path.display());
                std::process::exit(1);
            }
            let message = session.upload(&path).await?;
            println!("{} {}", "Success:".green(), message);
        }
        Some(Command::Scan { barcode, location }) => {
            let report = session
                .submit(&barcode, location.as_deref().unwrap_or(""))
                .await?;
            render::print_report(&report);
        }
        Some(Command::Watch) => {
            let source = Box::new(CameraSource::new(cli.device.clone()));
            let decoder: Arc<dyn BarcodeDecoder> = Arc::new(ZbarDecoder::new());
            session.start_capture(source, decoder).await?;
            info!(device = %cli.device, "watching for barcodes");
            println!(
                "{} {} {}",
                "Scanning on".green(),
                cli.device.cyan(),
                "(Ctrl-C to stop)".yellow()
            );

            tokio::signal::ctrl_c().await?;
            session.stop_capture().await;
            println!("{}", "Scanning stopped.".yellow());
        }
        Some(Command::Stats) => {
            let board = session.refresh_stats().await;
            render::print_board(&board);
        }
        Some(Command::Export { dest }) => {
            let dest = dest.unwrap_or_else(cli::default_export_path);
            let bytes = session.export(&dest).await?;
            println!(
                "{} {} ({} bytes)",
                "Report saved to".green(),
                dest.display(),
                bytes
            );
        }
        Some(Command::Reset { yes }) => {
            if !yes {
                println!("{}", "Refusing to reset without --yes".red());
                std::process::exit(1);
            }
            let message = session.reset().await?;
            println!("{} {}", "Success:".green(), message);
        }
    }

    Ok(())
}
