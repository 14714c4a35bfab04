use std::path::PathBuf;
use std::sync::Arc;

use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::capture::{BarcodeDecoder, CameraSource, ZbarDecoder};
use crate::render;
use crate::session::ScanSession;

use super::error::Result;

/// Interactive shell for driving the scan service.
pub struct Shell {
    /// Command line editor for user input
    editor: DefaultEditor,
    /// Path to command history file
    history_path: PathBuf,
    /// Capture device used by the start command
    device: String,
}

impl Shell {
    pub fn new(device: String) -> Result<Self> {
        let mut editor = DefaultEditor::new()?;
        let history_path = dirs::home_dir()
            .unwrap_or_default()
            .join(".stocktake_history");

        // Load history if it exists
        if editor.load_history(&history_path).is_err() {
            println!("{}", "No previous history.".yellow());
        }

        Ok(Self {
            editor,
            history_path,
            device,
        })
    }

    /// Print available commands
    fn print_help(&self) {
        println!("\n{}", "Commands:".green().bold());
        println!("  {} - upload an inventory spreadsheet", "upload <path>".cyan());
        println!(
            "  {} - submit a barcode manually",
            "scan <barcode> [location]".cyan()
        );
        println!("  {} - start camera scanning", "start".cyan());
        println!("  {} - stop camera scanning", "stop".cyan());
        println!("  {} - show inventory statistics", "stats".cyan());
        println!(
            "  {} - download the reconciliation report",
            "export [path]".cyan()
        );
        println!("  {} - clear all scan data", "reset".cyan());
        println!("  {} - show this help", "help".cyan());
        println!("  {} - clear the screen", "clear".cyan());
        println!("  {} - exit", "exit".cyan());
        println!();
    }

    /// Process a command entered by the user
    async fn handle_command(&mut self, session: &mut ScanSession, line: &str) -> bool {
        let parts: Vec<&str> = line.trim().split_whitespace().collect();
        match parts.first().copied() {
            Some("exit") | Some("quit") => {
                println!("{}", "Goodbye!".green());
                false
            }
            Some("help") => {
                self.print_help();
                true
            }
            Some("clear") => {
                print!("\x1B[2J\x1B[1;1H");
                true
            }
            Some("upload") => {
                self.handle_upload(session, parts.get(1).copied()).await;
                true
            }
            Some("scan") => {
                if parts.len() < 2 {
                    println!("{}", "Usage: scan <barcode> [location]".red());
                } else {
                    let location = parts[2..].join(" ");
                    match session.submit(parts[1], &location).await {
                        Ok(report) => render::print_report(&report),
                        Err(e) => println!("{} {}", "Error:".red(), e),
                    }
                }
                true
            }
            Some("start") => {
                self.handle_start(session).await;
                true
            }
            Some("stop") => {
                session.stop_capture().await;
                println!("{}", "Scanning stopped.".yellow());
                true
            }
            Some("stats") => {
                let board = session.refresh_stats().await;
                render::print_board(&board);
                true
            }
            Some("export") => {
                self.handle_export(session, parts.get(1).copied()).await;
                true
            }
            Some("reset") => {
                self.handle_reset(session).await;
                true
            }
            Some("") | None => true,
            Some(cmd) => {
                println!("{} {}", "Unknown command:".red(), cmd);
                true
            }
        }
    }

    async fn handle_upload(&self, session: &ScanSession, path: Option<&str>) {
        let Some(path) = path else {
            println!("{}", "Please select a file".red());
            return;
        };

        let path = PathBuf::from(path);
        if !path.is_file() {
            println!("{} {}", "No such file:".red(), path.display());
            return;
        }

        println!(
            "{}",
            "Uploading spreadsheet (the service may take a moment to wake up)...".blue()
        );
        match session.upload(&path).await {
            Ok(message) => println!("{} {}", "Success:".green(), message),
            Err(e) => println!("{} {}", "Error:".red(), e),
        }
    }

    async fn handle_start(&self, session: &mut ScanSession) {
        let source = Box::new(CameraSource::new(self.device.clone()));
        let decoder: Arc<dyn BarcodeDecoder> = Arc::new(ZbarDecoder::new());
        match session.start_capture(source, decoder).await {
            Ok(()) => println!("{} {}", "Scanning started on".green(), self.device.cyan()),
            Err(e) => println!("{} {}", "Error:".red(), e),
        }
    }

    async fn handle_export(&self, session: &ScanSession, dest: Option<&str>) {
        let dest = dest.map(PathBuf::from).unwrap_or_else(default_export_path);
        match session.export(&dest).await {
            Ok(bytes) => println!(
                "{} {} ({} bytes)",
                "Report saved to".green(),
                dest.display(),
                bytes
            ),
            Err(e) => println!("{} {}", "Error:".red(), e),
        }
    }

    async fn handle_reset(&mut self, session: &ScanSession) {
        let prompt = "Reset all scan data? The inventory is kept. [y/N] ";
        let answer = match self.editor.readline(prompt) {
            Ok(line) => line,
            Err(_) => return,
        };
        if !matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
            println!("{}", "Reset cancelled.".yellow());
            return;
        }

        match session.reset().await {
            Ok(message) => println!("{} {}", "Success:".green(), message),
            Err(e) => println!("{} {}", "Error:".red(), e),
        }
    }

    /// Run the interactive shell
    pub async fn run(&mut self, session: &mut ScanSession) -> Result<()> {
        println!("\n{}", "Stocktake scan client".green().bold());
        println!("Service: {}", session.api().base_url().cyan());
        self.print_help();

        // Prime the stats board once at startup.
        let board = session.refresh_stats().await;
        render::print_board(&board);

        loop {
            let prompt = format!("{} ", ">".cyan().bold());
            match self.editor.readline(&prompt) {
                Ok(line) => {
                    self.editor.add_history_entry(line.as_str())?;
                    if !self.handle_command(session, &line).await {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "CTRL-C".yellow());
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "CTRL-D".yellow());
                    break;
                }
                Err(err) => {
                    println!("{} {:?}", "Error:".red(), err);
                    break;
                }
            }
        }

        // Leaving the shell must not leave the camera acquired.
        session.stop_capture().await;

        // Save history
        if let Err(e) = self.editor.save_history(&self.history_path) {
            println!("{} {}", "Failed to save history:".red(), e);
        }

        Ok(())
    }
}

/// Date-stamped default destination for the export command.
pub fn default_export_path() -> PathBuf {
    PathBuf::from(format!(
        "inventory_report_{}.xlsx",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ))
}
