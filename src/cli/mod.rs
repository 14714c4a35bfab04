pub mod client;
mod error;

// Re-export main shell types
pub use client::{default_export_path, Shell};
pub use error::{CliError, Result};
