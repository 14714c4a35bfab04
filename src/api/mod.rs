pub mod client;

// Re-export main client types
pub use client::{ApiClient, ApiClientBuilder, ApiError, Result};
