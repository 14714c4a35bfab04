use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::source::{CaptureError, Frame, Result};

/// zbarimg exit code for "no symbol found".
const NO_SYMBOL_EXIT: i32 = 4;

/// Decodes barcode payloads out of image frames.
#[async_trait]
pub trait BarcodeDecoder: Send + Sync {
    /// Returns the decoded payload, or `None` when the frame holds no
    /// readable symbol.
    async fn decode(&self, frame: &Frame) -> Result<Option<String>>;
}

/// Decoder backed by the external `zbarimg` tool.
pub struct ZbarDecoder;

impl ZbarDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ZbarDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BarcodeDecoder for ZbarDecoder {
    async fn decode(&self, frame: &Frame) -> Result<Option<String>> {
        // Re-encode through `image` so zbarimg always sees a clean PNG,
        // whatever the grab produced.
        let decoded = image::load_from_memory(&frame.data)
            .map_err(|e| CaptureError::Decode(format!("unreadable frame: {e}")))?;

        let file = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .map_err(CaptureError::Io)?;
        decoded
            .save_with_format(file.path(), image::ImageFormat::Png)
            .map_err(|e| CaptureError::Decode(format!("frame re-encode failed: {e}")))?;

        let output = Command::new("zbarimg")
            .args(["--quiet", "--raw"])
            .arg(file.path())
            .output()
            .await
            .map_err(|e| CaptureError::Decode(format!("zbarimg not found: {e}")))?;

        if !output.status.success() && output.status.code() != Some(NO_SYMBOL_EXIT) {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaptureError::Decode(format!(
                "zbarimg failed: {}",
                stderr.trim()
            )));
        }

        let payload = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if payload.is_empty() {
            Ok(None)
        } else {
            debug!(%payload, "symbol decoded");
            Ok(Some(payload))
        }
    }
}
