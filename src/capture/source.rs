use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// Upper bound for a single frame grab before the process is reaped.
const GRAB_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Camera access denied or not available: {0}")]
    CameraUnavailable(String),

    #[error("Frame grab failed: {0}")]
    Grab(String),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CaptureError>;

/// One sampled image from the stream, as encoded bytes.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

/// A single hardware track of an open stream. Stopping is idempotent.
#[derive(Debug, Clone)]
pub struct Track {
    label: String,
    stopped: Arc<AtomicBool>,
}

impl Track {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            debug!(track = %self.label, "track stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Owns the tracks of an acquired stream. `release()` stops every track;
/// dropping the guard releases as well.
#[derive(Debug)]
pub struct StreamGuard {
    tracks: Vec<Track>,
}

impl StreamGuard {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self { tracks }
    }

    pub fn release(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Source of image frames for the capture loop.
#[async_trait]
pub trait FrameSource: Send {
    /// Acquire the underlying stream. Called once, before the first grab.
    async fn open(&mut self) -> Result<StreamGuard>;

    /// Sample one frame. `None` means the source has nothing buffered yet.
    async fn grab(&mut self) -> Result<Option<Frame>>;
}

/// Grabs single frames from a capture device through ffmpeg.
pub struct CameraSource {
    device: String,
}

impl CameraSource {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }
}

#[async_trait]
impl FrameSource for CameraSource {
    async fn open(&mut self) -> Result<StreamGuard> {
        let probe = Command::new("ffmpeg")
            .arg("-version")
            .output()
            .await
            .map_err(|e| CaptureError::CameraUnavailable(format!("ffmpeg not found: {e}")))?;
        if !probe.status.success() {
            return Err(CaptureError::CameraUnavailable(
                "ffmpeg version check failed".to_string(),
            ));
        }

        if !std::path::Path::new(&self.device).exists() {
            return Err(CaptureError::CameraUnavailable(format!(
                "no such device: {}",
                self.device
            )));
        }

        Ok(StreamGuard::new(vec![Track::new(self.device.clone())]))
    }

    async fn grab(&mut self) -> Result<Option<Frame>> {
        // -frames:v 1: one frame, mjpeg to stdout. kill_on_drop reaps the
        // process if the timeout cancels the wait.
        let child = Command::new("ffmpeg")
            .args([
                "-f",
                "v4l2",
                "-i",
                &self.device,
                "-frames:v",
                "1",
                "-f",
                "image2pipe",
                "-vcodec",
                "mjpeg",
                "-loglevel",
                "error",
                "-y",
                "-",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CaptureError::Grab(format!("ffmpeg spawn failed: {e}")))?;

        match tokio::time::timeout(GRAB_TIMEOUT, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    return Err(CaptureError::Grab(format!(
                        "ffmpeg failed: {}",
                        stderr.trim()
                    )));
                }

                if output.stdout.is_empty() {
                    // Device produced nothing this tick; try again next frame.
                    return Ok(None);
                }

                Ok(Some(Frame::new(output.stdout)))
            }
            Ok(Err(e)) => Err(CaptureError::Grab(format!("ffmpeg execution failed: {e}"))),
            Err(_) => {
                warn!(device = %self.device, "frame grab timeout, process killed");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn releasing_a_guard_stops_every_track() {
        let a = Track::new("video");
        let b = Track::new("meta");
        let guard = StreamGuard::new(vec![a.clone(), b.clone()]);

        assert!(!a.is_stopped());
        guard.release();
        assert!(a.is_stopped());
        assert!(b.is_stopped());
    }

    #[test]
    fn dropping_a_guard_releases_tracks() {
        let track = Track::new("video");
        {
            let _guard = StreamGuard::new(vec![track.clone()]);
            assert!(!track.is_stopped());
        }
        assert!(track.is_stopped());
    }

    #[test]
    fn track_stop_is_idempotent() {
        let track = Track::new("video");
        track.stop();
        track.stop();
        assert!(track.is_stopped());
    }
}
