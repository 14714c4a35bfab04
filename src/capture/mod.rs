pub mod decoder;
pub mod source;

// Re-export the capture seam types
pub use decoder::{BarcodeDecoder, ZbarDecoder};
pub use source::{CameraSource, CaptureError, Frame, FrameSource, Result, StreamGuard, Track};
