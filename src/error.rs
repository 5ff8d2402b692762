//! Error types for the laser receiver core.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LaserError>;

/// Errors raised at the edges of the detection core.
///
/// Field-level settings problems are never errors: they fall back to defaults.
#[derive(Error, Debug)]
pub enum LaserError {
    #[error("Invalid frame buffer: expected {expected} bytes, got {actual}")]
    InvalidFrame { expected: usize, actual: usize },

    #[error("Empty frame: {width}x{height}")]
    EmptyFrame { width: u32, height: u32 },

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Sampling worker is no longer running")]
    WorkerUnavailable,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),
}

impl LaserError {
    pub fn settings<S: Into<String>>(msg: S) -> Self {
        Self::Settings(msg.into())
    }
}
