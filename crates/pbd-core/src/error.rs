use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DrawerError {
    #[error("image too large: {width}x{height}, max side {max}")]
    SizeLimitExceeded { width: u32, height: u32, max: u32 },
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("no image loaded")]
    ImageNotLoaded,
    #[error("placement out of canvas bounds: ({x}, {y})")]
    PlacementOutOfBounds { x: u32, y: u32 },
    #[error("canvas refresh failed: {0}")]
    CanvasRefreshFailed(String),
    #[error("malformed board snapshot at column {column}: {reason}")]
    MalformedSnapshot { column: usize, reason: String },
    #[error("paint rejected: {0}")]
    PaintRejected(String),
    #[error("unknown credential {0}")]
    UnknownCredential(u32),
}

/// Returned by every wait that races the session shutdown signal.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("session cancelled")]
pub struct Cancelled;
