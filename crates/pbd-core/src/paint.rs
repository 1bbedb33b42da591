use crate::error::DrawerError;
use crate::pixel::Rgb;
use async_trait::async_trait;

/// One paint action, already mapped to board coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaintRequest {
    pub x: u32,
    pub y: u32,
    pub color: Rgb,
    pub uid: u32,
    pub token: String,
}

/// Write side of the remote board.
///
/// Any `Err` counts as a failed paint: the credential is recycled at once
/// and the pixel waits for the next diff cycle.
#[async_trait]
pub trait PaintBackend: Send + Sync {
    async fn paint(&self, request: &PaintRequest) -> Result<(), DrawerError>;
}
