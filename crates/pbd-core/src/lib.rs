//! Reconciliation-and-dispatch engine for drawing an image onto a shared,
//! rate-limited paint board.
//!
//! A [`Drawer`] owns one session: a reconcile loop diffs the board against
//! the target image and queues mismatching pixels in a [`PendingSet`];
//! workers drain that queue, each borrowing a credential from the
//! [`CredentialPool`] for one paint.

pub mod board;
pub mod config;
pub mod context;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod image;
pub mod paint;
pub mod pending;
pub mod pixel;
pub mod pool;
pub mod reconcile;
pub mod session;
pub mod shutdown;

pub use board::{BoardSource, Canvas};
pub use config::{DrawerConfig, ScanOrder};
pub use context::{SessionContext, SessionStats, StatsSnapshot};
pub use credentials::{Credential, CredentialRegistry};
pub use dispatch::Attempt;
pub use error::{Cancelled, DrawerError};
pub use image::{check_dimensions, Placement, TargetImage};
pub use paint::{PaintBackend, PaintRequest};
pub use pending::{EnqueueOutcome, PendingSet};
pub use pixel::Rgb;
pub use pool::{CredentialPool, Lease, PaintOutcome, SlotState};
pub use reconcile::CycleReport;
pub use session::{Drawer, WorkStatus};
pub use shutdown::Shutdown;
