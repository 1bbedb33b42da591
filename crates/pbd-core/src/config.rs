use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanOrder {
    #[default]
    Raster,
    Shuffled,
}

/// Engine tuning. Every field has a default so partial TOML tables work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawerConfig {
    /// Board-imposed delay between two successful paints by one credential.
    pub interval_secs: u64,
    /// Subtracted from the cooldown so a credential is ready right as the
    /// board window reopens.
    pub cooldown_margin_ms: u64,
    pub worker_count: usize,
    pub credential_capacity: usize,
    pub pending_capacity: usize,
    pub update_interval_secs: u64,
    pub initial_delay_ms: u64,
    pub report_interval_secs: u64,
    pub max_image_side: u32,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub scan_order: ScanOrder,
    /// Re-enqueue an offset as soon as its paint fails instead of waiting for
    /// the next diff cycle to detect it again.
    pub requeue_failed: bool,
}

impl Default for DrawerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            cooldown_margin_ms: 66,
            worker_count: 4,
            credential_capacity: 50,
            pending_capacity: 40_000,
            update_interval_secs: 300,
            initial_delay_ms: 1_000,
            report_interval_secs: 3,
            max_image_side: 200,
            canvas_width: 1000,
            canvas_height: 600,
            scan_order: ScanOrder::Raster,
            requeue_failed: false,
        }
    }
}

impl DrawerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn cooldown(&self) -> Duration {
        self.interval()
            .saturating_sub(Duration::from_millis(self.cooldown_margin_ms))
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    /// Number of per-offset flags the pending set needs for the largest image.
    pub fn max_offsets(&self) -> usize {
        let side = self.max_image_side as usize;
        side * side
    }
}
