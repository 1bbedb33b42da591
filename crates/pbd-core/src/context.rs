use crate::board::BoardSource;
use crate::config::DrawerConfig;
use crate::credentials::CredentialRegistry;
use crate::image::{Placement, TargetImage};
use crate::paint::PaintBackend;
use crate::pending::PendingSet;
use crate::pool::CredentialPool;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

/// Everything the reconcile loop and the workers of one session share.
/// Image and placement are frozen for the session's lifetime; changing
/// either goes through a reset that builds a new context.
pub struct SessionContext {
    pub config: DrawerConfig,
    pub image: Arc<TargetImage>,
    pub placement: Placement,
    pub pending: Arc<PendingSet>,
    pub pool: Arc<CredentialPool>,
    pub registry: Arc<CredentialRegistry>,
    pub board: Arc<dyn BoardSource>,
    pub painter: Arc<dyn PaintBackend>,
    pub stats: Arc<SessionStats>,
}

impl SessionContext {
    /// Seconds until the queue drains if every known credential paints once
    /// per interval.
    pub fn eta_secs(&self, remaining: usize) -> Option<u64> {
        let known = self.registry.len();
        if known == 0 {
            return None;
        }
        Some(remaining as u64 * self.config.interval_secs / known as u64)
    }
}

#[derive(Debug)]
pub struct SessionStats {
    started: Instant,
    started_at: DateTime<Utc>,
    painted: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub started_at: DateTime<Utc>,
    pub painted: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            started_at: Utc::now(),
            painted: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    pub fn record_painted(&self) {
        self.painted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            started_at: self.started_at,
            painted: self.painted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }

    /// Share of the theoretical paint budget actually used:
    /// `painted * interval / (elapsed * credentials)`.
    pub fn utilisation(&self, interval_secs: u64, credentials: usize) -> f64 {
        let elapsed = self.elapsed_secs();
        if credentials == 0 || elapsed <= 0.0 {
            return 0.0;
        }
        let painted = self.painted.load(Ordering::Relaxed) as f64;
        painted * interval_secs as f64 / (elapsed * credentials as f64)
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}
