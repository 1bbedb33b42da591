use crate::config::ScanOrder;
use crate::context::SessionContext;
use crate::error::Cancelled;
use crate::pending::EnqueueOutcome;
use crate::shutdown::Shutdown;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub refreshed: bool,
    pub scanned: usize,
    pub mismatched: usize,
    pub queued: usize,
    pub off_canvas: usize,
}

/// Idle, refresh, diff, repeat until the session shuts down.
pub async fn run(ctx: Arc<SessionContext>, mut shutdown: Shutdown) {
    let mut wait = ctx.config.initial_delay();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
        wait = ctx.config.update_interval();

        match run_cycle(&ctx, &mut shutdown).await {
            Ok(report) => {
                info!(
                    event = "reconcile_cycle",
                    refreshed = report.refreshed,
                    scanned = report.scanned,
                    mismatched = report.mismatched,
                    queued = report.queued,
                    off_canvas = report.off_canvas,
                    remaining = ctx.pending.len()
                );
            }
            Err(Cancelled) => break,
        }
    }
    info!(event = "reconcile_stop");
}

/// One refresh and full diff scan. A failed refresh skips the scan; the next
/// cycle retries.
pub async fn run_cycle(
    ctx: &SessionContext,
    shutdown: &mut Shutdown,
) -> Result<CycleReport, Cancelled> {
    let mut report = CycleReport::default();

    if let Err(err) = ctx.board.refresh().await {
        warn!(event = "canvas_refresh_failed", error = %err);
        return Ok(report);
    }
    report.refreshed = true;

    let image = &ctx.image;
    for offset in scan_order(image.offset_count(), ctx.config.scan_order) {
        let Some((x, y)) = image.coords(offset) else {
            continue;
        };
        let Some(expected) = image.expected(x, y) else {
            continue;
        };
        report.scanned += 1;

        let (bx, by) = ctx.placement.map(x, y);
        let Some(actual) = ctx.board.pixel_at(bx, by) else {
            report.off_canvas += 1;
            continue;
        };
        if actual == expected {
            continue;
        }
        report.mismatched += 1;

        if ctx.pending.enqueue(offset, shutdown).await? == EnqueueOutcome::Queued {
            report.queued += 1;
            debug!(
                event = "pixel_diff",
                x,
                y,
                board_x = bx,
                board_y = by,
                expected = %expected,
                actual = %actual
            );
        }
    }

    Ok(report)
}

/// Every offset in `0..count` exactly once.
pub fn scan_order(count: usize, order: ScanOrder) -> Vec<usize> {
    let mut offsets: Vec<usize> = (0..count).collect();
    if order == ScanOrder::Shuffled {
        offsets.shuffle(&mut rand::rng());
    }
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shuffled_order_visits_every_offset_once() {
        let mut offsets = scan_order(500, ScanOrder::Shuffled);
        assert_eq!(offsets.len(), 500);
        offsets.sort_unstable();
        assert_eq!(offsets, (0..500).collect::<Vec<_>>());
    }

    #[test]
    fn raster_order_is_sequential() {
        assert_eq!(scan_order(4, ScanOrder::Raster), vec![0, 1, 2, 3]);
        assert!(scan_order(0, ScanOrder::Shuffled).is_empty());
    }
}
