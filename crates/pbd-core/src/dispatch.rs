use crate::context::SessionContext;
use crate::error::{Cancelled, DrawerError};
use crate::paint::PaintRequest;
use crate::pool::PaintOutcome;
use crate::shutdown::Shutdown;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of handling one dequeued offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Painted,
    Failed,
    /// The credential had no token any more and was retired.
    UnknownCredential,
    /// The offset does not belong to the current image.
    Skipped,
}

/// Worker loop: take an offset, borrow a credential, paint, give the
/// credential back. Returns when the session shuts down.
pub async fn run_worker(worker: usize, ctx: Arc<SessionContext>, mut shutdown: Shutdown) {
    debug!(event = "worker_start", worker);
    while work_once(&ctx, &mut shutdown).await.is_ok() {}
    info!(event = "worker_stop", worker);
}

/// Handles exactly one queued offset.
pub async fn work_once(
    ctx: &SessionContext,
    shutdown: &mut Shutdown,
) -> Result<Attempt, Cancelled> {
    let offset = ctx.pending.dequeue(shutdown).await?;
    let lease = ctx.pool.acquire(shutdown).await?;
    let uid = lease.id();

    let Some(credential) = ctx.registry.credential(uid) else {
        let err = DrawerError::UnknownCredential(uid);
        warn!(event = "credential_skipped", uid, error = %err);
        ctx.pool.retire(lease);
        ctx.stats.record_skipped();
        return Ok(Attempt::UnknownCredential);
    };

    let target = ctx
        .image
        .coords(offset)
        .and_then(|(x, y)| ctx.image.expected(x, y).map(|color| (x, y, color)));
    let Some((x, y, color)) = target else {
        ctx.pool.release(lease, PaintOutcome::Failed);
        ctx.stats.record_skipped();
        return Ok(Attempt::Skipped);
    };

    let (bx, by) = ctx.placement.map(x, y);
    let request = PaintRequest {
        x: bx,
        y: by,
        color,
        uid: credential.id,
        token: credential.token,
    };

    match ctx.painter.paint(&request).await {
        Ok(()) => {
            ctx.pool.release(lease, PaintOutcome::Painted);
            ctx.stats.record_painted();
            let remaining = ctx.pending.len();
            if remaining > 0 {
                info!(
                    event = "paint_ok",
                    uid,
                    x = bx,
                    y = by,
                    color = %color,
                    remaining,
                    eta_secs = ctx.eta_secs(remaining).unwrap_or_default()
                );
            } else {
                debug!(event = "paint_ok", uid, x = bx, y = by, color = %color);
            }
            Ok(Attempt::Painted)
        }
        Err(err) => {
            ctx.pool.release(lease, PaintOutcome::Failed);
            ctx.stats.record_failed();
            warn!(event = "paint_failed", uid, x = bx, y = by, error = %err);
            if ctx.config.requeue_failed {
                ctx.pending.enqueue(offset, shutdown).await?;
            }
            Ok(Attempt::Failed)
        }
    }
}
