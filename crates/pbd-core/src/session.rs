use crate::board::BoardSource;
use crate::config::DrawerConfig;
use crate::context::{SessionContext, SessionStats, StatsSnapshot};
use crate::credentials::CredentialRegistry;
use crate::dispatch::run_worker;
use crate::error::DrawerError;
use crate::image::{Placement, TargetImage};
use crate::paint::PaintBackend;
use crate::pending::PendingSet;
use crate::pool::CredentialPool;
use crate::reconcile;
use crate::shutdown::Shutdown;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkStatus {
    NotRunning,
    /// Fewer than two pixels queued; treated as converged.
    Idle,
    EstimatedSeconds(u64),
    NoCredentials,
}

struct RunHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    context: Arc<SessionContext>,
}

struct DrawerState {
    image: Option<Arc<TargetImage>>,
    placement: Placement,
    pending: Arc<PendingSet>,
    pool: Arc<CredentialPool>,
    run: Option<RunHandle>,
}

/// Owns the drawing session: target image, placement, known credentials,
/// and the reconcile loop plus workers while running.
pub struct Drawer {
    config: DrawerConfig,
    board: Arc<dyn BoardSource>,
    painter: Arc<dyn PaintBackend>,
    registry: Arc<CredentialRegistry>,
    state: Mutex<DrawerState>,
}

impl Drawer {
    pub fn new(
        config: DrawerConfig,
        board: Arc<dyn BoardSource>,
        painter: Arc<dyn PaintBackend>,
    ) -> Self {
        let pending = Arc::new(PendingSet::new(
            config.max_offsets(),
            config.pending_capacity,
        ));
        let pool = Arc::new(CredentialPool::new(
            config.credential_capacity,
            config.cooldown(),
        ));
        Self {
            config,
            board,
            painter,
            registry: Arc::new(CredentialRegistry::new()),
            state: Mutex::new(DrawerState {
                image: None,
                placement: Placement::default(),
                pending,
                pool,
                run: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DrawerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &DrawerConfig {
        &self.config
    }

    /// Registers a credential (or refreshes its token) and makes it
    /// available to the running pool right away.
    pub fn add_credential(&self, id: u32, token: impl Into<String>) {
        let fresh = self.registry.insert(id, token);
        let pool = Arc::clone(&self.lock().pool);
        pool.add(id);
        info!(event = "credential_added", uid = id, fresh, known = self.registry.len());
    }

    pub fn credentials(&self) -> BTreeMap<u32, String> {
        self.registry.snapshot()
    }

    /// Forgets every credential. Workers block until new ones are added.
    pub fn clear_credentials(&self) {
        self.registry.clear();
        let pool = Arc::clone(&self.lock().pool);
        pool.seed(std::iter::empty());
        info!(event = "credentials_cleared");
    }

    /// Replaces the target image. Oversized images are rejected before any
    /// state changes; accepted ones reset the session.
    pub fn load_image(&self, image: TargetImage) -> Result<(), DrawerError> {
        image.check_size(self.config.max_image_side)?;
        let (width, height) = (image.width(), image.height());
        let mut state = self.lock();
        self.reset_locked(&mut state);
        state.image = Some(Arc::new(image));
        info!(event = "image_loaded", width, height);
        Ok(())
    }

    pub fn image(&self) -> Option<Arc<TargetImage>> {
        self.lock().image.clone()
    }

    pub fn set_placement(&self, placement: Placement) -> Result<(), DrawerError> {
        placement.validate(self.config.canvas_width, self.config.canvas_height)?;
        let mut state = self.lock();
        self.reset_locked(&mut state);
        state.placement = placement;
        info!(event = "placement_set", x = placement.x, y = placement.y);
        Ok(())
    }

    pub fn placement(&self) -> Placement {
        self.lock().placement
    }

    /// Resets, then launches the reconcile loop, the workers and the rate
    /// reporter. Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), DrawerError> {
        let mut state = self.lock();
        let image = state.image.clone().ok_or(DrawerError::ImageNotLoaded)?;
        self.reset_locked(&mut state);

        let (tx, shutdown) = Shutdown::channel();
        let context = Arc::new(SessionContext {
            config: self.config.clone(),
            image,
            placement: state.placement,
            pending: Arc::clone(&state.pending),
            pool: Arc::clone(&state.pool),
            registry: Arc::clone(&self.registry),
            board: Arc::clone(&self.board),
            painter: Arc::clone(&self.painter),
            stats: Arc::new(SessionStats::new()),
        });

        let mut tasks = Vec::with_capacity(self.config.worker_count + 2);
        tasks.push(tokio::spawn(reconcile::run(
            Arc::clone(&context),
            shutdown.clone(),
        )));
        for worker in 0..self.config.worker_count {
            tasks.push(tokio::spawn(run_worker(
                worker,
                Arc::clone(&context),
                shutdown.clone(),
            )));
        }
        tasks.push(tokio::spawn(report_rate(Arc::clone(&context), shutdown)));

        info!(
            event = "session_start",
            workers = self.config.worker_count,
            credentials = self.registry.len(),
            started_at = %context.stats.started_at().to_rfc3339(),
            x = context.placement.x,
            y = context.placement.y
        );
        state.run = Some(RunHandle {
            shutdown: tx,
            tasks,
            context,
        });
        Ok(())
    }

    /// Cancels a running session (no-op when stopped) and rebuilds the
    /// pending set and the credential pool from the known credentials.
    pub fn reset(&self) {
        let mut state = self.lock();
        self.reset_locked(&mut state);
    }

    /// Like `reset`, then waits for the session's tasks to finish.
    pub async fn stop(&self) {
        let run = {
            let mut state = self.lock();
            self.reset_locked(&mut state)
        };
        if let Some(run) = run {
            for task in run.tasks {
                let _ = task.await;
            }
        }
    }

    fn reset_locked(&self, state: &mut DrawerState) -> Option<RunHandle> {
        let run = state.run.take();
        if let Some(run) = &run {
            let _ = run.shutdown.send(true);
        }
        state.pending = Arc::new(PendingSet::new(
            self.config.max_offsets(),
            self.config.pending_capacity,
        ));
        let pool = CredentialPool::new(self.config.credential_capacity, self.config.cooldown());
        pool.seed(self.registry.ids());
        state.pool = Arc::new(pool);
        info!(event = "session_reset", was_running = run.is_some());
        run
    }

    pub fn is_running(&self) -> bool {
        self.lock().run.is_some()
    }

    pub fn status(&self) -> WorkStatus {
        let state = self.lock();
        if state.run.is_none() {
            return WorkStatus::NotRunning;
        }
        let remaining = state.pending.len();
        if remaining < 2 {
            return WorkStatus::Idle;
        }
        let known = self.registry.len();
        if known == 0 {
            return WorkStatus::NoCredentials;
        }
        WorkStatus::EstimatedSeconds(remaining as u64 * self.config.interval_secs / known as u64)
    }

    pub fn pending(&self) -> Arc<PendingSet> {
        Arc::clone(&self.lock().pending)
    }

    pub fn pool(&self) -> Arc<CredentialPool> {
        Arc::clone(&self.lock().pool)
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn available_credentials(&self) -> Vec<u32> {
        self.lock().pool.available_ids()
    }

    pub fn stats(&self) -> Option<StatsSnapshot> {
        self.lock()
            .run
            .as_ref()
            .map(|run| run.context.stats.snapshot())
    }
}

async fn report_rate(ctx: Arc<SessionContext>, mut shutdown: Shutdown) {
    let interval = ctx.config.report_interval();
    if interval.is_zero() {
        return;
    }
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let credentials = ctx.registry.len();
                let stats = ctx.stats.snapshot();
                info!(
                    event = "paint_rate",
                    credentials,
                    painted = stats.painted,
                    failed = stats.failed,
                    remaining = ctx.pending.len(),
                    rate = ctx.stats.utilisation(ctx.config.interval_secs, credentials)
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::Rgb;
    use async_trait::async_trait;

    struct NoBoard;

    #[async_trait]
    impl BoardSource for NoBoard {
        async fn refresh(&self) -> Result<(), DrawerError> {
            Err(DrawerError::CanvasRefreshFailed("offline".to_string()))
        }

        fn pixel_at(&self, _x: u32, _y: u32) -> Option<Rgb> {
            None
        }
    }

    struct NoPaint;

    #[async_trait]
    impl PaintBackend for NoPaint {
        async fn paint(&self, _request: &crate::paint::PaintRequest) -> Result<(), DrawerError> {
            Err(DrawerError::PaintRejected("offline".to_string()))
        }
    }

    fn drawer() -> Drawer {
        Drawer::new(DrawerConfig::default(), Arc::new(NoBoard), Arc::new(NoPaint))
    }

    fn image(side: u32) -> TargetImage {
        TargetImage::from_rows(side, side, vec![Rgb::BLACK; (side * side) as usize])
            .expect("image")
    }

    #[test]
    fn oversized_image_leaves_current_target() {
        let drawer = drawer();
        drawer.load_image(image(2)).expect("load");
        let err = drawer.load_image(image(201)).expect_err("too large");
        assert!(matches!(err, DrawerError::SizeLimitExceeded { .. }));
        assert_eq!(drawer.image().map(|image| image.width()), Some(2));
    }

    #[test]
    fn reset_reseeds_from_known_credentials() {
        let drawer = drawer();
        drawer.add_credential(7, "t");
        drawer.reset();
        assert_eq!(drawer.available_credentials(), vec![7]);
        drawer.reset();
        assert_eq!(drawer.available_credentials(), vec![7]);
        assert_eq!(drawer.pending().flagged(), 0);
    }

    #[test]
    fn placement_is_bounded_by_canvas() {
        let drawer = drawer();
        assert!(drawer.set_placement(Placement::new(1000, 600)).is_ok());
        assert_eq!(
            drawer.set_placement(Placement::new(1001, 0)),
            Err(DrawerError::PlacementOutOfBounds { x: 1001, y: 0 })
        );
        assert_eq!(drawer.placement(), Placement::new(1000, 600));
    }

    #[test]
    fn start_requires_an_image() {
        let drawer = drawer();
        assert_eq!(drawer.start(), Err(DrawerError::ImageNotLoaded));
        assert_eq!(drawer.status(), WorkStatus::NotRunning);
    }

    #[test]
    fn clear_credentials_empties_the_pool() {
        let drawer = drawer();
        drawer.add_credential(1, "a");
        drawer.add_credential(2, "b");
        drawer.clear_credentials();
        assert!(drawer.credentials().is_empty());
        assert!(drawer.available_credentials().is_empty());
    }

    #[tokio::test]
    async fn stats_carry_the_session_start_time() {
        let drawer = drawer();
        assert!(drawer.stats().is_none());
        drawer.load_image(image(2)).expect("load");

        let before = chrono::Utc::now();
        drawer.start().expect("start");
        let stats = drawer.stats().expect("running");
        assert!(stats.started_at >= before);
        assert!(stats.started_at <= chrono::Utc::now());
        assert_eq!(stats.painted, 0);

        drawer.stop().await;
        assert!(drawer.stats().is_none());
    }
}
