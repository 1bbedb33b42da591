use crate::error::Cancelled;
use crate::shutdown::Shutdown;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    AlreadyPending,
    OutOfRange,
}

#[derive(Debug)]
struct PendingState {
    flags: Vec<bool>,
    queue: VecDeque<usize>,
}

/// Deduplicating queue of image offsets that differ from the board.
///
/// An offset's flag is set from enqueue until a worker dequeues it, and an
/// offset is never queued twice while flagged.
#[derive(Debug)]
pub struct PendingSet {
    state: Mutex<PendingState>,
    capacity: usize,
    not_empty: Notify,
    not_full: Notify,
}

impl PendingSet {
    pub fn new(max_offsets: usize, capacity: usize) -> Self {
        Self {
            state: Mutex::new(PendingState {
                flags: vec![false; max_offsets],
                queue: VecDeque::new(),
            }),
            capacity: capacity.max(1),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PendingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues `offset` unless it is already pending. Waits while the queue is
    /// full.
    pub async fn enqueue(
        &self,
        offset: usize,
        shutdown: &mut Shutdown,
    ) -> Result<EnqueueOutcome, Cancelled> {
        loop {
            let space = self.not_full.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            if shutdown.is_cancelled() {
                return Err(Cancelled);
            }
            {
                let mut state = self.lock();
                match state.flags.get(offset) {
                    None => return Ok(EnqueueOutcome::OutOfRange),
                    Some(true) => return Ok(EnqueueOutcome::AlreadyPending),
                    Some(false) => {}
                }
                if state.queue.len() < self.capacity {
                    state.flags[offset] = true;
                    state.queue.push_back(offset);
                    drop(state);
                    self.not_empty.notify_waiters();
                    return Ok(EnqueueOutcome::Queued);
                }
            }

            tokio::select! {
                _ = space => {}
                _ = shutdown.cancelled() => return Err(Cancelled),
            }
        }
    }

    /// Takes the oldest offset and clears its flag. The flag is cleared
    /// before the pixel is actually fixed.
    pub fn try_dequeue(&self) -> Option<usize> {
        let mut state = self.lock();
        let offset = state.queue.pop_front()?;
        state.flags[offset] = false;
        drop(state);
        self.not_full.notify_waiters();
        Some(offset)
    }

    pub async fn dequeue(&self, shutdown: &mut Shutdown) -> Result<usize, Cancelled> {
        loop {
            let queued = self.not_empty.notified();
            tokio::pin!(queued);
            queued.as_mut().enable();

            if shutdown.is_cancelled() {
                return Err(Cancelled);
            }
            if let Some(offset) = self.try_dequeue() {
                return Ok(offset);
            }

            tokio::select! {
                _ = queued => {}
                _ = shutdown.cancelled() => return Err(Cancelled),
            }
        }
    }

    pub fn is_flagged(&self, offset: usize) -> bool {
        self.lock().flags.get(offset).copied().unwrap_or(false)
    }

    pub fn flagged(&self) -> usize {
        self.lock().flags.iter().filter(|flag| **flag).count()
    }

    /// Current queue length; only good for estimates.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
