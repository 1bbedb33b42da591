use crate::error::Cancelled;
use crate::shutdown::Shutdown;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintOutcome {
    Painted,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Available,
    InFlight,
    CoolingDown,
}

/// Exclusive right to use one credential. Not `Clone`: giving it back to
/// the pool consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct Lease {
    id: u32,
    epoch: u64,
}

impl Lease {
    pub fn id(&self) -> u32 {
        self.id
    }
}

#[derive(Debug, Default)]
struct PoolState {
    epoch: u64,
    slots: HashMap<u32, SlotState>,
    available: VecDeque<u32>,
}

/// Hands out credential ids to workers and throttles each id to one
/// successful paint per cooldown.
#[derive(Debug)]
pub struct CredentialPool {
    state: Mutex<PoolState>,
    ready: Notify,
    capacity: usize,
    cooldown: Duration,
}

impl CredentialPool {
    pub fn new(capacity: usize, cooldown: Duration) -> Self {
        Self {
            state: Mutex::new(PoolState {
                epoch: 0,
                slots: HashMap::with_capacity(capacity),
                available: VecDeque::with_capacity(capacity),
            }),
            ready: Notify::new(),
            capacity,
            cooldown,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the whole pool with `ids`, all available. Leases handed out
    /// before the call become stale.
    pub fn seed(&self, ids: impl IntoIterator<Item = u32>) {
        let mut state = self.lock();
        state.epoch += 1;
        state.slots.clear();
        state.available.clear();
        for id in ids {
            if state.slots.insert(id, SlotState::Available).is_none() {
                state.available.push_back(id);
            }
        }
        let known = state.slots.len();
        let epoch = state.epoch;
        drop(state);
        if known > self.capacity {
            warn!(event = "pool_over_capacity", known, capacity = self.capacity);
        }
        debug!(event = "pool_seeded", epoch, known);
        self.ready.notify_waiters();
    }

    /// Makes a newly registered credential available. Ids the pool already
    /// tracks keep their current state.
    pub fn add(&self, id: u32) -> bool {
        let mut state = self.lock();
        if state.slots.contains_key(&id) {
            return false;
        }
        state.slots.insert(id, SlotState::Available);
        state.available.push_back(id);
        let known = state.slots.len();
        drop(state);
        if known > self.capacity {
            warn!(event = "pool_over_capacity", known, capacity = self.capacity);
        }
        self.ready.notify_waiters();
        true
    }

    pub fn try_acquire(&self) -> Option<Lease> {
        let mut state = self.lock();
        let id = state.available.pop_front()?;
        state.slots.insert(id, SlotState::InFlight);
        Some(Lease {
            id,
            epoch: state.epoch,
        })
    }

    /// Waits for a credential. Returns `Cancelled` as soon as the session
    /// shuts down.
    pub async fn acquire(&self, shutdown: &mut Shutdown) -> Result<Lease, Cancelled> {
        loop {
            let notified = self.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if shutdown.is_cancelled() {
                return Err(Cancelled);
            }
            if let Some(lease) = self.try_acquire() {
                return Ok(lease);
            }

            tokio::select! {
                _ = notified => {}
                _ = shutdown.cancelled() => return Err(Cancelled),
            }
        }
    }

    /// Gives a lease back. A painted credential cools down on a detached
    /// timer task; a failed one is available again right away.
    pub fn release(self: &Arc<Self>, lease: Lease, outcome: PaintOutcome) {
        match outcome {
            PaintOutcome::Failed => {
                self.restore(lease);
            }
            PaintOutcome::Painted => {
                {
                    let mut state = self.lock();
                    if state.epoch == lease.epoch {
                        if let Some(slot) = state.slots.get_mut(&lease.id) {
                            *slot = SlotState::CoolingDown;
                        }
                    }
                }
                let pool = Arc::clone(self);
                let cooldown = self.cooldown;
                tokio::spawn(async move {
                    tokio::time::sleep(cooldown).await;
                    pool.restore(lease);
                });
            }
        }
    }

    /// Drops a credential whose token is gone. It stays out until the next
    /// `seed` or `add`.
    pub fn retire(&self, lease: Lease) {
        let mut state = self.lock();
        if state.epoch == lease.epoch {
            state.slots.remove(&lease.id);
        }
    }

    fn restore(&self, lease: Lease) -> bool {
        let mut state = self.lock();
        if state.epoch != lease.epoch {
            debug!(
                event = "stale_lease_ignored",
                uid = lease.id,
                lease_epoch = lease.epoch,
                epoch = state.epoch
            );
            return false;
        }
        match state.slots.get_mut(&lease.id) {
            Some(slot) if *slot != SlotState::Available => {
                *slot = SlotState::Available;
                state.available.push_back(lease.id);
            }
            _ => return false,
        }
        drop(state);
        self.ready.notify_waiters();
        true
    }

    pub fn state_of(&self, id: u32) -> Option<SlotState> {
        self.lock().slots.get(&id).copied()
    }

    pub fn available_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.lock().available.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of credentials the pool tracks in any state.
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
