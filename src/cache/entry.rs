//! Per-key cache entry state

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::sync::{oneshot, watch};

use crate::api::ApiError;

/// Where an entry is in the mutation lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPhase {
    /// Holds the last-known-good value
    Idle,
    /// At least one optimistic mutation awaits the server
    Pending,
    /// A server response arrived and is being folded in
    Reconciling,
    /// A mutation failed and its projection was rolled back
    Error,
}

impl fmt::Display for EntryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntryPhase::Idle => "idle",
            EntryPhase::Pending => "pending",
            EntryPhase::Reconciling => "reconciling",
            EntryPhase::Error => "error",
        };
        f.write_str(s)
    }
}

/// What subscribers see after every change
#[derive(Debug, Clone)]
pub struct EntrySnapshot<V> {
    pub value: Option<V>,
    pub phase: EntryPhase,
    pub last_error: Option<ApiError>,
}

/// Pure function from the prior cached value to the next one
pub type Projector<V> = Arc<dyn Fn(Option<&V>) -> V + Send + Sync>;

pub(crate) type SharedFetch<V> = Shared<BoxFuture<'static, Result<V, ApiError>>>;

/// Resolves once the write queued ahead of it has finished
pub(crate) type WriteTurn = Shared<BoxFuture<'static, ()>>;

pub(crate) struct PendingMutation<V> {
    pub id: u64,
    pub projector: Projector<V>,
}

pub(crate) struct EntryState<V> {
    /// Last value confirmed by the server (or seeded)
    pub confirmed: Option<V>,
    /// Optimistic projections still waiting on the server, oldest first
    pub pending: Vec<PendingMutation<V>>,
    /// `confirmed` with every pending projection applied in order
    pub visible: Option<V>,
    pub phase: EntryPhase,
    pub last_error: Option<ApiError>,
    pub fetched_at: Option<Instant>,
    pub inflight: Option<(u64, SharedFetch<V>)>,
}

impl<V: Clone> EntryState<V> {
    fn new() -> Self {
        Self {
            confirmed: None,
            pending: Vec::new(),
            visible: None,
            phase: EntryPhase::Idle,
            last_error: None,
            fetched_at: None,
            inflight: None,
        }
    }

    /// Rebuild the visible value from the confirmed base
    pub fn recompute(&mut self) {
        let mut value = self.confirmed.clone();
        for mutation in &self.pending {
            value = Some((mutation.projector)(value.as_ref()));
        }
        self.visible = value;
    }

    pub fn resting_phase(&self) -> EntryPhase {
        if self.pending.is_empty() {
            EntryPhase::Idle
        } else {
            EntryPhase::Pending
        }
    }

    fn snapshot(&self) -> EntrySnapshot<V> {
        EntrySnapshot {
            value: self.visible.clone(),
            phase: self.phase,
            last_error: self.last_error.clone(),
        }
    }
}

pub(crate) struct Entry<V> {
    state: Mutex<EntryState<V>>,
    /// Tail of this key's remote write queue
    writes: Mutex<Option<WriteTurn>>,
    tx: watch::Sender<EntrySnapshot<V>>,
}

impl<V: Clone> Entry<V> {
    pub fn new() -> Self {
        let state = EntryState::new();
        let (tx, _rx) = watch::channel(state.snapshot());
        Self {
            state: Mutex::new(state),
            writes: Mutex::new(None),
            tx,
        }
    }

    /// Never held across an `.await`
    pub fn lock(&self) -> MutexGuard<'_, EntryState<V>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn publish(&self, state: &EntryState<V>) {
        self.tx.send_replace(state.snapshot());
    }

    pub fn subscribe(&self) -> watch::Receiver<EntrySnapshot<V>> {
        self.tx.subscribe()
    }

    /// Join the back of the write queue. Await the returned turn before
    /// writing; the write after this one starts once the sender is dropped.
    pub fn queue_write(&self) -> (Option<WriteTurn>, oneshot::Sender<()>) {
        let (done, finished) = oneshot::channel::<()>();
        let turn = finished.map(|_| ()).boxed().shared();
        let previous = self
            .writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(turn);
        (previous, done)
    }

    pub fn is_unused(&self) -> bool {
        let state = self.lock();
        state.pending.is_empty() && state.inflight.is_none()
    }
}
