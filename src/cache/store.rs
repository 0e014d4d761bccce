//! Optimistic mutation cache
//!
//! Each key holds a value confirmed by the server plus an ordered list of
//! optimistic projections still waiting on their remote writes. Readers see
//! the confirmed value with every pending projection applied. When a write
//! settles its projection leaves the list: on success the confirmed value is
//! replaced (by the server's answer, or by the projection itself when
//! revalidation is off), on failure nothing is replaced, so the entry falls
//! back to exactly what it showed before the mutation.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::entry::{Entry, EntryPhase, EntrySnapshot, PendingMutation, Projector};
use super::key::CacheKey;
use crate::api::ApiError;

/// Cache-wide tuning
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Fetches for a key within this window reuse the cached value
    pub dedup_window: Duration,
    /// Deadline for remote writes when the caller does not set one
    pub mutation_timeout: Option<Duration>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_secs(2),
            mutation_timeout: Some(Duration::from_secs(30)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MutateOptions {
    /// Replace the optimistic value with the server's answer on success
    pub revalidate: bool,
    /// Overrides `CacheSettings::mutation_timeout`
    pub timeout: Option<Duration>,
}

impl Default for MutateOptions {
    fn default() -> Self {
        Self {
            revalidate: true,
            timeout: None,
        }
    }
}

impl MutateOptions {
    pub fn keep_optimistic() -> Self {
        Self {
            revalidate: false,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// How a successful remote write turns into the entry's confirmed value
pub enum Resolution<V> {
    /// The server returned the whole canonical value for the key
    Replace(V),
    /// The server returned part of it (a created record, say); fold that
    /// into the confirmed value
    Merge(Box<dyn FnOnce(Option<V>) -> V + Send>),
}

impl<V> Resolution<V> {
    pub fn merge(f: impl FnOnce(Option<V>) -> V + Send + 'static) -> Self {
        Resolution::Merge(Box::new(f))
    }
}

/// Resolves once the remote write behind a mutation has settled.
///
/// The write runs on its own task: dropping the handle does not cancel it.
pub struct MutationHandle<V> {
    task: JoinHandle<Result<V, ApiError>>,
}

impl<V> Future for MutationHandle<V> {
    type Output = Result<V, ApiError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.get_mut().task).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(join)) => Poll::Ready(Err(ApiError::Unexpected {
                message: format!("mutation task failed: {}", join),
            })),
            Poll::Pending => Poll::Pending,
        }
    }
}

struct Inner<V> {
    entries: Mutex<HashMap<CacheKey, Arc<Entry<V>>>>,
    settings: CacheSettings,
    next_id: AtomicU64,
}

/// Keyed cache with optimistic mutations, fetch deduplication and polling
pub struct MutationCache<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for MutationCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> Default for MutationCache<V> {
    fn default() -> Self {
        Self::new(CacheSettings::default())
    }
}

impl<V: Clone + Send + Sync + 'static> MutationCache<V> {
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                settings,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.inner.settings
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, Arc<Entry<V>>>> {
        self.inner.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn entry(&self, key: &CacheKey) -> Arc<Entry<V>> {
        let mut entries = self.entries();
        Arc::clone(entries.entry(key.clone()).or_insert_with(|| Arc::new(Entry::new())))
    }

    fn existing(&self, key: &CacheKey) -> Option<Arc<Entry<V>>> {
        self.entries().get(key).cloned()
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Whatever is cached right now, optimistic or confirmed
    pub fn read(&self, key: &CacheKey) -> Option<V> {
        self.existing(key).and_then(|entry| entry.lock().visible.clone())
    }

    pub fn phase(&self, key: &CacheKey) -> EntryPhase {
        self.existing(key)
            .map(|entry| entry.lock().phase)
            .unwrap_or(EntryPhase::Idle)
    }

    pub fn keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self.entries().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Change notifications for a key; the receiver starts at the current state
    pub fn subscribe(&self, key: &CacheKey) -> watch::Receiver<EntrySnapshot<V>> {
        self.entry(key).subscribe()
    }

    /// Install a known-good value without touching the network
    pub fn seed(&self, key: &CacheKey, value: V) {
        let entry = self.entry(key);
        let mut state = entry.lock();
        state.confirmed = Some(value);
        state.recompute();
        entry.publish(&state);
    }

    /// Make the next `fetch` go to the network
    pub fn invalidate(&self, key: &CacheKey) {
        if let Some(entry) = self.existing(key) {
            entry.lock().fetched_at = None;
        }
    }

    /// Invalidate every key whose path matches
    pub fn invalidate_path(&self, path: &str) {
        let entries: Vec<Arc<Entry<V>>> = self
            .entries()
            .iter()
            .filter(|(key, _)| key.path() == path)
            .map(|(_, entry)| Arc::clone(entry))
            .collect();
        for entry in entries {
            entry.lock().fetched_at = None;
        }
    }

    /// Drop an entry, unless writes or fetches are still running against it
    pub fn remove(&self, key: &CacheKey) -> bool {
        let mut entries = self.entries();
        match entries.get(key) {
            Some(entry) if entry.is_unused() => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Drop every entry that nothing is running against; returns how many
    /// were kept because a write or fetch is still in flight
    pub fn clear(&self) -> usize {
        let mut entries = self.entries();
        entries.retain(|_, entry| !entry.is_unused());
        if !entries.is_empty() {
            debug!(busy = entries.len(), "Kept busy entries while clearing");
        }
        entries.len()
    }

    /// Fetch through the cache. Joins a fetch already in flight for the key,
    /// and within the dedup window answers from the cache without a request.
    pub async fn fetch<F, Fut>(&self, key: &CacheKey, fetcher: F) -> Result<V, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, ApiError>> + Send + 'static,
    {
        self.load(key, fetcher, false).await
    }

    /// Like `fetch`, but always asks the server unless a fetch is already in flight
    pub async fn revalidate<F, Fut>(&self, key: &CacheKey, fetcher: F) -> Result<V, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, ApiError>> + Send + 'static,
    {
        self.load(key, fetcher, true).await
    }

    async fn load<F, Fut>(&self, key: &CacheKey, fetcher: F, force: bool) -> Result<V, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, ApiError>> + Send + 'static,
    {
        let entry = self.entry(key);
        let window = self.inner.settings.dedup_window;

        let joined = {
            let state = entry.lock();
            match &state.inflight {
                Some((id, shared)) => Some((*id, shared.clone())),
                None => {
                    let fresh = state.fetched_at.map(|at| at.elapsed() < window).unwrap_or(false);
                    if let (false, true, Some(value)) = (force, fresh, &state.visible) {
                        debug!(key = %key, "Serving fetch from cache");
                        return Ok(value.clone());
                    }
                    None
                }
            }
        };

        let (id, shared) = match joined {
            Some(found) => {
                debug!(key = %key, "Joining in-flight fetch");
                drop(fetcher);
                found
            }
            None => {
                // Built outside the lock; another caller may have installed
                // a fetch in the meantime, in which case ours is dropped
                let candidate = fetcher().boxed().shared();
                let candidate_id = self.next_id();
                let mut state = entry.lock();
                let raced = state.inflight.as_ref().map(|(i, s)| (*i, s.clone()));
                match raced {
                    Some(other) => other,
                    None => {
                        debug!(key = %key, "Fetching");
                        state.inflight = Some((candidate_id, candidate.clone()));
                        (candidate_id, candidate)
                    }
                }
            }
        };

        let result = shared.await;

        let mut state = entry.lock();
        let owner = matches!(&state.inflight, Some((current, _)) if *current == id);
        if owner {
            state.inflight = None;
            match &result {
                Ok(value) => {
                    state.confirmed = Some(value.clone());
                    state.fetched_at = Some(Instant::now());
                    state.recompute();
                }
                Err(err) => {
                    warn!(key = %key, "Fetch failed: {}", err);
                    state.last_error = Some(err.clone());
                }
            }
            entry.publish(&state);
        }

        result.map(|fetched| state.visible.clone().unwrap_or(fetched))
    }

    /// Apply `projector` to the cached value right away, then run `remote`
    /// and converge on its outcome.
    ///
    /// The optimistic value is visible to `read` and subscribers before this
    /// returns. Remote writes for the same key run one at a time, in call
    /// order: the queue slot is taken here, not when the task first runs.
    /// Must be called from within a tokio runtime.
    pub fn mutate<P, R, Fut>(
        &self,
        key: &CacheKey,
        projector: P,
        remote: R,
        options: MutateOptions,
    ) -> MutationHandle<V>
    where
        P: Fn(Option<&V>) -> V + Send + Sync + 'static,
        R: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Resolution<V>, ApiError>> + Send + 'static,
    {
        let entry = self.entry(key);
        let id = self.next_id();
        let projector: Projector<V> = Arc::new(projector);

        {
            let mut state = entry.lock();
            state.pending.push(PendingMutation {
                id,
                projector: Arc::clone(&projector),
            });
            state.phase = EntryPhase::Pending;
            state.recompute();
            entry.publish(&state);
        }
        debug!(key = %key, mutation = id, "Applied optimistic update");

        let timeout = options.timeout.or(self.inner.settings.mutation_timeout);
        let revalidate = options.revalidate;
        let key = key.clone();
        let (previous, done) = entry.queue_write();

        let task = tokio::spawn(async move {
            let _done = done;
            if let Some(previous) = previous {
                previous.await;
            }

            let outcome = match timeout {
                Some(limit) => match tokio::time::timeout(limit, remote()).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(ApiError::Timeout { after: limit }),
                },
                None => remote().await,
            };

            settle(&entry, &key, id, outcome, revalidate)
        });

        MutationHandle { task }
    }

    /// Re-fetch `key` every `interval` while `keep_polling` holds for the
    /// fetched value. Fetch errors are logged and polling carries on.
    pub fn poll<F, Fut, K>(
        &self,
        key: &CacheKey,
        interval: Duration,
        fetcher: F,
        keep_polling: K,
    ) -> super::polling::PollHandle<V>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, ApiError>> + Send + 'static,
        K: Fn(&V) -> bool + Send + Sync + 'static,
    {
        super::polling::spawn(self.clone(), key.clone(), interval, fetcher, keep_polling)
    }
}

fn settle<V: Clone>(
    entry: &Entry<V>,
    key: &CacheKey,
    id: u64,
    outcome: Result<Resolution<V>, ApiError>,
    revalidate: bool,
) -> Result<V, ApiError> {
    let mut state = entry.lock();
    let Some(position) = state.pending.iter().position(|m| m.id == id) else {
        return Err(ApiError::Unexpected {
            message: format!("mutation {} on {} vanished before settling", id, key),
        });
    };
    let mutation = state.pending.remove(position);

    match outcome {
        Ok(resolution) => {
            state.phase = EntryPhase::Reconciling;
            entry.publish(&state);

            let confirmed = if revalidate {
                match resolution {
                    Resolution::Replace(value) => value,
                    Resolution::Merge(merge) => merge(state.confirmed.take()),
                }
            } else {
                (mutation.projector)(state.confirmed.as_ref())
            };

            state.confirmed = Some(confirmed.clone());
            state.fetched_at = Some(Instant::now());
            state.last_error = None;
            state.phase = state.resting_phase();
            state.recompute();
            entry.publish(&state);

            info!(key = %key, mutation = id, "Mutation confirmed");
            Ok(confirmed)
        }
        Err(err) => {
            state.last_error = Some(err.clone());
            state.phase = EntryPhase::Error;
            state.recompute();
            entry.publish(&state);

            state.phase = state.resting_phase();
            entry.publish(&state);

            warn!(key = %key, mutation = id, "Mutation failed, rolled back: {}", err);
            Err(err)
        }
    }
}
