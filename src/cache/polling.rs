//! Interval re-fetching for records still being processed

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::key::CacheKey;
use super::store::MutationCache;
use crate::api::ApiError;

/// Running poll loop. Dropping the handle stops the loop after the current
/// fetch settles.
pub struct PollHandle<V> {
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<Option<V>>>,
}

impl<V> PollHandle<V> {
    pub fn cancel(&self) {
        let _ = self.stop.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map(|t| t.is_finished()).unwrap_or(true)
    }

    /// Wait for the loop to end. `Some` carries the value that ended it,
    /// `None` means it was cancelled.
    pub async fn finished(mut self) -> Option<V> {
        let task = self.task.take()?;
        task.await.ok().flatten()
    }
}

impl<V> Drop for PollHandle<V> {
    fn drop(&mut self) {
        let _ = self.stop.send(true);
    }
}

pub(crate) fn spawn<V, F, Fut, K>(
    cache: MutationCache<V>,
    key: CacheKey,
    interval: Duration,
    fetcher: F,
    keep_polling: K,
) -> PollHandle<V>
where
    V: Clone + Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, ApiError>> + Send + 'static,
    K: Fn(&V) -> bool + Send + Sync + 'static,
{
    let (stop, mut stopped) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut rounds = 0u32;
        loop {
            if *stopped.borrow() {
                debug!(key = %key, "Polling cancelled");
                return None;
            }

            rounds += 1;
            match cache.revalidate(&key, || fetcher()).await {
                Ok(value) if !keep_polling(&value) => {
                    info!(key = %key, rounds, "Polling finished");
                    return Some(value);
                }
                Ok(_) => debug!(key = %key, rounds, "Still processing"),
                Err(err) => warn!(key = %key, rounds, "Poll fetch failed: {}", err),
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = stopped.changed() => {
                    debug!(key = %key, "Polling cancelled");
                    return None;
                }
            }
        }
    });

    PollHandle {
        stop,
        task: Some(task),
    }
}
