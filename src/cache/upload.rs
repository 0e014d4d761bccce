//! File uploads shown optimistically as placeholder records

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::collection::{append, swap_matching};
use super::key::CacheKey;
use super::store::{MutateOptions, MutationCache, MutationHandle, Resolution};
use crate::api::{ApiError, ProgressFn};
use crate::domain::Record;

/// Forwards transport progress to a callback, clamped to 0..=100 and never
/// going backwards
pub struct UploadProgress {
    current: AtomicU8,
    sink: Box<dyn Fn(u8) + Send + Sync>,
}

impl UploadProgress {
    pub fn new(sink: impl Fn(u8) + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            current: AtomicU8::new(0),
            sink: Box::new(sink),
        })
    }

    pub fn report(&self, percent: u8) {
        let percent = percent.min(100);
        let previous = self.current.fetch_max(percent, Ordering::SeqCst);
        if percent >= previous {
            (self.sink)(percent);
        }
    }

    /// Emit the final 100 if the transport never did
    pub fn complete(&self) {
        if self.current.load(Ordering::SeqCst) < 100 {
            self.report(100);
        }
    }

    pub fn current(&self) -> u8 {
        self.current.load(Ordering::SeqCst)
    }

    pub fn as_progress_fn(self: &Arc<Self>) -> ProgressFn {
        let this = Arc::clone(self);
        Arc::new(move |percent| this.report(percent))
    }
}

/// An upload in flight. The placeholder is already in the cache.
pub struct UploadHandle<T> {
    mutation: MutationHandle<Vec<T>>,
    created: Arc<Mutex<Option<T>>>,
    progress: Arc<UploadProgress>,
}

impl<T: Record> UploadHandle<T> {
    pub fn progress(&self) -> u8 {
        self.progress.current()
    }

    /// Wait for the server; yields the created record
    pub async fn finish(self) -> Result<T, ApiError> {
        self.mutation.await?;
        let created = self.created.lock().unwrap_or_else(|e| e.into_inner()).take();
        created.ok_or_else(|| ApiError::Unexpected {
            message: "upload settled without a created record".to_string(),
        })
    }
}

/// Insert `placeholder` into the list at `key` and run `send`.
///
/// On success the placeholder gives way to the server's record, which also
/// replaces any element already in the confirmed list that `correlate`
/// matches (a poll may have fetched it first). On failure the placeholder
/// disappears and the error comes back from `finish`. No retries.
pub fn start_upload<T, C, S, Fut>(
    cache: &MutationCache<Vec<T>>,
    key: &CacheKey,
    placeholder: T,
    correlate: C,
    on_progress: impl Fn(u8) + Send + Sync + 'static,
    send: S,
) -> UploadHandle<T>
where
    T: Record,
    C: Fn(&T, &T) -> bool + Send + Sync + 'static,
    S: FnOnce(ProgressFn) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
{
    let progress = UploadProgress::new(on_progress);
    let created = Arc::new(Mutex::new(None));

    let remote_progress = Arc::clone(&progress);
    let slot = Arc::clone(&created);
    let mutation = cache.mutate(
        key,
        append(placeholder),
        move || async move {
            let record = send(remote_progress.as_progress_fn()).await?;
            remote_progress.complete();
            debug!("Upload confirmed by server");
            *slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(record.clone());
            Ok(Resolution::merge(move |list| swap_matching(list, record, correlate)))
        },
        MutateOptions::default(),
    );

    UploadHandle {
        mutation,
        created,
        progress,
    }
}
