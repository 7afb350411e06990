//! Session cache for annotation fetches.
//!
//! Each [`CacheSlot`] holds at most one outstanding or settled fetch. Callers
//! that arrive while a fetch is pending await the same shared future, so at
//! most one request per kind is in flight. Invalidation resets the slot to
//! empty and bumps its generation; a fetch that settles afterwards is handed
//! to whoever awaited it but is never stored.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::metrics::{ANNOTATION_CACHE_HITS_TOTAL, ANNOTATION_FETCHES_TOTAL};
use crate::models::{AlertState, AnnotationEvent};
use crate::{Error, Result};

type SharedResult<T> = std::result::Result<Arc<T>, Arc<Error>>;
type SharedFetch<T> = Shared<BoxFuture<'static, SharedResult<T>>>;

enum CacheEntry<T> {
    Empty,
    Pending(SharedFetch<T>),
    Ready(SharedResult<T>),
}

/// Observable state of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Empty,
    Pending,
    Ready,
}

struct Slot<T> {
    entry: CacheEntry<T>,
    generation: u64,
}

pub struct CacheSlot<T> {
    kind: &'static str,
    inner: Mutex<Slot<T>>,
}

impl<T: Send + Sync + 'static> CacheSlot<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            inner: Mutex::new(Slot {
                entry: CacheEntry::Empty,
                generation: 0,
            }),
        }
    }

    /// Return the cached result, joining a pending fetch if there is one.
    /// `fetch` is only called when the slot is empty.
    ///
    /// Failures are cached like successes; invalidation is the retry.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (shared, generation) = {
            let mut slot = self.inner.lock().await;
            let pending = match &slot.entry {
                CacheEntry::Ready(result) => {
                    ANNOTATION_CACHE_HITS_TOTAL.with_label_values(&[self.kind]).inc();
                    return result.clone().map_err(Error::Shared);
                }
                CacheEntry::Pending(shared) => Some(shared.clone()),
                CacheEntry::Empty => None,
            };

            let shared = match pending {
                Some(shared) => {
                    ANNOTATION_CACHE_HITS_TOTAL.with_label_values(&[self.kind]).inc();
                    shared
                }
                None => {
                    debug!("Cache miss for {}, starting fetch", self.kind);
                    ANNOTATION_FETCHES_TOTAL.with_label_values(&[self.kind]).inc();
                    let fut = fetch();
                    let shared = async move { fut.await.map(Arc::new).map_err(Arc::new) }
                        .boxed()
                        .shared();
                    slot.entry = CacheEntry::Pending(shared.clone());
                    shared
                }
            };
            (shared, slot.generation)
        };

        let result = shared.await;
        self.settle(generation, &result).await;
        result.map_err(Error::Shared)
    }

    async fn settle(&self, generation: u64, result: &SharedResult<T>) {
        let mut slot = self.inner.lock().await;
        if slot.generation != generation {
            debug!("Discarding {} result fetched before invalidation", self.kind);
            return;
        }
        if matches!(slot.entry, CacheEntry::Pending(_)) {
            slot.entry = CacheEntry::Ready(result.clone());
        }
    }

    pub async fn invalidate(&self) {
        let mut slot = self.inner.lock().await;
        slot.entry = CacheEntry::Empty;
        slot.generation += 1;
    }

    pub async fn state(&self) -> CacheState {
        match self.inner.lock().await.entry {
            CacheEntry::Empty => CacheState::Empty,
            CacheEntry::Pending(_) => CacheState::Pending,
            CacheEntry::Ready(_) => CacheState::Ready,
        }
    }
}

/// The two fetch families cached for one dashboard view.
pub struct FetchCache {
    pub global_annotations: CacheSlot<Vec<AnnotationEvent>>,
    pub alert_states: CacheSlot<Vec<AlertState>>,
}

impl FetchCache {
    pub fn new() -> Self {
        Self {
            global_annotations: CacheSlot::new("global"),
            alert_states: CacheSlot::new("alert_states"),
        }
    }

    pub async fn clear(&self) {
        self.global_annotations.invalidate().await;
        self.alert_states.invalidate().await;
    }
}

impl Default for FetchCache {
    fn default() -> Self {
        Self::new()
    }
}
