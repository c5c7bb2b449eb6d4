//! Memoized slice loading for report-style views.
//!
//! A view switching between datasets and filter ranges calls `load` on
//! every update. Unranged requests read the shared cache directly whenever
//! it is settled; slices already fetched are served from memory; everything
//! else goes to the network. Sibling datasets for the same range are warmed
//! in the background so switching tabs later is instant.
//!
//! Memoized slices belong to one cache session: after `ResourceCache::clear_all`
//! they are all forgotten and fetches started before it are discarded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{DatasetId, QueryMemo, RangeKey};
use crate::api::DispatchError;
use crate::cache::ResourceCache;
use crate::models::Record;

type SliceKey = (DatasetId, RangeKey);

/// Where a slice handed back by `load` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceSource {
    /// Already fetched earlier for this exact (dataset, range).
    Memo,
    /// Unranged request served straight from the settled shared cache.
    SharedCache,
    /// Fetched from the backend for this call.
    Network,
    /// Fetched, but the view moved on before it arrived; not memoized.
    Superseded,
}

#[derive(Debug, Clone)]
pub struct Slice {
    pub records: Arc<Vec<Record>>,
    pub source: SliceSource,
}

/// Identity a fetch was issued under; its result only applies if this is
/// still current when it lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ViewTicket {
    seq: u64,
    epoch: u64,
}

#[derive(Default)]
struct LoaderState {
    memo: QueryMemo,
    slices: HashMap<SliceKey, Arc<Vec<Record>>>,
    active_seq: u64,
    /// Background fetches by key; flips to `true` once the result is applied.
    in_flight: HashMap<SliceKey, watch::Sender<bool>>,
    prefetch: Option<JoinHandle<()>>,
    /// `ResourceCache::reset_count` this state was built against.
    seen_resets: u64,
}

impl LoaderState {
    fn memoized(&self, key: &SliceKey) -> Option<Arc<Vec<Record>>> {
        if self.memo.is_satisfied(key.0, &key.1) {
            self.slices.get(key).cloned()
        } else {
            None
        }
    }

    fn store(&mut self, key: SliceKey, records: Arc<Vec<Record>>) {
        self.memo.mark_satisfied(key.0, &key.1);
        self.slices.insert(key, records);
    }

    fn reset(&mut self, resets: u64) {
        debug!("Shared cache was cleared, forgetting memoized slices");
        self.memo.invalidate_all();
        self.slices.clear();
        self.seen_resets = resets;
    }
}

/// One per view. Clone is cheap and clones share memo state.
#[derive(Clone)]
pub struct QueryLoader {
    cache: Arc<ResourceCache>,
    state: Arc<Mutex<LoaderState>>,
}

impl QueryLoader {
    pub fn new(cache: Arc<ResourceCache>) -> Self {
        let state = LoaderState {
            seen_resets: cache.reset_count(),
            ..LoaderState::default()
        };
        Self {
            cache,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Lock the state, first dropping everything memoized before the most
    /// recent cache reset.
    fn lock(&self) -> MutexGuard<'_, LoaderState> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let resets = self.cache.reset_count();
        if state.seen_resets != resets {
            state.reset(resets);
        }
        state
    }

    pub fn is_satisfied(&self, dataset: DatasetId, range: &RangeKey) -> bool {
        self.lock().memo.is_satisfied(dataset, range)
    }

    pub fn mark_satisfied(&self, dataset: DatasetId, range: &RangeKey, records: Vec<Record>) {
        self.lock().store((dataset, *range), Arc::new(records));
    }

    /// Forget every slice of `dataset`; in-flight fetches for it are discarded.
    pub fn invalidate(&self, dataset: DatasetId) {
        let mut state = self.lock();
        state.memo.invalidate(dataset);
        state.slices.retain(|(d, _), _| *d != dataset);
    }

    /// Load the active slice for a view, warming `siblings` for the same
    /// range in the background.
    ///
    /// Transport and other errors leave the pair unsatisfied so the next
    /// call retries.
    pub async fn load(
        &self,
        dataset: DatasetId,
        range: RangeKey,
        siblings: &[DatasetId],
    ) -> Result<Slice, DispatchError> {
        let key = (dataset, range);
        let ticket = {
            let mut state = self.lock();
            state.active_seq += 1;
            ViewTicket {
                seq: state.active_seq,
                epoch: state.memo.epoch(dataset),
            }
        };

        let others: Vec<DatasetId> = siblings.iter().copied().filter(|d| *d != dataset).collect();
        self.prefetch(&others, range);

        // Read through on every call so writes to the shared cache show up.
        if let Some(records) = self.reuse_shared(dataset, &range) {
            self.lock().memo.mark_satisfied(dataset, &range);
            return Ok(Slice {
                records,
                source: SliceSource::SharedCache,
            });
        }

        if let Some(slice) = self.memo_slice(&key) {
            return Ok(slice);
        }

        let pending = self.lock().in_flight.get(&key).map(watch::Sender::subscribe);
        if let Some(mut done) = pending {
            debug!(dataset = %dataset, range = %range, "Waiting on background fetch of the same slice");
            // A dropped sender means the fetch went away; fall through and fetch.
            let _ = done.wait_for(|applied| *applied).await;
            if let Some(slice) = self.memo_slice(&key) {
                return Ok(slice);
            }
        }

        let records = Arc::new(self.cache.api().fetch_dataset(dataset, &range).await?);

        let mut state = self.lock();
        let current = ViewTicket {
            seq: state.active_seq,
            epoch: state.memo.epoch(dataset),
        };
        if current != ticket {
            debug!(dataset = %dataset, range = %range, "View moved on, discarding slice");
            return Ok(Slice {
                records,
                source: SliceSource::Superseded,
            });
        }
        state.store(key, Arc::clone(&records));
        Ok(Slice {
            records,
            source: SliceSource::Network,
        })
    }

    fn memo_slice(&self, key: &SliceKey) -> Option<Slice> {
        let records = self.lock().memoized(key)?;
        debug!(dataset = %key.0, range = %key.1, "Slice served from memo");
        Some(Slice {
            records,
            source: SliceSource::Memo,
        })
    }

    /// An unranged request means "everything", which a settled, non-empty
    /// shared collection already is.
    fn reuse_shared(&self, dataset: DatasetId, range: &RangeKey) -> Option<Arc<Vec<Record>>> {
        if !range.is_unbounded() || !self.cache.is_settled(dataset) {
            return None;
        }
        let records = self.cache.get(dataset);
        if records.is_empty() {
            None
        } else {
            debug!(dataset = %dataset, count = records.len(), "Reusing shared collection");
            Some(records)
        }
    }

    /// Best-effort background fetch of every dataset in `datasets` that is
    /// neither satisfied, nor already in flight, nor readable from the
    /// shared cache for `range`.
    pub fn prefetch(&self, datasets: &[DatasetId], range: RangeKey) {
        let mut pending = Vec::new();
        {
            let mut state = self.lock();
            for &dataset in datasets {
                let key = (dataset, range);
                if state.memo.is_satisfied(dataset, &range) || state.in_flight.contains_key(&key) {
                    continue;
                }
                if self.reuse_shared(dataset, &range).is_some() {
                    continue;
                }
                let (done, _) = watch::channel(false);
                state.in_flight.insert(key, done);
                pending.push((dataset, state.memo.epoch(dataset)));
            }
        }
        if pending.is_empty() {
            return;
        }

        let loader = self.clone();
        let handle = tokio::spawn(async move {
            let fetches = pending.into_iter().map(|(dataset, epoch)| {
                let api = loader.cache.api().clone();
                async move { (dataset, epoch, api.fetch_dataset(dataset, &range).await) }
            });
            let results = join_all(fetches).await;

            let mut state = loader.lock();
            for (dataset, epoch, result) in results {
                let key = (dataset, range);
                let done = state.in_flight.remove(&key);
                match result {
                    Ok(records) if state.memo.epoch(dataset) == epoch => {
                        debug!(dataset = %dataset, range = %range, count = records.len(), "Prefetched slice");
                        state.store(key, Arc::new(records));
                    }
                    Ok(_) => {
                        debug!(dataset = %dataset, "Dataset invalidated during prefetch, discarding");
                    }
                    Err(e) => {
                        warn!(dataset = %dataset, range = %range, error = %e, "Prefetch failed");
                    }
                }
                if let Some(done) = done {
                    done.send_replace(true);
                }
            }
        });

        // Replacing an older handle detaches that task; it still finishes.
        self.lock().prefetch = Some(handle);
    }

    /// Wait for the most recent background prefetch to finish.
    pub async fn settle_prefetch(&self) {
        let handle = self.lock().prefetch.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Prefetch task failed");
            }
        }
    }
}
