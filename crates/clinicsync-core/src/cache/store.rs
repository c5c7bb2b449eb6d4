//! The shared, multi-collection Resource Cache.
//!
//! Exactly one snapshot per collection lives here. Views read `Arc`
//! snapshots and push fresher data back through `set`; they never mutate
//! a snapshot in place. Every write bumps the collection's generation, and
//! a preload result is only applied if the generation it started from is
//! still current, so a `set` or `clear_all` issued while a fetch is in
//! flight always wins over that fetch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::mirror::{Mirror, DASHBOARD_KEY};
use crate::api::{ClinicApi, DispatchError};
use crate::models::{Collection, DashboardStats, Record};

#[derive(Debug, Clone, Default)]
struct Slot {
    records: Arc<Vec<Record>>,
    settled: bool,
    generation: u64,
}

/// Change notification for subscribers. `collection` is `None` when every
/// collection changed at once (preload, refresh, clear).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheEvent {
    pub revision: u64,
    pub collection: Option<Collection>,
}

/// Outcome of one `preload_all` cycle.
#[derive(Debug, Default)]
pub struct PreloadReport {
    pub loaded: Vec<Collection>,
    pub failed: Vec<(Collection, DispatchError)>,
    /// Fetched fine but superseded by a newer write while in flight.
    pub discarded: Vec<Collection>,
    /// Some fetch ended in `AuthorizationExhausted`; the credential has
    /// already been invalidated by the API client.
    pub authorization_failed: bool,
}

impl PreloadReport {
    pub fn all_loaded(&self) -> bool {
        self.failed.is_empty() && self.discarded.is_empty()
    }
}

pub struct ResourceCache {
    api: ClinicApi,
    mirror: Option<Mirror>,
    slots: RwLock<HashMap<Collection, Slot>>,
    dashboard: RwLock<Option<DashboardStats>>,
    events: watch::Sender<CacheEvent>,
    revision: AtomicU64,
    /// Bumped by every `clear_all`.
    resets: AtomicU64,
    /// Serializes mirror writes so a generation check and the write it
    /// guards cannot be reordered with a newer write.
    mirror_io: Mutex<()>,
}

impl ResourceCache {
    pub fn new(api: ClinicApi, mirror: Option<Mirror>) -> Self {
        let slots = Collection::ALL
            .into_iter()
            .map(|c| (c, Slot::default()))
            .collect();
        let (events, _) = watch::channel(CacheEvent::default());
        Self {
            api,
            mirror,
            slots: RwLock::new(slots),
            dashboard: RwLock::new(None),
            events,
            revision: AtomicU64::new(0),
            resets: AtomicU64::new(0),
            mirror_io: Mutex::new(()),
        }
    }

    pub fn api(&self) -> &ClinicApi {
        &self.api
    }

    // ===== Readers =====

    /// Current snapshot. Before the collection is settled this may be
    /// empty or hydrated-stale; render it, but do not treat it as
    /// representative.
    pub fn get(&self, collection: Collection) -> Arc<Vec<Record>> {
        self.read_slots()
            .get(&collection)
            .map(|s| Arc::clone(&s.records))
            .unwrap_or_default()
    }

    pub fn is_settled(&self, collection: Collection) -> bool {
        self.read_slots()
            .get(&collection)
            .map(|s| s.settled)
            .unwrap_or(false)
    }

    pub fn all_settled(&self) -> bool {
        self.read_slots().values().all(|s| s.settled)
    }

    pub fn all_empty(&self) -> bool {
        self.read_slots().values().all(|s| s.records.is_empty())
    }

    pub fn dashboard(&self) -> Option<DashboardStats> {
        self.dashboard
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// How many times `clear_all` has run. Anything derived from the cache
    /// before a change in this number belongs to the previous session.
    pub fn reset_count(&self) -> u64 {
        self.resets.load(Ordering::SeqCst)
    }

    // ===== Lifecycle =====

    /// Populate collections from the persisted mirror so views have
    /// something to render before the network answers. Corrupt or missing
    /// entries are skipped. Does not touch the settled flags.
    pub fn hydrate(&self) {
        let Some(ref mirror) = self.mirror else {
            return;
        };

        let mut hydrated = 0;
        {
            let mut slots = self.write_slots();
            for collection in Collection::ALL {
                if let Some(records) = mirror.read::<Vec<Record>>(collection.mirror_key()) {
                    let slot = slots.entry(collection).or_default();
                    slot.records = Arc::new(records);
                    slot.generation += 1;
                    hydrated += 1;
                }
            }
        }
        if let Some(stats) = mirror.read::<DashboardStats>(DASHBOARD_KEY) {
            *self.dashboard.write().unwrap_or_else(PoisonError::into_inner) = Some(stats);
        }

        debug!(hydrated, "Hydrated cache from mirror");
        self.notify(None);
    }

    /// Fetch every collection concurrently and wait for all of them to
    /// finish. Failures are logged and leave the previous snapshot in
    /// place; every collection is marked settled either way.
    pub async fn preload_all(&self) -> PreloadReport {
        info!("Preloading all collections");
        let resets_at_start = self.reset_count();

        let started: HashMap<Collection, u64> = {
            let slots = self.read_slots();
            Collection::ALL
                .into_iter()
                .map(|c| (c, slots.get(&c).map(|s| s.generation).unwrap_or(0)))
                .collect()
        };

        let fetches = Collection::ALL.into_iter().map(|collection| {
            let api = self.api.clone();
            async move { (collection, api.list(collection).await) }
        });
        let results = join_all(fetches).await;

        let mut report = PreloadReport::default();
        let mut to_persist = Vec::new();
        {
            let mut slots = self.write_slots();
            for (collection, result) in results {
                match result {
                    Ok(records) => {
                        let slot = slots.entry(collection).or_default();
                        if slot.generation != started[&collection] {
                            debug!(collection = %collection, "Discarding preload superseded by a newer write");
                            report.discarded.push(collection);
                            continue;
                        }
                        let records = Arc::new(records);
                        slot.records = Arc::clone(&records);
                        slot.generation += 1;
                        to_persist.push((collection, records, slot.generation));
                        report.loaded.push(collection);
                    }
                    Err(e) => {
                        warn!(collection = %collection, error = %e, "Preload failed, keeping previous snapshot");
                        report.authorization_failed |= e.is_authorization();
                        report.failed.push((collection, e));
                    }
                }
            }
            for slot in slots.values_mut() {
                slot.settled = true;
            }
        }

        for (collection, records, generation) in to_persist {
            self.persist_if_current(collection, &records, generation);
        }
        if report.discarded.is_empty() {
            self.refresh_dashboard(resets_at_start);
        } else {
            debug!("Skipping dashboard snapshot, a newer write superseded part of the preload");
        }

        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            discarded = report.discarded.len(),
            "Preload complete"
        );
        self.notify(None);
        report
    }

    /// Clear every settled flag, then preload again.
    pub async fn refresh_all(&self) -> PreloadReport {
        {
            let mut slots = self.write_slots();
            for slot in slots.values_mut() {
                slot.settled = false;
            }
        }
        self.notify(None);
        self.preload_all().await
    }

    /// Empty every collection and erase the mirror. Collections are left
    /// settled so nothing waits on a load that is not coming.
    pub fn clear_all(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
        {
            let mut slots = self.write_slots();
            for slot in slots.values_mut() {
                slot.records = Arc::new(Vec::new());
                slot.settled = true;
                slot.generation += 1;
            }
        }
        let io = self.lock_mirror_io();
        *self.dashboard.write().unwrap_or_else(PoisonError::into_inner) = None;

        if let Some(ref mirror) = self.mirror {
            let keys = Collection::ALL
                .iter()
                .map(|c| c.mirror_key())
                .chain(std::iter::once(DASHBOARD_KEY));
            for key in keys {
                if let Err(e) = mirror.remove(key) {
                    warn!(key, error = %e, "Failed to erase mirror entry");
                }
            }
        }
        drop(io);

        info!("Cache cleared");
        self.notify(None);
    }

    /// Push a fresher snapshot of one collection into the shared cache.
    pub fn set(&self, collection: Collection, records: Vec<Record>) {
        let records = Arc::new(records);
        let generation = {
            let mut slots = self.write_slots();
            let slot = slots.entry(collection).or_default();
            slot.records = Arc::clone(&records);
            slot.generation += 1;
            slot.generation
        };
        self.persist_if_current(collection, &records, generation);
        self.notify(Some(collection));
    }

    // ===== Internals =====

    fn read_slots(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Collection, Slot>> {
        self.slots.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_slots(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Collection, Slot>> {
        self.slots.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_mirror_io(&self) -> std::sync::MutexGuard<'_, ()> {
        self.mirror_io.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mirror `records` unless the collection has been written again since
    /// they were applied at `generation`.
    fn persist_if_current(&self, collection: Collection, records: &[Record], generation: u64) {
        let Some(ref mirror) = self.mirror else {
            return;
        };
        let _io = self.lock_mirror_io();
        let current = self.read_slots().get(&collection).map(|s| s.generation);
        if current != Some(generation) {
            debug!(collection = %collection, "Not mirroring superseded snapshot");
            return;
        }
        if let Err(e) = mirror.save(collection.mirror_key(), &records) {
            warn!(collection = %collection, error = %e, "Failed to mirror collection");
        }
    }

    /// Recompute the dashboard snapshot, unless the cache was cleared since
    /// the preload that asked for it started.
    fn refresh_dashboard(&self, resets_at_start: u64) {
        let _io = self.lock_mirror_io();
        if self.reset_count() != resets_at_start {
            debug!("Cache cleared during preload, not recording dashboard stats");
            return;
        }
        let stats = {
            let slots = self.read_slots();
            DashboardStats::from_counts(slots.iter().map(|(c, s)| (*c, s.records.len())))
        };
        if let Some(ref mirror) = self.mirror {
            if let Err(e) = mirror.save(DASHBOARD_KEY, &stats) {
                warn!(error = %e, "Failed to mirror dashboard stats");
            }
        }
        *self.dashboard.write().unwrap_or_else(PoisonError::into_inner) = Some(stats);
    }

    fn notify(&self, collection: Option<Collection>) {
        let revision = self.revision.fetch_add(1, Ordering::Relaxed) + 1;
        self.events.send_replace(CacheEvent {
            revision,
            collection,
        });
    }
}
