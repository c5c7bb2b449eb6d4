use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, warn};

use super::Credential;
use crate::cache::mirror::{Mirror, CREDENTIAL_KEY};
use crate::signals::{Signal, SignalBus};

struct Inner {
    // Replaced wholesale, never mutated in place, so a poisoned guard
    // still holds a consistent value.
    current: RwLock<Option<Arc<Credential>>>,
    bus: SignalBus,
    mirror: Option<Mirror>,
}

/// Holds the current credential for outgoing requests.
///
/// Clone is cheap and all clones share the same slot. `set` broadcasts
/// `Signal::CredentialAvailable`, `clear` broadcasts `Signal::CredentialCleared`.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<Inner>,
}

impl CredentialStore {
    /// An in-memory store with no persistence.
    pub fn new(bus: SignalBus) -> Self {
        Self {
            inner: Arc::new(Inner {
                current: RwLock::new(None),
                bus,
                mirror: None,
            }),
        }
    }

    /// A store that restores the credential from the mirror and keeps the
    /// mirror in sync on every `set`/`clear`.
    ///
    /// A restored credential is not announced; call `announce` once
    /// listeners are subscribed.
    pub fn with_mirror(bus: SignalBus, mirror: Mirror) -> Self {
        let restored = mirror.read::<Credential>(CREDENTIAL_KEY).map(Arc::new);
        if restored.is_some() {
            debug!("Restored credential from mirror");
        }
        Self {
            inner: Arc::new(Inner {
                current: RwLock::new(restored),
                bus,
                mirror: Some(mirror),
            }),
        }
    }

    pub fn get(&self) -> Option<Arc<Credential>> {
        self.inner
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_present(&self) -> bool {
        self.get().is_some()
    }

    pub fn set(&self, credential: Credential) {
        if let Some(ref mirror) = self.inner.mirror {
            if let Err(e) = mirror.save(CREDENTIAL_KEY, &credential) {
                warn!(error = %e, "Failed to persist credential");
            }
        }
        *self.inner.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(credential));
        info!("Credential set");
        self.inner.bus.emit(Signal::CredentialAvailable);
    }

    /// Drop the credential and tell every listener to reset dependent state.
    pub fn clear(&self) {
        let previous = self
            .inner
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(ref mirror) = self.inner.mirror {
            if let Err(e) = mirror.remove(CREDENTIAL_KEY) {
                warn!(error = %e, "Failed to remove persisted credential");
            }
        }
        info!(had_credential = previous.is_some(), "Credential cleared");
        self.inner.bus.emit(Signal::CredentialCleared);
    }

    /// Clear the store only if `failed` is still the current credential.
    ///
    /// Returns whether a clear happened. Concurrent calls that all failed
    /// with the same credential clear it once, and a credential set after
    /// the failing call started is left alone.
    pub fn invalidate(&self, failed: &Credential) -> bool {
        let mut guard = self.inner.current.write().unwrap_or_else(PoisonError::into_inner);
        if !guard.as_deref().is_some_and(|current| current == failed) {
            return false;
        }
        *guard = None;
        drop(guard);

        if let Some(ref mirror) = self.inner.mirror {
            if let Err(e) = mirror.remove(CREDENTIAL_KEY) {
                warn!(error = %e, "Failed to remove persisted credential");
            }
        }
        warn!("Credential rejected under every scheme, clearing");
        self.inner.bus.emit(Signal::CredentialCleared);
        true
    }

    /// Re-broadcast `CredentialAvailable` for a credential that is already
    /// present, e.g. one restored from the mirror at startup.
    pub fn announce(&self) -> bool {
        if self.is_present() {
            self.inner.bus.emit(Signal::CredentialAvailable);
            true
        } else {
            false
        }
    }
}
