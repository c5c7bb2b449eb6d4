//! Process-wide signals.
//!
//! Emitters (the credential store, navigation, settings screens) and
//! listeners (the cache coordinator) only share a `SignalBus` handle, never
//! references to each other.

use tokio::sync::broadcast;
use tracing::debug;

/// Buffer size for the broadcast channel. Slow listeners that fall further
/// behind than this see `RecvError::Lagged` and skip ahead.
const SIGNAL_BUFFER_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// A credential was set and requests can now be authenticated.
    CredentialAvailable,
    /// The credential was cleared (sign-out or forced invalidation).
    CredentialCleared,
    /// Some part of the application asked for the shared cache to be reset.
    ForceCacheReset,
}

/// Cheap to clone; all clones share the same channel.
#[derive(Debug, Clone)]
pub struct SignalBus {
    tx: broadcast::Sender<Signal>,
}

impl SignalBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(SIGNAL_BUFFER_SIZE);
        Self { tx }
    }

    /// Broadcast a signal. Having no listeners is not an error.
    pub fn emit(&self, signal: Signal) {
        if self.tx.send(signal).is_err() {
            debug!(?signal, "Signal emitted with no listeners");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.tx.subscribe()
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}
