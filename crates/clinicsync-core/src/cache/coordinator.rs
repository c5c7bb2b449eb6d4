//! Drives the Resource Cache from process-wide signals.
//!
//! - `CredentialAvailable`: preload once per sign-in; if everything is still
//!   empty after settling while a credential is present, refresh once more
//! - `CredentialCleared`: clear the cache (sign-out or forced invalidation)
//! - `ForceCacheReset`: clear the cache on request from anywhere

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::{RecvError, TryRecvError}};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::ResourceCache;
use crate::signals::{Signal, SignalBus};

pub struct CacheCoordinator {
    cache: Arc<ResourceCache>,
    rx: broadcast::Receiver<Signal>,
    /// A preload already ran for the current sign-in.
    preloaded: bool,
}

impl CacheCoordinator {
    /// Subscribes immediately, so signals emitted between `new` and `spawn`
    /// are not lost.
    pub fn new(cache: Arc<ResourceCache>, bus: &SignalBus) -> Self {
        Self {
            cache,
            rx: bus.subscribe(),
            preloaded: false,
        }
    }

    /// Run the coordinator on its own task until the bus is dropped.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        debug!("Cache coordinator started");
        loop {
            match self.rx.recv().await {
                Ok(signal) => self.handle(signal).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Cache coordinator fell behind on signals");
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Cache coordinator stopped");
    }

    /// Handle every signal already queued, including ones emitted while
    /// handling, then return. For callers that drive the cache inline
    /// instead of on a background task.
    pub async fn drain(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(signal) => self.handle(signal).await,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Cache coordinator fell behind on signals");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }

    pub async fn handle(&mut self, signal: Signal) {
        match signal {
            Signal::CredentialAvailable => self.on_credential_available().await,
            Signal::CredentialCleared => {
                info!("Credential cleared, resetting cache");
                self.preloaded = false;
                self.cache.clear_all();
            }
            Signal::ForceCacheReset => {
                info!("Cache reset requested");
                self.cache.clear_all();
            }
        }
    }

    async fn on_credential_available(&mut self) {
        if self.preloaded {
            debug!("Credential replaced, preload already done for this sign-in");
            return;
        }
        self.preloaded = true;

        let report = self.cache.preload_all().await;
        if report.authorization_failed {
            // The API client has already cleared the credential; the
            // matching CredentialCleared signal resets the cache.
            error!("Preload rejected the credential");
            return;
        }

        let credentials = self.cache.api().credentials();
        if self.cache.all_settled() && self.cache.all_empty() && credentials.is_present() {
            info!("Every collection empty after preload, refreshing once");
            self.cache.refresh_all().await;
        }
    }
}
