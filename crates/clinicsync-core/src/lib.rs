//! Core library for clinicsync.
//!
//! This crate is the client-side data-access and synchronization layer of
//! the clinic administration console:
//!
//! - `auth`: the Credential Store and the OS keychain wrapper
//! - `api`: the Resilient Request Dispatcher and typed clinic endpoints
//! - `cache`: the shared Resource Cache and its Persisted Mirror
//! - `query`: memoization of (dataset, range) slices for report views
//! - `signals`: process-wide broadcast signals
//! - `config`: backend origin resolution and directory locations

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod models;
pub mod query;
pub mod signals;

pub use api::{ClinicApi, DispatchError, Dispatcher, HttpTransport, RequestDescriptor};
pub use auth::{Credential, CredentialStore, Scheme};
pub use cache::{CacheCoordinator, Mirror, PreloadReport, ResourceCache};
pub use config::Config;
pub use models::{Collection, DashboardStats, Record};
pub use query::{QueryLoader, QueryMemo, RangeKey};
pub use signals::{Signal, SignalBus};
