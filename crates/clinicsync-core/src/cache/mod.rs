//! Shared Resource Cache.
//!
//! This module provides the `ResourceCache`, the single owner of every
//! shared collection (patients, visits, pharmacy items, sales,
//! consignments, quick-visits), the `Mirror` it persists to, and the
//! `CacheCoordinator` that drives it from process-wide signals.
//!
//! Mirrored data is only a startup latency optimization; a successful
//! network fetch always replaces it.

pub mod coordinator;
pub mod mirror;
pub mod store;

pub use coordinator::CacheCoordinator;
pub use mirror::{Mirror, Mirrored};
pub use store::{CacheEvent, PreloadReport, ResourceCache};
