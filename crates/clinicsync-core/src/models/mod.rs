//! Data models shared by the cache, the API client and the query layer.
//!
//! Records are deliberately loosely typed: the clinical record shape is
//! owned by the views, this layer only moves JSON objects around.
//!
//! - `Collection`: the six shared resource collections
//! - `Record`: one JSON record
//! - `DashboardStats`: numeric snapshot derived from the cache

pub mod collection;
pub mod dashboard;

pub use collection::{Collection, ParseCollectionError};
pub use dashboard::DashboardStats;

/// A single loosely-typed record as returned by the backend.
pub type Record = serde_json::Value;
