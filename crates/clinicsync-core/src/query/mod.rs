//! Query memoization for data-browsing views.
//!
//! Report tabs and paginated tables fetch slices of a dataset under a
//! filter range. `QueryMemo` remembers which (dataset, range) pairs have
//! been loaded; `QueryLoader` uses it to skip repeat fetches, reuse the
//! shared cache for unranged requests, and warm sibling datasets.

pub mod loader;
pub mod memo;
pub mod range;

pub use loader::{QueryLoader, Slice, SliceSource};
pub use memo::QueryMemo;
pub use range::RangeKey;

use crate::models::Collection;

/// Datasets browsed by report views are the shared collections.
pub type DatasetId = Collection;
