use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Collection;

/// Numeric snapshot shown on the dashboard, derived from the shared cache.
///
/// Persisted alongside the collections so the dashboard has numbers to
/// show before the first preload completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub counts: BTreeMap<Collection, usize>,
    pub computed_at: DateTime<Utc>,
}

impl DashboardStats {
    pub fn from_counts(counts: impl IntoIterator<Item = (Collection, usize)>) -> Self {
        Self {
            counts: counts.into_iter().collect(),
            computed_at: Utc::now(),
        }
    }

    pub fn count(&self, collection: Collection) -> usize {
        self.counts.get(&collection).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_default_to_zero() {
        let stats = DashboardStats::from_counts([(Collection::Patients, 3), (Collection::Visits, 5)]);
        assert_eq!(stats.count(Collection::Patients), 3);
        assert_eq!(stats.count(Collection::Sales), 0);
        assert_eq!(stats.total(), 8);
    }

    #[test]
    fn test_serializes_with_collection_keys() {
        let stats = DashboardStats::from_counts([(Collection::PharmacyItems, 2)]);
        let json = serde_json::to_value(&stats).expect("serialize stats");
        assert_eq!(json["counts"]["pharmacy_items"], 2);
    }
}
