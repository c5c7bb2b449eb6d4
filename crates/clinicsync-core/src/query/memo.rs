use std::collections::{HashMap, HashSet};

use super::{DatasetId, RangeKey};

/// Which (dataset, range) pairs have completed a fetch.
///
/// A pair is only marked after its fetch finished with data (possibly
/// empty). Invalidating a dataset forgets every range of it and bumps the
/// dataset's epoch, so fetches started before the invalidation can tell
/// they are stale.
#[derive(Debug, Default, Clone)]
pub struct QueryMemo {
    satisfied: HashSet<(DatasetId, RangeKey)>,
    epochs: HashMap<DatasetId, u64>,
}

impl QueryMemo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_satisfied(&self, dataset: DatasetId, range: &RangeKey) -> bool {
        self.satisfied.contains(&(dataset, *range))
    }

    pub fn mark_satisfied(&mut self, dataset: DatasetId, range: &RangeKey) {
        self.satisfied.insert((dataset, *range));
    }

    pub fn invalidate(&mut self, dataset: DatasetId) {
        self.satisfied.retain(|(d, _)| *d != dataset);
        *self.epochs.entry(dataset).or_insert(0) += 1;
    }

    /// Forget everything. Every dataset's epoch moves, including ones with
    /// nothing satisfied yet, so no fetch already in flight can land.
    pub fn invalidate_all(&mut self) {
        for dataset in DatasetId::ALL {
            self.invalidate(dataset);
        }
    }

    pub fn epoch(&self, dataset: DatasetId) -> u64 {
        self.epochs.get(&dataset).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Collection;
    use chrono::NaiveDate;

    fn jan(day: u32) -> RangeKey {
        RangeKey::day(NaiveDate::from_ymd_opt(2024, 1, day).unwrap())
    }

    #[test]
    fn test_marking_is_per_range() {
        let mut memo = QueryMemo::new();
        assert!(!memo.is_satisfied(Collection::Sales, &jan(1)));

        memo.mark_satisfied(Collection::Sales, &jan(1));
        assert!(memo.is_satisfied(Collection::Sales, &jan(1)));
        assert!(!memo.is_satisfied(Collection::Sales, &jan(2)));
        assert!(!memo.is_satisfied(Collection::Consignments, &jan(1)));
    }

    #[test]
    fn test_invalidate_forgets_dataset_and_bumps_epoch() {
        let mut memo = QueryMemo::new();
        memo.mark_satisfied(Collection::Sales, &jan(1));
        memo.mark_satisfied(Collection::Sales, &jan(2));
        memo.mark_satisfied(Collection::Visits, &jan(1));

        memo.invalidate(Collection::Sales);

        assert!(!memo.is_satisfied(Collection::Sales, &jan(1)));
        assert!(!memo.is_satisfied(Collection::Sales, &jan(2)));
        assert!(memo.is_satisfied(Collection::Visits, &jan(1)));
        assert_eq!(memo.epoch(Collection::Sales), 1);
        assert_eq!(memo.epoch(Collection::Visits), 0);
    }

    #[test]
    fn test_invalidate_all() {
        let mut memo = QueryMemo::new();
        memo.mark_satisfied(Collection::Visits, &RangeKey::unbounded());
        memo.invalidate_all();
        assert!(!memo.is_satisfied(Collection::Visits, &RangeKey::unbounded()));
        assert_eq!(memo.epoch(Collection::Visits), 1);
        assert_eq!(memo.epoch(Collection::Sales), 1);
    }
}
