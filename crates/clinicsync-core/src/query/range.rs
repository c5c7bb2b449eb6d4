use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The filter a dataset slice was fetched under. Both bounds inclusive;
/// no bounds at all means "everything".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RangeKey {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl RangeKey {
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// A closed range. Reversed bounds are swapped.
    pub fn between(from: NaiveDate, to: NaiveDate) -> Self {
        let (from, to) = if from <= to { (from, to) } else { (to, from) };
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn day(date: NaiveDate) -> Self {
        Self::between(date, date)
    }

    pub fn since(from: NaiveDate) -> Self {
        Self {
            from: Some(from),
            to: None,
        }
    }

    pub fn until(to: NaiveDate) -> Self {
        Self {
            from: None,
            to: Some(to),
        }
    }

    /// Build from optional bounds as a report filter bar would hand them over.
    pub fn from_bounds(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        match (from, to) {
            (Some(from), Some(to)) => Self::between(from, to),
            (from, to) => Self { from, to },
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }
}

impl fmt::Display for RangeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.from, self.to) {
            (None, None) => f.write_str("all"),
            (from, to) => write!(
                f,
                "{}..{}",
                from.map(|d| d.to_string()).unwrap_or_default(),
                to.map(|d| d.to_string()).unwrap_or_default()
            ),
        }
    }
}
