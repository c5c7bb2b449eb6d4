use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One of the shared resource collections owned by the `ResourceCache`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Patients,
    Visits,
    PharmacyItems,
    Sales,
    Consignments,
    QuickVisits,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown collection: {0}")]
pub struct ParseCollectionError(pub String);

impl Collection {
    /// Every collection, in preload order.
    pub const ALL: [Collection; 6] = [
        Collection::Patients,
        Collection::Visits,
        Collection::PharmacyItems,
        Collection::Sales,
        Collection::Consignments,
        Collection::QuickVisits,
    ];

    /// Path of the list-all endpoint, relative to the backend origin.
    pub fn list_path(&self) -> &'static str {
        match self {
            Collection::Patients => "/patients/",
            Collection::Visits => "/visits/",
            Collection::PharmacyItems => "/pharmacy/items/",
            Collection::Sales => "/pharmacy/sales/",
            Collection::Consignments => "/consignments/",
            Collection::QuickVisits => "/quick-visits/",
        }
    }

    /// Path of a single record of this collection.
    pub fn item_path(&self, id: &str) -> String {
        format!("{}{}/", self.list_path(), id)
    }

    /// Key under which the collection is stored in the persisted mirror.
    pub fn mirror_key(&self) -> &'static str {
        match self {
            Collection::Patients => "patients",
            Collection::Visits => "visits",
            Collection::PharmacyItems => "pharmacy_items",
            Collection::Sales => "sales",
            Collection::Consignments => "consignments",
            Collection::QuickVisits => "quick_visits",
        }
    }

    /// Envelope keys the backend is known to use for this collection's array,
    /// probed before the generic ones.
    pub fn envelope_keys(&self) -> &'static [&'static str] {
        match self {
            Collection::Patients => &["patients"],
            Collection::Visits => &["visits"],
            Collection::PharmacyItems => &["pharmacy_items", "drugs"],
            Collection::Sales => &["sales"],
            Collection::Consignments => &["consignments"],
            Collection::QuickVisits => &["quick_visits", "visits"],
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Collection::Patients => "Patients",
            Collection::Visits => "Visits",
            Collection::PharmacyItems => "Pharmacy Items",
            Collection::Sales => "Sales",
            Collection::Consignments => "Consignments",
            Collection::QuickVisits => "Quick Visits",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mirror_key())
    }
}

impl FromStr for Collection {
    type Err = ParseCollectionError;

    /// Accepts mirror keys as well as the dashed forms used in URLs
    /// (e.g. `pharmacy-items`, `quick-visits`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Collection::ALL
            .into_iter()
            .find(|c| c.mirror_key() == normalized)
            .ok_or_else(|| ParseCollectionError(s.to_string()))
    }
}
