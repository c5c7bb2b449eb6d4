//! Typed clinic endpoints on top of the `Dispatcher`.
//!
//! Every call reads the current credential from the `CredentialStore` at
//! the moment it starts. When the backend refuses that credential under
//! every scheme, the client invalidates it so the application can force
//! a sign-out.

use chrono::NaiveDate;
use serde_json::Value;
use tracing::{debug, warn};

use super::dispatcher::{Delivered, Dispatcher};
use super::envelope::{extract_record, extract_records};
use super::error::DispatchError;
use super::request::RequestDescriptor;
use crate::auth::CredentialStore;
use crate::models::{Collection, Record};
use crate::query::RangeKey;

/// Clone is cheap: the dispatcher and the store are both shared handles.
#[derive(Clone)]
pub struct ClinicApi {
    dispatcher: Dispatcher,
    credentials: CredentialStore,
}

impl ClinicApi {
    pub fn new(dispatcher: Dispatcher, credentials: CredentialStore) -> Self {
        Self {
            dispatcher,
            credentials,
        }
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn origin(&self) -> &str {
        self.dispatcher.origin()
    }

    /// Dispatch one request with the current credential.
    pub async fn send(&self, request: RequestDescriptor) -> Result<Delivered, DispatchError> {
        let credential = self.credentials.get();
        let result = self.dispatcher.dispatch(credential.as_deref(), &request).await;

        if let Err(ref e) = result {
            if e.is_authorization() {
                if let Some(ref credential) = credential {
                    self.credentials.invalidate(credential);
                }
            }
        }
        result
    }

    async fn fetch_records(
        &self,
        request: RequestDescriptor,
        keys: &[&str],
    ) -> Result<Vec<Record>, DispatchError> {
        let path = request.path().to_string();
        let delivered = self.send(request).await?;
        let records = extract_records(&delivered.body, keys);
        debug!(path = %path, count = records.len(), "Records fetched");
        Ok(records)
    }

    // ===== Collections =====

    /// Fetch every record of a collection
    pub async fn list(&self, collection: Collection) -> Result<Vec<Record>, DispatchError> {
        self.fetch_records(
            RequestDescriptor::get(collection.list_path()),
            collection.envelope_keys(),
        )
        .await
    }

    pub async fn create(&self, collection: Collection, record: Value) -> Result<Record, DispatchError> {
        let delivered = self
            .send(RequestDescriptor::post(collection.list_path(), record))
            .await?;
        Ok(extract_record(&delivered.body))
    }

    pub async fn update(
        &self,
        collection: Collection,
        id: &str,
        record: Value,
    ) -> Result<Record, DispatchError> {
        let delivered = self
            .send(RequestDescriptor::put(collection.item_path(id), record))
            .await?;
        Ok(extract_record(&delivered.body))
    }

    pub async fn delete(&self, collection: Collection, id: &str) -> Result<(), DispatchError> {
        self.send(RequestDescriptor::delete(collection.item_path(id))).await?;
        Ok(())
    }

    // ===== Aggregates =====

    /// Fetch pharmacy sales for a single day
    pub async fn sales_for_day(&self, date: NaiveDate) -> Result<Vec<Record>, DispatchError> {
        self.fetch_day("/pharmacy/sales/daily/", date, Collection::Sales).await
    }

    /// Fetch pharmacy sales between two dates, inclusive
    pub async fn sales_for_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Record>, DispatchError> {
        self.fetch_range("/pharmacy/sales/range/", from, to, Collection::Sales).await
    }

    pub async fn consignments_for_day(&self, date: NaiveDate) -> Result<Vec<Record>, DispatchError> {
        self.fetch_day("/consignments/daily/", date, Collection::Consignments).await
    }

    pub async fn consignments_for_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Record>, DispatchError> {
        self.fetch_range("/consignments/range/", from, to, Collection::Consignments)
            .await
    }

    async fn fetch_day(
        &self,
        path: &str,
        date: NaiveDate,
        collection: Collection,
    ) -> Result<Vec<Record>, DispatchError> {
        let request = RequestDescriptor::get(path).with_query(&[("date", Some(date.to_string()))]);
        self.fetch_records(request, collection.envelope_keys()).await
    }

    async fn fetch_range(
        &self,
        path: &str,
        from: NaiveDate,
        to: NaiveDate,
        collection: Collection,
    ) -> Result<Vec<Record>, DispatchError> {
        let request = RequestDescriptor::get(path).with_query(&[
            ("start", Some(from.to_string())),
            ("end", Some(to.to_string())),
        ]);
        self.fetch_records(request, collection.envelope_keys()).await
    }

    // ===== Payments =====

    /// Record a payment against a visit
    pub async fn record_payment(&self, visit_id: &str, payment: Value) -> Result<Record, DispatchError> {
        let path = format!("{}payments/", Collection::Visits.item_path(visit_id));
        let delivered = self.send(RequestDescriptor::post(path, payment)).await?;
        Ok(extract_record(&delivered.body))
    }

    // ===== Datasets =====

    /// Fetch one slice of a dataset for the query layer.
    ///
    /// Unbounded ranges hit the list endpoint. Sales and consignments with
    /// both bounds use their aggregate endpoints; everything else filters
    /// the list endpoint with `start_date`/`end_date`.
    pub async fn fetch_dataset(
        &self,
        dataset: Collection,
        range: &RangeKey,
    ) -> Result<Vec<Record>, DispatchError> {
        if range.is_unbounded() {
            return self.list(dataset).await;
        }

        match (dataset, range.from, range.to) {
            (Collection::Sales, Some(from), Some(to)) if from == to => self.sales_for_day(from).await,
            (Collection::Sales, Some(from), Some(to)) => self.sales_for_range(from, to).await,
            (Collection::Consignments, Some(from), Some(to)) if from == to => {
                self.consignments_for_day(from).await
            }
            (Collection::Consignments, Some(from), Some(to)) => {
                self.consignments_for_range(from, to).await
            }
            _ => {
                let request = RequestDescriptor::get(dataset.list_path()).with_query(&[
                    ("start_date", range.from.map(|d| d.to_string())),
                    ("end_date", range.to.map(|d| d.to_string())),
                ]);
                self.fetch_records(request, dataset.envelope_keys()).await
            }
        }
    }
}

impl std::fmt::Debug for ClinicApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClinicApi")
            .field("origin", &self.origin())
            .field("authenticated", &self.credentials.is_present())
            .finish()
    }
}

/// Log a failed mutation without leaking the payload at warn level.
pub fn log_rejection(action: &str, error: &DispatchError) {
    match error {
        DispatchError::Application { status, .. } => {
            warn!(action, status, "Request rejected by backend");
        }
        other => warn!(action, error = %other, "Request failed"),
    }
}
