//! Per-call time budget for any store client.

use std::time::{Duration, Instant};

use tracing::warn;

use crate::core::{
    AttributeUpdates, QueryOptions, Record, ResponsePage, StoreClient, StoreError,
    TableDescription,
};

/// Wraps a [`StoreClient`] and reports calls that overrun their budget.
///
/// Calls are synchronous, so an overrunning call still runs to completion;
/// its result is discarded and [`StoreError::Timeout`] is returned instead.
pub struct Deadline<C> {
    inner: C,
    budget: Duration,
}

impl<C: StoreClient> Deadline<C> {
    /// Wrap a client with a per-call budget
    pub fn new(inner: C, budget: Duration) -> Self {
        Self { inner, budget }
    }

    /// The configured budget
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// The wrapped client
    pub fn inner(&self) -> &C {
        &self.inner
    }

    fn timed<T>(
        &self,
        operation: &'static str,
        call: impl FnOnce(&C) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let started = Instant::now();
        let result = call(&self.inner);
        let elapsed = started.elapsed();

        if elapsed > self.budget {
            warn!(
                operation,
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = self.budget.as_millis() as u64,
                "Store call exceeded its time budget"
            );
            return Err(StoreError::Timeout(self.budget));
        }
        result
    }
}

impl<C: StoreClient> StoreClient for Deadline<C> {
    fn put_item(&self, table: &str, item: Record) -> Result<(), StoreError> {
        self.timed("put_item", |c| c.put_item(table, item))
    }

    fn update_item(
        &self,
        table: &str,
        key: Record,
        updates: AttributeUpdates,
    ) -> Result<(), StoreError> {
        self.timed("update_item", |c| c.update_item(table, key, updates))
    }

    fn delete_item(&self, table: &str, key: Record) -> Result<(), StoreError> {
        self.timed("delete_item", |c| c.delete_item(table, key))
    }

    fn get_item(&self, table: &str, key: Record) -> Result<Option<Record>, StoreError> {
        self.timed("get_item", |c| c.get_item(table, key))
    }

    fn query(&self, table: &str, options: &QueryOptions) -> Result<ResponsePage, StoreError> {
        self.timed("query", |c| c.query(table, options))
    }

    fn scan(&self, table: &str, options: &QueryOptions) -> Result<ResponsePage, StoreError> {
        self.timed("scan", |c| c.scan(table, options))
    }

    fn describe_table(&self, table: &str) -> Result<TableDescription, StoreError> {
        self.timed("describe_table", |c| c.describe_table(table))
    }
}
