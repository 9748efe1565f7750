//! In-process ledger backed by a concurrent map.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::ledger::{LedgerError, PaymentLedger, PaymentRecord, Summary};

/// Thread-safe ledger keyed by correlation id.
///
/// Lives as long as the process; suited to a single instance or tests.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    records: DashMap<Uuid, PaymentRecord>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, correlation_id: &Uuid) -> Option<PaymentRecord> {
        self.records.get(correlation_id).map(|r| r.value().clone())
    }
}

#[async_trait]
impl PaymentLedger for InMemoryLedger {
    async fn record(&self, record: PaymentRecord) -> Result<(), LedgerError> {
        match self.records.entry(record.correlation_id) {
            Entry::Occupied(_) => Err(LedgerError::Duplicate(record.correlation_id)),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    async fn contains(&self, correlation_id: Uuid) -> Result<bool, LedgerError> {
        Ok(self.records.contains_key(&correlation_id))
    }

    async fn summarize(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Summary, LedgerError> {
        let snapshot: Vec<PaymentRecord> = self
            .records
            .iter()
            .map(|r| r.value().clone())
            .collect();
        Ok(Summary::from_records(&snapshot, from, to))
    }

    async fn purge(&self) -> Result<u64, LedgerError> {
        let removed = self.records.len() as u64;
        self.records.clear();
        Ok(removed)
    }
}
