//! Payment ledger subsystem.
//!
//! # Data Flow
//! ```text
//! Confirmed delivery (sync path or retry loop)
//!     → PaymentRecord::delivered (decimal amount → integer cents)
//!     → PaymentLedger::record (memory.rs | redis.rs)
//!
//! GET /payments-summary
//!     → PaymentLedger::summarize(from, to)
//!     → Summary { default, fallback }
//! ```
//!
//! # Design Decisions
//! - Money is stored as integer cents, rounded half away from zero
//! - The correlation id is the primary key; the first record wins
//! - Both processor buckets are always present in a summary

pub mod memory;
#[cfg(feature = "ledger-redis")]
pub mod redis;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::processor::{Payment, ProcessorName};

pub use memory::InMemoryLedger;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("payment {0} is already recorded")]
    Duplicate(Uuid),
    #[error("amount {0} cannot be stored as cents")]
    InvalidAmount(Decimal),
    #[error("ledger storage unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt ledger entry: {0}")]
    Corrupt(String),
}

/// One delivered payment, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub correlation_id: Uuid,
    pub processor: ProcessorName,
    pub amount_in_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl PaymentRecord {
    pub fn delivered(
        payment: &Payment,
        processor: ProcessorName,
        delivered_at: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        Ok(Self {
            correlation_id: payment.correlation_id,
            processor,
            amount_in_cents: to_cents(payment.amount)?,
            created_at: delivered_at,
        })
    }
}

/// Convert a decimal amount to integer cents, rounding half away from zero.
pub fn to_cents(amount: Decimal) -> Result<i64, LedgerError> {
    amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .ok_or(LedgerError::InvalidAmount(amount))?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or(LedgerError::InvalidAmount(amount))
}

/// Cents for an amount a client may submit: positive and at least one cent
/// once rounded.
pub fn chargeable_cents(amount: Decimal) -> Result<i64, LedgerError> {
    match to_cents(amount)? {
        cents if cents > 0 => Ok(cents),
        _ => Err(LedgerError::InvalidAmount(amount)),
    }
}

pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Totals for one processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorSummary {
    pub total_requests: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
}

/// Totals per processor over a time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Summary {
    pub default: ProcessorSummary,
    pub fallback: ProcessorSummary,
}

impl Summary {
    /// Aggregate the records whose `created_at` lies in `[from, to]`.
    ///
    /// A missing bound is open.
    pub fn from_records<'a, I>(records: I, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self
    where
        I: IntoIterator<Item = &'a PaymentRecord>,
    {
        let mut counts = [0u64; 2];
        let mut cents = [0i64; 2];

        for record in records {
            if !in_range(record.created_at, from, to) {
                continue;
            }
            let slot = match record.processor {
                ProcessorName::Default => 0,
                ProcessorName::Fallback => 1,
            };
            counts[slot] += 1;
            cents[slot] = cents[slot].saturating_add(record.amount_in_cents);
        }

        Self {
            default: ProcessorSummary {
                total_requests: counts[0],
                total_amount: from_cents(cents[0]),
            },
            fallback: ProcessorSummary {
                total_requests: counts[1],
                total_amount: from_cents(cents[1]),
            },
        }
    }

    pub fn for_processor(&self, name: ProcessorName) -> &ProcessorSummary {
        match name {
            ProcessorName::Default => &self.default,
            ProcessorName::Fallback => &self.fallback,
        }
    }
}

pub fn in_range(at: DateTime<Utc>, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> bool {
    !(from.is_some_and(|f| at < f) || to.is_some_and(|t| at > t))
}

/// Persistence capability for delivered payments.
#[async_trait]
pub trait PaymentLedger: Send + Sync {
    /// Persist a delivered payment. Fails with `Duplicate` if the id exists.
    async fn record(&self, record: PaymentRecord) -> Result<(), LedgerError>;

    /// Whether a record with this correlation id exists.
    async fn contains(&self, correlation_id: Uuid) -> Result<bool, LedgerError>;

    async fn summarize(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Summary, LedgerError>;

    /// Remove every record. Returns how many were removed.
    async fn purge(&self) -> Result<u64, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn record(processor: ProcessorName, cents: i64, created_at: &str) -> PaymentRecord {
        PaymentRecord {
            correlation_id: Uuid::new_v4(),
            processor,
            amount_in_cents: cents,
            created_at: at(created_at),
        }
    }

    #[test]
    fn test_to_cents_rounds_half_away_from_zero() {
        assert_eq!(to_cents(dec!(19.90)).unwrap(), 1990);
        assert_eq!(to_cents(dec!(0.005)).unwrap(), 1);
        assert_eq!(to_cents(dec!(0.004)).unwrap(), 0);
        assert_eq!(to_cents(dec!(10.125)).unwrap(), 1013);
        assert_eq!(to_cents(dec!(-0.005)).unwrap(), -1);
    }

    #[test]
    fn test_to_cents_overflow() {
        assert!(matches!(
            to_cents(Decimal::MAX),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_chargeable_cents_rejects_sub_cent_and_oversized() {
        assert_eq!(chargeable_cents(dec!(0.005)).unwrap(), 1);
        assert!(matches!(chargeable_cents(dec!(0.004)), Err(LedgerError::InvalidAmount(_))));
        assert!(matches!(chargeable_cents(dec!(-3)), Err(LedgerError::InvalidAmount(_))));
        assert!(matches!(
            chargeable_cents(Decimal::from(100_000_000_000_000_000i64)),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_summary_groups_by_processor() {
        let records = vec![
            record(ProcessorName::Default, 100, "2025-07-10T12:00:00Z"),
            record(ProcessorName::Default, 250, "2025-07-10T12:00:01Z"),
            record(ProcessorName::Fallback, 500, "2025-07-10T12:00:02Z"),
        ];
        let summary = Summary::from_records(
            &records,
            Some(at("2025-07-10T00:00:00Z")),
            Some(at("2025-07-11T00:00:00Z")),
        );

        assert_eq!(summary.default.total_requests, 2);
        assert_eq!(summary.default.total_amount, dec!(3.50));
        assert_eq!(summary.fallback.total_requests, 1);
        assert_eq!(summary.fallback.total_amount, dec!(5.00));
    }

    #[test]
    fn test_summary_range_is_inclusive_and_excludes_outside() {
        let records = vec![
            record(ProcessorName::Default, 100, "2025-07-10T12:00:00Z"),
            record(ProcessorName::Default, 200, "2025-07-10T13:00:00Z"),
            record(ProcessorName::Fallback, 300, "2025-07-10T13:00:01Z"),
        ];
        let summary = Summary::from_records(
            &records,
            Some(at("2025-07-10T12:00:00Z")),
            Some(at("2025-07-10T13:00:00Z")),
        );

        assert_eq!(summary.default.total_requests, 2);
        assert_eq!(summary.fallback.total_requests, 0);
        assert_eq!(summary.fallback.total_amount, Decimal::ZERO);
    }

    #[test]
    fn test_empty_summary_keeps_both_buckets() {
        let summary = Summary::from_records(&Vec::<PaymentRecord>::new(), None, None);
        let json = serde_json::to_value(summary).unwrap();
        assert_eq!(json["default"]["totalRequests"], 0);
        assert_eq!(json["default"]["totalAmount"], 0.0);
        assert_eq!(json["fallback"]["totalRequests"], 0);
        assert_eq!(json["fallback"]["totalAmount"], 0.0);
    }
}
