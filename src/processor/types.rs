//! Processor wire types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which of the two processors a payment went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorName {
    Default,
    Fallback,
}

impl ProcessorName {
    pub const ALL: [ProcessorName; 2] = [ProcessorName::Default, ProcessorName::Fallback];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessorName::Default => "default",
            ProcessorName::Fallback => "fallback",
        }
    }
}

impl fmt::Display for ProcessorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessorName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(ProcessorName::Default),
            "fallback" => Ok(ProcessorName::Fallback),
            other => Err(format!("unknown processor: {}", other)),
        }
    }
}

/// A payment in flight, exactly as submitted to a processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub correlation_id: Uuid,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub requested_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(correlation_id: Uuid, amount: Decimal, requested_at: DateTime<Utc>) -> Self {
        Self {
            correlation_id,
            amount,
            requested_at,
        }
    }
}

/// Answer of `GET /payments/service-health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub failing: bool,
    pub min_response_time: u64,
}

/// Answer of `GET /admin/payments-summary` on a processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSummary {
    pub total_requests: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_fee: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub fee_per_transaction: Decimal,
}
