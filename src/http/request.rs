//! Request handling.
//!
//! # Responsibilities
//! - Generate a request ID (UUID v4) when the client sent none
//! - Define and validate the gateway's request bodies and query strings
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Amounts are validated here, before any processor is contacted

use axum::http::HeaderName;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer, MakeRequestUuid};
use uuid::Uuid;

use crate::http::response::ApiError;
use crate::ledger::chargeable_cents;

pub const X_REQUEST_ID: &str = "x-request-id";

pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID), MakeRequestUuid)
}

pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID))
}

/// Body of `POST /payments`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub correlation_id: Uuid,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

impl PaymentRequest {
    /// Rejects amounts that could be charged but not recorded.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.amount <= Decimal::ZERO {
            return Err(ApiError::BadRequest("amount must be positive".to_string()));
        }
        chargeable_cents(self.amount)
            .map_err(|_| ApiError::BadRequest("amount must be between 0.01 and the ledger limit".to_string()))?;
        Ok(())
    }
}

/// Query string of `GET /payments-summary`. Bounds are RFC 3339.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummaryQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

impl SummaryQuery {
    /// Parsed `(from, to)`. A missing or empty bound is open.
    pub fn range(&self) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>), ApiError> {
        let from = parse_bound(self.from.as_deref(), "from")?;
        let to = parse_bound(self.to.as_deref(), "to")?;
        if let (Some(f), Some(t)) = (from, to) {
            if f > t {
                return Err(ApiError::BadRequest("'from' is after 'to'".to_string()));
            }
        }
        Ok((from, to))
    }
}

fn parse_bound(raw: Option<&str>, field: &str) -> Result<Option<DateTime<Utc>>, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|_| ApiError::BadRequest(format!("invalid '{field}' date"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_payment_request_parses_float_amount() {
        let body = r#"{"correlationId":"4a7901b8-7d26-4d9d-aa19-4dc1c7cf60b3","amount":19.9}"#;
        let req: PaymentRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.amount, dec!(19.9));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_non_positive_amount_rejected() {
        let req = PaymentRequest {
            correlation_id: Uuid::new_v4(),
            amount: dec!(0),
        };
        assert!(matches!(req.validate(), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_amount_rounding_to_zero_cents_rejected() {
        let req = PaymentRequest {
            correlation_id: Uuid::new_v4(),
            amount: dec!(0.004),
        };
        assert!(matches!(req.validate(), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_amount_beyond_ledger_range_rejected() {
        let req = PaymentRequest {
            correlation_id: Uuid::new_v4(),
            amount: Decimal::from(100_000_000_000_000_000i64),
        };
        assert!(matches!(req.validate(), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_summary_range() {
        let q = SummaryQuery {
            from: Some("2025-07-10T12:34:56.000Z".into()),
            to: Some("2025-07-10T12:35:56.000Z".into()),
        };
        let (from, to) = q.range().unwrap();
        assert!(from.unwrap() < to.unwrap());

        assert_eq!(SummaryQuery::default().range().unwrap(), (None, None));

        let empty = SummaryQuery {
            from: Some(String::new()),
            to: None,
        };
        assert_eq!(empty.range().unwrap(), (None, None));
    }

    #[test]
    fn test_summary_range_rejects_garbage_and_inverted() {
        let bad = SummaryQuery {
            from: Some("yesterday".into()),
            to: None,
        };
        assert!(matches!(bad.range(), Err(ApiError::BadRequest(m)) if m.contains("from")));

        let inverted = SummaryQuery {
            from: Some("2025-07-10T13:00:00Z".into()),
            to: Some("2025-07-10T12:00:00Z".into()),
        };
        assert!(inverted.range().is_err());
    }
}
