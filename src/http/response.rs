//! Error responses.
//!
//! # Status Codes
//! - 400: malformed body, bad amount, bad summary range
//! - 409: correlation id already recorded
//! - 424: processors were tried and none accepted the payment
//! - 500: no processor available, or the ledger failed
//! - 503: retry queue full or gateway shutting down

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::ledger::LedgerError;
use crate::resilience::ScheduleError;
use crate::service::SubmitError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Conflict(String),
    FailedDependency(String),
    Internal(String),
    Unavailable(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::FailedDependency(_) => StatusCode::FAILED_DEPENDENCY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(m)
            | ApiError::Conflict(m)
            | ApiError::FailedDependency(m)
            | ApiError::Internal(m)
            | ApiError::Unavailable(m) => m,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.message() }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection, "Rejected request body");
        ApiError::BadRequest("error parsing body".to_string())
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Duplicate(id) => ApiError::Conflict(format!("payment {id} already recorded")),
            LedgerError::InvalidAmount(_) => ApiError::BadRequest(e.to_string()),
            LedgerError::Unavailable(_) | LedgerError::Corrupt(_) => {
                tracing::error!(error = %e, "Ledger error");
                ApiError::Internal("internal server error".to_string())
            }
        }
    }
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        match e {
            SubmitError::InvalidAmount(_) => ApiError::BadRequest(e.to_string()),
            SubmitError::Duplicate(id) | SubmitError::Schedule(ScheduleError::AlreadyScheduled(id)) => {
                ApiError::Conflict(format!("payment {id} already submitted"))
            }
            SubmitError::Lookup(source) => source.into(),
            SubmitError::NotDelivered { attempted: true } => {
                ApiError::FailedDependency("could not make payment".to_string())
            }
            SubmitError::NotDelivered { attempted: false } => {
                ApiError::Internal("no payment processor available".to_string())
            }
            SubmitError::Persist { source, .. } => source.into(),
            SubmitError::Schedule(ScheduleError::QueueFull) => {
                ApiError::Unavailable("payment queue is full".to_string())
            }
            SubmitError::Schedule(ScheduleError::ShuttingDown) => {
                ApiError::Unavailable("gateway is shutting down".to_string())
            }
        }
    }
}
