//! Gateway-facing endpoints.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::http::request::{PaymentRequest, SummaryQuery};
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::ledger::Summary;
use crate::service::Accepted;

/// `POST /payments`
pub async fn create_payment(
    State(state): State<AppState>,
    body: Result<Json<PaymentRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body?;
    request.validate()?;

    let correlation_id = request.correlation_id;
    tracing::debug!(%correlation_id, amount = %request.amount, "Payment received");

    match state.service.submit(correlation_id, request.amount).await? {
        Accepted::Delivered(processor) => Ok((
            StatusCode::OK,
            Json(json!({ "message": "Payment processed!", "processor": processor })),
        )
            .into_response()),
        Accepted::Queued => Ok((
            StatusCode::ACCEPTED,
            Json(json!({
                "message": "Payment accepted for processing",
                "correlationId": correlation_id,
            })),
        )
            .into_response()),
    }
}

/// `GET /payments-summary?from=&to=`
pub async fn payments_summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<Summary>, ApiError> {
    let (from, to) = query.range()?;
    let summary = state.service.summary(from, to).await?;
    Ok(Json(summary))
}

/// `POST /purge-payments`
pub async fn purge_payments(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let removed = state.service.purge().await?;
    Ok(Json(json!({ "message": "Payments purged!", "removed": removed })))
}

/// `GET /health`
pub async fn liveness() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
