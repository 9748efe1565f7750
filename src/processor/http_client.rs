//! reqwest-backed processor client.
//!
//! # Responsibilities
//! - Map the processor HTTP contract onto [`ProcessorClient`]
//! - Bound every call with the configured timeout
//! - Attach the admin bearer token to admin calls once it is known
//!
//! # Design Decisions
//! - One pooled `reqwest::Client` per processor
//! - Any non-2xx status is a `ProcessorError::Status`
//! - The admin token is swappable at runtime (`ArcSwapOption`)

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use uuid::Uuid;

use crate::processor::client::{ProcessorClient, ProcessorError};
use crate::processor::types::{AdminSummary, HealthResponse, Payment};

/// Processor client speaking HTTP to a real processor.
pub struct HttpProcessorClient {
    client: Client,
    base_url: String,
    timeout: Duration,
    token: ArcSwapOption<String>,
}

impl HttpProcessorClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self::with_client(Client::new(), base_url, timeout)
    }

    /// Build on top of an existing connection pool.
    pub fn with_client(client: Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            token: ArcSwapOption::empty(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Remember the admin token locally without telling the processor.
    pub fn use_token(&self, token: &str) {
        self.token.store(Some(Arc::new(token.to_string())));
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn admin(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.token.load_full() {
            Some(token) => builder.bearer_auth(token.as_str()),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, ProcessorError> {
        let response = builder
            .timeout(self.timeout)
            .send()
            .await
            .map_err(map_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProcessorError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, ProcessorError> {
        self.send(builder)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ProcessorError::Decode(e.to_string()))
    }
}

fn map_transport(e: reqwest::Error) -> ProcessorError {
    if e.is_timeout() {
        ProcessorError::Timeout
    } else {
        ProcessorError::Transport(e.to_string())
    }
}

#[derive(serde::Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    message: String,
}

#[async_trait]
impl ProcessorClient for HttpProcessorClient {
    async fn submit_payment(&self, payment: &Payment) -> Result<String, ProcessorError> {
        let response = self
            .send(self.client.post(self.url("/payments")).json(payment))
            .await?;
        // Some processors answer 200 with an empty body.
        let body = response.bytes().await.map_err(map_transport)?;
        if body.is_empty() {
            return Ok(String::new());
        }
        serde_json::from_slice::<SubmitResponse>(&body)
            .map(|r| r.message)
            .map_err(|e| ProcessorError::Decode(e.to_string()))
    }

    async fn health(&self) -> Result<HealthResponse, ProcessorError> {
        self.send_json(self.client.get(self.url("/payments/service-health")))
            .await
    }

    async fn get_payment(&self, correlation_id: Uuid) -> Result<Payment, ProcessorError> {
        self.send_json(
            self.client
                .get(self.url(&format!("/payments/{}", correlation_id))),
        )
        .await
    }

    async fn admin_summary(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<AdminSummary, ProcessorError> {
        let mut query = Vec::new();
        if let Some(from) = from {
            query.push(("from", from.to_rfc3339_opts(SecondsFormat::Millis, true)));
        }
        if let Some(to) = to {
            query.push(("to", to.to_rfc3339_opts(SecondsFormat::Millis, true)));
        }
        let builder = self
            .client
            .get(self.url("/admin/payments-summary"))
            .query(&query);
        self.send_json(self.admin(builder)).await
    }

    async fn set_admin_token(&self, token: &str) -> Result<(), ProcessorError> {
        let builder = self
            .client
            .post(self.url("/admin/config/token"))
            .json(&json!({ "token": token }));
        self.send(self.admin(builder)).await?;
        self.use_token(token);
        Ok(())
    }

    async fn set_admin_delay(&self, delay_ms: u64) -> Result<(), ProcessorError> {
        let builder = self
            .client
            .post(self.url("/admin/config/delay"))
            .json(&json!({ "delay": delay_ms }));
        self.send(self.admin(builder)).await.map(|_| ())
    }

    async fn set_admin_failure(&self, failure: bool) -> Result<(), ProcessorError> {
        let builder = self
            .client
            .post(self.url("/admin/config/failure"))
            .json(&json!({ "failure": failure }));
        self.send(self.admin(builder)).await.map(|_| ())
    }

    async fn purge_payments(&self) -> Result<(), ProcessorError> {
        let builder = self.client.post(self.url("/admin/payments"));
        self.send(self.admin(builder)).await.map(|_| ())
    }
}
