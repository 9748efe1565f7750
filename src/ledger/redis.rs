//! Redis-backed ledger.
//!
//! # Layout
//! - `payment:{correlation_id}` → JSON-encoded [`PaymentRecord`], written with `NX`
//! - `payments:by_created_at` → sorted set of correlation ids scored by
//!   `created_at` in epoch milliseconds
//!
//! # Design Decisions
//! - Record and index are written in one MULTI so a crash leaves neither
//! - Range queries read the index, then fetch the records with MGET
//! - Shared across gateway instances; Redis provides the atomicity

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::ledger::{LedgerError, PaymentLedger, PaymentRecord, Summary};

const RECORD_PREFIX: &str = "payment:";
const INDEX_KEY: &str = "payments:by_created_at";

#[derive(Clone)]
pub struct RedisLedger {
    conn: MultiplexedConnection,
}

impl RedisLedger {
    pub async fn connect(redis_url: &str) -> Result<Self, LedgerError> {
        let client = redis::Client::open(redis_url).map_err(unavailable)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(unavailable)?;
        Ok(Self { conn })
    }

    fn record_key(id: &str) -> String {
        format!("{}{}", RECORD_PREFIX, id)
    }
}

fn unavailable(e: redis::RedisError) -> LedgerError {
    LedgerError::Unavailable(e.to_string())
}

fn score(at: Option<DateTime<Utc>>, open: &str) -> String {
    at.map(|t| t.timestamp_millis().to_string())
        .unwrap_or_else(|| open.to_string())
}

#[async_trait]
impl PaymentLedger for RedisLedger {
    async fn record(&self, record: PaymentRecord) -> Result<(), LedgerError> {
        let mut conn = self.conn.clone();
        let id = record.correlation_id.to_string();
        let payload =
            serde_json::to_string(&record).map_err(|e| LedgerError::Corrupt(e.to_string()))?;

        let (inserted, _indexed): (Option<String>, i64) = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(Self::record_key(&id))
            .arg(payload)
            .arg("NX")
            .cmd("ZADD")
            .arg(INDEX_KEY)
            .arg("NX")
            .arg(record.created_at.timestamp_millis())
            .arg(&id)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;

        match inserted {
            Some(_) => Ok(()),
            None => Err(LedgerError::Duplicate(record.correlation_id)),
        }
    }

    async fn contains(&self, correlation_id: Uuid) -> Result<bool, LedgerError> {
        let mut conn = self.conn.clone();
        conn.exists(Self::record_key(&correlation_id.to_string()))
            .await
            .map_err(unavailable)
    }

    async fn summarize(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Summary, LedgerError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .zrangebyscore(INDEX_KEY, score(from, "-inf"), score(to, "+inf"))
            .await
            .map_err(unavailable)?;

        if ids.is_empty() {
            return Ok(Summary::default());
        }

        let keys: Vec<String> = ids.iter().map(|id| Self::record_key(id)).collect();
        let payloads: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;

        let mut records = Vec::with_capacity(payloads.len());
        for payload in payloads.into_iter().flatten() {
            match serde_json::from_str::<PaymentRecord>(&payload) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(error = %e, "Skipping unreadable ledger entry"),
            }
        }

        // Millisecond scores already bound the range; re-check at full precision.
        Ok(Summary::from_records(&records, from, to))
    }

    async fn purge(&self) -> Result<u64, LedgerError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.zrange(INDEX_KEY, 0, -1).await.map_err(unavailable)?;
        if ids.is_empty() {
            return Ok(0);
        }

        let mut keys: Vec<String> = ids.iter().map(|id| Self::record_key(id)).collect();
        keys.push(INDEX_KEY.to_string());
        let _: i64 = conn.del(keys).await.map_err(unavailable)?;

        tracing::info!(purged = ids.len(), "Purged payment records");
        Ok(ids.len() as u64)
    }
}
