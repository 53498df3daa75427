//! # Audit Logger
//!
//! Append-only record of security-relevant operations, keyed by
//! `(timestamp, subjectId)`. Backed by Postgres when available,
//! otherwise an in-memory `Vec` guarded by a `tokio::sync::RwLock` —
//! and, per §4.8, records are additionally always emitted to the
//! structured logger regardless of backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::RwLock;

use meshnode_core::AgentId;

/// Outcome of an audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditResult {
    Success,
    Failure,
}

/// A single append-only audit entry.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditRecord {
    pub operation: String,
    pub subject_id: String,
    pub details_json: serde_json::Value,
    pub result: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Optional filters for `AuditLogger::query`.
#[derive(Debug, Default, Clone)]
pub struct AuditQuery {
    pub subject: Option<AgentId>,
    pub operation: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

const MAX_RESULTS: usize = 1000;

enum Backend {
    Postgres(PgPool),
    Memory(RwLock<Vec<AuditRecord>>),
}

/// Append-only audit logger over a pluggable backend.
pub struct AuditLogger {
    backend: Backend,
}

impl AuditLogger {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            backend: Backend::Postgres(pool),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(RwLock::new(Vec::new())),
        }
    }

    /// Record an operation. Always logged to `tracing` in addition to
    /// whichever backend is active, per §4.8's structured-logger
    /// fallback guarantee.
    pub async fn audit_log(
        &self,
        operation: &str,
        subject: &AgentId,
        details: serde_json::Value,
        result: AuditResult,
        ip: Option<String>,
        user_agent: Option<String>,
    ) -> Result<(), sqlx::Error> {
        let record = AuditRecord {
            operation: operation.to_string(),
            subject_id: subject.as_str().to_string(),
            details_json: details,
            result: match result {
                AuditResult::Success => "success".to_string(),
                AuditResult::Failure => "failure".to_string(),
            },
            ip,
            user_agent,
            timestamp: Utc::now(),
        };

        tracing::info!(
            operation = %record.operation,
            subject_id = %record.subject_id,
            result = %record.result,
            "audit"
        );

        match &self.backend {
            Backend::Postgres(pool) => {
                sqlx::query(
                    "INSERT INTO audit_log (operation, subject_id, details_json, result, ip, user_agent, timestamp)
                     VALUES ($1, $2, $3, $4, $5, $6, $7)",
                )
                .bind(&record.operation)
                .bind(&record.subject_id)
                .bind(&record.details_json)
                .bind(&record.result)
                .bind(&record.ip)
                .bind(&record.user_agent)
                .bind(record.timestamp)
                .execute(pool)
                .await?;
            }
            Backend::Memory(store) => {
                store.write().await.push(record);
            }
        }
        Ok(())
    }

    /// Query entries newest-first, limited to 1000 results.
    pub async fn query(&self, filter: AuditQuery) -> Result<Vec<AuditRecord>, sqlx::Error> {
        match &self.backend {
            Backend::Postgres(pool) => {
                let rows = sqlx::query_as::<_, AuditRecord>(
                    "SELECT operation, subject_id, details_json, result, ip, user_agent, timestamp
                     FROM audit_log
                     WHERE ($1::text IS NULL OR subject_id = $1)
                       AND ($2::text IS NULL OR operation = $2)
                       AND ($3::timestamptz IS NULL OR timestamp >= $3)
                       AND ($4::timestamptz IS NULL OR timestamp <= $4)
                     ORDER BY timestamp DESC
                     LIMIT $5",
                )
                .bind(filter.subject.as_ref().map(|s| s.as_str().to_string()))
                .bind(filter.operation)
                .bind(filter.start)
                .bind(filter.end)
                .bind(MAX_RESULTS as i64)
                .fetch_all(pool)
                .await?;
                Ok(rows)
            }
            Backend::Memory(store) => {
                let store = store.read().await;
                let mut matched: Vec<AuditRecord> = store
                    .iter()
                    .filter(|r| {
                        filter
                            .subject
                            .as_ref()
                            .map_or(true, |s| r.subject_id == s.as_str())
                            && filter.operation.as_deref().map_or(true, |op| r.operation == op)
                            && filter.start.map_or(true, |start| r.timestamp >= start)
                            && filter.end.map_or(true, |end| r.timestamp <= end)
                    })
                    .cloned()
                    .collect();
                matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                matched.truncate(MAX_RESULTS);
                Ok(matched)
            }
        }
    }

    /// Remove all records. Testing only.
    pub async fn clear(&self) -> Result<(), sqlx::Error> {
        match &self.backend {
            Backend::Postgres(pool) => {
                sqlx::query("DELETE FROM audit_log").execute(pool).await?;
            }
            Backend::Memory(store) => {
                store.write().await.clear();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips_fields() {
        let logger = AuditLogger::in_memory();
        let agent = AgentId::new("agent-1");
        logger
            .audit_log(
                "wallet_creation",
                &agent,
                serde_json::json!({"chain": "evm"}),
                AuditResult::Success,
                Some("127.0.0.1".to_string()),
                None,
            )
            .await
            .unwrap();

        let results = logger.query(AuditQuery::default()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].operation, "wallet_creation");
        assert_eq!(results[0].subject_id, "agent-1");
        assert_eq!(results[0].result, "success");
    }

    #[tokio::test]
    async fn newest_first_ordering_is_stable() {
        let logger = AuditLogger::in_memory();
        let agent = AgentId::new("agent-1");
        for i in 0..3 {
            logger
                .audit_log(
                    "op",
                    &agent,
                    serde_json::json!({"i": i}),
                    AuditResult::Success,
                    None,
                    None,
                )
                .await
                .unwrap();
        }
        let results = logger.query(AuditQuery::default()).await.unwrap();
        assert_eq!(results.len(), 3);
        for pair in results.windows(2) {
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }
    }

    #[tokio::test]
    async fn filter_by_subject_excludes_others() {
        let logger = AuditLogger::in_memory();
        logger
            .audit_log("op", &AgentId::new("a"), serde_json::json!({}), AuditResult::Success, None, None)
            .await
            .unwrap();
        logger
            .audit_log("op", &AgentId::new("b"), serde_json::json!({}), AuditResult::Success, None, None)
            .await
            .unwrap();

        let results = logger
            .query(AuditQuery {
                subject: Some(AgentId::new("a")),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].subject_id, "a");
    }

    #[tokio::test]
    async fn clear_removes_all_records() {
        let logger = AuditLogger::in_memory();
        logger
            .audit_log("op", &AgentId::new("a"), serde_json::json!({}), AuditResult::Success, None, None)
            .await
            .unwrap();
        logger.clear().await.unwrap();
        let results = logger.query(AuditQuery::default()).await.unwrap();
        assert!(results.is_empty());
    }
}
