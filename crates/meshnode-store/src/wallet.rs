//! # Wallet Metadata and Balance History
//!
//! The two remaining logical tables of §6's persistent state layout.
//! Balances are stored as strings to preserve precision beyond 64 bits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::RwLock;

use meshnode_core::AgentId;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WalletMetadata {
    pub agent_id: String,
    pub derivation_index: i64,
    pub evm_address: Option<String>,
    pub xrp_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub metadata_json: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BalanceRecord {
    pub agent_id: String,
    pub chain: String,
    pub token: String,
    pub balance: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum WalletStoreError {
    #[error("derivation index {0} already assigned to another agent")]
    DuplicateDerivationIndex(i64),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Default)]
struct MemoryTables {
    wallets: Vec<WalletMetadata>,
    balances: Vec<BalanceRecord>,
}

enum Backend {
    Postgres(PgPool),
    Memory(RwLock<MemoryTables>),
}

/// Wallet metadata and balance-history persistence over a pluggable backend.
pub struct WalletStore {
    backend: Backend,
}

impl WalletStore {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            backend: Backend::Postgres(pool),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(RwLock::new(MemoryTables::default())),
        }
    }

    pub async fn insert_wallet(&self, wallet: WalletMetadata) -> Result<(), WalletStoreError> {
        match &self.backend {
            Backend::Postgres(pool) => {
                sqlx::query(
                    "INSERT INTO wallet_metadata (agent_id, derivation_index, evm_address, xrp_address, created_at, metadata_json)
                     VALUES ($1, $2, $3, $4, $5, $6)",
                )
                .bind(&wallet.agent_id)
                .bind(wallet.derivation_index)
                .bind(&wallet.evm_address)
                .bind(&wallet.xrp_address)
                .bind(wallet.created_at)
                .bind(&wallet.metadata_json)
                .execute(pool)
                .await?;
                Ok(())
            }
            Backend::Memory(store) => {
                let mut store = store.write().await;
                if store
                    .wallets
                    .iter()
                    .any(|w| w.derivation_index == wallet.derivation_index)
                {
                    return Err(WalletStoreError::DuplicateDerivationIndex(wallet.derivation_index));
                }
                store.wallets.push(wallet);
                Ok(())
            }
        }
    }

    pub async fn get_wallet(&self, agent: &AgentId) -> Result<Option<WalletMetadata>, sqlx::Error> {
        match &self.backend {
            Backend::Postgres(pool) => {
                sqlx::query_as::<_, WalletMetadata>(
                    "SELECT agent_id, derivation_index, evm_address, xrp_address, created_at, metadata_json
                     FROM wallet_metadata WHERE agent_id = $1",
                )
                .bind(agent.as_str())
                .fetch_optional(pool)
                .await
            }
            Backend::Memory(store) => {
                let store = store.read().await;
                Ok(store.wallets.iter().find(|w| w.agent_id == agent.as_str()).cloned())
            }
        }
    }

    pub async fn record_balance(&self, record: BalanceRecord) -> Result<(), sqlx::Error> {
        match &self.backend {
            Backend::Postgres(pool) => {
                sqlx::query(
                    "INSERT INTO balance_history (agent_id, chain, token, balance, timestamp)
                     VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(&record.agent_id)
                .bind(&record.chain)
                .bind(&record.token)
                .bind(&record.balance)
                .bind(record.timestamp)
                .execute(pool)
                .await?;
                Ok(())
            }
            Backend::Memory(store) => {
                store.write().await.balances.push(record);
                Ok(())
            }
        }
    }

    /// Balance history for an agent on a given chain/token, newest-first.
    pub async fn balance_history(
        &self,
        agent: &AgentId,
        chain: &str,
        token: &str,
    ) -> Result<Vec<BalanceRecord>, sqlx::Error> {
        match &self.backend {
            Backend::Postgres(pool) => {
                sqlx::query_as::<_, BalanceRecord>(
                    "SELECT agent_id, chain, token, balance, timestamp
                     FROM balance_history
                     WHERE agent_id = $1 AND chain = $2 AND token = $3
                     ORDER BY timestamp DESC",
                )
                .bind(agent.as_str())
                .bind(chain)
                .bind(token)
                .fetch_all(pool)
                .await
            }
            Backend::Memory(store) => {
                let store = store.read().await;
                let mut matched: Vec<BalanceRecord> = store
                    .balances
                    .iter()
                    .filter(|b| b.agent_id == agent.as_str() && b.chain == chain && b.token == token)
                    .cloned()
                    .collect();
                matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                Ok(matched)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet(agent: &str, index: i64) -> WalletMetadata {
        WalletMetadata {
            agent_id: agent.to_string(),
            derivation_index: index,
            evm_address: Some("0xabc".to_string()),
            xrp_address: None,
            created_at: Utc::now(),
            metadata_json: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let store = WalletStore::in_memory();
        store.insert_wallet(wallet("agent-1", 0)).await.unwrap();
        let found = store.get_wallet(&AgentId::new("agent-1")).await.unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().derivation_index, 0);
    }

    #[tokio::test]
    async fn duplicate_derivation_index_is_rejected() {
        let store = WalletStore::in_memory();
        store.insert_wallet(wallet("agent-1", 5)).await.unwrap();
        let err = store.insert_wallet(wallet("agent-2", 5)).await.unwrap_err();
        assert!(matches!(err, WalletStoreError::DuplicateDerivationIndex(5)));
    }

    #[tokio::test]
    async fn balance_history_is_newest_first() {
        let store = WalletStore::in_memory();
        let agent = AgentId::new("agent-1");
        for balance in ["100", "200", "300"] {
            store
                .record_balance(BalanceRecord {
                    agent_id: agent.as_str().to_string(),
                    chain: "evm".to_string(),
                    token: "usdc".to_string(),
                    balance: balance.to_string(),
                    timestamp: Utc::now(),
                })
                .await
                .unwrap();
        }
        let history = store.balance_history(&agent, "evm", "usdc").await.unwrap();
        assert_eq!(history.len(), 3);
        for pair in history.windows(2) {
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }
    }

    #[tokio::test]
    async fn missing_wallet_returns_none() {
        let store = WalletStore::in_memory();
        let found = store.get_wallet(&AgentId::new("ghost")).await.unwrap();
        assert!(found.is_none());
    }
}
