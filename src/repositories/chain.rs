//! Chain configuration repository.
//!
//! Chain documents are stored as JSONB keyed by `chain_id`. The core only
//! reads them (plus the enable/disable toggle exposed to the operator API);
//! seeding and mutation belong to operator tooling.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::{models::ChainConfig, repositories::error::RepositoryError};

#[async_trait]
pub trait ChainConfigRepositoryTrait: Send + Sync {
    async fn get(&self, chain_id: i64) -> Result<Option<ChainConfig>, RepositoryError>;
    async fn get_all(&self) -> Result<Vec<ChainConfig>, RepositoryError>;
    async fn get_enabled(&self) -> Result<Vec<ChainConfig>, RepositoryError>;
    /// Flips the enabled flag; returns the number of documents touched.
    async fn set_enabled(&self, chain_id: i64, enabled: bool) -> Result<u64, RepositoryError>;
    /// Inserts or replaces a chain document (seeding and operator tooling).
    async fn upsert(&self, config: &ChainConfig) -> Result<(), RepositoryError>;
}

pub struct PostgresChainConfigRepository {
    pool: PgPool,
}

impl PostgresChainConfigRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn decode_row(row: &sqlx::postgres::PgRow) -> Result<ChainConfig, RepositoryError> {
        let doc: serde_json::Value = row.try_get("doc")?;
        Ok(serde_json::from_value(doc)?)
    }
}

#[async_trait]
impl ChainConfigRepositoryTrait for PostgresChainConfigRepository {
    async fn get(&self, chain_id: i64) -> Result<Option<ChainConfig>, RepositoryError> {
        let row = sqlx::query("SELECT doc FROM chain_configs WHERE chain_id = $1")
            .bind(chain_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::decode_row).transpose()
    }

    async fn get_all(&self) -> Result<Vec<ChainConfig>, RepositoryError> {
        let rows = sqlx::query("SELECT doc FROM chain_configs ORDER BY chain_id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::decode_row).collect()
    }

    async fn get_enabled(&self) -> Result<Vec<ChainConfig>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT doc FROM chain_configs \
             WHERE (doc->>'enabled')::boolean = true ORDER BY chain_id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::decode_row).collect()
    }

    async fn set_enabled(&self, chain_id: i64, enabled: bool) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE chain_configs \
             SET doc = jsonb_set(doc, '{enabled}', to_jsonb($2::boolean)) \
             WHERE chain_id = $1",
        )
        .bind(chain_id)
        .bind(enabled)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn upsert(&self, config: &ChainConfig) -> Result<(), RepositoryError> {
        config.validate().map_err(|e| {
            RepositoryError::validation_error(format!(
                "Refusing to store invalid chain {}: {}",
                config.chain_id, e
            ))
        })?;
        let doc = serde_json::to_value(config)?;
        sqlx::query(
            "INSERT INTO chain_configs (chain_id, doc) VALUES ($1, $2) \
             ON CONFLICT (chain_id) DO UPDATE SET doc = EXCLUDED.doc",
        )
        .bind(config.chain_id)
        .bind(doc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// In-memory chain repository for tests and store-less development.
#[derive(Default)]
pub struct InMemoryChainConfigRepository {
    chains: Mutex<HashMap<i64, ChainConfig>>,
}

impl InMemoryChainConfigRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_chains(chains: Vec<ChainConfig>) -> Self {
        let repo = Self::new();
        {
            let mut guard = repo.chains.lock().await;
            for chain in chains {
                guard.insert(chain.chain_id, chain);
            }
        }
        repo
    }
}

#[async_trait]
impl ChainConfigRepositoryTrait for InMemoryChainConfigRepository {
    async fn get(&self, chain_id: i64) -> Result<Option<ChainConfig>, RepositoryError> {
        Ok(self.chains.lock().await.get(&chain_id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<ChainConfig>, RepositoryError> {
        let mut all: Vec<ChainConfig> = self.chains.lock().await.values().cloned().collect();
        all.sort_by_key(|c| c.chain_id);
        Ok(all)
    }

    async fn get_enabled(&self) -> Result<Vec<ChainConfig>, RepositoryError> {
        Ok(self.get_all().await?.into_iter().filter(|c| c.enabled).collect())
    }

    async fn set_enabled(&self, chain_id: i64, enabled: bool) -> Result<u64, RepositoryError> {
        let mut chains = self.chains.lock().await;
        match chains.get_mut(&chain_id) {
            Some(chain) => {
                chain.enabled = enabled;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn upsert(&self, config: &ChainConfig) -> Result<(), RepositoryError> {
        self.chains
            .lock()
            .await
            .insert(config.chain_id, config.clone());
        Ok(())
    }
}
