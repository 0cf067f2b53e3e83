//! Postgres-backed stores.
//!
//! Events and contract data are stored as JSONB documents alongside typed
//! key and index columns. The unique index on
//! `(chain_id, transaction_hash, log_index)` enforces exactly-once
//! persistence; inserts go through `ON CONFLICT DO NOTHING` so replays never
//! error.

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};

use crate::{
    models::{BlockchainEvent, ContractData},
    storage::{error::StorageError, ContractDataStore, EventStore},
};

/// Creates the shared connection pool. A statement timeout guards the pool
/// against slow queries.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Applies the schema migrations under `migrations/`.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn find_event(
        &self,
        chain_id: i64,
        transaction_hash: &str,
        log_index: u64,
    ) -> Result<Option<BlockchainEvent>, StorageError> {
        let row = sqlx::query(
            "SELECT doc FROM blockchain_events \
             WHERE chain_id = $1 AND transaction_hash = $2 AND log_index = $3",
        )
        .bind(chain_id)
        .bind(transaction_hash)
        .bind(log_index as i64)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let doc: serde_json::Value = row.try_get("doc")?;
                Ok(Some(serde_json::from_value(doc)?))
            }
            None => Ok(None),
        }
    }

    async fn insert_event(&self, event: &BlockchainEvent) -> Result<bool, StorageError> {
        let doc = serde_json::to_value(event)
            .map_err(|e| StorageError::internal_error(format!("Event encode failed: {}", e)))?;

        let result = sqlx::query(
            "INSERT INTO blockchain_events \
             (chain_id, transaction_hash, log_index, block_number, timestamp_ms, \
              event_type, contract_address, processed, doc) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (chain_id, transaction_hash, log_index) DO NOTHING",
        )
        .bind(event.chain_id)
        .bind(&event.transaction_hash)
        .bind(event.log_index as i64)
        .bind(event.block_number as i64)
        .bind(event.timestamp_ms)
        .bind("contract_log")
        .bind(&event.contract_address)
        .bind(event.processed)
        .bind(doc)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_events(&self) -> Result<u64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM blockchain_events")
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n as u64)
    }
}

pub struct PostgresContractDataStore {
    pool: PgPool,
}

impl PostgresContractDataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContractDataStore for PostgresContractDataStore {
    async fn get(
        &self,
        chain_id: i64,
        contract_address: &str,
    ) -> Result<Option<ContractData>, StorageError> {
        let row = sqlx::query(
            "SELECT doc FROM contract_data \
             WHERE chain_id = $1 AND contract_address = $2",
        )
        .bind(chain_id)
        .bind(contract_address)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let doc: serde_json::Value = row.try_get("doc")?;
                Ok(Some(serde_json::from_value(doc)?))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, data: &ContractData) -> Result<(), StorageError> {
        let doc = serde_json::to_value(data).map_err(|e| {
            StorageError::internal_error(format!("Contract data encode failed: {}", e))
        })?;

        sqlx::query(
            "INSERT INTO contract_data (chain_id, contract_address, doc) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (chain_id, contract_address) DO UPDATE SET doc = EXCLUDED.doc",
        )
        .bind(data.chain_id)
        .bind(&data.contract_address)
        .bind(doc)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
