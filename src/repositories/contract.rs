//! Contract configuration repository.
//!
//! Contract documents are stored as JSONB keyed by `(chain_id, address)`
//! with the address normalized to lowercase at write time so the unique key
//! is case-insensitive in practice.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::{
    models::{normalize_address, ContractConfig},
    repositories::error::RepositoryError,
};

#[async_trait]
pub trait ContractConfigRepositoryTrait: Send + Sync {
    async fn get(
        &self,
        chain_id: i64,
        address: &str,
    ) -> Result<Option<ContractConfig>, RepositoryError>;
    async fn get_enabled_for_chain(
        &self,
        chain_id: i64,
    ) -> Result<Vec<ContractConfig>, RepositoryError>;
    async fn get_by_symbol(&self, symbol: &str) -> Result<Vec<ContractConfig>, RepositoryError>;
    async fn set_enabled_by_symbol(
        &self,
        symbol: &str,
        enabled: bool,
    ) -> Result<u64, RepositoryError>;
    async fn set_enabled_for_chain(
        &self,
        chain_id: i64,
        enabled: bool,
    ) -> Result<u64, RepositoryError>;
    async fn upsert(&self, config: &ContractConfig) -> Result<(), RepositoryError>;
}

pub struct PostgresContractConfigRepository {
    pool: PgPool,
}

impl PostgresContractConfigRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn decode_row(row: &sqlx::postgres::PgRow) -> Result<ContractConfig, RepositoryError> {
        let doc: serde_json::Value = row.try_get("doc")?;
        Ok(serde_json::from_value(doc)?)
    }
}

#[async_trait]
impl ContractConfigRepositoryTrait for PostgresContractConfigRepository {
    async fn get(
        &self,
        chain_id: i64,
        address: &str,
    ) -> Result<Option<ContractConfig>, RepositoryError> {
        let row = sqlx::query(
            "SELECT doc FROM contract_configs WHERE chain_id = $1 AND address = $2",
        )
        .bind(chain_id)
        .bind(normalize_address(address))
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::decode_row).transpose()
    }

    async fn get_enabled_for_chain(
        &self,
        chain_id: i64,
    ) -> Result<Vec<ContractConfig>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT doc FROM contract_configs \
             WHERE chain_id = $1 AND (doc->>'enabled')::boolean = true \
             ORDER BY address",
        )
        .bind(chain_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::decode_row).collect()
    }

    async fn get_by_symbol(&self, symbol: &str) -> Result<Vec<ContractConfig>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT doc FROM contract_configs \
             WHERE UPPER(doc->>'symbol') = UPPER($1) ORDER BY chain_id, address",
        )
        .bind(symbol)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::decode_row).collect()
    }

    async fn set_enabled_by_symbol(
        &self,
        symbol: &str,
        enabled: bool,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE contract_configs \
             SET doc = jsonb_set(doc, '{enabled}', to_jsonb($2::boolean)) \
             WHERE UPPER(doc->>'symbol') = UPPER($1)",
        )
        .bind(symbol)
        .bind(enabled)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn set_enabled_for_chain(
        &self,
        chain_id: i64,
        enabled: bool,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE contract_configs \
             SET doc = jsonb_set(doc, '{enabled}', to_jsonb($2::boolean)) \
             WHERE chain_id = $1",
        )
        .bind(chain_id)
        .bind(enabled)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn upsert(&self, config: &ContractConfig) -> Result<(), RepositoryError> {
        config.validate().map_err(|e| {
            RepositoryError::validation_error(format!(
                "Refusing to store invalid contract {}/{}: {}",
                config.chain_id, config.address, e
            ))
        })?;
        let mut stored = config.clone();
        stored.address = config.normalized_address();
        let doc = serde_json::to_value(&stored)?;
        sqlx::query(
            "INSERT INTO contract_configs (chain_id, address, doc) VALUES ($1, $2, $3) \
             ON CONFLICT (chain_id, address) DO UPDATE SET doc = EXCLUDED.doc",
        )
        .bind(stored.chain_id)
        .bind(&stored.address)
        .bind(doc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// In-memory contract repository for tests and store-less development.
#[derive(Default)]
pub struct InMemoryContractConfigRepository {
    contracts: Mutex<HashMap<(i64, String), ContractConfig>>,
}

impl InMemoryContractConfigRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_contracts(contracts: Vec<ContractConfig>) -> Self {
        let repo = Self::new();
        for contract in contracts {
            repo.upsert(&contract).await.expect("in-memory upsert");
        }
        repo
    }
}

#[async_trait]
impl ContractConfigRepositoryTrait for InMemoryContractConfigRepository {
    async fn get(
        &self,
        chain_id: i64,
        address: &str,
    ) -> Result<Option<ContractConfig>, RepositoryError> {
        Ok(self
            .contracts
            .lock()
            .await
            .get(&(chain_id, normalize_address(address)))
            .cloned())
    }

    async fn get_enabled_for_chain(
        &self,
        chain_id: i64,
    ) -> Result<Vec<ContractConfig>, RepositoryError> {
        let mut matching: Vec<ContractConfig> = self
            .contracts
            .lock()
            .await
            .values()
            .filter(|c| c.chain_id == chain_id && c.enabled)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.address.cmp(&b.address));
        Ok(matching)
    }

    async fn get_by_symbol(&self, symbol: &str) -> Result<Vec<ContractConfig>, RepositoryError> {
        let mut matching: Vec<ContractConfig> = self
            .contracts
            .lock()
            .await
            .values()
            .filter(|c| c.symbol.eq_ignore_ascii_case(symbol))
            .cloned()
            .collect();
        matching.sort_by(|a, b| (a.chain_id, &a.address).cmp(&(b.chain_id, &b.address)));
        Ok(matching)
    }

    async fn set_enabled_by_symbol(
        &self,
        symbol: &str,
        enabled: bool,
    ) -> Result<u64, RepositoryError> {
        let mut contracts = self.contracts.lock().await;
        let mut touched = 0;
        for contract in contracts.values_mut() {
            if contract.symbol.eq_ignore_ascii_case(symbol) {
                contract.enabled = enabled;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn set_enabled_for_chain(
        &self,
        chain_id: i64,
        enabled: bool,
    ) -> Result<u64, RepositoryError> {
        let mut contracts = self.contracts.lock().await;
        let mut touched = 0;
        for contract in contracts.values_mut() {
            if contract.chain_id == chain_id {
                contract.enabled = enabled;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn upsert(&self, config: &ContractConfig) -> Result<(), RepositoryError> {
        let mut stored = config.clone();
        stored.address = config.normalized_address();
        self.contracts
            .lock()
            .await
            .insert((stored.chain_id, stored.address.clone()), stored);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContractMetadata;

    const TRANSFER_TOPIC: &str =
        "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

    fn contract(chain_id: i64, address: &str, symbol: &str, enabled: bool) -> ContractConfig {
        ContractConfig {
            chain_id,
            address: address.into(),
            name: symbol.into(),
            symbol: symbol.into(),
            contract_type: "erc20".into(),
            events: vec![TRANSFER_TOPIC.into()],
            abi: vec!["Transfer(address indexed from, address indexed to, uint256 value)".into()],
            enabled,
            metadata: ContractMetadata::default(),
        }
    }

    #[tokio::test]
    async fn lookup_normalizes_address_case() {
        let repo = InMemoryContractConfigRepository::with_contracts(vec![contract(
            1,
            "0xA0b86991C6218B36c1d19D4a2e9Eb0cE3606eB48",
            "USDC",
            true,
        )])
        .await;

        let found = repo
            .get(1, "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48")
            .await
            .unwrap();
        assert!(found.is_some());
        assert_eq!(
            found.unwrap().address,
            "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"
        );
    }

    #[tokio::test]
    async fn symbol_toggle_is_cross_chain() {
        let repo = InMemoryContractConfigRepository::with_contracts(vec![
            contract(1, "0x0000000000000000000000000000000000000a01", "USDT", true),
            contract(56, "0x0000000000000000000000000000000000000a02", "usdt", true),
            contract(1, "0x0000000000000000000000000000000000000a03", "WETH", true),
        ])
        .await;

        assert_eq!(repo.set_enabled_by_symbol("USDT", false).await.unwrap(), 2);
        assert_eq!(repo.get_enabled_for_chain(1).await.unwrap().len(), 1);
        assert_eq!(repo.get_enabled_for_chain(56).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn chain_toggle_scopes_to_one_chain() {
        let repo = InMemoryContractConfigRepository::with_contracts(vec![
            contract(1, "0x0000000000000000000000000000000000000a01", "USDT", true),
            contract(56, "0x0000000000000000000000000000000000000a02", "USDT", true),
        ])
        .await;

        assert_eq!(repo.set_enabled_for_chain(1, false).await.unwrap(), 1);
        assert!(repo.get_enabled_for_chain(1).await.unwrap().is_empty());
        assert_eq!(repo.get_enabled_for_chain(56).await.unwrap().len(), 1);
    }
}
