//! Configuration store repositories.
//!
//! Two logical collections back the runtime: `chain_configs` (keyed by
//! `chain_id`) and `contract_configs` (keyed by `(chain_id, address)`).
//! Each has a Postgres implementation and an in-memory equivalent behind the
//! same trait; the core reads them on reload and the operator API toggles
//! enabled flags.

mod chain;
mod contract;
mod error;

pub use chain::{
    ChainConfigRepositoryTrait, InMemoryChainConfigRepository, PostgresChainConfigRepository,
};
pub use contract::{
    ContractConfigRepositoryTrait, InMemoryContractConfigRepository,
    PostgresContractConfigRepository,
};
pub use error::RepositoryError;
