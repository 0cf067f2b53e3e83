mod chain;
mod contract;
mod contract_data;
mod event;

pub use chain::{ChainConfig, ChainType, IngestStrategy, NativeCurrency};
pub use contract::{are_same_address, normalize_address, ContractConfig, ContractMetadata};
pub use contract_data::{ContractData, ContractDataMetadata};
pub use event::{
    ApprovalEvent, BlockchainEvent, ContractInfo, DecodedEvent, EventInfo, EventPayload,
    EventType, TransferEvent, TransferKind, ZERO_ADDRESS,
};
