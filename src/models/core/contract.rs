use serde::{Deserialize, Serialize};

/// Typed slice of the free-form contract metadata document.
///
/// Unknown keys are preserved in `extra` so operator tooling can attach
/// fields the core does not interpret.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ContractMetadata {
    #[serde(default = "default_decimals")]
    pub decimals: u8,
    #[serde(default)]
    pub is_stablecoin: bool,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_decimals() -> u8 {
    18
}

impl ContractMetadata {
    pub fn is_high_priority(&self) -> bool {
        self.priority.as_deref() == Some("high")
    }
}

/// Configuration document for a monitored contract, keyed by
/// `(chain_id, address)` with the address normalized to lowercase.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContractConfig {
    pub chain_id: i64,
    pub address: String,
    pub name: String,
    pub symbol: String,
    pub contract_type: String,
    /// Topic-0 hashes of the events to monitor.
    pub events: Vec<String>,
    /// Event signature fragments sufficient to decode `events`, e.g.
    /// `"Transfer(address indexed from, address indexed to, uint256 value)"`.
    pub abi: Vec<String>,
    pub enabled: bool,
    #[serde(default)]
    pub metadata: ContractMetadata,
}

impl ContractConfig {
    /// Lowercased, 0x-prefixed form of the contract address.
    pub fn normalized_address(&self) -> String {
        normalize_address(&self.address)
    }
}

/// Normalizes an address to its canonical lowercase 0x-prefixed form.
pub fn normalize_address(address: &str) -> String {
    let stripped = address.strip_prefix("0x").unwrap_or(address);
    format!("0x{}", stripped.to_lowercase())
}

/// Compares two addresses ignoring case and 0x prefixes.
pub fn are_same_address(a: &str, b: &str) -> bool {
    normalize_address(a) == normalize_address(b)
}
