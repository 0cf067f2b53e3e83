use serde::{Deserialize, Serialize};

/// Chain families the configuration store may describe.
///
/// Only EVM chains have an adapter implementation; the other variants are
/// accepted so operator tooling can stage configurations ahead of support.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainType {
    Evm,
    Solana,
    Sui,
}

/// Ingestion strategy for a chain's listener.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStrategy {
    Push,
    Pull,
    Hybrid,
}

impl std::fmt::Display for IngestStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Push => write!(f, "push"),
            Self::Pull => write!(f, "pull"),
            Self::Hybrid => write!(f, "hybrid"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Configuration document for a single chain, keyed by `chain_id`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
    pub chain_id: i64,
    pub name: String,
    pub chain_type: ChainType,
    pub rpc_url: String,
    pub stream_url: Option<String>,
    pub strategy: IngestStrategy,
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,
    pub enabled: bool,
    pub native_currency: NativeCurrency,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

fn default_scan_interval_ms() -> u64 {
    5_000
}

impl ChainConfig {
    /// Whether a streaming endpoint is configured and non-empty.
    pub fn has_stream_url(&self) -> bool {
        self.stream_url.as_deref().is_some_and(|u| !u.is_empty())
    }

    /// The strategy actually usable at runtime: `push`/`hybrid` without a
    /// streaming endpoint degrade to `pull`.
    pub fn effective_strategy(&self) -> IngestStrategy {
        match self.strategy {
            IngestStrategy::Pull => IngestStrategy::Pull,
            strategy if self.has_stream_url() => strategy,
            _ => IngestStrategy::Pull,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(strategy: IngestStrategy, stream_url: Option<&str>) -> ChainConfig {
        ChainConfig {
            chain_id: 1,
            name: "Ethereum".into(),
            chain_type: ChainType::Evm,
            rpc_url: "https://eth.example".into(),
            stream_url: stream_url.map(String::from),
            strategy,
            scan_interval_ms: 5_000,
            enabled: true,
            native_currency: NativeCurrency {
                name: "Ether".into(),
                symbol: "ETH".into(),
                decimals: 18,
            },
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn push_without_stream_url_degrades_to_pull() {
        assert_eq!(
            chain(IngestStrategy::Push, None).effective_strategy(),
            IngestStrategy::Pull
        );
        assert_eq!(
            chain(IngestStrategy::Push, Some("")).effective_strategy(),
            IngestStrategy::Pull
        );
        assert_eq!(
            chain(IngestStrategy::Push, Some("wss://eth.example")).effective_strategy(),
            IngestStrategy::Push
        );
    }

    #[test]
    fn hybrid_keeps_hybrid_when_stream_url_present() {
        assert_eq!(
            chain(IngestStrategy::Hybrid, Some("wss://eth.example")).effective_strategy(),
            IngestStrategy::Hybrid
        );
        assert_eq!(
            chain(IngestStrategy::Hybrid, None).effective_strategy(),
            IngestStrategy::Pull
        );
    }

    #[test]
    fn strategy_serde_roundtrip() {
        let json = serde_json::to_string(&IngestStrategy::Hybrid).unwrap();
        assert_eq!(json, "\"hybrid\"");
        let back: IngestStrategy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, IngestStrategy::Hybrid);
    }
}
