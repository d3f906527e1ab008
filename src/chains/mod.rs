use std::fmt;

use alloy::transports::TransportError;
use async_trait::async_trait;
use serde::Deserialize;

pub mod evm;

/// Label of the EVM chain a cursor or monitor task belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
    Ethereum,
    Arb1,
    Optimism,
    Zksync,
    Starknet,
    Polygonzk,
    Polygon,
}

impl ChainKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainKind::Ethereum => "ethereum",
            ChainKind::Arb1 => "arb1",
            ChainKind::Optimism => "optimism",
            ChainKind::Zksync => "zksync",
            ChainKind::Starknet => "starknet",
            ChainKind::Polygonzk => "polygonzk",
            ChainKind::Polygon => "polygon",
        }
    }
}

impl Default for ChainKind {
    fn default() -> Self {
        ChainKind::Optimism
    }
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A storage order decoded from one matching log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderEvent {
    pub cid: String,
    pub size: u64,
    pub source_tx_hash: String,
    pub is_permanent: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("rpc unavailable after {0} attempts")]
    Unavailable(u32),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("undecodable log: {0}")]
    Decode(String),
}

/// Read side of the source chain: block height and filtered order events.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Current head block number, retried internally with a fixed delay.
    async fn latest_block_number(&self) -> Result<u64, SourceError>;

    /// Decoded order events for the inclusive block range `[from, to]`.
    async fn order_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<OrderEvent>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_labels_round_trip_lowercase() {
        assert_eq!(ChainKind::Optimism.as_str(), "optimism");
        assert_eq!(ChainKind::Arb1.to_string(), "arb1");

        let parsed: ChainKind = serde_json::from_str("\"polygonzk\"").unwrap();
        assert_eq!(parsed, ChainKind::Polygonzk);
    }
}
