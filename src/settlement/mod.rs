use async_trait::async_trait;
use serde::Serialize;

pub mod rpc;

pub use rpc::RpcSettlementClient;

/// Lifecycle of a submitted settlement transaction.
///
/// `Submitted` is the only non-terminal state. `Included` means the
/// transaction executed successfully; `Failed` means it executed and the
/// order was rejected; `Invalid` means the node dropped it before execution
/// (usurped, retracted or otherwise discarded).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Submitted,
    Included,
    Failed,
    Invalid,
}

impl TxStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TxStatus::Submitted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TxStatus::Submitted => "submitted",
            TxStatus::Included => "included",
            TxStatus::Failed => "failed",
            TxStatus::Invalid => "invalid",
        }
    }

    /// Maps the node's reported transaction state onto the relay's machine.
    pub fn from_node_status(status: &str) -> Option<TxStatus> {
        match status {
            "submitted" | "ready" | "broadcast" => Some(TxStatus::Submitted),
            "included" | "inBlock" => Some(TxStatus::Included),
            "failed" => Some(TxStatus::Failed),
            "invalid" | "dropped" | "usurped" | "retracted" => Some(TxStatus::Invalid),
            _ => None,
        }
    }
}

/// One storage order to be placed on the settlement chain.
#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    pub cid: String,
    pub size: u64,
    pub source_tx_hash: String,
    pub chain: String,
    pub is_permanent: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("settlement rpc transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("settlement node error {code}: {message}")]
    Node { code: i64, message: String },
    #[error("malformed rpc response: {0}")]
    Response(String),
    #[error("illegal cid: {0}")]
    IllegalCid(String),
    #[error("seed phrase must be 12 words")]
    IllegalSeeds,
    #[error("transaction reached terminal state {}", .0.as_str())]
    Tx(TxStatus),
    #[error("timed out waiting for transaction inclusion")]
    ConfirmTimeout,
}

/// The settlement chain as the relay sees it: a finalized height to watch
/// and a single order-placement operation.
#[async_trait]
pub trait SettlementApi: Send + Sync {
    async fn latest_finalized_block(&self) -> Result<u64, SettlementError>;

    /// Places one storage order and tracks it to a terminal state.
    /// `Ok` means the transaction was included and executed successfully.
    async fn place_order(&self, order: &OrderRequest) -> Result<(), SettlementError>;
}

/// CIDv0 is 46 chars starting `Qm`, CIDv1 (base32) is 59 chars starting `ba`.
pub fn check_cid(cid: &str) -> bool {
    (cid.len() == 46 && cid.starts_with("Qm")) || (cid.len() == 59 && cid.starts_with("ba"))
}

pub fn check_seeds(seeds: &str) -> bool {
    seeds.split_whitespace().count() == 12
}
