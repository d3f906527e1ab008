use std::time::Duration;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use tokio::time::{Instant, sleep};
use tracing::{error, info};

use crate::settlement::{
    OrderRequest, SettlementApi, SettlementError, TxStatus, check_cid, check_seeds,
};
use async_trait::async_trait;

const STATUS_POLL_DELAY: Duration = Duration::from_secs(3);
const CONFIRM_TIMEOUT: Duration = Duration::from_secs(120);

/// JSON-RPC client for the settlement node.
///
/// Transaction construction and signing happen node-side; the relay hands the
/// node its configured account seed together with the order parameters and
/// then polls the transaction state until it is terminal.
#[derive(Debug)]
pub struct RpcSettlementClient {
    http: reqwest::Client,
    url: String,
    seeds: String,
    status_poll_delay: Duration,
    confirm_timeout: Duration,
}

#[derive(Serialize)]
struct RpcRequest<'a, P> {
    id: u32,
    jsonrpc: &'static str,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct ChainHeader {
    number: String,
}

impl RpcSettlementClient {
    pub fn new(url: String, seeds: String) -> Result<Self, SettlementError> {
        if !check_seeds(&seeds) {
            return Err(SettlementError::IllegalSeeds);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            url,
            seeds,
            status_poll_delay: STATUS_POLL_DELAY,
            confirm_timeout: CONFIRM_TIMEOUT,
        })
    }

    async fn rpc_call<P, T>(&self, method: &str, params: P) -> Result<T, SettlementError>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(&self.url)
            .json(&RpcRequest { id: 1, jsonrpc: "2.0", method, params })
            .send()
            .await?;

        let body: RpcResponse<T> = response.json().await?;
        if let Some(err) = body.error {
            return Err(SettlementError::Node { code: err.code, message: err.message });
        }
        body.result
            .ok_or_else(|| SettlementError::Response(format!("{method} returned no result")))
    }

    async fn wait_for_terminal(&self, tx_hash: &str) -> Result<(), SettlementError> {
        let deadline = Instant::now() + self.confirm_timeout;
        loop {
            let reported: String = self.rpc_call("market_orderStatus", json!([tx_hash])).await?;
            let status = TxStatus::from_node_status(&reported).ok_or_else(|| {
                SettlementError::Response(format!("unknown transaction status {reported:?}"))
            })?;

            match status {
                TxStatus::Included => {
                    info!(tx = %tx_hash, "transaction included");
                    return Ok(());
                }
                TxStatus::Failed | TxStatus::Invalid => {
                    error!(tx = %tx_hash, status = status.as_str(), "transaction rejected");
                    return Err(SettlementError::Tx(status));
                }
                TxStatus::Submitted => {
                    if Instant::now() >= deadline {
                        return Err(SettlementError::ConfirmTimeout);
                    }
                    sleep(self.status_poll_delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl SettlementApi for RpcSettlementClient {
    async fn latest_finalized_block(&self) -> Result<u64, SettlementError> {
        let head: String = self.rpc_call("chain_getFinalizedHead", json!([])).await?;
        let header: ChainHeader = self.rpc_call("chain_getHeader", json!([head])).await?;
        parse_hex_block_number(&header.number)
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<(), SettlementError> {
        if !check_cid(&order.cid) {
            return Err(SettlementError::IllegalCid(order.cid.clone()));
        }

        let tx_hash: String = self
            .rpc_call(
                "market_placeStorageOrder",
                json!([
                    self.seeds,
                    order.cid,
                    order.size,
                    order.source_tx_hash,
                    order.chain,
                    order.is_permanent,
                ]),
            )
            .await?;
        info!(tx = %tx_hash, cid = %order.cid, "storage order submitted, awaiting inclusion");

        self.wait_for_terminal(&tx_hash).await
    }
}

fn parse_hex_block_number(number: &str) -> Result<u64, SettlementError> {
    u64::from_str_radix(number.trim_start_matches("0x"), 16)
        .map_err(|_| SettlementError::Response(format!("bad block number {number:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_block_numbers() {
        assert_eq!(parse_hex_block_number("0x2ee0").unwrap(), 12000);
        assert_eq!(parse_hex_block_number("ff").unwrap(), 255);
        assert!(parse_hex_block_number("0xzz").is_err());
        assert!(parse_hex_block_number("").is_err());
    }

    #[test]
    fn rejects_short_seed_phrases() {
        let client = RpcSettlementClient::new(
            "http://localhost:9933".into(),
            "not twelve words".into(),
        );
        assert!(matches!(client, Err(SettlementError::IllegalSeeds)));
    }

    #[test]
    fn rpc_error_body_deserializes() {
        let body: RpcResponse<String> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"Method not found"}}"#,
        )
        .unwrap();
        let err = body.error.unwrap();
        assert_eq!(err.code, -32601);
        assert_eq!(err.message, "Method not found");
        assert!(body.result.is_none());
    }
}
