use std::{str::FromStr, time::Duration};

use alloy::{
    dyn_abi::{DynSolValue, EventExt},
    hex,
    json_abi::{Event, JsonAbi},
    network::Ethereum,
    primitives::{Address, B256, LogData},
    providers::{Provider, RootProvider},
    rpc::{
        client::RpcClient,
        types::{Filter, Log},
    },
    transports::http::Http,
};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::warn;

use crate::chains::{EventSource, OrderEvent, SourceError};

/// ABI of the storage-order contract, reduced to the one event the relay
/// forwards. The event's `message` parameter carries the order as JSON.
const ORDER_EVENT_ABI: &str = r#"[
    {
        "type": "event",
        "name": "EthDAEvent",
        "inputs": [{ "name": "message", "type": "string", "indexed": false }],
        "anonymous": false
    }
]"#;

const HEAD_FETCH_ATTEMPTS: u32 = 10;
const HEAD_FETCH_RETRY_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug)]
pub struct EvmChain {
    client: RootProvider<Ethereum>,
    contract: Address,
    event: Event,
    topic: B256,
}

/// JSON body of the `EthDAEvent` message parameter.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderPayload {
    cid: String,
    size: u64,
    #[serde(default)]
    is_permanent: bool,
}

impl EvmChain {
    pub fn new(rpc_url: &str, contract_address: &str) -> anyhow::Result<Self> {
        let transport = Http::new(rpc_url.parse()?);
        let client = RootProvider::new(RpcClient::new(transport, false));
        let contract = Address::from_str(contract_address)?;

        let abi: JsonAbi = serde_json::from_str(ORDER_EVENT_ABI)?;
        let event = abi
            .events()
            .find(|ev| ev.name == "EthDAEvent")
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("order event missing from ABI"))?;
        let topic = B256::from(event.selector());

        Ok(Self { client, contract, event, topic })
    }

    fn decode_order_log(&self, log: &Log) -> Result<OrderEvent, SourceError> {
        let tx_hash = log
            .transaction_hash
            .ok_or_else(|| SourceError::Decode("log missing transaction hash".into()))?;

        let log_data = LogData::new_unchecked(log.topics().to_vec(), log.data().clone().data);
        let decoded = self
            .event
            .decode_log(&log_data)
            .map_err(|e| SourceError::Decode(e.to_string()))?;

        let message = match decoded.body.first() {
            Some(DynSolValue::String(message)) => message,
            _ => return Err(SourceError::Decode("event body is not a string".into())),
        };
        let payload: OrderPayload = serde_json::from_str(message)
            .map_err(|e| SourceError::Decode(format!("order payload is not valid JSON: {e}")))?;

        Ok(OrderEvent {
            cid: payload.cid,
            size: payload.size,
            source_tx_hash: format!("0x{}", hex::encode(tx_hash)),
            is_permanent: payload.is_permanent,
        })
    }
}

#[async_trait]
impl EventSource for EvmChain {
    async fn latest_block_number(&self) -> Result<u64, SourceError> {
        for attempt in 1..=HEAD_FETCH_ATTEMPTS {
            match self.client.get_block_number().await {
                Ok(number) => return Ok(number),
                Err(e) => {
                    warn!(attempt, error = %e, "fetching latest block number failed");
                    if attempt < HEAD_FETCH_ATTEMPTS {
                        sleep(HEAD_FETCH_RETRY_DELAY).await;
                    }
                }
            }
        }
        Err(SourceError::Unavailable(HEAD_FETCH_ATTEMPTS))
    }

    async fn order_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<OrderEvent>, SourceError> {
        let filter = Filter::new()
            .from_block(from_block)
            .to_block(to_block)
            .address(self.contract)
            .event_signature(self.topic);

        let logs = self.client.get_logs(&filter).await?;
        logs.iter().map(|log| self.decode_order_log(log)).collect()
    }
}
