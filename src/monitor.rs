use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::info;

use crate::{
    chains::evm::EvmChain,
    db::CursorStore,
    scanner::OrderScanner,
    settings::Settings,
    settlement::SettlementApi,
    task::{IntervalTask, TickHandler},
};

/// Polling cadence of the EVM monitor; also used as the start delay.
pub const MONITOR_INTERVAL: Duration = Duration::from_secs(15);

struct EvmOrderMonitor<A> {
    scanner: OrderScanner<EvmChain, A>,
}

#[async_trait]
impl<A: SettlementApi + 'static> TickHandler for EvmOrderMonitor<A> {
    async fn tick(&self) -> anyhow::Result<()> {
        self.scanner.scan_once().await
    }
}

/// Binds the configured EVM chain, the cursor store and the settlement
/// client into a named, startable monitor task.
pub fn create_monitor_task<A: SettlementApi + 'static>(
    settings: &Settings,
    cursors: CursorStore,
    settlement: Arc<A>,
) -> anyhow::Result<IntervalTask> {
    info!(
        "---> {} contract address: {}",
        settings.evm_chain, settings.evm_contract_address
    );
    info!("---> {} endpoint: {}", settings.evm_chain, settings.evm_endpoint_url);

    let chain = EvmChain::new(&settings.evm_endpoint_url, &settings.evm_contract_address)?;
    let scanner = OrderScanner::new(chain, cursors, settlement, settings.evm_chain);
    let task = IntervalTask::new(
        MONITOR_INTERVAL,
        MONITOR_INTERVAL,
        format!("monitor-{}", settings.evm_chain),
        Arc::new(EvmOrderMonitor { scanner }),
    )?;
    Ok(task)
}
