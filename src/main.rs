use std::{sync::Arc, time::Duration};

use tracing::{error, info, warn};

use eth_da_relay::{
    db::CursorStore, monitor::create_monitor_task, settings::Settings,
    settlement::RpcSettlementClient, watchdog::Watchdog,
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("eth_da_relay=info,sqlx=warn")
        .try_init();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            error!("invalid configuration: {e:#}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(settings).await {
        error!("fatal error, exiting: {e:#}");
        std::process::exit(1);
    }
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    let cursors = CursorStore::open(&settings.db_path).await?;
    let settlement = Arc::new(RpcSettlementClient::new(
        settings.settlement_url.clone(),
        settings.settlement_seeds.clone(),
    )?);

    let monitor = if settings.evm_monitor_enable {
        let task = create_monitor_task(&settings, cursors.clone(), settlement.clone())?;
        task.start();
        Some(task)
    } else {
        info!("evm monitor disabled");
        None
    };

    let watchdog = Watchdog::new(settlement);
    let result = tokio::select! {
        res = watchdog.run() => res.map_err(anyhow::Error::from),
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
            Ok(())
        }
    };

    info!("stopping tasks");
    if let Some(task) = &monitor {
        task.stop();
    }
    if tokio::time::timeout(SHUTDOWN_GRACE, cursors.close())
        .await
        .is_err()
    {
        warn!("database close timed out, proceeding with shutdown");
    }

    result
}
