use std::{sync::Arc, time::Duration};

use tokio::time::{Instant, sleep};
use tracing::{error, info};

use crate::settlement::{SettlementApi, SettlementError};

const MAX_NO_NEW_BLOCK_DURATION: Duration = Duration::from_secs(30 * 60);
const IDLE_POLL_DELAY: Duration = Duration::from_secs(3);
const PROGRESS_POLL_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum WatchdogError {
    #[error("no new finalized block for {} seconds", .0.as_secs())]
    Stalled(Duration),
    #[error(transparent)]
    Settlement(#[from] SettlementError),
}

/// Liveness guard over the settlement chain.
///
/// Relaying against a stalled or disconnected chain client silently drops
/// orders, so a stall is a fatal error, not a recoverable one. This loop is
/// the process's only termination condition besides an external signal.
pub struct Watchdog<A> {
    api: Arc<A>,
    max_stall: Duration,
    idle_delay: Duration,
    progress_delay: Duration,
}

impl<A: SettlementApi> Watchdog<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            max_stall: MAX_NO_NEW_BLOCK_DURATION,
            idle_delay: IDLE_POLL_DELAY,
            progress_delay: PROGRESS_POLL_DELAY,
        }
    }

    pub async fn run(&self) -> Result<(), WatchdogError> {
        let mut last_block = self.api.latest_finalized_block().await?;
        let mut last_progress = Instant::now();
        info!(finalized = last_block, "running settlement liveness loop");

        loop {
            let current = self.api.latest_finalized_block().await?;
            if current > last_block {
                last_block = current;
                last_progress = Instant::now();
                sleep(self.progress_delay).await;
            } else {
                let stalled_for = last_progress.elapsed();
                if stalled_for > self.max_stall {
                    error!(
                        finalized = last_block,
                        stalled_secs = stalled_for.as_secs(),
                        "settlement chain stopped finalizing blocks, quitting"
                    );
                    return Err(WatchdogError::Stalled(stalled_for));
                }
                sleep(self.idle_delay).await;
            }
        }
    }
}
