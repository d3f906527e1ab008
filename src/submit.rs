use std::{sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{error, info};

use crate::settlement::{OrderRequest, SettlementApi};

pub const MAX_SUBMIT_ATTEMPTS: u32 = 5;
pub const SUBMIT_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Wraps order placement with bounded retry and a fixed delay.
///
/// No backoff or jitter: the event rate is low and a fixed cadence keeps the
/// logs easy to reconcile by hand.
#[derive(Debug)]
pub struct OrderSubmitter<A> {
    pub(crate) api: Arc<A>,
    pub(crate) max_attempts: u32,
    pub(crate) retry_delay: Duration,
}

impl<A: SettlementApi> OrderSubmitter<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            max_attempts: MAX_SUBMIT_ATTEMPTS,
            retry_delay: SUBMIT_RETRY_DELAY,
        }
    }

    /// Returns whether any attempt succeeded. Every attempt logs enough
    /// context (cid, size, source tx hash) for manual reconciliation.
    pub async fn submit_with_retry(&self, order: &OrderRequest) -> bool {
        for attempt in 1..=self.max_attempts {
            match self.api.place_order(order).await {
                Ok(()) => {
                    info!(
                        cid = %order.cid,
                        size = order.size,
                        tx = %order.source_tx_hash,
                        attempt,
                        "storage order placed"
                    );
                    return true;
                }
                Err(e) => {
                    error!(
                        cid = %order.cid,
                        size = order.size,
                        tx = %order.source_tx_hash,
                        attempt,
                        error = %e,
                        "placing storage order failed"
                    );
                    if attempt < self.max_attempts {
                        sleep(self.retry_delay).await;
                    }
                }
            }
        }
        false
    }
}
