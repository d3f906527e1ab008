use std::{cmp, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{
    chains::{ChainKind, EventSource},
    db::CursorStore,
    settlement::{OrderRequest, SettlementApi},
    submit::OrderSubmitter,
};

/// Blocks fetched per `eth_getLogs` call.
pub const SCAN_WINDOW: u64 = 1000;
/// Pause between windows to bound the request rate.
pub const WINDOW_DELAY: Duration = Duration::from_secs(1);

/// Advances a chain's cursor from its last persisted position to the current
/// head, forwarding every decoded order event along the way.
///
/// The cursor is the next block to scan; it is persisted after every window,
/// so a crash loses at most one window of progress and re-forwards at most
/// one window of events. Submission on the settlement side must tolerate
/// such duplicates.
pub struct OrderScanner<S, A> {
    pub(crate) source: S,
    pub(crate) submitter: OrderSubmitter<A>,
    pub(crate) cursors: CursorStore,
    pub(crate) chain: ChainKind,
    pub(crate) window: u64,
    pub(crate) window_delay: Duration,
}

impl<S: EventSource, A: SettlementApi> OrderScanner<S, A> {
    pub fn new(source: S, cursors: CursorStore, settlement: Arc<A>, chain: ChainKind) -> Self {
        Self {
            source,
            submitter: OrderSubmitter::new(settlement),
            cursors,
            chain,
            window: SCAN_WINDOW,
            window_delay: WINDOW_DELAY,
        }
    }

    /// One scan tick. Network errors are contained here: the head query and
    /// log fetches log their failure and leave the cursor at its last
    /// persisted value. Only cursor-persistence errors propagate.
    pub async fn scan_once(&self) -> anyhow::Result<()> {
        let label = self.chain.as_str();

        let head = match self.source.latest_block_number().await {
            Ok(head) => head,
            Err(e) => {
                error!(chain = label, error = %e, "fetching latest block number failed");
                return Ok(());
            }
        };

        let Some(cursor) = self.cursors.get(label).await? else {
            // First run: start scanning from "now", skip all history.
            info!(chain = label, head, "initializing scan cursor to current head");
            self.cursors.set(label, head).await?;
            return Ok(());
        };

        if cursor > head {
            // Head behind cursor means an inconsistent RPC reading; reset
            // and let the next tick scan from there.
            warn!(chain = label, cursor, head, "observed head behind cursor, resetting");
            self.cursors.set(label, head).await?;
            return Ok(());
        }

        let mut from = cursor;
        while from < head {
            let to = cmp::min(from + self.window, head);

            let events = match self.source.order_events(from, to - 1).await {
                Ok(events) => events,
                Err(e) => {
                    error!(
                        chain = label,
                        from,
                        to,
                        error = %e,
                        "fetching order events failed, aborting scan tick"
                    );
                    return Ok(());
                }
            };

            for event in events {
                let order = OrderRequest {
                    cid: event.cid,
                    size: event.size,
                    source_tx_hash: event.source_tx_hash,
                    chain: label.to_string(),
                    is_permanent: event.is_permanent,
                };
                if !self.submitter.submit_with_retry(&order).await {
                    // Deliberately lossy: the cursor advances regardless, so
                    // this order will not be retried on a later tick.
                    error!(chain = label, cid = %order.cid, "order dropped after exhausting retries");
                }
            }

            self.cursors.set(label, to).await?;
            from = to;
            if from < head {
                sleep(self.window_delay).await;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicU32, Ordering},
    };

    use async_trait::async_trait;

    use super::*;
    use crate::{
        chains::{OrderEvent, SourceError},
        settlement::SettlementError,
    };

    struct MockSource {
        head: Result<u64, ()>,
        events: Vec<(u64, OrderEvent)>,
        fail_from_block: Option<u64>,
        fetched: Mutex<Vec<(u64, u64)>>,
    }

    impl MockSource {
        fn with_head(head: u64) -> Self {
            Self {
                head: Ok(head),
                events: Vec::new(),
                fail_from_block: None,
                fetched: Mutex::new(Vec::new()),
            }
        }

        fn fetches(&self) -> Vec<(u64, u64)> {
            self.fetched.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventSource for MockSource {
        async fn latest_block_number(&self) -> Result<u64, SourceError> {
            self.head.map_err(|_| SourceError::Unavailable(10))
        }

        async fn order_events(
            &self,
            from_block: u64,
            to_block: u64,
        ) -> Result<Vec<OrderEvent>, SourceError> {
            if self.fail_from_block == Some(from_block) {
                return Err(SourceError::Decode("mock fetch failure".into()));
            }
            self.fetched.lock().unwrap().push((from_block, to_block));
            Ok(self
                .events
                .iter()
                .filter(|(block, _)| (from_block..=to_block).contains(block))
                .map(|(_, event)| event.clone())
                .collect())
        }
    }

    struct CountingSettlement {
        attempts: AtomicU32,
        succeed: bool,
    }

    impl CountingSettlement {
        fn new(succeed: bool) -> Self {
            Self { attempts: AtomicU32::new(0), succeed }
        }

        fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SettlementApi for CountingSettlement {
        async fn latest_finalized_block(&self) -> Result<u64, SettlementError> {
            Ok(0)
        }

        async fn place_order(&self, _order: &OrderRequest) -> Result<(), SettlementError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                Ok(())
            } else {
                Err(SettlementError::Node { code: 402, message: "order failed".into() })
            }
        }
    }

    async fn scanner(
        source: MockSource,
        settlement: Arc<CountingSettlement>,
    ) -> OrderScanner<MockSource, CountingSettlement> {
        OrderScanner {
            source,
            submitter: OrderSubmitter {
                api: settlement,
                max_attempts: 5,
                retry_delay: Duration::ZERO,
            },
            cursors: CursorStore::open_in_memory().await.unwrap(),
            chain: ChainKind::Optimism,
            window: 1000,
            window_delay: Duration::ZERO,
        }
    }

    fn event_at(block: u64) -> (u64, OrderEvent) {
        (
            block,
            OrderEvent {
                cid: "QmPK1s3pNYLi9ERiq3BDxKa4XosgWwFRQUydHUtz4YgpqB".into(),
                size: 1024,
                source_tx_hash: "0xabc".into(),
                is_permanent: false,
            },
        )
    }

    #[tokio::test]
    async fn first_run_initializes_cursor_to_head_without_scanning() {
        let settlement = Arc::new(CountingSettlement::new(true));
        let scanner = scanner(MockSource::with_head(12000), settlement.clone()).await;

        scanner.scan_once().await.unwrap();

        assert_eq!(scanner.cursors.get("optimism").await.unwrap(), Some(12000));
        assert!(scanner.source.fetches().is_empty());
        assert_eq!(settlement.attempts(), 0);
    }

    #[tokio::test]
    async fn head_behind_cursor_resets_without_scanning() {
        let settlement = Arc::new(CountingSettlement::new(true));
        let scanner = scanner(MockSource::with_head(100), settlement).await;
        scanner.cursors.set("optimism", 500).await.unwrap();

        scanner.scan_once().await.unwrap();

        assert_eq!(scanner.cursors.get("optimism").await.unwrap(), Some(100));
        assert!(scanner.source.fetches().is_empty());
    }

    #[tokio::test]
    async fn cursor_at_head_performs_zero_windows() {
        let settlement = Arc::new(CountingSettlement::new(true));
        let scanner = scanner(MockSource::with_head(10500), settlement).await;
        scanner.cursors.set("optimism", 10500).await.unwrap();

        scanner.scan_once().await.unwrap();

        assert_eq!(scanner.cursors.get("optimism").await.unwrap(), Some(10500));
        assert!(scanner.source.fetches().is_empty());
    }

    #[tokio::test]
    async fn partial_window_scans_up_to_head() {
        let settlement = Arc::new(CountingSettlement::new(true));
        let scanner = scanner(MockSource::with_head(10500), settlement).await;
        scanner.cursors.set("optimism", 10000).await.unwrap();

        scanner.scan_once().await.unwrap();

        assert_eq!(scanner.source.fetches(), vec![(10000, 10499)]);
        assert_eq!(scanner.cursors.get("optimism").await.unwrap(), Some(10500));
    }

    #[tokio::test]
    async fn pagination_covers_contiguous_non_overlapping_windows() {
        let settlement = Arc::new(CountingSettlement::new(true));
        let scanner = scanner(MockSource::with_head(13500), settlement).await;
        scanner.cursors.set("optimism", 10000).await.unwrap();

        scanner.scan_once().await.unwrap();

        assert_eq!(
            scanner.source.fetches(),
            vec![
                (10000, 10999),
                (11000, 11999),
                (12000, 12999),
                (13000, 13499),
            ]
        );
        assert_eq!(scanner.cursors.get("optimism").await.unwrap(), Some(13500));
    }

    #[tokio::test]
    async fn events_are_forwarded_with_the_chain_label() {
        let settlement = Arc::new(CountingSettlement::new(true));
        let mut source = MockSource::with_head(10500);
        source.events.push(event_at(10100));
        let scanner = scanner(source, settlement.clone()).await;
        scanner.cursors.set("optimism", 10000).await.unwrap();

        scanner.scan_once().await.unwrap();

        assert_eq!(settlement.attempts(), 1);
        assert_eq!(scanner.cursors.get("optimism").await.unwrap(), Some(10500));
    }

    #[tokio::test]
    async fn exhausted_submission_still_advances_the_cursor() {
        let settlement = Arc::new(CountingSettlement::new(false));
        let mut source = MockSource::with_head(10500);
        source.events.push(event_at(10100));
        let scanner = scanner(source, settlement.clone()).await;
        scanner.cursors.set("optimism", 10000).await.unwrap();

        scanner.scan_once().await.unwrap();

        assert_eq!(settlement.attempts(), 5);
        assert_eq!(scanner.cursors.get("optimism").await.unwrap(), Some(10500));
    }

    #[tokio::test]
    async fn fetch_failure_keeps_progress_from_earlier_windows() {
        let settlement = Arc::new(CountingSettlement::new(true));
        let mut source = MockSource::with_head(13500);
        source.fail_from_block = Some(11000);
        let scanner = scanner(source, settlement).await;
        scanner.cursors.set("optimism", 10000).await.unwrap();

        scanner.scan_once().await.unwrap();

        assert_eq!(scanner.source.fetches(), vec![(10000, 10999)]);
        assert_eq!(scanner.cursors.get("optimism").await.unwrap(), Some(11000));
    }

    #[tokio::test]
    async fn head_query_failure_leaves_cursor_untouched() {
        let settlement = Arc::new(CountingSettlement::new(true));
        let mut source = MockSource::with_head(0);
        source.head = Err(());
        let scanner = scanner(source, settlement).await;
        scanner.cursors.set("optimism", 10000).await.unwrap();

        scanner.scan_once().await.unwrap();

        assert_eq!(scanner.cursors.get("optimism").await.unwrap(), Some(10000));
        assert!(scanner.source.fetches().is_empty());
    }

    #[tokio::test]
    async fn cursor_is_monotonic_across_ticks() {
        let settlement = Arc::new(CountingSettlement::new(true));
        let scanner = scanner(MockSource::with_head(12000), settlement).await;

        let mut observed = Vec::new();
        for _ in 0..3 {
            scanner.scan_once().await.unwrap();
            observed.push(scanner.cursors.get("optimism").await.unwrap().unwrap());
        }

        assert!(observed.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(*observed.last().unwrap(), 12000);
    }
}
