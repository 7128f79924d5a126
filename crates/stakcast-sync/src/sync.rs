use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use stakcast_common::SyncResult;

use crate::chain::ChainClient;
use crate::checkpoint::CheckpointStore;
use crate::classifier::EventClassifier;
use crate::details::MarketDetailFetcher;
use crate::events::{DomainEvent, EventEnvelope};
use crate::felt::{felt_to_hex, Felt};
use crate::projection::{BlockContext, ProjectionSink, ProjectionWriter};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10_000);

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Prediction hub contract whose events are projected
    pub contract: Felt,
    pub poll_interval: Duration,
    /// First block to process when no checkpoint has been stored. Block 0 is
    /// never processed: 0 and 1 both start at block 1.
    pub start_block: u64,
}

/// Outcome of one polling cycle
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub head: u64,
    pub blocks: u64,
    pub applied: u64,
    pub duplicates: u64,
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct BlockSummary {
    applied: u64,
    duplicates: u64,
    dropped: u64,
    ignored: u64,
}

/// Sequentially projects every unseen block, advancing the checkpoint only
/// once a block's events have all been handled.
pub struct SyncLoop {
    chain: Arc<dyn ChainClient>,
    checkpoints: Arc<dyn CheckpointStore>,
    classifier: EventClassifier,
    writer: ProjectionWriter,
    config: SyncConfig,
    checkpoint: u64,
}

impl SyncLoop {
    /// Read the stored checkpoint and build the loop.
    pub async fn start(
        chain: Arc<dyn ChainClient>,
        checkpoints: Arc<dyn CheckpointStore>,
        sink: Arc<dyn ProjectionSink>,
        config: SyncConfig,
    ) -> SyncResult<Self> {
        let stored = checkpoints.read().await?;
        let checkpoint = stored.max(config.start_block.saturating_sub(1));
        tracing::info!(
            stored,
            start_block = config.start_block,
            contract = %felt_to_hex(config.contract),
            "Resuming from block {}",
            checkpoint + 1
        );

        let fetcher = MarketDetailFetcher::new(chain.clone(), config.contract);
        Ok(Self {
            chain,
            checkpoints,
            classifier: EventClassifier::new(),
            writer: ProjectionWriter::new(sink, fetcher),
            config,
            checkpoint,
        })
    }

    pub fn checkpoint(&self) -> u64 {
        self.checkpoint
    }

    /// Poll until `shutdown` flips to true. An in-flight cycle always runs to
    /// completion before the loop exits.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Polling every {:?}", self.config.poll_interval);

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.cycle_logged().await;

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!(checkpoint = self.checkpoint, "Sync loop stopped");
    }

    /// Run exactly `cycles` polling cycles, sleeping between them.
    pub async fn run_for(&mut self, cycles: usize) {
        for i in 0..cycles {
            if i > 0 {
                tokio::time::sleep(self.config.poll_interval).await;
            }
            self.cycle_logged().await;
        }
    }

    async fn cycle_logged(&mut self) {
        match self.run_cycle().await {
            Ok(report) if report.blocks > 0 => {
                tracing::info!(
                    head = report.head,
                    blocks = report.blocks,
                    applied = report.applied,
                    duplicates = report.duplicates,
                    dropped = report.dropped,
                    "Synced to block {}",
                    self.checkpoint
                );
            }
            Ok(report) => {
                tracing::debug!(head = report.head, "No new blocks");
            }
            Err(e) => {
                metrics::counter!("stakcast_sync_cycle_errors_total", "kind" => e.kind()).increment(1);
                tracing::warn!(
                    checkpoint = self.checkpoint,
                    error = %e,
                    "Sync cycle aborted, retrying in {:?}",
                    self.config.poll_interval
                );
            }
        }
    }

    /// Process every block between the checkpoint and the chain head.
    ///
    /// A failure to read the head or to fetch a block aborts the cycle; blocks
    /// completed before the failure keep their advanced checkpoint.
    pub async fn run_cycle(&mut self) -> SyncResult<CycleReport> {
        let head = self.chain.latest_block_height().await?;
        let mut report = CycleReport { head, ..Default::default() };

        if head <= self.checkpoint {
            return Ok(report);
        }

        tracing::debug!("Chain head: {}, checkpoint: {}", head, self.checkpoint);

        for height in (self.checkpoint + 1)..=head {
            let summary = self.process_block(height).await?;

            self.checkpoints.write(height).await?;
            self.checkpoint = height;
            metrics::gauge!("stakcast_sync_checkpoint").set(height as f64);
            metrics::counter!("stakcast_sync_blocks_total").increment(1);

            report.blocks += 1;
            report.applied += summary.applied;
            report.duplicates += summary.duplicates;
            report.dropped += summary.dropped;
        }

        Ok(report)
    }

    async fn process_block(&self, height: u64) -> SyncResult<BlockSummary> {
        let timestamp = self.chain.block_timestamp(height).await?;
        let events = self
            .chain
            .events_in_range(self.config.contract, height, height)
            .await?;
        let block = BlockContext { number: height, timestamp };
        let mut summary = BlockSummary::default();

        for (index, event) in events.iter().enumerate() {
            let tx_hash = felt_to_hex(event.transaction_hash);
            let Some(kind) = self.classifier.classify(event) else {
                tracing::debug!(block = height, tx_hash = %tx_hash, "Ignoring unrecognized event");
                summary.ignored += 1;
                continue;
            };

            let decoded = DomainEvent::decode(kind, &event.payload());
            let market_id = decoded.as_ref().ok().map(DomainEvent::market_id);
            let result = match decoded {
                Ok(event) => {
                    let envelope = EventEnvelope {
                        kind,
                        tx_hash: tx_hash.clone(),
                        event_index: index as u32,
                        event,
                    };
                    self.writer.apply(&envelope, block).await
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(true) => {
                    metrics::counter!("stakcast_sync_events_applied_total", "kind" => kind.name()).increment(1);
                    tracing::debug!(block = height, tx_hash = %tx_hash, %kind, market_id = ?market_id, "Applied event");
                    summary.applied += 1;
                }
                Ok(false) => {
                    tracing::debug!(block = height, tx_hash = %tx_hash, %kind, market_id = ?market_id, "Event already applied");
                    summary.duplicates += 1;
                }
                Err(e) => {
                    metrics::counter!("stakcast_sync_events_dropped_total", "kind" => kind.name()).increment(1);
                    tracing::error!(
                        block = height,
                        tx_hash = %tx_hash,
                        %kind,
                        market_id = ?market_id,
                        error_kind = e.kind(),
                        error = %e,
                        "Dropping event"
                    );
                    summary.dropped += 1;
                }
            }
        }

        if !events.is_empty() {
            tracing::info!(
                block = height,
                events = events.len(),
                applied = summary.applied,
                dropped = summary.dropped,
                ignored = summary.ignored,
                "Processed block {}",
                height
            );
        }

        Ok(summary)
    }
}
