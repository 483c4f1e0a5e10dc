use alloy_primitives::Address;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::indexer::rpc::ChainRpc;
use crate::metrics::Metrics;
use crate::models::common::BlockRange;
use crate::models::datasets::logs::LogRecord;
use crate::models::errors::PipelineError;
use crate::utils::retry::{RetryConfig, RetryError, retry};

#[derive(Debug, Default)]
pub struct FetchedLogs {
    /// Ordered by `(block_number, log_index)`.
    pub logs: Vec<LogRecord>,
    pub failed_ranges: Vec<BlockRange>,
    /// Logs the node flagged as removed by a reorg; they are not kept.
    pub removed: usize,
}

/// Issues one `eth_getLogs` per range, all at once. A range that keeps failing after
/// `retry_config.max_attempts` is reported in `failed_ranges` and its logs are left out.
pub async fn fetch_logs(
    rpc: &dyn ChainRpc,
    address: Address,
    ranges: &[BlockRange],
    retry_config: &RetryConfig,
    cancel: &CancellationToken,
    metrics: Option<&Metrics>,
) -> Result<FetchedLogs, PipelineError> {
    info!(
        "Fetching logs for {:#x} over {} block range(s)",
        address,
        ranges.len()
    );

    let requests = ranges.iter().map(|range| async move {
        let context = format!("eth_getLogs {range}");
        let result = retry(
            || rpc.get_logs(address, *range),
            retry_config,
            &context,
            cancel,
        )
        .await;
        (*range, result)
    });

    let mut fetched = FetchedLogs::default();
    for (range, result) in join_all(requests).await {
        match result {
            Ok(logs) => {
                for log in logs {
                    if log.removed {
                        warn!(
                            "Skipping removed log {} in block {} (tx {:#x})",
                            log.log_index, log.block_number, log.transaction_hash
                        );
                        fetched.removed += 1;
                    } else {
                        fetched.logs.push(log);
                    }
                }
            }
            Err(RetryError::Cancelled) => return Err(PipelineError::Cancelled),
            Err(RetryError::Exhausted { attempts, source }) => {
                error!(
                    "Dropping logs for blocks {} after {} attempts: {}",
                    range, attempts, source
                );
                fetched.failed_ranges.push(range);
            }
        }
    }

    fetched
        .logs
        .sort_by_key(|log| (log.block_number, log.log_index));
    fetched.failed_ranges.sort_by_key(|range| range.from_block);

    if let Some(metrics) = metrics {
        metrics
            .logs_fetched
            .add(fetched.logs.len() as u64, &[metrics.chain_label()]);
        metrics
            .failed_ranges
            .add(fetched.failed_ranges.len() as u64, &[metrics.chain_label()]);
    }

    info!(
        "Fetched {} logs ({} range(s) failed)",
        fetched.logs.len(),
        fetched.failed_ranges.len()
    );
    Ok(fetched)
}
