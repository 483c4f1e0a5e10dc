pub mod blocks;
pub mod logs;
pub mod transactions;

use std::collections::HashSet;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

use alloy_consensus::Transaction as _;
use alloy_eips::BlockNumberOrTag;
use alloy_network::{Ethereum, TransactionResponse};
use alloy_primitives::{Address, B256};
use alloy_provider::Provider;
use alloy_rpc_types_eth::{Filter, Log};
use async_trait::async_trait;
use futures::future::join_all;
use opentelemetry::KeyValue;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::Metrics;
use crate::models::common::BlockRange;
use crate::models::datasets::blocks::RpcBlock;
use crate::models::datasets::logs::LogRecord;
use crate::models::datasets::transactions::RpcTransaction;
use crate::models::errors::{EnrichError, EnrichKind, RpcError};
use crate::utils::retry::{Backoff, sleep_or_cancel};

/// The four node calls the backfill needs. Implementations validate response shape
/// so nothing downstream sees a half-populated record.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn current_block_number(&self) -> Result<u64, RpcError>;

    /// Fails when the provider rejects the span; it never truncates silently.
    async fn get_logs(&self, address: Address, range: BlockRange) -> Result<Vec<LogRecord>, RpcError>;

    async fn get_block(&self, number: u64) -> Result<RpcBlock, RpcError>;

    async fn get_transaction(&self, hash: B256) -> Result<RpcTransaction, RpcError>;
}

pub struct AlloyRpc<P> {
    provider: P,
    metrics: Option<Arc<Metrics>>,
}

impl<P> AlloyRpc<P>
where
    P: Provider<Ethereum>,
{
    pub fn new(provider: P, metrics: Option<Arc<Metrics>>) -> Self {
        Self { provider, metrics }
    }

    fn record<T, E>(&self, method: &'static str, start: Instant, result: &Result<T, E>) {
        if let Some(metrics) = &self.metrics {
            metrics.record_rpc(method, start.elapsed(), result.is_err());
        }
    }
}

#[async_trait]
impl<P> ChainRpc for AlloyRpc<P>
where
    P: Provider<Ethereum>,
{
    async fn current_block_number(&self) -> Result<u64, RpcError> {
        let start = Instant::now();
        let result = self.provider.get_block_number().await;
        self.record("eth_blockNumber", start, &result);

        result.map_err(|e| RpcError::Transport(e.to_string()))
    }

    async fn get_logs(&self, address: Address, range: BlockRange) -> Result<Vec<LogRecord>, RpcError> {
        let filter = Filter::new()
            .address(address)
            .from_block(range.from_block)
            .to_block(range.to_block);

        let start = Instant::now();
        let result = self.provider.get_logs(&filter).await;
        self.record("eth_getLogs", start, &result);

        let logs = result.map_err(|e| RpcError::Transport(e.to_string()))?;
        logs.into_iter().map(log_record).collect()
    }

    async fn get_block(&self, number: u64) -> Result<RpcBlock, RpcError> {
        let start = Instant::now();
        let result = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(number))
            .await;
        self.record("eth_getBlockByNumber", start, &result);

        let block = result
            .map_err(|e| RpcError::Transport(e.to_string()))?
            .ok_or_else(|| RpcError::NotFound {
                kind: "block",
                key: number.to_string(),
            })?;

        Ok(RpcBlock {
            number: block.header.inner.number,
            timestamp: block.header.inner.timestamp,
        })
    }

    async fn get_transaction(&self, hash: B256) -> Result<RpcTransaction, RpcError> {
        let start = Instant::now();
        let result = self.provider.get_transaction_by_hash(hash).await;
        self.record("eth_getTransactionByHash", start, &result);

        let tx = result
            .map_err(|e| RpcError::Transport(e.to_string()))?
            .ok_or_else(|| RpcError::NotFound {
                kind: "transaction",
                key: format!("{hash:#x}"),
            })?;

        Ok(RpcTransaction {
            hash: tx.tx_hash(),
            from: Some(TransactionResponse::from(&tx)),
            to: tx.to(),
        })
    }
}

/// Pending logs carry no block or transaction coordinates; a backfill over mined
/// blocks must never see one, so they are rejected here.
fn log_record(log: Log) -> Result<LogRecord, RpcError> {
    Ok(LogRecord {
        block_hash: log
            .block_hash
            .ok_or(RpcError::MissingLogField { field: "blockHash" })?,
        block_number: log
            .block_number
            .ok_or(RpcError::MissingLogField { field: "blockNumber" })?,
        contract_address: log.inner.address,
        transaction_hash: log
            .transaction_hash
            .ok_or(RpcError::MissingLogField { field: "transactionHash" })?,
        transaction_index: log
            .transaction_index
            .ok_or(RpcError::MissingLogField { field: "transactionIndex" })?,
        log_index: log
            .log_index
            .ok_or(RpcError::MissingLogField { field: "logIndex" })?,
        topics: log.inner.data.topics().to_vec(),
        data: log.inner.data.data.clone(),
        removed: log.removed,
    })
}

/// How many passes the enrichers make over their failure set, and how long they
/// wait in between.
#[derive(Debug, Clone)]
pub struct RoundPolicy {
    /// Total passes including the first. `None` keeps going until every key succeeds.
    pub max_rounds: Option<u32>,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential: f64,
}

impl Default for RoundPolicy {
    fn default() -> Self {
        Self {
            max_rounds: Some(32),
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            exponential: 2.0,
        }
    }
}

impl RoundPolicy {
    fn backoff(&self) -> Backoff {
        Backoff::new(self.base_delay_ms, self.max_delay_ms, self.exponential)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundStats {
    pub rounds: u32,
    pub chunks: usize,
    pub requests: usize,
    pub failures: usize,
}

// Number of failing keys echoed back in RetriesExhausted
const FAILURE_SAMPLE: usize = 10;

/// Fetches every distinct key, in sequential chunks of `chunk_size` concurrent requests,
/// repeating the chunked pass over whichever keys failed until none remain or the
/// policy gives up. Successful values come back in completion order.
pub async fn fetch_in_rounds<K, V, F, Fut>(
    kind: EnrichKind,
    keys: impl IntoIterator<Item = K>,
    chunk_size: usize,
    policy: &RoundPolicy,
    cancel: &CancellationToken,
    metrics: Option<&Metrics>,
    fetch: F,
) -> Result<(Vec<(K, V)>, RoundStats), EnrichError>
where
    K: Clone + Eq + Hash + Display,
    F: Fn(K) -> Fut,
    Fut: Future<Output = Result<V, RpcError>>,
{
    let chunk_size = chunk_size.max(1);
    let mut seen = HashSet::new();
    let mut pending: Vec<K> = keys
        .into_iter()
        .filter(|key| seen.insert(key.clone()))
        .collect();

    let total = pending.len();
    let mut fetched = Vec::with_capacity(total);
    let mut stats = RoundStats::default();
    let mut backoff = policy.backoff();

    while !pending.is_empty() {
        stats.rounds += 1;
        if stats.rounds > 1 {
            info!(
                "Retrying {}, {} left (round {})",
                kind,
                pending.len(),
                stats.rounds
            );
            if let Some(metrics) = metrics {
                metrics.retry_rounds.add(
                    1,
                    &[metrics.chain_label(), KeyValue::new("kind", kind.to_string())],
                );
            }
        } else {
            info!("Trying {} {}", total, kind);
        }

        let mut failed = Vec::new();
        for chunk in pending.chunks(chunk_size) {
            let requests = join_all(chunk.iter().cloned().map(|key| {
                let fut = fetch(key.clone());
                async move { (key, fut.await) }
            }));

            let results = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(EnrichError::Cancelled(kind)),
                results = requests => results,
            };

            stats.chunks += 1;
            stats.requests += chunk.len();
            for (key, result) in results {
                match result {
                    Ok(value) => fetched.push((key, value)),
                    Err(e) => {
                        warn!("Failed to fetch {} {}: {}", kind, key, e);
                        failed.push(key);
                    }
                }
            }
            if let (Some(first), Some(last)) = (chunk.first(), chunk.last()) {
                debug!(
                    "{} chunk {} to {} done, {} fetched so far",
                    kind,
                    first,
                    last,
                    fetched.len()
                );
            }
        }

        stats.failures += failed.len();
        pending = failed;
        if pending.is_empty() {
            break;
        }

        if policy.max_rounds.is_some_and(|max| stats.rounds >= max) {
            return Err(EnrichError::RetriesExhausted {
                kind,
                rounds: stats.rounds,
                remaining: pending.len(),
                sample: pending
                    .iter()
                    .take(FAILURE_SAMPLE)
                    .map(|key| key.to_string())
                    .collect(),
            });
        }

        if !sleep_or_cancel(backoff.next_delay(), cancel).await {
            return Err(EnrichError::Cancelled(kind));
        }
    }

    Ok((fetched, stats))
}
