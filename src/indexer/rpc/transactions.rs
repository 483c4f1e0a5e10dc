use std::collections::HashMap;

use alloy_primitives::B256;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::indexer::rpc::{ChainRpc, RoundPolicy, RoundStats, fetch_in_rounds};
use crate::metrics::Metrics;
use crate::models::datasets::transactions::TxInfo;
use crate::models::errors::{EnrichError, EnrichKind};

#[derive(Debug, Default)]
pub struct TxEnrichment {
    pub transactions: HashMap<B256, TxInfo>,
    pub stats: RoundStats,
}

/// Looks up sender and recipient for each distinct hash. A transaction the node does
/// not know yet is a per-item failure and goes around again.
pub async fn enrich_transactions(
    rpc: &dyn ChainRpc,
    hashes: impl IntoIterator<Item = B256>,
    chunk_size: usize,
    policy: &RoundPolicy,
    cancel: &CancellationToken,
    metrics: Option<&Metrics>,
) -> Result<TxEnrichment, EnrichError> {
    let (fetched, stats) = fetch_in_rounds(
        EnrichKind::Transactions,
        hashes,
        chunk_size,
        policy,
        cancel,
        metrics,
        |hash| async move { rpc.get_transaction(hash).await.map(TxInfo::from) },
    )
    .await?;

    let mut transactions = HashMap::with_capacity(fetched.len());
    for (hash, info) in fetched {
        if info.transaction_hash != hash {
            warn!(
                "Node answered transaction {:#x} when asked for {:#x}",
                info.transaction_hash, hash
            );
        }
        transactions.insert(hash, info);
    }

    info!(
        "Fetched {} transactions in {} round(s), {} chunk(s)",
        transactions.len(),
        stats.rounds,
        stats.chunks
    );
    Ok(TxEnrichment {
        transactions,
        stats,
    })
}
