use std::collections::HashMap;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::indexer::rpc::{ChainRpc, RoundPolicy, RoundStats, fetch_in_rounds};
use crate::metrics::Metrics;
use crate::models::datasets::blocks::BlockInfo;
use crate::models::errors::{EnrichError, EnrichKind, RpcError};

#[derive(Debug, Default)]
pub struct BlockEnrichment {
    pub blocks: HashMap<u64, BlockInfo>,
    pub stats: RoundStats,
}

pub async fn enrich_blocks(
    rpc: &dyn ChainRpc,
    block_numbers: impl IntoIterator<Item = u64>,
    chunk_size: usize,
    policy: &RoundPolicy,
    cancel: &CancellationToken,
    metrics: Option<&Metrics>,
) -> Result<BlockEnrichment, EnrichError> {
    let (fetched, stats) = fetch_in_rounds(
        EnrichKind::Blocks,
        block_numbers,
        chunk_size,
        policy,
        cancel,
        metrics,
        |number| async move {
            let block = rpc.get_block(number).await?;
            BlockInfo::from_rpc(block).ok_or_else(|| {
                RpcError::InvalidResponse(format!(
                    "block {} has unrepresentable timestamp {}",
                    block.number, block.timestamp
                ))
            })
        },
    )
    .await?;

    let mut blocks = HashMap::with_capacity(fetched.len());
    for (number, info) in fetched {
        if info.block_number != number {
            warn!(
                "Node answered block {} when asked for {}",
                info.block_number, number
            );
        }
        // Keyed by the requested number so the join always finds it
        blocks.insert(number, info);
    }

    info!(
        "Fetched {} blocks in {} round(s), {} chunk(s)",
        blocks.len(),
        stats.rounds,
        stats.chunks
    );
    Ok(BlockEnrichment { blocks, stats })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::rpc::testing::{StubRpc, instant_policy};

    fn stub(numbers: impl IntoIterator<Item = u64>) -> StubRpc {
        StubRpc {
            timestamps: numbers
                .into_iter()
                .map(|number| (number, 1_697_500_800 + number * 12))
                .collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_flaky_blocks_are_recovered_and_deduplicated() {
        let mut rpc = stub(100..=120);
        rpc.flaky_blocks = [101, 105, 117].into_iter().collect();
        rpc.flaky_attempts = 2;
        let cancel = CancellationToken::new();

        // every block appears twice, as it would for two logs in the same block
        let requested = (100..=120).chain(100..=120);
        let enrichment = enrich_blocks(&rpc, requested, 5, &instant_policy(Some(10)), &cancel, None)
            .await
            .unwrap();

        assert_eq!(enrichment.blocks.len(), 21);
        assert_eq!(enrichment.blocks[&100].block_time, "2023-10-17 00:20:00");
        assert_eq!(enrichment.blocks[&100].block_date, "2023-10-17");
        assert_eq!(enrichment.stats.rounds, 3);

        // 21 distinct blocks in chunks of 5 is 5 chunks, then one chunk per retry pass
        assert_eq!(enrichment.stats.chunks, 7);
        assert!(enrichment.stats.chunks <= 5 + 21);
        assert_eq!(rpc.block_calls(100), 1);
        assert_eq!(rpc.block_calls(105), 3);
        assert_eq!(rpc.total_block_calls(), 21 + 3 + 3);
    }

    #[tokio::test]
    async fn test_unknown_block_exhausts_rounds() {
        let rpc = stub(1..=3);
        let cancel = CancellationToken::new();

        let result = enrich_blocks(&rpc, vec![1, 2, 3, 4], 2, &instant_policy(Some(2)), &cancel, None).await;

        match result {
            Err(EnrichError::RetriesExhausted {
                kind,
                remaining,
                sample,
                ..
            }) => {
                assert_eq!(kind, EnrichKind::Blocks);
                assert_eq!(remaining, 1);
                assert_eq!(sample, vec!["4".to_string()]);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(rpc.block_calls(4), 2);
    }
}
