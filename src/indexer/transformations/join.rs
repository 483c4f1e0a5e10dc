use std::collections::HashMap;

use alloy_primitives::B256;

use crate::models::datasets::blocks::BlockInfo;
use crate::models::datasets::logs::{LogRecord, OutputRow};
use crate::models::datasets::transactions::TxInfo;

/// Left join anchored on the logs: one row per log, enrichment gaps become empty strings.
pub fn join_rows<'a>(
    logs: &'a [LogRecord],
    blocks: &'a HashMap<u64, BlockInfo>,
    transactions: &'a HashMap<B256, TxInfo>,
) -> impl Iterator<Item = OutputRow> + 'a {
    logs.iter().map(move |log| {
        let block = blocks.get(&log.block_number);
        let tx = transactions.get(&log.transaction_hash);
        let topic = |i: usize| {
            log.topics
                .get(i)
                .map(|topic| format!("{topic:#x}"))
                .unwrap_or_default()
        };

        OutputRow {
            block_hash: format!("{:#x}", log.block_hash),
            block_number: log.block_number,
            block_time: block.map(|b| b.block_time.clone()).unwrap_or_default(),
            block_date: block.map(|b| b.block_date.clone()).unwrap_or_default(),
            contract_address: format!("{:#x}", log.contract_address),
            tx_hash: format!("{:#x}", log.transaction_hash),
            tx_from: tx.map(|t| t.from.clone()).unwrap_or_default(),
            tx_to: tx.map(|t| t.to.clone()).unwrap_or_default(),
            tx_index: log.transaction_index,
            log_index: log.log_index,
            topic0: topic(0),
            topic1: topic(1),
            topic2: topic(2),
            topic3: topic(3),
            data: log.data.to_string(),
        }
    })
}
