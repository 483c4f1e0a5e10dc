use alloy_primitives::{Address, B256, Bytes};
use serde::{Deserialize, Serialize};

////////////////////////////////////// RPC Data ////////////////////////////////////////
///////////////////////////////////// eth_getLogs //////////////////////////////////////
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub block_hash: B256,
    pub block_number: u64,
    pub contract_address: Address,
    pub transaction_hash: B256,
    pub transaction_index: u64,
    pub log_index: u64,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub removed: bool,
}

/////////////////////////////////// Transformed Data ///////////////////////////////////
// Column order is the on-disk CSV order and the remote table schema order
pub const CSV_HEADER: [&str; 15] = [
    "block_hash",
    "block_number",
    "block_time",
    "block_date",
    "contract_address",
    "tx_hash",
    "tx_from",
    "tx_to",
    "tx_index",
    "log_index",
    "topic0",
    "topic1",
    "topic2",
    "topic3",
    "data",
];

pub const BLOCK_NUMBER_COLUMN: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRow {
    pub block_hash: String,
    pub block_number: u64,
    pub block_time: String,
    pub block_date: String,
    pub contract_address: String,
    pub tx_hash: String,
    pub tx_from: String,
    pub tx_to: String,
    pub tx_index: u64,
    pub log_index: u64,
    pub topic0: String,
    pub topic1: String,
    pub topic2: String,
    pub topic3: String,
    pub data: String,
}
