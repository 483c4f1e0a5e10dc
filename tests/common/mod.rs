#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use alloy_primitives::{Address, B256, Bytes, address};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use contract_log_backfill::indexer::rpc::ChainRpc;
use contract_log_backfill::models::common::{BlockRange, TableRef};
use contract_log_backfill::models::datasets::blocks::RpcBlock;
use contract_log_backfill::models::datasets::logs::LogRecord;
use contract_log_backfill::models::datasets::transactions::RpcTransaction;
use contract_log_backfill::models::errors::{RpcError, TableError};
use contract_log_backfill::storage::dune::schema::ColumnSpec;
use contract_log_backfill::storage::{CreateOutcome, InsertReceipt, RemoteTable};

pub const CONTRACT: Address = address!("0x47fbe95e981C0Df9737B6971B451fB15fdC989d9");
pub const SENDER: Address = address!("0x33128a8fC17869897dcE68Ed026d694621f6FDfD");
pub const GENESIS_TIME: u64 = 1_697_500_800; // 2023-10-17 00:00:00 UTC
pub const BLOCK_TIME: u64 = 12;

pub fn tx_hash(block_number: u64, log_index: u64) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[16..24].copy_from_slice(&block_number.to_be_bytes());
    bytes[24..].copy_from_slice(&log_index.to_be_bytes());
    B256::from(bytes)
}

/// In-memory chain holding one contract's logs. Blocks listed in `flaky_blocks`
/// fail their first `flaky_attempts` lookups.
#[derive(Default)]
pub struct ScriptedChain {
    pub head: u64,
    pub logs: Vec<LogRecord>,
    pub transactions: HashMap<B256, RpcTransaction>,
    pub flaky_blocks: HashSet<u64>,
    pub flaky_attempts: usize,
    pub log_ranges: Mutex<Vec<BlockRange>>,
    pub block_attempts: Mutex<HashMap<u64, usize>>,
    pub tx_requests: AtomicUsize,
}

impl ScriptedChain {
    pub fn new(head: u64) -> Self {
        Self {
            head,
            ..Default::default()
        }
    }

    /// Adds one log at `block_number`. Every third transaction creates a contract.
    pub fn emit(&mut self, block_number: u64, log_index: u64) -> &mut Self {
        let hash = tx_hash(block_number, log_index);
        self.logs.push(LogRecord {
            block_hash: B256::left_padding_from(&block_number.to_be_bytes()),
            block_number,
            contract_address: CONTRACT,
            transaction_hash: hash,
            transaction_index: log_index,
            log_index,
            topics: vec![B256::repeat_byte(0xdd), B256::left_padding_from(SENDER.as_slice())],
            data: Bytes::from(vec![0u8, 1, 2, 3]),
            removed: false,
        });
        self.transactions.insert(
            hash,
            RpcTransaction {
                hash,
                from: Some(SENDER),
                to: (self.transactions.len() % 3 != 2).then_some(CONTRACT),
            },
        );
        self
    }

    pub fn requested_ranges(&self) -> Vec<BlockRange> {
        let mut ranges = self.log_ranges.lock().unwrap().clone();
        ranges.sort_by_key(|range| range.from_block);
        ranges
    }

    pub fn block_attempts(&self, number: u64) -> usize {
        self.block_attempts.lock().unwrap().get(&number).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ChainRpc for ScriptedChain {
    async fn current_block_number(&self) -> Result<u64, RpcError> {
        Ok(self.head)
    }

    async fn get_logs(&self, address: Address, range: BlockRange) -> Result<Vec<LogRecord>, RpcError> {
        self.log_ranges.lock().unwrap().push(range);
        if range.span() > 100 {
            return Err(RpcError::Transport("query exceeds max block range 100".to_string()));
        }
        Ok(self
            .logs
            .iter()
            .filter(|log| log.contract_address == address)
            .filter(|log| (range.from_block..=range.to_block).contains(&log.block_number))
            .cloned()
            .collect())
    }

    async fn get_block(&self, number: u64) -> Result<RpcBlock, RpcError> {
        let attempt = {
            let mut attempts = self.block_attempts.lock().unwrap();
            let attempt = attempts.entry(number).or_default();
            *attempt += 1;
            *attempt
        };
        if self.flaky_blocks.contains(&number) && attempt <= self.flaky_attempts {
            return Err(RpcError::Transport("429 Too Many Requests".to_string()));
        }
        if number > self.head {
            return Err(RpcError::NotFound {
                kind: "block",
                key: number.to_string(),
            });
        }
        Ok(RpcBlock {
            number,
            timestamp: GENESIS_TIME + number * BLOCK_TIME,
        })
    }

    async fn get_transaction(&self, hash: B256) -> Result<RpcTransaction, RpcError> {
        self.tx_requests.fetch_add(1, Ordering::SeqCst);
        self.transactions
            .get(&hash)
            .cloned()
            .ok_or_else(|| RpcError::NotFound {
                kind: "transaction",
                key: format!("{hash:#x}"),
            })
    }
}

/// Remote table that keeps every inserted CSV body.
#[derive(Default)]
pub struct RecordingTable {
    pub watermark: Option<u64>,
    pub created: Mutex<Vec<String>>,
    pub bodies: Mutex<Vec<String>>,
}

impl RecordingTable {
    pub fn uploaded_rows(&self) -> Vec<Vec<String>> {
        let bodies = self.bodies.lock().unwrap();
        let mut rows = Vec::new();
        for body in bodies.iter() {
            let mut reader = csv::Reader::from_reader(body.as_bytes());
            for record in reader.records() {
                rows.push(record.unwrap().iter().map(str::to_string).collect());
            }
        }
        rows
    }
}

#[async_trait]
impl RemoteTable for RecordingTable {
    async fn create_table(
        &self,
        table: &TableRef,
        schema: &[ColumnSpec],
        _is_private: bool,
    ) -> Result<CreateOutcome, TableError> {
        assert_eq!(schema.len(), 15);
        let mut created = self.created.lock().unwrap();
        let name = table.to_string();
        if created.contains(&name) {
            return Ok(CreateOutcome::AlreadyExisted);
        }
        created.push(name);
        Ok(CreateOutcome::Created)
    }

    async fn insert_csv(&self, _table: &TableRef, body: Vec<u8>) -> Result<InsertReceipt, TableError> {
        let body = String::from_utf8(body).unwrap();
        let rows = body.lines().count().saturating_sub(1) as u64;
        self.bodies.lock().unwrap().push(body);
        Ok(InsertReceipt {
            rows_written: Some(rows),
        })
    }

    async fn max_block_number(
        &self,
        _table: &TableRef,
        _cancel: &CancellationToken,
    ) -> Result<Option<u64>, TableError> {
        Ok(self.watermark)
    }
}
