pub mod dune;
pub mod local;

use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::metrics::Metrics;
use crate::models::common::TableRef;
use crate::models::errors::{SinkError, TableError};
use crate::storage::dune::schema::{ColumnSpec, log_table_schema};
use crate::storage::local::{ChunkReader, on_blocking_pool};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExisted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateStatus {
    Created,
    AlreadyExisted,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertReceipt {
    pub rows_written: Option<u64>,
}

/// Append-only table the CSV chunks land in.
#[async_trait]
pub trait RemoteTable: Send + Sync {
    async fn create_table(
        &self,
        table: &TableRef,
        schema: &[ColumnSpec],
        is_private: bool,
    ) -> Result<CreateOutcome, TableError>;

    /// `body` is a complete CSV document including the header row.
    async fn insert_csv(&self, table: &TableRef, body: Vec<u8>) -> Result<InsertReceipt, TableError>;

    /// `None` when the table holds no rows.
    async fn max_block_number(
        &self,
        table: &TableRef,
        cancel: &CancellationToken,
    ) -> Result<Option<u64>, TableError>;
}

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub chunk_lines: usize,
    pub is_private: bool,
    pub resume_from_watermark: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub created: CreateStatus,
    /// Highest block already in the table; rows at or below it were not sent.
    pub watermark: Option<u64>,
    pub rows_skipped: u64,
    pub rows_uploaded: u64,
    pub chunks_sent: usize,
    pub chunks_failed: usize,
}

/// Creates the table if needed, reads its watermark, then inserts the file in chunks.
/// A rejected chunk is logged and counted; later chunks still go out.
pub async fn upload_file(
    remote: &dyn RemoteTable,
    table: &TableRef,
    path: &Path,
    options: &UploadOptions,
    cancel: &CancellationToken,
    metrics: Option<&Metrics>,
) -> Result<UploadReport, SinkError> {
    info!("Creating table {} ...", table);
    let created = match remote
        .create_table(table, &log_table_schema(), options.is_private)
        .await
    {
        Ok(CreateOutcome::Created) => {
            info!("Table created: {}", table);
            CreateStatus::Created
        }
        Ok(CreateOutcome::AlreadyExisted) => {
            info!("Table {} already exists", table);
            CreateStatus::AlreadyExisted
        }
        Err(e) => {
            error!("Error creating table {}: {}", table, e);
            CreateStatus::Failed
        }
    };

    let watermark = if options.resume_from_watermark {
        match remote.max_block_number(table, cancel).await {
            Ok(watermark) => watermark,
            Err(TableError::Cancelled) => return Err(SinkError::Cancelled),
            Err(e) => {
                warn!(
                    "Could not read max(block_number) from {}, uploading everything: {}",
                    table, e
                );
                None
            }
        }
    } else {
        None
    };
    match watermark {
        Some(block) => info!("{} already holds blocks up to {}", table, block),
        None => info!("{} holds no rows yet", table),
    }

    let open_path = path.to_path_buf();
    let chunk_lines = options.chunk_lines;
    let mut reader = on_blocking_pool(path, move || ChunkReader::open(&open_path, chunk_lines, watermark)).await??;
    let mut report = UploadReport {
        created,
        watermark,
        rows_skipped: 0,
        rows_uploaded: 0,
        chunks_sent: 0,
        chunks_failed: 0,
    };

    loop {
        if cancel.is_cancelled() {
            return Err(SinkError::Cancelled);
        }
        let (returned, next) = on_blocking_pool(path, move || {
            let next = reader.next_chunk();
            (reader, next)
        })
        .await?;
        reader = returned;
        let Some(chunk) = next? else {
            break;
        };

        info!(
            "Uploading chunk {} ({} rows, blocks {}-{}) to {}",
            report.chunks_sent + report.chunks_failed + 1,
            chunk.rows,
            chunk.first_block,
            chunk.last_block,
            table
        );
        let rows = chunk.rows as u64;
        match remote.insert_csv(table, chunk.body).await {
            Ok(receipt) => {
                let written = receipt.rows_written.unwrap_or(rows);
                report.chunks_sent += 1;
                report.rows_uploaded += written;
                if let Some(metrics) = metrics {
                    metrics.chunks_uploaded.add(1, &[metrics.chain_label()]);
                    metrics.rows_uploaded.add(written, &[metrics.chain_label()]);
                }
            }
            Err(e) => {
                report.chunks_failed += 1;
                error!(
                    "Error uploading blocks {}-{} to {}: {}",
                    chunk.first_block, chunk.last_block, table, e
                );
                if let Some(metrics) = metrics {
                    metrics.chunks_failed.add(1, &[metrics.chain_label()]);
                }
            }
        }
    }

    report.rows_skipped = reader.rows_skipped();
    info!(
        "Upload to {} finished: {} rows in {} chunk(s), {} failed, {} skipped below watermark",
        table, report.rows_uploaded, report.chunks_sent, report.chunks_failed, report.rows_skipped
    );
    Ok(report)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Keeps inserted CSV bodies in memory. `reject_chunks` lists 1-based insert calls to fail.
    #[derive(Default)]
    pub struct MemoryTable {
        pub existing: bool,
        pub fail_create: bool,
        pub watermark: Option<u64>,
        pub fail_watermark: bool,
        pub reject_chunks: Vec<usize>,
        pub inserts: Mutex<Vec<String>>,
        pub insert_calls: Mutex<usize>,
    }

    impl MemoryTable {
        pub fn uploaded_blocks(&self) -> Vec<u64> {
            self.inserts
                .lock()
                .unwrap()
                .iter()
                .flat_map(|body| {
                    body.lines()
                        .skip(1)
                        .map(|line| line.split(',').nth(1).unwrap().parse::<u64>().unwrap())
                        .collect::<Vec<_>>()
                })
                .collect()
        }
    }

    #[async_trait]
    impl RemoteTable for MemoryTable {
        async fn create_table(
            &self,
            _table: &TableRef,
            _schema: &[ColumnSpec],
            _is_private: bool,
        ) -> Result<CreateOutcome, TableError> {
            if self.fail_create {
                return Err(TableError::UnexpectedResponse {
                    endpoint: "create".to_string(),
                    message: "namespace not found".to_string(),
                });
            }
            Ok(if self.existing {
                CreateOutcome::AlreadyExisted
            } else {
                CreateOutcome::Created
            })
        }

        async fn insert_csv(&self, _table: &TableRef, body: Vec<u8>) -> Result<InsertReceipt, TableError> {
            let call = {
                let mut calls = self.insert_calls.lock().unwrap();
                *calls += 1;
                *calls
            };
            if self.reject_chunks.contains(&call) {
                return Err(TableError::UnexpectedResponse {
                    endpoint: "insert".to_string(),
                    message: "rejected".to_string(),
                });
            }
            let body = String::from_utf8(body).unwrap();
            let rows = body.lines().count() as u64 - 1;
            self.inserts.lock().unwrap().push(body);
            Ok(InsertReceipt {
                rows_written: Some(rows),
            })
        }

        async fn max_block_number(
            &self,
            _table: &TableRef,
            _cancel: &CancellationToken,
        ) -> Result<Option<u64>, TableError> {
            if self.fail_watermark {
                return Err(TableError::QueryTimeout {
                    execution_id: "01HV".to_string(),
                    timeout_secs: 1,
                });
            }
            Ok(self.watermark)
        }
    }
}
