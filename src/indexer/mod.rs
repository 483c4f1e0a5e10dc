pub mod ranges;
pub mod rpc;
pub mod transformations;

use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy_primitives::{Address, B256};
use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::indexer::ranges::split_range;
use crate::indexer::rpc::blocks::{BlockEnrichment, enrich_blocks};
use crate::indexer::rpc::logs::fetch_logs;
use crate::indexer::rpc::transactions::{TxEnrichment, enrich_transactions};
use crate::indexer::rpc::{ChainRpc, RoundPolicy};
use crate::indexer::transformations::join::join_rows;
use crate::metrics::Metrics;
use crate::models::common::{BlockRange, Config, ContractConfig, TableRef};
use crate::models::datasets::logs::LogRecord;
use crate::models::errors::{EnrichError, PipelineError, SinkError};
use crate::storage::local::persist_rows;
use crate::storage::{RemoteTable, UploadOptions, UploadReport, upload_file};
use crate::utils::retry::{RetryConfig, RetryError, retry};

// How many keys each stage echoes before fanning out
const PREVIEW_KEYS: usize = 10;

/// Everything the pipeline reads from config, resolved once.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_block_range: u64,
    pub block_chunk_size: usize,
    pub tx_chunk_size: usize,
    pub rounds: RoundPolicy,
    pub range_retry: RetryConfig,
    pub abort_on_range_failure: bool,
    pub namespace: String,
    pub output_dir: PathBuf,
    pub upload: UploadOptions,
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        let pipeline = &config.pipeline;
        Self {
            max_block_range: config.rpc.max_block_range,
            block_chunk_size: pipeline.block_chunk_size,
            tx_chunk_size: pipeline.tx_chunk_size,
            rounds: RoundPolicy {
                max_rounds: pipeline.max_retry_rounds,
                base_delay_ms: pipeline.retry_base_delay_ms,
                max_delay_ms: pipeline.retry_max_delay_ms,
                exponential: 2.0,
            },
            range_retry: RetryConfig {
                max_attempts: pipeline.range_max_attempts,
                base_delay_ms: pipeline.retry_base_delay_ms,
                max_delay_ms: pipeline.retry_max_delay_ms,
                exponential: 2.0,
            },
            abort_on_range_failure: pipeline.abort_on_range_failure,
            namespace: config.dune.namespace.clone(),
            output_dir: pipeline.output_dir.clone(),
            upload: UploadOptions {
                chunk_lines: config.dune.upload_chunk_lines,
                is_private: config.dune.is_private,
                resume_from_watermark: config.dune.resume_from_watermark,
            },
        }
    }
}

/// One contract to backfill into one table.
#[derive(Debug, Clone)]
pub struct ContractJob {
    pub address: Address,
    pub start_block: u64,
    /// `None` runs up to the chain head at the time of the run.
    pub end_block: Option<u64>,
    pub table: TableRef,
    pub output_path: PathBuf,
}

impl ContractJob {
    pub fn from_config(contract: &ContractConfig, settings: &PipelineSettings) -> Result<Self> {
        Ok(Self {
            address: contract.parsed_address()?,
            start_block: contract.deployed_block,
            end_block: contract.end_block,
            table: TableRef::new(
                contract
                    .namespace
                    .clone()
                    .unwrap_or_else(|| settings.namespace.clone()),
                contract.table_name.clone(),
            ),
            output_path: contract.output_path(&settings.output_dir),
        })
    }

    /// Where a run with failed ranges writes its rows, so `upload` never picks them up.
    pub fn partial_path(&self) -> PathBuf {
        self.output_path.with_extension("partial.csv")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Fetch, persist, then upload.
    Run,
    /// Fetch and persist only.
    Backfill,
    /// Upload a previously persisted file.
    Upload,
}

#[derive(Debug, Clone, Default)]
pub struct StageTimings {
    pub fetch_logs: Duration,
    pub enrich: Duration,
    pub persist: Duration,
    pub upload: Duration,
    pub total: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub start_block: u64,
    /// `None` when nothing was fetched in this run.
    pub end_block: Option<u64>,
    pub ranges: usize,
    pub failed_ranges: Vec<BlockRange>,
    pub logs: usize,
    pub blocks: usize,
    pub block_rounds: u32,
    pub transactions: usize,
    pub tx_rounds: u32,
    pub rows_written: u64,
    pub file_bytes: u64,
    pub upload: Option<UploadReport>,
    pub timings: StageTimings,
}

impl RunReport {
    pub fn log_summary(&self, table: &TableRef) {
        for line in self.summary_lines(table) {
            info!("{}", line);
        }
    }

    fn summary_lines(&self, table: &TableRef) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(end_block) = self.end_block {
            lines.push(format!(
                "{}: blocks {}..={} in {} range(s), {} failed",
                table,
                self.start_block,
                end_block,
                self.ranges,
                self.failed_ranges.len()
            ));
            lines.push(format!(
                "{}: {} logs, {} blocks ({} round(s)), {} transactions ({} round(s)), {} rows ({:.2} MB)",
                table,
                self.logs,
                self.blocks,
                self.block_rounds,
                self.transactions,
                self.tx_rounds,
                self.rows_written,
                self.file_bytes as f64 / (1024.0 * 1024.0)
            ));
        }
        if let Some(upload) = &self.upload {
            lines.push(format!(
                "{}: uploaded {} rows in {} chunk(s), {} chunk(s) failed, {} rows at or below watermark {:?}",
                table,
                upload.rows_uploaded,
                upload.chunks_sent,
                upload.chunks_failed,
                upload.rows_skipped,
                upload.watermark
            ));
        }
        let timings = &self.timings;
        lines.push(format!(
            "{}: logs {:.1}s, enrich {:.1}s, persist {:.1}s, upload {:.1}s, total {:.1}s",
            table,
            timings.fetch_logs.as_secs_f64(),
            timings.enrich.as_secs_f64(),
            timings.persist.as_secs_f64(),
            timings.upload.as_secs_f64(),
            timings.total.as_secs_f64()
        ));
        lines
    }
}

#[derive(Debug)]
pub struct ContractOutcome {
    pub address: Address,
    pub table: TableRef,
    pub result: Result<RunReport, PipelineError>,
}

impl ContractOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct Backfill {
    rpc: Arc<dyn ChainRpc>,
    remote: Arc<dyn RemoteTable>,
    settings: PipelineSettings,
    metrics: Option<Arc<Metrics>>,
    cancel: CancellationToken,
}

impl Backfill {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        remote: Arc<dyn RemoteTable>,
        settings: PipelineSettings,
        metrics: Option<Arc<Metrics>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            rpc,
            remote,
            settings,
            metrics,
            cancel,
        }
    }

    /// Runs `mode` for one contract. Failures are logged here and handed back in the
    /// outcome so a caller looping over contracts can carry on.
    pub async fn run_contract(&self, job: &ContractJob, mode: Mode) -> ContractOutcome {
        println!();
        info!("======================= {} ({:?}) =======================", job.table, mode);

        let result = match mode {
            Mode::Run => self.run(job).await,
            Mode::Backfill => self.backfill(job).await,
            Mode::Upload => self.upload_only(job).await,
        };

        match &result {
            Ok(report) => report.log_summary(&job.table),
            Err(e) => error!("Backfill of {:#x} into {} failed: {}", job.address, job.table, e),
        }

        ContractOutcome {
            address: job.address,
            table: job.table.clone(),
            result,
        }
    }

    pub async fn run(&self, job: &ContractJob) -> Result<RunReport, PipelineError> {
        let started = Instant::now();
        let mut report = self.backfill(job).await?;

        // Uploading past a gap would lift the remote watermark over it for good
        if !report.failed_ranges.is_empty() {
            error!(
                "Not uploading {}: {} has no logs for {} range(s); rerun once the node serves them",
                job.table,
                job.partial_path().display(),
                report.failed_ranges.len()
            );
            return Err(PipelineError::RangesFailed(report.failed_ranges));
        }

        let upload_started = Instant::now();
        report.upload = Some(self.upload(job).await?);
        report.timings.upload = upload_started.elapsed();
        report.timings.total = started.elapsed();
        self.record_stage("upload", report.timings.upload);
        Ok(report)
    }

    /// Fetches logs over `[start_block, end_block]`, enriches them and writes the CSV.
    pub async fn backfill(&self, job: &ContractJob) -> Result<RunReport, PipelineError> {
        let started = Instant::now();
        let metrics = self.metrics.as_deref();

        let end_block = match job.end_block {
            Some(end_block) => end_block,
            None => self.chain_head().await?,
        };
        info!("Current block number: {}", end_block);

        let ranges = split_range(job.start_block, end_block, self.settings.max_block_range);
        if ranges.is_empty() {
            warn!(
                "Start block {} is past end block {}, nothing to fetch",
                job.start_block, end_block
            );
        }
        let mut report = RunReport {
            start_block: job.start_block,
            end_block: Some(end_block),
            ranges: ranges.len(),
            ..Default::default()
        };

        info!("======================= FETCHING LOGS =======================");
        let stage = Instant::now();
        let fetched = fetch_logs(
            self.rpc.as_ref(),
            job.address,
            &ranges,
            &self.settings.range_retry,
            &self.cancel,
            metrics,
        )
        .await?;
        report.timings.fetch_logs = stage.elapsed();
        self.record_stage("fetch_logs", report.timings.fetch_logs);

        if !fetched.failed_ranges.is_empty() {
            if self.settings.abort_on_range_failure {
                return Err(PipelineError::RangesFailed(fetched.failed_ranges));
            }
            warn!(
                "Continuing without logs from {} range(s), writing {} instead: {}",
                fetched.failed_ranges.len(),
                job.partial_path().display(),
                preview(&fetched.failed_ranges)
            );
        }
        report.failed_ranges = fetched.failed_ranges;
        report.logs = fetched.logs.len();

        info!("===================== ENRICHING BLOCKS & TXS =====================");
        let stage = Instant::now();
        let (blocks, transactions) = self.enrich(&fetched.logs).await?;
        report.timings.enrich = stage.elapsed();
        self.record_stage("enrich", report.timings.enrich);
        report.blocks = blocks.blocks.len();
        report.block_rounds = blocks.stats.rounds;
        report.transactions = transactions.transactions.len();
        report.tx_rounds = transactions.stats.rounds;

        info!("======================= WRITING CSV =======================");
        let stage = Instant::now();
        let target = if report.failed_ranges.is_empty() {
            job.output_path.clone()
        } else {
            job.partial_path()
        };
        let rows = join_rows(&fetched.logs, &blocks.blocks, &transactions.transactions).collect();
        let persisted = persist_rows(target.clone(), rows).await?;
        report.timings.persist = stage.elapsed();
        self.record_stage("persist", report.timings.persist);
        report.rows_written = persisted.rows;
        report.file_bytes = persisted.bytes;
        info!(
            "CSV file has been written to {} ({:.2} MB)",
            target.display(),
            persisted.megabytes()
        );

        if let Some(metrics) = metrics {
            metrics.rows_written.add(persisted.rows, &[metrics.chain_label()]);
            metrics
                .latest_processed_block
                .record(end_block, &[metrics.chain_label()]);
        }

        report.timings.total = started.elapsed();
        Ok(report)
    }

    /// Sends the persisted CSV to the remote table, resuming after its watermark.
    pub async fn upload(&self, job: &ContractJob) -> Result<UploadReport, PipelineError> {
        info!("======================= UPLOADING {} =======================", job.table);
        if !job.output_path.exists() {
            return Err(PipelineError::Sink(SinkError::Io {
                path: job.output_path.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "nothing persisted yet, run a backfill first",
                ),
            }));
        }

        let report = upload_file(
            self.remote.as_ref(),
            &job.table,
            &job.output_path,
            &self.settings.upload,
            &self.cancel,
            self.metrics.as_deref(),
        )
        .await
        .map_err(|e| match e {
            SinkError::Cancelled => PipelineError::Cancelled,
            other => PipelineError::Sink(other),
        })?;
        Ok(report)
    }

    async fn upload_only(&self, job: &ContractJob) -> Result<RunReport, PipelineError> {
        let started = Instant::now();
        let upload = self.upload(job).await?;
        let elapsed = started.elapsed();
        self.record_stage("upload", elapsed);

        Ok(RunReport {
            start_block: job.start_block,
            upload: Some(upload),
            timings: StageTimings {
                upload: elapsed,
                total: elapsed,
                ..Default::default()
            },
            ..Default::default()
        })
    }

    async fn chain_head(&self) -> Result<u64, PipelineError> {
        let rpc = self.rpc.as_ref();
        retry(
            || rpc.current_block_number(),
            &self.settings.range_retry,
            "eth_blockNumber",
            &self.cancel,
        )
        .await
        .map_err(|e| match e {
            RetryError::Cancelled => PipelineError::Cancelled,
            RetryError::Exhausted { source, .. } => PipelineError::ChainHead(source),
        })
    }

    async fn enrich(
        &self,
        logs: &[LogRecord],
    ) -> Result<(BlockEnrichment, TxEnrichment), PipelineError> {
        let block_numbers: Vec<u64> = logs.iter().map(|log| log.block_number).collect();
        let tx_hashes: Vec<B256> = logs.iter().map(|log| log.transaction_hash).collect();
        debug!("Blocks to enrich start with: {}", preview(&block_numbers));
        debug!(
            "Transactions to enrich start with: {}",
            preview(&tx_hashes.iter().map(|hash| format!("{hash:#x}")).collect::<Vec<_>>())
        );

        let rpc = self.rpc.as_ref();
        let metrics = self.metrics.as_deref();
        let (blocks, transactions) = tokio::try_join!(
            enrich_blocks(
                rpc,
                block_numbers,
                self.settings.block_chunk_size,
                &self.settings.rounds,
                &self.cancel,
                metrics,
            ),
            enrich_transactions(
                rpc,
                tx_hashes,
                self.settings.tx_chunk_size,
                &self.settings.rounds,
                &self.cancel,
                metrics,
            ),
        )
        .map_err(|e| match e {
            EnrichError::Cancelled(_) => PipelineError::Cancelled,
            other => PipelineError::Enrich(other),
        })?;
        Ok((blocks, transactions))
    }

    fn record_stage(&self, stage: &'static str, elapsed: Duration) {
        if let Some(metrics) = &self.metrics {
            metrics.record_stage(stage, elapsed);
        }
    }
}

fn preview<T: Display>(items: &[T]) -> String {
    let mut shown: Vec<String> = items.iter().take(PREVIEW_KEYS).map(|item| item.to_string()).collect();
    if items.len() > PREVIEW_KEYS {
        shown.push(format!("... ({} more)", items.len() - PREVIEW_KEYS));
    }
    shown.join(", ")
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::indexer::rpc::testing::{StubRpc, instant_policy};
    use crate::models::datasets::transactions::RpcTransaction;
    use crate::storage::testing::MemoryTable;
    use alloy_primitives::Bytes;

    fn settings(output_dir: PathBuf) -> PipelineSettings {
        PipelineSettings {
            max_block_range: 99,
            block_chunk_size: 3,
            tx_chunk_size: 3,
            rounds: instant_policy(Some(5)),
            range_retry: RetryConfig {
                max_attempts: 2,
                base_delay_ms: 0,
                max_delay_ms: 0,
                exponential: 2.0,
            },
            abort_on_range_failure: false,
            namespace: "backfills".to_string(),
            output_dir,
            upload: UploadOptions {
                chunk_lines: 2,
                is_private: false,
                resume_from_watermark: true,
            },
        }
    }

    fn chain(blocks: &[u64]) -> StubRpc {
        let mut rpc = StubRpc {
            head: 250,
            ..Default::default()
        };
        for (i, block) in blocks.iter().enumerate() {
            let hash = B256::with_last_byte(i as u8 + 1);
            rpc.logs.push(LogRecord {
                block_hash: B256::with_last_byte(*block as u8),
                block_number: *block,
                contract_address: Address::ZERO,
                transaction_hash: hash,
                transaction_index: 0,
                log_index: i as u64,
                topics: vec![],
                data: Bytes::new(),
                removed: false,
            });
            rpc.timestamps.insert(*block, 1_700_000_000 + block * 12);
            rpc.transactions.insert(
                hash,
                RpcTransaction {
                    hash,
                    from: Some(Address::with_last_byte(0xaa)),
                    to: None,
                },
            );
        }
        rpc
    }

    fn job(dir: &tempfile::TempDir, end_block: Option<u64>) -> ContractJob {
        ContractJob {
            address: Address::ZERO,
            start_block: 100,
            end_block,
            table: TableRef::new("backfills", "dataset_logs"),
            output_path: dir.path().join("dataset_logs.csv"),
        }
    }

    fn backfill(rpc: StubRpc, remote: MemoryTable, settings: PipelineSettings) -> Backfill {
        Backfill::new(
            Arc::new(rpc),
            Arc::new(remote),
            settings,
            None,
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_run_fetches_enriches_writes_and_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = backfill(
            chain(&[120, 120, 180, 205, 250]),
            MemoryTable::default(),
            settings(dir.path().to_path_buf()),
        );

        let report = pipeline.run(&job(&dir, None)).await.unwrap();

        assert_eq!(report.end_block, Some(250));
        assert_eq!(report.ranges, 2);
        assert_eq!(report.logs, 5);
        assert_eq!(report.blocks, 4);
        assert_eq!(report.transactions, 5);
        assert_eq!(report.rows_written, 5);
        let upload = report.upload.unwrap();
        assert_eq!(upload.rows_uploaded, 5);
        assert_eq!(upload.chunks_sent, 3);
    }

    #[tokio::test]
    async fn test_pinned_end_block_skips_head_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = backfill(
            chain(&[120, 180, 205]),
            MemoryTable::default(),
            settings(dir.path().to_path_buf()),
        );

        let report = pipeline.backfill(&job(&dir, Some(199))).await.unwrap();

        assert_eq!(report.end_block, Some(199));
        assert_eq!(report.ranges, 1);
        assert_eq!(report.logs, 2);
        assert!(report.upload.is_none());
    }

    #[tokio::test]
    async fn test_failed_range_aborts_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let mut rpc = chain(&[120, 205]);
        rpc.failing_ranges = HashSet::from([BlockRange {
            from_block: 200,
            to_block: 250,
        }]);
        let mut strict = settings(dir.path().to_path_buf());
        strict.abort_on_range_failure = true;
        let pipeline = backfill(rpc, MemoryTable::default(), strict);

        let result = pipeline.backfill(&job(&dir, None)).await;
        assert!(matches!(result, Err(PipelineError::RangesFailed(ranges)) if ranges.len() == 1));
    }

    #[tokio::test]
    async fn test_failed_range_is_reported_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut rpc = chain(&[120, 205]);
        rpc.failing_ranges = HashSet::from([BlockRange {
            from_block: 200,
            to_block: 250,
        }]);
        let pipeline = backfill(rpc, MemoryTable::default(), settings(dir.path().to_path_buf()));

        let job = job(&dir, None);
        let report = pipeline.backfill(&job).await.unwrap();
        assert_eq!(report.logs, 1);
        assert_eq!(report.failed_ranges.len(), 1);
        assert!(job.partial_path().exists());
        assert!(!job.output_path.exists());
    }

    #[tokio::test]
    async fn test_failed_range_blocks_upload_until_rerun() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(&dir, None);
        let remote = Arc::new(MemoryTable::default());

        let mut broken = chain(&[120, 205]);
        broken.failing_ranges = HashSet::from([BlockRange {
            from_block: 100,
            to_block: 199,
        }]);
        let first = Backfill::new(
            Arc::new(broken),
            remote.clone(),
            settings(dir.path().to_path_buf()),
            None,
            CancellationToken::new(),
        );
        let outcome = first.run_contract(&job, Mode::Run).await;

        assert!(matches!(outcome.result, Err(PipelineError::RangesFailed(ref ranges)) if ranges.len() == 1));
        assert!(remote.inserts.lock().unwrap().is_empty());

        // Once the node serves the range again nothing has been hidden under a watermark
        let second = Backfill::new(
            Arc::new(chain(&[120, 205])),
            remote.clone(),
            settings(dir.path().to_path_buf()),
            None,
            CancellationToken::new(),
        );
        let report = second.run(&job).await.unwrap();

        assert_eq!(report.upload.unwrap().rows_uploaded, 2);
        assert_eq!(remote.uploaded_blocks(), vec![120, 205]);
    }

    #[tokio::test]
    async fn test_upload_only_summary_has_no_fetch_lines() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(&dir, None);
        let pipeline = backfill(
            chain(&[120, 205]),
            MemoryTable::default(),
            settings(dir.path().to_path_buf()),
        );
        pipeline.backfill(&job).await.unwrap();

        let report = pipeline.run_contract(&job, Mode::Upload).await.result.unwrap();

        assert_eq!(report.end_block, None);
        let lines = report.summary_lines(&job.table);
        assert!(lines.iter().all(|line| !line.contains("range(s)")));
        assert!(lines.iter().any(|line| line.contains("uploaded 2 rows")));
    }

    #[test]
    fn test_contract_namespace_overrides_default() {
        let settings = settings(PathBuf::from("/tmp/out"));
        let mut contract = ContractConfig {
            address: "47fbe95e981C0Df9737B6971B451fB15fdC989d9".to_string(),
            deployed_block: 100,
            end_block: None,
            namespace: None,
            table_name: "dataset_logs".to_string(),
        };
        assert_eq!(
            ContractJob::from_config(&contract, &settings).unwrap().table,
            TableRef::new("backfills", "dataset_logs")
        );

        contract.namespace = Some("other_team".to_string());
        let job = ContractJob::from_config(&contract, &settings).unwrap();
        assert_eq!(job.table, TableRef::new("other_team", "dataset_logs"));
        assert_eq!(job.partial_path(), PathBuf::from("/tmp/out/dataset_logs.partial.csv"));
    }

    #[tokio::test]
    async fn test_enrichment_failure_is_returned_in_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let mut rpc = chain(&[120]);
        rpc.timestamps.clear();
        let pipeline = backfill(rpc, MemoryTable::default(), settings(dir.path().to_path_buf()));

        let outcome = pipeline.run_contract(&job(&dir, None), Mode::Run).await;

        assert!(!outcome.is_success());
        assert!(matches!(
            outcome.result,
            Err(PipelineError::Enrich(EnrichError::RetriesExhausted { .. }))
        ));
    }

    #[tokio::test]
    async fn test_upload_without_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = backfill(chain(&[]), MemoryTable::default(), settings(dir.path().to_path_buf()));

        let outcome = pipeline.run_contract(&job(&dir, None), Mode::Upload).await;
        assert!(matches!(outcome.result, Err(PipelineError::Sink(SinkError::Io { .. }))));
    }

    #[tokio::test]
    async fn test_cancelled_run_stops() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let pipeline = Backfill::new(
            Arc::new(chain(&[120])),
            Arc::new(MemoryTable::default()),
            settings(dir.path().to_path_buf()),
            None,
            cancel,
        );

        let result = pipeline.run(&job(&dir, Some(150))).await;
        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }

    #[test]
    fn test_preview_truncates() {
        let keys: Vec<u64> = (1..=12).collect();
        assert_eq!(preview(&keys), "1, 2, 3, 4, 5, 6, 7, 8, 9, 10, ... (2 more)");
        assert_eq!(preview(&keys[..2]), "1, 2");
    }
}
