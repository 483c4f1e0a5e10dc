use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Writer, WriterBuilder};
use tracing::{debug, info};

use crate::models::datasets::logs::{BLOCK_NUMBER_COLUMN, CSV_HEADER, OutputRow};
use crate::models::errors::SinkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistReport {
    pub rows: u64,
    pub bytes: u64,
}

impl PersistReport {
    pub fn megabytes(&self) -> f64 {
        self.bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Streams rows to `path` behind the fixed header, replacing any previous file.
pub fn write_rows<I>(path: &Path, rows: I) -> Result<PersistReport, SinkError>
where
    I: IntoIterator<Item = OutputRow>,
{
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| io_error(path, source))?;
    }

    let file = File::create(path).map_err(|source| io_error(path, source))?;
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(BufWriter::new(file));

    writer
        .write_record(CSV_HEADER)
        .map_err(|source| csv_error(path, source))?;

    let mut written = 0u64;
    for row in rows {
        writer
            .serialize(&row)
            .map_err(|source| csv_error(path, source))?;
        written += 1;
    }
    writer.flush().map_err(|source| io_error(path, source))?;
    drop(writer);

    let bytes = fs::metadata(path)
        .map_err(|source| io_error(path, source))?
        .len();

    let report = PersistReport {
        rows: written,
        bytes,
    };
    info!(
        "Wrote {} rows to {} ({:.2} MB)",
        report.rows,
        path.display(),
        report.megabytes()
    );
    Ok(report)
}

/// `write_rows` on the blocking pool.
pub async fn persist_rows(path: PathBuf, rows: Vec<OutputRow>) -> Result<PersistReport, SinkError> {
    let target = path.clone();
    on_blocking_pool(&path, move || write_rows(&target, rows)).await?
}

/// Runs file work off the async workers.
pub(crate) async fn on_blocking_pool<T, F>(path: &Path, work: F) -> Result<T, SinkError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|source| SinkError::Task {
            path: path.to_path_buf(),
            source,
        })
}

/// One insert's worth of CSV: header plus up to `chunk_lines` data records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub body: Vec<u8>,
    pub rows: usize,
    pub first_block: u64,
    pub last_block: u64,
}

/// Re-reads a persisted file and hands it out in header-prefixed chunks, dropping
/// every record at or below the watermark.
pub struct ChunkReader {
    path: PathBuf,
    reader: csv::Reader<BufReader<File>>,
    header: StringRecord,
    chunk_lines: usize,
    watermark: Option<u64>,
    rows_read: u64,
    rows_skipped: u64,
}

impl ChunkReader {
    pub fn open(path: &Path, chunk_lines: usize, watermark: Option<u64>) -> Result<Self, SinkError> {
        let file = File::open(path).map_err(|source| io_error(path, source))?;
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .from_reader(BufReader::new(file));

        let mut header = StringRecord::new();
        let has_header = reader
            .read_record(&mut header)
            .map_err(|source| csv_error(path, source))?;
        if !has_header || header.iter().ne(CSV_HEADER.iter().copied()) {
            return Err(SinkError::UnexpectedHeader {
                path: path.to_path_buf(),
                found: header.iter().collect::<Vec<_>>().join(","),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            header,
            chunk_lines: chunk_lines.max(1),
            watermark,
            rows_read: 0,
            rows_skipped: 0,
        })
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    pub fn rows_skipped(&self) -> u64 {
        self.rows_skipped
    }

    /// `None` once the file is exhausted; a trailing chunk is never empty.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>, SinkError> {
        let mut writer: Option<Writer<Vec<u8>>> = None;
        let mut rows = 0;
        let mut first_block = 0;
        let mut last_block = 0;
        let mut record = StringRecord::new();

        while rows < self.chunk_lines {
            let more = self
                .reader
                .read_record(&mut record)
                .map_err(|source| csv_error(&self.path, source))?;
            if !more {
                break;
            }
            self.rows_read += 1;

            let block_number = self.block_number(&record)?;
            if self.watermark.is_some_and(|watermark| block_number <= watermark) {
                self.rows_skipped += 1;
                continue;
            }

            if writer.is_none() {
                writer = Some(self.chunk_writer()?);
                first_block = block_number;
            }
            if let Some(writer) = writer.as_mut() {
                writer
                    .write_record(&record)
                    .map_err(|source| csv_error(&self.path, source))?;
            }
            last_block = block_number;
            rows += 1;
        }

        let Some(writer) = writer else {
            return Ok(None);
        };
        let body = writer
            .into_inner()
            .map_err(|e| io_error(&self.path, e.into_error()))?;

        debug!(
            "Chunk of {} rows covering blocks {}-{} ({} bytes)",
            rows,
            first_block,
            last_block,
            body.len()
        );
        Ok(Some(Chunk {
            body,
            rows,
            first_block,
            last_block,
        }))
    }

    fn chunk_writer(&self) -> Result<Writer<Vec<u8>>, SinkError> {
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(Vec::new());
        writer
            .write_record(&self.header)
            .map_err(|source| csv_error(&self.path, source))?;
        Ok(writer)
    }

    fn block_number(&self, record: &StringRecord) -> Result<u64, SinkError> {
        let line = record
            .position()
            .map(|position| position.line())
            .unwrap_or_default();
        let field = record
            .get(BLOCK_NUMBER_COLUMN)
            .ok_or_else(|| SinkError::MalformedRecord {
                path: self.path.clone(),
                line,
                reason: format!("expected {} fields, found {}", CSV_HEADER.len(), record.len()),
            })?;
        field.parse().map_err(|_| SinkError::MalformedRecord {
            path: self.path.clone(),
            line,
            reason: format!("block_number '{field}' is not an integer"),
        })
    }
}

fn io_error(path: &Path, source: std::io::Error) -> SinkError {
    SinkError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn csv_error(path: &Path, source: csv::Error) -> SinkError {
    SinkError::Csv {
        path: path.to_path_buf(),
        source,
    }
}
