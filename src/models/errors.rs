use std::fmt;
use std::path::PathBuf;

use http::StatusCode;
use thiserror::Error;

use crate::models::common::BlockRange;

#[derive(Error, Debug, Clone)]
pub enum RpcError {
    #[error("RPC transport error: {0}")]
    Transport(String),
    #[error("Invalid RPC response: {0}")]
    InvalidResponse(String),
    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: String },
    #[error("Missing required field in log: {field}")]
    MissingLogField { field: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichKind {
    Blocks,
    Transactions,
}

impl fmt::Display for EnrichKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnrichKind::Blocks => write!(f, "blocks"),
            EnrichKind::Transactions => write!(f, "transactions"),
        }
    }
}

#[derive(Error, Debug)]
pub enum EnrichError {
    #[error("Gave up on {remaining} {kind} after {rounds} rounds (first failing: {sample:?})")]
    RetriesExhausted {
        kind: EnrichKind,
        rounds: u32,
        remaining: usize,
        sample: Vec<String>,
    },
    #[error("Fetching {0} was cancelled")]
    Cancelled(EnrichKind),
}

#[derive(Error, Debug)]
pub enum TableError {
    #[error("HTTP request to {endpoint} failed: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: StatusCode,
        body: String,
    },
    #[error("Unexpected response from {endpoint}: {message}")]
    UnexpectedResponse { endpoint: String, message: String },
    #[error("Query execution {execution_id} ended in state {state}")]
    QueryFailed { execution_id: String, state: String },
    #[error("Query execution {execution_id} did not finish within {timeout_secs}s")]
    QueryTimeout {
        execution_id: String,
        timeout_secs: u64,
    },
    #[error("Query was cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("Unexpected CSV header in {path}: {found}")]
    UnexpectedHeader { path: PathBuf, found: String },
    #[error("Malformed record at line {line} in {path}: {reason}")]
    MalformedRecord {
        path: PathBuf,
        line: u64,
        reason: String,
    },
    #[error("File task for {path} did not complete: {source}")]
    Task {
        path: PathBuf,
        #[source]
        source: tokio::task::JoinError,
    },
    #[error("Upload was cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Could not resolve chain head: {0}")]
    ChainHead(#[source] RpcError),
    #[error("Log fetch failed for {} block range(s), first {}", .0.len(), first_range(.0))]
    RangesFailed(Vec<BlockRange>),
    #[error(transparent)]
    Enrich(#[from] EnrichError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error("Run was cancelled")]
    Cancelled,
}

fn first_range(ranges: &[BlockRange]) -> String {
    ranges
        .first()
        .map(|range| range.to_string())
        .unwrap_or_default()
}
