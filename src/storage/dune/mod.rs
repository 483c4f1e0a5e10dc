pub mod schema;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use http::StatusCode;
use http::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::common::{DuneConfig, TableRef};
use crate::models::errors::TableError;
use crate::storage::dune::schema::ColumnSpec;
use crate::storage::{CreateOutcome, InsertReceipt, RemoteTable};
use crate::utils::retry::sleep_or_cancel;
use crate::utils::strip_html;

const API_KEY_HEADER: &str = "X-DUNE-API-KEY";

pub struct DuneClient {
    http: Client,
    base_url: String,
    api_key: String,
    is_private: bool,
    poll_interval: Duration,
    query_timeout: Duration,
    request_timeout: Duration,
}

#[derive(Serialize)]
struct CreateTableRequest<'a> {
    is_private: bool,
    schema: &'a [ColumnSpec],
}

#[derive(Deserialize, Debug)]
struct CreateTableResponse {
    #[serde(default)]
    already_existed: bool,
}

#[derive(Deserialize, Debug)]
struct InsertResponse {
    rows_written: Option<u64>,
}

#[derive(Serialize)]
struct CreateQueryRequest<'a> {
    name: String,
    query_sql: String,
    is_private: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

#[derive(Deserialize, Debug)]
struct CreateQueryResponse {
    query_id: u64,
}

#[derive(Deserialize, Debug)]
struct ExecuteResponse {
    execution_id: String,
}

#[derive(Deserialize, Debug)]
struct StatusResponse {
    state: ExecutionState,
}

#[derive(Deserialize, Debug)]
struct ResultsResponse {
    #[serde(default)]
    result: Option<ResultSet>,
}

#[derive(Deserialize, Debug)]
struct ResultSet {
    #[serde(default)]
    rows: Vec<serde_json::Map<String, Value>>,
}

/// Lifecycle of a submitted query execution.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    #[serde(rename = "QUERY_STATE_PENDING")]
    Pending,
    #[serde(rename = "QUERY_STATE_EXECUTING")]
    Executing,
    #[serde(rename = "QUERY_STATE_COMPLETED")]
    Completed,
    #[serde(rename = "QUERY_STATE_COMPLETED_PARTIAL")]
    CompletedPartial,
    #[serde(rename = "QUERY_STATE_FAILED")]
    Failed,
    #[serde(rename = "QUERY_STATE_CANCELLED")]
    Cancelled,
    #[serde(rename = "QUERY_STATE_EXPIRED")]
    Expired,
    #[serde(other)]
    Unknown,
}

impl ExecutionState {
    pub fn is_done(self) -> bool {
        matches!(self, Self::Completed | Self::CompletedPartial)
    }

    pub fn is_failed(self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled | Self::Expired)
    }
}

impl DuneClient {
    pub fn new(config: &DuneConfig) -> Result<Self, TableError> {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|source| TableError::Http {
                endpoint: config.base_url.clone(),
                source,
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            is_private: config.is_private,
            poll_interval: Duration::from_millis(config.query_poll_interval_ms),
            query_timeout: Duration::from_secs(config.query_timeout_secs),
            request_timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(&self, endpoint: &str, request: RequestBuilder) -> Result<Response, TableError> {
        let response = request
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|source| TableError::Http {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(TableError::Status {
            endpoint: endpoint.to_string(),
            status,
            body: strip_html(&body),
        })
    }

    async fn json<R: DeserializeOwned>(&self, endpoint: &str, response: Response) -> Result<R, TableError> {
        let text = response.text().await.map_err(|source| TableError::Http {
            endpoint: endpoint.to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|e| TableError::UnexpectedResponse {
            endpoint: endpoint.to_string(),
            message: format!("{e}: {text}"),
        })
    }

    async fn post_json<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R, TableError> {
        let url = self.url(path);
        let response = self.send(&url, self.http.post(&url).json(body)).await?;
        self.json(&url, response).await
    }

    async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R, TableError> {
        let url = self.url(path);
        let response = self.send(&url, self.http.get(&url)).await?;
        self.json(&url, response).await
    }

    async fn create_query(&self, sql: String) -> Result<u64, TableError> {
        let request = CreateQueryRequest {
            name: format!("backfill watermark {}", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")),
            query_sql: sql,
            is_private: self.is_private,
            description: Some("Temporary query used to resume an upload"),
        };
        let response: CreateQueryResponse = self.post_json("query", &request).await?;
        Ok(response.query_id)
    }

    async fn wait_for_execution(&self, execution_id: &str, cancel: &CancellationToken) -> Result<(), TableError> {
        let started = Instant::now();
        loop {
            let status: StatusResponse = self
                .get_json(&format!("execution/{execution_id}/status"))
                .await?;
            debug!("Execution {} is {:?}", execution_id, status.state);

            if status.state.is_done() {
                return Ok(());
            }
            if status.state.is_failed() {
                return Err(TableError::QueryFailed {
                    execution_id: execution_id.to_string(),
                    state: format!("{:?}", status.state),
                });
            }
            if started.elapsed() >= self.query_timeout {
                return Err(TableError::QueryTimeout {
                    execution_id: execution_id.to_string(),
                    timeout_secs: self.query_timeout.as_secs(),
                });
            }
            if !sleep_or_cancel(self.poll_interval, cancel).await {
                return Err(TableError::Cancelled);
            }
        }
    }

    async fn run_max_query(&self, query_id: u64, cancel: &CancellationToken) -> Result<Option<u64>, TableError> {
        let execution: ExecuteResponse = self
            .post_json(&format!("query/{query_id}/execute"), &serde_json::json!({}))
            .await?;
        info!("Watermark query {} submitted as execution {}", query_id, execution.execution_id);

        self.wait_for_execution(&execution.execution_id, cancel).await?;

        let endpoint = format!("execution/{}/results", execution.execution_id);
        let results: ResultsResponse = self.get_json(&endpoint).await?;
        let Some(row) = results.result.and_then(|result| result.rows.into_iter().next()) else {
            return Ok(None);
        };

        parse_max_block(row.get("max_block").unwrap_or(&Value::Null)).map_err(|message| {
            TableError::UnexpectedResponse {
                endpoint: self.url(&endpoint),
                message,
            }
        })
    }
}

/// Reads the `max_block` cell, which arrives as a number, a numeric string or null.
fn parse_max_block(value: &Value) -> Result<Option<u64>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
            .map(Some)
            .ok_or_else(|| format!("max_block {number} is not a block number")),
        Value::String(text) if text.is_empty() => Ok(None),
        Value::String(text) => text
            .parse::<u64>()
            .map(Some)
            .map_err(|_| format!("max_block '{text}' is not a block number")),
        other => Err(format!("unexpected max_block value {other}")),
    }
}

#[async_trait]
impl RemoteTable for DuneClient {
    async fn create_table(
        &self,
        table: &TableRef,
        schema: &[ColumnSpec],
        is_private: bool,
    ) -> Result<CreateOutcome, TableError> {
        let path = format!("table/{}/{}/create", table.namespace, table.name);
        let request = CreateTableRequest { is_private, schema };

        match self.post_json::<_, CreateTableResponse>(&path, &request).await {
            Ok(response) if response.already_existed => Ok(CreateOutcome::AlreadyExisted),
            Ok(_) => Ok(CreateOutcome::Created),
            Err(TableError::Status { status, .. }) if status == StatusCode::CONFLICT => {
                Ok(CreateOutcome::AlreadyExisted)
            }
            Err(TableError::Status { body, .. }) if body.contains("already exists") => {
                Ok(CreateOutcome::AlreadyExisted)
            }
            Err(e) => Err(e),
        }
    }

    async fn insert_csv(&self, table: &TableRef, body: Vec<u8>) -> Result<InsertReceipt, TableError> {
        let url = self.url(&format!("table/{}/{}/insert", table.namespace, table.name));
        let request = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "text/csv")
            .body(body);
        let response = self.send(&url, request).await?;
        let response: InsertResponse = self.json(&url, response).await?;

        Ok(InsertReceipt {
            rows_written: response.rows_written,
        })
    }

    async fn max_block_number(
        &self,
        table: &TableRef,
        cancel: &CancellationToken,
    ) -> Result<Option<u64>, TableError> {
        let sql = format!("SELECT MAX(block_number) AS max_block FROM {table}");
        let query_id = self.create_query(sql).await?;

        let result = self.run_max_query(query_id, cancel).await;

        // Saved queries pile up in the account otherwise
        if let Err(e) = self
            .post_json::<_, Value>(&format!("query/{query_id}/archive"), &serde_json::json!({}))
            .await
        {
            warn!("Failed to archive watermark query {}: {}", query_id, e);
        }
        result
    }
}
