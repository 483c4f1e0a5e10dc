use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{Router, http::StatusCode, routing::get};
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Gauge, Histogram, MeterProvider};
use opentelemetry_sdk::metrics::{MetricError, SdkMeterProvider};
use prometheus::{Encoder, TextEncoder};
use tracing::{error, info};

pub struct Metrics {
    registry: Arc<prometheus::Registry>,
    _provider: SdkMeterProvider,
    pub chain_name: String,

    // RPC metrics
    pub rpc_requests: Counter<u64>,
    pub rpc_errors: Counter<u64>,
    pub rpc_latency: Histogram<f64>,

    // Pipeline metrics
    pub logs_fetched: Counter<u64>,
    pub failed_ranges: Counter<u64>,
    pub retry_rounds: Counter<u64>,
    pub latest_processed_block: Gauge<u64>,
    pub stage_duration: Gauge<f64>,

    // Sink metrics
    pub rows_written: Counter<u64>,
    pub rows_uploaded: Counter<u64>,
    pub chunks_uploaded: Counter<u64>,
    pub chunks_failed: Counter<u64>,
}

impl Metrics {
    pub fn new(chain_name: String) -> Result<Self, MetricError> {
        let registry = prometheus::Registry::new();

        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        let provider = SdkMeterProvider::builder().with_reader(exporter).build();
        let meter = provider.meter("backfill_metrics");

        let rpc_requests = meter
            .u64_counter("backfill_rpc_requests")
            .with_description("Number of RPC requests made")
            .build();

        let rpc_errors = meter
            .u64_counter("backfill_rpc_errors")
            .with_description("Number of RPC errors encountered")
            .build();

        let rpc_latency = meter
            .f64_histogram("backfill_rpc_latency")
            .with_description("RPC request latency")
            .with_boundaries(vec![
                0.025, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 1.0, 5.0, 10.0,
            ])
            .with_unit("s")
            .build();

        let logs_fetched = meter
            .u64_counter("backfill_logs_fetched")
            .with_description("Event logs returned by eth_getLogs")
            .build();

        let failed_ranges = meter
            .u64_counter("backfill_failed_ranges")
            .with_description("Block ranges whose logs could not be fetched")
            .build();

        let retry_rounds = meter
            .u64_counter("backfill_retry_rounds")
            .with_description("Enrichment passes over a failure set")
            .build();

        let latest_processed_block = meter
            .u64_gauge("backfill_latest_processed_block_number")
            .with_description("End block of the last completed backfill")
            .build();

        let stage_duration = meter
            .f64_gauge("backfill_stage_duration")
            .with_description("Wall time of the last run of each pipeline stage")
            .with_unit("s")
            .build();

        let rows_written = meter
            .u64_counter("backfill_rows_written")
            .with_description("Rows persisted to the local CSV")
            .build();

        let rows_uploaded = meter
            .u64_counter("backfill_rows_uploaded")
            .with_description("Rows accepted by the remote table")
            .build();

        let chunks_uploaded = meter
            .u64_counter("backfill_chunks_uploaded")
            .with_description("CSV chunks inserted into the remote table")
            .build();

        let chunks_failed = meter
            .u64_counter("backfill_chunks_failed")
            .with_description("CSV chunks the remote table rejected")
            .build();

        Ok(Self {
            registry: Arc::new(registry),
            _provider: provider,
            chain_name,
            rpc_requests,
            rpc_errors,
            rpc_latency,
            logs_fetched,
            failed_ranges,
            retry_rounds,
            latest_processed_block,
            stage_duration,
            rows_written,
            rows_uploaded,
            chunks_uploaded,
            chunks_failed,
        })
    }

    pub fn chain_label(&self) -> KeyValue {
        KeyValue::new("chain", self.chain_name.clone())
    }

    pub fn record_rpc(&self, method: &'static str, elapsed: Duration, failed: bool) {
        let labels = [self.chain_label(), KeyValue::new("method", method)];
        self.rpc_requests.add(1, &labels);
        self.rpc_latency.record(elapsed.as_secs_f64(), &labels);
        if failed {
            self.rpc_errors.add(1, &labels);
        }
    }

    pub fn record_stage(&self, stage: &'static str, elapsed: Duration) {
        self.stage_duration.record(
            elapsed.as_secs_f64(),
            &[self.chain_label(), KeyValue::new("stage", stage)],
        );
    }

    pub async fn start_metrics_server(&self, addr: &str, port: u16) -> Result<()> {
        let addr = format!("{addr}:{port}")
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid metrics address {addr}:{port}"))?;
        let registry = self.registry.clone();

        let app = Router::new().route("/metrics", get(move || metrics_handler(registry.clone())));

        // Only used for logging
        let access_url = if addr.ip().is_unspecified() {
            format!("http://localhost:{port}/metrics")
        } else {
            format!("http://{}:{port}/metrics", addr.ip())
        };

        info!(
            "Starting metrics server - binding to {} (accessible at {})",
            addr, access_url
        );

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind metrics server to {addr}"))?;

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Metrics server stopped: {}", e);
            }
        });
        Ok(())
    }

    #[cfg(test)]
    pub fn render(&self) -> String {
        encode(&self.registry).unwrap_or_default()
    }
}

fn encode(registry: &prometheus::Registry) -> Result<String> {
    let mut buffer = vec![];
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

async fn metrics_handler(registry: Arc<prometheus::Registry>) -> Result<String, StatusCode> {
    encode(&registry).map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
