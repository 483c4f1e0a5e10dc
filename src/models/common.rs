use std::fmt;
use std::path::{Path, PathBuf};

use alloy_primitives::Address;
use anyhow::{Context, Result, anyhow, ensure};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub address: String,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "0.0.0.0".to_string(),
            port: 9100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_block_range")]
    pub max_block_range: u64,
}

impl RpcConfig {
    /// Node providers hand out URLs that expect the key appended as the last path segment.
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.url, self.api_key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuneConfig {
    #[serde(default = "default_dune_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    pub namespace: String,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default = "default_upload_chunk_lines")]
    pub upload_chunk_lines: usize,
    #[serde(default = "default_query_poll_interval_ms")]
    pub query_poll_interval_ms: u64,
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
    // Applies to each HTTP request, including each status poll
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub resume_from_watermark: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub block_chunk_size: usize,
    pub tx_chunk_size: usize,
    // None keeps retrying failed blocks/transactions until they succeed
    pub max_retry_rounds: Option<u32>,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub range_max_attempts: u32,
    pub abort_on_range_failure: bool,
    pub output_dir: PathBuf,
    pub run_timeout_secs: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            block_chunk_size: 5_000,
            tx_chunk_size: 5_000,
            max_retry_rounds: Some(32),
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 30_000,
            range_max_attempts: 5,
            abort_on_range_failure: false,
            output_dir: PathBuf::from("."),
            run_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractConfig {
    pub address: String,
    pub deployed_block: u64,
    #[serde(default)]
    pub end_block: Option<u64>,
    /// Overrides `dune.namespace` for this contract's table.
    #[serde(default)]
    pub namespace: Option<String>,
    pub table_name: String,
}

impl ContractConfig {
    pub fn parsed_address(&self) -> Result<Address> {
        parse_address(&self.address)
    }

    pub fn output_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{}.csv", self.table_name))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub chain_name: String,
    pub rpc: RpcConfig,
    pub dune: DuneConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub contracts: Vec<ContractConfig>,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.pipeline.block_chunk_size > 0, "pipeline.block_chunk_size must be > 0");
        ensure!(self.pipeline.tx_chunk_size > 0, "pipeline.tx_chunk_size must be > 0");
        ensure!(self.pipeline.range_max_attempts > 0, "pipeline.range_max_attempts must be > 0");
        ensure!(self.dune.upload_chunk_lines > 0, "dune.upload_chunk_lines must be > 0");
        ensure!(self.dune.request_timeout_secs > 0, "dune.request_timeout_secs must be > 0");
        ensure!(!self.dune.namespace.is_empty(), "dune.namespace must not be empty");

        for contract in &self.contracts {
            contract.parsed_address()?;
            if contract.table_name.trim().is_empty() {
                return Err(anyhow!("contract {} has an empty table_name", contract.address));
            }
            if contract.namespace.as_deref().is_some_and(|namespace| namespace.trim().is_empty()) {
                return Err(anyhow!("contract {} has an empty namespace", contract.address));
            }
            if let Some(end_block) = contract.end_block {
                ensure!(
                    end_block >= contract.deployed_block,
                    "contract {}: end_block {} is before deployed_block {}",
                    contract.address,
                    end_block,
                    contract.deployed_block
                );
            }
        }
        Ok(())
    }
}

/// Accepts a hex address with or without the `0x` prefix.
pub fn parse_address(raw: &str) -> Result<Address> {
    let trimmed = raw.trim();
    let prefixed = if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
        trimmed.to_string()
    } else {
        format!("0x{trimmed}")
    };
    prefixed
        .parse::<Address>()
        .with_context(|| format!("invalid contract address '{raw}'"))
}

/// Inclusive block interval passed to a single `eth_getLogs` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRange {
    pub from_block: u64,
    pub to_block: u64,
}

impl BlockRange {
    pub fn span(&self) -> u64 {
        self.to_block - self.from_block + 1
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.from_block, self.to_block)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub namespace: String,
    pub name: String,
}

impl TableRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dune.{}.{}", self.namespace, self.name)
    }
}

fn default_max_block_range() -> u64 {
    9_999
}

fn default_dune_base_url() -> String {
    "https://api.dune.com/api/v1".to_string()
}

fn default_upload_chunk_lines() -> usize {
    200_000
}

fn default_query_poll_interval_ms() -> u64 {
    1_000
}

fn default_query_timeout_secs() -> u64 {
    300
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract(address: &str) -> ContractConfig {
        ContractConfig {
            address: address.to_string(),
            deployed_block: 10,
            end_block: None,
            namespace: None,
            table_name: "dataset_logs".to_string(),
        }
    }

    #[test]
    fn test_address_accepts_missing_prefix() {
        let with_prefix = contract("0x47fbe95e981C0Df9737B6971B451fB15fdC989d9");
        let without_prefix = contract("47fbe95e981C0Df9737B6971B451fB15fdC989d9");
        assert_eq!(
            with_prefix.parsed_address().unwrap(),
            without_prefix.parsed_address().unwrap()
        );
        assert!(contract("not-an-address").parsed_address().is_err());
    }

    #[test]
    fn test_output_path_is_named_after_table() {
        let path = contract("0x47fbe95e981C0Df9737B6971B451fB15fdC989d9")
            .output_path(Path::new("/tmp/out"));
        assert_eq!(path, PathBuf::from("/tmp/out/dataset_logs.csv"));
    }

    #[test]
    fn test_block_range_display_and_span() {
        let range = BlockRange {
            from_block: 100,
            to_block: 199,
        };
        assert_eq!(range.to_string(), "100-199");
        assert_eq!(range.span(), 100);
    }
}
