use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColumnSpec {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub column_type: &'static str,
}

const fn column(name: &'static str, column_type: &'static str) -> ColumnSpec {
    ColumnSpec { name, column_type }
}

/// Event log columns plus the sender/recipient of the emitting transaction.
/// Order matches the CSV header.
pub fn log_table_schema() -> Vec<ColumnSpec> {
    vec![
        column("block_hash", "varchar"),
        column("block_number", "integer"),
        column("block_time", "timestamp"),
        column("block_date", "timestamp"),
        column("contract_address", "varchar"),
        column("tx_hash", "varchar"),
        column("tx_from", "varchar"),
        column("tx_to", "varchar"),
        column("tx_index", "integer"),
        column("log_index", "integer"),
        column("topic0", "varchar"),
        column("topic1", "varchar"),
        column("topic2", "varchar"),
        column("topic3", "varchar"),
        column("data", "varchar"),
    ]
}
