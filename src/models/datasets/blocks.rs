use chrono::DateTime;

////////////////////////////////////// RPC Data ////////////////////////////////////////
/////////////////////////////////// eth_getBlockByNumber ///////////////////////////////
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcBlock {
    pub number: u64,
    pub timestamp: u64,
}

/////////////////////////////////// Transformed Data ///////////////////////////////////
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    pub block_number: u64,
    pub block_time: String,
    pub block_date: String,
}

impl BlockInfo {
    /// Renders a Unix-seconds timestamp as `YYYY-MM-DD HH:MM:SS` (UTC, no fractional part).
    /// Returns `None` for timestamps chrono cannot represent.
    pub fn from_rpc(block: RpcBlock) -> Option<Self> {
        let seconds = i64::try_from(block.timestamp).ok()?;
        let time = DateTime::from_timestamp(seconds, 0)?;
        let block_time = time.format("%Y-%m-%d %H:%M:%S").to_string();
        let block_date = block_time.get(..10)?.to_string();

        Some(Self {
            block_number: block.number,
            block_time,
            block_date,
        })
    }
}
