use alloy_primitives::{Address, B256};

////////////////////////////////////// RPC Data ////////////////////////////////////////
///////////////////////////////// eth_getTransactionByHash /////////////////////////////
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcTransaction {
    pub hash: B256,
    pub from: Option<Address>,
    pub to: Option<Address>, // None for contract creation
}

/////////////////////////////////// Transformed Data ///////////////////////////////////
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInfo {
    pub transaction_hash: B256,
    pub from: String,
    pub to: String,
}

impl From<RpcTransaction> for TxInfo {
    fn from(tx: RpcTransaction) -> Self {
        Self {
            transaction_hash: tx.hash,
            from: tx.from.map(|address| format!("{address:#x}")).unwrap_or_default(),
            to: tx.to.map(|address| format!("{address:#x}")).unwrap_or_default(),
        }
    }
}
