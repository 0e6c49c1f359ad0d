use alloy::primitives::{Address, Log, TxHash};

/// Receipt of a transaction mined by the in-process network.
///
/// Only successful transactions are mined: a reverted call never produces a
/// receipt and surfaces as [`crate::Error::Revert`] instead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    /// Hash of the transaction.
    pub transaction_hash: TxHash,
    /// Block the transaction was mined in.
    pub block_number: u64,
    /// Sender of the transaction.
    pub from: Address,
    /// Called contract, `None` for deployments.
    pub to: Option<Address>,
    /// Address of the created contract, for deployments.
    pub contract_address: Option<Address>,
    /// Logs emitted during execution, in emission order.
    pub logs: Vec<Log>,
}
