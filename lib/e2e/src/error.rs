use alloy::{
    primitives::{Address, Bytes},
    sol_types::{Revert, SolError},
};

/// Errors raised by the in-process network, the deployment registry and the
/// contract handles bound to them.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The call reverted. Holds the raw ABI-encoded revert data.
    #[error("execution reverted: {}", describe_revert(.0))]
    Revert(Bytes),
    /// There is no code of the expected program at the address.
    #[error("no `{expected}` contract deployed at {address}")]
    ContractNotFound {
        /// Address that was called.
        address: Address,
        /// Program the caller expected to find there.
        expected: &'static str,
    },
    /// The address is not one of the accounts of the active network, so
    /// nothing can sign on its behalf.
    #[error("account {0} is not available on the active network")]
    UnknownAccount(Address),
    /// The active network exposes no accounts at all.
    #[error("the active network has no accounts")]
    NoAccounts,
    /// No deployment was recorded under this name.
    #[error("no deployment named `{0}`")]
    UnknownDeployment(String),
    /// No named account was configured under this role.
    #[error("no named account `{0}`")]
    UnknownRole(String),
    /// A named account points past the end of the account list.
    #[error("named account `{role}` uses index {index}, but the network only has {available} accounts")]
    AccountIndexOutOfRange {
        /// Role name.
        role: String,
        /// Configured index.
        index: usize,
        /// Number of accounts the network exposes.
        available: usize,
    },
    /// No deploy script carries the requested tag.
    #[error("no deploy script is tagged `{0}`")]
    UnknownTag(String),
}

/// Renders revert data as its `Error(string)` reason when it has one, as hex
/// otherwise.
fn describe_revert(data: &Bytes) -> String {
    decode_reason(data).unwrap_or_else(|| data.to_string())
}

fn decode_reason(data: &[u8]) -> Option<String> {
    Revert::abi_decode(data, true).ok().map(|revert| revert.reason)
}

/// Extension trait for inspecting reverted calls.
pub trait ErrorExt {
    /// Checks that `self` is a revert carrying the abi-encoded error
    /// `expected`.
    fn reverted_with<E: SolError>(&self, expected: E) -> bool;

    /// Returns the `Error(string)` reason of a revert, if any.
    fn revert_reason(&self) -> Option<String>;
}

impl ErrorExt for Error {
    fn reverted_with<E: SolError>(&self, expected: E) -> bool {
        let Self::Revert(data) = self else {
            return false;
        };
        data[..] == expected.abi_encode()[..]
    }

    fn revert_reason(&self) -> Option<String> {
        let Self::Revert(data) = self else {
            return None;
        };
        decode_reason(data)
    }
}

impl ErrorExt for eyre::Report {
    fn reverted_with<E: SolError>(&self, expected: E) -> bool {
        self.downcast_ref::<Error>()
            .is_some_and(|err| err.reverted_with(expected))
    }

    fn revert_reason(&self) -> Option<String> {
        self.downcast_ref::<Error>().and_then(ErrorExt::revert_reason)
    }
}
