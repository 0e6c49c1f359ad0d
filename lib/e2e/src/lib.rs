//! Harness for deploying contracts and testing them against an in-process
//! network.
//!
//! A [`Config`] selects the network and names accounts by role, an
//! [`Environment`] runs [`DeployScript`]s and snapshots them as fixtures, and
//! [`setup_users`] turns accounts into [`User`] views whose contract handles
//! sign as them.
mod account;
mod config;
mod contract;
mod deploy;
mod devnet;
mod environment;
mod error;
mod event;
mod receipt;
pub mod storage;
mod user;

pub use account::{derive_signers, NamedAccount, NamedAccounts};
pub use alloy::primitives::Address;
pub use config::{
    AccountsConfig, Config, ConfigError, LocalNetwork, NetworkConfig,
    NetworkTarget, RemoteNetwork, DEFAULT_ACCOUNT_COUNT, DEFAULT_CHAIN_ID,
    DEFAULT_MNEMONIC, LOCAL_NETWORK,
};
pub use contract::{Connect, Contract};
pub use deploy::{DeployOptions, DeployResult, DeployScript, Deployment};
pub use devnet::{require, Client, Context, Devnet, Program, SnapshotId};
pub use environment::Environment;
pub use error::{Error, ErrorExt};
pub use event::EventExt;
pub use receipt::Receipt;
pub use user::{setup_user, setup_users, User};
