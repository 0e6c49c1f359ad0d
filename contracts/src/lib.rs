//! The `Token` contract, its deploy script and the project configuration in
//! `network.toml`.
//!
//! Tests start from [`environment`], which runs on a fresh in-process network
//! and knows how to deploy the `Token` fixture:
//!
//! ```ignore
//! let env = token_contracts::environment()?;
//! env.fixture(&[token_contracts::TOKEN]).await?;
//! let token: Token = env.contract(token_contracts::TOKEN).await?;
//! ```
use std::path::Path;

use e2e::{Config, Environment, LocalNetwork};
use once_cell::sync::OnceCell;

pub mod deploy;
pub mod token;

/// Name and tag of the token deployment.
pub const TOKEN: &str = "Token";
/// Role deploying the contracts.
pub const DEPLOYER: &str = "deployer";
/// Role receiving the token supply.
pub const TOKEN_OWNER: &str = "tokenOwner";

/// Path of the project configuration.
#[must_use]
pub fn config_path() -> &'static Path {
    Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/network.toml"))
}

/// The project configuration, loaded on first use.
///
/// # Errors
///
/// Fails if `network.toml` cannot be read or is invalid.
pub fn config() -> eyre::Result<&'static Config> {
    static CONFIG: OnceCell<Config> = OnceCell::new();
    Ok(CONFIG.get_or_try_init(|| Config::load(config_path()))?)
}

/// The in-process network of the project, with its accounts derived once.
///
/// # Errors
///
/// Fails if the configuration is invalid or its local accounts cannot be
/// derived.
pub fn local_network() -> eyre::Result<&'static LocalNetwork> {
    static LOCAL_NETWORK: OnceCell<LocalNetwork> = OnceCell::new();
    let config = config()?;
    Ok(LOCAL_NETWORK.get_or_try_init(|| config.local_network())?)
}

/// A fresh in-process environment with the project deploy scripts.
///
/// Each call starts its own network, so tests running in parallel never share
/// chain state.
///
/// # Errors
///
/// Fails if the configuration is invalid or the local network lacks an
/// account for a named role.
pub fn environment() -> eyre::Result<Environment> {
    let env = Environment::from_network(config()?, local_network()?)?;
    Ok(env.with_script(deploy::DeployToken))
}
