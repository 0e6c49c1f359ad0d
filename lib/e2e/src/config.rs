//! Declarative project configuration.
//!
//! A project describes its compiler version, the networks it can reach and
//! the accounts it refers to by role in a TOML file:
//!
//! ```toml
//! [solidity]
//! version = "0.7.3"
//!
//! [networks.rinkeby]
//! url = "https://eth-rinkeby.alchemyapi.io/v2/${ALCHEMY_API_KEY}"
//! accounts = ["${RINKEBY_PRIVATE_KEY}"]
//!
//! [named_accounts]
//! deployer = 0
//! tokenOwner = { default = 1, rinkeby = 0 }
//! ```
//!
//! `${VAR}` references are resolved from the environment when a network is
//! selected, not when the file is loaded.
use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
    str::FromStr,
};

use alloy::{
    signers::local::PrivateKeySigner, transports::http::reqwest::Url,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::account::{derive_signers, NamedAccount};

/// Name of the in-process network.
pub const LOCAL_NETWORK: &str = "hardhat";
/// Mnemonic of the in-process network accounts.
pub const DEFAULT_MNEMONIC: &str =
    "test test test test test test test test test test test junk";
/// Number of accounts derived from a mnemonic when not configured.
pub const DEFAULT_ACCOUNT_COUNT: usize = 20;
/// Chain id of the in-process network when not configured.
pub const DEFAULT_CHAIN_ID: u64 = 31337;

static COMPILER_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d+\.\d+\.\d+$").expect("compiler version regex is valid")
});

static ENV_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
        .expect("env reference regex is valid")
});

/// Errors raised while loading a configuration or selecting a network.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {}", path.display())]
    Read {
        /// Path of the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not a valid configuration.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// The compiler version is not `major.minor.patch`.
    #[error("invalid compiler version `{0}`, expected `major.minor.patch`")]
    InvalidCompilerVersion(String),
    /// No network is configured under this name.
    #[error("unknown network `{0}`")]
    UnknownNetwork(String),
    /// A remote network has no endpoint.
    #[error("network `{0}` has no url")]
    MissingUrl(String),
    /// The in-process network was given an endpoint.
    #[error("network `{0}` runs in-process and cannot have a url")]
    LocalUrl(String),
    /// A `${VAR}` reference could not be resolved.
    #[error("network `{network}` requires the environment variable `{var}`")]
    MissingEnv {
        /// Network being selected.
        network: String,
        /// Missing variable.
        var: String,
    },
    /// The endpoint is not a valid URL.
    #[error("network `{network}` has an invalid url: {reason}")]
    InvalidUrl {
        /// Network being selected.
        network: String,
        /// Parser message.
        reason: String,
    },
    /// A private key or mnemonic could not be turned into a signer.
    #[error("network `{network}`: credential #{index} is invalid: {reason}")]
    InvalidCredential {
        /// Network being selected.
        network: String,
        /// Position of the credential in the `accounts` list.
        index: usize,
        /// Signer error message.
        reason: String,
    },
    /// A per-network named account has no `default` index.
    #[error("named account `{0}` has no `default` index")]
    MissingDefaultIndex(String),
    /// A named account overrides its index on an unknown network.
    #[error("named account `{role}` refers to unknown network `{network}`")]
    UnknownOverride {
        /// Role name.
        role: String,
        /// Network name of the override.
        network: String,
    },
    /// Two roles resolve to the same account.
    #[error("named accounts `{first}` and `{second}` both use index {index} on network `{network}`")]
    DuplicateAccountIndex {
        /// Network on which the indices collide.
        network: String,
        /// Shared index.
        index: usize,
        /// First role.
        first: String,
        /// Second role.
        second: String,
    },
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    solidity: RawSolidity,
    default_network: Option<String>,
    #[serde(default)]
    networks: BTreeMap<String, NetworkConfig>,
    /// Kept as a table so roles stay in file order.
    #[serde(default)]
    named_accounts: toml::Table,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSolidity {
    version: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNamedAccount {
    Index(usize),
    PerNetwork(BTreeMap<String, usize>),
}

/// A `[networks.<name>]` table.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    /// JSON-RPC endpoint, may contain `${VAR}` references.
    pub url: Option<String>,
    /// Credentials of the accounts used on the network.
    pub accounts: Option<AccountsConfig>,
    /// Expected chain id.
    pub chain_id: Option<u64>,
}

/// Credentials of a network's accounts. Every string may contain `${VAR}`
/// references.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum AccountsConfig {
    /// Hex-encoded private keys, one per account.
    PrivateKeys(Vec<String>),
    /// Accounts derived from a BIP-39 mnemonic.
    Mnemonic {
        /// Mnemonic phrase.
        mnemonic: String,
        /// Number of accounts to derive.
        #[serde(default = "default_account_count")]
        count: usize,
        /// Derivation index of the first account.
        #[serde(default)]
        initial_index: u32,
    },
}

fn default_account_count() -> usize {
    DEFAULT_ACCOUNT_COUNT
}

/// The in-process network with its unlocked accounts.
#[derive(Clone, Debug)]
pub struct LocalNetwork {
    /// Network name.
    pub name: String,
    /// Chain id reported by the network.
    pub chain_id: u64,
    /// Signers of the network accounts, in order.
    pub signers: Vec<PrivateKeySigner>,
}

/// A network reached over JSON-RPC.
#[derive(Clone, Debug)]
pub struct RemoteNetwork {
    /// Network name.
    pub name: String,
    /// Endpoint with every `${VAR}` reference resolved.
    pub url: Url,
    /// Expected chain id, if configured.
    pub chain_id: Option<u64>,
    /// Signers of the configured accounts, in order.
    pub signers: Vec<PrivateKeySigner>,
}

/// Result of selecting a network.
#[derive(Clone, Debug)]
pub enum NetworkTarget {
    /// The in-process network.
    Local(LocalNetwork),
    /// A network reached over JSON-RPC.
    Remote(RemoteNetwork),
}

impl NetworkTarget {
    /// Name of the selected network.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Local(network) => &network.name,
            Self::Remote(network) => &network.name,
        }
    }

    /// Signers of the selected network, in order.
    #[must_use]
    pub fn signers(&self) -> &[PrivateKeySigner] {
        match self {
            Self::Local(network) => &network.signers,
            Self::Remote(network) => &network.signers,
        }
    }
}

/// A validated project configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    compiler: String,
    default_network: Option<String>,
    networks: BTreeMap<String, NetworkConfig>,
    named_accounts: Vec<NamedAccount>,
}

impl Config {
    /// Reads and validates the configuration at `path`.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or is not a valid configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| {
            ConfigError::Read { path: path.to_path_buf(), source }
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parses and validates a configuration.
    ///
    /// # Errors
    ///
    /// Fails if `contents` is not valid TOML, misses required settings or is
    /// inconsistent.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(contents)?;

        let compiler = raw.solidity.version;
        if !COMPILER_VERSION.is_match(&compiler) {
            return Err(ConfigError::InvalidCompilerVersion(compiler));
        }

        for (name, network) in &raw.networks {
            match (name == LOCAL_NETWORK, &network.url) {
                (true, Some(_)) => {
                    return Err(ConfigError::LocalUrl(name.clone()))
                }
                (false, None) => {
                    return Err(ConfigError::MissingUrl(name.clone()))
                }
                _ => {}
            }
        }

        let config = Self {
            compiler,
            default_network: raw.default_network,
            networks: raw.networks,
            named_accounts: raw
                .named_accounts
                .into_iter()
                .map(|(role, raw)| -> Result<_, ConfigError> {
                    named_account(role, raw.try_into()?)
                })
                .collect::<Result<_, _>>()?,
        };

        if let Some(name) = &config.default_network {
            config.ensure_known(name)?;
        }
        config.validate_named_accounts()?;
        Ok(config)
    }

    fn ensure_known(&self, name: &str) -> Result<(), ConfigError> {
        if self.is_known(name) {
            Ok(())
        } else {
            Err(ConfigError::UnknownNetwork(name.to_owned()))
        }
    }

    fn is_known(&self, name: &str) -> bool {
        name == LOCAL_NETWORK || self.networks.contains_key(name)
    }

    fn validate_named_accounts(&self) -> Result<(), ConfigError> {
        for account in &self.named_accounts {
            if let Some(network) =
                account.overridden_networks().find(|name| !self.is_known(name))
            {
                return Err(ConfigError::UnknownOverride {
                    role: account.role().to_owned(),
                    network: network.to_owned(),
                });
            }
        }

        let networks = std::iter::once(LOCAL_NETWORK)
            .chain(self.networks.keys().map(String::as_str));
        for network in networks {
            let mut used: HashMap<usize, &str> = HashMap::new();
            for account in &self.named_accounts {
                let index = account.index_for(network);
                if let Some(first) = used.insert(index, account.role()) {
                    return Err(ConfigError::DuplicateAccountIndex {
                        network: network.to_owned(),
                        index,
                        first: first.to_owned(),
                        second: account.role().to_owned(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Compiler version, `major.minor.patch`.
    #[must_use]
    pub fn compiler(&self) -> &str {
        &self.compiler
    }

    /// Network used when none is selected.
    #[must_use]
    pub fn default_network(&self) -> &str {
        self.default_network.as_deref().unwrap_or(LOCAL_NETWORK)
    }

    /// Role to account index mapping, ordered by role.
    #[must_use]
    pub fn named_accounts(&self) -> &[NamedAccount] {
        &self.named_accounts
    }

    /// Names of the configured networks, the in-process one included.
    pub fn network_names(&self) -> impl Iterator<Item = &str> {
        let local = (!self.networks.contains_key(LOCAL_NETWORK))
            .then_some(LOCAL_NETWORK);
        local.into_iter().chain(self.networks.keys().map(String::as_str))
    }

    /// Selects network `name`, or the default network when `None`,
    /// resolving `${VAR}` references from the process environment.
    ///
    /// # Errors
    ///
    /// Fails if the network is unknown, a referenced variable is unset or
    /// empty, or the endpoint or a credential is malformed.
    pub fn network(
        &self,
        name: Option<&str>,
    ) -> Result<NetworkTarget, ConfigError> {
        self.network_with(name, |var| std::env::var(var).ok())
    }

    /// Same as [`Config::network`], resolving `${VAR}` references with
    /// `lookup`.
    ///
    /// # Errors
    ///
    /// See [`Config::network`].
    pub fn network_with(
        &self,
        name: Option<&str>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<NetworkTarget, ConfigError> {
        let name = name.unwrap_or_else(|| self.default_network());
        self.ensure_known(name)?;
        let settings = self.networks.get(name).cloned().unwrap_or_default();
        let resolve = |value: &str| interpolate(name, value, &lookup);

        if name == LOCAL_NETWORK {
            let accounts = settings.accounts.unwrap_or(AccountsConfig::Mnemonic {
                mnemonic: DEFAULT_MNEMONIC.to_owned(),
                count: DEFAULT_ACCOUNT_COUNT,
                initial_index: 0,
            });
            return Ok(NetworkTarget::Local(LocalNetwork {
                name: name.to_owned(),
                chain_id: settings.chain_id.unwrap_or(DEFAULT_CHAIN_ID),
                signers: signers(name, &accounts, resolve)?,
            }));
        }

        let url = settings
            .url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingUrl(name.to_owned()))?;
        let url = Url::parse(&resolve(url)?).map_err(|err| {
            ConfigError::InvalidUrl {
                network: name.to_owned(),
                reason: err.to_string(),
            }
        })?;
        let signers = match &settings.accounts {
            Some(accounts) => signers(name, accounts, resolve)?,
            None => Vec::new(),
        };

        Ok(NetworkTarget::Remote(RemoteNetwork {
            name: name.to_owned(),
            url,
            chain_id: settings.chain_id,
            signers,
        }))
    }

    /// Selects the in-process network.
    ///
    /// # Errors
    ///
    /// Fails if its configured credentials cannot be resolved.
    pub fn local_network(&self) -> Result<LocalNetwork, ConfigError> {
        match self.network(Some(LOCAL_NETWORK))? {
            NetworkTarget::Local(network) => Ok(network),
            NetworkTarget::Remote(network) => {
                Err(ConfigError::UnknownNetwork(network.name))
            }
        }
    }
}

fn named_account(
    role: String,
    raw: RawNamedAccount,
) -> Result<NamedAccount, ConfigError> {
    match raw {
        RawNamedAccount::Index(index) => Ok(NamedAccount::new(role, index)),
        RawNamedAccount::PerNetwork(mut indices) => {
            let Some(index) = indices.remove("default") else {
                return Err(ConfigError::MissingDefaultIndex(role));
            };
            Ok(indices.into_iter().fold(
                NamedAccount::new(role, index),
                |account, (network, index)| account.with_override(network, index),
            ))
        }
    }
}

/// Replaces every `${VAR}` in `value`. Unset and empty variables are errors.
fn interpolate(
    network: &str,
    value: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    let mut resolved = String::with_capacity(value.len());
    let mut last = 0;
    for captures in ENV_REFERENCE.captures_iter(value) {
        let (Some(reference), Some(var)) = (captures.get(0), captures.get(1))
        else {
            continue;
        };
        let replacement =
            lookup(var.as_str()).filter(|value| !value.is_empty()).ok_or_else(
                || ConfigError::MissingEnv {
                    network: network.to_owned(),
                    var: var.as_str().to_owned(),
                },
            )?;
        resolved.push_str(&value[last..reference.start()]);
        resolved.push_str(&replacement);
        last = reference.end();
    }
    resolved.push_str(&value[last..]);
    Ok(resolved)
}

fn signers(
    network: &str,
    accounts: &AccountsConfig,
    resolve: impl Fn(&str) -> Result<String, ConfigError>,
) -> Result<Vec<PrivateKeySigner>, ConfigError> {
    let invalid = |index: usize, reason: String| ConfigError::InvalidCredential {
        network: network.to_owned(),
        index,
        reason,
    };

    match accounts {
        AccountsConfig::PrivateKeys(keys) => keys
            .iter()
            .enumerate()
            .map(|(index, key)| {
                PrivateKeySigner::from_str(resolve(key)?.trim())
                    .map_err(|err| invalid(index, err.to_string()))
            })
            .collect(),
        AccountsConfig::Mnemonic { mnemonic, count, initial_index } => {
            derive_signers(&resolve(mnemonic)?, *initial_index, *count)
                .map_err(|err| invalid(0, err.to_string()))
        }
    }
}
