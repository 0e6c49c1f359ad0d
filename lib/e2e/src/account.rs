//! Development accounts and role-based account names.
use std::collections::BTreeMap;

use alloy::{
    primitives::Address,
    signers::local::{
        coins_bip39::English, LocalSignerError, MnemonicBuilder,
        PrivateKeySigner,
    },
};

use crate::Error;

/// Derives `count` signers from `phrase` along `m/44'/60'/0'/0/i`, starting
/// at index `start`.
///
/// # Errors
///
/// Fails if `phrase` is not a valid English BIP-39 mnemonic.
pub fn derive_signers(
    phrase: &str,
    start: u32,
    count: usize,
) -> Result<Vec<PrivateKeySigner>, LocalSignerError> {
    (start..)
        .take(count)
        .map(|index| {
            MnemonicBuilder::<English>::default()
                .phrase(phrase)
                .index(index)
                .and_then(|builder| builder.build())
        })
        .collect()
}

/// A role name bound to an account index, e.g. `deployer -> 0`.
///
/// The index may differ per network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamedAccount {
    role: String,
    index: usize,
    overrides: BTreeMap<String, usize>,
}

impl NamedAccount {
    /// Binds `role` to `index` on every network.
    #[must_use]
    pub fn new(role: impl Into<String>, index: usize) -> Self {
        Self { role: role.into(), index, overrides: BTreeMap::new() }
    }

    /// Uses `index` instead of the default one on `network`.
    #[must_use]
    pub fn with_override(
        mut self,
        network: impl Into<String>,
        index: usize,
    ) -> Self {
        self.overrides.insert(network.into(), index);
        self
    }

    /// Role name.
    #[must_use]
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Networks with a dedicated index.
    pub fn overridden_networks(&self) -> impl Iterator<Item = &str> {
        self.overrides.keys().map(String::as_str)
    }

    /// Account index of the role on `network`.
    #[must_use]
    pub fn index_for(&self, network: &str) -> usize {
        self.overrides.get(network).copied().unwrap_or(self.index)
    }
}

/// Role names resolved to addresses on one network, in declaration order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NamedAccounts(Vec<(String, Address)>);

impl NamedAccounts {
    /// Resolves `roles` against the ordered account list of `network`.
    ///
    /// # Errors
    ///
    /// Fails if a role points past the end of `accounts`.
    pub fn resolve(
        roles: &[NamedAccount],
        network: &str,
        accounts: &[Address],
    ) -> Result<Self, Error> {
        let mut named = Vec::with_capacity(roles.len());
        for role in roles {
            let index = role.index_for(network);
            let address = accounts.get(index).copied().ok_or_else(|| {
                Error::AccountIndexOutOfRange {
                    role: role.role().to_owned(),
                    index,
                    available: accounts.len(),
                }
            })?;
            named.push((role.role().to_owned(), address));
        }
        Ok(Self(named))
    }

    /// Address of `role`.
    ///
    /// # Errors
    ///
    /// Fails if no account is named `role`.
    pub fn get(&self, role: &str) -> Result<Address, Error> {
        self.0
            .iter()
            .find(|(named, _)| named == role)
            .map(|(_, address)| *address)
            .ok_or_else(|| Error::UnknownRole(role.to_owned()))
    }

    /// Whether `address` has a role.
    #[must_use]
    pub fn contains(&self, address: Address) -> bool {
        self.0.iter().any(|(_, named)| *named == address)
    }

    /// Accounts from `accounts` without a role, in their original order.
    #[must_use]
    pub fn unnamed(&self, accounts: &[Address]) -> Vec<Address> {
        accounts
            .iter()
            .copied()
            .filter(|address| !self.contains(*address))
            .collect()
    }

    /// Role and address pairs, in the order the roles were declared.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Address)> {
        self.0.iter().map(|(role, address)| (role.as_str(), *address))
    }
}
