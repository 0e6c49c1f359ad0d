use std::ops::Deref;

use alloy::primitives::Address;

use crate::{Connect, Error};

/// An account together with contract handles that sign as it.
///
/// Derefs to the contracts, so `user.token` is the token handle bound to
/// `user.address`.
#[derive(Clone, Debug)]
pub struct User<C> {
    /// Address of the account.
    pub address: Address,
    contracts: C,
}

impl<C> User<C> {
    /// Contract handles bound to [`User::address`].
    #[must_use]
    pub fn contracts(&self) -> &C {
        &self.contracts
    }
}

impl<C> Deref for User<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        &self.contracts
    }
}

/// Builds the view of `address`: every handle in `contracts` rebound to sign
/// as `address`.
///
/// # Errors
///
/// Fails if `address` is not an account of the network.
pub fn setup_user<C: Connect>(
    address: Address,
    contracts: &C,
) -> Result<User<C>, Error> {
    Ok(User { address, contracts: contracts.connect(address)? })
}

/// Builds one view per address, in order.
///
/// # Errors
///
/// Fails on the first address that is not an account of the network.
pub fn setup_users<C: Connect>(
    addresses: &[Address],
    contracts: &C,
) -> Result<Vec<User<C>>, Error> {
    addresses.iter().map(|address| setup_user(*address, contracts)).collect()
}

#[cfg(test)]
mod tests {
    use alloy::primitives::Address;
    use proptest::prelude::*;

    use super::{setup_user, setup_users};
    use crate::{
        contract::tests::CounterHandle,
        devnet::tests::devnet,
        Contract, Error,
    };

    proptest! {
        #[test]
        fn views_preserve_order_and_length(
            picks in proptest::collection::vec(0usize..5, 0..10)
        ) {
            let network = devnet(5);
            let handle = CounterHandle::new(
                Address::repeat_byte(7),
                network.client(network.accounts()[0])?,
            );
            let addresses: Vec<_> =
                picks.iter().map(|&i| network.accounts()[i]).collect();

            let users = setup_users(&addresses, &handle)?;

            prop_assert_eq!(users.len(), addresses.len());
            for (user, address) in users.iter().zip(&addresses) {
                prop_assert_eq!(user.address, *address);
                prop_assert_eq!(user.signer(), *address);
                prop_assert_eq!(user.contracts().address(), handle.address());
            }
            prop_assert_eq!(handle.signer(), network.accounts()[0]);
        }
    }

    #[test]
    fn fails_on_unknown_account() -> eyre::Result<()> {
        let network = devnet(2);
        let handle = CounterHandle::new(
            Address::ZERO,
            network.client(network.accounts()[0])?,
        );
        let stranger = Address::repeat_byte(0xbb);

        let err = setup_user(stranger, &handle)
            .expect_err("stranger is not an account");
        assert_eq!(err, Error::UnknownAccount(stranger));

        let addresses = [network.accounts()[1], stranger];
        assert!(setup_users(&addresses, &handle).is_err());
        assert!(setup_users(&[], &handle)?.is_empty());
        Ok(())
    }
}
