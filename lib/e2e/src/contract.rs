use std::collections::BTreeMap;

use alloy::primitives::Address;

use crate::{Client, Error, Program};

/// Handle to a deployed contract, bound to the account it signs as.
pub trait Contract: Sized {
    /// Code the handle expects at its address.
    type Program: Program;

    /// Binds a handle to the contract at `address`, signing with `client`.
    fn new(address: Address, client: Client) -> Self;

    /// Address of the contract.
    fn address(&self) -> Address;

    /// Client the handle sends transactions with.
    fn client(&self) -> &Client;

    /// Account the handle signs as.
    fn signer(&self) -> Address {
        self.client().signer()
    }
}

/// Rebinding of contract handles to another signing account.
pub trait Connect: Sized {
    /// Returns an equivalent value whose handles sign as `signer`. `self` is
    /// left untouched.
    ///
    /// # Errors
    ///
    /// Fails if `signer` is not an account of the network.
    fn connect(&self, signer: Address) -> Result<Self, Error>;
}

impl<C: Connect> Connect for BTreeMap<String, C> {
    fn connect(&self, signer: Address) -> Result<Self, Error> {
        self.iter()
            .map(|(name, contract)| {
                contract.connect(signer).map(|contract| (name.clone(), contract))
            })
            .collect()
    }
}

#[macro_export]
/// Declares a contract handle for a [`Program`](crate::Program).
///
/// Methods calling into the program are then added in a regular `impl`
/// block, going through [`Contract::client`].
///
/// # Example
/// ```ignore
/// e2e::contract! {
///     /// Handle to a deployed [`TokenProgram`].
///     pub struct Token => TokenProgram;
/// }
/// ```
macro_rules! contract {
    ($(#[$meta:meta])* $vis:vis struct $name:ident => $program:ty;) => {
        $(#[$meta])*
        #[derive(Clone, Debug)]
        $vis struct $name {
            address: $crate::Address,
            client: $crate::Client,
        }

        impl $crate::Contract for $name {
            type Program = $program;

            fn new(address: $crate::Address, client: $crate::Client) -> Self {
                Self { address, client }
            }

            fn address(&self) -> $crate::Address {
                self.address
            }

            fn client(&self) -> &$crate::Client {
                &self.client
            }
        }

        impl $crate::Connect for $name {
            fn connect(
                &self,
                signer: $crate::Address,
            ) -> ::core::result::Result<Self, $crate::Error> {
                Ok(Self {
                    address: self.address,
                    client: self.client.connect(signer)?,
                })
            }
        }
    };
}

#[macro_export]
/// Declares a bundle of contract handles that is rebound as a whole.
///
/// # Example
/// ```ignore
/// e2e::contracts! {
///     /// Contracts deployed by the `Token` fixture.
///     pub struct TokenContracts {
///         /// The token.
///         pub token: Token,
///     }
/// }
/// ```
macro_rules! contracts {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $($(#[$field_meta:meta])* $field_vis:vis $field:ident: $ty:ty),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug)]
        $vis struct $name {
            $($(#[$field_meta])* $field_vis $field: $ty),*
        }

        impl $crate::Connect for $name {
            fn connect(
                &self,
                signer: $crate::Address,
            ) -> ::core::result::Result<Self, $crate::Error> {
                Ok(Self {
                    $($field: $crate::Connect::connect(&self.$field, signer)?),*
                })
            }
        }
    };
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeMap;

    use alloy::primitives::{Address, U256};

    use crate::{
        devnet::tests::{devnet, Counter},
        Connect, Contract, Error,
    };

    crate::contract! {
        /// Handle to a test counter.
        pub(crate) struct CounterHandle => Counter;
    }

    impl CounterHandle {
        async fn count(&self) -> Result<U256, Error> {
            self.client().call::<Counter, _>(self.address(), Counter::count).await
        }

        async fn increment(&self) -> Result<(), Error> {
            self.client()
                .send::<Counter>(self.address(), Counter::increment)
                .await
                .map(drop)
        }
    }

    crate::contracts! {
        /// Two counters.
        pub(crate) struct Counters {
            pub(crate) first: CounterHandle,
            pub(crate) second: CounterHandle,
        }
    }

    #[tokio::test]
    async fn connected_handles_sign_as_new_account() -> eyre::Result<()> {
        let network = devnet(2);
        let (alice, bob) = (network.accounts()[0], network.accounts()[1]);
        let (_, address) =
            network.deploy::<Counter>(alice, U256::ZERO).await?;

        let handle = CounterHandle::new(address, network.client(alice)?);
        let as_bob = handle.connect(bob)?;

        assert_eq!(handle.signer(), alice);
        assert_eq!(as_bob.signer(), bob);
        assert_eq!(as_bob.address(), address);

        handle.increment().await?;
        let err = as_bob.increment().await.expect_err("bob is not the admin");
        assert!(matches!(err, Error::Revert(_)));
        assert_eq!(as_bob.count().await?, U256::from(1));
        Ok(())
    }

    #[test]
    fn bundles_connect_every_handle() -> eyre::Result<()> {
        let network = devnet(2);
        let (alice, bob) = (network.accounts()[0], network.accounts()[1]);
        let handle = |address| -> eyre::Result<CounterHandle> {
            Ok(CounterHandle::new(address, network.client(alice)?))
        };
        let counters = Counters {
            first: handle(Address::repeat_byte(1))?,
            second: handle(Address::repeat_byte(2))?,
        };

        let as_bob = counters.connect(bob)?;
        assert_eq!(as_bob.first.signer(), bob);
        assert_eq!(as_bob.second.signer(), bob);
        assert_eq!(as_bob.second.address(), Address::repeat_byte(2));
        assert_eq!(counters.first.signer(), alice);

        let by_name = BTreeMap::from([("Counter".to_owned(), counters.first)]);
        let as_bob = by_name.connect(bob)?;
        assert_eq!(as_bob["Counter"].signer(), bob);
        Ok(())
    }

    #[test]
    fn connecting_unknown_accounts_fails() -> eyre::Result<()> {
        let network = devnet(1);
        let handle =
            CounterHandle::new(Address::ZERO, network.client(network.accounts()[0])?);

        let stranger = Address::repeat_byte(0xaa);
        let err = handle.connect(stranger).expect_err("stranger is locked");
        assert_eq!(err, Error::UnknownAccount(stranger));
        Ok(())
    }
}
