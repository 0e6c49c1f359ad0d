//! A fixed-supply token: the whole supply is minted to an owner chosen at
//! deployment and moves between accounts through [`Token::transfer`].
//!
//! State follows Solidity's storage layout. `name` and `symbol` are
//! constants, so slots 0 and 1 stay empty. Transfers revert with
//! `Not enough tokens` when the sender's balance is too low.
use alloy::{
    primitives::{uint, Address, U256},
    sol,
};
use e2e::{
    require,
    storage::{StorageAddress, StorageMap, StorageU256},
    Context, Contract, Error, Program, Receipt,
};

sol! {
    /// Emitted when `value` tokens are moved from one account (`from`) to
    /// another (`to`).
    #[derive(Debug, PartialEq)]
    #[allow(missing_docs)]
    event Transfer(address indexed from, address indexed to, uint256 value);
}

/// Name of the token.
pub const NAME: &str = "My Hardhat Token";
/// Symbol of the token.
pub const SYMBOL: &str = "MHT";
/// Number of tokens minted to the owner at deployment.
pub const TOTAL_SUPPLY: U256 = uint!(1_000_000_U256);
/// Revert reason of a transfer exceeding the sender's balance.
pub const NOT_ENOUGH_TOKENS: &str = "Not enough tokens";

const TOTAL_SUPPLY_SLOT: StorageU256 = StorageU256::new(uint!(2_U256));
const OWNER: StorageAddress = StorageAddress::new(uint!(3_U256));
const BALANCES: StorageMap<Address, U256> = StorageMap::new(uint!(4_U256));

/// Code of the `Token` contract.
#[derive(Debug)]
pub struct TokenProgram;

impl Program for TokenProgram {
    const NAME: &'static str = "Token";

    /// The owner receiving the whole supply.
    type Constructor = Address;

    fn construct(ctx: &mut Context<'_>, owner: Address) -> Result<(), Vec<u8>> {
        let storage = ctx.storage_mut();
        TOTAL_SUPPLY_SLOT.set(storage, &TOTAL_SUPPLY);
        BALANCES.set(storage, &owner, &TOTAL_SUPPLY);
        OWNER.set(storage, &owner);
        Ok(())
    }
}

impl TokenProgram {
    /// Number of tokens in existence.
    #[must_use]
    pub fn total_supply(ctx: &Context<'_>) -> U256 {
        TOTAL_SUPPLY_SLOT.get(ctx.storage())
    }

    /// Account the supply was minted to.
    #[must_use]
    pub fn owner(ctx: &Context<'_>) -> Address {
        OWNER.get(ctx.storage())
    }

    /// Number of tokens held by `account`.
    #[must_use]
    pub fn balance_of(ctx: &Context<'_>, account: Address) -> U256 {
        BALANCES.get(ctx.storage(), &account)
    }

    /// Moves `amount` tokens from the caller to `to`.
    ///
    /// # Errors
    ///
    /// Reverts with [`NOT_ENOUGH_TOKENS`] if the caller holds less than
    /// `amount`.
    pub fn transfer(
        ctx: &mut Context<'_>,
        to: Address,
        amount: U256,
    ) -> Result<(), Vec<u8>> {
        let from = ctx.msg_sender();
        let balance = BALANCES.get(ctx.storage(), &from);
        require(balance >= amount, NOT_ENOUGH_TOKENS)?;

        BALANCES.set(ctx.storage_mut(), &from, &(balance - amount));
        let received = BALANCES.get(ctx.storage(), &to).wrapping_add(amount);
        BALANCES.set(ctx.storage_mut(), &to, &received);

        ctx.emit(&Transfer { from, to, value: amount });
        Ok(())
    }
}

e2e::contract! {
    /// Handle to a deployed [`TokenProgram`].
    pub struct Token => TokenProgram;
}

impl Token {
    /// Name of the token.
    ///
    /// # Errors
    ///
    /// Fails if no token is deployed at the handle's address.
    pub async fn name(&self) -> Result<String, Error> {
        self.client()
            .call::<TokenProgram, _>(self.address(), |_| Ok(NAME.to_owned()))
            .await
    }

    /// Symbol of the token.
    ///
    /// # Errors
    ///
    /// Fails if no token is deployed at the handle's address.
    pub async fn symbol(&self) -> Result<String, Error> {
        self.client()
            .call::<TokenProgram, _>(self.address(), |_| Ok(SYMBOL.to_owned()))
            .await
    }

    /// Number of tokens in existence.
    ///
    /// # Errors
    ///
    /// Fails if no token is deployed at the handle's address.
    pub async fn total_supply(&self) -> Result<U256, Error> {
        self.client()
            .call::<TokenProgram, _>(self.address(), |ctx| {
                Ok(TokenProgram::total_supply(ctx))
            })
            .await
    }

    /// Account the supply was minted to.
    ///
    /// # Errors
    ///
    /// Fails if no token is deployed at the handle's address.
    pub async fn owner(&self) -> Result<Address, Error> {
        self.client()
            .call::<TokenProgram, _>(self.address(), |ctx| {
                Ok(TokenProgram::owner(ctx))
            })
            .await
    }

    /// Number of tokens held by `account`.
    ///
    /// # Errors
    ///
    /// Fails if no token is deployed at the handle's address.
    pub async fn balance_of(&self, account: Address) -> Result<U256, Error> {
        self.client()
            .call::<TokenProgram, _>(self.address(), |ctx| {
                Ok(TokenProgram::balance_of(ctx, account))
            })
            .await
    }

    /// Sends `amount` tokens from the handle's signer to `to`.
    ///
    /// # Errors
    ///
    /// Fails with a revert if the signer holds less than `amount`.
    pub async fn transfer(
        &self,
        to: Address,
        amount: U256,
    ) -> Result<Receipt, Error> {
        self.client()
            .send::<TokenProgram>(self.address(), |ctx| {
                TokenProgram::transfer(ctx, to, amount)
            })
            .await
    }
}
