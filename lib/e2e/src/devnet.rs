//! In-process development network.
//!
//! [`Devnet`] stands in for the ephemeral node a development framework spins
//! up when no network is selected: a fixed set of unlocked accounts, instant
//! mining (one block per transaction) and `evm_snapshot`/`evm_revert` style
//! state snapshots. Contract code is Rust: a [`Program`] runs against the
//! word storage of its address through a [`Context`].
use std::{collections::HashMap, fmt, sync::Arc};

use alloy::{
    primitives::{keccak256, Address, Bytes, Log, TxHash},
    signers::local::PrivateKeySigner,
    sol_types::{Revert, SolError, SolEvent},
};
use tokio::sync::Mutex;

use crate::{storage::Storage, Error, Receipt};

/// Contract code that can be deployed on a [`Devnet`].
pub trait Program {
    /// Name identifying the code, e.g. `Token`.
    const NAME: &'static str;

    /// Constructor arguments.
    type Constructor;

    /// Initializes the storage of a freshly created contract.
    ///
    /// # Errors
    ///
    /// Returns ABI-encoded revert data if the constructor reverts.
    fn construct(
        ctx: &mut Context<'_>,
        args: Self::Constructor,
    ) -> Result<(), Vec<u8>>;
}

/// Execution context handed to a [`Program`] for the duration of one call.
pub struct Context<'a> {
    sender: Address,
    address: Address,
    storage: &'a mut Storage,
    logs: &'a mut Vec<Log>,
}

impl<'a> Context<'a> {
    fn new(
        sender: Address,
        address: Address,
        storage: &'a mut Storage,
        logs: &'a mut Vec<Log>,
    ) -> Self {
        Self { sender, address, storage, logs }
    }

    /// Address of the account that called the program.
    #[must_use]
    pub fn msg_sender(&self) -> Address {
        self.sender
    }

    /// Address of the running program.
    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// Storage of the running program.
    #[must_use]
    pub fn storage(&self) -> &Storage {
        &*self.storage
    }

    /// Mutable storage of the running program.
    pub fn storage_mut(&mut self) -> &mut Storage {
        &mut *self.storage
    }

    /// Emits `event` from the running program.
    pub fn emit<E: SolEvent>(&mut self, event: &E) {
        self.logs.push(Log { address: self.address, data: event.encode_log_data() });
    }
}

/// Solidity's `require(condition, reason)`: reverts with `Error(reason)`.
///
/// # Errors
///
/// Returns the ABI-encoded `Error(string)` revert data if `condition` is
/// false.
pub fn require(condition: bool, reason: &str) -> Result<(), Vec<u8>> {
    if condition {
        Ok(())
    } else {
        Err(Revert { reason: reason.to_owned() }.abi_encode())
    }
}

/// Identifier of a state snapshot taken with [`Devnet::snapshot`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SnapshotId(u64);

/// Chain state that snapshots capture.
#[derive(Clone, Debug, Default)]
struct ChainState {
    block_number: u64,
    nonces: HashMap<Address, u64>,
    code: HashMap<Address, &'static str>,
    storage: HashMap<Address, Storage>,
}

impl ChainState {
    fn nonce(&self, address: Address) -> u64 {
        self.nonces.get(&address).copied().unwrap_or_default()
    }

    fn ensure_code(
        &self,
        address: Address,
        expected: &'static str,
    ) -> Result<(), Error> {
        match self.code.get(&address) {
            Some(&name) if name == expected => Ok(()),
            _ => Err(Error::ContractNotFound { address, expected }),
        }
    }

    /// Includes a successful transaction from `from` in a new block.
    fn mine(
        &mut self,
        from: Address,
        to: Option<Address>,
        contract_address: Option<Address>,
        logs: Vec<Log>,
    ) -> Receipt {
        let nonce = self.nonces.entry(from).or_default();
        let transaction_hash = transaction_hash(from, *nonce);
        *nonce += 1;
        self.block_number += 1;

        Receipt {
            transaction_hash,
            block_number: self.block_number,
            from,
            to,
            contract_address,
            logs,
        }
    }
}

/// Transactions are identified by their sender and nonce.
fn transaction_hash(from: Address, nonce: u64) -> TxHash {
    let mut preimage = [0u8; 28];
    preimage[..20].copy_from_slice(from.as_slice());
    preimage[20..].copy_from_slice(&nonce.to_be_bytes());
    keccak256(preimage)
}

struct Inner {
    state: ChainState,
    snapshots: Vec<(SnapshotId, ChainState)>,
    last_snapshot: u64,
}

/// Handle to an in-process network. Clones share the same chain.
#[derive(Clone)]
pub struct Devnet {
    chain_id: u64,
    addresses: Arc<[Address]>,
    inner: Arc<Mutex<Inner>>,
}

impl fmt::Debug for Devnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Devnet")
            .field("chain_id", &self.chain_id)
            .field("accounts", &self.addresses.len())
            .finish_non_exhaustive()
    }
}

impl Devnet {
    /// Starts an empty chain whose unlocked accounts are those of `signers`,
    /// in order.
    #[must_use]
    pub fn new(chain_id: u64, signers: &[PrivateKeySigner]) -> Self {
        let addresses = signers.iter().map(PrivateKeySigner::address).collect();
        let inner = Inner {
            state: ChainState::default(),
            snapshots: Vec::new(),
            last_snapshot: 0,
        };
        Self {
            chain_id,
            addresses,
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Chain identifier.
    #[must_use]
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Addresses of the unlocked accounts, in derivation order.
    #[must_use]
    pub fn accounts(&self) -> &[Address] {
        &self.addresses
    }

    /// Whether the network can sign for `address`.
    #[must_use]
    pub fn has_account(&self, address: Address) -> bool {
        self.addresses.contains(&address)
    }

    /// A client that sends transactions as `signer`.
    ///
    /// # Errors
    ///
    /// Fails if `signer` is not an account of this network.
    pub fn client(&self, signer: Address) -> Result<Client, Error> {
        self.ensure_account(signer)?;
        Ok(Client { network: self.clone(), signer })
    }

    fn ensure_account(&self, address: Address) -> Result<(), Error> {
        if self.has_account(address) {
            Ok(())
        } else {
            Err(Error::UnknownAccount(address))
        }
    }

    /// Current block number. Each mined transaction adds one block.
    pub async fn block_number(&self) -> u64 {
        self.inner.lock().await.state.block_number
    }

    /// Number of transactions mined from `address`.
    pub async fn nonce(&self, address: Address) -> u64 {
        self.inner.lock().await.state.nonce(address)
    }

    /// Name of the program deployed at `address`, if any.
    pub async fn code_at(&self, address: Address) -> Option<&'static str> {
        self.inner.lock().await.state.code.get(&address).copied()
    }

    /// Deploys program `P` from `from`, at the `CREATE` address of `from` and
    /// its current nonce.
    ///
    /// # Errors
    ///
    /// Fails if `from` is not an account of this network or if the
    /// constructor reverts. A failed deployment leaves the chain untouched.
    pub async fn deploy<P: Program>(
        &self,
        from: Address,
        args: P::Constructor,
    ) -> Result<(Receipt, Address), Error> {
        self.ensure_account(from)?;
        let mut inner = self.inner.lock().await;
        let state = &mut inner.state;

        let address = from.create(state.nonce(from));
        let mut storage = Storage::default();
        let mut logs = Vec::new();
        P::construct(
            &mut Context::new(from, address, &mut storage, &mut logs),
            args,
        )
        .map_err(|data| Error::Revert(Bytes::from(data)))?;

        state.code.insert(address, P::NAME);
        state.storage.insert(address, storage);
        let receipt = state.mine(from, None, Some(address), logs);
        Ok((receipt, address))
    }

    /// Runs a read-only call of program `P` at `to`. Nothing is committed,
    /// not even writes `f` makes.
    ///
    /// # Errors
    ///
    /// Fails if there is no `P` at `to` or if the call reverts.
    pub async fn call<P, T, F>(
        &self,
        from: Address,
        to: Address,
        f: F,
    ) -> Result<T, Error>
    where
        P: Program,
        F: FnOnce(&mut Context<'_>) -> Result<T, Vec<u8>>,
    {
        let inner = self.inner.lock().await;
        inner.state.ensure_code(to, P::NAME)?;

        let mut scratch =
            inner.state.storage.get(&to).cloned().unwrap_or_default();
        let mut logs = Vec::new();
        f(&mut Context::new(from, to, &mut scratch, &mut logs))
            .map_err(|data| Error::Revert(Bytes::from(data)))
    }

    /// Sends a transaction from `from` calling program `P` at `to`.
    ///
    /// `f` runs against a scratch copy of the contract storage; storage,
    /// logs and the sender's nonce are committed only if it succeeds.
    ///
    /// # Errors
    ///
    /// Fails if `from` is not an account of this network, if there is no
    /// `P` at `to` or if the call reverts.
    pub async fn send<P, F>(
        &self,
        from: Address,
        to: Address,
        f: F,
    ) -> Result<Receipt, Error>
    where
        P: Program,
        F: FnOnce(&mut Context<'_>) -> Result<(), Vec<u8>>,
    {
        self.ensure_account(from)?;
        let mut inner = self.inner.lock().await;
        let state = &mut inner.state;
        state.ensure_code(to, P::NAME)?;

        let mut scratch = state.storage.get(&to).cloned().unwrap_or_default();
        let mut logs = Vec::new();
        f(&mut Context::new(from, to, &mut scratch, &mut logs))
            .map_err(|data| Error::Revert(Bytes::from(data)))?;

        state.storage.insert(to, scratch);
        Ok(state.mine(from, Some(to), None, logs))
    }

    /// Captures the current chain state.
    pub async fn snapshot(&self) -> SnapshotId {
        let mut inner = self.inner.lock().await;
        inner.last_snapshot += 1;
        let id = SnapshotId(inner.last_snapshot);
        let state = inner.state.clone();
        inner.snapshots.push((id, state));
        id
    }

    /// Restores the state captured by `id`.
    ///
    /// The snapshot is consumed together with every snapshot taken after it.
    /// Returns `false` if `id` is unknown or was already consumed.
    pub async fn revert(&self, id: SnapshotId) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(position) =
            inner.snapshots.iter().position(|(taken, _)| *taken == id)
        else {
            return false;
        };

        let mut consumed = inner.snapshots.split_off(position);
        let (_, state) = consumed.swap_remove(0);
        inner.state = state;
        true
    }
}

/// Connection to a [`Devnet`] that signs as one account.
#[derive(Clone, Debug)]
pub struct Client {
    network: Devnet,
    signer: Address,
}

impl Client {
    /// Account this client sends transactions as.
    #[must_use]
    pub fn signer(&self) -> Address {
        self.signer
    }

    /// Network this client is connected to.
    #[must_use]
    pub fn network(&self) -> &Devnet {
        &self.network
    }

    /// An equivalent client that signs as `signer`. `self` is unchanged.
    ///
    /// # Errors
    ///
    /// Fails if `signer` is not an account of the network.
    pub fn connect(&self, signer: Address) -> Result<Self, Error> {
        self.network.client(signer)
    }

    /// Read-only call of program `P` at `to`, as this client's signer.
    ///
    /// # Errors
    ///
    /// See [`Devnet::call`].
    pub async fn call<P, T>(
        &self,
        to: Address,
        f: impl FnOnce(&mut Context<'_>) -> Result<T, Vec<u8>>,
    ) -> Result<T, Error>
    where
        P: Program,
    {
        self.network.call::<P, _, _>(self.signer, to, f).await
    }

    /// Transaction calling program `P` at `to`, signed by this client's
    /// signer.
    ///
    /// # Errors
    ///
    /// See [`Devnet::send`].
    pub async fn send<P>(
        &self,
        to: Address,
        f: impl FnOnce(&mut Context<'_>) -> Result<(), Vec<u8>>,
    ) -> Result<Receipt, Error>
    where
        P: Program,
    {
        self.network.send::<P, _>(self.signer, to, f).await
    }
}
