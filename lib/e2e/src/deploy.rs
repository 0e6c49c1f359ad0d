use alloy::primitives::{Address, TxHash};
use async_trait::async_trait;

use crate::{Environment, Receipt};

/// A deployment step, run at most once per [`Environment`].
///
/// Scripts are selected by tag, see [`Environment::run_scripts`] and
/// [`Environment::fixture`].
#[async_trait]
pub trait DeployScript: Send + Sync {
    /// Unique name of the script.
    fn id(&self) -> &'static str;

    /// Tags selecting the script.
    fn tags(&self) -> &[&'static str];

    /// Tags of the scripts that must run before this one.
    fn dependencies(&self) -> &[&'static str] {
        &[]
    }

    /// Performs the deployment.
    ///
    /// # Errors
    ///
    /// Any error aborts the run it is part of.
    async fn run(&self, env: &Environment) -> eyre::Result<()>;
}

/// How to deploy a contract.
#[derive(Clone, Debug)]
pub struct DeployOptions<A> {
    /// Account sending the deployment transaction.
    pub from: Address,
    /// Constructor arguments.
    pub args: A,
}

/// A contract deployed under a name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Deployment {
    /// Name the deployment is registered under.
    pub name: String,
    /// Address of the contract.
    pub address: Address,
    /// Program deployed at [`Deployment::address`].
    pub program: &'static str,
    /// Hash of the deployment transaction.
    pub transaction_hash: TxHash,
    /// Receipt of the deployment transaction.
    pub receipt: Receipt,
    /// Account that sent the deployment transaction.
    pub deployer: Address,
    /// Compiler version of the project.
    pub compiler: String,
}

/// Outcome of [`Environment::deploy`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeployResult {
    /// The deployment registered under the requested name.
    pub deployment: Deployment,
    /// `false` when the name was already deployed and nothing was sent.
    pub newly_deployed: bool,
}
