//! Deployment environment: the active network, its accounts, the registry of
//! named deployments and the fixtures built on top of it.
use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    sync::Arc,
};

use alloy::primitives::Address;
use tokio::sync::Mutex;

use crate::{
    account::NamedAccounts,
    config::{Config, LocalNetwork},
    deploy::{DeployOptions, DeployResult, DeployScript, Deployment},
    devnet::{Devnet, Program, SnapshotId},
    Contract, Error,
};

/// Deployments and executed scripts captured when a fixture was taken.
struct Fixture {
    snapshot: SnapshotId,
    deployments: BTreeMap<String, Deployment>,
    executed: BTreeSet<&'static str>,
}

/// Everything a deploy script or a test needs to talk to a network.
pub struct Environment {
    network_name: String,
    compiler: String,
    network: Devnet,
    named_accounts: NamedAccounts,
    unnamed_accounts: Vec<Address>,
    scripts: Vec<Arc<dyn DeployScript>>,
    deployments: Mutex<BTreeMap<String, Deployment>>,
    executed: Mutex<BTreeSet<&'static str>>,
    fixtures: Mutex<HashMap<Vec<String>, Fixture>>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scripts: Vec<_> =
            self.scripts.iter().map(|script| script.id()).collect();
        f.debug_struct("Environment")
            .field("network_name", &self.network_name)
            .field("compiler", &self.compiler)
            .field("network", &self.network)
            .field("named_accounts", &self.named_accounts)
            .field("scripts", &scripts)
            .finish_non_exhaustive()
    }
}

impl Environment {
    /// Starts a fresh in-process network as configured in `config`.
    ///
    /// # Errors
    ///
    /// Fails if the local accounts cannot be derived or do not cover every
    /// named account.
    pub fn local(config: &Config) -> eyre::Result<Self> {
        let network = config.local_network()?;
        Ok(Self::from_network(config, &network)?)
    }

    /// Starts a fresh in-process network with the accounts of `network`.
    ///
    /// # Errors
    ///
    /// Fails if `network` has no accounts or too few for the named accounts.
    pub fn from_network(
        config: &Config,
        network: &LocalNetwork,
    ) -> Result<Self, Error> {
        if network.signers.is_empty() {
            return Err(Error::NoAccounts);
        }

        let devnet = Devnet::new(network.chain_id, &network.signers);
        let named_accounts = NamedAccounts::resolve(
            config.named_accounts(),
            &network.name,
            devnet.accounts(),
        )?;
        let unnamed_accounts = named_accounts.unnamed(devnet.accounts());

        Ok(Self {
            network_name: network.name.clone(),
            compiler: config.compiler().to_owned(),
            network: devnet,
            named_accounts,
            unnamed_accounts,
            scripts: Vec::new(),
            deployments: Mutex::default(),
            executed: Mutex::default(),
            fixtures: Mutex::default(),
        })
    }

    /// Registers a deploy script.
    #[must_use]
    pub fn with_script(mut self, script: impl DeployScript + 'static) -> Self {
        self.scripts.push(Arc::new(script));
        self
    }

    /// Name of the active network.
    #[must_use]
    pub fn network_name(&self) -> &str {
        &self.network_name
    }

    /// Compiler version deployments are recorded with.
    #[must_use]
    pub fn compiler(&self) -> &str {
        &self.compiler
    }

    /// The active network.
    #[must_use]
    pub fn network(&self) -> &Devnet {
        &self.network
    }

    /// Every account of the active network, in order.
    #[must_use]
    pub fn accounts(&self) -> &[Address] {
        self.network.accounts()
    }

    /// Accounts resolved from their role.
    #[must_use]
    pub fn named_accounts(&self) -> &NamedAccounts {
        &self.named_accounts
    }

    /// Accounts without a role, in order.
    #[must_use]
    pub fn unnamed_accounts(&self) -> &[Address] {
        &self.unnamed_accounts
    }

    /// Deploys program `P` under `name`, unless something is already
    /// deployed under that name.
    ///
    /// # Errors
    ///
    /// Fails if the sender is not an account of the network or the
    /// constructor reverts.
    pub async fn deploy<P: Program>(
        &self,
        name: &str,
        options: DeployOptions<P::Constructor>,
    ) -> Result<DeployResult, Error> {
        let mut deployments = self.deployments.lock().await;
        if let Some(deployment) = deployments.get(name) {
            return Ok(DeployResult {
                deployment: deployment.clone(),
                newly_deployed: false,
            });
        }

        let (receipt, address) =
            self.network.deploy::<P>(options.from, options.args).await?;
        let deployment = Deployment {
            name: name.to_owned(),
            address,
            program: P::NAME,
            transaction_hash: receipt.transaction_hash,
            receipt,
            deployer: options.from,
            compiler: self.compiler.clone(),
        };
        deployments.insert(name.to_owned(), deployment.clone());
        Ok(DeployResult { deployment, newly_deployed: true })
    }

    /// The deployment registered under `name`.
    ///
    /// # Errors
    ///
    /// Fails if nothing is deployed under `name`.
    pub async fn get(&self, name: &str) -> Result<Deployment, Error> {
        self.deployments
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownDeployment(name.to_owned()))
    }

    /// Every registered deployment, by name.
    pub async fn all(&self) -> BTreeMap<String, Deployment> {
        self.deployments.lock().await.clone()
    }

    /// Handle to the deployment `name`, signing as the first account.
    ///
    /// # Errors
    ///
    /// Fails if nothing is deployed under `name` or the deployed code is not
    /// the handle's program.
    pub async fn contract<C: Contract>(&self, name: &str) -> Result<C, Error> {
        let deployment = self.get(name).await?;
        let expected = <C::Program as Program>::NAME;
        if deployment.program != expected {
            return Err(Error::ContractNotFound {
                address: deployment.address,
                expected,
            });
        }

        let signer = self.accounts().first().copied().ok_or(Error::NoAccounts)?;
        Ok(C::new(deployment.address, self.network.client(signer)?))
    }

    /// Runs every script tagged with one of `tags`, or every script when
    /// `tags` is empty. Dependencies run first and scripts that already ran
    /// are skipped.
    ///
    /// # Errors
    ///
    /// Fails if a tag matches no script or a script fails.
    pub async fn run_scripts(&self, tags: &[&str]) -> eyre::Result<()> {
        for index in self.plan(tags)? {
            let script = &self.scripts[index];
            if self.executed.lock().await.contains(script.id()) {
                continue;
            }
            script.run(self).await.map_err(|err| {
                err.wrap_err(format!("deploy script `{}` failed", script.id()))
            })?;
            self.executed.lock().await.insert(script.id());
        }
        Ok(())
    }

    /// Orders the scripts selected by `tags` so that dependencies come
    /// first.
    fn plan(&self, tags: &[&str]) -> Result<Vec<usize>, Error> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        if tags.is_empty() {
            for index in 0..self.scripts.len() {
                self.visit(index, &mut seen, &mut order)?;
            }
        }
        for tag in tags {
            for index in self.tagged(tag)? {
                self.visit(index, &mut seen, &mut order)?;
            }
        }
        Ok(order)
    }

    fn visit(
        &self,
        index: usize,
        seen: &mut HashSet<usize>,
        order: &mut Vec<usize>,
    ) -> Result<(), Error> {
        if !seen.insert(index) {
            return Ok(());
        }
        for tag in self.scripts[index].dependencies() {
            for dependency in self.tagged(tag)? {
                self.visit(dependency, seen, order)?;
            }
        }
        order.push(index);
        Ok(())
    }

    fn tagged(&self, tag: &str) -> Result<Vec<usize>, Error> {
        let matching: Vec<_> = self
            .scripts
            .iter()
            .enumerate()
            .filter(|(_, script)| script.tags().contains(&tag))
            .map(|(index, _)| index)
            .collect();
        if matching.is_empty() {
            return Err(Error::UnknownTag(tag.to_owned()));
        }
        Ok(matching)
    }

    /// Brings the network to the state right after the scripts tagged with
    /// `tags` ran.
    ///
    /// The first call runs the scripts and snapshots the result. Later calls
    /// with the same tags revert to that snapshot instead of deploying again.
    /// If the snapshot was consumed by reverting to an earlier one, the
    /// scripts are run again on top of the current state.
    ///
    /// # Errors
    ///
    /// Fails if a tag matches no script or a script fails.
    pub async fn fixture(
        &self,
        tags: &[&str],
    ) -> eyre::Result<BTreeMap<String, Deployment>> {
        let mut key: Vec<String> = tags.iter().map(|&tag| tag.to_owned()).collect();
        key.sort();
        key.dedup();

        let mut fixtures = self.fixtures.lock().await;
        if let Some(fixture) = fixtures.get_mut(&key) {
            if self.network.revert(fixture.snapshot).await {
                fixture.snapshot = self.network.snapshot().await;
                self.executed.lock().await.clone_from(&fixture.executed);
                self.deployments.lock().await.clone_from(&fixture.deployments);
                return Ok(fixture.deployments.clone());
            }
        }

        self.run_scripts(tags).await?;
        let snapshot = self.network.snapshot().await;
        let deployments = self.all().await;
        let executed = self.executed.lock().await.clone();
        fixtures.insert(
            key,
            Fixture { snapshot, deployments: deployments.clone(), executed },
        );
        Ok(deployments)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use alloy::{
        primitives::{Address, U256},
        signers::local::PrivateKeySigner,
    };
    use async_trait::async_trait;

    use super::Environment;
    use crate::{
        config::LocalNetwork,
        contract::tests::CounterHandle,
        deploy::{DeployOptions, DeployScript},
        devnet::{tests::Counter, Context, Program},
        Config, Contract, Error,
    };

    const CONFIG: &str = r#"
        [solidity]
        version = "0.7.3"

        [named_accounts]
        deployer = 0
        admin = 1
    "#;

    /// Deploys `Counter` from `deployer` and counts its runs.
    struct DeployCounter {
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DeployScript for DeployCounter {
        fn id(&self) -> &'static str {
            "deploy_counter"
        }

        fn tags(&self) -> &[&'static str] {
            &["Counter"]
        }

        async fn run(&self, env: &Environment) -> eyre::Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let from = env.named_accounts().get("deployer")?;
            env.deploy::<Counter>(
                "Counter",
                DeployOptions { from, args: U256::from(10) },
            )
            .await?;
            Ok(())
        }
    }

    /// Deploys a second counter, after the first.
    struct DeploySecond {
        order: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DeployScript for DeploySecond {
        fn id(&self) -> &'static str {
            "deploy_second"
        }

        fn tags(&self) -> &[&'static str] {
            &["Second"]
        }

        fn dependencies(&self) -> &[&'static str] {
            &["Counter"]
        }

        async fn run(&self, env: &Environment) -> eyre::Result<()> {
            env.get("Counter").await?;
            self.order.fetch_add(1, Ordering::SeqCst);
            let from = env.named_accounts().get("admin")?;
            env.deploy::<Counter>(
                "Second",
                DeployOptions { from, args: U256::ZERO },
            )
            .await?;
            Ok(())
        }
    }

    /// Script whose run always fails.
    struct Failing {
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DeployScript for Failing {
        fn id(&self) -> &'static str {
            "failing"
        }

        fn tags(&self) -> &[&'static str] {
            &["Broken"]
        }

        async fn run(&self, _env: &Environment) -> eyre::Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            eyre::bail!("boom")
        }
    }

    /// Program that is never deployed under `Counter`.
    struct Other;

    impl Program for Other {
        const NAME: &'static str = "Other";
        type Constructor = ();

        fn construct(_ctx: &mut Context<'_>, (): ()) -> Result<(), Vec<u8>> {
            Ok(())
        }
    }

    crate::contract! {
        /// Handle expecting [`Other`].
        struct OtherHandle => Other;
    }

    fn environment(accounts: usize) -> eyre::Result<Environment> {
        let config = Config::from_toml_str(CONFIG)?;
        let network = LocalNetwork {
            name: "hardhat".to_owned(),
            chain_id: 31337,
            signers: (0..accounts).map(|_| PrivateKeySigner::random()).collect(),
        };
        Ok(Environment::from_network(&config, &network)?)
    }

    #[tokio::test]
    async fn resolves_named_and_unnamed_accounts() -> eyre::Result<()> {
        let env = environment(4)?;
        let accounts = env.accounts();

        assert_eq!(env.named_accounts().get("deployer")?, accounts[0]);
        assert_eq!(env.named_accounts().get("admin")?, accounts[1]);
        assert_eq!(env.unnamed_accounts(), &accounts[2..]);
        assert_eq!(env.compiler(), "0.7.3");
        assert_eq!(env.network_name(), "hardhat");
        assert_eq!(env.network().chain_id(), 31337);
        Ok(())
    }

    #[test]
    fn requires_enough_accounts() -> eyre::Result<()> {
        let err = environment(1).expect_err("admin needs a second account");
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::AccountIndexOutOfRange { index: 1, available: 1, .. })
        ));
        let err = environment(0).expect_err("no accounts at all");
        assert_eq!(err.downcast_ref::<Error>(), Some(&Error::NoAccounts));
        Ok(())
    }

    #[tokio::test]
    async fn deploys_each_name_once() -> eyre::Result<()> {
        let env = environment(2)?;
        let from = env.named_accounts().get("deployer")?;

        let first = env
            .deploy::<Counter>("Counter", DeployOptions { from, args: U256::ZERO })
            .await?;
        let second = env
            .deploy::<Counter>("Counter", DeployOptions { from, args: U256::ZERO })
            .await?;

        assert!(first.newly_deployed);
        assert!(!second.newly_deployed);
        assert_eq!(first.deployment, second.deployment);
        assert_eq!(first.deployment.address, from.create(0));
        assert_eq!(first.deployment.compiler, "0.7.3");
        assert_eq!(env.get("Counter").await?, first.deployment);
        assert_eq!(
            env.get("Missing").await,
            Err(Error::UnknownDeployment("Missing".to_owned()))
        );
        Ok(())
    }

    #[tokio::test]
    async fn binds_handles_to_first_account() -> eyre::Result<()> {
        let env = environment(2)?;
        let from = env.named_accounts().get("admin")?;
        env.deploy::<Counter>("Counter", DeployOptions { from, args: U256::ZERO })
            .await?;

        let counter: CounterHandle = env.contract("Counter").await?;
        assert_eq!(counter.signer(), env.accounts()[0]);
        assert_eq!(counter.address(), from.create(0));
        Ok(())
    }

    #[tokio::test]
    async fn rejects_handles_for_other_programs() -> eyre::Result<()> {
        let env = environment(2)?;
        let from = env.named_accounts().get("deployer")?;
        env.deploy::<Counter>("Counter", DeployOptions { from, args: U256::ZERO })
            .await?;

        let err = env
            .contract::<OtherHandle>("Counter")
            .await
            .expect_err("`Counter` is not an `Other`");
        assert_eq!(
            err,
            Error::ContractNotFound { address: from.create(0), expected: "Other" }
        );

        let err = env
            .contract::<CounterHandle>("Missing")
            .await
            .expect_err("nothing is deployed under `Missing`");
        assert_eq!(err, Error::UnknownDeployment("Missing".to_owned()));
        Ok(())
    }

    #[tokio::test]
    async fn failed_fixtures_report_the_script() -> eyre::Result<()> {
        let attempts = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));
        let env = environment(2)?
            .with_script(Failing { attempts: attempts.clone() })
            .with_script(DeployCounter { runs: runs.clone() });

        let err = env
            .fixture(&["Broken"])
            .await
            .expect_err("the `Broken` script fails");
        assert_eq!(err.to_string(), "deploy script `failing` failed");
        assert_eq!(err.root_cause().to_string(), "boom");

        // A failed script is not recorded as executed.
        env.fixture(&["Broken"]).await.expect_err("the script fails again");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        let deployments = env.fixture(&["Counter"]).await?;
        assert!(deployments.contains_key("Counter"));
        let counter: CounterHandle = env.contract("Counter").await?;
        assert_eq!(counter.address(), deployments["Counter"].address);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn runs_scripts_with_dependencies_once() -> eyre::Result<()> {
        let runs = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(AtomicUsize::new(0));
        let env = environment(2)?
            .with_script(DeploySecond { order: order.clone() })
            .with_script(DeployCounter { runs: runs.clone() });

        env.run_scripts(&["Second"]).await?;
        env.run_scripts(&["Counter", "Second"]).await?;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(order.load(Ordering::SeqCst), 1);
        assert_eq!(env.all().await.len(), 2);

        let err = env
            .run_scripts(&["Missing"])
            .await
            .expect_err("no script is tagged `Missing`");
        assert_eq!(
            err.downcast_ref::<Error>(),
            Some(&Error::UnknownTag("Missing".to_owned()))
        );
        Ok(())
    }

    #[tokio::test]
    async fn fixtures_revert_instead_of_redeploying() -> eyre::Result<()> {
        let runs = Arc::new(AtomicUsize::new(0));
        let env = environment(2)?.with_script(DeployCounter { runs: runs.clone() });

        let deployments = env.fixture(&["Counter"]).await?;
        let counter: CounterHandle = env.contract("Counter").await?;
        assert_eq!(deployments["Counter"].address, counter.address());

        counter
            .client()
            .send::<Counter>(counter.address(), Counter::increment)
            .await?;
        let block = env.network().block_number().await;

        let again = env.fixture(&["Counter"]).await?;
        assert_eq!(again, deployments);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(env.network().block_number().await < block);
        let count = counter
            .client()
            .call::<Counter, _>(counter.address(), Counter::count)
            .await?;
        assert_eq!(count, U256::from(10));
        Ok(())
    }

    #[tokio::test]
    async fn stale_fixtures_run_again() -> eyre::Result<()> {
        let runs = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(AtomicUsize::new(0));
        let env = environment(2)?
            .with_script(DeployCounter { runs: runs.clone() })
            .with_script(DeploySecond { order: order.clone() });

        env.fixture(&["Counter"]).await?;
        env.fixture(&["Second"]).await?;
        assert_eq!(order.load(Ordering::SeqCst), 1);

        // Going back to the first fixture consumes the second snapshot.
        let first = env.fixture(&["Counter"]).await?;
        assert!(!first.contains_key("Second"));
        assert_eq!(env.get("Second").await.ok(), None);

        let second = env.fixture(&["Second"]).await?;
        assert!(second.contains_key("Second"));
        assert_eq!(order.load(Ordering::SeqCst), 2);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_ne!(second["Second"].address, Address::ZERO);
        Ok(())
    }
}
