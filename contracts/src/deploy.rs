use async_trait::async_trait;
use e2e::{DeployOptions, DeployScript, Environment};

use crate::{token::TokenProgram, DEPLOYER, TOKEN, TOKEN_OWNER};

/// Deploys `Token` from the `deployer` account, minting the supply to
/// `tokenOwner`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeployToken;

#[async_trait]
impl DeployScript for DeployToken {
    fn id(&self) -> &'static str {
        "deploy_token"
    }

    fn tags(&self) -> &[&'static str] {
        &[TOKEN]
    }

    async fn run(&self, env: &Environment) -> eyre::Result<()> {
        let named = env.named_accounts();
        let from = named.get(DEPLOYER)?;
        let owner = named.get(TOKEN_OWNER)?;

        env.deploy::<TokenProgram>(TOKEN, DeployOptions { from, args: owner })
            .await?;
        Ok(())
    }
}
