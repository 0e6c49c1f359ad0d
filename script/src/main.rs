//! Prints what a configured network resolves to.
//!
//! ```bash
//! cargo run -p token-script -- rinkeby
//! ```
//!
//! Without an argument the default network is used. Remote networks read
//! their credentials from the environment and report the gas-token balance of
//! every named account.
use alloy::{
    primitives::{utils::format_ether, Address},
    providers::{Provider, ProviderBuilder},
};
use e2e::{Config, NetworkTarget};
use eyre::{bail, Context};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let network = std::env::args().nth(1);
    let config = token_contracts::config()?;
    let target = config
        .network(network.as_deref())
        .wrap_err("failed to select network")?;
    let accounts: Vec<Address> =
        target.signers().iter().map(|signer| signer.address()).collect();

    println!("network:  {}", target.name());
    println!("compiler: {}", config.compiler());

    match &target {
        NetworkTarget::Local(local) => {
            println!("endpoint: in-process, chain id {}", local.chain_id);
            for (role, address) in named(config, target.name(), &accounts) {
                println!("{role:>12}: {}", display(address));
            }
        }
        NetworkTarget::Remote(remote) => {
            let provider = ProviderBuilder::new().on_http(remote.url.clone());
            let chain_id = provider
                .get_chain_id()
                .await
                .wrap_err("failed to query chain id")?;
            if let Some(expected) = remote.chain_id {
                if chain_id != expected {
                    bail!("expected chain id {expected}, endpoint reports {chain_id}");
                }
            }
            // The path may carry an API key.
            let host = remote.url.host_str().unwrap_or_default();
            println!("endpoint: {host}, chain id {chain_id}");

            for (role, address) in named(config, target.name(), &accounts) {
                let Some(address) = address else {
                    println!("{role:>12}: {}", display(None));
                    continue;
                };
                let balance = provider
                    .get_balance(address)
                    .await
                    .wrap_err(format!("failed to get balance of {address}"))?;
                println!("{role:>12}: {address} ({} ETH)", format_ether(balance));
            }
        }
    }

    Ok(())
}

/// Named accounts of `network`, `None` when the network has too few
/// accounts for the role's index.
fn named<'a>(
    config: &'a Config,
    network: &'a str,
    accounts: &'a [Address],
) -> impl Iterator<Item = (&'a str, Option<Address>)> {
    config.named_accounts().iter().map(move |account| {
        let address = accounts.get(account.index_for(network)).copied();
        (account.role(), address)
    })
}

fn display(address: Option<Address>) -> String {
    address.map_or_else(|| "unavailable".to_owned(), |address| address.to_string())
}
