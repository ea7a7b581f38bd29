use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use swapflow::configuration::{
    collect_optional_environment_variable, collect_required_environment_variable, get_config,
    init_config, Configuration,
};
use swapflow::{
    EthereumClient, HttpSwapApi, LifecycleCallbacks, Side, SwapSession, SwapSettings, Token,
};

/// Quote a swap between two tokens and, when asked to, execute it.
///
/// Besides the configuration variables, the run is driven by:
/// - `PRIVATE_KEY`: key of the account that signs the swap
/// - `SWAP_FROM_TOKEN` / `SWAP_TO_TOKEN`: tokens as JSON, e.g.
///   `{"address":"","symbol":"ETH","name":"ETH","chainId":8453,"decimals":18}`
/// - `SWAP_AMOUNT`: amount of the from token, in whole units
/// - `SWAP_EXECUTE`: `true` to submit the swap after quoting
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    info!("=== SWAPFLOW STARTING ===");

    if let Err(err) = run().await {
        error!("ERROR: {:?}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = Configuration::get_from_environment()?;
    init_config(config);
    let config = get_config();

    let rpc_url = config
        .rpc_url
        .clone()
        .ok_or(anyhow!("`RPC_URL` must be set to submit swaps"))?;
    let private_key = collect_required_environment_variable("PRIVATE_KEY")?;
    let from = parse_token("SWAP_FROM_TOKEN")?;
    let to = parse_token("SWAP_TO_TOKEN")?;
    let amount = collect_required_environment_variable("SWAP_AMOUNT")?;
    let execute = collect_optional_environment_variable("SWAP_EXECUTE")?
        .map(|var| var.parse::<bool>())
        .transpose()?
        .unwrap_or(false);

    let wallet =
        Arc::new(EthereumClient::new(&rpc_url, &private_key, config.polling_interval()).await?);
    info!(
        "connected to chain {} at block {}",
        config.chain_id,
        wallet.get_latest_block_number().await?
    );

    let callbacks = LifecycleCallbacks::new()
        .on_status(|status| match serde_json::to_string(&status) {
            Ok(json) => info!("status: {}", json),
            Err(err) => warn!("unable to serialize status: {:?}", err),
        })
        .on_error(|error| error!("swap failed: {:?}", error))
        .on_success(|outcome| {
            info!("swap succeeded with hashes {:?}", outcome.transaction_hashes)
        });

    let session = SwapSession::new(
        Arc::new(HttpSwapApi::new()),
        wallet,
        SwapSettings::from(&config),
        callbacks,
    )
    .with_tokens(Some(from), Some(to));

    session
        .handle_amount_change(Side::From, &amount, None, None)
        .await;
    info!(
        "quoted {} {} -> {} {}",
        session.side(Side::From).amount,
        session.side(Side::From).token.map(|token| token.symbol).unwrap_or_default(),
        session.side(Side::To).amount,
        session.side(Side::To).token.map(|token| token.symbol).unwrap_or_default(),
    );

    if execute {
        session.handle_submit().await;
    }

    session.teardown();
    Ok(())
}

fn parse_token(key: &str) -> Result<Token> {
    let raw = collect_required_environment_variable(key)?;
    serde_json::from_str(&raw).map_err(|err| anyhow!("`{}` is not a valid token: {}", key, err))
}
