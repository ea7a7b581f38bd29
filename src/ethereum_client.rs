use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{
    Address, BlockNumber, Eip1559TransactionRequest, TransactionReceipt, TxHash, U64,
};
use log::{debug, info};
use std::time::Duration;
use url::Url;

use crate::errors::METHOD_NOT_SUPPORTED_ERROR_SUBSTRING;
use crate::types::{Call, ChainId, WalletCapabilities};
use crate::wallet::{BatchCapabilities, CallsStatus, WalletClient};

const RECEIPT_TIMEOUT: Duration = Duration::from_secs(300);

pub type SigningClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Wallet backed by a local private key and a JSON-RPC node. It signs plain
/// EIP-1559 transactions; atomic batching is not available.
pub struct EthereumClient {
    inner_client: SigningClient,
    chain_id: ChainId,
    polling_interval: Duration,
}

impl EthereumClient {
    /// Connects to `rpc_url` and reads the chain id from the node.
    pub async fn new(rpc_url: &Url, private_key: &str, polling_interval: Duration) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url.as_str())?;
        let chain_id = provider
            .get_chainid()
            .await
            .context("unable to read chain id from node")?
            .as_u64();
        Self::with_chain_id(rpc_url, private_key, chain_id, polling_interval)
    }

    pub fn with_chain_id(
        rpc_url: &Url,
        private_key: &str,
        chain_id: ChainId,
        polling_interval: Duration,
    ) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url.as_str())?.interval(polling_interval);
        let signer = private_key
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .context("unable to parse private key")?
            .with_chain_id(chain_id);

        Ok(Self {
            inner_client: SignerMiddleware::new(provider, signer),
            chain_id,
            polling_interval,
        })
    }

    pub async fn get_latest_block_number(&self) -> Result<u64> {
        self.inner_client
            .get_block(BlockNumber::Latest)
            .await?
            .ok_or(anyhow!("Error fetching latest block."))?
            .number
            .ok_or(anyhow!("Error extracting number from latest block."))
            .map(|block_num: U64| block_num.as_u64())
    }

    async fn poll_receipt(&self, hash: TxHash) -> Result<TransactionReceipt> {
        loop {
            match self.inner_client.get_transaction_receipt(hash).await? {
                Some(receipt) => return Ok(receipt),
                None => {
                    debug!("receipt for {:?} not available yet", hash);
                    tokio::time::sleep(self.polling_interval).await;
                }
            }
        }
    }
}

#[async_trait]
impl WalletClient for EthereumClient {
    fn account(&self) -> Option<Address> {
        Some(self.inner_client.address())
    }

    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    fn capabilities(&self, _chain_id: ChainId) -> WalletCapabilities {
        WalletCapabilities::default()
    }

    async fn switch_chain(&self, chain_id: ChainId) -> Result<()> {
        if chain_id == self.chain_id {
            return Ok(());
        }
        Err(anyhow!(
            "node is on chain {} and cannot switch to chain {}",
            self.chain_id,
            chain_id
        ))
    }

    async fn send_calls(
        &self,
        _calls: &[Call],
        _capabilities: &BatchCapabilities,
    ) -> Result<String> {
        Err(anyhow!("wallet_sendCalls: {}", METHOD_NOT_SUPPORTED_ERROR_SUBSTRING))
    }

    async fn get_calls_status(&self, _id: &str) -> Result<CallsStatus> {
        Err(anyhow!("wallet_getCallsStatus: {}", METHOD_NOT_SUPPORTED_ERROR_SUBSTRING))
    }

    async fn send_transaction(&self, call: &Call) -> Result<TxHash> {
        let tx = Eip1559TransactionRequest::new()
            .to(call.to)
            .data(call.data.clone())
            .value(call.value)
            .chain_id(self.chain_id);

        let pending = self.inner_client.send_transaction(tx, None).await?;
        let hash = pending.tx_hash();
        info!("broadcast transaction {:?}", hash);
        Ok(hash)
    }

    async fn wait_for_receipt(
        &self,
        hash: TxHash,
        chain_id: Option<ChainId>,
    ) -> Result<TransactionReceipt> {
        if let Some(chain_id) = chain_id.filter(|id| *id != self.chain_id) {
            return Err(anyhow!(
                "receipt requested on chain {} but node is on chain {}",
                chain_id,
                self.chain_id
            ));
        }

        tokio::time::timeout(RECEIPT_TIMEOUT, self.poll_receipt(hash))
            .await
            .map_err(|_| anyhow!("timed out waiting for receipt of {:?}", hash))?
    }
}
