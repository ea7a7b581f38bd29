use anyhow::Result;
use async_trait::async_trait;
use ethers::types::{Address, TransactionReceipt, TxHash};
use url::Url;

use crate::types::{Call, ChainId, WalletCapabilities};

/// Capabilities requested alongside a batch of calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchCapabilities {
    pub paymaster_service: Option<Url>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallsStatus {
    Pending,
    Confirmed { transaction_hash: TxHash },
    Failed { reason: String },
}

/// The connected wallet and the chain it talks to.
///
/// Batch methods that a wallet does not implement should fail with an error
/// whose message contains `"this request method is not supported"`; the
/// submission orchestrator treats that as a cue to send calls one by one.
#[async_trait]
pub trait WalletClient: Send + Sync {
    fn account(&self) -> Option<Address>;

    fn chain_id(&self) -> ChainId;

    fn capabilities(&self, chain_id: ChainId) -> WalletCapabilities;

    async fn switch_chain(&self, chain_id: ChainId) -> Result<()>;

    /// Submits `calls` atomically and returns the batch identifier.
    async fn send_calls(&self, calls: &[Call], capabilities: &BatchCapabilities) -> Result<String>;

    async fn get_calls_status(&self, id: &str) -> Result<CallsStatus>;

    async fn send_transaction(&self, call: &Call) -> Result<TxHash>;

    async fn wait_for_receipt(
        &self,
        hash: TxHash,
        chain_id: Option<ChainId>,
    ) -> Result<TransactionReceipt>;
}
