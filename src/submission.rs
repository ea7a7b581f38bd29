//! Chain switching, batched and sequential submission, and receipt waiting.

use anyhow::{anyhow, Context, Result};
use ethers::types::{TransactionReceipt, TxHash};
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;

use crate::types::{Call, ChainId, WalletCapabilities};
use crate::wallet::{BatchCapabilities, CallsStatus, WalletClient};

/// How a submission attempt sends its calls. Resolved once per attempt from
/// the wallet's declared capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionMode {
    Batched,
    Sequential,
}

impl SubmissionMode {
    pub fn resolve(capabilities: WalletCapabilities) -> Self {
        if capabilities.atomic_batch {
            SubmissionMode::Batched
        } else {
            SubmissionMode::Sequential
        }
    }
}

pub struct Submitter {
    wallet: Arc<dyn WalletClient>,
    polling_interval: Duration,
}

impl Submitter {
    pub fn new(wallet: Arc<dyn WalletClient>, polling_interval: Duration) -> Self {
        Self {
            wallet,
            polling_interval,
        }
    }

    pub fn wallet(&self) -> &Arc<dyn WalletClient> {
        &self.wallet
    }

    pub fn mode(&self, chain_id: ChainId) -> SubmissionMode {
        SubmissionMode::resolve(self.wallet.capabilities(chain_id))
    }

    /// Paymaster capability for a batch, only when the wallet supports it.
    pub fn batch_capabilities(
        &self,
        chain_id: ChainId,
        paymaster: Option<&url::Url>,
    ) -> BatchCapabilities {
        let supported = self.wallet.capabilities(chain_id).paymaster_service;
        BatchCapabilities {
            paymaster_service: paymaster.filter(|_| supported).cloned(),
        }
    }

    pub async fn ensure_chain(&self, chain_id: ChainId) -> Result<()> {
        let active = self.wallet.chain_id();
        if active == chain_id {
            return Ok(());
        }

        info!("switching chain from {} to {}", active, chain_id);
        self.wallet
            .switch_chain(chain_id)
            .await
            .with_context(|| format!("unable to switch to chain {}", chain_id))
    }

    /// Sends `calls` as one atomic batch and waits for the wallet to report
    /// the resulting transaction hash.
    pub async fn submit_batch(
        &self,
        calls: &[Call],
        capabilities: &BatchCapabilities,
    ) -> Result<TxHash> {
        let id = self.wallet.send_calls(calls, capabilities).await?;
        info!("submitted batch {} with {} calls", id, calls.len());

        loop {
            match self.wallet.get_calls_status(&id).await? {
                CallsStatus::Confirmed { transaction_hash } => {
                    info!("batch {} landed in {:?}", id, transaction_hash);
                    return Ok(transaction_hash);
                }
                CallsStatus::Failed { reason } => {
                    return Err(anyhow!("batch {} failed: {}", id, reason));
                }
                CallsStatus::Pending => {
                    debug!("batch {} still pending", id);
                    tokio::time::sleep(self.polling_interval).await;
                }
            }
        }
    }

    pub async fn submit_one(&self, call: &Call) -> Result<TxHash> {
        let hash = self.wallet.send_transaction(call).await?;
        info!("sent transaction {:?} to {:?}", hash, call.to);
        Ok(hash)
    }

    /// Sends `calls` one at a time in order and stops at the first failure.
    /// `on_hash` sees the hashes collected so far after every send.
    pub async fn submit_sequential(
        &self,
        calls: &[Call],
        mut on_hash: impl FnMut(&[TxHash]) + Send,
    ) -> Result<Vec<TxHash>> {
        let mut hashes = Vec::with_capacity(calls.len());
        for (index, call) in calls.iter().enumerate() {
            let hash = self
                .submit_one(call)
                .await
                .with_context(|| format!("unable to send call {} of {}", index + 1, calls.len()))?;
            hashes.push(hash);
            on_hash(&hashes);
        }
        Ok(hashes)
    }

    pub async fn wait_for_receipt(
        &self,
        hash: TxHash,
        chain_id: ChainId,
    ) -> Result<TransactionReceipt> {
        self.wallet
            .wait_for_receipt(hash, Some(chain_id))
            .await
            .with_context(|| format!("unable to get receipt for {:?}", hash))
    }

    /// Waits for every receipt individually. Receipts that cannot be fetched
    /// are logged and left out of the result.
    pub async fn collect_receipts(
        &self,
        hashes: &[TxHash],
        chain_id: ChainId,
    ) -> Vec<TransactionReceipt> {
        let mut receipts = Vec::with_capacity(hashes.len());
        for hash in hashes {
            match self.wait_for_receipt(*hash, chain_id).await {
                Ok(receipt) => receipts.push(receipt),
                Err(err) => error!("ERROR: {:?}", err),
            }
        }
        receipts
    }
}
