use anyhow::{anyhow, Result};
use ethers::types::TxHash;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::configuration::{update_config, ConfigUpdate, Configuration};
use crate::encoder::encode_request;
use crate::errors::{
    classify, is_method_not_supported, FailureKind, GENERIC_ERROR_MESSAGE,
    METHOD_NOT_SUPPORTED_FALLBACK_CODE, TRANSACTION_REQUEST_ERROR_CODE,
    TRANSACTION_SUBMIT_ERROR_CODE, USER_REJECTED_ERROR_CODE, USER_REJECTED_MESSAGE,
};
use crate::lifecycle::{Lifecycle, LifecycleCallbacks, LifecycleStatus, TransactionOutcome};
use crate::submission::{SubmissionMode, Submitter};
use crate::types::{Call, ChainId, ContractCall, TransactionRequest, TransactionType};
use crate::wallet::WalletClient;

/// What the host hands to a transaction session. Exactly one of the two
/// lists must be present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionInput {
    pub calls: Option<Vec<Call>>,
    pub contracts: Option<Vec<ContractCall>>,
}

impl TransactionInput {
    pub fn calls(calls: Vec<Call>) -> Self {
        Self {
            calls: Some(calls),
            contracts: None,
        }
    }

    pub fn contracts(contracts: Vec<ContractCall>) -> Self {
        Self {
            calls: None,
            contracts: Some(contracts),
        }
    }
}

impl TryFrom<TransactionInput> for TransactionRequest {
    type Error = anyhow::Error;

    fn try_from(input: TransactionInput) -> Result<Self> {
        match (input.calls, input.contracts) {
            (Some(calls), None) => Ok(TransactionRequest::Calls(calls)),
            (None, Some(contracts)) => Ok(TransactionRequest::Contracts(contracts)),
            (Some(_), Some(_)) => Err(anyhow!(
                "only one of `calls` or `contracts` can be provided"
            )),
            (None, None) => Err(anyhow!("one of `calls` or `contracts` must be provided")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionSettings {
    pub chain_id: ChainId,
    pub polling_interval: Duration,
    pub paymaster: Option<Url>,
}

impl From<&Configuration> for TransactionSettings {
    fn from(config: &Configuration) -> Self {
        Self {
            chain_id: config.chain_id,
            polling_interval: config.polling_interval(),
            paymaster: config.sponsorship(),
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    error_message: String,
    is_toast_visible: bool,
    outcome: TransactionOutcome,
}

pub struct TransactionSession {
    input: TransactionInput,
    settings: TransactionSettings,
    submitter: Submitter,
    state: Arc<Mutex<SessionState>>,
    lifecycle: Lifecycle,
}

impl TransactionSession {
    pub fn new(
        wallet: Arc<dyn WalletClient>,
        input: TransactionInput,
        settings: TransactionSettings,
        callbacks: LifecycleCallbacks,
    ) -> Self {
        update_config(ConfigUpdate {
            address: wallet.account(),
            ..ConfigUpdate::default()
        });

        let state = Arc::new(Mutex::new(SessionState::default()));
        let reset_state = Arc::clone(&state);
        let lifecycle = Lifecycle::new(
            LifecycleStatus::Init {
                is_missing_required_field: false,
            },
            callbacks,
        )
        .with_reset_inputs(move || reset_state.lock().outcome = TransactionOutcome::default());

        Self {
            input,
            submitter: Submitter::new(wallet, settings.polling_interval),
            settings,
            state,
            lifecycle,
        }
    }

    pub fn status(&self) -> LifecycleStatus {
        self.lifecycle.status()
    }

    pub fn error_message(&self) -> String {
        self.state.lock().error_message.clone()
    }

    pub fn is_toast_visible(&self) -> bool {
        self.state.lock().is_toast_visible
    }

    pub fn dismiss_toast(&self) {
        self.state.lock().is_toast_visible = false;
    }

    /// Hashes and receipts of the submission in progress.
    pub fn outcome(&self) -> TransactionOutcome {
        self.state.lock().outcome.clone()
    }

    pub fn teardown(&self) {
        self.lifecycle.teardown();
    }

    pub async fn handle_submit(&self) {
        if self.submitter.wallet().account().is_none() {
            debug!("no connected account; ignoring submit");
            return;
        }

        let request = TransactionRequest::try_from(self.input.clone());
        if matches!(&request, Ok(request) if request.is_empty()) {
            debug!("empty transaction request; ignoring submit");
            return;
        }

        {
            let mut state = self.state.lock();
            state.error_message.clear();
            state.is_toast_visible = true;
            state.outcome = TransactionOutcome::default();
        }
        self.lifecycle.set_status(LifecycleStatus::TransactionPending);

        let request = match request {
            Ok(request) => request,
            Err(err) => {
                error!("invalid transaction request: {:?}", err);
                self.state.lock().error_message = GENERIC_ERROR_MESSAGE.to_string();
                self.lifecycle.set_status(LifecycleStatus::error(
                    TRANSACTION_REQUEST_ERROR_CODE,
                    err.to_string(),
                    GENERIC_ERROR_MESSAGE,
                ));
                return;
            }
        };

        if let Err(err) = self.execute(&request).await {
            let (code, message) = match classify(&err) {
                FailureKind::UserRejected => (USER_REJECTED_ERROR_CODE, USER_REJECTED_MESSAGE),
                _ => (TRANSACTION_SUBMIT_ERROR_CODE, GENERIC_ERROR_MESSAGE),
            };
            error!("transaction submission failed: {:?}", err);
            self.state.lock().error_message = message.to_string();
            self.lifecycle
                .set_status(LifecycleStatus::error(code, format!("{:#}", err), message));
        }
    }

    async fn execute(&self, request: &TransactionRequest) -> Result<()> {
        let chain_id = self.settings.chain_id;
        let calls = encode_request(request)?;
        self.submitter.ensure_chain(chain_id).await?;

        let hashes = match self.submitter.mode(chain_id) {
            SubmissionMode::Batched => {
                let capabilities = self
                    .submitter
                    .batch_capabilities(chain_id, self.settings.paymaster.as_ref());
                match self.submitter.submit_batch(&calls, &capabilities).await {
                    Ok(hash) => return self.finish_batched(hash).await,
                    Err(err) if is_method_not_supported(&err) => {
                        warn!(
                            "{}: batching unavailable ({:#}), sending {} calls one by one",
                            METHOD_NOT_SUPPORTED_FALLBACK_CODE,
                            err,
                            calls.len()
                        );
                        self.submit_sequential(&calls).await?
                    }
                    Err(err) => return Err(err),
                }
            }
            SubmissionMode::Sequential => self.submit_sequential(&calls).await?,
        };

        self.finish_sequential(hashes, calls.len()).await
    }

    async fn submit_sequential(&self, calls: &[Call]) -> Result<Vec<TxHash>> {
        self.submitter
            .submit_sequential(calls, |hashes| {
                self.state.lock().outcome.transaction_hashes = hashes.to_vec();
                self.lifecycle
                    .set_status(LifecycleStatus::TransactionLegacyExecuted {
                        transaction_hashes: hashes.to_vec(),
                    });
            })
            .await
    }

    async fn finish_batched(&self, hash: TxHash) -> Result<()> {
        self.state.lock().outcome.transaction_hashes = vec![hash];
        self.lifecycle.set_status(LifecycleStatus::TransactionApproved {
            transaction_hash: hash,
            transaction_type: TransactionType::Batched,
        });

        let receipt = self
            .submitter
            .wait_for_receipt(hash, self.settings.chain_id)
            .await?;
        self.succeed(vec![receipt]);
        Ok(())
    }

    async fn finish_sequential(&self, hashes: Vec<TxHash>, total: usize) -> Result<()> {
        let chain_id = self.settings.chain_id;

        if total == 1 {
            if let Some(hash) = hashes.first() {
                let receipt = self.submitter.wait_for_receipt(*hash, chain_id).await?;
                self.succeed(vec![receipt]);
            }
            return Ok(());
        }

        if hashes.len() == total {
            let receipts = self.submitter.collect_receipts(&hashes, chain_id).await;
            info!("collected {} of {} receipts", receipts.len(), total);
            self.succeed(receipts);
        }
        Ok(())
    }

    fn succeed(&self, receipts: Vec<ethers::types::TransactionReceipt>) {
        let outcome = {
            let mut state = self.state.lock();
            state.outcome.receipts = receipts;
            state.outcome.clone()
        };
        self.lifecycle.set_status(LifecycleStatus::Success { outcome });
    }
}
