//! Mock collaborators and fixtures shared by the unit tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::types::{Address, TransactionReceipt, TxHash, U256};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::configuration::BASE_CHAIN_ID;
use crate::errors::{UserRejectedRequestError, METHOD_NOT_SUPPORTED_ERROR_SUBSTRING};
use crate::lifecycle::{ErrorStatus, LifecycleCallbacks, LifecycleStatus, TransactionOutcome};
use crate::swap_api::{ApiResult, BuildParams, BuiltSwap, QuoteParams, SwapApi, SwapQuote};
use crate::types::{Call, ChainId, Token, WalletCapabilities};
use crate::wallet::{BatchCapabilities, CallsStatus, WalletClient};

pub fn eth() -> Token {
    Token {
        address: None,
        symbol: "ETH".to_string(),
        name: "ETH".to_string(),
        chain_id: BASE_CHAIN_ID,
        decimals: 18,
        image: None,
    }
}

pub fn degen() -> Token {
    Token {
        address: Some(
            "0x4ed4E862860beD51a9570b96d89aF5E1B0Efefed"
                .parse()
                .expect("valid address"),
        ),
        symbol: "DEGEN".to_string(),
        name: "DEGEN".to_string(),
        chain_id: BASE_CHAIN_ID,
        decimals: 18,
        image: None,
    }
}

pub fn usdc() -> Token {
    Token {
        address: Some(
            "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"
                .parse()
                .expect("valid address"),
        ),
        symbol: "USDC".to_string(),
        name: "USDC".to_string(),
        chain_id: BASE_CHAIN_ID,
        decimals: 6,
        image: None,
    }
}

pub fn receipt(hash: TxHash) -> TransactionReceipt {
    TransactionReceipt {
        transaction_hash: hash,
        ..TransactionReceipt::default()
    }
}

#[derive(Default)]
struct Recorded {
    statuses: Vec<LifecycleStatus>,
    errors: Vec<ErrorStatus>,
    successes: Vec<TransactionOutcome>,
    events: Vec<String>,
}

/// Collects everything a lifecycle reports to its host.
#[derive(Clone, Default)]
pub struct Recorder {
    recorded: Arc<Mutex<Recorded>>,
}

impl Recorder {
    pub fn callbacks(&self) -> LifecycleCallbacks {
        let on_status = Arc::clone(&self.recorded);
        let on_error = Arc::clone(&self.recorded);
        let on_success = Arc::clone(&self.recorded);
        LifecycleCallbacks::new()
            .on_status(move |status| {
                let mut recorded = on_status.lock();
                recorded.events.push(format!("status:{}", status.name()));
                recorded.statuses.push(status);
            })
            .on_error(move |error| {
                let mut recorded = on_error.lock();
                recorded.events.push(format!("error:{}", error.code));
                recorded.errors.push(error);
            })
            .on_success(move |outcome| {
                let mut recorded = on_success.lock();
                recorded.events.push("success".to_string());
                recorded.successes.push(outcome);
            })
    }

    pub fn statuses(&self) -> Vec<LifecycleStatus> {
        self.recorded.lock().statuses.clone()
    }

    pub fn status_names(&self) -> Vec<&'static str> {
        self.recorded
            .lock()
            .statuses
            .iter()
            .map(LifecycleStatus::name)
            .collect()
    }

    pub fn errors(&self) -> Vec<ErrorStatus> {
        self.recorded.lock().errors.clone()
    }

    pub fn successes(&self) -> Vec<TransactionOutcome> {
        self.recorded.lock().successes.clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.recorded.lock().events.clone()
    }
}

#[derive(Debug, Clone)]
pub enum Failure {
    UserRejected,
    Message(String),
}

impl Failure {
    pub fn unsupported() -> Self {
        Failure::Message(format!("wallet_sendCalls: {}", METHOD_NOT_SUPPORTED_ERROR_SUBSTRING))
    }

    fn to_error(&self) -> anyhow::Error {
        match self {
            Failure::UserRejected => anyhow::Error::new(UserRejectedRequestError),
            Failure::Message(message) => anyhow!("{}", message),
        }
    }
}

/// In-memory wallet. Configure the public fields before wrapping it in an
/// `Arc`; the recorded activity is read back through the accessors.
pub struct MockWallet {
    pub account: Option<Address>,
    pub capabilities: WalletCapabilities,
    pub batch_failure: Option<Failure>,
    pub switch_failure: Option<Failure>,
    /// Fails the n-th (zero-based) `send_transaction` call.
    pub send_failure: Option<(usize, Failure)>,
    pub failing_receipts: Vec<TxHash>,
    pub pending_polls: usize,
    chain_id: Mutex<ChainId>,
    switched: Mutex<Vec<ChainId>>,
    sent: Mutex<Vec<Call>>,
    batches: Mutex<Vec<(Vec<Call>, BatchCapabilities)>>,
    polls: AtomicUsize,
    send_attempts: AtomicUsize,
    receipt_requests: Mutex<Vec<TxHash>>,
}

impl MockWallet {
    pub fn connected() -> Self {
        Self {
            account: Some(Address::from_low_u64_be(0xa11ce)),
            capabilities: WalletCapabilities::default(),
            batch_failure: None,
            switch_failure: None,
            send_failure: None,
            failing_receipts: Vec::new(),
            pending_polls: 0,
            chain_id: Mutex::new(BASE_CHAIN_ID),
            switched: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            batches: Mutex::new(Vec::new()),
            polls: AtomicUsize::new(0),
            send_attempts: AtomicUsize::new(0),
            receipt_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn disconnected() -> Self {
        Self {
            account: None,
            ..Self::connected()
        }
    }

    pub fn with_batching(mut self) -> Self {
        self.capabilities.atomic_batch = true;
        self
    }

    pub fn on_chain(self, chain_id: ChainId) -> Self {
        *self.chain_id.lock() = chain_id;
        self
    }

    pub fn batch_hash() -> TxHash {
        TxHash::from_low_u64_be(0xba7c)
    }

    pub fn sent_hash(index: usize) -> TxHash {
        TxHash::from_low_u64_be(0x100 + index as u64)
    }

    pub fn switched_chains(&self) -> Vec<ChainId> {
        self.switched.lock().clone()
    }

    pub fn sent(&self) -> Vec<Call> {
        self.sent.lock().clone()
    }

    pub fn batches(&self) -> Vec<(Vec<Call>, BatchCapabilities)> {
        self.batches.lock().clone()
    }

    pub fn status_polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn receipt_requests(&self) -> Vec<TxHash> {
        self.receipt_requests.lock().clone()
    }
}

#[async_trait]
impl WalletClient for MockWallet {
    fn account(&self) -> Option<Address> {
        self.account
    }

    fn chain_id(&self) -> ChainId {
        *self.chain_id.lock()
    }

    fn capabilities(&self, _chain_id: ChainId) -> WalletCapabilities {
        self.capabilities
    }

    async fn switch_chain(&self, chain_id: ChainId) -> Result<()> {
        if let Some(failure) = &self.switch_failure {
            return Err(failure.to_error());
        }
        self.switched.lock().push(chain_id);
        *self.chain_id.lock() = chain_id;
        Ok(())
    }

    async fn send_calls(&self, calls: &[Call], capabilities: &BatchCapabilities) -> Result<String> {
        if let Some(failure) = &self.batch_failure {
            return Err(failure.to_error());
        }
        self.batches
            .lock()
            .push((calls.to_vec(), capabilities.clone()));
        Ok("batch-1".to_string())
    }

    async fn get_calls_status(&self, _id: &str) -> Result<CallsStatus> {
        let polls = self.polls.fetch_add(1, Ordering::SeqCst);
        if polls < self.pending_polls {
            Ok(CallsStatus::Pending)
        } else {
            Ok(CallsStatus::Confirmed {
                transaction_hash: Self::batch_hash(),
            })
        }
    }

    async fn send_transaction(&self, call: &Call) -> Result<TxHash> {
        let attempt = self.send_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some((index, failure)) = &self.send_failure {
            if *index == attempt {
                return Err(failure.to_error());
            }
        }
        let mut sent = self.sent.lock();
        sent.push(call.clone());
        Ok(Self::sent_hash(sent.len() - 1))
    }

    async fn wait_for_receipt(
        &self,
        hash: TxHash,
        _chain_id: Option<ChainId>,
    ) -> Result<TransactionReceipt> {
        self.receipt_requests.lock().push(hash);
        if self.failing_receipts.contains(&hash) {
            return Err(anyhow!("receipt for {:?} not found", hash));
        }
        Ok(receipt(hash))
    }
}

type QuoteHandler = Box<dyn Fn(&QuoteParams) -> Result<ApiResult<SwapQuote>> + Send + Sync>;
type BuildHandler = Box<dyn Fn(&BuildParams) -> Result<ApiResult<BuiltSwap>> + Send + Sync>;

/// Swap API answering from closures. Quote calls can be held open with
/// [`MockSwapApi::hold_next_quote`] to observe in-flight state.
pub struct MockSwapApi {
    quote: QuoteHandler,
    build: BuildHandler,
    held: Mutex<VecDeque<Arc<Notify>>>,
    pub entered: Arc<Notify>,
    quote_calls: Mutex<Vec<QuoteParams>>,
    build_calls: Mutex<Vec<BuildParams>>,
}

impl MockSwapApi {
    pub fn new() -> Self {
        Self {
            quote: Box::new(|_| Err(anyhow!("no quote handler"))),
            build: Box::new(|_| Err(anyhow!("no build handler"))),
            held: Mutex::new(VecDeque::new()),
            entered: Arc::new(Notify::new()),
            quote_calls: Mutex::new(Vec::new()),
            build_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on_quote(
        mut self,
        handler: impl Fn(&QuoteParams) -> Result<ApiResult<SwapQuote>> + Send + Sync + 'static,
    ) -> Self {
        self.quote = Box::new(handler);
        self
    }

    pub fn on_build(
        mut self,
        handler: impl Fn(&BuildParams) -> Result<ApiResult<BuiltSwap>> + Send + Sync + 'static,
    ) -> Self {
        self.build = Box::new(handler);
        self
    }

    /// The next quote call waits for the returned notify before answering.
    pub fn hold_next_quote(&self) -> Arc<Notify> {
        let release = Arc::new(Notify::new());
        self.held.lock().push_back(Arc::clone(&release));
        release
    }

    pub fn quote_calls(&self) -> Vec<QuoteParams> {
        self.quote_calls.lock().clone()
    }

    pub fn build_calls(&self) -> Vec<BuildParams> {
        self.build_calls.lock().clone()
    }
}

#[async_trait]
impl SwapApi for MockSwapApi {
    async fn get_quote(&self, params: &QuoteParams) -> Result<ApiResult<SwapQuote>> {
        self.quote_calls.lock().push(params.clone());
        let held = self.held.lock().pop_front();
        self.entered.notify_one();
        if let Some(release) = held {
            release.notified().await;
        }
        (self.quote)(params)
    }

    async fn build_transaction(&self, params: &BuildParams) -> Result<ApiResult<BuiltSwap>> {
        self.build_calls.lock().push(params.clone());
        (self.build)(params)
    }
}

/// Quote answering `params` with fixed amounts on both sides.
pub fn quote_for(params: &QuoteParams, from_amount: U256, to_amount: U256) -> SwapQuote {
    SwapQuote {
        from: params.from.clone(),
        to: params.to.clone(),
        from_amount,
        to_amount,
        amount_reference: params.amount_reference,
        price_impact: "0".to_string(),
        high_price_impact: false,
        chain_id: params.from.chain_id,
        warning: None,
    }
}

pub fn swap_call(seed: u64) -> Call {
    Call {
        to: Address::from_low_u64_be(seed),
        data: vec![0xde, 0xad, 0xbe, 0xef].into(),
        value: U256::zero(),
    }
}
