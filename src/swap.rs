//! Swap session: keeps the two sides of a swap in sync with the pricing API
//! and submits the built trade through the wallet.

use anyhow::{anyhow, Result};
use ethers::types::{TransactionReceipt, TxHash};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::amount::{format_token_amount, is_empty_or_zero};
use crate::configuration::{
    update_config, ConfigUpdate, Configuration, DEFAULT_MAX_SLIPPAGE, DEFAULT_POLLING_INTERVAL_MS,
};
use crate::encoder::permit2_approve_call;
use crate::errors::{
    failure_message, is_method_not_supported, normalize_swap_code, SwapErrorContext,
    METHOD_NOT_SUPPORTED_FALLBACK_CODE, SWAP_BUILD_ERROR_CODE, SWAP_QUOTE_ERROR_CODE,
};
use crate::lifecycle::{
    AmountChange, ErrorStatus, Lifecycle, LifecycleCallbacks, LifecycleStatus,
    TransactionOutcome,
};
use crate::submission::{SubmissionMode, Submitter};
use crate::swap_api::{ApiError, BuildParams, BuiltSwap, QuoteParams, SwapApi, SwapQuote};
use crate::types::{Call, Side, SideState, Token, TransactionType};
use crate::wallet::WalletClient;

#[derive(Debug, Clone, PartialEq)]
pub struct SwapSettings {
    pub max_slippage: f64,
    pub use_aggregator: bool,
    pub polling_interval: Duration,
    pub paymaster: Option<Url>,
}

impl Default for SwapSettings {
    fn default() -> Self {
        Self {
            max_slippage: DEFAULT_MAX_SLIPPAGE,
            use_aggregator: false,
            polling_interval: Duration::from_millis(DEFAULT_POLLING_INTERVAL_MS),
            paymaster: None,
        }
    }
}

impl From<&Configuration> for SwapSettings {
    fn from(config: &Configuration) -> Self {
        Self {
            max_slippage: config.max_slippage,
            use_aggregator: config.use_aggregator,
            polling_interval: config.polling_interval(),
            paymaster: config.sponsorship(),
        }
    }
}

/// Both sides plus the sequence number of the latest quote request. A quote
/// response is applied only while its sequence number is still current.
#[derive(Debug, Default)]
struct QuoteState {
    sides: [SideState; 2],
    sequence: u64,
}

impl QuoteState {
    fn side(&self, side: Side) -> &SideState {
        &self.sides[side.index()]
    }

    fn side_mut(&mut self, side: Side) -> &mut SideState {
        &mut self.sides[side.index()]
    }

    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        for side in self.sides.iter_mut() {
            side.loading = false;
        }
        self.sequence
    }

    fn is_missing_required_field(&self) -> bool {
        self.sides
            .iter()
            .any(|side| side.token.is_none() || is_empty_or_zero(&side.amount))
    }

    fn amount_change(&self, is_missing_required_field: bool) -> LifecycleStatus {
        LifecycleStatus::AmountChange(AmountChange {
            amount_from: self.side(Side::From).amount.clone(),
            amount_to: self.side(Side::To).amount.clone(),
            is_missing_required_field,
            token_from: self.side(Side::From).token.clone(),
            token_to: self.side(Side::To).token.clone(),
        })
    }
}

pub struct SwapSession {
    api: Arc<dyn SwapApi>,
    submitter: Submitter,
    state: Arc<Mutex<QuoteState>>,
    settings: Mutex<SwapSettings>,
    lifecycle: Lifecycle,
}

impl SwapSession {
    pub fn new(
        api: Arc<dyn SwapApi>,
        wallet: Arc<dyn WalletClient>,
        settings: SwapSettings,
        callbacks: LifecycleCallbacks,
    ) -> Self {
        update_config(ConfigUpdate {
            address: wallet.account(),
            ..ConfigUpdate::default()
        });

        let state = Arc::new(Mutex::new(QuoteState::default()));
        let reset_state = Arc::clone(&state);
        let lifecycle = Lifecycle::new(
            LifecycleStatus::Init {
                is_missing_required_field: true,
            },
            callbacks,
        )
        .with_reset_inputs(move || {
            let mut state = reset_state.lock();
            state.next_sequence();
            for side in state.sides.iter_mut() {
                side.amount.clear();
            }
        });

        Self {
            api,
            submitter: Submitter::new(wallet, settings.polling_interval),
            state,
            settings: Mutex::new(settings),
            lifecycle,
        }
    }

    /// Preselects the tokens of both sides.
    pub fn with_tokens(self, from: Option<Token>, to: Option<Token>) -> Self {
        {
            let mut state = self.state.lock();
            state.side_mut(Side::From).token = from;
            state.side_mut(Side::To).token = to;
        }
        self
    }

    pub fn side(&self, side: Side) -> SideState {
        self.state.lock().side(side).clone()
    }

    pub fn settings(&self) -> SwapSettings {
        self.settings.lock().clone()
    }

    pub fn status(&self) -> LifecycleStatus {
        self.lifecycle.status()
    }

    pub fn teardown(&self) {
        self.lifecycle.teardown();
    }

    pub fn set_max_slippage(&self, max_slippage: f64) {
        self.settings.lock().max_slippage = max_slippage;
        self.lifecycle
            .set_status(LifecycleStatus::SlippageChange { max_slippage });
    }

    /// Swaps token and amount between the two sides. Any quote in flight
    /// becomes stale.
    pub fn handle_toggle(&self) {
        let mut state = self.state.lock();
        state.next_sequence();
        state.sides.swap(0, 1);
    }

    /// Records a typed amount on `side` and, when both tokens and a
    /// non-zero amount are present, fetches a quote for the counter side.
    pub async fn handle_amount_change(
        &self,
        side: Side,
        amount: &str,
        token_from: Option<Token>,
        token_to: Option<Token>,
    ) {
        let counter = side.opposite();

        let (sequence, params, status) = {
            let mut state = self.state.lock();
            let sequence = state.next_sequence();
            if token_from.is_some() {
                state.side_mut(Side::From).token = token_from;
            }
            if token_to.is_some() {
                state.side_mut(Side::To).token = token_to;
            }
            state.side_mut(side).amount = amount.to_string();

            let tokens = (
                state.side(Side::From).token.clone(),
                state.side(Side::To).token.clone(),
            );
            let (from, to) = match tokens {
                (Some(from), Some(to)) => (from, to),
                _ => {
                    let status = state.amount_change(true);
                    drop(state);
                    self.lifecycle.set_status(status);
                    return;
                }
            };

            if is_empty_or_zero(amount) {
                state.side_mut(counter).amount.clear();
                let status = state.amount_change(state.is_missing_required_field());
                drop(state);
                self.lifecycle.set_status(status);
                return;
            }

            state.side_mut(counter).amount.clear();
            state.side_mut(counter).loading = true;

            let settings = self.settings.lock();
            let params = QuoteParams {
                from,
                to,
                amount: amount.to_string(),
                amount_reference: side,
                use_aggregator: settings.use_aggregator,
                max_slippage: settings.max_slippage,
            };
            (sequence, params, state.amount_change(true))
        };
        self.lifecycle.set_status(status);

        debug!(
            "fetching quote #{} for {} {} -> {}",
            sequence, params.amount, params.from.symbol, params.to.symbol
        );
        let response = self.api.get_quote(&params).await;

        let status = {
            let mut state = self.state.lock();
            if state.sequence != sequence {
                debug!(
                    "discarding stale quote #{} (latest is #{})",
                    sequence, state.sequence
                );
                return;
            }
            state.side_mut(counter).loading = false;

            let formatted = match response {
                Ok(Ok(quote)) => {
                    for warning in quote_warnings(&quote) {
                        warn!("{}", warning);
                    }
                    counter_amount(&quote, counter).map(Ok)
                }
                Ok(Err(api_error)) => Ok(Err(api_error)),
                Err(err) => Err(err),
            };
            match formatted {
                Ok(Ok(amount)) => {
                    state.side_mut(counter).amount = amount;
                    state.amount_change(state.is_missing_required_field())
                }
                Ok(Err(api_error)) => {
                    warn!("quote #{} rejected by the swap API: {:?}", sequence, api_error);
                    api_error_status(SwapErrorContext::Quote, api_error)
                }
                Err(err) => {
                    error!("quote #{} failed: {:?}", sequence, err);
                    LifecycleStatus::error(SWAP_QUOTE_ERROR_CODE, format!("{:#}", err), "")
                }
            }
        };
        self.lifecycle.set_status(status);
    }

    /// Builds the trade for the current inputs and submits it.
    pub async fn handle_submit(&self) {
        let account = match self.submitter.wallet().account() {
            Some(account) => account,
            None => {
                debug!("no connected account; ignoring submit");
                return;
            }
        };

        let (from, to, amount) = {
            let state = self.state.lock();
            let from = state.side(Side::From);
            match (from.token.clone(), state.side(Side::To).token.clone()) {
                (Some(from_token), Some(to_token)) if !from.amount.is_empty() => {
                    (from_token, to_token, from.amount.clone())
                }
                _ => {
                    debug!("swap inputs incomplete; ignoring submit");
                    return;
                }
            }
        };

        let settings = self.settings();
        let params = BuildParams {
            from,
            to,
            amount,
            from_address: account,
            use_aggregator: settings.use_aggregator,
            max_slippage: settings.max_slippage,
        };

        let built = match self.api.build_transaction(&params).await {
            Ok(Ok(built)) => built,
            Ok(Err(api_error)) => {
                warn!("swap build rejected by the swap API: {:?}", api_error);
                self.lifecycle
                    .set_status(api_error_status(SwapErrorContext::Build, api_error));
                return;
            }
            Err(err) => {
                self.fail_submit(&err);
                return;
            }
        };

        if let Err(err) = self.process_swap(&built, &settings).await {
            self.fail_submit(&err);
        }
    }

    fn fail_submit(&self, err: &anyhow::Error) {
        error!("swap submission failed: {:?}", err);
        self.lifecycle.set_status(LifecycleStatus::error(
            SWAP_BUILD_ERROR_CODE,
            format!("{:#}", err),
            failure_message(err),
        ));
    }

    async fn process_swap(&self, built: &BuiltSwap, settings: &SwapSettings) -> Result<()> {
        self.submitter.ensure_chain(built.chain_id).await?;

        let permit2_approve = match (&built.approve_transaction, settings.use_aggregator) {
            (Some(_), false) => {
                let token = built.quote.from.address.ok_or_else(|| {
                    anyhow!("approval requested for native {}", built.quote.from.symbol)
                })?;
                Some(permit2_approve_call(token, built.quote.from_amount)?)
            }
            _ => None,
        };

        if self.submitter.mode(built.chain_id) == SubmissionMode::Batched {
            let calls: Vec<Call> = built
                .approve_transaction
                .iter()
                .chain(permit2_approve.iter())
                .chain(std::iter::once(&built.transaction))
                .cloned()
                .collect();
            let capabilities = self
                .submitter
                .batch_capabilities(built.chain_id, settings.paymaster.as_ref());

            self.lifecycle.set_status(LifecycleStatus::TransactionPending);
            match self.submitter.submit_batch(&calls, &capabilities).await {
                Ok(hash) => {
                    self.lifecycle.set_status(LifecycleStatus::TransactionApproved {
                        transaction_hash: hash,
                        transaction_type: TransactionType::Batched,
                    });
                    let receipt = self.submitter.wait_for_receipt(hash, built.chain_id).await?;
                    self.succeed(vec![hash], vec![receipt]);
                    return Ok(());
                }
                Err(err) if is_method_not_supported(&err) => {
                    warn!(
                        "{}: batching unavailable ({:#}), sending swap step by step",
                        METHOD_NOT_SUPPORTED_FALLBACK_CODE, err
                    );
                }
                Err(err) => return Err(err),
            }
        } else {
            self.lifecycle.set_status(LifecycleStatus::TransactionPending);
        }

        self.process_sequential(built, settings, permit2_approve).await
    }

    async fn process_sequential(
        &self,
        built: &BuiltSwap,
        settings: &SwapSettings,
        permit2_approve: Option<Call>,
    ) -> Result<()> {
        let approval_type = if settings.use_aggregator {
            TransactionType::Erc20
        } else {
            TransactionType::Permit2
        };

        let steps = built
            .approve_transaction
            .iter()
            .map(|call| (call, approval_type))
            .chain(permit2_approve.iter().map(|call| (call, TransactionType::Permit2)))
            .chain(std::iter::once((&built.transaction, TransactionType::Swap)));

        let mut hashes = Vec::new();
        let mut receipts = Vec::new();
        for (call, transaction_type) in steps {
            let (hash, receipt) = self.send_step(call, transaction_type, built).await?;
            hashes.push(hash);
            receipts.push(receipt);
        }

        info!(
            "swapped {} for {} in {} transactions",
            built.quote.from.symbol,
            built.quote.to.symbol,
            hashes.len()
        );
        self.succeed(hashes, receipts);
        Ok(())
    }

    async fn send_step(
        &self,
        call: &Call,
        transaction_type: TransactionType,
        built: &BuiltSwap,
    ) -> Result<(TxHash, TransactionReceipt)> {
        let hash = self.submitter.submit_one(call).await?;
        self.lifecycle.set_status(LifecycleStatus::TransactionApproved {
            transaction_hash: hash,
            transaction_type,
        });
        let receipt = self.submitter.wait_for_receipt(hash, built.chain_id).await?;
        Ok((hash, receipt))
    }

    fn succeed(&self, transaction_hashes: Vec<TxHash>, receipts: Vec<TransactionReceipt>) {
        self.lifecycle.set_status(LifecycleStatus::Success {
            outcome: TransactionOutcome {
                transaction_hashes,
                receipts,
            },
        });
    }
}

fn api_error_status(context: SwapErrorContext, api_error: ApiError) -> LifecycleStatus {
    let mut status = ErrorStatus::from(api_error);
    status.code = normalize_swap_code(context, &status.code);
    LifecycleStatus::Error(status)
}

fn quote_warnings(quote: &SwapQuote) -> Vec<String> {
    let mut warnings = Vec::new();
    if quote.high_price_impact {
        warnings.push(format!(
            "high price impact ({}%) swapping {} for {}",
            quote.price_impact, quote.from.symbol, quote.to.symbol
        ));
    }
    if let Some(warning) = &quote.warning {
        warnings.push(format!("swap API warning: {}", warning));
    }
    warnings
}

fn counter_amount(quote: &SwapQuote, counter: Side) -> Result<String> {
    let (amount, token) = quote.amount_for(counter);
    format_token_amount(amount, token.decimals)
}
