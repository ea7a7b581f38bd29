use ethers::types::{TransactionReceipt, TxHash};
use log::debug;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errors::{GENERIC_ERROR_MESSAGE, UNCAUGHT_SWAP_ERROR_CODE};
use crate::types::{Token, TransactionType};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStatus {
    pub code: String,
    pub error: String,
    pub message: String,
}

impl ErrorStatus {
    pub fn new(
        code: impl Into<String>,
        error: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            error: error.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AmountChange {
    pub amount_from: String,
    pub amount_to: String,
    pub is_missing_required_field: bool,
    pub token_from: Option<Token>,
    pub token_to: Option<Token>,
}

/// Hashes and receipts collected by one submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionOutcome {
    pub transaction_hashes: Vec<TxHash>,
    pub receipts: Vec<TransactionReceipt>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
    tag = "statusName",
    content = "statusData",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum LifecycleStatus {
    Init {
        is_missing_required_field: bool,
    },
    AmountChange(AmountChange),
    SlippageChange {
        max_slippage: f64,
    },
    TransactionPending,
    TransactionApproved {
        transaction_hash: TxHash,
        transaction_type: TransactionType,
    },
    TransactionLegacyExecuted {
        transaction_hashes: Vec<TxHash>,
    },
    Success {
        outcome: TransactionOutcome,
    },
    Error(ErrorStatus),
}

impl LifecycleStatus {
    pub fn init() -> Self {
        LifecycleStatus::Init {
            is_missing_required_field: false,
        }
    }

    pub fn error(
        code: impl Into<String>,
        error: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        LifecycleStatus::Error(ErrorStatus::new(code, error, message))
    }

    pub fn name(&self) -> &'static str {
        match self {
            LifecycleStatus::Init { .. } => "init",
            LifecycleStatus::AmountChange(_) => "amountChange",
            LifecycleStatus::SlippageChange { .. } => "slippageChange",
            LifecycleStatus::TransactionPending => "transactionPending",
            LifecycleStatus::TransactionApproved { .. } => "transactionApproved",
            LifecycleStatus::TransactionLegacyExecuted { .. } => "transactionLegacyExecuted",
            LifecycleStatus::Success { .. } => "success",
            LifecycleStatus::Error(_) => "error",
        }
    }

    /// Brings a status into the shape hosts can rely on: an error always
    /// carries a non-empty code.
    fn normalize(mut self) -> Self {
        if let LifecycleStatus::Error(ref mut status) = self {
            if status.code.trim().is_empty() {
                status.code = UNCAUGHT_SWAP_ERROR_CODE.to_string();
                if status.message.is_empty() {
                    status.message = GENERIC_ERROR_MESSAGE.to_string();
                }
            }
        }
        self
    }
}

pub type StatusCallback = Arc<dyn Fn(LifecycleStatus) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(ErrorStatus) + Send + Sync>;
pub type SuccessCallback = Arc<dyn Fn(TransactionOutcome) + Send + Sync>;
pub type ResetHook = Arc<dyn Fn() + Send + Sync>;

/// Host callbacks, passed explicitly when a session is created.
#[derive(Clone, Default)]
pub struct LifecycleCallbacks {
    on_status: Option<StatusCallback>,
    on_error: Option<ErrorCallback>,
    on_success: Option<SuccessCallback>,
}

impl LifecycleCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_status(mut self, callback: impl Fn(LifecycleStatus) + Send + Sync + 'static) -> Self {
        self.on_status = Some(Arc::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl Fn(ErrorStatus) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn on_success(
        mut self,
        callback: impl Fn(TransactionOutcome) + Send + Sync + 'static,
    ) -> Self {
        self.on_success = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for LifecycleCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleCallbacks")
            .field("on_status", &self.on_status.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_success", &self.on_success.is_some())
            .finish()
    }
}

pub struct Lifecycle {
    status: Mutex<LifecycleStatus>,
    callbacks: LifecycleCallbacks,
    reset_inputs: Option<ResetHook>,
    torn_down: AtomicBool,
}

impl Lifecycle {
    pub fn new(initial: LifecycleStatus, callbacks: LifecycleCallbacks) -> Self {
        Self {
            status: Mutex::new(initial),
            callbacks,
            reset_inputs: None,
            torn_down: AtomicBool::new(false),
        }
    }

    /// Registers the side effect run after every successful transaction.
    pub fn with_reset_inputs(mut self, reset: impl Fn() + Send + Sync + 'static) -> Self {
        self.reset_inputs = Some(Arc::new(reset));
        self
    }

    pub fn status(&self) -> LifecycleStatus {
        self.status.lock().clone()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    /// Stops all further transitions and callbacks.
    pub fn teardown(&self) {
        self.torn_down.store(true, Ordering::SeqCst);
    }

    /// Entering `error` runs `on_error` then `on_status`. Entering `success`
    /// runs `on_success` and `on_status`, moves to `init` and then runs the
    /// reset hook. Callbacks run with no lock held.
    pub fn set_status(&self, next: LifecycleStatus) {
        if self.is_torn_down() {
            debug!("ignoring `{}` status after teardown", next.name());
            return;
        }

        let next = next.normalize();
        debug!("lifecycle status -> {}", next.name());
        *self.status.lock() = next.clone();

        match &next {
            LifecycleStatus::Error(error) => {
                if let Some(on_error) = &self.callbacks.on_error {
                    on_error(error.clone());
                }
                self.emit_status(next);
            }
            LifecycleStatus::Success { outcome } => {
                if let Some(on_success) = &self.callbacks.on_success {
                    on_success(outcome.clone());
                }
                self.emit_status(next);

                let init = LifecycleStatus::init();
                *self.status.lock() = init.clone();
                self.emit_status(init);

                if let Some(reset_inputs) = &self.reset_inputs {
                    reset_inputs();
                }
            }
            _ => self.emit_status(next),
        }
    }

    fn emit_status(&self, status: LifecycleStatus) {
        if let Some(on_status) = &self.callbacks.on_status {
            on_status(status);
        }
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("status", &self.status())
            .field("callbacks", &self.callbacks)
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}
