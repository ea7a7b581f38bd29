//! Error codes surfaced through the `error` lifecycle status and the
//! classification of collaborator failures.

use thiserror::Error;

/// A quote fetch failed before the API could answer.
pub const SWAP_QUOTE_ERROR_CODE: &str = "TmSPc01";
/// Building or submitting a swap failed.
pub const SWAP_BUILD_ERROR_CODE: &str = "TmSPc02";
/// A transaction session failed to submit its calls.
pub const TRANSACTION_SUBMIT_ERROR_CODE: &str = "TmTPc03";
/// A transaction session was given both or neither of calls and contracts.
pub const TRANSACTION_REQUEST_ERROR_CODE: &str = "TmTPc04";

pub const TOO_MANY_REQUESTS_ERROR_CODE: &str = "TOO_MANY_REQUESTS_ERROR";
pub const LOW_LIQUIDITY_ERROR_CODE: &str = "LOW_LIQUIDITY_ERROR";
pub const USER_REJECTED_ERROR_CODE: &str = "USER_REJECTED";
pub const UNCAUGHT_SWAP_QUOTE_ERROR_CODE: &str = "UNCAUGHT_SWAP_QUOTE_ERROR";
pub const UNCAUGHT_SWAP_ERROR_CODE: &str = "UNCAUGHT_SWAP_ERROR";
/// Logged, never surfaced: a batch attempt fell back to sequential sends.
pub const METHOD_NOT_SUPPORTED_FALLBACK_CODE: &str = "METHOD_NOT_SUPPORTED_FALLBACK";

pub const GENERIC_ERROR_MESSAGE: &str = "Something went wrong. Please try again.";
pub const USER_REJECTED_MESSAGE: &str = "Request denied.";

pub const METHOD_NOT_SUPPORTED_ERROR_SUBSTRING: &str = "this request method is not supported";
const USER_REJECTED_ERROR_SUBSTRING: &str = "User rejected the request.";

const KNOWN_CODES: &[&str] = &[
    SWAP_QUOTE_ERROR_CODE,
    SWAP_BUILD_ERROR_CODE,
    TRANSACTION_SUBMIT_ERROR_CODE,
    TRANSACTION_REQUEST_ERROR_CODE,
    TOO_MANY_REQUESTS_ERROR_CODE,
    LOW_LIQUIDITY_ERROR_CODE,
    USER_REJECTED_ERROR_CODE,
    UNCAUGHT_SWAP_QUOTE_ERROR_CODE,
    UNCAUGHT_SWAP_ERROR_CODE,
];

/// Raised by wallet collaborators when the user declines a signature or
/// transaction prompt.
#[derive(Debug, Error)]
#[error("User rejected the request.")]
pub struct UserRejectedRequestError;

/// Which swap API call produced an error payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapErrorContext {
    Quote,
    Build,
}

impl SwapErrorContext {
    pub fn uncaught_code(self) -> &'static str {
        match self {
            SwapErrorContext::Quote => UNCAUGHT_SWAP_QUOTE_ERROR_CODE,
            SwapErrorContext::Build => UNCAUGHT_SWAP_ERROR_CODE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    MethodNotSupported,
    UserRejected,
    Generic,
}

/// Maps a JSON-RPC error code from the swap API onto the code taxonomy.
pub fn swap_error_code(context: SwapErrorContext, rpc_code: Option<i64>) -> &'static str {
    match rpc_code {
        Some(-32001) => TOO_MANY_REQUESTS_ERROR_CODE,
        Some(-32602) => LOW_LIQUIDITY_ERROR_CODE,
        Some(4001) => USER_REJECTED_ERROR_CODE,
        _ => context.uncaught_code(),
    }
}

pub fn is_known_code(code: &str) -> bool {
    KNOWN_CODES.contains(&code)
}

/// Keeps `code` when the taxonomy recognizes it, otherwise falls back to the
/// uncaught code for `context`.
pub fn normalize_swap_code(context: SwapErrorContext, code: &str) -> String {
    if is_known_code(code) {
        code.to_string()
    } else {
        context.uncaught_code().to_string()
    }
}

pub fn is_user_rejected(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| cause.downcast_ref::<UserRejectedRequestError>().is_some())
        || format!("{:#}", err).contains(USER_REJECTED_ERROR_SUBSTRING)
}

pub fn is_method_not_supported(err: &anyhow::Error) -> bool {
    format!("{:#}", err).contains(METHOD_NOT_SUPPORTED_ERROR_SUBSTRING)
}

pub fn classify(err: &anyhow::Error) -> FailureKind {
    if is_method_not_supported(err) {
        FailureKind::MethodNotSupported
    } else if is_user_rejected(err) {
        FailureKind::UserRejected
    } else {
        FailureKind::Generic
    }
}

/// Message shown to the user for a failed submission.
pub fn failure_message(err: &anyhow::Error) -> &'static str {
    if is_user_rejected(err) {
        USER_REJECTED_MESSAGE
    } else {
        GENERIC_ERROR_MESSAGE
    }
}
