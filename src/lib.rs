//! Lifecycle orchestration for token swaps and arbitrary on-chain transactions.

pub mod amount;
pub mod configuration;
pub mod encoder;
pub mod errors;
pub mod ethereum_client;
pub mod lifecycle;
pub mod submission;
pub mod swap;
pub mod swap_api;
pub mod transaction;
pub mod types;
pub mod wallet;

#[cfg(test)]
mod testing;

pub use ethereum_client::EthereumClient;
pub use lifecycle::{
    ErrorStatus, Lifecycle, LifecycleCallbacks, LifecycleStatus, TransactionOutcome,
};
pub use swap::{SwapSession, SwapSettings};
pub use swap_api::{HttpSwapApi, SwapApi};
pub use transaction::{TransactionInput, TransactionSession, TransactionSettings};
pub use types::{Call, ChainId, ContractCall, Side, Token, TransactionRequest, TransactionType};
pub use wallet::WalletClient;
