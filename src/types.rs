use ethers::abi::{Function, Token as AbiToken};
use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type ChainId = u64;

/// A token selectable on either side of a swap. `address` is `None` for the
/// chain's native asset.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    #[serde(default, with = "native_address")]
    pub address: Option<Address>,
    pub symbol: String,
    pub name: String,
    pub chain_id: ChainId,
    pub decimals: u8,
    #[serde(default)]
    pub image: Option<String>,
}

impl Token {
    pub fn is_native(&self) -> bool {
        self.address.is_none()
    }
}

/// The swap API represents the native asset with an empty address.
mod native_address {
    use ethers::types::Address;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(address: &Option<Address>, s: S) -> Result<S::Ok, S::Error> {
        match address {
            Some(address) => s.serialize_str(&format!("{:?}", address)),
            None => s.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Address>, D::Error> {
        let raw = Option::<String>::deserialize(d)?.unwrap_or_default();
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse::<Address>()
            .map(Some)
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    From,
    To,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::From => Side::To,
            Side::To => Side::From,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Side::From => 0,
            Side::To => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::From => write!(f, "from"),
            Side::To => write!(f, "to"),
        }
    }
}

/// Per-side state of a swap session.
#[derive(Debug, Default, PartialEq, Clone)]
pub struct SideState {
    pub token: Option<Token>,
    pub amount: String,
    pub loading: bool,
}

/// Raw invocation: target, calldata and native value.
#[derive(Debug, PartialEq, Eq, Clone, Default, Serialize, Deserialize)]
pub struct Call {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

/// ABI-typed function call, turned into a [`Call`] by the encoder.
#[derive(Debug, PartialEq, Clone)]
pub struct ContractCall {
    pub address: Address,
    pub function: Function,
    pub args: Vec<AbiToken>,
    pub value: U256,
}

/// What a transaction session submits. Exactly one shape per request.
#[derive(Debug, PartialEq, Clone)]
pub enum TransactionRequest {
    Calls(Vec<Call>),
    Contracts(Vec<ContractCall>),
}

impl TransactionRequest {
    pub fn len(&self) -> usize {
        match self {
            TransactionRequest::Calls(calls) => calls.len(),
            TransactionRequest::Contracts(contracts) => contracts.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    #[serde(rename = "ERC20")]
    Erc20,
    Permit2,
    Swap,
    Batched,
}

/// Wallet-declared feature flags for the active chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalletCapabilities {
    pub atomic_batch: bool,
    pub paymaster_service: bool,
}
