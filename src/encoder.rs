use anyhow::{Context, Result};
use ethers::abi::{AbiParser, Function, Token as AbiToken};
use ethers::types::{Address, U256};
use log::debug;

use crate::types::{Call, ContractCall, TransactionRequest};

pub const PERMIT2_CONTRACT_ADDRESS: &str = "0x000000000022D473030F116dDEE9F6B43aC78BA3";
pub const UNIVERSAL_ROUTER_CONTRACT_ADDRESS: &str = "0x3fC91A3afd70395Cd496C647d5a6CC9D4B2b7FAD";

const PERMIT2_APPROVE_SIGNATURE: &str =
    "function approve(address token, address spender, uint160 amount, uint48 expiration)";
// far enough in the future that the allowance never lapses mid-swap
const PERMIT2_EXPIRATION: u64 = 20_000_000_000_000;

pub fn parse_function(signature: &str) -> Result<Function> {
    AbiParser::default()
        .parse_function(signature)
        .with_context(|| format!("unable to parse function signature `{}`", signature))
}

pub fn encode_contract_call(contract: &ContractCall) -> Result<Call> {
    let data = contract
        .function
        .encode_input(&contract.args)
        .with_context(|| format!("unable to encode arguments for `{}`", contract.function.name))?;

    debug!(
        "encoded {} for {:?} with selector 0x{}",
        contract.function.name,
        contract.address,
        hex::encode(&data[..4])
    );

    Ok(Call {
        to: contract.address,
        data: data.into(),
        value: contract.value,
    })
}

/// Flattens either request shape into raw calls ready for the wallet.
pub fn encode_request(request: &TransactionRequest) -> Result<Vec<Call>> {
    match request {
        TransactionRequest::Calls(calls) => Ok(calls.clone()),
        TransactionRequest::Contracts(contracts) => {
            contracts.iter().map(encode_contract_call).collect()
        }
    }
}

/// Permit2 allowance letting the universal router pull `amount` of `token`.
pub fn permit2_approve_call(token: Address, amount: U256) -> Result<Call> {
    let contract = ContractCall {
        address: PERMIT2_CONTRACT_ADDRESS.parse()?,
        function: parse_function(PERMIT2_APPROVE_SIGNATURE)?,
        args: vec![
            AbiToken::Address(token),
            AbiToken::Address(UNIVERSAL_ROUTER_CONTRACT_ADDRESS.parse()?),
            AbiToken::Uint(amount),
            AbiToken::Uint(PERMIT2_EXPIRATION.into()),
        ],
        value: U256::zero(),
    };
    encode_contract_call(&contract)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer_call(to: u64, amount: u64) -> ContractCall {
        ContractCall {
            address: Address::from_low_u64_be(0xdead),
            function: parse_function("function transfer(address to, uint256 amount)")
                .expect("failed to parse"),
            args: vec![
                AbiToken::Address(Address::from_low_u64_be(to)),
                AbiToken::Uint(amount.into()),
            ],
            value: U256::zero(),
        }
    }

    #[test]
    fn test_encode_contract_call() {
        let call = encode_contract_call(&transfer_call(1, 10)).expect("failed to encode");

        assert_eq!(call.to, Address::from_low_u64_be(0xdead));
        // selector + two 32-byte words
        assert_eq!(call.data.len(), 4 + 64);
        assert_eq!(hex::encode(&call.data[..4]), "a9059cbb");
        assert_eq!(call.data[4 + 64 - 1], 10);
    }

    #[test]
    fn test_encode_contract_call_rejects_bad_args() {
        let mut contract = transfer_call(1, 10);
        contract.args.pop();
        assert!(encode_contract_call(&contract).is_err());
    }

    #[test]
    fn test_encode_request_keeps_order() {
        let request = TransactionRequest::Contracts(vec![transfer_call(1, 1), transfer_call(2, 2)]);
        let calls = encode_request(&request).expect("failed to encode");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].data[4 + 31], 1);
        assert_eq!(calls[1].data[4 + 31], 2);
    }

    #[test]
    fn test_permit2_approve_call() {
        let token = Address::from_low_u64_be(7);
        let call = permit2_approve_call(token, U256::from(1000u64)).expect("failed to encode");
        assert_eq!(call.to, PERMIT2_CONTRACT_ADDRESS.parse::<Address>().unwrap());
        assert_eq!(call.data.len(), 4 + 4 * 32);
        assert_eq!(&call.data[4 + 12..4 + 32], token.as_bytes());
    }
}
