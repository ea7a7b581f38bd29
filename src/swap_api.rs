use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use ethers::types::{Address, Bytes, U256};
use log::debug;
use serde_json::Value;
use url::Url;

use crate::amount::to_base_units;
use crate::configuration::{get_config, Configuration};
use crate::errors::{swap_error_code, SwapErrorContext};
use crate::lifecycle::ErrorStatus;
use crate::types::{Call, ChainId, Side, Token};

const QUOTE_METHOD: &str = "cdp_getSwapQuote";
const TRADE_METHOD: &str = "cdp_getSwapTrade";
const NATIVE_ASSET: &str = "ETH";

/// Error payload the swap API answers with instead of a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub code: String,
    pub error: String,
    pub message: String,
}

impl From<ApiError> for ErrorStatus {
    fn from(err: ApiError) -> Self {
        ErrorStatus::new(err.code, err.error, err.message)
    }
}

/// Outer `Err` is a failed call; inner `Err` is an error the API reported.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Clone, PartialEq)]
pub struct QuoteParams {
    pub from: Token,
    pub to: Token,
    pub amount: String,
    pub amount_reference: Side,
    pub use_aggregator: bool,
    pub max_slippage: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildParams {
    pub from: Token,
    pub to: Token,
    pub amount: String,
    pub from_address: Address,
    pub use_aggregator: bool,
    pub max_slippage: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwapQuote {
    pub from: Token,
    pub to: Token,
    pub from_amount: U256,
    pub to_amount: U256,
    pub amount_reference: Side,
    pub price_impact: String,
    pub high_price_impact: bool,
    pub chain_id: ChainId,
    pub warning: Option<String>,
}

impl SwapQuote {
    /// The quoted amount and token for `side`.
    pub fn amount_for(&self, side: Side) -> (U256, &Token) {
        match side {
            Side::From => (self.from_amount, &self.from),
            Side::To => (self.to_amount, &self.to),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuiltSwap {
    pub approve_transaction: Option<Call>,
    pub transaction: Call,
    pub chain_id: ChainId,
    pub quote: SwapQuote,
}

/// Pricing and trade-building collaborator.
#[async_trait]
pub trait SwapApi: Send + Sync {
    async fn get_quote(&self, params: &QuoteParams) -> Result<ApiResult<SwapQuote>>;

    async fn build_transaction(&self, params: &BuildParams) -> Result<ApiResult<BuiltSwap>>;
}

/// JSON-RPC client for the hosted swap API. Endpoint and API key are read
/// from the process-wide configuration on every call.
#[derive(Debug, Clone, Default)]
pub struct HttpSwapApi {
    http_client: reqwest::Client,
}

impl HttpSwapApi {
    pub fn new() -> Self {
        Self {
            http_client: reqwest::Client::new(),
        }
    }

    async fn send_request(
        &self,
        context: SwapErrorContext,
        method: &str,
        params: Value,
    ) -> Result<ApiResult<Value>> {
        let endpoint = rpc_endpoint(&get_config())?;

        let response = self
            .http_client
            .post(endpoint)
            .json(&serde_json::json!({
                "id": 1,
                "jsonrpc": "2.0",
                "method": method,
                "params": [params],
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            debug!("{} failed with body: {:?}", method, response.text().await?);
            return Err(anyhow!("{} request failed with status {}", method, status));
        }

        let response_body = response.json::<Value>().await?;
        debug!(
            "Got back the following response body from {}: {:?}",
            method, response_body
        );

        parse_rpc_response(context, response_body)
    }
}

#[async_trait]
impl SwapApi for HttpSwapApi {
    async fn get_quote(&self, params: &QuoteParams) -> Result<ApiResult<SwapQuote>> {
        let request = quote_request_params(params)?;
        match self
            .send_request(SwapErrorContext::Quote, QUOTE_METHOD, request)
            .await?
        {
            Ok(result) => Ok(Ok(parse_quote(&result)?)),
            Err(err) => Ok(Err(err)),
        }
    }

    async fn build_transaction(&self, params: &BuildParams) -> Result<ApiResult<BuiltSwap>> {
        let request = build_request_params(params)?;
        match self
            .send_request(SwapErrorContext::Build, TRADE_METHOD, request)
            .await?
        {
            Ok(result) => Ok(Ok(parse_built_swap(&result)?)),
            Err(err) => Ok(Err(err)),
        }
    }
}

fn rpc_endpoint(config: &Configuration) -> Result<Url> {
    let api_key = config
        .api_key
        .as_deref()
        .context("an API key must be configured to call the swap API")?;
    Ok(config.api_base_url.join(api_key)?)
}

fn parse_rpc_response(context: SwapErrorContext, mut body: Value) -> Result<ApiResult<Value>> {
    if let Some(error) = body.get("error").filter(|error| !error.is_null()) {
        return Ok(Err(ApiError {
            code: swap_error_code(context, error["code"].as_i64()).to_string(),
            error: error["message"].as_str().unwrap_or_default().to_string(),
            message: String::new(),
        }));
    }

    match body.get_mut("result").map(Value::take) {
        Some(result) if !result.is_null() => Ok(Ok(result)),
        _ => Err(anyhow!("response carried neither `result` nor `error`")),
    }
}

fn token_param(token: &Token) -> String {
    match token.address {
        Some(address) => format!("{:?}", address),
        None => NATIVE_ASSET.to_string(),
    }
}

fn apply_swap_options(body: &mut Value, use_aggregator: bool, max_slippage: f64) {
    if !use_aggregator {
        body["v2Enabled"] = Value::Bool(true);
    }
    if max_slippage > 0.0 {
        let slippage = if use_aggregator {
            max_slippage * 10.0
        } else {
            max_slippage
        };
        body["slippagePercentage"] = Value::String(slippage.to_string());
    }
}

fn quote_request_params(params: &QuoteParams) -> Result<Value> {
    let reference_token = match params.amount_reference {
        Side::From => &params.from,
        Side::To => &params.to,
    };
    let amount = to_base_units(&params.amount, reference_token.decimals)?;

    let mut body = serde_json::json!({
        "from": token_param(&params.from),
        "to": token_param(&params.to),
        "amount": amount.to_string(),
        "amountReference": params.amount_reference.to_string(),
    });
    apply_swap_options(&mut body, params.use_aggregator, params.max_slippage);
    Ok(body)
}

fn build_request_params(params: &BuildParams) -> Result<Value> {
    let amount = to_base_units(&params.amount, params.from.decimals)?;

    let mut body = serde_json::json!({
        "from": token_param(&params.from),
        "to": token_param(&params.to),
        "amount": amount.to_string(),
        "amountReference": Side::From.to_string(),
        "fromAddress": format!("{:?}", params.from_address),
    });
    apply_swap_options(&mut body, params.use_aggregator, params.max_slippage);
    Ok(body)
}

fn parse_u256(value: &Value, field: &str) -> Result<U256> {
    let raw = value
        .as_str()
        .with_context(|| format!("unable to get `{}` from response", field))?;
    if let Some(hex_value) = raw.strip_prefix("0x") {
        return U256::from_str_radix(hex_value, 16)
            .map_err(|err| anyhow!("`{}` is not a hex integer: {:?}", field, err));
    }
    U256::from_dec_str(raw)
        .map_err(|err| anyhow!("`{}` is not a decimal integer: {:?}", field, err))
}

fn parse_token(value: &Value, field: &str) -> Result<Token> {
    serde_json::from_value(value.clone())
        .with_context(|| format!("unable to get `{}` token from response", field))
}

fn parse_quote(result: &Value) -> Result<SwapQuote> {
    let amount_reference = match result["amountReference"].as_str() {
        Some("to") => Side::To,
        _ => Side::From,
    };

    Ok(SwapQuote {
        from: parse_token(&result["from"], "from")?,
        to: parse_token(&result["to"], "to")?,
        from_amount: parse_u256(&result["fromAmount"], "fromAmount")?,
        to_amount: parse_u256(&result["toAmount"], "toAmount")?,
        amount_reference,
        price_impact: result["priceImpact"].as_str().unwrap_or_default().to_string(),
        high_price_impact: result["highPriceImpact"].as_bool().unwrap_or(false),
        chain_id: result["chainId"]
            .as_str()
            .and_then(|chain_id| chain_id.parse().ok())
            .or_else(|| result["chainId"].as_u64())
            .context("unable to get `chainId` from quote")?,
        warning: result["warning"]["message"].as_str().map(str::to_string),
    })
}

fn parse_call(value: &Value, field: &str) -> Result<Call> {
    let to = value["to"]
        .as_str()
        .with_context(|| format!("unable to get `{}.to` from response", field))?
        .parse::<Address>()?;
    let data = value["data"]
        .as_str()
        .with_context(|| format!("unable to get `{}.data` from response", field))?;
    let data = hex::decode(data.trim_start_matches("0x"))
        .with_context(|| format!("`{}.data` is not hex", field))?;
    let call_value = match &value["value"] {
        Value::Null => U256::zero(),
        other => parse_u256(other, "value")?,
    };

    Ok(Call {
        to,
        data: Bytes::from(data),
        value: call_value,
    })
}

fn parse_built_swap(result: &Value) -> Result<BuiltSwap> {
    let quote = parse_quote(&result["quote"])?;
    let approve_transaction = match &result["approveTx"] {
        Value::Null => None,
        approve => Some(parse_call(approve, "approveTx")?),
    };

    Ok(BuiltSwap {
        approve_transaction,
        transaction: parse_call(&result["tx"], "tx")?,
        chain_id: result["tx"]["chainId"].as_u64().unwrap_or(quote.chain_id),
        quote,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{LOW_LIQUIDITY_ERROR_CODE, UNCAUGHT_SWAP_QUOTE_ERROR_CODE};
    use crate::testing::{degen, eth};

    fn quote_json() -> Value {
        serde_json::json!({
            "from": {
                "address": "", "symbol": "ETH", "name": "ETH", "chainId": 8453, "decimals": 18,
            },
            "to": {
                "address": "0x4ed4E862860beD51a9570b96d89aF5E1B0Efefed",
                "symbol": "DEGEN", "name": "DEGEN", "chainId": 8453, "decimals": 18,
            },
            "fromAmount": "100000000000000000",
            "toAmount": "16000000000000000000",
            "amountReference": "from",
            "priceImpact": "0.01",
            "chainId": "8453",
            "highPriceImpact": false,
            "warning": {"type": "warning", "message": "This trade has low liquidity"},
        })
    }

    #[test]
    fn test_quote_request_params() {
        let params = QuoteParams {
            from: eth(),
            to: degen(),
            amount: "0.1".to_string(),
            amount_reference: Side::From,
            use_aggregator: false,
            max_slippage: 3.0,
        };
        let body = quote_request_params(&params).expect("failed to build params");

        assert_eq!(body["from"], "ETH");
        assert_eq!(body["to"], "0x4ed4e862860bed51a9570b96d89af5e1b0efefed");
        assert_eq!(body["amount"], "100000000000000000");
        assert_eq!(body["amountReference"], "from");
        assert_eq!(body["v2Enabled"], true);
        assert_eq!(body["slippagePercentage"], "3");

        let params = QuoteParams {
            use_aggregator: true,
            ..params
        };
        let body = quote_request_params(&params).expect("failed to build params");
        assert!(body.get("v2Enabled").is_none());
        assert_eq!(body["slippagePercentage"], "30");
    }

    #[test]
    fn test_build_request_params() {
        let params = BuildParams {
            from: degen(),
            to: eth(),
            amount: "1000".to_string(),
            from_address: Address::from_low_u64_be(1),
            use_aggregator: true,
            max_slippage: 0.0,
        };
        let body = build_request_params(&params).expect("failed to build params");

        assert_eq!(body["to"], "ETH");
        assert_eq!(body["amount"], "1000000000000000000000");
        assert_eq!(
            body["fromAddress"],
            "0x0000000000000000000000000000000000000001"
        );
        assert!(body.get("slippagePercentage").is_none());
    }

    #[test]
    fn test_parse_quote() {
        let quote = parse_quote(&quote_json()).expect("failed to parse quote");

        assert!(quote.from.is_native());
        assert_eq!(quote.to.symbol, "DEGEN");
        assert_eq!(quote.from_amount, U256::exp10(17));
        assert_eq!(quote.to_amount, U256::from(16u64) * U256::exp10(18));
        assert_eq!(quote.chain_id, 8453);
        assert_eq!(quote.warning.as_deref(), Some("This trade has low liquidity"));
        assert_eq!(quote.amount_for(Side::To).1.symbol, "DEGEN");
    }

    #[test]
    fn test_parse_quote_missing_amount() {
        let mut json = quote_json();
        json["toAmount"] = Value::Null;
        assert!(parse_quote(&json).is_err());
    }

    #[test]
    fn test_parse_built_swap() {
        let result = serde_json::json!({
            "approveTx": {
                "to": "0x4ed4E862860beD51a9570b96d89aF5E1B0Efefed",
                "data": "0x095ea7b3",
                "value": "0",
            },
            "tx": {
                "to": "0x3fC91A3afd70395Cd496C647d5a6CC9D4B2b7FAD",
                "data": "0xdeadbeef",
                "value": "100000000000000000",
                "chainId": 8453,
            },
            "quote": quote_json(),
        });
        let built = parse_built_swap(&result).expect("failed to parse trade");

        let approve = built.approve_transaction.expect("missing approval");
        assert_eq!(approve.data.to_vec(), vec![0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(built.transaction.value, U256::exp10(17));
        assert_eq!(built.chain_id, 8453);
    }

    #[test]
    fn test_parse_rpc_response() {
        let body = serde_json::json!({"id": 1, "jsonrpc": "2.0", "result": {"ok": true}});
        let result = parse_rpc_response(SwapErrorContext::Quote, body).expect("failed to parse");
        assert_eq!(result, Ok(serde_json::json!({"ok": true})));

        let body = serde_json::json!({
            "error": {"code": -32602, "message": "not enough liquidity"},
        });
        let result = parse_rpc_response(SwapErrorContext::Quote, body).expect("failed to parse");
        let err = result.expect_err("expected API error");
        assert_eq!(err.code, LOW_LIQUIDITY_ERROR_CODE);
        assert_eq!(err.error, "not enough liquidity");
        assert_eq!(err.message, "");

        let body = serde_json::json!({"error": {"code": 12, "message": "?"}});
        let err = parse_rpc_response(SwapErrorContext::Quote, body)
            .expect("failed to parse")
            .expect_err("expected API error");
        assert_eq!(err.code, UNCAUGHT_SWAP_QUOTE_ERROR_CODE);

        assert!(parse_rpc_response(SwapErrorContext::Quote, serde_json::json!({})).is_err());
    }

    #[test]
    fn test_rpc_endpoint() {
        let mut config = Configuration::default();
        assert!(rpc_endpoint(&config).is_err());

        config.api_key = Some("abc".to_string());
        assert_eq!(
            rpc_endpoint(&config).expect("failed to build endpoint").as_str(),
            "https://api.developer.coinbase.com/rpc/v1/base/abc"
        );
    }
}
