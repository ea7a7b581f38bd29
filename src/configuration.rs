use anyhow::{anyhow, Context, Result};
use ethers::types::Address;
use log::debug;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::env;
use std::time::Duration;
use url::Url;

use crate::types::ChainId;

pub const DEFAULT_API_BASE_URL: &str = "https://api.developer.coinbase.com/rpc/v1/base/";
pub const BASE_CHAIN_ID: ChainId = 8453;
pub const DEFAULT_MAX_SLIPPAGE: f64 = 3.0;
pub const DEFAULT_POLLING_INTERVAL_MS: u64 = 1000;

static CONFIG: Lazy<RwLock<Configuration>> = Lazy::new(|| RwLock::new(Configuration::default()));

#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub api_key: Option<String>,
    pub api_base_url: Url,
    pub chain_id: ChainId,
    pub address: Option<Address>,
    pub rpc_url: Option<Url>,
    pub polling_interval_ms: u64,
    pub max_slippage: f64,
    pub use_aggregator: bool,
    pub is_sponsored: bool,
    pub paymaster_url: Option<Url>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: Url::parse(DEFAULT_API_BASE_URL).expect("default API base URL is valid"),
            chain_id: BASE_CHAIN_ID,
            address: None,
            rpc_url: None,
            polling_interval_ms: DEFAULT_POLLING_INTERVAL_MS,
            max_slippage: DEFAULT_MAX_SLIPPAGE,
            use_aggregator: false,
            is_sponsored: false,
            paymaster_url: None,
        }
    }
}

/// Partial update merged into the current configuration; `None` fields are
/// left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigUpdate {
    pub api_key: Option<String>,
    pub chain_id: Option<ChainId>,
    pub address: Option<Address>,
    pub rpc_url: Option<Url>,
    pub paymaster_url: Option<Url>,
}

impl Configuration {
    pub fn get_from_environment() -> Result<Self> {
        let defaults = Self::default();

        let api_key = collect_optional_environment_variable("API_KEY")?;
        let api_base_url = collect_optional_environment_variable("API_BASE_URL")?
            .map(|url| parse_base_url(&url))
            .transpose()?
            .unwrap_or(defaults.api_base_url);
        let chain_id = collect_optional_environment_variable("CHAIN_ID")?
            .map(|var| var.parse::<ChainId>())
            .transpose()?
            .unwrap_or(defaults.chain_id);
        let address = collect_optional_environment_variable("ACCOUNT_ADDRESS")?
            .map(|var| var.parse::<Address>())
            .transpose()?;
        let rpc_url = collect_optional_environment_variable("RPC_URL")?
            .map(|var| Url::parse(&var))
            .transpose()?;
        let polling_interval_ms = collect_optional_environment_variable("POLLING_INTERVAL_MS")?
            .map(|var| var.parse::<u64>())
            .transpose()?
            .unwrap_or(defaults.polling_interval_ms);
        let max_slippage = collect_optional_environment_variable("MAX_SLIPPAGE")?
            .map(|var| var.parse::<f64>())
            .transpose()?
            .unwrap_or(defaults.max_slippage);
        let use_aggregator = collect_optional_environment_variable("USE_AGGREGATOR")?
            .map(|var| var.parse::<bool>())
            .transpose()?
            .unwrap_or(defaults.use_aggregator);
        let is_sponsored = collect_optional_environment_variable("IS_SPONSORED")?
            .map(|var| var.parse::<bool>())
            .transpose()?
            .unwrap_or(defaults.is_sponsored);
        let paymaster_url = collect_optional_environment_variable("PAYMASTER_URL")?
            .map(|var| Url::parse(&var))
            .transpose()?;

        if !(0.0..=100.0).contains(&max_slippage) {
            return Err(anyhow!(
                "`max_slippage` must be a percentage between 0 and 100, got {}",
                max_slippage
            ));
        }
        if is_sponsored && paymaster_url.is_none() {
            return Err(anyhow!("`paymaster_url` must be set when `is_sponsored` is"));
        }

        Ok(Self {
            api_key,
            api_base_url,
            chain_id,
            address,
            rpc_url,
            polling_interval_ms,
            max_slippage,
            use_aggregator,
            is_sponsored,
            paymaster_url,
        })
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }

    /// The paymaster to attach to batches, if sponsorship is on.
    pub fn sponsorship(&self) -> Option<Url> {
        if self.is_sponsored {
            self.paymaster_url.clone()
        } else {
            None
        }
    }

    fn merge(&mut self, update: ConfigUpdate) {
        if let Some(api_key) = update.api_key {
            self.api_key = Some(api_key);
        }
        if let Some(chain_id) = update.chain_id {
            self.chain_id = chain_id;
        }
        if let Some(address) = update.address {
            self.address = Some(address);
        }
        if let Some(rpc_url) = update.rpc_url {
            self.rpc_url = Some(rpc_url);
        }
        if let Some(paymaster_url) = update.paymaster_url {
            self.paymaster_url = Some(paymaster_url);
        }
    }
}

/// Replaces the process-wide configuration. Called once at startup.
pub fn init_config(config: Configuration) {
    *CONFIG.write() = config;
}

pub fn update_config(update: ConfigUpdate) {
    debug!("updating configuration with {:?}", update);
    CONFIG.write().merge(update);
}

pub fn get_config() -> Configuration {
    CONFIG.read().clone()
}

// `Url::join` drops the last path segment unless the base ends with a slash.
fn parse_base_url(raw: &str) -> Result<Url> {
    let raw = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    Url::parse(&raw).context(format!("`{}` is not a valid URL", raw))
}

pub fn collect_required_environment_variable(key: &str) -> Result<String> {
    env::var(key).context(format!("required environment variable {} not set", key))
}

pub fn collect_optional_environment_variable(key: &str) -> Result<Option<String>> {
    match env::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(_) => {
            debug!(
                "environment variable {} not set but it wasn't required",
                key
            );
            Ok(None)
        }
    }
}
