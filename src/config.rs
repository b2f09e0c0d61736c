use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::OrderKind;
use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub safe: SafeConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub gas: GasLimits,
    /// Extra market entries merged over the built-in table, keyed by symbol
    #[serde(default)]
    pub markets: HashMap<String, MarketEntry>,
    /// Directory for proposal payload artifacts
    #[serde(default = "default_payload_dir")]
    pub payload_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC endpoint
    pub rpc_url: String,
    pub chain_id: u64,
    /// Exchange router contract (multicall entry point)
    pub exchange_router: String,
    /// Order vault receiving fee + collateral sub-calls
    pub order_vault: String,
    /// Wrapped native token; native-collateral orders fold collateral into value
    pub wrapped_native: String,
    /// Contract allowed to pull collateral (approval spender)
    pub approval_spender: String,
    /// Signed-prices oracle endpoint
    pub oracle_url: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        // Arbitrum One deployment
        Self {
            rpc_url: "https://arb1.arbitrum.io/rpc".to_string(),
            chain_id: 42161,
            exchange_router: "0x7452c558d45f8afC8c83dAe62C3f8A5BE19c71f6".to_string(),
            order_vault: "0x31eF83a530Fde1B38EE9A18093A333D8Bbbc40D5".to_string(),
            wrapped_native: "0x82aF49447D8a07e3bd95BD0d56f35241523fBab1".to_string(),
            approval_spender: "0x7452c558d45f8afC8c83dAe62C3f8A5BE19c71f6".to_string(),
            oracle_url: "https://arbitrum-api.gmxinfra.io".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SafeConfig {
    /// Safe wallet address; unset means direct-key funding
    #[serde(default)]
    pub address: Option<String>,
    /// Safe transaction service base URL
    #[serde(default)]
    pub service_url: Option<String>,
    /// Optional transaction service API key (Token auth)
    #[serde(default)]
    pub api_key: Option<String>,
    /// Wait between proposing and triggering execution, so the service can
    /// index the proposal before it is polled
    #[serde(default = "default_settle_delay_secs")]
    pub settle_delay_secs: u64,
    /// Trigger on-chain execution after each proposal
    #[serde(default)]
    pub auto_execute: bool,
}

impl SafeConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }
}

impl Default for SafeConfig {
    fn default() -> Self {
        Self {
            address: None,
            service_url: None,
            api_key: None,
            settle_delay_secs: default_settle_delay_secs(),
            auto_execute: false,
        }
    }
}

fn default_settle_delay_secs() -> u64 {
    15
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// Slippage fraction (e.g. 0.005 = 0.5%)
    #[serde(default = "default_slippage")]
    pub slippage: Decimal,
    /// Stop-loss orders widen slippage by this factor; fill certainty
    /// outweighs price precision on the emergency exit
    #[serde(default = "default_sl_multiplier")]
    pub stop_loss_slippage_multiplier: Decimal,
    /// Execution fee buffer absorbing gas drift between build and inclusion
    #[serde(default = "default_execution_buffer")]
    pub execution_buffer: Decimal,
    /// Protocol auto-cancel flag on created orders
    #[serde(default)]
    pub auto_cancel: bool,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            slippage: default_slippage(),
            stop_loss_slippage_multiplier: default_sl_multiplier(),
            execution_buffer: default_execution_buffer(),
            auto_cancel: false,
        }
    }
}

fn default_slippage() -> Decimal {
    Decimal::new(5, 3) // 0.005
}

fn default_sl_multiplier() -> Decimal {
    Decimal::TWO
}

fn default_execution_buffer() -> Decimal {
    Decimal::new(13, 1) // 1.3
}

/// Keeper gas-limit table per order kind, used for execution fee estimates
#[derive(Debug, Clone, Deserialize)]
pub struct GasLimits {
    #[serde(default = "default_increase_gas")]
    pub increase_order: u64,
    #[serde(default = "default_decrease_gas")]
    pub decrease_order: u64,
}

impl Default for GasLimits {
    fn default() -> Self {
        Self {
            increase_order: default_increase_gas(),
            decrease_order: default_decrease_gas(),
        }
    }
}

fn default_increase_gas() -> u64 {
    4_000_000
}

fn default_decrease_gas() -> u64 {
    4_000_000
}

impl GasLimits {
    pub fn for_kind(&self, kind: OrderKind) -> u64 {
        match kind {
            OrderKind::MarketIncrease => self.increase_order,
            OrderKind::MarketDecrease
            | OrderKind::LimitDecrease
            | OrderKind::StopLossDecrease => self.decrease_order,
        }
    }
}

/// Raw per-token market entry as it appears in config files
#[derive(Debug, Clone, Deserialize)]
pub struct MarketEntry {
    pub market_key: String,
    pub index_token: String,
    pub collateral_token: String,
    pub token_decimals: u8,
}

fn default_payload_dir() -> PathBuf {
    PathBuf::from("data_store")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            chain: ChainConfig::default(),
            safe: SafeConfig::default(),
            trading: TradingConfig::default(),
            gas: GasLimits::default(),
            markets: HashMap::new(),
            payload_dir: default_payload_dir(),
        }
    }
}

impl AppConfig {
    /// Load from `config/bracket.toml` (optional) merged with
    /// `BRACKET__`-prefixed environment variables.
    pub fn load() -> Result<Self> {
        Self::from_sources(None)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_sources(Some(path))
    }

    fn from_sources(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        builder = match path {
            Some(p) => builder.add_source(File::from(p)),
            None => builder.add_source(File::with_name("config/bracket").required(false)),
        };
        let cfg = builder
            .add_source(Environment::with_prefix("BRACKET").separator("__"))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn defaults_target_arbitrum() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.chain.chain_id, 42161);
        assert_eq!(cfg.safe.settle_delay_secs, 15);
        assert_eq!(cfg.trading.slippage, dec!(0.005));
        assert_eq!(cfg.trading.execution_buffer, dec!(1.3));
        assert_eq!(cfg.trading.stop_loss_slippage_multiplier, dec!(2));
        assert!(!cfg.safe.auto_execute);
    }

    #[test]
    fn gas_table_lookup_by_kind() {
        let gas = GasLimits {
            increase_order: 10,
            decrease_order: 20,
        };
        assert_eq!(gas.for_kind(OrderKind::MarketIncrease), 10);
        assert_eq!(gas.for_kind(OrderKind::MarketDecrease), 20);
        assert_eq!(gas.for_kind(OrderKind::LimitDecrease), 20);
        assert_eq!(gas.for_kind(OrderKind::StopLossDecrease), 20);
    }
}
