use alloy::primitives::Address;
use std::collections::HashMap;
use std::str::FromStr;

use crate::config::MarketEntry;
use crate::domain::USD_DECIMALS;
use crate::error::{BracketError, Result};

/// Per-token static market data, read-only at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketDescriptor {
    pub symbol: String,
    pub market_key: Address,
    pub index_token: Address,
    pub collateral_token: Address,
    /// Index token decimals; determines the market price scale
    pub token_decimals: u8,
    /// Collateral token decimals (USDC = 6)
    pub collateral_decimals: u8,
}

impl MarketDescriptor {
    /// Exponent of this market's fixed-point price scale: a USD price is
    /// stored on-chain as `usd * 10^(30 - token_decimals)`. Trigger and
    /// acceptable prices must both use this scale; a global constant here
    /// silently prices orders nonsensically on markets with other decimals.
    pub fn price_exponent(&self) -> u32 {
        USD_DECIMALS - u32::from(self.token_decimals)
    }
}

/// Symbol-keyed market lookup table.
#[derive(Debug, Clone)]
pub struct MarketRegistry {
    by_symbol: HashMap<String, MarketDescriptor>,
}

impl MarketRegistry {
    /// Built-in Arbitrum markets.
    pub fn builtin() -> Result<Self> {
        Self::with_overrides(&HashMap::new())
    }

    /// Built-in table merged with (and overridden by) config entries.
    pub fn with_overrides(extra: &HashMap<String, MarketEntry>) -> Result<Self> {
        let mut entries = builtin_entries();
        for (symbol, entry) in extra {
            entries.insert(symbol.to_uppercase(), entry.clone());
        }

        let mut by_symbol = HashMap::new();
        for (symbol, entry) in entries {
            if u32::from(entry.token_decimals) > USD_DECIMALS {
                return Err(BracketError::Validation(format!(
                    "market {symbol}: token decimals {} exceed the {USD_DECIMALS}-decimal USD scale",
                    entry.token_decimals
                )));
            }
            by_symbol.insert(
                symbol.clone(),
                MarketDescriptor {
                    symbol,
                    market_key: parse_address(&entry.market_key)?,
                    index_token: parse_address(&entry.index_token)?,
                    collateral_token: parse_address(&entry.collateral_token)?,
                    token_decimals: entry.token_decimals,
                    collateral_decimals: 6,
                },
            );
        }
        Ok(Self { by_symbol })
    }

    pub fn resolve(&self, symbol: &str) -> Result<&MarketDescriptor> {
        self.by_symbol
            .get(&symbol.to_uppercase())
            .ok_or_else(|| BracketError::UnsupportedToken(symbol.to_string()))
    }

    pub fn symbols(&self) -> Vec<&str> {
        self.by_symbol.keys().map(String::as_str).collect()
    }
}

fn parse_address(raw: &str) -> Result<Address> {
    Address::from_str(raw.trim())
        .map_err(|e| BracketError::Validation(format!("invalid address {raw}: {e}")))
}

fn builtin_entries() -> HashMap<String, MarketEntry> {
    let mut entries = HashMap::new();
    entries.insert(
        "BTC".to_string(),
        MarketEntry {
            market_key: "0x47c031236e19d024b42f8AE6780E44A573170703".to_string(),
            index_token: "0x2f2a2543B76A4166549F7aaB2e75Bef0aefC5B0f".to_string(),
            collateral_token: "0xaf88d065e77c8cC2239327C5EDb3A432268e5831".to_string(),
            token_decimals: 8,
        },
    );
    entries.insert(
        "ETH".to_string(),
        MarketEntry {
            market_key: "0x70d95587d40A2caf56bd97485aB3Eec10Bee6336".to_string(),
            index_token: "0x82aF49447D8a07e3bd95BD0d56f35241523fBab1".to_string(),
            collateral_token: "0xaf88d065e77c8cC2239327C5EDb3A432268e5831".to_string(),
            token_decimals: 18,
        },
    );
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_builtin_symbols_case_insensitively() {
        let registry = MarketRegistry::builtin().unwrap();
        let eth = registry.resolve("eth").unwrap();
        assert_eq!(eth.symbol, "ETH");
        assert_eq!(eth.token_decimals, 18);
        assert!(registry.resolve("BTC").is_ok());
    }

    #[test]
    fn unknown_symbol_is_unsupported() {
        let registry = MarketRegistry::builtin().unwrap();
        let err = registry.resolve("DOGE").unwrap_err();
        assert!(matches!(err, BracketError::UnsupportedToken(_)));
    }

    #[test]
    fn price_exponent_is_market_specific() {
        let registry = MarketRegistry::builtin().unwrap();
        // BTC (8 decimals) prices in 1e22, ETH (18 decimals) in 1e12
        assert_eq!(registry.resolve("BTC").unwrap().price_exponent(), 22);
        assert_eq!(registry.resolve("ETH").unwrap().price_exponent(), 12);
    }

    #[test]
    fn config_entries_override_builtin() {
        let mut extra = HashMap::new();
        extra.insert(
            "eth".to_string(),
            MarketEntry {
                market_key: "0x70d95587d40A2caf56bd97485aB3Eec10Bee6336".to_string(),
                index_token: "0x82aF49447D8a07e3bd95BD0d56f35241523fBab1".to_string(),
                collateral_token: "0xaf88d065e77c8cC2239327C5EDb3A432268e5831".to_string(),
                token_decimals: 9,
            },
        );
        let registry = MarketRegistry::with_overrides(&extra).unwrap();
        assert_eq!(registry.resolve("ETH").unwrap().token_decimals, 9);
    }
}
