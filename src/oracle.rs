//! Signed oracle price boundary.

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::error::{BracketError, Result};

/// Oracle max/min price pair for one token, in the market price scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPrice {
    pub max_price_full: U256,
    pub min_price_full: U256,
}

impl TokenPrice {
    /// Midpoint of the oracle spread, used as the mark price.
    pub fn median(&self) -> Result<U256> {
        let sum = self
            .max_price_full
            .checked_add(self.min_price_full)
            .ok_or_else(|| {
                BracketError::ArithmeticOverflow("oracle price pair sum".to_string())
            })?;
        Ok(sum >> 1)
    }
}

/// Read-only price source keyed by index-token address.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn recent_prices(&self) -> Result<HashMap<Address, TokenPrice>>;
}

/// Pick one token's price out of a feed snapshot.
pub fn price_for(prices: &HashMap<Address, TokenPrice>, token: Address) -> Result<TokenPrice> {
    prices
        .get(&token)
        .copied()
        .ok_or_else(|| BracketError::PriceUnavailable(format!("{token}")))
}

/// Client for the exchange's signed-prices REST endpoint.
pub struct SignedPriceClient {
    http: reqwest::Client,
    base_url: String,
}

impl SignedPriceClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();
        url::Url::parse(&base_url)
            .map_err(|e| BracketError::Validation(format!("invalid oracle URL {base_url}: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { http, base_url })
    }
}

#[derive(Debug, Deserialize)]
struct SignedPricesResponse {
    #[serde(rename = "signedPrices")]
    signed_prices: Vec<SignedPrice>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedPrice {
    token_address: String,
    max_price_full: String,
    min_price_full: String,
}

#[async_trait]
impl PriceFeed for SignedPriceClient {
    async fn recent_prices(&self) -> Result<HashMap<Address, TokenPrice>> {
        let url = format!(
            "{}/signed_prices/latest",
            self.base_url.trim_end_matches('/')
        );
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BracketError::Service {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }
        let body: SignedPricesResponse = response.json().await?;

        let mut prices = HashMap::new();
        for entry in body.signed_prices {
            let Ok(token) = Address::from_str(&entry.token_address) else {
                continue;
            };
            let max_price_full = parse_price(&entry.max_price_full)?;
            let min_price_full = parse_price(&entry.min_price_full)?;
            prices.insert(
                token,
                TokenPrice {
                    max_price_full,
                    min_price_full,
                },
            );
        }
        debug!(count = prices.len(), "fetched signed prices");
        Ok(prices)
    }
}

fn parse_price(raw: &str) -> Result<U256> {
    U256::from_str(raw)
        .map_err(|e| BracketError::Validation(format!("invalid oracle price {raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_is_spread_midpoint() {
        let price = TokenPrice {
            max_price_full: U256::from(3100u64),
            min_price_full: U256::from(2900u64),
        };
        assert_eq!(price.median().unwrap(), U256::from(3000u64));
    }

    #[test]
    fn signed_prices_schema_parses() {
        let raw = r#"{
            "signedPrices": [
                {
                    "tokenAddress": "0x82aF49447D8a07e3bd95BD0d56f35241523fBab1",
                    "maxPriceFull": "3000500000000000",
                    "minPriceFull": "2999500000000000",
                    "tokenSymbol": "ETH"
                }
            ]
        }"#;
        let parsed: SignedPricesResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.signed_prices.len(), 1);
        assert_eq!(
            parse_price(&parsed.signed_prices[0].max_price_full).unwrap(),
            U256::from(3_000_500_000_000_000u64)
        );
    }

    #[test]
    fn missing_token_is_price_unavailable() {
        let prices = HashMap::new();
        let err = price_for(&prices, Address::ZERO).unwrap_err();
        assert!(matches!(err, BracketError::PriceUnavailable(_)));
    }
}
