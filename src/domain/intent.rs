use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{BracketError, Result};

/// Position direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn is_long(&self) -> bool {
        matches!(self, Direction::Long)
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Inbound trading intent. Immutable once built; validated before any
/// network call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeIntent {
    /// Token symbol, e.g. "ETH"
    pub token: String,
    /// Position notional in USD
    pub notional_usd: Decimal,
    pub leverage: Decimal,
    pub direction: Direction,
    /// Take-profit trigger price in USD
    #[serde(default)]
    pub take_profit_price: Option<Decimal>,
    /// Stop-loss trigger price in USD
    #[serde(default)]
    pub stop_loss_price: Option<Decimal>,
}

impl TradeIntent {
    pub fn market(
        token: impl Into<String>,
        notional_usd: Decimal,
        leverage: Decimal,
        direction: Direction,
    ) -> Self {
        Self {
            token: token.into(),
            notional_usd,
            leverage,
            direction,
            take_profit_price: None,
            stop_loss_price: None,
        }
    }

    pub fn bracketed(
        token: impl Into<String>,
        notional_usd: Decimal,
        leverage: Decimal,
        direction: Direction,
        take_profit_price: Decimal,
        stop_loss_price: Decimal,
    ) -> Self {
        Self {
            token: token.into(),
            notional_usd,
            leverage,
            direction,
            take_profit_price: Some(take_profit_price),
            stop_loss_price: Some(stop_loss_price),
        }
    }

    /// Collateral backing the position in USD
    pub fn collateral_usd(&self) -> Decimal {
        self.notional_usd / self.leverage
    }

    pub fn validate(&self) -> Result<()> {
        if self.notional_usd <= Decimal::ZERO {
            return Err(BracketError::Validation(format!(
                "notional must be positive, got {}",
                self.notional_usd
            )));
        }
        if self.leverage < Decimal::ONE {
            return Err(BracketError::Validation(format!(
                "leverage must be at least 1, got {}",
                self.leverage
            )));
        }
        for (name, price) in [
            ("take profit", self.take_profit_price),
            ("stop loss", self.stop_loss_price),
        ] {
            if let Some(p) = price {
                if p <= Decimal::ZERO {
                    return Err(BracketError::Validation(format!(
                        "{name} price must be positive, got {p}"
                    )));
                }
            }
        }
        if let (Some(tp), Some(sl)) = (self.take_profit_price, self.stop_loss_price) {
            match self.direction {
                Direction::Long if tp <= sl => {
                    return Err(BracketError::InvalidPriceRelationship(format!(
                        "for long positions take profit ({tp}) must be above stop loss ({sl})"
                    )));
                }
                Direction::Short if tp >= sl => {
                    return Err(BracketError::InvalidPriceRelationship(format!(
                        "for short positions take profit ({tp}) must be below stop loss ({sl})"
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn long_bracket_requires_tp_above_sl() {
        let intent = TradeIntent::bracketed(
            "ETH",
            dec!(50),
            dec!(2),
            Direction::Long,
            dec!(2800),
            dec!(3200),
        );
        let err = intent.validate().unwrap_err();
        assert!(matches!(
            err,
            BracketError::InvalidPriceRelationship(_)
        ));
    }

    #[test]
    fn short_bracket_requires_tp_below_sl() {
        let intent = TradeIntent::bracketed(
            "BTC",
            dec!(100),
            dec!(3),
            Direction::Short,
            dec!(70000),
            dec!(60000),
        );
        assert!(intent.validate().is_err());

        let intent = TradeIntent::bracketed(
            "BTC",
            dec!(100),
            dec!(3),
            Direction::Short,
            dec!(60000),
            dec!(70000),
        );
        assert!(intent.validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_amounts() {
        let intent = TradeIntent::market("ETH", dec!(0), dec!(2), Direction::Long);
        assert!(intent.validate().is_err());

        let intent = TradeIntent::market("ETH", dec!(50), dec!(0.5), Direction::Long);
        assert!(intent.validate().is_err());
    }

    #[test]
    fn collateral_is_notional_over_leverage() {
        let intent = TradeIntent::market("ETH", dec!(50), dec!(2), Direction::Long);
        assert_eq!(intent.collateral_usd(), dec!(25));
    }
}
