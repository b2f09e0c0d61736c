use alloy::primitives::{Address, B256, I256, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{BracketError, Result};

/// Protocol-wide USD fixed point: notional sizes carry 30 decimals.
pub const USD_DECIMALS: u32 = 30;

/// On-chain order kind. Discriminants are the protocol enum values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    /// Open or grow a position at market
    MarketIncrease,
    /// Close or shrink a position at market
    MarketDecrease,
    /// Take-profit: decrease once price reaches the trigger
    LimitDecrease,
    /// Stop-loss: protective decrease once price crosses the trigger
    StopLossDecrease,
}

impl OrderKind {
    pub fn as_u8(self) -> u8 {
        match self {
            OrderKind::MarketIncrease => 2,
            OrderKind::MarketDecrease => 4,
            OrderKind::LimitDecrease => 5,
            OrderKind::StopLossDecrease => 6,
        }
    }

    pub fn is_increase(self) -> bool {
        matches!(self, OrderKind::MarketIncrease)
    }

    pub fn is_decrease(self) -> bool {
        !self.is_increase()
    }

    /// Conditional orders carrying a trigger price
    pub fn is_trigger(self) -> bool {
        matches!(self, OrderKind::LimitDecrease | OrderKind::StopLossDecrease)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderKind::MarketIncrease => "market_increase",
            OrderKind::MarketDecrease => "market_decrease",
            OrderKind::LimitDecrease => "limit_decrease",
            OrderKind::StopLossDecrease => "stop_loss_decrease",
        }
    }
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Post-decrease swap behavior. We never swap on decrease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecreaseSwapType {
    #[default]
    NoSwap,
    SwapPnlTokenToCollateral,
    SwapCollateralToPnlToken,
}

impl DecreaseSwapType {
    pub fn as_u8(self) -> u8 {
        match self {
            DecreaseSwapType::NoSwap => 0,
            DecreaseSwapType::SwapPnlTokenToCollateral => 1,
            DecreaseSwapType::SwapCollateralToPnlToken => 2,
        }
    }
}

/// Protocol-ready numeric fields for one order, computed fresh per attempt.
/// The signed transaction, not this struct, is the source of truth.
#[derive(Debug, Clone)]
pub struct OrderParameters {
    pub kind: OrderKind,
    pub is_long: bool,
    /// Signed size change in 1e30 USD: positive increases, negative decreases
    pub size_delta_usd: I256,
    /// Collateral change in collateral-token units
    pub collateral_delta: U256,
    /// Market price scale; zero for market orders
    pub trigger_price: U256,
    /// Worst acceptable fill price, same scale as the trigger price
    pub acceptable_price: U256,
    /// Keeper fee in native wei, already buffered
    pub execution_fee: U256,
    pub callback_gas_limit: U256,
    pub min_output_amount: U256,
    pub swap_path: Vec<Address>,
    pub decrease_swap_type: DecreaseSwapType,
    pub auto_cancel: bool,
    pub referral_code: B256,
}

impl OrderParameters {
    /// Kind and size-delta sign must agree; trigger price presence must
    /// match the kind. Violations mean a construction bug upstream.
    pub fn validate(&self) -> Result<()> {
        if self.size_delta_usd.is_zero() {
            return Err(BracketError::Validation("size delta is zero".into()));
        }
        if self.kind.is_increase() && self.size_delta_usd.is_negative() {
            return Err(BracketError::Validation(format!(
                "{} order with negative size delta",
                self.kind
            )));
        }
        if self.kind.is_decrease() && !self.size_delta_usd.is_negative() {
            return Err(BracketError::Validation(format!(
                "{} order with positive size delta",
                self.kind
            )));
        }
        if self.kind.is_trigger() && self.trigger_price.is_zero() {
            return Err(BracketError::Validation(format!(
                "{} order without trigger price",
                self.kind
            )));
        }
        if !self.kind.is_trigger() && !self.trigger_price.is_zero() {
            return Err(BracketError::Validation(format!(
                "{} order with trigger price set",
                self.kind
            )));
        }
        Ok(())
    }

    pub fn size_delta_abs(&self) -> U256 {
        self.size_delta_usd.unsigned_abs()
    }
}

/// Convert a human-readable decimal amount into `value * 10^exponent`,
/// failing loudly on overflow or on precision the target scale cannot hold.
pub fn to_fixed(value: Decimal, exponent: u32) -> Result<U256> {
    if value.is_sign_negative() {
        return Err(BracketError::Validation(format!(
            "amount must be non-negative, got {value}"
        )));
    }
    let scale = value.scale();
    let mantissa = U256::from(value.mantissa().unsigned_abs());
    if scale <= exponent {
        let factor = U256::from(10u8)
            .checked_pow(U256::from(exponent - scale))
            .ok_or_else(|| {
                BracketError::ArithmeticOverflow(format!("10^{} out of range", exponent - scale))
            })?;
        mantissa
            .checked_mul(factor)
            .ok_or_else(|| BracketError::ArithmeticOverflow(format!("{value} at 1e{exponent}")))
    } else {
        let divisor = U256::from(10u8).pow(U256::from(scale - exponent));
        let (quotient, remainder) = mantissa.div_rem(divisor);
        if !remainder.is_zero() {
            return Err(BracketError::Validation(format!(
                "{value} carries more precision than 1e-{exponent} units"
            )));
        }
        Ok(quotient)
    }
}
