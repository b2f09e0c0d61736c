//! Order parameter construction: pure computation from a trade intent and a
//! live oracle price into protocol-ready numeric fields.

use alloy::primitives::{Sign, B256, I256, U256};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::debug;

use crate::config::{GasLimits, TradingConfig};
use crate::domain::{
    to_fixed, DecreaseSwapType, Direction, MarketDescriptor, OrderKind, OrderParameters,
    TradeIntent, USD_DECIMALS,
};
use crate::error::{BracketError, Result};
use crate::oracle::TokenPrice;

const PPM: u64 = 1_000_000;

/// Inputs shared by every build in one run besides the intent itself.
pub struct BuildContext<'a> {
    pub market: &'a MarketDescriptor,
    pub price: TokenPrice,
    /// Live gas price in wei
    pub gas_price: u128,
    pub trading: &'a TradingConfig,
    pub gas: &'a GasLimits,
}

/// Build the numeric fields for one order. Pure over its inputs; fails
/// before anything touches the network.
pub fn build_order_parameters(
    intent: &TradeIntent,
    kind: OrderKind,
    ctx: &BuildContext<'_>,
) -> Result<OrderParameters> {
    intent.validate()?;

    let mark_price = ctx.price.median()?;
    let is_long = intent.direction.is_long();

    let size_abs = to_fixed(intent.notional_usd, USD_DECIMALS)?;
    let sign = if kind.is_increase() {
        Sign::Positive
    } else {
        Sign::Negative
    };
    let size_delta_usd = I256::checked_from_sign_and_abs(sign, size_abs).ok_or_else(|| {
        BracketError::ArithmeticOverflow(format!("size delta {}", intent.notional_usd))
    })?;

    let collateral = intent.collateral_usd().round_dp_with_strategy(
        u32::from(ctx.market.collateral_decimals),
        RoundingStrategy::ToZero,
    );
    let collateral_delta = to_fixed(collateral, u32::from(ctx.market.collateral_decimals))?;

    let slippage_ppm = fraction_ppm(ctx.trading.slippage)?;
    let sl_slippage_ppm =
        fraction_ppm(ctx.trading.slippage * ctx.trading.stop_loss_slippage_multiplier)?;

    let (trigger_price, acceptable_price) = match kind {
        // Market orders bound slippage around the mark price: opening pays
        // up to slippage above (long) / below (short), closing the inverse.
        OrderKind::MarketIncrease => {
            let acceptable = adjust_by_ppm(mark_price, slippage_ppm, is_long)?;
            (U256::ZERO, acceptable)
        }
        OrderKind::MarketDecrease => {
            let acceptable = adjust_by_ppm(mark_price, slippage_ppm, !is_long)?;
            (U256::ZERO, acceptable)
        }
        // Conditional orders anchor the bound at their trigger price.
        OrderKind::LimitDecrease => {
            let trigger = trigger_price_fixed(
                intent.take_profit_price,
                "take profit",
                ctx.market.price_exponent(),
            )?;
            validate_trigger_side(kind, intent.direction, trigger, mark_price)?;
            let acceptable = adjust_by_ppm(trigger, slippage_ppm, !is_long)?;
            (trigger, acceptable)
        }
        OrderKind::StopLossDecrease => {
            let trigger = trigger_price_fixed(
                intent.stop_loss_price,
                "stop loss",
                ctx.market.price_exponent(),
            )?;
            validate_trigger_side(kind, intent.direction, trigger, mark_price)?;
            let acceptable = adjust_by_ppm(trigger, sl_slippage_ppm, !is_long)?;
            (trigger, acceptable)
        }
    };

    let execution_fee = execution_fee(
        ctx.gas.for_kind(kind),
        ctx.gas_price,
        ctx.trading.execution_buffer,
    )?;

    debug!(
        kind = %kind,
        token = %intent.token,
        %mark_price,
        %trigger_price,
        %acceptable_price,
        %execution_fee,
        "built order parameters"
    );

    Ok(OrderParameters {
        kind,
        is_long,
        size_delta_usd,
        collateral_delta,
        trigger_price,
        acceptable_price,
        execution_fee,
        callback_gas_limit: U256::ZERO,
        min_output_amount: U256::ZERO,
        swap_path: Vec::new(),
        decrease_swap_type: DecreaseSwapType::NoSwap,
        auto_cancel: ctx.trading.auto_cancel,
        referral_code: B256::ZERO,
    })
}

fn trigger_price_fixed(price: Option<Decimal>, name: &str, exponent: u32) -> Result<U256> {
    let price = price.ok_or_else(|| {
        BracketError::Validation(format!("{name} price required for this order kind"))
    })?;
    to_fixed(price, exponent)
}

/// The trigger must sit on the profitable (TP) or losing (SL) side of the
/// current mark price for the stated direction.
fn validate_trigger_side(
    kind: OrderKind,
    direction: Direction,
    trigger: U256,
    mark: U256,
) -> Result<()> {
    let ok = match (kind, direction) {
        (OrderKind::LimitDecrease, Direction::Long) => trigger > mark,
        (OrderKind::LimitDecrease, Direction::Short) => trigger < mark,
        (OrderKind::StopLossDecrease, Direction::Long) => trigger < mark,
        (OrderKind::StopLossDecrease, Direction::Short) => trigger > mark,
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(BracketError::InvalidPriceRelationship(format!(
            "{kind} trigger {trigger} is on the wrong side of mark price {mark} for a {direction} position"
        )))
    }
}

/// Scale `price` by `(1 ± ppm/1e6)`.
fn adjust_by_ppm(price: U256, ppm: U256, up: bool) -> Result<U256> {
    let denom = U256::from(PPM);
    let factor = if up {
        denom
            .checked_add(ppm)
            .ok_or_else(|| BracketError::ArithmeticOverflow("slippage factor".into()))?
    } else {
        denom.checked_sub(ppm).ok_or_else(|| {
            BracketError::Validation("slippage of 100% or more is not meaningful".into())
        })?
    };
    let scaled = price
        .checked_mul(factor)
        .ok_or_else(|| BracketError::ArithmeticOverflow(format!("price {price} adjustment")))?;
    Ok(scaled / denom)
}

/// Express a decimal fraction (0.005) or factor (1.3) in parts per million.
fn fraction_ppm(value: Decimal) -> Result<U256> {
    if value.is_sign_negative() {
        return Err(BracketError::Validation(format!(
            "fraction must be non-negative, got {value}"
        )));
    }
    let scaled = (value * Decimal::from(PPM))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let ppm = scaled
        .to_u128()
        .ok_or_else(|| BracketError::Validation(format!("fraction out of range: {value}")))?;
    Ok(U256::from(ppm))
}

/// Keeper fee: gas-limit table entry for the kind at the live gas price,
/// widened by the buffer to absorb drift until inclusion.
fn execution_fee(gas_limit: u64, gas_price: u128, buffer: Decimal) -> Result<U256> {
    let raw = U256::from(gas_limit)
        .checked_mul(U256::from(gas_price))
        .ok_or_else(|| BracketError::ArithmeticOverflow("execution fee".into()))?;
    let buffer_ppm = fraction_ppm(buffer)?;
    let buffered = raw
        .checked_mul(buffer_ppm)
        .ok_or_else(|| BracketError::ArithmeticOverflow("buffered execution fee".into()))?;
    Ok(buffered / U256::from(PPM))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MarketRegistry;
    use rust_decimal_macros::dec;

    fn eth_price(mark_usd: u64) -> TokenPrice {
        // ETH price scale is 1e12
        let fixed = U256::from(mark_usd) * U256::from(10u8).pow(U256::from(12u8));
        TokenPrice {
            max_price_full: fixed,
            min_price_full: fixed,
        }
    }

    fn context<'a>(
        market: &'a MarketDescriptor,
        trading: &'a TradingConfig,
        gas: &'a GasLimits,
        price: TokenPrice,
    ) -> BuildContext<'a> {
        BuildContext {
            market,
            price,
            gas_price: 10_000_000_000, // 10 gwei
            trading,
            gas,
        }
    }

    fn eth_market() -> MarketDescriptor {
        MarketRegistry::builtin()
            .unwrap()
            .resolve("ETH")
            .unwrap()
            .clone()
    }

    fn scale(exp: u32) -> U256 {
        U256::from(10u8).pow(U256::from(exp))
    }

    #[test]
    fn open_long_inflates_acceptable_price() {
        let market = eth_market();
        let trading = TradingConfig::default();
        let gas = GasLimits::default();
        let ctx = context(&market, &trading, &gas, eth_price(3000));
        let intent = TradeIntent::market("ETH", dec!(50), dec!(2), Direction::Long);

        let params = build_order_parameters(&intent, OrderKind::MarketIncrease, &ctx).unwrap();
        let mark = U256::from(3000u64) * scale(12);
        // 0.5% above mark
        assert_eq!(params.acceptable_price, mark * U256::from(1_005_000u64) / U256::from(PPM));
        assert_eq!(params.trigger_price, U256::ZERO);
        assert!(params.acceptable_price > mark);
    }

    #[test]
    fn open_short_deflates_acceptable_price() {
        let market = eth_market();
        let trading = TradingConfig::default();
        let gas = GasLimits::default();
        let ctx = context(&market, &trading, &gas, eth_price(3000));
        let intent = TradeIntent::market("ETH", dec!(50), dec!(2), Direction::Short);

        let params = build_order_parameters(&intent, OrderKind::MarketIncrease, &ctx).unwrap();
        let mark = U256::from(3000u64) * scale(12);
        assert!(params.acceptable_price < mark);
    }

    #[test]
    fn closing_inverts_the_slippage_side() {
        let market = eth_market();
        let trading = TradingConfig::default();
        let gas = GasLimits::default();
        let mark = U256::from(3000u64) * scale(12);

        let ctx = context(&market, &trading, &gas, eth_price(3000));
        let long = TradeIntent::market("ETH", dec!(50), dec!(2), Direction::Long);
        let short = TradeIntent::market("ETH", dec!(50), dec!(2), Direction::Short);

        let close_long = build_order_parameters(&long, OrderKind::MarketDecrease, &ctx).unwrap();
        assert!(close_long.acceptable_price < mark);
        assert!(close_long.size_delta_usd.is_negative());

        let close_short = build_order_parameters(&short, OrderKind::MarketDecrease, &ctx).unwrap();
        assert!(close_short.acceptable_price > mark);
    }

    #[test]
    fn take_profit_anchors_at_trigger() {
        let market = eth_market();
        let trading = TradingConfig::default();
        let gas = GasLimits::default();
        let ctx = context(&market, &trading, &gas, eth_price(3000));
        let intent =
            TradeIntent::bracketed("ETH", dec!(50), dec!(2), Direction::Long, dec!(3300), dec!(2850));

        let params = build_order_parameters(&intent, OrderKind::LimitDecrease, &ctx).unwrap();
        let trigger = U256::from(3300u64) * scale(12);
        assert_eq!(params.trigger_price, trigger);
        // selling: bound slightly below trigger
        assert_eq!(
            params.acceptable_price,
            trigger * U256::from(995_000u64) / U256::from(PPM)
        );
        assert!(params.size_delta_usd.is_negative());
    }

    #[test]
    fn stop_loss_widens_slippage() {
        let market = eth_market();
        let trading = TradingConfig::default();
        let gas = GasLimits::default();
        let ctx = context(&market, &trading, &gas, eth_price(3000));
        let intent =
            TradeIntent::bracketed("ETH", dec!(50), dec!(2), Direction::Long, dec!(3300), dec!(2850));

        let params = build_order_parameters(&intent, OrderKind::StopLossDecrease, &ctx).unwrap();
        let trigger = U256::from(2850u64) * scale(12);
        assert_eq!(params.trigger_price, trigger);
        // emergency exit: 2x the 0.5% slippage, below trigger for a long
        assert_eq!(
            params.acceptable_price,
            trigger * U256::from(990_000u64) / U256::from(PPM)
        );
    }

    #[test]
    fn trigger_on_wrong_side_of_mark_is_rejected() {
        let market = eth_market();
        let trading = TradingConfig::default();
        let gas = GasLimits::default();
        let ctx = context(&market, &trading, &gas, eth_price(3000));

        // TP below mark for a long
        let intent =
            TradeIntent::bracketed("ETH", dec!(50), dec!(2), Direction::Long, dec!(2900), dec!(2800));
        let err = build_order_parameters(&intent, OrderKind::LimitDecrease, &ctx).unwrap_err();
        assert!(matches!(err, BracketError::InvalidPriceRelationship(_)));

        // SL above mark for a long
        let intent =
            TradeIntent::bracketed("ETH", dec!(50), dec!(2), Direction::Long, dec!(3300), dec!(3100));
        let err = build_order_parameters(&intent, OrderKind::StopLossDecrease, &ctx).unwrap_err();
        assert!(matches!(err, BracketError::InvalidPriceRelationship(_)));
    }

    #[test]
    fn trigger_scale_is_market_specific() {
        let registry = MarketRegistry::builtin().unwrap();
        let btc = registry.resolve("BTC").unwrap().clone();
        let trading = TradingConfig::default();
        let gas = GasLimits::default();

        // BTC price scale is 1e22
        let mark = U256::from(60_000u64) * scale(22);
        let price = TokenPrice {
            max_price_full: mark,
            min_price_full: mark,
        };
        let ctx = context(&btc, &trading, &gas, price);
        let intent = TradeIntent::bracketed(
            "BTC",
            dec!(100),
            dec!(2),
            Direction::Long,
            dec!(66000),
            dec!(57000),
        );

        let params = build_order_parameters(&intent, OrderKind::LimitDecrease, &ctx).unwrap();
        assert_eq!(params.trigger_price, U256::from(66_000u64) * scale(22));
    }

    #[test]
    fn sizes_expand_into_protocol_fixed_point() {
        let market = eth_market();
        let trading = TradingConfig::default();
        let gas = GasLimits::default();
        let ctx = context(&market, &trading, &gas, eth_price(3000));
        let intent = TradeIntent::market("ETH", dec!(50), dec!(2), Direction::Long);

        let params = build_order_parameters(&intent, OrderKind::MarketIncrease, &ctx).unwrap();
        // $50 notional in 1e30
        assert_eq!(
            params.size_delta_usd.unsigned_abs(),
            U256::from(50u8) * scale(30)
        );
        // $25 collateral in USDC 1e6
        assert_eq!(params.collateral_delta, U256::from(25_000_000u64));
    }

    #[test]
    fn execution_fee_is_buffered_gas_cost() {
        let market = eth_market();
        let trading = TradingConfig::default();
        let gas = GasLimits {
            increase_order: 2_000_000,
            decrease_order: 1_000_000,
        };
        let ctx = context(&market, &trading, &gas, eth_price(3000));
        let intent = TradeIntent::market("ETH", dec!(50), dec!(2), Direction::Long);

        let params = build_order_parameters(&intent, OrderKind::MarketIncrease, &ctx).unwrap();
        // 2e6 gas * 10 gwei * 1.3
        let expected = U256::from(2_000_000u64) * U256::from(10_000_000_000u128)
            * U256::from(1_300_000u64)
            / U256::from(PPM);
        assert_eq!(params.execution_fee, expected);
    }
}
