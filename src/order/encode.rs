//! Serialize order parameters into the exchange router multicall.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;

use crate::chain::contracts::{
    CreateOrderAddresses, CreateOrderNumbers, CreateOrderParams, IExchangeRouter,
};
use crate::domain::{MarketDescriptor, OrderParameters};
use crate::error::{BracketError, Result};

/// Static addresses the encoder threads into every order.
#[derive(Debug, Clone, Copy)]
pub struct EncodeContext {
    /// Position owner and proceeds receiver (the funding wallet)
    pub receiver: Address,
    /// Vault receiving the fee and collateral sub-calls
    pub order_vault: Address,
    /// Wrapped native token; native collateral folds into the call value
    pub wrapped_native: Address,
}

/// Encoded router sub-calls plus the native value to attach.
#[derive(Debug, Clone)]
pub struct EncodedOrder {
    pub calls: Vec<Bytes>,
    pub value: U256,
}

/// Deterministically encode one order as the router multicall sequence:
/// fee deposit, collateral transfer (increase orders with ERC-20
/// collateral), then the createOrder tuple.
pub fn encode_order_multicall(
    params: &OrderParameters,
    market: &MarketDescriptor,
    ctx: &EncodeContext,
) -> Result<EncodedOrder> {
    params.validate()?;

    let create = CreateOrderParams {
        addresses: CreateOrderAddresses {
            receiver: ctx.receiver,
            cancellationReceiver: ctx.receiver,
            callbackContract: Address::ZERO,
            uiFeeReceiver: Address::ZERO,
            market: market.market_key,
            initialCollateralToken: market.collateral_token,
            swapPath: params.swap_path.clone(),
        },
        numbers: CreateOrderNumbers {
            sizeDeltaUsd: params.size_delta_abs(),
            initialCollateralDeltaAmount: params.collateral_delta,
            triggerPrice: params.trigger_price,
            acceptablePrice: params.acceptable_price,
            executionFee: params.execution_fee,
            callbackGasLimit: params.callback_gas_limit,
            minOutputAmount: params.min_output_amount,
            validFromTime: U256::ZERO,
        },
        orderType: params.kind.as_u8(),
        decreasePositionSwapType: params.decrease_swap_type.as_u8(),
        isLong: params.is_long,
        shouldUnwrapNativeToken: true,
        autoCancel: params.auto_cancel,
        referralCode: params.referral_code,
    };

    let native_collateral = market.collateral_token == ctx.wrapped_native;
    let mut value = params.execution_fee;
    if params.kind.is_increase() && native_collateral {
        value = value.checked_add(params.collateral_delta).ok_or_else(|| {
            BracketError::ArithmeticOverflow("native collateral plus execution fee".into())
        })?;
    }

    let mut calls = Vec::with_capacity(3);
    calls.push(Bytes::from(
        IExchangeRouter::sendWntCall {
            receiver: ctx.order_vault,
            amount: value,
        }
        .abi_encode(),
    ));
    if params.kind.is_increase() && !native_collateral {
        calls.push(Bytes::from(
            IExchangeRouter::sendTokensCall {
                token: market.collateral_token,
                receiver: ctx.order_vault,
                amount: params.collateral_delta,
            }
            .abi_encode(),
        ));
    }
    calls.push(Bytes::from(
        IExchangeRouter::createOrderCall { params: create }.abi_encode(),
    ));

    Ok(EncodedOrder { calls, value })
}
