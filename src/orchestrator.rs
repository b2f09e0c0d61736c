//! Sequential position orchestrator: approval, opening order, take-profit
//! and stop-loss legs in strict order, with per-leg outcome accounting.

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::SolCall;
use chrono::{DateTime, Utc};
use rust_decimal::RoundingStrategy;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::approval::{ApprovalGate, ApprovalOutcome};
use crate::chain::contracts::IExchangeRouter;
use crate::chain::{EvmClient, RpcClient};
use crate::config::AppConfig;
use crate::domain::{
    to_fixed, FundingMode, MarketDescriptor, MarketRegistry, OrderKind, TradeIntent,
};
use crate::error::{BracketError, Result};
use crate::oracle::{price_for, PriceFeed, SignedPriceClient};
use crate::order::{build_order_parameters, encode_order_multicall, BuildContext, EncodeContext};
use crate::safe::{
    ExecutionTrigger, PayloadStore, ProposalBuilder, SafeService, TransactionServiceClient,
};
use crate::signing::Wallet;

/// Transaction service for the Arbitrum deployment, used when none is
/// configured.
pub const DEFAULT_SERVICE_URL: &str = "https://safe-transaction-arbitrum.safe.global";

/// Per-leg status in a run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Error,
    Skipped,
}

/// Outcome of one order leg. Failed legs stay recorded as failed; nothing
/// is torn down retroactively.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step: &'static str,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safe_tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when the proposal stands but its execution attempt failed or is
    /// still waiting on confirmations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_error: Option<String>,
}

impl StepOutcome {
    fn empty(step: &'static str, status: StepStatus) -> Self {
        Self {
            step,
            status,
            safe_tx_hash: None,
            nonce: None,
            execution_tx_hash: None,
            payload_file: None,
            service_url: None,
            error: None,
            execution_error: None,
        }
    }

    fn error(step: &'static str, error: impl std::fmt::Display) -> Self {
        let mut outcome = Self::empty(step, StepStatus::Error);
        outcome.error = Some(error.to_string());
        outcome
    }

    fn skipped(step: &'static str, reason: &str) -> Self {
        let mut outcome = Self::empty(step, StepStatus::Skipped);
        outcome.error = Some(reason.to_string());
        outcome
    }

    pub fn succeeded(&self) -> bool {
        self.status == StepStatus::Success
    }
}

/// Overall run status, never collapsed into a single boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    PartialSuccess,
    Error,
}

/// Full record of one orchestration run, built incrementally as legs
/// complete so the caller can reconcile exactly which orders exist.
#[derive(Debug, Clone, Serialize)]
pub struct SequentialRunResult {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub token: String,
    pub direction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub approval: Option<ApprovalOutcome>,
    pub open_order: Option<StepOutcome>,
    pub take_profit_order: Option<StepOutcome>,
    pub stop_loss_order: Option<StepOutcome>,
    pub executed_steps: usize,
    pub total_steps: usize,
    pub timestamp: DateTime<Utc>,
}

impl SequentialRunResult {
    fn new(run_id: Uuid, intent: &TradeIntent) -> Self {
        Self {
            run_id,
            status: RunStatus::Error,
            token: intent.token.to_uppercase(),
            direction: intent.direction.to_string(),
            error: None,
            approval: None,
            open_order: None,
            take_profit_order: None,
            stop_loss_order: None,
            executed_steps: 0,
            total_steps: 3,
            timestamp: Utc::now(),
        }
    }

    fn aborted(mut self, error: impl std::fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self.status = RunStatus::Error;
        self.tally();
        self
    }

    fn finished(mut self) -> Self {
        self.tally();
        let legs = [
            &self.open_order,
            &self.take_profit_order,
            &self.stop_loss_order,
        ];
        let successes = self.executed_steps;
        self.status = if successes == legs.len() {
            RunStatus::Success
        } else if successes > 0 {
            RunStatus::PartialSuccess
        } else {
            RunStatus::Error
        };
        self
    }

    fn tally(&mut self) {
        self.executed_steps = [
            &self.open_order,
            &self.take_profit_order,
            &self.stop_loss_order,
        ]
        .into_iter()
        .flatten()
        .filter(|leg| leg.succeeded())
        .count();
    }
}

/// Composes the whole pipeline. One instance serves concurrent runs; the
/// only shared mutable state is the per-wallet proposal lock inside the
/// builder, and settle waits never hold it.
pub struct PositionOrchestrator {
    config: AppConfig,
    funding: FundingMode,
    markets: MarketRegistry,
    wallet: Wallet,
    evm: Arc<dyn EvmClient>,
    service: Arc<dyn SafeService>,
    prices: Arc<dyn PriceFeed>,
    proposals: ProposalBuilder,
    trigger: ExecutionTrigger,
    approvals: ApprovalGate,
    exchange_router: Address,
    order_vault: Address,
    wrapped_native: Address,
}

impl PositionOrchestrator {
    pub fn new(
        config: AppConfig,
        wallet: Wallet,
        evm: Arc<dyn EvmClient>,
        service: Arc<dyn SafeService>,
        prices: Arc<dyn PriceFeed>,
    ) -> Result<Self> {
        let markets = MarketRegistry::with_overrides(&config.markets)?;

        let funding = match &config.safe.address {
            Some(raw) => FundingMode::Multisig {
                safe: parse_address(raw)?,
            },
            None => FundingMode::DirectKey,
        };
        let funding_wallet = funding.safe().unwrap_or_else(|| wallet.address());

        let exchange_router = parse_address(&config.chain.exchange_router)?;
        let order_vault = parse_address(&config.chain.order_vault)?;
        let wrapped_native = parse_address(&config.chain.wrapped_native)?;
        let approval_spender = parse_address(&config.chain.approval_spender)?;

        let store = PayloadStore::new(&config.payload_dir);
        let proposals = ProposalBuilder::new(
            wallet.clone(),
            funding_wallet,
            config.chain.chain_id,
            store,
        );
        let trigger = ExecutionTrigger::new(wallet.clone(), funding_wallet);
        let approvals = ApprovalGate::new(approval_spender, config.safe.settle_delay());

        Ok(Self {
            config,
            funding,
            markets,
            wallet,
            evm,
            service,
            prices,
            proposals,
            trigger,
            approvals,
            exchange_router,
            order_vault,
            wrapped_native,
        })
    }

    /// Wire the live boundary clients (RPC, transaction service, signed
    /// prices) from configuration.
    pub fn from_config(config: AppConfig, wallet: Wallet) -> Result<Self> {
        let evm = Arc::new(RpcClient::new(config.chain.rpc_url.clone(), wallet.clone()));
        let service_url = config
            .safe
            .service_url
            .clone()
            .unwrap_or_else(|| DEFAULT_SERVICE_URL.to_string());
        let service = Arc::new(TransactionServiceClient::new(
            service_url,
            config.safe.api_key.clone(),
        )?);
        let prices = Arc::new(SignedPriceClient::new(config.chain.oracle_url.clone())?);
        Self::new(config, wallet, evm, service, prices)
    }

    pub fn funding_mode(&self) -> FundingMode {
        self.funding
    }

    /// The wallet orders are funded from and positions belong to.
    pub fn funding_wallet(&self) -> Address {
        self.funding.safe().unwrap_or_else(|| self.wallet.address())
    }

    /// Open a position and bracket it: approval gate, market-increase, then
    /// take-profit and stop-loss legs. Approval or opening failure aborts;
    /// a take-profit failure never suppresses the stop-loss attempt.
    pub async fn open_bracketed_position(&self, intent: &TradeIntent) -> SequentialRunResult {
        let run_id = Uuid::new_v4();
        let mut result = SequentialRunResult::new(run_id, intent);

        if let Err(e) = intent.validate() {
            return result.aborted(e);
        }
        if intent.take_profit_price.is_none() || intent.stop_loss_price.is_none() {
            return result.aborted(BracketError::Validation(
                "bracketed run requires both take profit and stop loss prices".into(),
            ));
        }
        let market = match self.markets.resolve(&intent.token) {
            Ok(m) => m.clone(),
            Err(e) => return result.aborted(e),
        };
        let collateral_units = match collateral_units(intent, &market) {
            Ok(v) => v,
            Err(e) => return result.aborted(e),
        };

        info!(
            run_id = %run_id,
            token = %result.token,
            direction = %result.direction,
            notional = %intent.notional_usd,
            leverage = %intent.leverage,
            "starting bracketed position run"
        );

        match self
            .approvals
            .ensure(
                self.evm.as_ref(),
                self.service.as_ref(),
                &self.proposals,
                &self.trigger,
                self.funding,
                self.funding_wallet(),
                market.collateral_token,
                collateral_units,
                self.config.safe.auto_execute,
            )
            .await
        {
            Ok(outcome) => result.approval = Some(outcome),
            Err(e) => {
                // No point bracketing a position that cannot be funded.
                return result.aborted(format!("approval failed: {e}"));
            }
        }

        let (open, open_hard_failed) = self
            .submit_order_leg(intent, &market, OrderKind::MarketIncrease, "open")
            .await;
        result.open_order = Some(open);
        if open_hard_failed {
            result.take_profit_order =
                Some(StepOutcome::skipped("take_profit", "opening order failed"));
            result.stop_loss_order =
                Some(StepOutcome::skipped("stop_loss", "opening order failed"));
            return result.finished();
        }

        let (take_profit, _) = self
            .submit_order_leg(intent, &market, OrderKind::LimitDecrease, "take_profit")
            .await;
        let tp_failed = !take_profit.succeeded();
        result.take_profit_order = Some(take_profit);
        if tp_failed {
            // An unprotected downside is worse than a missing upside order.
            warn!(run_id = %run_id, "take profit leg failed, still attempting stop loss");
        }

        let (stop_loss, _) = self
            .submit_order_leg(intent, &market, OrderKind::StopLossDecrease, "stop_loss")
            .await;
        result.stop_loss_order = Some(stop_loss);

        result.finished()
    }

    /// Close (or shrink) an existing position with a market-decrease order.
    pub async fn close_position(&self, intent: &TradeIntent) -> StepOutcome {
        if let Err(e) = intent.validate() {
            return StepOutcome::error("close", e);
        }
        let market = match self.markets.resolve(&intent.token) {
            Ok(m) => m.clone(),
            Err(e) => return StepOutcome::error("close", e),
        };
        let (outcome, _) = self
            .submit_order_leg(intent, &market, OrderKind::MarketDecrease, "close")
            .await;
        outcome
    }

    /// Caller-initiated retry of a proposal's execution, e.g. after more
    /// confirmations arrived.
    pub async fn execute_proposal(&self, safe_tx_hash: B256) -> Result<B256> {
        self.trigger
            .execute(self.evm.as_ref(), self.service.as_ref(), safe_tx_hash)
            .await
    }

    fn encode_context(&self) -> EncodeContext {
        EncodeContext {
            receiver: self.funding_wallet(),
            order_vault: self.order_vault,
            wrapped_native: self.wrapped_native,
        }
    }

    /// One leg: fresh price and gas reads, build, encode, then fund-mode
    /// dispatch. The bool is true when the failure is hard enough that
    /// dependent legs must not run.
    async fn submit_order_leg(
        &self,
        intent: &TradeIntent,
        market: &MarketDescriptor,
        kind: OrderKind,
        label: &'static str,
    ) -> (StepOutcome, bool) {
        let prices = match self.prices.recent_prices().await {
            Ok(p) => p,
            Err(e) => return (StepOutcome::error(label, e), true),
        };
        let price = match price_for(&prices, market.index_token) {
            Ok(p) => p,
            Err(e) => return (StepOutcome::error(label, e), true),
        };
        let gas_price = match self.evm.gas_price().await {
            Ok(g) => g,
            Err(e) => return (StepOutcome::error(label, e), true),
        };

        let build = BuildContext {
            market,
            price,
            gas_price,
            trading: &self.config.trading,
            gas: &self.config.gas,
        };
        let params = match build_order_parameters(intent, kind, &build) {
            Ok(p) => p,
            Err(e) => return (StepOutcome::error(label, e), true),
        };
        let encoded = match encode_order_multicall(&params, market, &self.encode_context()) {
            Ok(e) => e,
            Err(e) => return (StepOutcome::error(label, e), true),
        };

        // The attached value (execution fee, plus collateral when native)
        // comes out of the funding wallet.
        match self.evm.native_balance(self.funding_wallet()).await {
            Ok(native) if native < encoded.value => {
                return (
                    StepOutcome::error(
                        label,
                        BracketError::InsufficientFunds {
                            required: encoded.value.to_string(),
                            available: native.to_string(),
                        },
                    ),
                    true,
                )
            }
            Ok(_) => {}
            Err(e) => return (StepOutcome::error(label, e), true),
        }

        match self.funding {
            FundingMode::DirectKey => {
                match self
                    .evm
                    .submit_router_multicall(self.exchange_router, encoded.value, encoded.calls)
                    .await
                {
                    Ok(hash) => {
                        let mut outcome = StepOutcome::empty(label, StepStatus::Success);
                        outcome.execution_tx_hash = Some(hash.to_string());
                        (outcome, false)
                    }
                    Err(e) => (StepOutcome::error(label, e), true),
                }
            }
            FundingMode::Multisig { .. } => {
                let data = Bytes::from(
                    IExchangeRouter::multicallCall {
                        data: encoded.calls,
                    }
                    .abi_encode(),
                );
                let proposal = match self
                    .proposals
                    .build_and_propose(
                        self.evm.as_ref(),
                        self.service.as_ref(),
                        self.exchange_router,
                        encoded.value,
                        data,
                        label,
                    )
                    .await
                {
                    Ok(p) => p,
                    Err(e) => return (StepOutcome::error(label, e), true),
                };

                let mut outcome = StepOutcome::empty(label, StepStatus::Success);
                outcome.safe_tx_hash = Some(proposal.safe_tx_hash.to_string());
                outcome.nonce = Some(proposal.nonce);
                outcome.payload_file =
                    Some(proposal.payload_file.display().to_string());
                outcome.service_url = proposal.service_url.clone();

                if !proposal.proposed {
                    // The artifact is the manual-recovery path; the leg still
                    // failed as far as the bracket flow is concerned.
                    outcome.status = StepStatus::Error;
                    outcome.error = proposal.service_error.clone();
                    return (outcome, true);
                }

                let mut hard_failed = false;
                if self.config.safe.auto_execute {
                    // Give the service time to index the proposal; attempts
                    // inside this window are retryable, not fatal.
                    tokio::time::sleep(self.config.safe.settle_delay()).await;
                    match self
                        .trigger
                        .execute(
                            self.evm.as_ref(),
                            self.service.as_ref(),
                            proposal.safe_tx_hash,
                        )
                        .await
                    {
                        Ok(hash) => outcome.execution_tx_hash = Some(hash.to_string()),
                        Err(e) => {
                            hard_failed = matches!(e, BracketError::ExecutionReverted(_));
                            if e.is_retryable() {
                                info!(
                                    safe_tx_hash = %proposal.safe_tx_hash,
                                    "{label} execution pending: {e}"
                                );
                            } else {
                                warn!(
                                    safe_tx_hash = %proposal.safe_tx_hash,
                                    "{label} execution failed: {e}"
                                );
                            }
                            outcome.execution_error = Some(e.to_string());
                        }
                    }
                }
                (outcome, hard_failed)
            }
        }
    }
}

/// Collateral requirement in collateral-token units, rounded down so the
/// pull never exceeds the intent.
fn collateral_units(intent: &TradeIntent, market: &MarketDescriptor) -> Result<U256> {
    let collateral = intent.collateral_usd().round_dp_with_strategy(
        u32::from(market.collateral_decimals),
        RoundingStrategy::ToZero,
    );
    to_fixed(collateral, u32::from(market.collateral_decimals))
}

fn parse_address(raw: &str) -> Result<Address> {
    Address::from_str(raw.trim())
        .map_err(|e| BracketError::Validation(format!("invalid address {raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Direction;
    use rust_decimal_macros::dec;

    #[test]
    fn collateral_units_round_down() {
        let market = MarketRegistry::builtin()
            .unwrap()
            .resolve("ETH")
            .unwrap()
            .clone();
        // $50 at 3x = 16.666666... USDC, truncated at 6 decimals
        let intent = TradeIntent::market("ETH", dec!(50), dec!(3), Direction::Long);
        assert_eq!(
            collateral_units(&intent, &market).unwrap(),
            U256::from(16_666_666u64)
        );
    }

    #[test]
    fn run_status_reflects_leg_outcomes() {
        let intent = TradeIntent::market("ETH", dec!(50), dec!(2), Direction::Long);
        let mut result = SequentialRunResult::new(Uuid::new_v4(), &intent);
        result.open_order = Some(StepOutcome::empty("open", StepStatus::Success));
        result.take_profit_order = Some(StepOutcome::error("take_profit", "boom"));
        result.stop_loss_order = Some(StepOutcome::empty("stop_loss", StepStatus::Success));
        let result = result.finished();
        assert_eq!(result.status, RunStatus::PartialSuccess);
        assert_eq!(result.executed_steps, 2);
        assert_eq!(result.total_steps, 3);
    }

    #[test]
    fn all_legs_successful_is_success() {
        let intent = TradeIntent::market("ETH", dec!(50), dec!(2), Direction::Long);
        let mut result = SequentialRunResult::new(Uuid::new_v4(), &intent);
        result.open_order = Some(StepOutcome::empty("open", StepStatus::Success));
        result.take_profit_order = Some(StepOutcome::empty("take_profit", StepStatus::Success));
        result.stop_loss_order = Some(StepOutcome::empty("stop_loss", StepStatus::Success));
        assert_eq!(result.finished().status, RunStatus::Success);
    }
}
