//! Approval gate: make sure the spender's allowance covers the collateral
//! pull before any order that transfers tokens is proposed.

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::SolCall;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::chain::contracts::IERC20;
use crate::chain::EvmClient;
use crate::domain::FundingMode;
use crate::error::{BracketError, Result};
use crate::safe::{ExecutionTrigger, ProposalBuilder, SafeService};

/// Result of one allowance check. When the allowance already covered the
/// requirement nothing was proposed and every hash field stays empty.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApprovalOutcome {
    pub approval_needed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safe_tx_hash: Option<B256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_tx_hash: Option<B256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_file: Option<PathBuf>,
    pub proposed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_error: Option<String>,
}

pub struct ApprovalGate {
    spender: Address,
    settle_delay: Duration,
}

impl ApprovalGate {
    pub fn new(spender: Address, settle_delay: Duration) -> Self {
        Self {
            spender,
            settle_delay,
        }
    }

    /// Check balance and allowance live, and approve the exact missing
    /// requirement when needed. With auto-execution requested this runs to
    /// completion (settle wait + execution) before returning, because the
    /// dependent order's token transfer needs the allowance live on-chain.
    #[allow(clippy::too_many_arguments)]
    pub async fn ensure(
        &self,
        evm: &dyn EvmClient,
        service: &dyn SafeService,
        proposals: &ProposalBuilder,
        trigger: &ExecutionTrigger,
        funding: FundingMode,
        owner: Address,
        token: Address,
        required: U256,
        auto_execute: bool,
    ) -> Result<ApprovalOutcome> {
        let balance = evm.token_balance(token, owner).await?;
        if balance < required {
            return Err(BracketError::InsufficientFunds {
                required: required.to_string(),
                available: balance.to_string(),
            });
        }

        let allowance = evm.token_allowance(token, owner, self.spender).await?;
        if allowance >= required {
            debug!(%token, %allowance, %required, "allowance sufficient, no approval proposed");
            return Ok(ApprovalOutcome {
                approval_needed: false,
                ..ApprovalOutcome::default()
            });
        }

        // Exact amount, not unlimited, to minimize standing risk.
        info!(%token, %required, spender = %self.spender, "approving exact spend amount");
        let call = IERC20::approveCall {
            spender: self.spender,
            amount: required,
        }
        .abi_encode();

        match funding {
            FundingMode::Multisig { .. } => {
                let proposal = proposals
                    .build_and_propose(evm, service, token, U256::ZERO, Bytes::from(call), "approve")
                    .await?;
                let mut outcome = ApprovalOutcome {
                    approval_needed: true,
                    safe_tx_hash: Some(proposal.safe_tx_hash),
                    execution_tx_hash: None,
                    payload_file: Some(proposal.payload_file),
                    proposed: proposal.proposed,
                    service_error: proposal.service_error,
                };
                if auto_execute && outcome.proposed {
                    tokio::time::sleep(self.settle_delay).await;
                    let execution_hash = trigger
                        .execute(evm, service, proposal.safe_tx_hash)
                        .await?;
                    outcome.execution_tx_hash = Some(execution_hash);
                }
                Ok(outcome)
            }
            FundingMode::DirectKey => {
                let execution_hash = evm
                    .submit_token_approve(token, self.spender, required)
                    .await?;
                Ok(ApprovalOutcome {
                    approval_needed: true,
                    safe_tx_hash: None,
                    execution_tx_hash: Some(execution_hash),
                    payload_file: None,
                    proposed: false,
                    service_error: None,
                })
            }
        }
    }
}
