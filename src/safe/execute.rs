//! Execution trigger: once the coordination service has gathered enough
//! confirmations, assemble the signature blob and submit the on-chain
//! execution transaction.

use alloy::primitives::{Address, Bytes, B256};
use std::str::FromStr;
use tracing::{debug, info};

use crate::chain::EvmClient;
use crate::error::{BracketError, Result};
use crate::safe::service::{Confirmation, SafeService};
use crate::signing::Wallet;

pub struct ExecutionTrigger {
    wallet: Wallet,
    safe: Address,
}

impl ExecutionTrigger {
    pub fn new(wallet: Wallet, safe: Address) -> Self {
        Self { wallet, safe }
    }

    /// Try to execute a proposal. Returns the execution transaction hash on
    /// success. `AwaitingConfirmations` is a legitimate intermediate state
    /// the caller retries later; everything else is terminal for this
    /// proposal.
    pub async fn execute(
        &self,
        evm: &dyn EvmClient,
        service: &dyn SafeService,
        safe_tx_hash: B256,
    ) -> Result<B256> {
        let tx = service
            .transaction(safe_tx_hash)
            .await?
            .ok_or(BracketError::ProposalNotFound(safe_tx_hash))?;

        if tx.is_executed {
            return Err(BracketError::AlreadyExecuted(safe_tx_hash));
        }

        let threshold = match tx.confirmations_required {
            Some(n) => n,
            None => evm.safe_threshold(self.safe).await?,
        };

        let confirmations = if tx.confirmations.is_empty() {
            service.confirmations(safe_tx_hash).await?
        } else {
            tx.confirmations.clone()
        };

        if confirmations.len() < threshold {
            debug!(
                %safe_tx_hash,
                have = confirmations.len(),
                need = threshold,
                "proposal below signature threshold"
            );
            return Err(BracketError::AwaitingConfirmations {
                have: confirmations.len(),
                need: threshold,
            });
        }

        let safe_tx = tx.to_safe_tx()?;
        let signatures = assemble_signatures(&confirmations, &self.wallet, safe_tx_hash)?;

        let execution_hash = evm
            .exec_safe_transaction(self.safe, &safe_tx, signatures)
            .await?;
        info!(%safe_tx_hash, %execution_hash, "proposal executed on-chain");
        Ok(execution_hash)
    }
}

/// Concatenate owner signatures sorted ascending by owner address, the
/// layout `execTransaction` checks. Our own signature is appended when the
/// service confirmations do not already carry it.
fn assemble_signatures(
    confirmations: &[Confirmation],
    wallet: &Wallet,
    safe_tx_hash: B256,
) -> Result<Bytes> {
    let mut sigs: Vec<(Address, Vec<u8>)> = Vec::with_capacity(confirmations.len() + 1);
    for confirmation in confirmations {
        let owner = Address::from_str(&confirmation.owner).map_err(|e| {
            BracketError::Validation(format!(
                "service returned bad owner {}: {e}",
                confirmation.owner
            ))
        })?;
        let Some(signature_hex) = &confirmation.signature else {
            continue;
        };
        let bytes = hex::decode(signature_hex.trim_start_matches("0x"))
            .map_err(|e| BracketError::Signature(format!("bad confirmation signature: {e}")))?;
        sigs.push((owner, bytes));
    }

    if !sigs.iter().any(|(owner, _)| *owner == wallet.address()) {
        sigs.push((wallet.address(), wallet.sign_hash(safe_tx_hash)?.to_vec()));
    }

    sigs.sort_by_key(|(owner, _)| *owner);

    let mut blob = Vec::with_capacity(sigs.len() * 65);
    for (_, signature) in sigs {
        blob.extend_from_slice(&signature);
    }
    Ok(Bytes::from(blob))
}
