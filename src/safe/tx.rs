//! Proposal construction: canonical hashing, signing, artifact persistence
//! and submission to the coordination service.

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::{Eip712Domain, SolStruct};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::chain::{EvmClient, SafeTx};
use crate::error::Result;
use crate::safe::service::{ProposeRequest, SafeService};
use crate::safe::store::{PayloadArtifact, PayloadStore};
use crate::signing::Wallet;

/// CALL operation. The pipeline never delegatecalls.
pub const OPERATION_CALL: u8 = 0;

/// A Safe transaction with service-estimated gas fields left at zero.
pub fn new_safe_tx(to: Address, value: U256, data: Bytes, nonce: u64) -> SafeTx {
    SafeTx {
        to,
        value,
        data,
        operation: OPERATION_CALL,
        safeTxGas: U256::ZERO,
        baseGas: U256::ZERO,
        gasPrice: U256::ZERO,
        gasToken: Address::ZERO,
        refundReceiver: Address::ZERO,
        nonce: U256::from(nonce),
    }
}

/// Canonical hash of a Safe transaction: the EIP-712 signing hash under the
/// Safe's domain (chain id + verifying contract). Deterministic from the
/// transaction fields; computed exactly once per proposal.
pub fn safe_tx_hash(tx: &SafeTx, chain_id: u64, safe: Address) -> B256 {
    let domain = Eip712Domain {
        name: None,
        version: None,
        chain_id: Some(U256::from(chain_id)),
        verifying_contract: Some(safe),
        salt: None,
    };
    tx.eip712_signing_hash(&domain)
}

/// Result of building and proposing one Safe transaction. A service failure
/// is reported here rather than raised: the persisted artifact keeps the
/// built transaction recoverable by hand.
#[derive(Debug, Clone)]
pub struct ProposalOutcome {
    pub safe_tx_hash: B256,
    pub nonce: u64,
    pub payload_file: PathBuf,
    pub proposed: bool,
    pub service_url: Option<String>,
    pub service_error: Option<String>,
}

/// Builds, persists, signs and proposes Safe transactions. Proposal
/// building is serialized per Safe so concurrent runs for the same wallet
/// cannot read the same next nonce.
pub struct ProposalBuilder {
    wallet: Wallet,
    safe: Address,
    chain_id: u64,
    store: PayloadStore,
    locks: DashMap<Address, Arc<Mutex<()>>>,
}

impl ProposalBuilder {
    pub fn new(wallet: Wallet, safe: Address, chain_id: u64, store: PayloadStore) -> Self {
        Self {
            wallet,
            safe,
            chain_id,
            store,
            locks: DashMap::new(),
        }
    }

    pub fn safe(&self) -> Address {
        self.safe
    }

    fn lock_for(&self, safe: Address) -> Arc<Mutex<()>> {
        self.locks
            .entry(safe)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Next Safe nonce: the on-chain nonce or one past the highest queued
    /// proposal, whichever is higher. Read just-in-time, never cached; a
    /// queue read failure degrades to the chain nonce.
    async fn next_nonce(&self, evm: &dyn EvmClient, service: &dyn SafeService) -> Result<u64> {
        let chain_nonce = evm.safe_nonce(self.safe).await?;
        let queued_next = match service.pending_transactions(self.safe).await {
            Ok(queued) => queued.iter().map(|t| t.nonce + 1).max().unwrap_or(0),
            Err(e) => {
                warn!("pending queue read failed, using chain nonce only: {e}");
                0
            }
        };
        Ok(chain_nonce.max(queued_next))
    }

    /// Build a proposal for `to` with `data`, persist it, sign it and
    /// submit it to the coordination service.
    pub async fn build_and_propose(
        &self,
        evm: &dyn EvmClient,
        service: &dyn SafeService,
        to: Address,
        value: U256,
        data: Bytes,
        prefix: &str,
    ) -> Result<ProposalOutcome> {
        let lock = self.lock_for(self.safe);
        let _guard = lock.lock().await;

        let nonce = self.next_nonce(evm, service).await?;
        let tx = new_safe_tx(to, value, data, nonce);
        let hash = safe_tx_hash(&tx, self.chain_id, self.safe);

        // Persist before any submission attempt.
        let artifact =
            PayloadArtifact::from_tx(&tx, hash, self.chain_id, self.safe, self.wallet.address());
        let payload_file = self.store.save(prefix, &artifact)?;

        let signature = self.wallet.sign_hash(hash)?;
        let request = ProposeRequest::from_tx(&tx, hash, self.wallet.address(), &signature);

        match service.propose(self.safe, &request).await {
            Ok(()) => {
                info!(safe_tx_hash = %hash, nonce, prefix, "proposal submitted");
                Ok(ProposalOutcome {
                    safe_tx_hash: hash,
                    nonce,
                    payload_file,
                    proposed: true,
                    service_url: service.queue_url(self.safe),
                    service_error: None,
                })
            }
            Err(e) => {
                warn!(
                    safe_tx_hash = %hash,
                    payload = %payload_file.display(),
                    "proposal submission failed, payload saved for manual recovery: {e}"
                );
                Ok(ProposalOutcome {
                    safe_tx_hash: hash,
                    nonce,
                    payload_file,
                    proposed: false,
                    service_url: None,
                    service_error: Some(e.to_string()),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx(nonce: u64) -> SafeTx {
        new_safe_tx(
            Address::repeat_byte(0x11),
            U256::from(42u8),
            Bytes::from(vec![0xca, 0xfe]),
            nonce,
        )
    }

    #[test]
    fn hash_is_deterministic() {
        let safe = Address::repeat_byte(0x99);
        let a = safe_tx_hash(&sample_tx(7), 42161, safe);
        let b = safe_tx_hash(&sample_tx(7), 42161, safe);
        assert_eq!(a, b);
    }

    #[test]
    fn hash_depends_on_nonce_domain_and_data() {
        let safe = Address::repeat_byte(0x99);
        let base = safe_tx_hash(&sample_tx(7), 42161, safe);

        assert_ne!(base, safe_tx_hash(&sample_tx(8), 42161, safe));
        assert_ne!(base, safe_tx_hash(&sample_tx(7), 1, safe));
        assert_ne!(
            base,
            safe_tx_hash(&sample_tx(7), 42161, Address::repeat_byte(0x98))
        );

        let mut other_data = sample_tx(7);
        other_data.data = Bytes::from(vec![0xca, 0xff]);
        assert_ne!(base, safe_tx_hash(&other_data, 42161, safe));
    }
}
