use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use tracing::info;
use zeroize::Zeroize;

use crate::error::{BracketError, Result};

/// Wallet holding the signer key used for proposal signatures and
/// transaction submission.
///
/// # Security
/// The private key hex string is zeroized from memory right after the
/// signer is constructed; it is never stored on this struct.
#[derive(Clone)]
pub struct Wallet {
    inner: PrivateKeySigner,
    chain_id: u64,
}

impl Wallet {
    /// Create a wallet from a private key hex string
    pub fn from_private_key(private_key: &str, chain_id: u64) -> Result<Self> {
        let key_hex = private_key.trim_start_matches("0x");

        let mut secure_key = key_hex.to_string();

        let signer = secure_key
            .parse::<PrivateKeySigner>()
            .map_err(|e| BracketError::Wallet(format!("Invalid private key: {}", e)))?;

        secure_key.zeroize();

        info!(
            "Wallet initialized: {} (private key zeroized from memory)",
            signer.address()
        );

        Ok(Self {
            inner: signer,
            chain_id,
        })
    }

    /// Create a wallet from the `BRACKET_PRIVATE_KEY` or `PRIVATE_KEY`
    /// environment variable; the raw value is zeroized after use.
    pub fn from_env(chain_id: u64) -> Result<Self> {
        let mut private_key = std::env::var("BRACKET_PRIVATE_KEY")
            .or_else(|_| std::env::var("PRIVATE_KEY"))
            .map_err(|_| {
                BracketError::Wallet(
                    "BRACKET_PRIVATE_KEY or PRIVATE_KEY environment variable not set".to_string(),
                )
            })?;

        let result = Self::from_private_key(&private_key, chain_id);

        private_key.zeroize();

        result
    }

    pub fn address(&self) -> Address {
        self.inner.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Sign a 32-byte hash, returning the 65-byte r||s||v signature with
    /// v in {27, 28} as the Safe contracts expect for ECDSA owners.
    pub fn sign_hash(&self, hash: B256) -> Result<[u8; 65]> {
        let signature = self
            .inner
            .sign_hash_sync(&hash)
            .map_err(|e| BracketError::Signature(format!("Failed to sign hash: {}", e)))?;
        Ok(signature.as_bytes())
    }

    /// Underlying signer for provider construction
    pub fn signer(&self) -> &PrivateKeySigner {
        &self.inner
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address())
            .field("chain_id", &self.chain_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_creation() {
        // Test private key (DO NOT use in production!)
        let test_key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

        let wallet = Wallet::from_private_key(test_key, 42161).unwrap();

        assert_eq!(wallet.chain_id(), 42161);
        // Well-known address for this test key
        assert_eq!(
            format!("{:?}", wallet.address()).to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn signatures_end_in_legacy_v() {
        let test_key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
        let wallet = Wallet::from_private_key(test_key, 42161).unwrap();
        let sig = wallet.sign_hash(B256::repeat_byte(0x11)).unwrap();
        assert!(sig[64] == 27 || sig[64] == 28);
    }
}
