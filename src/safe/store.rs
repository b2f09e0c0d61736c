//! Durable payload artifacts: every built Safe transaction is written to
//! disk before any network submission, so a failed proposal never loses an
//! already-built transaction.

use alloy::primitives::{Address, B256};
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::chain::SafeTx;
use crate::error::Result;

/// JSON artifact shape. Gas fields stay zero so the coordination service
/// can estimate and fill them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadArtifact {
    pub chain_id: u64,
    pub safe_address: String,
    pub to: String,
    pub value: String,
    pub data: String,
    pub operation: u8,
    pub safe_tx_gas: u64,
    pub base_gas: u64,
    pub gas_price: String,
    pub gas_token: String,
    pub refund_receiver: String,
    pub nonce: u64,
    pub safe_tx_hash: String,
    pub meta: PayloadMeta,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadMeta {
    pub created_by: String,
    pub intended_sender: String,
    pub proposer: String,
}

impl PayloadArtifact {
    pub fn from_tx(
        tx: &SafeTx,
        hash: B256,
        chain_id: u64,
        safe: Address,
        proposer: Address,
    ) -> Self {
        Self {
            chain_id,
            safe_address: safe.to_string(),
            to: tx.to.to_string(),
            value: tx.value.to_string(),
            data: tx.data.to_string(),
            operation: tx.operation,
            safe_tx_gas: 0,
            base_gas: 0,
            gas_price: "0".to_string(),
            gas_token: Address::ZERO.to_string(),
            refund_receiver: Address::ZERO.to_string(),
            nonce: u64::try_from(tx.nonce).unwrap_or_default(),
            safe_tx_hash: hash.to_string(),
            meta: PayloadMeta {
                created_by: "bracket".to_string(),
                intended_sender: safe.to_string(),
                proposer: proposer.to_string(),
            },
        }
    }
}

/// Append-only artifact directory. File names carry prefix, UTC timestamp
/// and a unique suffix so concurrent writers cannot collide.
#[derive(Debug, Clone)]
pub struct PayloadStore {
    dir: PathBuf,
}

impl PayloadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save(&self, prefix: &str, artifact: &PayloadArtifact) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let unique = Uuid::new_v4().simple().to_string();
        let filename = format!("{prefix}_safe_tx_{timestamp}_{}.json", &unique[..8]);
        let path = self.dir.join(filename);
        std::fs::write(&path, serde_json::to_string_pretty(artifact)?)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safe::tx::new_safe_tx;
    use alloy::primitives::{Bytes, U256};

    fn artifact() -> PayloadArtifact {
        let tx = new_safe_tx(
            Address::repeat_byte(0x22),
            U256::from(5u8),
            Bytes::from(vec![0xde, 0xad]),
            7,
        );
        PayloadArtifact::from_tx(
            &tx,
            B256::repeat_byte(0x33),
            42161,
            Address::repeat_byte(0x44),
            Address::repeat_byte(0x55),
        )
    }

    #[test]
    fn writes_unique_files_per_save() {
        let dir = std::env::temp_dir().join(format!("bracket-store-{}", Uuid::new_v4()));
        let store = PayloadStore::new(&dir);
        let a = store.save("approve", &artifact()).unwrap();
        let b = store.save("approve", &artifact()).unwrap();
        assert_ne!(a, b);
        assert!(a.exists() && b.exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn artifact_serializes_service_field_names() {
        let json = serde_json::to_value(artifact()).unwrap();
        assert_eq!(json["chainId"], 42161);
        assert_eq!(json["operation"], 0);
        assert_eq!(json["nonce"], 7);
        assert_eq!(json["value"], "5");
        assert_eq!(json["data"], "0xdead");
        assert!(json["safeTxHash"].as_str().unwrap().starts_with("0x"));
        assert_eq!(json["meta"]["createdBy"], "bracket");
    }
}
