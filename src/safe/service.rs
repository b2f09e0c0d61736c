//! Client for the Safe transaction service REST API. The wire schema is an
//! external contract; one explicit versioned shape is validated here at the
//! boundary instead of field-by-field probing at call sites.

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::chain::SafeTx;
use crate::error::{BracketError, Result};

/// Coordination service boundary. The pipeline proposes and polls through
/// this trait; the service alone advances proposals to confirmed.
#[async_trait]
pub trait SafeService: Send + Sync {
    async fn propose(&self, safe: Address, request: &ProposeRequest) -> Result<()>;

    /// Fetch one proposal by its Safe transaction hash; `None` when the
    /// service does not know it (yet).
    async fn transaction(&self, safe_tx_hash: B256) -> Result<Option<MultisigTransaction>>;

    async fn confirmations(&self, safe_tx_hash: B256) -> Result<Vec<Confirmation>>;

    /// Queued (unexecuted) proposals for a Safe, used for next-nonce
    /// computation and operator listings.
    async fn pending_transactions(&self, safe: Address) -> Result<Vec<MultisigTransaction>>;

    /// Human-viewable queue URL, when the service has one.
    fn queue_url(&self, _safe: Address) -> Option<String> {
        None
    }
}

/// Proposal POST body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposeRequest {
    pub to: String,
    pub value: String,
    pub data: String,
    pub operation: u8,
    pub safe_tx_gas: u64,
    pub base_gas: u64,
    pub gas_price: String,
    pub gas_token: Option<String>,
    pub refund_receiver: Option<String>,
    pub nonce: u64,
    pub contract_transaction_hash: String,
    pub sender: String,
    pub signature: String,
    pub origin: String,
}

impl ProposeRequest {
    pub fn from_tx(tx: &SafeTx, hash: B256, sender: Address, signature: &[u8]) -> Self {
        Self {
            to: tx.to.to_string(),
            value: tx.value.to_string(),
            data: tx.data.to_string(),
            operation: tx.operation,
            safe_tx_gas: 0,
            base_gas: 0,
            gas_price: "0".to_string(),
            gas_token: None,
            refund_receiver: None,
            nonce: u64::try_from(tx.nonce).unwrap_or_default(),
            contract_transaction_hash: hash.to_string(),
            sender: sender.to_string(),
            signature: format!("0x{}", hex::encode(signature)),
            origin: "bracket".to_string(),
        }
    }
}

/// Service view of one multisig transaction (v1 schema).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultisigTransaction {
    pub to: String,
    pub value: String,
    #[serde(default)]
    pub data: Option<String>,
    pub operation: u8,
    #[serde(default)]
    pub safe_tx_gas: u64,
    #[serde(default)]
    pub base_gas: u64,
    #[serde(default)]
    pub gas_price: Option<String>,
    #[serde(default)]
    pub gas_token: Option<String>,
    #[serde(default)]
    pub refund_receiver: Option<String>,
    pub nonce: u64,
    pub safe_tx_hash: String,
    #[serde(default)]
    pub is_executed: bool,
    #[serde(default)]
    pub is_successful: Option<bool>,
    #[serde(default)]
    pub confirmations_required: Option<usize>,
    #[serde(default)]
    pub confirmations: Vec<Confirmation>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub owner: String,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub signature_type: Option<String>,
}

impl MultisigTransaction {
    /// Rebuild the on-chain transaction from the service fields.
    pub fn to_safe_tx(&self) -> Result<SafeTx> {
        Ok(SafeTx {
            to: parse_address(&self.to)?,
            value: parse_u256(&self.value)?,
            data: parse_data(self.data.as_deref())?,
            operation: self.operation,
            safeTxGas: U256::from(self.safe_tx_gas),
            baseGas: U256::from(self.base_gas),
            gasPrice: parse_u256(self.gas_price.as_deref().unwrap_or("0"))?,
            gasToken: parse_address(self.gas_token.as_deref().unwrap_or_default())
                .unwrap_or(Address::ZERO),
            refundReceiver: parse_address(self.refund_receiver.as_deref().unwrap_or_default())
                .unwrap_or(Address::ZERO),
            nonce: U256::from(self.nonce),
        })
    }
}

fn parse_address(raw: &str) -> Result<Address> {
    Address::from_str(raw)
        .map_err(|e| BracketError::Validation(format!("service returned bad address {raw}: {e}")))
}

fn parse_u256(raw: &str) -> Result<U256> {
    U256::from_str(raw)
        .map_err(|e| BracketError::Validation(format!("service returned bad amount {raw}: {e}")))
}

fn parse_data(raw: Option<&str>) -> Result<Bytes> {
    match raw {
        None | Some("") | Some("0x") => Ok(Bytes::new()),
        Some(s) => hex::decode(s.trim_start_matches("0x"))
            .map(Bytes::from)
            .map_err(|e| BracketError::Validation(format!("service returned bad calldata: {e}"))),
    }
}

#[derive(Debug, Deserialize)]
struct Paginated<T> {
    #[serde(default)]
    #[allow(dead_code)]
    count: Option<u64>,
    results: Vec<T>,
}

/// HTTP implementation against a Safe transaction service deployment.
pub struct TransactionServiceClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl TransactionServiceClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let base_url = base_url.into();
        url::Url::parse(&base_url)
            .map_err(|e| BracketError::Validation(format!("invalid service URL {base_url}: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Token {key}")),
            None => builder,
        }
    }

    async fn error_for(&self, response: reqwest::Response) -> BracketError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        BracketError::Service {
            status,
            body: body.chars().take(500).collect(),
        }
    }
}

#[async_trait]
impl SafeService for TransactionServiceClient {
    async fn propose(&self, safe: Address, request: &ProposeRequest) -> Result<()> {
        let url = self.url(&format!("/api/v1/safes/{safe}/multisig-transactions/"));
        debug!(%safe, nonce = request.nonce, "proposing Safe transaction");
        let response = self.with_auth(self.http.post(&url)).json(request).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(self.error_for(response).await)
        }
    }

    async fn transaction(&self, safe_tx_hash: B256) -> Result<Option<MultisigTransaction>> {
        let url = self.url(&format!("/api/v1/multisig-transactions/{safe_tx_hash}/"));
        let response = self.with_auth(self.http.get(&url)).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(self.error_for(response).await);
        }
        Ok(Some(response.json().await?))
    }

    async fn confirmations(&self, safe_tx_hash: B256) -> Result<Vec<Confirmation>> {
        let url = self.url(&format!(
            "/api/v1/multisig-transactions/{safe_tx_hash}/confirmations/"
        ));
        let response = self.with_auth(self.http.get(&url)).send().await?;
        if !response.status().is_success() {
            return Err(self.error_for(response).await);
        }
        let page: Paginated<Confirmation> = response.json().await?;
        Ok(page.results)
    }

    async fn pending_transactions(&self, safe: Address) -> Result<Vec<MultisigTransaction>> {
        let url = self.url(&format!(
            "/api/v1/safes/{safe}/multisig-transactions/?executed=false&limit=100&ordering=nonce"
        ));
        let response = self.with_auth(self.http.get(&url)).send().await?;
        if !response.status().is_success() {
            return Err(self.error_for(response).await);
        }
        let page: Paginated<MultisigTransaction> = response.json().await?;
        Ok(page.results)
    }

    fn queue_url(&self, safe: Address) -> Option<String> {
        // Safe web UI queue for the Arbitrum deployment this targets
        Some(format!(
            "https://app.safe.global/transactions/queue?safe=arb1:{safe}"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_schema_parses_and_rebuilds() {
        let raw = r#"{
            "safe": "0x1111111111111111111111111111111111111111",
            "to": "0x7452c558d45f8afC8c83dAe62C3f8A5BE19c71f6",
            "value": "1000000000000000",
            "data": "0xdeadbeef",
            "operation": 0,
            "safeTxGas": 0,
            "baseGas": 0,
            "gasPrice": "0",
            "gasToken": "0x0000000000000000000000000000000000000000",
            "refundReceiver": "0x0000000000000000000000000000000000000000",
            "nonce": 41,
            "safeTxHash": "0x4e1f6d2a3bb65fcdcbd1e3b494021e89d13c17ecf94e48c5cbfb1c8359523f6a",
            "isExecuted": false,
            "confirmationsRequired": 2,
            "confirmations": [
                {"owner": "0x2222222222222222222222222222222222222222", "signature": "0xabcd"}
            ],
            "trusted": true
        }"#;
        let tx: MultisigTransaction = serde_json::from_str(raw).unwrap();
        assert_eq!(tx.nonce, 41);
        assert_eq!(tx.confirmations_required, Some(2));
        assert_eq!(tx.confirmations.len(), 1);
        assert!(!tx.is_executed);

        let safe_tx = tx.to_safe_tx().unwrap();
        assert_eq!(safe_tx.value, U256::from(1_000_000_000_000_000u64));
        assert_eq!(safe_tx.data, Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]));
        assert_eq!(safe_tx.nonce, U256::from(41u8));
    }

    #[test]
    fn propose_request_carries_service_field_names() {
        let tx = crate::safe::tx::new_safe_tx(
            Address::repeat_byte(0x01),
            U256::ZERO,
            Bytes::from(vec![0x01]),
            3,
        );
        let request = ProposeRequest::from_tx(
            &tx,
            B256::repeat_byte(0x02),
            Address::repeat_byte(0x03),
            &[0xaa; 65],
        );
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["nonce"], 3);
        assert_eq!(json["operation"], 0);
        assert!(json["contractTransactionHash"]
            .as_str()
            .unwrap()
            .starts_with("0x"));
        assert_eq!(json["signature"].as_str().unwrap().len(), 2 + 130);
        assert_eq!(json["origin"], "bracket");
    }

    #[test]
    fn empty_calldata_variants_parse_to_empty_bytes() {
        assert_eq!(parse_data(None).unwrap(), Bytes::new());
        assert_eq!(parse_data(Some("0x")).unwrap(), Bytes::new());
        assert_eq!(parse_data(Some("")).unwrap(), Bytes::new());
    }
}
