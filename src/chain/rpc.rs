use alloy::network::EthereumWallet;
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use async_trait::async_trait;
use tracing::debug;

use crate::chain::contracts::{IERC20, IExchangeRouter, IGnosisSafe, SafeTx};
use crate::error::{BracketError, Result};
use crate::signing::Wallet;

/// On-chain read/write boundary. Everything the pipeline needs from the RPC
/// endpoint goes through this trait so tests can run against fakes.
#[async_trait]
pub trait EvmClient: Send + Sync {
    async fn gas_price(&self) -> Result<u128>;

    async fn native_balance(&self, account: Address) -> Result<U256>;

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256>;

    async fn token_allowance(&self, token: Address, owner: Address, spender: Address)
        -> Result<U256>;

    /// Current on-chain Safe nonce
    async fn safe_nonce(&self, safe: Address) -> Result<u64>;

    /// Signature threshold of the Safe
    async fn safe_threshold(&self, safe: Address) -> Result<usize>;

    /// Submit `execTransaction` with the assembled signature blob; returns
    /// the execution transaction hash once mined successfully.
    async fn exec_safe_transaction(
        &self,
        safe: Address,
        tx: &SafeTx,
        signatures: Bytes,
    ) -> Result<B256>;

    /// Direct-key funding only: sign and submit the router multicall from
    /// the local EOA. Multisig mode must never reach this.
    async fn submit_router_multicall(
        &self,
        router: Address,
        value: U256,
        calls: Vec<Bytes>,
    ) -> Result<B256>;

    /// Direct-key funding only: sign and submit an ERC-20 approve from the
    /// local EOA. Multisig mode must never reach this.
    async fn submit_token_approve(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<B256>;
}

/// JSON-RPC implementation. A provider is built per call from the endpoint
/// URL; no connection state is held across calls.
pub struct RpcClient {
    rpc_url: String,
    wallet: Wallet,
}

impl RpcClient {
    pub fn new(rpc_url: impl Into<String>, wallet: Wallet) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            wallet,
        }
    }

    fn provider(&self) -> Result<impl Provider> {
        let url = self
            .rpc_url
            .parse()
            .map_err(|e| BracketError::Rpc(format!("invalid RPC URL: {e}")))?;
        Ok(ProviderBuilder::new().connect_http(url))
    }

    fn signing_provider(&self) -> Result<impl Provider> {
        let url = self
            .rpc_url
            .parse()
            .map_err(|e| BracketError::Rpc(format!("invalid RPC URL: {e}")))?;
        let wallet = EthereumWallet::from(self.wallet.signer().clone());
        Ok(ProviderBuilder::new().wallet(wallet).connect_http(url))
    }
}

#[async_trait]
impl EvmClient for RpcClient {
    async fn gas_price(&self) -> Result<u128> {
        let provider = self.provider()?;
        provider
            .get_gas_price()
            .await
            .map_err(|e| BracketError::Rpc(format!("gas price read failed: {e}")))
    }

    async fn native_balance(&self, account: Address) -> Result<U256> {
        let provider = self.provider()?;
        provider
            .get_balance(account)
            .await
            .map_err(|e| BracketError::Rpc(format!("balance read failed: {e}")))
    }

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256> {
        let provider = self.provider()?;
        IERC20::new(token, provider)
            .balanceOf(owner)
            .call()
            .await
            .map_err(|e| BracketError::Rpc(format!("balanceOf failed: {e}")))
    }

    async fn token_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256> {
        let provider = self.provider()?;
        IERC20::new(token, provider)
            .allowance(owner, spender)
            .call()
            .await
            .map_err(|e| BracketError::Rpc(format!("allowance failed: {e}")))
    }

    async fn safe_nonce(&self, safe: Address) -> Result<u64> {
        let provider = self.provider()?;
        let nonce = IGnosisSafe::new(safe, provider)
            .nonce()
            .call()
            .await
            .map_err(|e| BracketError::Rpc(format!("Safe nonce read failed: {e}")))?;
        u64::try_from(nonce).map_err(|_| BracketError::Rpc(format!("Safe nonce out of range: {nonce}")))
    }

    async fn safe_threshold(&self, safe: Address) -> Result<usize> {
        let provider = self.provider()?;
        let threshold = IGnosisSafe::new(safe, provider)
            .getThreshold()
            .call()
            .await
            .map_err(|e| BracketError::Rpc(format!("Safe threshold read failed: {e}")))?;
        usize::try_from(threshold)
            .map_err(|_| BracketError::Rpc(format!("Safe threshold out of range: {threshold}")))
    }

    async fn exec_safe_transaction(
        &self,
        safe: Address,
        tx: &SafeTx,
        signatures: Bytes,
    ) -> Result<B256> {
        let provider = self.signing_provider()?;
        let contract = IGnosisSafe::new(safe, provider);

        debug!(%safe, to = %tx.to, nonce = %tx.nonce, "submitting execTransaction");

        let pending = contract
            .execTransaction(
                tx.to,
                tx.value,
                tx.data.clone(),
                tx.operation,
                tx.safeTxGas,
                tx.baseGas,
                tx.gasPrice,
                tx.gasToken,
                tx.refundReceiver,
                signatures,
            )
            .send()
            .await
            .map_err(|e| BracketError::ExecutionReverted(format!("execTransaction failed: {e}")))?;

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| BracketError::ExecutionReverted(format!("receipt wait failed: {e}")))?;

        if !receipt.status() {
            return Err(BracketError::ExecutionReverted(format!(
                "execTransaction reverted in {:?}",
                receipt.transaction_hash
            )));
        }
        Ok(receipt.transaction_hash)
    }

    async fn submit_router_multicall(
        &self,
        router: Address,
        value: U256,
        calls: Vec<Bytes>,
    ) -> Result<B256> {
        let provider = self.signing_provider()?;
        let contract = IExchangeRouter::new(router, provider);

        let pending = contract
            .multicall(calls)
            .value(value)
            .send()
            .await
            .map_err(|e| BracketError::ExecutionReverted(format!("multicall failed: {e}")))?;

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| BracketError::ExecutionReverted(format!("receipt wait failed: {e}")))?;

        if !receipt.status() {
            return Err(BracketError::ExecutionReverted(format!(
                "multicall reverted in {:?}",
                receipt.transaction_hash
            )));
        }
        Ok(receipt.transaction_hash)
    }

    async fn submit_token_approve(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<B256> {
        let provider = self.signing_provider()?;
        let contract = IERC20::new(token, provider);

        let pending = contract
            .approve(spender, amount)
            .send()
            .await
            .map_err(|e| BracketError::ExecutionReverted(format!("approve failed: {e}")))?;

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| BracketError::ExecutionReverted(format!("receipt wait failed: {e}")))?;

        if !receipt.status() {
            return Err(BracketError::ExecutionReverted(format!(
                "approve reverted in {:?}",
                receipt.transaction_hash
            )));
        }
        Ok(receipt.transaction_hash)
    }
}
