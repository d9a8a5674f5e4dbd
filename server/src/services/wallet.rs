//! Wallet access: the EIP-1193 capability, chain-bound provider handles and
//! the gateway that gets a signer onto the right network.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use alloy::eips::{BlockId, BlockNumberOrTag};
use alloy::primitives::{Address, Bytes, B256, U64};
use alloy::rpc::types::{TransactionReceipt, TransactionRequest};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::NetworkTarget;
use crate::error::VerifierError;

/// Error object of an EIP-1193 / JSON-RPC request.
#[derive(Error, Debug, Clone, PartialEq, Deserialize)]
#[error("{message} (code {code})")]
pub struct ProviderRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl ProviderRpcError {
    /// Geth-style code for a reverted call or gas estimation.
    pub const EXECUTION_REVERTED: i64 = 3;
    pub const USER_REJECTED: i64 = 4001;
    pub const DISCONNECTED: i64 = 4900;
    pub const CHAIN_DISCONNECTED: i64 = 4901;
    /// The wallet does not know the requested chain.
    pub const UNRECOGNIZED_CHAIN: i64 = 4902;
    pub const INTERNAL: i64 = -32603;

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn is_user_rejection(&self) -> bool {
        self.code == Self::USER_REJECTED
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderEvent {
    Connect,
    Disconnect,
    ChainChanged,
    AccountsChanged,
}

impl ProviderEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderEvent::Connect => "connect",
            ProviderEvent::Disconnect => "disconnect",
            ProviderEvent::ChainChanged => "chainChanged",
            ProviderEvent::AccountsChanged => "accountsChanged",
        }
    }
}

pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;
pub type ListenerId = u64;

/// An injected wallet: `request` plus event subscription, nothing more.
#[async_trait]
pub trait Eip1193Provider: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError>;

    fn on(&self, event: ProviderEvent, handler: EventHandler) -> ListenerId;

    fn remove_listener(&self, id: ListenerId);
}

struct NetworkWatch {
    wallet: Arc<dyn Eip1193Provider>,
    listener: ListenerId,
    stale: Arc<AtomicBool>,
}

impl Drop for NetworkWatch {
    fn drop(&mut self) {
        self.wallet.remove_listener(self.listener);
    }
}

/// Provider handle pinned to the network it first observed.
///
/// Once the wallet reports a chain change the handle is stale: reads report
/// "network changed" and transactions are refused. A fresh handle has to be
/// derived instead.
#[derive(Clone)]
pub struct ChainProvider {
    wallet: Arc<dyn Eip1193Provider>,
    network: Arc<OnceLock<u64>>,
    watch: Arc<NetworkWatch>,
}

impl ChainProvider {
    pub fn new(wallet: Arc<dyn Eip1193Provider>) -> Self {
        let stale = Arc::new(AtomicBool::new(false));
        let flag = stale.clone();
        let listener = wallet.on(
            ProviderEvent::ChainChanged,
            Arc::new(move |_| flag.store(true, Ordering::SeqCst)),
        );

        Self {
            wallet: wallet.clone(),
            network: Arc::new(OnceLock::new()),
            watch: Arc::new(NetworkWatch {
                wallet,
                listener,
                stale,
            }),
        }
    }

    pub fn is_stale(&self) -> bool {
        self.watch.stale.load(Ordering::SeqCst)
    }

    pub async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError> {
        tracing::debug!(method, "wallet request");
        self.wallet.request(method, params).await
    }

    /// Request whose result is decoded into an alloy RPC type.
    pub async fn call_rpc<R: DeserializeOwned>(&self, method: &str, params: Value) -> Result<R, ProviderRpcError> {
        let raw = self.request(method, params).await?;
        serde_json::from_value(raw)
            .map_err(|e| ProviderRpcError::new(ProviderRpcError::INTERNAL, format!("invalid {method} result: {e}")))
    }

    pub async fn chain_id(&self) -> Result<u64, ProviderRpcError> {
        let chain_id = self.call_rpc::<U64>("eth_chainId", json!([])).await?.to::<u64>();
        match self.network.get() {
            Some(&known) if known != chain_id => Err(ProviderRpcError::new(
                ProviderRpcError::CHAIN_DISCONNECTED,
                format!("network changed: {known} => {chain_id}"),
            )),
            _ => {
                let _ = self.network.set(chain_id);
                Ok(chain_id)
            }
        }
    }

    pub async fn accounts(&self) -> Result<Vec<Address>, ProviderRpcError> {
        self.call_rpc("eth_accounts", json!([])).await
    }

    /// Signer for the first exposed account, bound to this handle's network.
    pub async fn get_signer(&self) -> Result<WalletSigner, ProviderRpcError> {
        let chain_id = self.chain_id().await?;
        let address = self
            .accounts()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ProviderRpcError::new(ProviderRpcError::DISCONNECTED, "no accounts exposed by wallet"))?;

        Ok(WalletSigner {
            provider: self.clone(),
            address,
            chain_id,
        })
    }

    pub async fn call(&self, tx: &TransactionRequest) -> Result<Bytes, ProviderRpcError> {
        self.call_at(tx, BlockId::Number(BlockNumberOrTag::Latest)).await
    }

    pub async fn call_at(&self, tx: &TransactionRequest, block: BlockId) -> Result<Bytes, ProviderRpcError> {
        self.call_rpc("eth_call", json!([tx, block])).await
    }

    pub async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64, ProviderRpcError> {
        let gas: U64 = self.call_rpc("eth_estimateGas", json!([tx])).await?;
        Ok(gas.to::<u64>())
    }

    /// `None` until the transaction is mined.
    pub async fn transaction_receipt(&self, hash: B256) -> Result<Option<TransactionReceipt>, ProviderRpcError> {
        self.call_rpc("eth_getTransactionReceipt", json!([hash])).await
    }
}

/// Wallet-bound handle able to authorize transactions for one account.
#[derive(Clone)]
pub struct WalletSigner {
    provider: ChainProvider,
    address: Address,
    chain_id: u64,
}

impl WalletSigner {
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn provider(&self) -> &ChainProvider {
        &self.provider
    }

    /// Hands the transaction to the wallet, which prompts for a signature.
    pub async fn send_transaction(&self, mut tx: TransactionRequest) -> Result<B256, ProviderRpcError> {
        if self.provider.is_stale() {
            return Err(ProviderRpcError::new(
                ProviderRpcError::CHAIN_DISCONNECTED,
                "network changed: signer is bound to a stale provider",
            ));
        }
        tx.from = Some(self.address);
        tx.chain_id = Some(self.chain_id);

        self.provider.call_rpc("eth_sendTransaction", json!([tx])).await
    }
}

/// Gets the injected wallet connected and onto the target network.
pub struct WalletGateway {
    wallet: Option<Arc<dyn Eip1193Provider>>,
    network: NetworkTarget,
}

impl WalletGateway {
    pub fn new(wallet: Option<Arc<dyn Eip1193Provider>>, network: NetworkTarget) -> Self {
        Self { wallet, network }
    }

    pub fn is_available(&self) -> bool {
        self.wallet.is_some()
    }

    pub fn network(&self) -> &NetworkTarget {
        &self.network
    }

    /// Provider for read-only calls, pinned to the target network. No account
    /// access is requested and the wallet is never asked to switch.
    pub async fn read_provider(&self) -> Result<ChainProvider, VerifierError> {
        let wallet = self.wallet.clone().ok_or(VerifierError::WalletUnavailable)?;
        let provider = ChainProvider::new(wallet);

        let chain_id = provider
            .chain_id()
            .await
            .map_err(|e| VerifierError::ChainReadFailed(e.message))?;
        if chain_id != self.network.chain_id {
            tracing::warn!(
                chain_id,
                expected = self.network.chain_id,
                "Wallet is on another network, refusing read"
            );
            return Err(VerifierError::NetworkSwitchFailed(format!(
                "Please switch to {} network",
                self.network.name
            )));
        }
        Ok(provider)
    }

    pub async fn ensure_wallet_ready(&self) -> Result<WalletSigner, VerifierError> {
        let Some(wallet) = self.wallet.clone() else {
            tracing::warn!("No wallet provider injected");
            return Err(VerifierError::WalletUnavailable);
        };

        let provider = ChainProvider::new(wallet.clone());

        let accounts = provider
            .call_rpc::<Vec<Address>>("eth_requestAccounts", json!([]))
            .await
            .map_err(|e| {
                tracing::warn!("Account access refused: {}", e);
                VerifierError::AccountAccessDenied(e.message)
            })?;
        if accounts.is_empty() {
            return Err(VerifierError::AccountAccessDenied("wallet exposed no accounts".to_string()));
        }

        let provider = self.ensure_network(wallet, provider).await?;

        let signer = provider.get_signer().await.map_err(|e| {
            if e.code == ProviderRpcError::DISCONNECTED {
                VerifierError::AccountAccessDenied(e.message)
            } else {
                VerifierError::Unknown(e.message)
            }
        })?;

        tracing::info!(
            account = %signer.address(),
            chain_id = signer.chain_id(),
            "Wallet ready"
        );
        Ok(signer)
    }

    async fn ensure_network(
        &self,
        wallet: Arc<dyn Eip1193Provider>,
        provider: ChainProvider,
    ) -> Result<ChainProvider, VerifierError> {
        let current = provider
            .chain_id()
            .await
            .map_err(|e| VerifierError::Unknown(e.message))?;
        if current == self.network.chain_id {
            return Ok(provider);
        }

        tracing::info!(
            from = current,
            to = self.network.chain_id,
            "Switching wallet to {}",
            self.network.name
        );
        self.switch_network(&provider).await?;

        // the old handle watched the chain change under it; start over
        drop(provider);
        let fresh = ChainProvider::new(wallet);
        let switched = fresh
            .chain_id()
            .await
            .map_err(|e| VerifierError::NetworkSwitchFailed(e.message))?;
        if switched != self.network.chain_id {
            return Err(VerifierError::NetworkSwitchFailed(format!(
                "Please switch to {} network",
                self.network.name
            )));
        }
        Ok(fresh)
    }

    async fn switch_network(&self, provider: &ChainProvider) -> Result<(), VerifierError> {
        let switch_failed = || VerifierError::NetworkSwitchFailed(format!("Please switch to {} network", self.network.name));

        match self.request_switch(provider).await {
            Ok(()) => Ok(()),
            Err(e) if e.code == ProviderRpcError::UNRECOGNIZED_CHAIN => {
                tracing::info!("Wallet does not know {}, adding it", self.network.name);
                provider
                    .request("wallet_addEthereumChain", json!([self.network.add_chain_params()]))
                    .await
                    .map_err(|e| {
                        tracing::warn!("wallet_addEthereumChain failed: {}", e);
                        VerifierError::NetworkSwitchFailed(format!(
                            "Please add {} network to your wallet",
                            self.network.name
                        ))
                    })?;
                self.request_switch(provider).await.map_err(|e| {
                    tracing::warn!("Switch after adding chain failed: {}", e);
                    switch_failed()
                })
            }
            Err(e) => {
                tracing::warn!("wallet_switchEthereumChain failed: {}", e);
                Err(switch_failed())
            }
        }
    }

    async fn request_switch(&self, provider: &ChainProvider) -> Result<(), ProviderRpcError> {
        provider
            .request(
                "wallet_switchEthereumChain",
                json!([{ "chainId": self.network.chain_id_hex() }]),
            )
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::common::receipt_json;

    #[test]
    fn receipt_status_comes_from_alloy_receipt() {
        let mined: TransactionReceipt = serde_json::from_value(receipt_json(true)).unwrap();
        assert!(mined.status());
        assert_eq!(mined.block_number, Some(16));

        let reverted: TransactionReceipt = serde_json::from_value(receipt_json(false)).unwrap();
        assert!(!reverted.status());
    }

    #[test]
    fn rpc_error_from_json() {
        let err: ProviderRpcError =
            serde_json::from_value(json!({ "code": 4902, "message": "Unrecognized chain ID" })).unwrap();
        assert_eq!(err.code, ProviderRpcError::UNRECOGNIZED_CHAIN);
        assert_eq!(err.to_string(), "Unrecognized chain ID (code 4902)");
        assert!(err.data.is_none());
    }
}
