//! EIP-1193 provider backed by a JSON-RPC wallet endpoint over HTTP

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::json_rpc::ErrorPayload;
use alloy::transports::http::{Client, Http};
use alloy::transports::{RpcError, TransportErrorKind};
use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;

use super::wallet::{Eip1193Provider, EventHandler, ListenerId, ProviderEvent, ProviderRpcError};

impl From<ErrorPayload> for ProviderRpcError {
    fn from(payload: ErrorPayload) -> Self {
        Self {
            code: payload.code,
            message: payload.message.to_string(),
            data: payload
                .data
                .as_ref()
                .and_then(|raw| serde_json::from_str(raw.get()).ok()),
        }
    }
}

fn provider_error(error: RpcError<TransportErrorKind>) -> ProviderRpcError {
    match error {
        RpcError::ErrorResp(payload) => payload.into(),
        RpcError::Transport(kind) => {
            ProviderRpcError::new(ProviderRpcError::DISCONNECTED, format!("wallet unreachable: {kind}"))
        }
        other => ProviderRpcError::new(ProviderRpcError::INTERNAL, format!("invalid wallet response: {other}")),
    }
}

/// Wallet reached through its JSON-RPC port (a wallet daemon, or a dev node
/// with unlocked accounts).
///
/// HTTP has no push channel, so `chainChanged` and `accountsChanged` are
/// emitted locally after the corresponding requests succeed.
pub struct HttpWalletProvider {
    provider: RootProvider<Http<Client>>,
    next_listener: AtomicU64,
    listeners: Mutex<HashMap<ListenerId, (ProviderEvent, EventHandler)>>,
}

impl HttpWalletProvider {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let url = url.parse().with_context(|| format!("Invalid wallet RPC URL {url}"))?;
        Ok(Self {
            provider: ProviderBuilder::new().on_http(url),
            next_listener: AtomicU64::new(1),
            listeners: Mutex::new(HashMap::new()),
        })
    }

    fn emit(&self, event: ProviderEvent, payload: &Value) {
        let handlers: Vec<EventHandler> = match self.listeners.lock() {
            Ok(listeners) => listeners
                .values()
                .filter(|(e, _)| *e == event)
                .map(|(_, handler)| handler.clone())
                .collect(),
            Err(_) => return,
        };
        tracing::debug!(event = event.as_str(), listeners = handlers.len(), "wallet event");
        for handler in handlers {
            handler(payload);
        }
    }
}

#[async_trait]
impl Eip1193Provider for HttpWalletProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError> {
        let result = match self
            .provider
            .raw_request::<Value, Value>(method.to_owned().into(), params.clone())
            .await
        {
            Ok(result) => result,
            Err(RpcError::NullResp) => Value::Null,
            Err(e) => {
                let error = provider_error(e);
                tracing::debug!(method, code = error.code, "wallet request failed: {}", error.message);
                return Err(error);
            }
        };

        match method {
            "wallet_switchEthereumChain" | "wallet_addEthereumChain" => {
                let chain_id = params
                    .get(0)
                    .and_then(|p| p.get("chainId"))
                    .cloned()
                    .unwrap_or(Value::Null);
                self.emit(ProviderEvent::ChainChanged, &chain_id);
            }
            "eth_requestAccounts" => self.emit(ProviderEvent::AccountsChanged, &result),
            _ => {}
        }

        Ok(result)
    }

    fn on(&self, event: ProviderEvent, handler: EventHandler) -> ListenerId {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.insert(id, (event, handler));
        }
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    use serde_json::json;

    use super::*;

    #[test]
    fn listeners_are_filtered_by_event_and_removable() {
        let wallet = HttpWalletProvider::new("http://127.0.0.1:1").unwrap();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        let id = wallet.on(
            ProviderEvent::ChainChanged,
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        wallet.emit(ProviderEvent::AccountsChanged, &json!([]));
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        wallet.emit(ProviderEvent::ChainChanged, &json!("0xaa36a7"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        wallet.remove_listener(id);
        wallet.emit(ProviderEvent::ChainChanged, &json!("0xaa36a7"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn error_payload_keeps_code_and_data() {
        let payload: ErrorPayload = serde_json::from_value(json!({
            "code": 3,
            "message": "execution reverted",
            "data": "0x08c379a0"
        }))
        .unwrap();
        let error = ProviderRpcError::from(payload);
        assert_eq!(error.code, ProviderRpcError::EXECUTION_REVERTED);
        assert_eq!(error.data, Some(json!("0x08c379a0")));

        let payload: ErrorPayload =
            serde_json::from_value(json!({ "code": 4001, "message": "User rejected the request." })).unwrap();
        let error = provider_error(RpcError::ErrorResp(payload));
        assert!(error.is_user_rejection());
        assert!(error.data.is_none());
    }

    #[test]
    fn invalid_url_is_refused() {
        assert!(HttpWalletProvider::new("not a url").is_err());
    }

    #[tokio::test]
    async fn unreachable_wallet_reports_disconnected() {
        let wallet = HttpWalletProvider::new("http://127.0.0.1:1").unwrap();
        let err = wallet.request("eth_chainId", json!([])).await.unwrap_err();
        assert_eq!(err.code, ProviderRpcError::DISCONNECTED);
    }
}
