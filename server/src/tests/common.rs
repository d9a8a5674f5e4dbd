use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256, U256, U64};
use alloy::sol_types::{Revert, SolCall, SolError, SolValue};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::{Config, DEFAULT_WEATHER_URL, SEPOLIA};
use crate::models::{ClaimData, WeatherProof, NYC_TEMP, SF_TEMP};
use crate::services::contract::{
    ClaimInfo, CompleteClaimData, OnchainProofPayload, SignedClaim, TemperatureVerifier,
};
use crate::services::wallet::{Eip1193Provider, EventHandler, ListenerId, ProviderEvent, ProviderRpcError};

pub const OWNER: &str = "0x1111111111111111111111111111111111111111";
pub const VERIFIER: &str = "0x6E4e27f08FB956CfE66AeA75c256E62d82B87747";
pub const REWARD_TOKEN: &str = "0x2222222222222222222222222222222222222222";
pub const RECLAIM_CONTRACT: &str = "0x3333333333333333333333333333333333333333";
pub const MAINNET: u64 = 1;

pub fn sample_proof(sf: &str, nyc: &str) -> WeatherProof {
    let identifier = format!("0x{}", hex::encode(B256::repeat_byte(0x42)));
    let mut extracted = BTreeMap::new();
    extracted.insert(SF_TEMP.to_string(), sf.to_string());
    extracted.insert(NYC_TEMP.to_string(), nyc.to_string());

    WeatherProof {
        identifier: identifier.clone(),
        claim_data: ClaimData {
            provider: "http".to_string(),
            parameters: format!(
                "{{\"method\":\"GET\",\"url\":\"{}\",\"latitude\":\"37.7749,40.7128\"}}",
                DEFAULT_WEATHER_URL
            ),
            owner: OWNER.to_string(),
            timestamp_s: 1_704_888_000,
            context: "{\"extractedParameters\":{}}".to_string(),
            identifier,
            epoch: 1,
        },
        signatures: vec![],
        witnesses: vec![],
        extracted_parameter_values: extracted,
        public_data: None,
    }
}

pub fn sample_payload() -> OnchainProofPayload {
    OnchainProofPayload {
        claimInfo: ClaimInfo {
            provider: "http".to_string(),
            parameters: "{}".to_string(),
            context: String::new(),
        },
        signedClaim: SignedClaim {
            claim: CompleteClaimData {
                identifier: B256::repeat_byte(0x42),
                owner: OWNER.parse().unwrap(),
                timestampS: 1_704_888_000,
                epoch: 1,
            },
            signatures: vec![Bytes::from(vec![0u8; 65])],
        },
    }
}

pub fn test_config() -> Config {
    Config {
        port: 0,
        network: SEPOLIA,
        wallet_rpc_url: None,
        verifier_address: VERIFIER.parse().unwrap(),
        proof_service_url: "http://127.0.0.1:1/v1/zkfetch".to_string(),
        reclaim_app_id: None,
        reclaim_app_secret: None,
        weather_url: DEFAULT_WEATHER_URL.to_string(),
        trusted_witnesses: vec![],
        receipt_poll_interval: Duration::from_millis(1),
    }
}

/// `eth_getTransactionReceipt` result of a mined EIP-1559 transaction.
pub fn receipt_json(success: bool) -> Value {
    json!({
        "type": "0x2",
        "status": if success { "0x1" } else { "0x0" },
        "cumulativeGasUsed": "0x30d40",
        "logs": [],
        "logsBloom": format!("0x{}", "00".repeat(256)),
        "transactionHash": B256::repeat_byte(0xab),
        "transactionIndex": "0x0",
        "blockHash": B256::repeat_byte(0xbb),
        "blockNumber": "0x10",
        "gasUsed": "0x30d40",
        "effectiveGasPrice": "0x3b9aca00",
        "from": OWNER,
        "to": VERIFIER,
        "contractAddress": null,
    })
}

fn revert_hex(reason: &str) -> String {
    let data = Revert {
        reason: reason.to_string(),
    }
    .abi_encode();
    format!("0x{}", hex::encode(data))
}

/// How the wallet answers the `verifyProof` transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Confirm,
    /// The user declines the signature prompt.
    Reject,
    /// Gas estimation fails with this revert reason.
    RevertOnEstimate(String),
    /// The transaction is mined with status 0; replaying it reverts with this reason.
    RevertInReceipt(String),
}

#[derive(Debug)]
pub struct WalletState {
    pub chain_id: u64,
    pub known_chains: HashSet<u64>,
    pub accounts: Vec<Address>,
    pub reject_accounts: bool,
    pub reject_switch: bool,
    pub reject_add: bool,
    pub send: SendOutcome,
    pub stats: (u64, u64),
    /// Receipt lookups answered with `null` before the receipt shows up.
    pub pending_polls: u32,
    /// `getVerificationStats` reverts.
    pub fail_stats: bool,
    /// Receipt lookups fail once the transaction is sent.
    pub fail_receipt: bool,
    pub calls: Vec<String>,
}

/// In-memory EIP-1193 wallet with scriptable answers.
pub struct SimulatedWallet {
    state: Mutex<WalletState>,
    listeners: Mutex<HashMap<ListenerId, (ProviderEvent, EventHandler)>>,
    next_listener: AtomicU64,
}

impl SimulatedWallet {
    /// Connected to `chain_id`, knowing only that chain and Sepolia.
    pub fn on_chain(chain_id: u64) -> Self {
        Self {
            state: Mutex::new(WalletState {
                chain_id,
                known_chains: HashSet::from([chain_id, SEPOLIA.chain_id]),
                accounts: vec![OWNER.parse().unwrap()],
                reject_accounts: false,
                reject_switch: false,
                reject_add: false,
                send: SendOutcome::Confirm,
                stats: (1_700_000_000, 5),
                pending_polls: 1,
                fail_stats: false,
                fail_receipt: false,
                calls: vec![],
            }),
            listeners: Mutex::new(HashMap::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    pub fn on_sepolia() -> Self {
        Self::on_chain(SEPOLIA.chain_id)
    }

    pub fn configure(self, f: impl FnOnce(&mut WalletState)) -> Self {
        self.update(f);
        self
    }

    pub fn update(&self, f: impl FnOnce(&mut WalletState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls().iter().filter(|m| *m == method).count()
    }

    pub fn chain_id(&self) -> u64 {
        self.state.lock().unwrap().chain_id
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    fn emit(&self, event: ProviderEvent, payload: Value) {
        let handlers: Vec<EventHandler> = self
            .listeners
            .lock()
            .unwrap()
            .values()
            .filter(|(e, _)| *e == event)
            .map(|(_, h)| h.clone())
            .collect();
        for handler in handlers {
            handler(&payload);
        }
    }

    fn handle(&self, method: &str, params: &Value) -> Result<(Value, Option<u64>), ProviderRpcError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(method.to_string());

        let rejected = || ProviderRpcError::new(ProviderRpcError::USER_REJECTED, "User rejected the request.");

        match method {
            "eth_requestAccounts" if state.reject_accounts => Err(rejected()),
            "eth_requestAccounts" | "eth_accounts" => Ok((json!(state.accounts), None)),
            "eth_chainId" => Ok((json!(format!("{:#x}", state.chain_id)), None)),
            "wallet_switchEthereumChain" => {
                if state.reject_switch {
                    return Err(rejected());
                }
                let target = chain_param(params)?;
                if !state.known_chains.contains(&target) {
                    return Err(ProviderRpcError::new(
                        ProviderRpcError::UNRECOGNIZED_CHAIN,
                        "Unrecognized chain ID",
                    ));
                }
                let changed = (state.chain_id != target).then_some(target);
                state.chain_id = target;
                Ok((Value::Null, changed))
            }
            "wallet_addEthereumChain" => {
                if state.reject_add {
                    return Err(rejected());
                }
                let chain = chain_param(params)?;
                state.known_chains.insert(chain);
                Ok((Value::Null, None))
            }
            "eth_estimateGas" => match &state.send {
                SendOutcome::RevertOnEstimate(reason) => Err(ProviderRpcError::new(
                    ProviderRpcError::EXECUTION_REVERTED,
                    "execution reverted",
                )
                .with_data(json!(revert_hex(reason)))),
                _ => Ok((json!("0x30d40"), None)),
            },
            "eth_sendTransaction" => match &state.send {
                SendOutcome::Reject => Err(rejected()),
                _ => Ok((json!(B256::repeat_byte(0xab)), None)),
            },
            "eth_getTransactionReceipt" => {
                if state.fail_receipt {
                    return Err(ProviderRpcError::new(ProviderRpcError::DISCONNECTED, "wallet went away"));
                }
                if state.pending_polls > 0 {
                    state.pending_polls -= 1;
                    return Ok((Value::Null, None));
                }
                let success = !matches!(state.send, SendOutcome::RevertInReceipt(_));
                Ok((receipt_json(success), None))
            }
            "eth_call" => self.call(&state, params).map(|v| (v, None)),
            other => Err(ProviderRpcError::new(-32601, format!("method {other} not supported"))),
        }
    }

    fn call(&self, state: &WalletState, params: &Value) -> Result<Value, ProviderRpcError> {
        let tx = &params[0];
        let data = tx["input"]
            .as_str()
            .or_else(|| tx["data"].as_str())
            .and_then(|s| hex::decode(s.trim_start_matches("0x")).ok())
            .unwrap_or_default();
        let selector: [u8; 4] = data
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| ProviderRpcError::new(-32602, "missing selector"))?;

        let output = if selector == TemperatureVerifier::getVerificationStatsCall::SELECTOR {
            if state.fail_stats {
                return Err(ProviderRpcError::new(ProviderRpcError::EXECUTION_REVERTED, "execution reverted"));
            }
            (U256::from(state.stats.0), U256::from(state.stats.1)).abi_encode_params()
        } else if selector == TemperatureVerifier::rewardTokenCall::SELECTOR {
            REWARD_TOKEN.parse::<Address>().unwrap().abi_encode()
        } else if selector == TemperatureVerifier::reclaimContractCall::SELECTOR {
            RECLAIM_CONTRACT.parse::<Address>().unwrap().abi_encode()
        } else if selector == TemperatureVerifier::verifyProofCall::SELECTOR {
            if let SendOutcome::RevertInReceipt(reason) = &state.send {
                return Err(
                    ProviderRpcError::new(ProviderRpcError::EXECUTION_REVERTED, "execution reverted")
                        .with_data(json!(revert_hex(reason))),
                );
            }
            vec![]
        } else {
            return Err(ProviderRpcError::new(ProviderRpcError::EXECUTION_REVERTED, "execution reverted"));
        };
        Ok(json!(format!("0x{}", hex::encode(output))))
    }
}

fn chain_param(params: &Value) -> Result<u64, ProviderRpcError> {
    serde_json::from_value::<U64>(params[0]["chainId"].clone())
        .map(|id| id.to::<u64>())
        .map_err(|_| ProviderRpcError::new(-32602, "invalid chainId"))
}

#[async_trait]
impl Eip1193Provider for SimulatedWallet {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError> {
        let (result, changed) = self.handle(method, &params)?;
        if let Some(chain) = changed {
            self.emit(ProviderEvent::ChainChanged, json!(format!("{chain:#x}")));
        }
        Ok(result)
    }

    fn on(&self, event: ProviderEvent, handler: EventHandler) -> ListenerId {
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().unwrap().insert(id, (event, handler));
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.lock().unwrap().remove(&id);
    }
}

pub fn wallet(sim: &Arc<SimulatedWallet>) -> Arc<dyn Eip1193Provider> {
    sim.clone()
}
