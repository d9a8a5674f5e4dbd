//! Temperature verifier contract: ABI bindings and proof submission through
//! the wallet.

use std::time::Duration;

use alloy::eips::{BlockId, BlockNumberOrTag};
use alloy::primitives::{Address, Bytes};
use alloy::rpc::types::{TransactionInput, TransactionRequest};
use alloy::sol;
use alloy::sol_types::{Revert, SolCall, SolError};
use serde_json::Value;

use crate::error::VerifierError;
use crate::models::VerificationStats;
use crate::services::proof::VerifiedPayload;
use crate::services::wallet::{ChainProvider, ProviderRpcError, WalletSigner};

// Generate contract bindings
sol! {
    #[derive(Debug, PartialEq, Eq)]
    struct ClaimInfo {
        string provider;
        string parameters;
        string context;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct CompleteClaimData {
        bytes32 identifier;
        address owner;
        uint32 timestampS;
        uint32 epoch;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct SignedClaim {
        CompleteClaimData claim;
        bytes[] signatures;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct Proof {
        ClaimInfo claimInfo;
        SignedClaim signedClaim;
    }

    #[allow(missing_docs)]
    interface TemperatureVerifier {
        function verifyProof(Proof proof) external;
        function getVerificationStats(address user) external view returns (uint256 lastTime, uint256 total);
        function rewardToken() external view returns (address);
        function reclaimContract() external view returns (address);
    }
}

/// Argument of `verifyProof`.
pub type OnchainProofPayload = Proof;

/// Unsigned call of `call` on the contract at `to`.
pub fn call_request<C: SolCall>(to: Address, call: &C) -> TransactionRequest {
    TransactionRequest {
        to: Some(to.into()),
        input: TransactionInput::new(Bytes::from(call.abi_encode())),
        ..Default::default()
    }
}

/// Read-only binding to the verifier contract.
#[derive(Clone)]
pub struct VerifierContract {
    address: Address,
    provider: ChainProvider,
}

impl VerifierContract {
    pub fn new(address: Address, provider: ChainProvider) -> Self {
        Self { address, provider }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    async fn view<C: SolCall>(&self, call: C) -> Result<C::Return, ProviderRpcError> {
        if self.provider.is_stale() {
            return Err(ProviderRpcError::new(
                ProviderRpcError::CHAIN_DISCONNECTED,
                "network changed: contract bound to a stale provider",
            ));
        }
        let output = self.provider.call(&call_request(self.address, &call)).await?;
        C::abi_decode_returns(&output, true)
            .map_err(|e| ProviderRpcError::new(ProviderRpcError::INTERNAL, format!("undecodable return data: {e}")))
    }

    pub async fn verification_stats(&self, user: Address) -> Result<VerificationStats, VerifierError> {
        let stats = self
            .view(TemperatureVerifier::getVerificationStatsCall { user })
            .await
            .map_err(|e| VerifierError::ChainReadFailed(e.message))?;

        Ok(VerificationStats {
            last_time: stats.lastTime.try_into().unwrap_or(u64::MAX),
            total: stats.total.try_into().unwrap_or(u64::MAX),
        })
    }

    pub async fn reward_token(&self) -> Result<Address, VerifierError> {
        self.view(TemperatureVerifier::rewardTokenCall {})
            .await
            .map(|r| r._0)
            .map_err(|e| VerifierError::ChainReadFailed(e.message))
    }

    pub async fn reclaim_contract(&self) -> Result<Address, VerifierError> {
        self.view(TemperatureVerifier::reclaimContractCall {})
            .await
            .map(|r| r._0)
            .map_err(|e| VerifierError::ChainReadFailed(e.message))
    }
}

/// Submits verified proofs as transactions signed by the connected wallet.
pub struct ContractSubmitter {
    contract: VerifierContract,
    signer: WalletSigner,
    poll_interval: Duration,
}

impl ContractSubmitter {
    pub fn new(address: Address, signer: WalletSigner, poll_interval: Duration) -> Self {
        Self {
            contract: VerifierContract::new(address, signer.provider().clone()),
            signer,
            poll_interval,
        }
    }

    /// Sends `verifyProof`, waits for inclusion, then reads the account's stats.
    pub async fn submit(&self, verified: &VerifiedPayload) -> Result<VerificationStats, VerifierError> {
        let call = TemperatureVerifier::verifyProofCall {
            proof: verified.payload().clone(),
        };
        let mut tx = call_request(self.contract.address(), &call);
        tx.from = Some(self.signer.address());

        let provider = self.signer.provider();
        let gas = provider.estimate_gas(&tx).await.map_err(submission_error)?;
        tracing::debug!(gas, "verifyProof gas estimate");

        let mut signed = tx.clone();
        signed.gas = Some(gas.into());
        let tx_hash = self.signer.send_transaction(signed).await.map_err(|e| {
            tracing::warn!("Transaction not sent: {}", e);
            submission_error(e)
        })?;
        tracing::info!(%tx_hash, "verifyProof submitted, awaiting confirmation");

        let receipt = loop {
            match provider.transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => break receipt,
                Ok(None) => tokio::time::sleep(self.poll_interval).await,
                Err(e) => {
                    // already broadcast
                    tracing::warn!(%tx_hash, "Lost track of submitted transaction: {}", e);
                    return Err(VerifierError::TransactionRejected(format!(
                        "Transaction 0x{} was sent but its confirmation could not be checked: {}",
                        hex::encode(tx_hash),
                        e.message
                    )));
                }
            }
        };

        if !receipt.status() {
            let reason = self.replay_revert(&tx, receipt.block_number).await;
            tracing::warn!(%tx_hash, reason = %reason, "verifyProof reverted");
            return Err(VerifierError::TransactionReverted(reason));
        }
        tracing::info!(%tx_hash, block = ?receipt.block_number, "verifyProof confirmed");

        self.contract
            .verification_stats(self.signer.address())
            .await
            .map_err(|e| {
                tracing::warn!(%tx_hash, "Submission confirmed but stats unavailable: {}", e);
                e
            })
    }

    /// Re-executes a reverted transaction as a call to learn why it failed.
    async fn replay_revert(&self, tx: &TransactionRequest, block: Option<u64>) -> String {
        let block = BlockId::Number(block.map_or(BlockNumberOrTag::Latest, BlockNumberOrTag::Number));
        match self.signer.provider().call_at(tx, block).await {
            Ok(output) => decode_revert_data(&output).unwrap_or_else(|| "transaction reverted".to_string()),
            Err(e) => revert_reason(&e).unwrap_or(e.message),
        }
    }
}

/// Classifies a failed estimate/send into revert vs rejection.
fn submission_error(error: ProviderRpcError) -> VerifierError {
    match revert_reason(&error) {
        Some(reason) => VerifierError::TransactionReverted(reason),
        None => VerifierError::TransactionRejected(error.message),
    }
}

/// Revert reason carried by an RPC error, if the error is a revert at all.
pub fn revert_reason(error: &ProviderRpcError) -> Option<String> {
    let data = error.data.as_ref().and_then(|data| match data {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map.get("data").and_then(Value::as_str),
        _ => None,
    });
    if let Some(reason) = data
        .and_then(|s| hex::decode(s.trim_start_matches("0x")).ok())
        .and_then(|bytes| decode_revert_data(&bytes))
    {
        return Some(reason);
    }

    if let Some((_, tail)) = error.message.split_once("execution reverted:") {
        return Some(tail.trim().to_string());
    }
    if error.code == ProviderRpcError::EXECUTION_REVERTED || error.message.contains("execution reverted") {
        return Some(String::new());
    }
    None
}

/// Decodes `Error(string)` revert data.
pub fn decode_revert_data(data: &[u8]) -> Option<String> {
    Revert::abi_decode(data, true).ok().map(|revert| revert.reason)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn revert_bytes(reason: &str) -> Vec<u8> {
        Revert {
            reason: reason.to_string(),
        }
        .abi_encode()
    }

    #[test]
    fn revert_data_round_trips_reason() {
        let data = revert_bytes("SF temperature must be above 10");
        assert_eq!(decode_revert_data(&data).as_deref(), Some("SF temperature must be above 10"));
        assert_eq!(decode_revert_data(&[0xde, 0xad]), None);
    }

    #[rstest]
    #[case::data_string(
        ProviderRpcError::new(3, "execution reverted")
            .with_data(json!(format!("0x{}", hex::encode(revert_bytes("NYC temperature must be below -1"))))),
        Some("NYC temperature must be below -1")
    )]
    #[case::data_object(
        ProviderRpcError::new(-32603, "Internal JSON-RPC error.")
            .with_data(json!({ "data": format!("0x{}", hex::encode(revert_bytes("Already claimed"))) })),
        Some("Already claimed")
    )]
    #[case::message_tail(
        ProviderRpcError::new(-32000, "execution reverted: \"Already claimed\""),
        Some("\"Already claimed\"")
    )]
    #[case::bare_revert(ProviderRpcError::new(3, "execution reverted"), Some(""))]
    #[case::rejection(ProviderRpcError::new(4001, "User rejected the request."), None)]
    fn revert_reasons(#[case] error: ProviderRpcError, #[case] expected: Option<&str>) {
        assert_eq!(revert_reason(&error).as_deref(), expected);
    }

    #[test]
    fn rejections_and_reverts_are_told_apart() {
        assert!(matches!(
            submission_error(ProviderRpcError::new(4001, "User rejected the request.")),
            VerifierError::TransactionRejected(msg) if msg == "User rejected the request."
        ));
        assert!(matches!(
            submission_error(ProviderRpcError::new(-32000, "execution reverted: Already claimed")),
            VerifierError::TransactionReverted(reason) if reason == "Already claimed"
        ));
    }

    #[test]
    fn stats_call_selector_is_stable() {
        let call = TemperatureVerifier::getVerificationStatsCall { user: Address::ZERO };
        assert_eq!(call.abi_encode().len(), 4 + 32);
        assert_eq!(
            TemperatureVerifier::getVerificationStatsCall::SIGNATURE,
            "getVerificationStats(address)"
        );
    }
}
