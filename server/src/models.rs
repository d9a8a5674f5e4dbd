//! Data models for proofs, contract reads and API responses

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Extraction group holding the San Francisco reading.
pub const SF_TEMP: &str = "sf_temp";
/// Extraction group holding the New York reading.
pub const NYC_TEMP: &str = "nyc_temp";

/// Proof returned by the zkFetch service.
///
/// Only the extracted temperatures are read by the pipeline itself; the
/// claim and signatures belong to the verifier and the on-chain transform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherProof {
    pub identifier: String,
    pub claim_data: ClaimData,
    pub signatures: Vec<String>,
    #[serde(default)]
    pub witnesses: Vec<Witness>,
    #[serde(default)]
    pub extracted_parameter_values: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_data: Option<serde_json::Value>,
}

impl WeatherProof {
    pub fn sf_temp(&self) -> Option<&str> {
        self.extracted_parameter_values.get(SF_TEMP).map(String::as_str)
    }

    pub fn nyc_temp(&self) -> Option<&str> {
        self.extracted_parameter_values.get(NYC_TEMP).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimData {
    pub provider: String,
    pub parameters: String,
    pub owner: String,
    pub timestamp_s: u32,
    pub context: String,
    pub identifier: String,
    pub epoch: u32,
}

/// Attestor that signed the claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    pub id: String,
    #[serde(default)]
    pub url: String,
}

/// Per-account counters kept by the verifier contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationStats {
    pub last_time: u64,
    pub total: u64,
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub chain_id: u64,
    pub verifier: String,
    pub wallet_available: bool,
    pub version: String,
}

/// Verifier contract configuration
#[derive(Debug, Clone, Serialize)]
pub struct ContractInfo {
    pub address: String,
    pub chain_id: u64,
    pub network: String,
    pub explorer_url: String,
    pub reward_token: String,
    pub reclaim_contract: String,
}

/// Stats of an arbitrary account, read without a signer
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub address: String,
    pub last_time: u64,
    pub last_verification: Option<String>,
    pub total: u64,
}
