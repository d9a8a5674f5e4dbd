//! Proof pipeline: fetch the weather response with a proof, verify it, and
//! turn it into the verifier contract's input.

use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::VerifierError;
use crate::models::WeatherProof;
use crate::services::contract::OnchainProofPayload;

/// Captures the first location's (San Francisco) current temperature.
pub const SF_TEMP_PATTERN: &str = r#""current":\s*\{[^}]*"temperature_2m":\s*(?<sf_temp>-?[0-9.]+)\}\}"#;
/// Captures the last location's (New York) current temperature.
pub const NYC_TEMP_PATTERN: &str = r#""current":\s*\{[^}]*"temperature_2m":\s*(?<nyc_temp>-?[0-9.]+)\}\}[^{]*$"#;

#[derive(Error, Debug)]
pub enum ProofServiceError {
    #[error("Proof service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Proof service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("Malformed proof: {0}")]
    MalformedProof(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Regex,
    Contains,
}

/// Rule the service applies to the response body; named groups become
/// extracted parameters of the proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMatch {
    #[serde(rename = "type")]
    pub kind: MatchKind,
    pub value: String,
}

impl ResponseMatch {
    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            kind: MatchKind::Regex,
            value: pattern.into(),
        }
    }
}

/// What to fetch and what to extract from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub method: HttpMethod,
    pub response_matches: Vec<ResponseMatch>,
}

impl FetchRequest {
    /// Current temperatures of both monitored cities.
    pub fn weather(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Get,
            response_matches: vec![
                ResponseMatch::regex(SF_TEMP_PATTERN),
                ResponseMatch::regex(NYC_TEMP_PATTERN),
            ],
        }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProofFetcher: Send + Sync {
    /// `Ok(None)` when the service produced no proof.
    async fn fetch_with_proof(&self, request: &FetchRequest) -> Result<Option<WeatherProof>, ProofServiceError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProofVerifier: Send + Sync {
    async fn verify(&self, proof: &WeatherProof) -> Result<bool, ProofServiceError>;
}

#[cfg_attr(test, automock)]
pub trait OnchainTransform: Send + Sync {
    fn to_onchain(&self, proof: &WeatherProof) -> Result<OnchainProofPayload, ProofServiceError>;
}

/// A proof that passed verification, with its on-chain form.
///
/// Only [`ProofPipeline`] builds these, so holding one means verification
/// returned true.
#[derive(Debug, Clone)]
pub struct VerifiedPayload {
    proof: WeatherProof,
    payload: OnchainProofPayload,
}

impl VerifiedPayload {
    pub(crate) fn new(proof: WeatherProof, payload: OnchainProofPayload) -> Self {
        Self { proof, payload }
    }

    pub fn proof(&self) -> &WeatherProof {
        &self.proof
    }

    pub fn payload(&self) -> &OnchainProofPayload {
        &self.payload
    }

    pub fn into_proof(self) -> WeatherProof {
        self.proof
    }
}

pub struct ProofPipeline {
    fetcher: Arc<dyn ProofFetcher>,
    verifier: Arc<dyn ProofVerifier>,
    transform: Arc<dyn OnchainTransform>,
    request: FetchRequest,
}

impl ProofPipeline {
    pub fn new(
        fetcher: Arc<dyn ProofFetcher>,
        verifier: Arc<dyn ProofVerifier>,
        transform: Arc<dyn OnchainTransform>,
        request: FetchRequest,
    ) -> Self {
        Self {
            fetcher,
            verifier,
            transform,
            request,
        }
    }

    pub async fn build_verified_payload(&self) -> Result<VerifiedPayload, VerifierError> {
        tracing::info!(url = %self.request.url, "Requesting weather proof");

        let proof = match self.fetcher.fetch_with_proof(&self.request).await {
            Ok(Some(proof)) => proof,
            Ok(None) => {
                tracing::warn!("Proof service returned no proof");
                return Err(VerifierError::ProofGenerationFailed(None));
            }
            Err(e) => {
                tracing::warn!("Proof generation failed: {}", e);
                return Err(VerifierError::ProofGenerationFailed(Some(e)));
            }
        };

        tracing::debug!(
            identifier = %proof.identifier,
            sf_temp = proof.sf_temp().unwrap_or("?"),
            nyc_temp = proof.nyc_temp().unwrap_or("?"),
            "Proof received"
        );

        match self.verifier.verify(&proof).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(identifier = %proof.identifier, "Proof rejected by verifier");
                return Err(VerifierError::ProofVerificationFailed(None));
            }
            Err(e) => {
                tracing::warn!("Proof verification errored: {}", e);
                return Err(VerifierError::ProofVerificationFailed(Some(e)));
            }
        }

        let payload = self
            .transform
            .to_onchain(&proof)
            .map_err(|e| VerifierError::Unknown(e.to_string()))?;

        tracing::info!(identifier = %proof.identifier, "Proof verified");
        Ok(VerifiedPayload::new(proof, payload))
    }
}
