//! Reclaim protocol adapters: zkFetch proof service client, witness
//! signature verification and the on-chain proof transform.

use std::collections::HashSet;

use alloy::primitives::{keccak256, Address, Bytes, Signature, B256};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::contract::{ClaimInfo, CompleteClaimData, OnchainProofPayload, SignedClaim};
use super::proof::{
    FetchRequest, HttpMethod, OnchainTransform, ProofFetcher, ProofServiceError, ProofVerifier, ResponseMatch,
};
use crate::models::WeatherProof;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ZkFetchBody<'a> {
    application_id: Option<&'a str>,
    application_secret: Option<&'a str>,
    url: &'a str,
    public_options: PublicOptions,
    private_options: PrivateOptions<'a>,
}

#[derive(Serialize)]
struct PublicOptions {
    method: HttpMethod,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrivateOptions<'a> {
    response_matches: &'a [ResponseMatch],
}

/// Client of a zkFetch proof-generation service.
pub struct ZkFetchClient {
    client: Client,
    endpoint: String,
    app_id: Option<String>,
    app_secret: Option<String>,
}

impl ZkFetchClient {
    pub fn new(endpoint: impl Into<String>, app_id: Option<String>, app_secret: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            app_id,
            app_secret,
        }
    }
}

#[async_trait]
impl ProofFetcher for ZkFetchClient {
    async fn fetch_with_proof(&self, request: &FetchRequest) -> Result<Option<WeatherProof>, ProofServiceError> {
        let body = ZkFetchBody {
            application_id: self.app_id.as_deref(),
            application_secret: self.app_secret.as_deref(),
            url: &request.url,
            public_options: PublicOptions { method: request.method },
            private_options: PrivateOptions {
                response_matches: &request.response_matches,
            },
        };

        let response = self.client.post(&self.endpoint).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProofServiceError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let proof: Option<WeatherProof> = response.json().await?;
        Ok(proof)
    }
}

/// Checks a proof against the witnesses that are supposed to have signed it.
///
/// With no trusted witnesses configured, the witness list embedded in the
/// proof is used.
pub struct ReclaimVerifier {
    trusted_witnesses: Vec<Address>,
}

impl ReclaimVerifier {
    pub fn new(trusted_witnesses: Vec<Address>) -> Self {
        Self { trusted_witnesses }
    }

    fn expected_witnesses(&self, proof: &WeatherProof) -> Result<Vec<Address>, ProofServiceError> {
        if !self.trusted_witnesses.is_empty() {
            return Ok(self.trusted_witnesses.clone());
        }
        proof
            .witnesses
            .iter()
            .map(|w| {
                w.id.parse::<Address>()
                    .map_err(|e| ProofServiceError::MalformedProof(format!("witness id {}: {e}", w.id)))
            })
            .collect()
    }
}

/// `keccak256(provider \n parameters \n context)`
pub fn claim_identifier(provider: &str, parameters: &str, context: &str) -> B256 {
    keccak256(format!("{provider}\n{parameters}\n{context}"))
}

/// Message witnesses sign with EIP-191.
pub fn claim_sign_data(proof: &WeatherProof) -> String {
    let claim = &proof.claim_data;
    format!(
        "{}\n{}\n{}\n{}",
        claim.identifier.to_lowercase(),
        claim.owner.to_lowercase(),
        claim.timestamp_s,
        claim.epoch
    )
}

fn decode_signature(raw: &str) -> Result<Signature, ProofServiceError> {
    let bytes = hex::decode(raw.trim_start_matches("0x"))
        .map_err(|e| ProofServiceError::MalformedProof(format!("signature hex: {e}")))?;
    Signature::try_from(bytes.as_slice()).map_err(|e| ProofServiceError::MalformedProof(format!("signature: {e}")))
}

#[async_trait]
impl ProofVerifier for ReclaimVerifier {
    async fn verify(&self, proof: &WeatherProof) -> Result<bool, ProofServiceError> {
        if proof.signatures.is_empty() {
            tracing::debug!("Proof carries no signatures");
            return Ok(false);
        }

        let claim = &proof.claim_data;
        let computed = claim_identifier(&claim.provider, &claim.parameters, &claim.context);
        let declared: B256 = claim
            .identifier
            .parse()
            .map_err(|e| ProofServiceError::MalformedProof(format!("identifier: {e}")))?;
        if computed != declared {
            tracing::debug!(%computed, %declared, "Claim identifier mismatch");
            return Ok(false);
        }

        let message = claim_sign_data(proof);
        let mut signers = HashSet::new();
        for raw in &proof.signatures {
            let signature = decode_signature(raw)?;
            let signer = signature
                .recover_address_from_msg(message.as_bytes())
                .map_err(|e| ProofServiceError::MalformedProof(format!("unrecoverable signature: {e}")))?;
            signers.insert(signer);
        }

        let expected = self.expected_witnesses(proof)?;
        if expected.is_empty() {
            tracing::debug!("No witnesses to check the proof against");
            return Ok(false);
        }

        let missing: Vec<&Address> = expected.iter().filter(|w| !signers.contains(*w)).collect();
        if !missing.is_empty() {
            tracing::debug!(?missing, "Witness signatures missing");
            return Ok(false);
        }
        Ok(true)
    }
}

/// Maps a proof onto the contract's `Proof` struct.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReclaimTransform;

impl OnchainTransform for ReclaimTransform {
    fn to_onchain(&self, proof: &WeatherProof) -> Result<OnchainProofPayload, ProofServiceError> {
        let claim = &proof.claim_data;
        let identifier: B256 = claim
            .identifier
            .parse()
            .map_err(|e| ProofServiceError::MalformedProof(format!("identifier: {e}")))?;
        let owner: Address = claim
            .owner
            .parse()
            .map_err(|e| ProofServiceError::MalformedProof(format!("owner: {e}")))?;
        let signatures = proof
            .signatures
            .iter()
            .map(|s| {
                hex::decode(s.trim_start_matches("0x"))
                    .map(Bytes::from)
                    .map_err(|e| ProofServiceError::MalformedProof(format!("signature hex: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(OnchainProofPayload {
            claimInfo: ClaimInfo {
                provider: claim.provider.clone(),
                parameters: claim.parameters.clone(),
                context: claim.context.clone(),
            },
            signedClaim: SignedClaim {
                claim: CompleteClaimData {
                    identifier,
                    owner,
                    timestampS: claim.timestamp_s,
                    epoch: claim.epoch,
                },
                signatures,
            },
        })
    }
}
