//! Error types for the verifier

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::proof::ProofServiceError;

/// Why a verification run stopped. Every stage fails fast with one of these.
#[derive(Error, Debug)]
pub enum VerifierError {
    #[error("No wallet detected. Connect a wallet provider and try again")]
    WalletUnavailable,

    #[error("Please connect your wallet first")]
    AccountAccessDenied(String),

    #[error("{0}")]
    NetworkSwitchFailed(String),

    #[error("Failed to generate proof")]
    ProofGenerationFailed(#[source] Option<ProofServiceError>),

    #[error("Proof verification failed")]
    ProofVerificationFailed(#[source] Option<ProofServiceError>),

    #[error("{0}")]
    TransactionRejected(String),

    #[error("execution reverted: {0}")]
    TransactionReverted(String),

    #[error("Failed to read verification stats: {0}")]
    ChainReadFailed(String),

    #[error("{0}")]
    Unknown(String),
}

impl VerifierError {
    /// Stable identifier used by the JSON API and in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            VerifierError::WalletUnavailable => "wallet_unavailable",
            VerifierError::AccountAccessDenied(_) => "account_access_denied",
            VerifierError::NetworkSwitchFailed(_) => "network_switch_failed",
            VerifierError::ProofGenerationFailed(_) => "proof_generation_failed",
            VerifierError::ProofVerificationFailed(_) => "proof_verification_failed",
            VerifierError::TransactionRejected(_) => "transaction_rejected",
            VerifierError::TransactionReverted(_) => "transaction_reverted",
            VerifierError::ChainReadFailed(_) => "chain_read_failed",
            VerifierError::Unknown(_) => "unknown_error",
        }
    }
}

/// Errors returned by the HTTP layer
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("A verification is already in progress")]
    RunInProgress,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Verifier(#[from] VerifierError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::RunInProgress => StatusCode::CONFLICT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Verifier(VerifierError::WalletUnavailable) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Verifier(VerifierError::NetworkSwitchFailed(_)) => StatusCode::CONFLICT,
            ApiError::Verifier(VerifierError::ChainReadFailed(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Verifier(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}
