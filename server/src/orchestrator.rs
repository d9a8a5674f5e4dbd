//! One verification run: wallet, proof, submission.

use std::time::Duration;

use alloy::primitives::Address;

use crate::error::VerifierError;
use crate::models::{VerificationStats, WeatherProof};
use crate::services::contract::ContractSubmitter;
use crate::services::proof::ProofPipeline;
use crate::services::wallet::WalletGateway;

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub proof: WeatherProof,
    pub stats: VerificationStats,
}

pub struct VerificationOrchestrator {
    gateway: WalletGateway,
    pipeline: ProofPipeline,
    verifier_address: Address,
    poll_interval: Duration,
}

impl VerificationOrchestrator {
    pub fn new(
        gateway: WalletGateway,
        pipeline: ProofPipeline,
        verifier_address: Address,
        poll_interval: Duration,
    ) -> Self {
        Self {
            gateway,
            pipeline,
            verifier_address,
            poll_interval,
        }
    }

    pub fn gateway(&self) -> &WalletGateway {
        &self.gateway
    }

    pub fn verifier_address(&self) -> Address {
        self.verifier_address
    }

    /// Runs every stage in order; the first failure ends the run.
    #[tracing::instrument(skip(self), fields(verifier = %self.verifier_address))]
    pub async fn run(&self) -> Result<RunOutcome, VerifierError> {
        let signer = self.gateway.ensure_wallet_ready().await?;
        let verified = self.pipeline.build_verified_payload().await?;

        let submitter = ContractSubmitter::new(self.verifier_address, signer, self.poll_interval);
        let stats = submitter.submit(&verified).await?;

        tracing::info!(total = stats.total, last_time = stats.last_time, "Verification run succeeded");
        Ok(RunOutcome {
            proof: verified.into_proof(),
            stats,
        })
    }
}
