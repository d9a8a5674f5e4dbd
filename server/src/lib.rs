//! Temperature Verifier
//!
//! Proves the current San Francisco and New York temperatures with a zkFetch
//! proof, verifies it, and claims the reward on the verifier contract through
//! the user's wallet.

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod orchestrator;
pub mod presentation;
pub mod render;
pub mod services;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use config::Config;
use orchestrator::VerificationOrchestrator;
use services::proof::{FetchRequest, ProofPipeline};
use services::reclaim::{ReclaimTransform, ReclaimVerifier, ZkFetchClient};
use services::wallet::{Eip1193Provider, WalletGateway};
use services::wallet_http::HttpWalletProvider;

/// Wires the production collaborators described by `config`.
pub fn build_orchestrator(config: &Config) -> anyhow::Result<VerificationOrchestrator> {
    let wallet = match &config.wallet_rpc_url {
        Some(url) => Some(Arc::new(HttpWalletProvider::new(url)?) as Arc<dyn Eip1193Provider>),
        None => None,
    };
    let gateway = WalletGateway::new(wallet, config.network);

    let pipeline = ProofPipeline::new(
        Arc::new(ZkFetchClient::new(
            config.proof_service_url.clone(),
            config.reclaim_app_id.clone(),
            config.reclaim_app_secret.clone(),
        )),
        Arc::new(ReclaimVerifier::new(config.trusted_witnesses.clone())),
        Arc::new(ReclaimTransform),
        FetchRequest::weather(config.weather_url.clone()),
    );

    Ok(VerificationOrchestrator::new(
        gateway,
        pipeline,
        config.verifier_address,
        config.receipt_poll_interval,
    ))
}
