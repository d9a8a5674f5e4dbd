//! HTTP handlers: the page, its trigger, and the JSON view of the same state

use std::sync::{Arc, Mutex, MutexGuard};

use alloy::primitives::Address;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;

use crate::config::Config;
use crate::error::{ApiError, VerifierError};
use crate::models::*;
use crate::orchestrator::VerificationOrchestrator;
use crate::presentation::{format_timestamp, Notification, Presenter, UiState};
use crate::render;
use crate::services::contract::VerifierContract;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<VerificationOrchestrator>,
    presenter: Arc<Mutex<Presenter>>,
}

impl AppState {
    pub fn new(config: Config, orchestrator: VerificationOrchestrator) -> Self {
        Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            presenter: Arc::new(Mutex::new(Presenter::new())),
        }
    }

    pub fn presenter(&self) -> MutexGuard<'_, Presenter> {
        self.presenter.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Moves the UI to `Fetching` and runs the pipeline in the background.
    /// Returns false when a run is already in flight.
    pub fn start_run(&self) -> bool {
        if !self.presenter().trigger() {
            return false;
        }

        let state = self.clone();
        tokio::spawn(async move {
            let orchestrator = state.orchestrator.clone();
            let result = match tokio::spawn(async move { orchestrator.run().await }).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!("Verification run aborted: {}", e);
                    Err(VerifierError::Unknown("Verification run aborted unexpectedly".to_string()))
                }
            };

            let now = Utc::now();
            match result {
                Ok(outcome) => state.presenter().succeed(outcome.proof, outcome.stats, now),
                Err(e) => {
                    tracing::warn!(kind = e.kind(), "Verification run failed: {}", e);
                    state.presenter().fail(&e, now);
                }
            }
        });
        true
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health))
        // Page
        .route("/", get(index))
        .route("/verify", post(trigger_form))
        .route("/notifications/:id/dismiss", post(dismiss_notification))
        // JSON API
        .route("/api/v1/state", get(get_state))
        .route("/api/v1/verify", post(trigger_api))
        .route("/api/v1/stats/:address", get(verification_stats))
        .route("/api/v1/contract", get(contract_info))
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct StateView {
    pub busy: bool,
    #[serde(flatten)]
    pub state: UiState,
    pub notifications: Vec<Notification>,
}

fn snapshot(state: &AppState) -> StateView {
    let mut presenter = state.presenter();
    let notifications = presenter.active_notifications(Utc::now());
    let ui = presenter.state().clone();
    StateView {
        busy: ui.is_busy(),
        state: ui,
        notifications,
    }
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        chain_id: state.config.network.chain_id,
        verifier: state.config.verifier_address.to_string(),
        wallet_available: state.orchestrator.gateway().is_available(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn index(State(state): State<AppState>) -> Html<String> {
    let view = snapshot(&state);
    Html(render::page(&view.state, &view.notifications, &state.config.network))
}

/// Form trigger; a click while busy is ignored like a disabled button.
pub async fn trigger_form(State(state): State<AppState>) -> Redirect {
    if !state.start_run() {
        tracing::debug!("Trigger ignored, run in progress");
    }
    Redirect::to("/")
}

pub async fn trigger_api(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    if !state.start_run() {
        return Err(ApiError::RunInProgress);
    }
    Ok((StatusCode::ACCEPTED, Json(snapshot(&state))))
}

pub async fn get_state(State(state): State<AppState>) -> Json<StateView> {
    Json(snapshot(&state))
}

/// Expired toasts may already be gone; either way the page is shown again.
pub async fn dismiss_notification(State(state): State<AppState>, Path(id): Path<u64>) -> Redirect {
    if !state.presenter().dismiss(id) {
        tracing::debug!(id, "Notification already gone");
    }
    Redirect::to("/")
}

async fn verifier_contract(state: &AppState) -> Result<VerifierContract, ApiError> {
    let provider = state.orchestrator.gateway().read_provider().await?;
    Ok(VerifierContract::new(state.orchestrator.verifier_address(), provider))
}

/// Stats of any account, read through the wallet without a signature
pub async fn verification_stats(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<StatsResponse>, ApiError> {
    let user: Address = address
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid address".to_string()))?;

    let stats = verifier_contract(&state).await?.verification_stats(user).await?;

    Ok(Json(StatsResponse {
        address: user.to_string(),
        last_time: stats.last_time,
        last_verification: format_timestamp(stats.last_time),
        total: stats.total,
    }))
}

/// Verifier contract details, including its configured auxiliary addresses
pub async fn contract_info(State(state): State<AppState>) -> Result<Json<ContractInfo>, ApiError> {
    let contract = verifier_contract(&state).await?;
    let reward_token = contract.reward_token().await?;
    let reclaim_contract = contract.reclaim_contract().await?;

    let network = &state.config.network;
    Ok(Json(ContractInfo {
        address: contract.address().to_string(),
        chain_id: network.chain_id,
        network: network.name.to_string(),
        explorer_url: format!("{}/address/{}", network.explorer_url, contract.address()),
        reward_token: reward_token.to_string(),
        reclaim_contract: reclaim_contract.to_string(),
    }))
}
