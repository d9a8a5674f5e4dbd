//! Temperature Verifier client
//!
//! Drives a running server from the terminal:
//! 1. Trigger a verification run
//! 2. Follow it until it settles
//! 3. Print the temperatures, stats and notifications

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use temperature_verifier::presentation::{format_temperature, format_timestamp};

#[derive(Parser)]
#[command(name = "tv")]
#[command(about = "Verify SF & NYC temperatures on-chain")]
struct Cli {
    /// Temperature Verifier server URL
    #[arg(long, default_value = "http://localhost:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a verification and wait for its outcome
    Verify {
        /// Seconds between state polls
        #[arg(long, default_value = "2")]
        poll: u64,

        /// Give up waiting after this many seconds
        #[arg(long, default_value = "300")]
        timeout: u64,
    },

    /// Show the current run state
    State,

    /// Show verification stats of an account
    Stats {
        /// Account address
        #[arg(short, long)]
        address: String,
    },

    /// Show the verifier contract configuration
    Contract,
}

#[derive(Debug, Deserialize)]
struct Notification {
    level: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct VerificationStats {
    last_time: u64,
    total: u64,
}

/// `/api/v1/state` body. The variant fields are flattened next to `state`.
#[derive(Debug, Deserialize)]
struct StateView {
    busy: bool,
    state: String,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    proof: Option<Value>,
    #[serde(default)]
    stats: Option<VerificationStats>,
    #[serde(default)]
    notifications: Vec<Notification>,
}

#[derive(Debug, Deserialize)]
struct StatsResponse {
    address: String,
    last_time: u64,
    last_verification: Option<String>,
    total: u64,
}

#[derive(Debug, Deserialize)]
struct ContractInfo {
    address: String,
    chain_id: u64,
    network: String,
    explorer_url: String,
    reward_token: String,
    reclaim_contract: String,
}

struct VerifierClient {
    client: Client,
    server: String,
}

impl VerifierClient {
    fn new(server: &str) -> Self {
        Self {
            client: Client::new(),
            server: server.trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.server, path);
        let resp = self.client.get(&url).send().await.with_context(|| format!("GET {url}"))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("{} returned {}: {}", path, status, body);
        }
        Ok(resp.json().await?)
    }

    async fn state(&self) -> Result<StateView> {
        self.get_json("/api/v1/state").await
    }

    async fn stats(&self, address: &str) -> Result<StatsResponse> {
        self.get_json(&format!("/api/v1/stats/{}", address)).await
    }

    async fn contract(&self) -> Result<ContractInfo> {
        self.get_json("/api/v1/contract").await
    }

    /// Triggers a run, then polls until it leaves `fetching`.
    async fn verify(&self, poll: Duration, timeout: Duration) -> Result<StateView> {
        let url = format!("{}/api/v1/verify", self.server);
        println!("\n[1] Triggering verification at {}", url);

        let resp = self.client.post(&url).send().await?;
        match resp.status() {
            StatusCode::ACCEPTED => {}
            StatusCode::CONFLICT => println!("[!] A run is already in progress, following it"),
            status => {
                let body = resp.text().await.unwrap_or_default();
                anyhow::bail!("Trigger failed ({}): {}", status, body);
            }
        }

        println!("[2] Waiting for wallet, proof and transaction...");
        let started = std::time::Instant::now();
        loop {
            let view = self.state().await?;
            if !view.busy {
                return Ok(view);
            }
            if started.elapsed() > timeout {
                anyhow::bail!("Run still in progress after {}s", timeout.as_secs());
            }
            tracing::debug!("run still in progress");
            tokio::time::sleep(poll).await;
        }
    }
}

fn display_time(secs: u64) -> String {
    format_timestamp(secs).unwrap_or_else(|| secs.to_string())
}

fn print_state(view: &StateView) {
    println!("State: {}", view.state);
    match view.state.as_str() {
        "succeeded" => {
            if let Some(proof) = &view.proof {
                let temp = |key: &str| {
                    proof["extractedParameterValues"][key]
                        .as_str()
                        .map(format_temperature)
                        .unwrap_or_else(|| "n/a".to_string())
                };
                println!("  San Francisco:       {}", temp("sf_temp"));
                println!("  New York:            {}", temp("nyc_temp"));
            }
            if let Some(stats) = &view.stats {
                println!("  Last Verification:   {}", display_time(stats.last_time));
                println!("  Total Verifications: {}", stats.total);
            }
        }
        "failed" => {
            println!("  Error:   {}", view.kind.as_deref().unwrap_or("unknown_error"));
            println!("  Message: {}", view.message.as_deref().unwrap_or(""));
        }
        _ => {}
    }
    for n in &view.notifications {
        println!("  [{}] {}", n.level, n.message);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let client = VerifierClient::new(&cli.server);

    match cli.command {
        Commands::Verify { poll, timeout } => {
            let view = client
                .verify(Duration::from_secs(poll), Duration::from_secs(timeout))
                .await?;
            println!("\n[3] Run settled");
            print_state(&view);
            if view.state == "failed" {
                std::process::exit(1);
            }
        }

        Commands::State => {
            print_state(&client.state().await?);
        }

        Commands::Stats { address } => {
            let stats = client.stats(&address).await?;

            println!("Verification Stats:");
            println!("  Address:           {}", stats.address);
            println!(
                "  Last Verification: {}",
                stats
                    .last_verification
                    .unwrap_or_else(|| display_time(stats.last_time))
            );
            println!("  Total:             {}", stats.total);
        }

        Commands::Contract => {
            let info = client.contract().await?;

            println!("Verifier Contract:");
            println!("  Address:        {}", info.address);
            println!("  Network:        {} ({})", info.network, info.chain_id);
            println!("  Explorer:       {}", info.explorer_url);
            println!("  Reward Token:   {}", info.reward_token);
            println!("  Reclaim:        {}", info.reclaim_contract);
        }
    }

    Ok(())
}
