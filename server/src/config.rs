//! Configuration management

use std::env;
use std::time::Duration;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use serde::Serialize;

/// Open-Meteo current temperature for San Francisco and New York, in that order.
pub const DEFAULT_WEATHER_URL: &str = "https://api.open-meteo.com/v1/forecast?latitude=37.7749,40.7128&longitude=-122.4194,-74.0060&current=temperature_2m";

pub const DEFAULT_VERIFIER_ADDRESS: &str = "0x6E4e27f08FB956CfE66AeA75c256E62d82B87747";

/// The single network this application settles on.
pub const SEPOLIA: NetworkTarget = NetworkTarget {
    chain_id: 11_155_111,
    name: "Sepolia",
    currency: NativeCurrency {
        name: "Sepolia ETH",
        symbol: "ETH",
        decimals: 18,
    },
    rpc_url: "https://sepolia.infura.io/v3/",
    explorer_url: "https://sepolia.etherscan.io",
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct NativeCurrency {
    pub name: &'static str,
    pub symbol: &'static str,
    pub decimals: u8,
}

/// Chain the wallet must be on before anything gets signed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct NetworkTarget {
    pub chain_id: u64,
    pub name: &'static str,
    pub currency: NativeCurrency,
    pub rpc_url: &'static str,
    pub explorer_url: &'static str,
}

impl NetworkTarget {
    /// `0xaa36a7` style id, the form wallets expect in `wallet_*` requests.
    pub fn chain_id_hex(&self) -> String {
        format!("{:#x}", self.chain_id)
    }

    /// Parameter object for `wallet_addEthereumChain`.
    pub fn add_chain_params(&self) -> serde_json::Value {
        serde_json::json!({
            "chainId": self.chain_id_hex(),
            "chainName": self.name,
            "nativeCurrency": {
                "name": self.currency.name,
                "symbol": self.currency.symbol,
                "decimals": self.currency.decimals,
            },
            "rpcUrls": [self.rpc_url],
            "blockExplorerUrls": [self.explorer_url],
        })
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub network: NetworkTarget,
    /// EIP-1193 JSON-RPC endpoint of the wallet. `None` means no wallet is available.
    pub wallet_rpc_url: Option<String>,
    pub verifier_address: Address,
    pub proof_service_url: String,
    pub reclaim_app_id: Option<String>,
    pub reclaim_app_secret: Option<String>,
    pub weather_url: String,
    pub trusted_witnesses: Vec<Address>,
    pub receipt_poll_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid PORT")?,

            network: SEPOLIA,

            wallet_rpc_url: env::var("WALLET_RPC_URL").ok().filter(|url| !url.trim().is_empty()),

            verifier_address: env::var("VERIFIER_CONTRACT_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_VERIFIER_ADDRESS.to_string())
                .parse()
                .context("Invalid VERIFIER_CONTRACT_ADDRESS")?,

            proof_service_url: env::var("PROOF_SERVICE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8001/v1/zkfetch".to_string()),

            reclaim_app_id: env::var("RECLAIM_APP_ID").ok(),
            reclaim_app_secret: env::var("RECLAIM_APP_SECRET").ok(),

            weather_url: env::var("WEATHER_API_URL").unwrap_or_else(|_| DEFAULT_WEATHER_URL.to_string()),

            trusted_witnesses: parse_addresses(&env::var("RECLAIM_TRUSTED_WITNESSES").unwrap_or_default())
                .context("Invalid RECLAIM_TRUSTED_WITNESSES")?,

            receipt_poll_interval: Duration::from_millis(
                env::var("RECEIPT_POLL_INTERVAL_MS")
                    .unwrap_or_else(|_| "2000".to_string())
                    .parse()
                    .context("Invalid RECEIPT_POLL_INTERVAL_MS")?,
            ),
        })
    }

    /// Credentials are not required to start; the proof service rejects the
    /// request on its own when they are missing.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.reclaim_app_id.as_deref().map_or(true, str::is_empty) {
            missing.push("RECLAIM_APP_ID");
        }
        if self.reclaim_app_secret.as_deref().map_or(true, str::is_empty) {
            missing.push("RECLAIM_APP_SECRET");
        }
        missing
    }
}

fn parse_addresses(raw: &str) -> Result<Vec<Address>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<Address>().with_context(|| format!("Invalid address {s}")))
        .collect()
}
