use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, Result};
use bitcoin::Network;
use serde::{Deserialize, Serialize};

use crate::error::SwapError;

pub const MAINNET_API_URL: &str = "https://boltz.exchange/api";
pub const TESTNET_API_URL: &str = "https://testnet.boltz.exchange/api";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SwapNetwork {
    Mainnet,
    Testnet,
    Regtest,
}

/// Chain parameters and provider endpoint, always selected together.
///
/// Public networks pin the provider endpoint; only regtest accepts a caller-supplied URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkParams {
    network: Network,
    api_url: String,
}

impl NetworkParams {
    pub fn mainnet() -> Self {
        Self {
            network: Network::Bitcoin,
            api_url: MAINNET_API_URL.to_string(),
        }
    }

    pub fn testnet() -> Self {
        Self {
            network: Network::Testnet,
            api_url: TESTNET_API_URL.to_string(),
        }
    }

    pub fn regtest(api_url: impl Into<String>) -> Self {
        Self {
            network: Network::Regtest,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn select(network: SwapNetwork, provider_url: Option<&str>) -> Result<Self, SwapError> {
        match (network, provider_url) {
            (SwapNetwork::Mainnet, None) => Ok(Self::mainnet()),
            (SwapNetwork::Testnet, None) => Ok(Self::testnet()),
            (SwapNetwork::Regtest, Some(url)) => Ok(Self::regtest(url)),
            (SwapNetwork::Regtest, None) => Err(SwapError::InvalidInput(
                "regtest requires an explicit provider_url".to_string(),
            )),
            (other, Some(_)) => Err(SwapError::InvalidInput(format!(
                "provider_url cannot be overridden on {other:?}"
            ))),
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// gRPC endpoint, e.g. `https://127.0.0.1:10009`.
    pub rpc_address: String,
    pub tls_cert_path: PathBuf,
    pub macaroon_path: PathBuf,
    /// Name the node certificate was issued for. lnd certificates always include `localhost`.
    #[serde(default)]
    pub tls_domain: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub network: SwapNetwork,
    #[serde(default)]
    pub provider_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub store_path: Option<PathBuf>,
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeConfig>,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let cfg: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parse config {}", path.display()))?;
        anyhow::ensure!(cfg.timeout_secs > 0, "timeout_secs must be > 0");
        Ok(cfg)
    }

    pub fn network_params(&self) -> Result<NetworkParams> {
        NetworkParams::select(self.network, self.provider_url.as_deref())
            .context("select network parameters")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn node(&self, name: &str) -> Result<&NodeConfig> {
        self.nodes
            .get(name)
            .with_context(|| format!("node {name} is not configured"))
    }
}
