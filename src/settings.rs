use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Rpc {
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
}

fn default_ws_url() -> String {
    "ws://127.0.0.1:8545".to_string()
}

impl Default for Rpc {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Poll {
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// Concurrent source drivers per cycle.
    #[serde(default = "default_fan_out")]
    pub fan_out: usize,
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
}

fn default_interval_seconds() -> u64 {
    60
}
fn default_max_attempts() -> usize {
    3
}
fn default_fan_out() -> usize {
    4
}
fn default_http_timeout_seconds() -> u64 {
    15
}
fn default_retry_base_ms() -> u64 {
    500
}
fn default_retry_max_ms() -> u64 {
    10_000
}

impl Default for Poll {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            max_attempts: default_max_attempts(),
            fan_out: default_fan_out(),
            http_timeout_seconds: default_http_timeout_seconds(),
            retry_base_ms: default_retry_base_ms(),
            retry_max_ms: default_retry_max_ms(),
        }
    }
}

/// A contract subscribed over WebSocket, with the display name used in
/// logs and in feed output.
#[derive(Debug, Deserialize, Clone)]
pub struct ContractTarget {
    pub address: String,
    pub name: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Targets {
    #[serde(default)]
    pub governors: Vec<ContractTarget>,
    #[serde(default)]
    pub staking_contracts: Vec<ContractTarget>,
    #[serde(default)]
    pub lp_pairs: Vec<ContractTarget>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TallyOrg {
    pub org_id: String,
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SafeTarget {
    pub address: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Sources {
    #[serde(default)]
    pub snapshot_spaces: Vec<String>,
    #[serde(default)]
    pub tally_orgs: Vec<TallyOrg>,
    #[serde(default)]
    pub safes: Vec<SafeTarget>,
    #[serde(default = "default_safe_tx_base")]
    pub safe_tx_base: String,
}

fn default_safe_tx_base() -> String {
    "https://safe-transaction-mainnet.safe.global".to_string()
}

impl Default for Sources {
    fn default() -> Self {
        Self {
            snapshot_spaces: Vec::new(),
            tally_orgs: Vec::new(),
            safes: Vec::new(),
            safe_tx_base: default_safe_tx_base(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Agents {
    /// Project names surfaced on the trending-agents rail.
    #[serde(default)]
    pub tracked: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub rpc: Rpc,
    #[serde(default)]
    pub poll: Poll,
    #[serde(default)]
    pub targets: Targets,
    #[serde(default)]
    pub sources: Sources,
    #[serde(default)]
    pub agents: Agents,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("Config.toml"))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;

        // Environment variable override for the RPC endpoint
        if let Ok(ws_url) = env::var("DAO_PULSE_RPC_WS_URL") {
            let trimmed = ws_url.trim();
            if !trimmed.is_empty() {
                settings.rpc.ws_url = trimmed.to_string();
            }
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_all_sections() {
        let settings = Settings::default();
        assert_eq!(settings.rpc.ws_url, "ws://127.0.0.1:8545");
        assert_eq!(settings.poll.interval_seconds, 60);
        assert_eq!(settings.poll.max_attempts, 3);
        assert_eq!(settings.poll.fan_out, 4);
        assert!(settings.targets.governors.is_empty());
        assert_eq!(
            settings.sources.safe_tx_base,
            "https://safe-transaction-mainnet.safe.global"
        );
        assert!(settings.agents.tracked.is_empty());
    }
}
