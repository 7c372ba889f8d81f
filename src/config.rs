//! Relayer configuration
//!
//! Loaded from a TOML file. Secrets never live in the file: the relayer key
//! is read from the environment variable named by `relayer.private_key_env`,
//! and RPC URLs (which often embed provider API keys) are redacted from
//! `Debug` output.
//!
//! ```rust
//! use ccmp_relayer::config::RelayerConfig;
//!
//! let config = RelayerConfig::from_toml_str(
//!     r#"
//!     [[chains]]
//!     chain_id = 80001
//!     rpc_url = "https://polygon-mumbai.example/v2/key"
//!     gateway = "0x404172100D6A428F5Eae378650f4259CC803de7c"
//!
//!     [[chains]]
//!     chain_id = 43113
//!     rpc_url = "https://avalanche-fuji.example/ext/bc/C/rpc"
//!     gateway = "0x404172100D6A428F5Eae378650f4259CC803de7c"
//!     confirmations = 3
//!     "#,
//! )?;
//! assert_eq!(config.chains.len(), 2);
//! assert_eq!(config.relayer.workers_per_destination, 4);
//! # Ok::<(), ccmp_relayer::RelayError>(())
//! ```

use alloy_primitives::{Address, B256};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::chain::SubscriptionConfig;
use crate::codec::TopicRegistry;
use crate::error::{RelayError, Result};
use crate::protocol::EventLayout;
use crate::relay::RetryPolicy;
use crate::transport::{PollingConfig, AXELARSCAN_TESTNET, WORMHOLE_GUARDIAN_TESTNET};

/// Environment variable holding the relayer key unless configured otherwise.
pub const DEFAULT_PRIVATE_KEY_ENV: &str = "RELAYER_PRIVATE_KEY";

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayerConfig {
    #[serde(default)]
    pub relayer: RelayerSettings,
    #[serde(default)]
    pub transports: TransportsConfig,
    pub chains: Vec<ChainConfig>,
    #[serde(default)]
    pub codec: CodecConfig,
}

/// `[relayer]`: job-level behavior.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayerSettings {
    pub retry: RetryPolicy,
    /// Budget of one job from observation to a terminal state
    pub job_timeout_secs: Option<u64>,
    pub workers_per_destination: usize,
    pub confirmation_poll_interval_secs: u64,
    pub allow_partial_execution: bool,
    /// JSON file of confirmed nonces; in-memory only when unset
    pub store_path: Option<PathBuf>,
    pub private_key_env: String,
}

impl Default for RelayerSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            job_timeout_secs: None,
            workers_per_destination: 4,
            confirmation_poll_interval_secs: 3,
            allow_partial_execution: false,
            store_path: None,
            private_key_env: DEFAULT_PRIVATE_KEY_ENV.to_string(),
        }
    }
}

impl RelayerSettings {
    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_secs.map(Duration::from_secs)
    }

    pub fn confirmation_poll_interval(&self) -> Duration {
        Duration::from_secs(self.confirmation_poll_interval_secs)
    }
}

/// `[transports.*]`: a transport is enabled by having a section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransportsConfig {
    pub wormhole: Option<WormholeConfig>,
    pub axelar: Option<AxelarConfig>,
    pub hyperlane: Option<HyperlaneConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WormholeConfig {
    #[serde(default = "default_guardian_url")]
    pub guardian_url: String,
    #[serde(default = "PollingConfig::wormhole")]
    pub polling: PollingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AxelarConfig {
    #[serde(default = "default_axelarscan_url")]
    pub api_url: String,
    #[serde(default = "PollingConfig::axelar")]
    pub polling: PollingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HyperlaneConfig {
    #[serde(default = "PollingConfig::hyperlane")]
    pub polling: PollingConfig,
}

/// `[[chains]]`: one configured chain, acting as source and destination.
#[derive(Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: Option<String>,
    pub rpc_url: Url,
    pub gateway: Address,
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    pub gas_limit: Option<u64>,
    pub gas_price: Option<u128>,
    /// First block to read routed messages from; the head when unset
    pub start_block: Option<u64>,
    #[serde(default = "default_max_block_range")]
    pub max_block_range: u64,
    #[serde(default = "default_log_poll_interval")]
    pub log_poll_interval_secs: u64,
    pub wormhole: Option<ChainWormholeConfig>,
    pub hyperlane: Option<ChainHyperlaneConfig>,
}

/// Custom Debug that redacts the RPC URL, which may carry an API key.
impl fmt::Debug for ChainConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainConfig")
            .field("chain_id", &self.chain_id)
            .field("name", &self.name)
            .field("rpc_url", &"<redacted>")
            .field("rpc_host", &self.rpc_url.host_str())
            .field("gateway", &self.gateway)
            .field("confirmations", &self.confirmations)
            .field("gas_limit", &self.gas_limit)
            .field("gas_price", &self.gas_price)
            .field("start_block", &self.start_block)
            .field("max_block_range", &self.max_block_range)
            .field("log_poll_interval_secs", &self.log_poll_interval_secs)
            .field("wormhole", &self.wormhole)
            .field("hyperlane", &self.hyperlane)
            .finish()
    }
}

impl ChainConfig {
    /// Log-following parameters for this chain's gateway.
    pub fn subscription_config(&self) -> SubscriptionConfig {
        SubscriptionConfig {
            start_block: self.start_block,
            confirmations: self.confirmations.saturating_sub(1),
            max_block_range: self.max_block_range,
            poll_interval: Duration::from_secs(self.log_poll_interval_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainWormholeConfig {
    /// Overrides the built-in Wormhole chain id table
    pub chain_id: Option<u16>,
    pub core_bridge: Option<Address>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainHyperlaneConfig {
    pub mailbox: Address,
}

/// `[codec]`: routed-message topics beyond the built-in ones.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CodecConfig {
    #[serde(default)]
    pub topics: Vec<TopicEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicEntry {
    pub topic: B256,
    pub layout: EventLayout,
}

fn default_guardian_url() -> String {
    WORMHOLE_GUARDIAN_TESTNET.to_string()
}

fn default_axelarscan_url() -> String {
    AXELARSCAN_TESTNET.to_string()
}

fn default_confirmations() -> u64 {
    1
}

fn default_max_block_range() -> u64 {
    2_000
}

fn default_log_poll_interval() -> u64 {
    2
}

impl RelayerConfig {
    /// Parse and validate a configuration document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Checks serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.chains.len() < 2 {
            return Err(RelayError::InvalidConfig(
                "at least two chains are required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for chain in &self.chains {
            if !seen.insert(chain.chain_id) {
                return Err(RelayError::InvalidConfig(format!(
                    "chain {} is configured twice",
                    chain.chain_id
                )));
            }
            if chain.max_block_range == 0 {
                return Err(RelayError::InvalidConfig(format!(
                    "chain {}: max_block_range must be positive",
                    chain.chain_id
                )));
            }
            if chain.gateway == Address::ZERO {
                return Err(RelayError::InvalidConfig(format!(
                    "chain {}: gateway address is zero",
                    chain.chain_id
                )));
            }
        }

        if self.relayer.workers_per_destination == 0 {
            return Err(RelayError::InvalidConfig(
                "workers_per_destination must be positive".to_string(),
            ));
        }

        if self.transports.hyperlane.is_some() {
            if let Some(chain) = self.chains.iter().find(|c| c.hyperlane.is_none()) {
                return Err(RelayError::InvalidConfig(format!(
                    "hyperlane is enabled but chain {} has no mailbox",
                    chain.chain_id
                )));
            }
        }

        Ok(())
    }

    /// Built-in topics plus the configured extras.
    pub fn topic_registry(&self) -> TopicRegistry {
        self.codec
            .topics
            .iter()
            .fold(TopicRegistry::default(), |registry, entry| {
                registry.with(entry.topic, entry.layout)
            })
    }

    /// Wormhole chain id overrides, per EVM chain id.
    pub fn wormhole_chain_ids(&self) -> HashMap<u64, u16> {
        self.chains
            .iter()
            .filter_map(|c| Some((c.chain_id, c.wormhole.as_ref()?.chain_id?)))
            .collect()
    }

    /// Wormhole core bridge per EVM chain id, where configured.
    pub fn wormhole_core_bridges(&self) -> HashMap<u64, Address> {
        self.chains
            .iter()
            .filter_map(|c| Some((c.chain_id, c.wormhole.as_ref()?.core_bridge?)))
            .collect()
    }

    /// Hyperlane mailbox per EVM chain id.
    pub fn hyperlane_mailboxes(&self) -> HashMap<u64, Address> {
        self.chains
            .iter()
            .filter_map(|c| Some((c.chain_id, c.hyperlane.as_ref()?.mailbox)))
            .collect()
    }

    /// Relayer private key from the configured environment variable.
    pub fn private_key(&self) -> Result<String> {
        let name = &self.relayer.private_key_env;
        std::env::var(name).map_err(|_| {
            RelayError::InvalidConfig(format!("environment variable {name} is not set"))
        })
    }
}
