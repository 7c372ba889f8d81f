use std::time::Duration;

use serde::Deserialize;

use crate::protocol::TransportKind;

/// Public Wormhole guardian REST endpoint for the testnets.
pub const WORMHOLE_GUARDIAN_TESTNET: &str = "https://wormhole-v2-testnet-api.certus.one";
pub const WORMHOLE_GUARDIAN_MAINNET: &str = "https://wormhole-v2-mainnet-api.certus.one";

/// Axelarscan GMP API.
pub const AXELARSCAN_TESTNET: &str = "https://testnet.api.gmp.axelarscan.io";
pub const AXELARSCAN_MAINNET: &str = "https://api.gmp.axelarscan.io";

/// How an attestation fetcher polls its source.
///
/// Polling is at a fixed interval with no backoff. `max_attempts` of `None`
/// polls until the job deadline or cancellation.
///
/// # Examples
///
/// ```rust
/// use ccmp_relayer::transport::PollingConfig;
///
/// let config = PollingConfig::wormhole().with_max_attempts(10);
/// assert_eq!(config.poll_interval_secs, 2);
/// assert_eq!(config.total_timeout_secs(), Some(20));
///
/// assert_eq!(PollingConfig::axelar().total_timeout_secs(), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Polls before giving up with an attestation timeout.
    pub max_attempts: Option<u32>,
    /// Seconds between polls.
    pub poll_interval_secs: u64,
}

impl Default for PollingConfig {
    /// Unbounded polling every 2 seconds.
    fn default() -> Self {
        Self {
            max_attempts: None,
            poll_interval_secs: 2,
        }
    }
}

impl PollingConfig {
    /// Guardian signatures usually land within a few blocks: every 2 seconds.
    pub fn wormhole() -> Self {
        Self::default()
    }

    /// GMP status changes quickly once the call is confirmed: every second.
    pub fn axelar() -> Self {
        Self {
            poll_interval_secs: 1,
            ..Self::default()
        }
    }

    /// Delivery is checked with an RPC call per poll: every 5 seconds.
    pub fn hyperlane() -> Self {
        Self {
            poll_interval_secs: 5,
            ..Self::default()
        }
    }

    /// Preset for a transport.
    pub fn for_transport(kind: TransportKind) -> Self {
        match kind {
            TransportKind::Wormhole => Self::wormhole(),
            TransportKind::Axelar => Self::axelar(),
            TransportKind::Hyperlane => Self::hyperlane(),
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn with_poll_interval_secs(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Longest time spent polling, if bounded.
    pub fn total_timeout_secs(&self) -> Option<u64> {
        self.max_attempts
            .map(|attempts| attempts as u64 * self.poll_interval_secs)
    }
}
