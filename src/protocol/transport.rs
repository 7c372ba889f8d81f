//! Transport identifiers for cross-chain message delivery
//!
//! Every routed message names the adaptor it travels over. The same string is
//! the routing key inside the gateway and the dispatch key the relay uses to
//! pick an attestation fetcher.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Cross-chain transport a message is routed through.
///
/// # Example
///
/// ```rust
/// use ccmp_relayer::TransportKind;
///
/// assert_eq!("wormhole".parse::<TransportKind>().unwrap(), TransportKind::Wormhole);
/// // Hyperlane was called Abacus when the first gateways were deployed
/// assert_eq!("abacus".parse::<TransportKind>().unwrap(), TransportKind::Hyperlane);
/// assert!("ccip".parse::<TransportKind>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Wormhole, attested by a guardian-signed VAA
    Wormhole,
    /// Axelar GMP, attested by an approved contract call
    Axelar,
    /// Hyperlane (formerly Abacus), attested by delivery on the destination mailbox
    Hyperlane,
}

impl TransportKind {
    /// All transports the relay knows how to attest.
    pub const ALL: [TransportKind; 3] = [Self::Wormhole, Self::Axelar, Self::Hyperlane];

    /// Canonical adaptor name used in gateway routing.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wormhole => "wormhole",
            Self::Axelar => "axelar",
            Self::Hyperlane => "hyperlane",
        }
    }

    /// Resolve an on-chain adaptor name.
    ///
    /// Matching ignores ASCII case and surrounding whitespace; gateways have
    /// been deployed with both `"abacus"` and `"hyperlane"` for the same adaptor.
    pub fn from_adaptor_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "wormhole" => Some(Self::Wormhole),
            "axelar" => Some(Self::Axelar),
            "hyperlane" | "abacus" => Some(Self::Hyperlane),
            _ => None,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_adaptor_name(s).ok_or_else(|| RelayError::UnsupportedAdapter {
            name: s.to_string(),
        })
    }
}
