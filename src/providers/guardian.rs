//! Wormhole guardian REST API client.

use alloy_primitives::Bytes;
use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument, trace, Instrument};

use crate::error::{RelayError, Result};
use crate::spans;
use crate::traits::GuardianApi;
use crate::transport::{VaaId, WORMHOLE_GUARDIAN_MAINNET, WORMHOLE_GUARDIAN_TESTNET};

/// Seconds to back off when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedVaaResponse {
    vaa_bytes: String,
}

/// Fetches signed VAAs from a guardian's public REST endpoint.
///
/// # Examples
///
/// ```rust,no_run
/// use ccmp_relayer::providers::GuardianRestApi;
/// use ccmp_relayer::traits::GuardianApi;
/// use ccmp_relayer::transport::VaaId;
/// use alloy_primitives::Address;
///
/// # async fn example() -> Result<(), ccmp_relayer::RelayError> {
/// let guardian = GuardianRestApi::testnet();
/// let id = VaaId::new(6, Address::ZERO, 1);
/// let vaa = guardian.get_signed_vaa(&id).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct GuardianRestApi {
    base_url: String,
    client: Client,
}

impl GuardianRestApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    pub fn testnet() -> Self {
        Self::new(WORMHOLE_GUARDIAN_TESTNET)
    }

    pub fn mainnet() -> Self {
        Self::new(WORMHOLE_GUARDIAN_MAINNET)
    }

    fn vaa_url(&self, id: &VaaId) -> String {
        format!("{}/v1/signed_vaa/{id}", self.base_url)
    }
}

fn decode_vaa(body: &str) -> Result<Bytes> {
    let response: SignedVaaResponse = serde_json::from_str(body)?;
    base64::engine::general_purpose::STANDARD
        .decode(response.vaa_bytes.as_bytes())
        .map(Bytes::from)
        .map_err(|e| RelayError::AttestationFailed {
            reason: format!("guardian returned invalid VAA base64: {e}"),
        })
}

#[async_trait]
impl GuardianApi for GuardianRestApi {
    #[instrument(skip(self), fields(vaa_id = %id))]
    async fn get_signed_vaa(&self, id: &VaaId) -> Result<Option<Bytes>> {
        let url = self.vaa_url(id);
        let span = spans::http_request("GET", &url);

        async {
            let response = self.client.get(&url).send().await?;
            let status = response.status();
            trace!(status_code = %status, "Received response from guardian");

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|h| h.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                return Err(RelayError::RateLimitExceeded {
                    retry_after_seconds: retry_after,
                });
            }

            if status == StatusCode::NOT_FOUND {
                debug!(event = "vaa_not_signed_yet");
                return Ok(None);
            }

            if status.is_client_error() {
                return Err(RelayError::AttestationFailed {
                    reason: format!("guardian API returned {status}"),
                });
            }

            response.error_for_status_ref()?;
            let body = response.text().await?;
            decode_vaa(&body).map(Some)
        }
        .instrument(span)
        .await
    }
}
