//! Installation id validation against the Keel license authority.
//!
//! A single `GET {api}/installations/{id}` is issued per install. There are
//! no retries; a transient failure fails the install and the operator re-runs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::models::InstallationIdentity;

/// Verdict of the license authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseOutcome {
    /// Known and enabled.
    Valid,
    /// Unknown installation id (HTTP 404).
    NotFound,
    /// Known but switched off.
    Disabled,
    /// The authority gave no usable answer.
    Unreachable,
}

/// Anything able to vouch for an installation id.
#[async_trait]
pub trait InstallationAuthority: Send + Sync {
    async fn validate(&self, identity: &InstallationIdentity) -> LicenseOutcome;
}

#[derive(Debug, Deserialize)]
struct InstallationResponse {
    #[serde(rename = "Enabled", alias = "enabled")]
    enabled: bool,
}

/// HTTP client for the remote authority.
#[derive(Debug, Clone)]
pub struct RemoteLicenseValidator {
    client: reqwest::Client,
    base_url: Url,
}

impl RemoteLicenseValidator {
    /// Client against `base_url` with a per-request `timeout`.
    pub fn new(base_url: Url, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("keel-setup/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, base_url })
    }

    fn installation_url(&self, id: Uuid) -> Option<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .push("installations")
            .push(&id.to_string());
        Some(url)
    }
}

#[async_trait]
impl InstallationAuthority for RemoteLicenseValidator {
    async fn validate(&self, identity: &InstallationIdentity) -> LicenseOutcome {
        let Some(url) = self.installation_url(identity.id) else {
            warn!(base = %self.base_url, "license API URL cannot carry a path");
            return LicenseOutcome::Unreachable;
        };

        debug!(%url, "validating installation id");
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "license server request failed");
                return LicenseOutcome::Unreachable;
            }
        };

        let status = response.status();
        if !status.is_success() {
            debug!(%status, "license server rejected installation id");
            return if status == StatusCode::NOT_FOUND {
                LicenseOutcome::NotFound
            } else {
                LicenseOutcome::Unreachable
            };
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(err) => {
                warn!(error = %err, "failed to read license server response");
                return LicenseOutcome::Unreachable;
            }
        };

        match serde_json::from_slice::<InstallationResponse>(&body) {
            Ok(InstallationResponse { enabled: true }) => LicenseOutcome::Valid,
            Ok(InstallationResponse { enabled: false }) => {
                LicenseOutcome::Disabled
            }
            Err(err) => {
                warn!(error = %err, "license server response has unexpected shape");
                LicenseOutcome::Unreachable
            }
        }
    }
}
