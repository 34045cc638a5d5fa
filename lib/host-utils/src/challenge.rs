// SPDX-License-Identifier: MIT
//! Client for the challenge host that fronts each instance.
//!
//! The host serves `GET /connection_info` (JSON), proxies JSON-RPC at
//! `/rpc`, and returns the flag as plain text from `GET /flag` once the
//! instance is solved.

use std::fmt;
use std::time::Duration;

use alloy_primitives::Address;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::provider::validate_http_url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Credentials and addresses for a spawned challenge instance.
#[derive(Clone, Deserialize)]
pub struct ConnectionInfo {
    #[serde(rename = "PrivateKey")]
    pub private_key: String,
    #[serde(rename = "Address")]
    pub address: Address,
    #[serde(rename = "TargetAddress")]
    pub target_address: Address,
    #[serde(rename = "setupAddress", default)]
    pub setup_address: Option<Address>,
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("private_key", &"<redacted>")
            .field("address", &self.address)
            .field("target_address", &self.target_address)
            .field("setup_address", &self.setup_address)
            .finish()
    }
}

#[derive(Clone)]
pub struct ChallengeClient {
    base: Url,
    flag: Url,
    http: reqwest::Client,
}

impl ChallengeClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base = validate_http_url(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self::with_base(base)
    }

    /// A client for a host known only by its flag endpoint.
    pub fn from_flag_url(flag: Url) -> Result<Self> {
        let base = flag
            .join("./")
            .with_context(|| format!("no base URL for '{flag}'"))?;
        Ok(Self::with_base(base)?.with_flag_url(flag))
    }

    fn with_base(base: Url) -> Result<Self> {
        let flag = base.join("flag").context("failed to build flag URL")?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { base, flag, http })
    }

    /// Override the default `<base>/flag` endpoint.
    pub fn with_flag_url(mut self, flag: Url) -> Self {
        self.flag = flag;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn flag_url(&self) -> &Url {
        &self.flag
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("failed to build URL for '{path}'"))
    }

    pub fn rpc_url(&self) -> Result<Url> {
        self.endpoint("rpc")
    }

    pub async fn connection_info(&self) -> Result<ConnectionInfo> {
        let url = self.endpoint("connection_info")?;
        debug!(%url, "Fetching connection info");
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;
        if !response.status().is_success() {
            bail!(
                "GET {url} returned status {} (instance not running?)",
                response.status()
            );
        }
        let info: ConnectionInfo = response
            .json()
            .await
            .context("failed to parse connection info")?;
        info!(
            player = %info.address,
            target_address = %info.target_address,
            setup = ?info.setup_address,
            "Connection info"
        );
        Ok(info)
    }

    /// Plain-text flag, trimmed. Only served once the instance is solved.
    pub async fn flag(&self) -> Result<String> {
        let url = &self.flag;
        debug!(%url, "Fetching flag");
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;
        if !response.status().is_success() {
            bail!("GET {url} returned status {}", response.status());
        }
        let body = response.text().await.context("failed to read flag body")?;
        Ok(body.trim().to_string())
    }
}
