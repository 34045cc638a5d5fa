// SPDX-License-Identifier: MIT
use anyhow::{bail, Context, Result};
use url::Url;

const RPC_SCHEMES: &[&str] = &["http", "https", "ws", "wss"];
const HTTP_SCHEMES: &[&str] = &["http", "https"];

/// Validate an RPC URL. Only http(s) and ws(s) schemes are allowed.
pub fn validate_rpc_url(raw: &str) -> Result<Url> {
    validate(raw, RPC_SCHEMES, "RPC")
}

/// Validate a challenge host URL. Only http(s) is allowed.
pub fn validate_http_url(raw: &str) -> Result<Url> {
    validate(raw, HTTP_SCHEMES, "challenge")
}

fn validate(raw: &str, allowed: &[&str], what: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).with_context(|| format!("failed to parse {what} URL"))?;

    if !allowed.contains(&url.scheme()) {
        bail!(
            "unsupported {what} URL scheme '{}'. Only {} are allowed",
            url.scheme(),
            allowed.join(", ")
        );
    }
    if url.host_str().is_none() {
        bail!("{what} URL '{raw}' has no host");
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_http_rpc() {
        assert!(validate_rpc_url("http://94.237.55.98:35563/rpc").is_ok());
    }

    #[test]
    fn test_accepts_wss_rpc() {
        assert!(validate_rpc_url("wss://eth-mainnet.g.alchemy.com/v2/key").is_ok());
    }

    #[test]
    fn test_rejects_file_scheme() {
        assert!(validate_rpc_url("file:///etc/passwd").is_err());
    }

    #[test]
    fn test_challenge_rejects_ws() {
        let err = validate_http_url("ws://localhost:8546").unwrap_err();
        assert!(err.to_string().contains("http, https"));
    }

    #[test]
    fn test_rejects_invalid_url() {
        assert!(validate_http_url("not a url").is_err());
    }

    #[test]
    fn test_trims_whitespace() {
        let url = validate_http_url("  http://localhost:1337  ").unwrap();
        assert_eq!(url.port(), Some(1337));
    }
}
