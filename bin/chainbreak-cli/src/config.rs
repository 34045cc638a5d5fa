// SPDX-License-Identifier: MIT
use std::fmt;
use std::path::PathBuf;

use alloy_primitives::Address;
use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use host_utils::challenge::{ChallengeClient, ConnectionInfo};
use host_utils::provider::{validate_http_url, validate_rpc_url};

/// Contents of `~/.chainbreak/config.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub base_url: Option<String>,
    pub rpc_url: Option<String>,
    pub private_key: Option<String>,
}

fn config_path() -> Option<PathBuf> {
    dirs_next::home_dir().map(|h| h.join(".chainbreak").join("config.toml"))
}

pub fn load_file_config() -> FileConfig {
    let Some(path) = config_path() else {
        return FileConfig::default();
    };
    if !path.exists() {
        return FileConfig::default();
    }
    match std::fs::read_to_string(&path) {
        Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Ignoring malformed config file");
            FileConfig::default()
        }),
        Err(_) => FileConfig::default(),
    }
}

/// Connection flags shared by every on-chain workflow.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Challenge host, e.g. http://94.237.55.98:35563. Supplies the RPC
    /// endpoint, credentials and flag when they are not given explicitly.
    #[arg(long)]
    pub base_url: Option<String>,

    /// Ethereum JSON-RPC endpoint URL.
    #[arg(long)]
    pub rpc_url: Option<String>,

    /// Player private key (hex).
    #[arg(long)]
    pub private_key: Option<String>,

    /// Target contract address.
    #[arg(long)]
    pub target: Option<Address>,

    /// Setup contract address.
    #[arg(long)]
    pub setup: Option<Address>,

    /// Flag endpoint. Defaults to <base-url>/flag.
    #[arg(long)]
    pub flag_url: Option<String>,
}

/// Everything a workflow needs to reach its challenge instance.
#[derive(Clone)]
pub struct ChallengeConfig {
    pub rpc_url: Url,
    pub private_key: String,
    pub player: Option<Address>,
    pub target: Address,
    pub setup: Option<Address>,
    /// Where the flag is fetched once the workflow succeeds.
    pub flag: Option<ChallengeClient>,
}

impl fmt::Debug for ChallengeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChallengeConfig")
            .field("rpc_url", &self.rpc_url.as_str())
            .field("private_key", &"<redacted>")
            .field("player", &self.player)
            .field("target", &self.target)
            .field("setup", &self.setup)
            .field("flag_url", &self.flag.as_ref().map(|f| f.flag_url().as_str()))
            .finish()
    }
}

/// Layered lookup: CLI flag, then environment, then config file.
pub struct Sources<'a, E: Fn(&str) -> Option<String>> {
    pub args: &'a ConnectionArgs,
    pub env: E,
    pub file: &'a FileConfig,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl<E: Fn(&str) -> Option<String>> Sources<'_, E> {
    fn lookup(
        &self,
        flag: &Option<String>,
        env_keys: &[&str],
        file: &Option<String>,
    ) -> Option<String> {
        non_empty(flag.clone())
            .or_else(|| env_keys.iter().find_map(|&k| non_empty((self.env)(k))))
            .or_else(|| non_empty(file.clone()))
    }

    pub fn base_url(&self) -> Option<String> {
        self.lookup(
            &self.args.base_url,
            &["CHAINBREAK_BASE_URL"],
            &self.file.base_url,
        )
    }

    pub fn rpc_url(&self) -> Option<String> {
        self.lookup(
            &self.args.rpc_url,
            &["CHAINBREAK_RPC_URL", "RPC_URL"],
            &self.file.rpc_url,
        )
    }

    pub fn private_key(&self) -> Option<String> {
        self.lookup(
            &self.args.private_key,
            &["CHAINBREAK_PRIVATE_KEY"],
            &self.file.private_key,
        )
    }

    /// True when the challenge host must be asked for connection info.
    pub fn needs_connection_info(&self) -> bool {
        self.rpc_url().is_none() || self.private_key().is_none() || self.args.target.is_none()
    }

    /// Merge the layered sources with the host's connection info, which has
    /// the lowest precedence.
    pub fn resolve(
        &self,
        host: Option<&ChallengeClient>,
        info: Option<&ConnectionInfo>,
    ) -> Result<ChallengeConfig> {
        let rpc_url = match (self.rpc_url(), host) {
            (Some(url), _) => validate_rpc_url(&url)?,
            (None, Some(host)) => host.rpc_url()?,
            (None, None) => bail!(
                "No RPC URL provided. Use --rpc-url, --base-url, CHAINBREAK_RPC_URL/RPC_URL env \
                 var, or ~/.chainbreak/config.toml"
            ),
        };

        let private_key = self
            .private_key()
            .or_else(|| info.map(|i| i.private_key.clone()))
            .context(
                "No private key provided. Use --private-key, CHAINBREAK_PRIVATE_KEY, or --base-url",
            )?;

        let target = self
            .args
            .target
            .or_else(|| info.map(|i| i.target_address))
            .context("No target address provided. Use --target or --base-url")?;

        let setup = self
            .args
            .setup
            .or_else(|| info.and_then(|i| i.setup_address));

        let flag = flag_client(&self.args, host)?;

        Ok(ChallengeConfig {
            rpc_url,
            private_key,
            player: info.map(|i| i.address),
            target,
            setup,
            flag,
        })
    }
}

/// The flag endpoint: `--flag-url` when given, else the host's `/flag`.
pub fn flag_client(
    args: &ConnectionArgs,
    host: Option<&ChallengeClient>,
) -> Result<Option<ChallengeClient>> {
    let client = match (&args.flag_url, host) {
        (Some(url), Some(host)) => Some(host.clone().with_flag_url(validate_http_url(url)?)),
        (Some(url), None) => Some(ChallengeClient::from_flag_url(validate_http_url(url)?)?),
        (None, host) => host.cloned(),
    };
    Ok(client)
}

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Resolve the challenge host, if one is configured.
pub fn resolve_host(args: &ConnectionArgs) -> Result<Option<ChallengeClient>> {
    let file = load_file_config();
    let sources = Sources {
        args,
        env: process_env,
        file: &file,
    };
    sources
        .base_url()
        .map(|url| ChallengeClient::new(&url))
        .transpose()
}

/// Resolve a full `ChallengeConfig`, asking the challenge host for
/// connection info only when something is still missing.
pub async fn resolve_challenge(args: &ConnectionArgs) -> Result<ChallengeConfig> {
    let file = load_file_config();
    let sources = Sources {
        args,
        env: process_env,
        file: &file,
    };
    let host = sources
        .base_url()
        .map(|url| ChallengeClient::new(&url))
        .transpose()?;

    let info = match &host {
        Some(host) if sources.needs_connection_info() => {
            debug!(base = %host.base_url(), "Asking challenge host for connection info");
            let info = host
                .connection_info()
                .await
                .context("failed to fetch connection info")?;
            Some(info)
        }
        _ => None,
    };

    let config = sources.resolve(host.as_ref(), info.as_ref())?;
    debug!(?config, "Resolved challenge config");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn target() -> Address {
        Address::repeat_byte(0x33)
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn info() -> ConnectionInfo {
        serde_json::from_str(
            r#"{
                "PrivateKey": "0x34ec0032473a17d04b07c803fa13d3bd98b3c39d7bf36764098ea89bfb0e54f5",
                "Address": "0x04FBB5958ab998Ab5C82f458bE1D3A74541a045c",
                "TargetAddress": "0x3D5a7E75BcDc45BE9F77463Ff333b732D537eCc5",
                "setupAddress": "0xB23e0Fad9314e307c91329E02Ee6aB51FA09BE9f"
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_flag_beats_env_and_file() {
        let args = ConnectionArgs {
            rpc_url: Some("http://flag:8545".into()),
            ..Default::default()
        };
        let file = FileConfig {
            rpc_url: Some("http://file:8545".into()),
            ..Default::default()
        };
        let sources = Sources {
            args: &args,
            env: env_of(&[("CHAINBREAK_RPC_URL", "http://env:8545")]),
            file: &file,
        };
        assert_eq!(sources.rpc_url().as_deref(), Some("http://flag:8545"));
    }

    #[test]
    fn test_env_beats_file_and_prefers_tool_specific_var() {
        let args = ConnectionArgs::default();
        let file = FileConfig {
            rpc_url: Some("http://file:8545".into()),
            ..Default::default()
        };
        let sources = Sources {
            args: &args,
            env: env_of(&[
                ("RPC_URL", "http://generic:8545"),
                ("CHAINBREAK_RPC_URL", "http://specific:8545"),
            ]),
            file: &file,
        };
        assert_eq!(sources.rpc_url().as_deref(), Some("http://specific:8545"));
    }

    #[test]
    fn test_file_used_last_and_empty_values_skipped() {
        let args = ConnectionArgs {
            rpc_url: Some("".into()),
            ..Default::default()
        };
        let file = FileConfig {
            rpc_url: Some("http://file:8545".into()),
            ..Default::default()
        };
        let sources = Sources {
            args: &args,
            env: env_of(&[("RPC_URL", "  ")]),
            file: &file,
        };
        assert_eq!(sources.rpc_url().as_deref(), Some("http://file:8545"));
    }

    #[test]
    fn test_explicit_config_needs_no_host() {
        let args = ConnectionArgs {
            rpc_url: Some("http://127.0.0.1:8545".into()),
            private_key: Some(KEY.into()),
            target: Some(target()),
            ..Default::default()
        };
        let file = FileConfig::default();
        let sources = Sources {
            args: &args,
            env: env_of(&[]),
            file: &file,
        };
        assert!(!sources.needs_connection_info());
        let config = sources.resolve(None, None).unwrap();
        assert_eq!(config.target, target());
        assert!(config.flag.is_none());
        assert!(config.player.is_none());
    }

    #[test]
    fn test_connection_info_fills_gaps_with_lowest_precedence() {
        let args = ConnectionArgs {
            target: Some(target()),
            ..Default::default()
        };
        let file = FileConfig::default();
        let sources = Sources {
            args: &args,
            env: env_of(&[]),
            file: &file,
        };
        let host = ChallengeClient::new("http://94.237.55.98:35563").unwrap();
        let info = info();
        let config = sources.resolve(Some(&host), Some(&info)).unwrap();

        assert_eq!(config.target, target());
        assert_eq!(config.private_key, info.private_key);
        assert_eq!(config.setup, info.setup_address);
        assert_eq!(config.player, Some(info.address));
        assert_eq!(config.rpc_url.as_str(), "http://94.237.55.98:35563/rpc");
        assert_eq!(
            config.flag.as_ref().map(|f| f.flag_url().as_str()),
            Some("http://94.237.55.98:35563/flag")
        );
    }

    #[test]
    fn test_flag_url_overrides_host() {
        let args = ConnectionArgs {
            flag_url: Some("http://10.0.0.5:9000/flag".into()),
            ..Default::default()
        };
        let host = ChallengeClient::new("http://94.237.55.98:35563").unwrap();
        let flag = flag_client(&args, Some(&host)).unwrap().unwrap();
        assert_eq!(flag.flag_url().as_str(), "http://10.0.0.5:9000/flag");

        let flag = flag_client(&args, None).unwrap().unwrap();
        assert_eq!(flag.flag_url().as_str(), "http://10.0.0.5:9000/flag");

        let none = flag_client(&ConnectionArgs::default(), None).unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_missing_rpc_is_an_error() {
        let args = ConnectionArgs::default();
        let file = FileConfig::default();
        let sources = Sources {
            args: &args,
            env: env_of(&[]),
            file: &file,
        };
        let err = sources.resolve(None, None).unwrap_err();
        assert!(err.to_string().contains("No RPC URL"));
    }

    #[test]
    fn test_rejects_bad_rpc_scheme() {
        let args = ConnectionArgs {
            rpc_url: Some("ftp://node".into()),
            private_key: Some(KEY.into()),
            target: Some(target()),
            ..Default::default()
        };
        let file = FileConfig::default();
        let sources = Sources {
            args: &args,
            env: env_of(&[]),
            file: &file,
        };
        assert!(sources.resolve(None, None).is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let args = ConnectionArgs {
            rpc_url: Some("http://127.0.0.1:8545".into()),
            private_key: Some(KEY.into()),
            target: Some(target()),
            ..Default::default()
        };
        let file = FileConfig::default();
        let sources = Sources {
            args: &args,
            env: env_of(&[]),
            file: &file,
        };
        let config = sources.resolve(None, None).unwrap();
        assert!(!format!("{config:?}").contains("ac0974"));
    }

    #[test]
    fn test_parse_file_config() {
        let file: FileConfig = toml::from_str(
            r#"
            base_url = "http://94.237.55.98:35563"
            private_key = "0x01"
            "#,
        )
        .unwrap();
        assert!(file.rpc_url.is_none());
        assert_eq!(file.base_url.as_deref(), Some("http://94.237.55.98:35563"));
    }
}
