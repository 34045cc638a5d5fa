// SPDX-License-Identifier: MIT
pub mod distract;
pub mod flag;
pub mod replicate;
pub mod survival;
pub mod vault;
pub mod wonderland;

use alloy_primitives::{Address, Bytes, B256};
use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use host_utils::compiler::{compile_contract, CompiledContract};
use host_utils::rpc::{BlockRef, RpcClient, TxReceipt};
use host_utils::wallet::Wallet;

use crate::config::{resolve_challenge, ChallengeConfig, ConnectionArgs};
use crate::progress;

/// A connected workflow: resolved config plus a wallet on the instance.
pub struct Session {
    pub config: ChallengeConfig,
    pub wallet: Wallet,
    pub json: bool,
}

impl Session {
    pub async fn connect(args: &ConnectionArgs, json: bool) -> Result<Self> {
        let config = resolve_challenge(args).await?;
        let client = RpcClient::new(config.rpc_url.as_str());
        ensure_deployed(&client, config.target).await?;

        let wallet = Wallet::connect(client, &config.private_key).await?;
        if let Some(player) = config.player {
            if player != wallet.address() {
                warn!(
                    %player,
                    wallet = %wallet.address(),
                    "Private key does not match player address"
                );
            }
        }
        info!(
            rpc = wallet.client().url(),
            chain_id = wallet.chain_id(),
            contract = %config.target,
            player = %wallet.address(),
            "Connected"
        );
        Ok(Self {
            config,
            wallet,
            json,
        })
    }

    pub fn client(&self) -> &RpcClient {
        self.wallet.client()
    }

    pub fn player(&self) -> Address {
        self.wallet.address()
    }

    /// Send a call, show a spinner while it is mined, and require success.
    pub async fn transact(
        &self,
        what: &str,
        to: Address,
        input: Bytes,
        gas: u64,
    ) -> Result<TxReceipt> {
        let sp = progress::spinner(&format!("{what}..."), self.json);
        let failed = format!("{what} failed");
        let sent = self.wallet.send_call(to, input, gas).await;
        let receipt = progress::fail_on_err(&sp, sent, &failed)?;
        let checked = receipt.ensure_success(what).map(|_| ());
        progress::fail_on_err(&sp, checked, &failed)?;

        let msg = format!(
            "{what} (tx {}, block {})",
            short_hash(receipt.transaction_hash),
            receipt.block_number
        );
        progress::finish(&sp, &msg);
        Ok(receipt)
    }

    pub fn compile(&self, source: &str, name: &str) -> Result<CompiledContract> {
        let sp = progress::spinner(&format!("Compiling {name}..."), self.json);
        let compiled = compile_contract(source, name)
            .with_context(|| format!("failed to compile {name}"));
        let compiled = progress::fail_on_err(&sp, compiled, &format!("Compiling {name} failed"))?;
        progress::finish(
            &sp,
            &format!(
                "Compiled {name} ({} bytes, hash {})",
                compiled.bytecode.len(),
                &hex::encode(compiled.code_hash)[..8]
            ),
        );
        Ok(compiled)
    }

    pub async fn deploy(
        &self,
        name: &str,
        init_code: Bytes,
        gas: u64,
    ) -> Result<(Address, TxReceipt)> {
        let sp = progress::spinner(&format!("Deploying {name}..."), self.json);
        let deployed = self.wallet.deploy(init_code, gas).await;
        let (address, receipt) =
            progress::fail_on_err(&sp, deployed, &format!("Deploying {name} failed"))?;
        progress::finish(&sp, &format!("Deployed {name} at {address}"));
        Ok((address, receipt))
    }

    /// Fetch the flag if the challenge host is known. A failure here is only
    /// a warning: the exploit itself already succeeded.
    pub async fn try_flag(&self) -> Option<String> {
        let client = self.config.flag.as_ref()?;
        match client.flag().await {
            Ok(flag) => {
                info!(%flag, "Flag");
                Some(flag)
            }
            Err(e) => {
                warn!(error = %e, "Couldn't fetch flag from endpoint");
                None
            }
        }
    }
}

/// Fail early when the instance has been torn down.
pub async fn ensure_deployed(client: &RpcClient, target: Address) -> Result<()> {
    let code = client
        .get_code(target, BlockRef::Latest)
        .await
        .context("failed to read target code")?;
    if code.is_empty() {
        bail!("Contract not found at {target:?} - instance expired. Spawn a new one.");
    }
    Ok(())
}

pub fn short_hash(hash: B256) -> String {
    let hex = hex::encode(hash);
    format!("0x{}…", &hex[..10])
}

pub fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
