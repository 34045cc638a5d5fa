// SPDX-License-Identifier: MIT
//! Bindings for the challenge contracts and the exploit helpers.

use alloy_primitives::{Address, Bytes};
use alloy_sol_types::{sol, SolCall};
use anyhow::{Context, Result};

use crate::rpc::{BlockRef, RpcClient};

sol! {
    interface IVault {
        function owner() external view returns (address);
        function nonce() external view returns (uint256);
        function unlock(bytes16 password) external;
        function claimContent() external;
    }

    interface ICreature {
        function attack(uint256 damage) external;
        function strongAttack(uint256 damage) external;
        function loot() external;
        function lifePoints() external view returns (uint256);
    }

    interface IShop {
        function buyItem(uint256 index) external;
        function viewItem(uint256 index)
            external
            view
            returns (string memory name, uint256 price, address owner);
    }

    interface ISilverCoin {
        function balanceOf(address account) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
        function approve(address spender, uint256 amount) external returns (bool);
    }

    interface ISetup {
        function isSolved(address player) external view returns (bool);
    }

    interface IVaultExploit {
        function exploit(address vault, bytes32 passphrase) external;
    }

    interface IAttackContract {
        function executeExploit() external;
    }
}

/// ABI-encode `call` as transaction input.
pub fn calldata<C: SolCall>(call: &C) -> Bytes {
    Bytes::from(call.abi_encode())
}

/// Run a view call against the latest block and decode its return value.
pub async fn view<C: SolCall>(
    client: &RpcClient,
    from: Option<Address>,
    to: Address,
    call: &C,
) -> Result<C::Return> {
    let data = client
        .eth_call(from, to, &call.abi_encode(), BlockRef::Latest)
        .await
        .with_context(|| format!("{} on {to:?}", C::SIGNATURE))?;
    C::abi_decode_returns(&data).with_context(|| format!("decode {} return", C::SIGNATURE))
}
