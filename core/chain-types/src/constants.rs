// SPDX-License-Identifier: MIT
use hex_literal::hex;

/// Number of recent block hashes the EVM `BLOCKHASH` opcode can see.
pub const BLOCK_HASH_WINDOW: u64 = 256;

/// Magic Vault: storage slot holding the `passphrase` (bytes32).
pub const VAULT_PASSPHRASE_SLOT: u64 = 2;

/// Token To Wonderland: storage slot of the shop holding the SilverCoin address.
pub const SHOP_TOKEN_SLOT: u64 = 1;

/// Token To Wonderland: index of the Golden Key in the shop.
pub const GOLDEN_KEY_INDEX: u64 = 2;

/// Survival of the Fittest: damage dealt by the single strong attack.
pub const SURVIVAL_STRONG_DAMAGE: u64 = 20;

/// Distract and Destroy: damage dealt from the EOA to register as aggro.
pub const DISTRACT_AGGRO_DAMAGE: u64 = 1;

/// Function selector for `nonce()`, the vault's public counter.
pub const NONCE_SELECTOR: [u8; 4] = hex!("affed0e0");

/// Gas limit for exploit contract deployments.
pub const DEPLOY_GAS_LIMIT: u64 = 3_000_000;

/// Gas limit for calls into an exploit contract.
pub const EXPLOIT_GAS_LIMIT: u64 = 500_000;

/// Gas limit for plain calls into challenge contracts.
pub const CALL_GAS_LIMIT: u64 = 300_000;
