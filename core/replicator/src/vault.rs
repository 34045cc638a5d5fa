// SPDX-License-Identifier: MIT
//! Magic Vault password derivation.
//!
//! The vault computes, inside `unlock`:
//!
//! ```text
//! key(r, n) = keccak256(uint256(blockhash(block.number - r)) + n)
//! key1      = key(block.timestamp % 2 + 1, nonce)
//! key2      = uint128(key(2, nonce + 1))
//! secret    = bytes8(uint128(bytes16(passphrase ^ key1)) ^ key2)
//! magic     = (secret >> 32) | (secret << 16)
//! ```
//!
//! and expects `bytes16(uint64(owner) << 64 | uint64(magic))`.

use alloy_primitives::{Address, B256, U256};

use chain_types::conversions::address_low_u64;

use crate::engine::replicate;
use crate::error::ReplicateError;
use crate::formula::{Formula, Step, WORD};

/// Blocks back from the executing block that `key2` reads.
pub const KEY2_REDUCTOR: u64 = 2;

/// Inputs to the vault's derivation, all read from chain state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultObservables {
    /// Storage slot 2 of the vault.
    pub passphrase: B256,
    /// The vault's public `nonce()` at execution time.
    pub nonce: U256,
    /// `blockhash(block.number - key1_reductor(block.timestamp))`.
    pub key1_block_hash: B256,
    /// `blockhash(block.number - 2)`.
    pub key2_block_hash: B256,
}

impl VaultObservables {
    /// Observables in the order `magic_password_formula` loads them.
    pub fn as_inputs(&self) -> [[u8; 32]; 4] {
        [
            self.passphrase.0,
            self.nonce.to_be_bytes(),
            self.key1_block_hash.0,
            self.key2_block_hash.0,
        ]
    }
}

/// `block.timestamp % 2 + 1`: how far back `key1` looks.
pub fn key1_reductor(timestamp: u64) -> u64 {
    timestamp % 2 + 1
}

/// Block numbers whose hashes `unlock` reads when it executes in `block` at
/// `timestamp`, as `(key1_block, key2_block)`.
pub fn key_blocks(block: u64, timestamp: u64) -> (u64, u64) {
    (
        block.saturating_sub(key1_reductor(timestamp)),
        block.saturating_sub(KEY2_REDUCTOR),
    )
}

/// Observables: `[passphrase, nonce, key1_block_hash, key2_block_hash]`.
pub fn magic_password_formula() -> Formula {
    let load = |index| Step::Load {
        index,
        width: WORD,
    };
    Formula::new(vec![
        // bytes16(passphrase ^ key1)
        load(0),
        load(2),
        load(1),
        Step::Add,
        Step::Hash,
        Step::Xor,
        Step::Head(16),
        // uint128(key(2, nonce + 1))
        load(3),
        load(1),
        Step::Word(U256::from(1u64)),
        Step::Add,
        Step::Add,
        Step::Hash,
        Step::Tail(16),
        // bytes8(... ^ key2)
        Step::Xor,
        Step::Head(8),
        // (secret >> 32) | (secret << 16)
        Step::Dup,
        Step::Shr(32),
        Step::Swap,
        Step::Shl(16),
        Step::Or,
    ])
}

pub fn magic_password(observables: &VaultObservables) -> Result<[u8; 8], ReplicateError> {
    let formula = magic_password_formula();
    let out = replicate(&observables.as_inputs(), &formula)?;
    out.as_slice()
        .try_into()
        .map_err(|_| ReplicateError::InvalidFormula {
            step: formula.steps().len(),
            reason: format!("expected 8 bytes, produced {}", out.len()),
        })
}

/// `bytes16(uint64(owner) << 64 | uint64(magic))`.
pub fn unlock_password(owner: Address, magic: [u8; 8]) -> [u8; 16] {
    let mut password = [0u8; 16];
    password[..8].copy_from_slice(&address_low_u64(owner).to_be_bytes());
    password[8..].copy_from_slice(&magic);
    password
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn fixture() -> VaultObservables {
        VaultObservables {
            passphrase: B256::from(hex!(
                "5f1a8e8a85c412607b453d7439da843b6a3027830015596e78722edcf541ef7e"
            )),
            nonce: U256::from(0x2au64),
            key1_block_hash: B256::from(hex!(
                "a29bcce5697f3febdcd150ceb73f558b35d53dcadc485f0ba928f94f245c5de0"
            )),
            key2_block_hash: B256::from(hex!(
                "dead2a52c2d7517e2b7d6a4092bb9061496906c018fd4c1d5cce5a2dec96da2c"
            )),
        }
    }

    #[test]
    fn test_magic_password_fixture() {
        assert_eq!(magic_password(&fixture()).unwrap(), hex!("5461b3c9dffd5461"));
    }

    #[test]
    fn test_odd_timestamp_reads_two_blocks_back() {
        // With an odd timestamp both keys read blockhash(block.number - 2).
        let mut obs = fixture();
        obs.key1_block_hash = obs.key2_block_hash;
        assert_eq!(magic_password(&obs).unwrap(), hex!("471f09e5feb5471f"));
    }

    #[test]
    fn test_unlock_password_layout() {
        let owner: Address = "0x04FBB5958ab998Ab5C82f458bE1D3A74541a045c"
            .parse()
            .unwrap();
        let password = unlock_password(owner, hex!("5461b3c9dffd5461"));
        assert_eq!(password, hex!("be1d3a74541a045c5461b3c9dffd5461"));
    }

    #[test]
    fn test_key_blocks_follow_timestamp_parity() {
        assert_eq!(key1_reductor(1_700_000_000), 1);
        assert_eq!(key1_reductor(1_700_000_001), 2);
        assert_eq!(key_blocks(100, 10), (99, 98));
        assert_eq!(key_blocks(100, 11), (98, 98));
        assert_eq!(key_blocks(1, 0), (0, 0));
    }

    #[test]
    fn test_formula_text_round_trip() {
        let formula = magic_password_formula();
        let reparsed: Formula = formula.to_string().parse().unwrap();
        assert_eq!(reparsed, formula);
    }
}
