// SPDX-License-Identifier: MIT
use alloy_primitives::{Address, B256};

/// Interpret a storage word as an address (Solidity packs `address` into
/// the low 20 bytes of its slot).
pub fn word_to_address(word: B256) -> Address {
    Address::from_slice(&word[12..])
}

/// Low 64 bits of an address, i.e. `uint64(uint160(addr))`.
pub fn address_low_u64(addr: Address) -> u64 {
    let mut low = [0u8; 8];
    low.copy_from_slice(&addr[12..]);
    u64::from_be_bytes(low)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_to_address_takes_low_bytes() {
        let mut word = [0xffu8; 32];
        word[12..].copy_from_slice(&[0x11; 20]);
        assert_eq!(word_to_address(B256::from(word)), Address::from([0x11; 20]));
    }

    #[test]
    fn test_address_low_u64() {
        let addr: Address = "0x04FBB5958ab998Ab5C82f458bE1D3A74541a045c"
            .parse()
            .unwrap();
        assert_eq!(address_low_u64(addr), 0xbe1d3a74541a045c);
    }
}
