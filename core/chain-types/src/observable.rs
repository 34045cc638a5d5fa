// SPDX-License-Identifier: MIT
use std::fmt;
use std::str::FromStr;

use alloy_primitives::{hex, Address, Bytes, B256, U256};
use serde::Serialize;

/// Where an observable was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservableKind {
    /// `blockhash(number)`.
    BlockHash { number: u64 },
    /// `block.timestamp` of a mined block.
    BlockTimestamp { number: u64 },
    /// A public counter read through a zero-argument view call.
    Counter {
        contract: Address,
        selector: [u8; 4],
    },
    /// A raw storage slot, including private variables.
    StorageSlot { contract: Address, slot: U256 },
}

impl fmt::Display for ObservableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlockHash { number } => write!(f, "blockhash({number})"),
            Self::BlockTimestamp { number } => write!(f, "timestamp({number})"),
            Self::Counter { contract, selector } => {
                write!(f, "{contract:?}.call(0x{})", hex::encode(selector))
            }
            Self::StorageSlot { contract, slot } => write!(f, "{contract:?}[{slot}]"),
        }
    }
}

/// Parses `blockhash:N`, `timestamp:N`, `slot:ADDRESS:SLOT` and
/// `counter:ADDRESS:SELECTOR`.
impl FromStr for ObservableKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        let number = |raw: &str| {
            raw.parse::<u64>()
                .map_err(|e| format!("invalid block number '{raw}': {e}"))
        };
        let address = |raw: &str| {
            raw.parse::<Address>()
                .map_err(|e| format!("invalid address '{raw}': {e}"))
        };

        match parts.as_slice() {
            &["blockhash", n] => Ok(Self::BlockHash { number: number(n)? }),
            &["timestamp", n] => Ok(Self::BlockTimestamp { number: number(n)? }),
            &["slot", contract, slot] => Ok(Self::StorageSlot {
                contract: address(contract)?,
                slot: U256::from_str(slot).map_err(|e| format!("invalid slot '{slot}': {e}"))?,
            }),
            &["counter", contract, selector] => {
                let digits = selector.strip_prefix("0x").unwrap_or(selector);
                let bytes = hex::decode(digits)
                    .map_err(|e| format!("invalid selector '{selector}': {e}"))?;
                let selector: [u8; 4] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| format!("selector must be 4 bytes, got {}", bytes.len()))?;
                Ok(Self::Counter {
                    contract: address(contract)?,
                    selector,
                })
            }
            _ => Err(format!(
                "unknown observable '{s}'. Expected blockhash:N, timestamp:N, slot:ADDRESS:SLOT \
                 or counter:ADDRESS:SELECTOR"
            )),
        }
    }
}

/// A value read from chain state at exploit time.
///
/// `value` is the raw fixed-width encoding (32 bytes for words, hashes and
/// timestamps).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Observable {
    pub kind: ObservableKind,
    pub value: Bytes,
}

impl Observable {
    pub fn word(kind: ObservableKind, word: B256) -> Self {
        Self {
            kind,
            value: Bytes::copy_from_slice(word.as_slice()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.value.as_ref()
    }
}
