// SPDX-License-Identifier: MIT
//! Reads observables from chain state.
//!
//! Every read is pinned to one block so a batch of observables describes a
//! single consistent state.

use alloy_primitives::{Address, B256, U256};
use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use chain_types::constants::{BLOCK_HASH_WINDOW, NONCE_SELECTOR, VAULT_PASSPHRASE_SLOT};
use chain_types::observable::{Observable, ObservableKind};
use replicator::vault::{key_blocks, VaultObservables};
use replicator::ReplicateError;

use crate::rpc::{BlockRef, RpcClient};

/// Check that `blockhash(number)` is visible to a transaction executing in
/// block `executing`. The EVM only exposes the previous 256 hashes and
/// returns zero for anything else.
pub fn check_block_window(number: u64, executing: u64) -> Result<(), ReplicateError> {
    if number >= executing || executing - number > BLOCK_HASH_WINDOW {
        return Err(ReplicateError::StaleObservable {
            block: number,
            head: executing,
        });
    }
    Ok(())
}

pub struct ObservableReader<'a> {
    client: &'a RpcClient,
    head: u64,
}

impl<'a> ObservableReader<'a> {
    /// Pin reads to the current chain head.
    pub async fn at_head(client: &'a RpcClient) -> Result<Self> {
        let head = client.block_number().await?;
        Ok(Self::at(client, head))
    }

    pub fn at(client: &'a RpcClient, head: u64) -> Self {
        Self { client, head }
    }

    pub fn head(&self) -> u64 {
        self.head
    }

    pub async fn read(&self, kind: ObservableKind) -> Result<Observable> {
        let word = match kind {
            ObservableKind::BlockHash { number } => self.block_hash(number).await?,
            ObservableKind::BlockTimestamp { number } => {
                B256::from(U256::from(self.timestamp(number).await?).to_be_bytes::<32>())
            }
            ObservableKind::Counter { contract, selector } => {
                self.counter(contract, selector).await?
            }
            ObservableKind::StorageSlot { contract, slot } => {
                self.storage_slot(contract, slot).await?
            }
        };
        debug!(%kind, value = %word, "Read observable");
        Ok(Observable::word(kind, word))
    }

    /// Hash of a mined block, as a transaction in the next block would see it.
    pub async fn block_hash(&self, number: u64) -> Result<B256> {
        check_block_window(number, self.head + 1).map_err(|_| ReplicateError::StaleObservable {
            block: number,
            head: self.head,
        })?;
        let header = self
            .client
            .get_block(BlockRef::Number(number))
            .await
            .with_context(|| format!("fetch block {number}"))?;
        Ok(header.hash)
    }

    pub async fn timestamp(&self, number: u64) -> Result<u64> {
        if number > self.head {
            return Err(ReplicateError::StaleObservable {
                block: number,
                head: self.head,
            }
            .into());
        }
        let header = self.client.get_block(BlockRef::Number(number)).await?;
        Ok(header.timestamp)
    }

    /// Return word of a zero-argument view call.
    pub async fn counter(&self, contract: Address, selector: [u8; 4]) -> Result<B256> {
        let data = self
            .client
            .eth_call(None, contract, &selector, BlockRef::Number(self.head))
            .await
            .with_context(|| format!("call 0x{} on {contract:?}", hex::encode(selector)))?;
        if data.len() != 32 {
            bail!(
                "call 0x{} on {contract:?} returned {} bytes, expected 32",
                hex::encode(selector),
                data.len()
            );
        }
        Ok(B256::from_slice(&data))
    }

    pub async fn storage_slot(&self, contract: Address, slot: U256) -> Result<B256> {
        self.client
            .get_storage_at(contract, slot, BlockRef::Number(self.head))
            .await
            .with_context(|| format!("read slot {slot} of {contract:?}"))
    }

    /// Gather the vault's inputs for an `unlock` executing in `block` at
    /// `timestamp`. Both key blocks must already be mined.
    pub async fn vault(
        &self,
        vault: Address,
        block: u64,
        timestamp: u64,
    ) -> Result<VaultObservables> {
        let (key1_block, key2_block) = key_blocks(block, timestamp);
        check_block_window(key1_block, block)?;
        check_block_window(key2_block, block)?;
        if key1_block > self.head || key2_block > self.head {
            return Err(ReplicateError::StaleObservable {
                block: key1_block.max(key2_block),
                head: self.head,
            }
            .into());
        }

        let passphrase = self
            .storage_slot(vault, U256::from(VAULT_PASSPHRASE_SLOT))
            .await?;
        let nonce = U256::from_be_bytes(self.counter(vault, NONCE_SELECTOR).await?.0);
        let key1_block_hash = self.fetch_hash(key1_block).await?;
        let key2_block_hash = if key2_block == key1_block {
            key1_block_hash
        } else {
            self.fetch_hash(key2_block).await?
        };

        info!(
            %vault,
            block,
            timestamp,
            key1_block,
            key2_block,
            %nonce,
            "Read vault observables"
        );
        Ok(VaultObservables {
            passphrase,
            nonce,
            key1_block_hash,
            key2_block_hash,
        })
    }

    async fn fetch_hash(&self, number: u64) -> Result<B256> {
        let header = self
            .client
            .get_block(BlockRef::Number(number))
            .await
            .with_context(|| format!("fetch block {number}"))?;
        Ok(header.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_blocks_are_visible() {
        assert!(check_block_window(99, 100).is_ok());
        assert!(check_block_window(98, 100).is_ok());
    }

    #[test]
    fn test_window_edge() {
        assert!(check_block_window(44, 300).is_ok());
        assert_eq!(
            check_block_window(43, 300),
            Err(ReplicateError::StaleObservable {
                block: 43,
                head: 300
            })
        );
    }

    #[test]
    fn test_current_and_future_blocks_are_stale() {
        assert!(check_block_window(100, 100).is_err());
        assert!(check_block_window(101, 100).is_err());
    }

    fn stale(err: &anyhow::Error) -> Option<&ReplicateError> {
        err.downcast_ref::<ReplicateError>()
    }

    #[tokio::test]
    async fn test_future_timestamp_is_stale_without_rpc() {
        let client = RpcClient::new("http://127.0.0.1:1");
        let reader = ObservableReader::at(&client, 10);
        let err = reader.timestamp(11).await.unwrap_err();
        assert_eq!(
            stale(&err),
            Some(&ReplicateError::StaleObservable {
                block: 11,
                head: 10
            })
        );
    }

    #[tokio::test]
    async fn test_expired_block_hash_is_stale_without_rpc() {
        let client = RpcClient::new("http://127.0.0.1:1");
        let reader = ObservableReader::at(&client, 1_000);
        let err = reader.block_hash(10).await.unwrap_err();
        assert_eq!(
            stale(&err),
            Some(&ReplicateError::StaleObservable {
                block: 10,
                head: 1_000
            })
        );
        // 257 blocks behind the next block.
        let err = reader.block_hash(744).await.unwrap_err();
        assert_eq!(
            stale(&err),
            Some(&ReplicateError::StaleObservable {
                block: 744,
                head: 1_000
            })
        );
    }

    #[tokio::test]
    async fn test_unmined_block_hash_is_stale_without_rpc() {
        let client = RpcClient::new("http://127.0.0.1:1");
        let reader = ObservableReader::at(&client, 10);
        for number in [11, 12] {
            let err = reader.block_hash(number).await.unwrap_err();
            assert_eq!(
                stale(&err),
                Some(&ReplicateError::StaleObservable {
                    block: number,
                    head: 10
                })
            );
        }
    }

    #[tokio::test]
    async fn test_vault_key_block_not_yet_mined() {
        let client = RpcClient::new("http://127.0.0.1:1");
        let reader = ObservableReader::at(&client, 100);
        // Even timestamp: key blocks are 109 and 108, both past head.
        let err = reader.vault(Address::ZERO, 110, 1_000).await.unwrap_err();
        assert_eq!(
            stale(&err),
            Some(&ReplicateError::StaleObservable {
                block: 109,
                head: 100
            })
        );
    }

    #[tokio::test]
    async fn test_vault_key_block_not_visible_from_executing_block() {
        let client = RpcClient::new("http://127.0.0.1:1");
        let reader = ObservableReader::at(&client, 100);
        // Executing in block 0, the key blocks saturate to 0 itself, which
        // blockhash cannot see.
        let err = reader.vault(Address::ZERO, 0, 1_001).await.unwrap_err();
        assert_eq!(
            stale(&err),
            Some(&ReplicateError::StaleObservable { block: 0, head: 0 })
        );
    }
}
