// SPDX-License-Identifier: MIT
//! Local private-key wallet.
//!
//! Transactions are legacy (EIP-155) and signed in process, then pushed
//! through `eth_sendRawTransaction`. Challenge nodes are plain dev chains,
//! so there is no fee market to track.

use std::str::FromStr;
use std::time::Duration;

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_eips::eip2718::Encodable2718;
use alloy_primitives::{Address, Bytes, TxKind, B256, U256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use anyhow::{anyhow, bail, Context, Result};
use tracing::{debug, info};

use crate::rpc::{BlockRef, RpcClient, TxReceipt};

/// How long to wait for a submitted transaction to be mined.
pub const RECEIPT_TIMEOUT: Duration = Duration::from_secs(120);

pub struct Wallet {
    signer: PrivateKeySigner,
    client: RpcClient,
    chain_id: u64,
}

/// Parse a hex private key, with or without `0x`.
pub fn parse_private_key(raw: &str) -> Result<PrivateKeySigner> {
    let trimmed = raw.trim();
    let clean = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if clean.len() != 64 {
        bail!("private key must be 32 bytes of hex, got {} chars", clean.len());
    }
    PrivateKeySigner::from_str(clean).map_err(|e| anyhow!("invalid private key: {e}"))
}

impl Wallet {
    pub fn new(signer: PrivateKeySigner, client: RpcClient, chain_id: u64) -> Self {
        Self {
            signer,
            client,
            chain_id,
        }
    }

    /// Build a wallet for `private_key`, reading the chain id from the node.
    pub async fn connect(client: RpcClient, private_key: &str) -> Result<Self> {
        let signer = parse_private_key(private_key)?;
        let chain_id = client.get_chain_id().await.context("fetch chain id")?;
        info!(address = %signer.address(), chain_id, "Wallet ready");
        Ok(Self::new(signer, client, chain_id))
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn client(&self) -> &RpcClient {
        &self.client
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Sign `tx` and return its EIP-2718 encoding.
    pub fn sign(&self, mut tx: TxLegacy) -> Result<Bytes> {
        tx.chain_id = Some(self.chain_id);
        let hash = tx.signature_hash();
        let signature = self
            .signer
            .sign_hash_sync(&hash)
            .map_err(|e| anyhow!("signing failed: {e}"))?;
        let envelope = TxEnvelope::from(tx.into_signed(signature));
        Ok(Bytes::from(envelope.encoded_2718()))
    }

    /// Call `to` with `input` and wait for the receipt. The receipt status is
    /// left to the caller.
    pub async fn send_call(&self, to: Address, input: Bytes, gas_limit: u64) -> Result<TxReceipt> {
        self.submit(TxKind::Call(to), input, gas_limit).await
    }

    /// Deploy `init_code` and return the new contract's address.
    pub async fn deploy(&self, init_code: Bytes, gas_limit: u64) -> Result<(Address, TxReceipt)> {
        let receipt = self.submit(TxKind::Create, init_code, gas_limit).await?;
        receipt.ensure_success("deployment")?;
        let address = receipt
            .contract_address
            .context("deployment receipt has no contract address")?;
        info!(%address, block = receipt.block_number, "Contract deployed");
        Ok((address, receipt))
    }

    async fn submit(&self, to: TxKind, input: Bytes, gas_limit: u64) -> Result<TxReceipt> {
        let nonce = self
            .client
            .get_transaction_count(self.address(), BlockRef::Pending)
            .await
            .context("fetch nonce")?;
        let gas_price = self.client.gas_price().await.context("fetch gas price")?;

        let tx = TxLegacy {
            chain_id: Some(self.chain_id),
            nonce,
            gas_price,
            gas_limit,
            to,
            value: U256::ZERO,
            input,
        };
        let raw = self.sign(tx)?;
        let hash: B256 = self.client.send_raw_transaction(&raw).await?;
        debug!(tx = %hash, nonce, gas_price, "Submitted transaction");

        let receipt = self.client.wait_for_receipt(hash, RECEIPT_TIMEOUT).await?;
        info!(
            tx = %hash,
            block = receipt.block_number,
            gas_used = receipt.gas_used,
            success = receipt.success,
            "Transaction mined"
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_eips::eip2718::Decodable2718;
    use hex_literal::hex;

    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn wallet() -> Wallet {
        let signer = parse_private_key(DEV_KEY).unwrap();
        Wallet::new(signer, RpcClient::new("http://127.0.0.1:8545"), 31337)
    }

    #[test]
    fn test_dev_key_address() {
        assert_eq!(
            wallet().address(),
            Address::from(hex!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266"))
        );
    }

    #[test]
    fn test_private_key_without_prefix() {
        let signer = parse_private_key(&DEV_KEY[2..]).unwrap();
        assert_eq!(signer.address(), wallet().address());
    }

    #[test]
    fn test_rejects_short_key() {
        assert!(parse_private_key("0x1234").is_err());
    }

    #[test]
    fn test_signed_transaction_recovers_signer() {
        let wallet = wallet();
        let tx = TxLegacy {
            chain_id: None,
            nonce: 7,
            gas_price: 1_000_000_000,
            gas_limit: 300_000,
            to: TxKind::Call(Address::repeat_byte(0x11)),
            value: U256::ZERO,
            input: Bytes::from(hex!("affed0e0").to_vec()),
        };
        let raw = wallet.sign(tx).unwrap();

        let envelope = TxEnvelope::decode_2718(&mut raw.as_ref()).unwrap();
        let signed = match envelope {
            TxEnvelope::Legacy(signed) => signed,
            other => panic!("expected legacy transaction, got {other:?}"),
        };
        assert_eq!(signed.tx().chain_id, Some(31337));
        assert_eq!(signed.tx().nonce, 7);
        let recovered = signed
            .signature()
            .recover_address_from_prehash(&signed.signature_hash())
            .unwrap();
        assert_eq!(recovered, wallet.address());
    }
}
