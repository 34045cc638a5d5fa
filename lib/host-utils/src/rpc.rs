// SPDX-License-Identifier: MIT
//! Minimal JSON-RPC client for Ethereum node communication.
//!
//! Raw HTTP requests keep the surface small: challenge nodes only need a
//! dozen methods and we sign transactions locally.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A minimal Ethereum JSON-RPC client.
#[derive(Clone)]
pub struct RpcClient {
    url: String,
    client: reqwest::Client,
    id: std::sync::Arc<AtomicU64>,
}

/// Block selector for state reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRef {
    Latest,
    Pending,
    Number(u64),
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockRef::Latest => f.write_str("latest"),
            BlockRef::Pending => f.write_str("pending"),
            BlockRef::Number(n) => write!(f, "0x{n:x}"),
        }
    }
}

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'a str,
    method: &'a str,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize, Debug)]
struct JsonRpcError {
    code: i64,
    message: String,
}

impl RpcClient {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            client: reqwest::Client::new(),
            id: std::sync::Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Maximum number of retries for transient failures.
    const MAX_RETRIES: u32 = 3;
    /// Initial backoff delay in milliseconds.
    const INITIAL_BACKOFF_MS: u64 = 500;
    /// Maximum backoff delay in milliseconds.
    const MAX_BACKOFF_MS: u64 = 5_000;
    /// Interval between receipt polls.
    const RECEIPT_POLL_MS: u64 = 500;

    /// Send a read-only request, retrying transient failures.
    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        self.call_with_retries(method, params, Self::MAX_RETRIES)
            .await?
            .with_context(|| format!("RPC response for {} has no result", method))
    }

    /// Like `call`, but a `null` result is returned as `None`.
    async fn call_nullable(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<serde_json::Value>> {
        self.call_with_retries(method, params, Self::MAX_RETRIES).await
    }

    async fn call_with_retries(
        &self,
        method: &str,
        params: serde_json::Value,
        max_retries: u32,
    ) -> Result<Option<serde_json::Value>> {
        let id = self.id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id,
        };

        debug!(method, %id, "RPC request");

        let mut last_err = None;
        for attempt in 0..=max_retries {
            if attempt > 0 {
                let backoff = std::cmp::min(
                    Self::INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1),
                    Self::MAX_BACKOFF_MS,
                );
                debug!(
                    method,
                    attempt,
                    backoff_ms = backoff,
                    "Retrying RPC request"
                );
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            let resp = self.client.post(&self.url).json(&request).send().await;

            let response = match resp {
                Ok(r) => r,
                Err(e) if e.is_timeout() || e.is_connect() => {
                    last_err = Some(anyhow::anyhow!(e).context(format!(
                        "RPC request to {} failed (attempt {})",
                        method,
                        attempt + 1
                    )));
                    continue;
                }
                Err(e) => {
                    return Err(
                        anyhow::anyhow!(e).context(format!("RPC request to {} failed", method))
                    );
                }
            };

            // Retry on 429 (rate limited) and 5xx server errors
            if response.status() == 429 || response.status().is_server_error() {
                last_err = Some(anyhow::anyhow!(
                    "RPC {} returned status {} (attempt {})",
                    method,
                    response.status(),
                    attempt + 1
                ));
                continue;
            }

            let body: JsonRpcResponse = response
                .json()
                .await
                .with_context(|| format!("Failed to parse RPC response for {}", method))?;

            if let Some(err) = body.error {
                if err.code == -32005 || err.code == 429 {
                    last_err = Some(anyhow::anyhow!(
                        "RPC rate limit for {} (code {}, attempt {})",
                        method,
                        err.code,
                        attempt + 1
                    ));
                    continue;
                }
                anyhow::bail!(
                    "RPC error for {}: {} (code {})",
                    method,
                    err.message,
                    err.code
                );
            }

            return Ok(body.result.filter(|v| !v.is_null()));
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("RPC {} failed after retries", method)))
    }

    /// Get the chain ID.
    pub async fn get_chain_id(&self) -> Result<u64> {
        let result = self.call("eth_chainId", serde_json::json!([])).await?;
        let hex_str = result
            .as_str()
            .context("eth_chainId result is not a string")?;
        parse_hex_u64(hex_str).context("parse chain_id")
    }

    /// Get the number of the most recent block.
    pub async fn block_number(&self) -> Result<u64> {
        let result = self.call("eth_blockNumber", serde_json::json!([])).await?;
        let hex_str = result
            .as_str()
            .context("eth_blockNumber result is not a string")?;
        parse_hex_u64(hex_str).context("parse block number")
    }

    /// Get balance of an address.
    pub async fn get_balance(&self, address: Address, block: BlockRef) -> Result<U256> {
        let result = self
            .call(
                "eth_getBalance",
                serde_json::json!([format!("{address:?}"), block.to_string()]),
            )
            .await?;
        let hex_str = result
            .as_str()
            .context("eth_getBalance result is not a string")?;
        parse_hex_u256(hex_str).context("parse balance")
    }

    /// Get transaction count (nonce) of an address.
    pub async fn get_transaction_count(&self, address: Address, block: BlockRef) -> Result<u64> {
        let result = self
            .call(
                "eth_getTransactionCount",
                serde_json::json!([format!("{address:?}"), block.to_string()]),
            )
            .await?;
        let hex_str = result
            .as_str()
            .context("eth_getTransactionCount result is not a string")?;
        parse_hex_u64(hex_str).context("parse nonce")
    }

    /// Get code at an address.
    pub async fn get_code(&self, address: Address, block: BlockRef) -> Result<Vec<u8>> {
        let result = self
            .call(
                "eth_getCode",
                serde_json::json!([format!("{address:?}"), block.to_string()]),
            )
            .await?;
        let hex_str = result
            .as_str()
            .context("eth_getCode result is not a string")?;
        parse_hex_bytes(hex_str).context("parse code")
    }

    /// Get the raw 32-byte word stored at `slot`.
    pub async fn get_storage_at(
        &self,
        address: Address,
        slot: U256,
        block: BlockRef,
    ) -> Result<B256> {
        let slot_hex = format!("0x{slot:064x}");
        let result = self
            .call(
                "eth_getStorageAt",
                serde_json::json!([format!("{address:?}"), slot_hex, block.to_string()]),
            )
            .await?;
        let hex_str = result
            .as_str()
            .context("eth_getStorageAt result is not a string")?;
        parse_hex_word(hex_str).context("parse storage value")
    }

    /// Execute a read-only call and return the raw return data.
    pub async fn eth_call(
        &self,
        from: Option<Address>,
        to: Address,
        data: &[u8],
        block: BlockRef,
    ) -> Result<Bytes> {
        let mut call = serde_json::json!({
            "to": format!("{to:?}"),
            "data": format!("0x{}", hex::encode(data)),
        });
        if let Some(from) = from {
            call["from"] = serde_json::Value::String(format!("{from:?}"));
        }
        let result = self
            .call("eth_call", serde_json::json!([call, block.to_string()]))
            .await?;
        let hex_str = result.as_str().context("eth_call result is not a string")?;
        parse_hex_bytes(hex_str)
            .map(Bytes::from)
            .context("parse eth_call result")
    }

    /// Current legacy gas price in wei.
    pub async fn gas_price(&self) -> Result<u128> {
        let result = self.call("eth_gasPrice", serde_json::json!([])).await?;
        let hex_str = result
            .as_str()
            .context("eth_gasPrice result is not a string")?;
        let price = parse_hex_u256(hex_str).context("parse gas price")?;
        u128::try_from(price)
            .ok()
            .context("gas price does not fit in u128")
    }

    /// Get a block header (no transactions).
    pub async fn get_block(&self, block: BlockRef) -> Result<BlockHeader> {
        let result = self
            .call(
                "eth_getBlockByNumber",
                serde_json::json!([block.to_string(), false]),
            )
            .await?;
        parse_block_header(&result).with_context(|| format!("parse block {block}"))
    }

    /// Submit a signed transaction. Never retried: a resend after a lost
    /// response would be rejected as a duplicate or stale nonce.
    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256> {
        let result = self
            .call_with_retries(
                "eth_sendRawTransaction",
                serde_json::json!([format!("0x{}", hex::encode(raw))]),
                0,
            )
            .await?
            .context("eth_sendRawTransaction returned no hash")?;
        let hex_str = result
            .as_str()
            .context("eth_sendRawTransaction result is not a string")?;
        parse_b256(hex_str).context("parse transaction hash")
    }

    /// Fetch a receipt; `None` while the transaction is pending.
    pub async fn get_transaction_receipt(&self, tx_hash: B256) -> Result<Option<TxReceipt>> {
        let result = self
            .call_nullable(
                "eth_getTransactionReceipt",
                serde_json::json!([format!("{tx_hash:?}")]),
            )
            .await?;
        result
            .map(|v| parse_receipt(&v))
            .transpose()
            .with_context(|| format!("parse receipt for {tx_hash:?}"))
    }

    /// Poll for a receipt until it appears or `timeout` elapses.
    pub async fn wait_for_receipt(&self, tx_hash: B256, timeout: Duration) -> Result<TxReceipt> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(receipt) = self.get_transaction_receipt(tx_hash).await? {
                return Ok(receipt);
            }
            if tokio::time::Instant::now() >= deadline {
                anyhow::bail!(
                    "transaction {tx_hash:?} not mined after {}s",
                    timeout.as_secs()
                );
            }
            tokio::time::sleep(Duration::from_millis(Self::RECEIPT_POLL_MS)).await;
        }
    }
}

/// Block header fields the workflows need.
#[derive(Debug, Clone)]
pub struct BlockHeader {
    pub hash: B256,
    pub number: u64,
    pub timestamp: u64,
}

/// Outcome of a mined transaction.
#[derive(Debug, Clone)]
pub struct TxReceipt {
    pub transaction_hash: B256,
    pub block_number: u64,
    pub success: bool,
    pub gas_used: u64,
    pub contract_address: Option<Address>,
}

impl TxReceipt {
    /// Fail with `what` if the transaction reverted.
    pub fn ensure_success(&self, what: &str) -> Result<&Self> {
        if !self.success {
            anyhow::bail!(
                "{what} reverted (tx {:?}, block {})",
                self.transaction_hash,
                self.block_number
            );
        }
        Ok(self)
    }
}

fn str_field<'a>(
    obj: &'a serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Result<&'a str> {
    obj.get(key)
        .and_then(|v| v.as_str())
        .with_context(|| format!("no {key}"))
}

fn parse_block_header(value: &serde_json::Value) -> Result<BlockHeader> {
    let obj = value.as_object().context("block is not an object")?;

    Ok(BlockHeader {
        hash: parse_b256(str_field(obj, "hash")?)?,
        number: parse_hex_u64(str_field(obj, "number")?)?,
        timestamp: parse_hex_u64(str_field(obj, "timestamp")?)?,
    })
}
fn parse_receipt(value: &serde_json::Value) -> Result<TxReceipt> {
    let obj = value.as_object().context("receipt is not an object")?;

    Ok(TxReceipt {
        transaction_hash: parse_b256(str_field(obj, "transactionHash")?)?,
        block_number: parse_hex_u64(str_field(obj, "blockNumber")?)?,
        success: parse_hex_u64(str_field(obj, "status")?)? == 1,
        gas_used: parse_hex_u64(str_field(obj, "gasUsed")?)?,
        contract_address: obj
            .get("contractAddress")
            .and_then(|v| v.as_str())
            .map(parse_address)
            .transpose()?,
    })
}

// --- Hex parsing utilities ---

fn parse_hex_u64(s: &str) -> Result<u64> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16).with_context(|| format!("invalid hex u64: {s}"))
}

fn parse_hex_u256(s: &str) -> Result<U256> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.len() > 64 {
        anyhow::bail!("hex U256 has {} digits, max 64", s.len());
    }
    let padded = format!("{:0>64}", s);
    let bytes = hex::decode(&padded).with_context(|| format!("invalid hex U256: {s}"))?;
    Ok(U256::from_be_slice(&bytes))
}

/// Storage words come back left-trimmed from some nodes; pad to 32 bytes.
fn parse_hex_word(s: &str) -> Result<B256> {
    let value = parse_hex_u256(s)?;
    Ok(B256::from(value.to_be_bytes::<32>()))
}

fn parse_hex_bytes(s: &str) -> Result<Vec<u8>> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.is_empty() {
        return Ok(Vec::new());
    }
    hex::decode(s).context("invalid hex bytes")
}

fn parse_b256(s: &str) -> Result<B256> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).with_context(|| format!("invalid hex B256: {s}"))?;
    if bytes.len() != 32 {
        anyhow::bail!("B256 must be 32 bytes, got {}", bytes.len());
    }
    Ok(B256::from_slice(&bytes))
}

fn parse_address(s: &str) -> Result<Address> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).with_context(|| format!("invalid hex address: {s}"))?;
    if bytes.len() != 20 {
        anyhow::bail!("Address must be 20 bytes, got {}", bytes.len());
    }
    Ok(Address::from_slice(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_ref_display() {
        assert_eq!(BlockRef::Latest.to_string(), "latest");
        assert_eq!(BlockRef::Pending.to_string(), "pending");
        assert_eq!(BlockRef::Number(255).to_string(), "0xff");
    }

    #[test]
    fn test_parse_hex_word_pads_short_values() {
        let word = parse_hex_word("0x2a").unwrap();
        assert_eq!(word[31], 0x2a);
        assert!(word[..31].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_parse_empty_code() {
        assert!(parse_hex_bytes("0x").unwrap().is_empty());
    }

    #[test]
    fn test_parse_b256_rejects_short() {
        assert!(parse_b256("0x1234").is_err());
    }

    #[test]
    fn test_parse_receipt_deployment() {
        let value = serde_json::json!({
            "transactionHash": format!("0x{}", "11".repeat(32)),
            "blockNumber": "0x2",
            "status": "0x1",
            "gasUsed": "0x5208",
            "contractAddress": "0x5fbdb2315678afecb367f032d93f642f64180aa3",
        });
        let receipt = parse_receipt(&value).unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.block_number, 2);
        assert_eq!(receipt.gas_used, 21_000);
        assert!(receipt.contract_address.is_some());
    }

    #[test]
    fn test_parse_receipt_reverted_call() {
        let value = serde_json::json!({
            "transactionHash": format!("0x{}", "22".repeat(32)),
            "blockNumber": "0x10",
            "status": "0x0",
            "gasUsed": "0x7530",
            "contractAddress": null,
        });
        let receipt = parse_receipt(&value).unwrap();
        assert!(!receipt.success);
        assert!(receipt.contract_address.is_none());
    }

    #[test]
    fn test_parse_block_header() {
        let value = serde_json::json!({
            "hash": format!("0x{}", "ab".repeat(32)),
            "number": "0x64",
            "timestamp": "0x65f0a3c1",
            "gasLimit": "0x1c9c380",
        });
        let header = parse_block_header(&value).unwrap();
        assert_eq!(header.number, 100);
        assert_eq!(header.timestamp, 0x65f0a3c1);
        assert_eq!(header.hash, B256::repeat_byte(0xab));
    }

    #[test]
    fn test_parse_hex_u256_rejects_oversized() {
        let too_long = format!("0x{}", "11".repeat(33));
        let err = parse_hex_u256(&too_long).unwrap_err();
        assert!(err.to_string().contains("max 64"));
        assert!(parse_hex_word(&too_long).is_err());

        let full = format!("0x{}", "ff".repeat(32));
        assert_eq!(parse_hex_u256(&full).unwrap(), U256::MAX);
    }
}
