//! Minimal Ethereum JSON-RPC client.
//!
//! Only what the replica needs: `eth_blockNumber` for readiness checks and
//! `eth_call` for ERC-20 `balanceOf` / `allowance` lookups. Amounts are
//! returned as [`BigUint`] and never pass through floating point.

use crate::error::{Error, Result};
use num_bigint::BigUint;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// ERC-20 `balanceOf(address)` selector.
pub const BALANCE_OF_SELECTOR: &str = "70a08231";

/// ERC-20 `allowance(address,address)` selector.
pub const ALLOWANCE_SELECTOR: &str = "dd62ed3e";

/// JSON-RPC client over HTTP.
#[derive(Clone)]
pub struct EthRpcClient {
    http: reqwest::Client,
    url: String,
    next_id: Arc<AtomicU64>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

impl EthRpcClient {
    /// Create a client for the given endpoint.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!("RPC {} (id={})", method, id);

        let response: RpcResponse<T> = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(Error::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        response
            .result
            .ok_or_else(|| Error::InvalidResponse(format!("{} returned no result", method)))
    }

    /// Latest block number.
    pub async fn block_number(&self) -> Result<u64> {
        let hex: String = self.request("eth_blockNumber", json!([])).await?;
        let number = parse_uint_hex(&hex)?;
        u64::try_from(number).map_err(|_| Error::InvalidResponse(format!("block number {}", hex)))
    }

    /// `eth_call` against the latest block, returning the raw hex result.
    pub async fn call(&self, to: &str, data: &str) -> Result<String> {
        self.request("eth_call", json!([{ "to": to, "data": data }, "latest"]))
            .await
    }

    /// ERC-20 balance of `owner` in `token`, in base units.
    pub async fn erc20_balance_of(&self, token: &str, owner: &str) -> Result<BigUint> {
        let data = encode_call(BALANCE_OF_SELECTOR, &[owner])?;
        let hex = self.call(validate_address(token)?, &data).await?;
        parse_uint_hex(&hex)
    }

    /// ERC-20 allowance granted by `owner` to `spender` in `token`.
    pub async fn erc20_allowance(&self, token: &str, owner: &str, spender: &str) -> Result<BigUint> {
        let data = encode_call(ALLOWANCE_SELECTOR, &[owner, spender])?;
        let hex = self.call(validate_address(token)?, &data).await?;
        parse_uint_hex(&hex)
    }
}

/// Decode a `0x`-prefixed 20-byte hex address.
pub fn parse_address(address: &str) -> Result<[u8; 20]> {
    let invalid = || Error::InvalidAddress(address.to_string());

    let digits = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .ok_or_else(invalid)?;

    let mut bytes = [0u8; 20];
    hex::decode_to_slice(digits, &mut bytes).map_err(|_| invalid())?;
    Ok(bytes)
}

/// Check that `address` is a `0x`-prefixed 20-byte hex string.
pub fn validate_address(address: &str) -> Result<&str> {
    parse_address(address)?;
    Ok(address)
}

/// ABI-encode a call whose arguments are all addresses.
pub fn encode_call(selector: &str, addresses: &[&str]) -> Result<String> {
    let mut data = format!("0x{}", selector);
    for address in addresses {
        // Left-pad each address to a 32-byte word.
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&parse_address(address)?);
        data.push_str(&hex::encode(word));
    }
    Ok(data)
}

/// Parse a `0x`-prefixed hex quantity or ABI word into an unsigned integer.
pub fn parse_uint_hex(value: &str) -> Result<BigUint> {
    let hex = value
        .strip_prefix("0x")
        .ok_or_else(|| Error::InvalidResponse(format!("not a hex quantity: {}", value)))?;

    if hex.is_empty() {
        return Err(Error::InvalidResponse(format!("empty hex quantity: {}", value)));
    }

    BigUint::parse_bytes(hex.as_bytes(), 16)
        .ok_or_else(|| Error::InvalidResponse(format!("not a hex quantity: {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAKER: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";
    const SPENDER: &str = "0xDef1C0ded9bec7F1a1670819833240f027b25EfF";

    #[test]
    fn test_validate_address() {
        assert!(validate_address(MAKER).is_ok());
        assert!(validate_address("0x1234").is_err());
        assert!(validate_address("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48").is_err());
        assert!(validate_address("0xZZb86991c6218b36c1d19D4a2e9Eb0cE3606eB48").is_err());
        // Odd length and one nibble too long.
        assert!(validate_address("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB4").is_err());
        assert!(validate_address("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB480").is_err());
    }

    #[test]
    fn test_parse_address() {
        let bytes = parse_address(SPENDER).unwrap();
        assert_eq!(bytes[0], 0xde);
        assert_eq!(bytes[19], 0xff);
        assert_eq!(format!("0x{}", hex::encode(bytes)), SPENDER.to_ascii_lowercase());
    }

    #[test]
    fn test_encode_balance_of() {
        let data = encode_call(BALANCE_OF_SELECTOR, &[MAKER]).unwrap();
        assert_eq!(
            data,
            "0x70a08231000000000000000000000000a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"
        );
        assert_eq!(data.len(), 2 + 8 + 64);
    }

    #[test]
    fn test_encode_allowance() {
        let data = encode_call(ALLOWANCE_SELECTOR, &[MAKER, SPENDER]).unwrap();
        assert_eq!(data.len(), 2 + 8 + 64 * 2);
        assert!(data.starts_with("0xdd62ed3e"));
        assert!(data.ends_with("def1c0ded9bec7f1a1670819833240f027b25eff"));
    }

    #[test]
    fn test_parse_uint_hex() {
        assert_eq!(parse_uint_hex("0x0").unwrap(), BigUint::from(0u32));
        assert_eq!(parse_uint_hex("0x1b4").unwrap(), BigUint::from(436u32));

        // Max uint256 allowance survives exactly.
        let max = format!("0x{}", "f".repeat(64));
        let parsed = parse_uint_hex(&max).unwrap();
        assert_eq!(
            parsed.to_string(),
            "115792089237316195423570985008687907853269984665640564039457584007913129639935"
        );

        assert!(parse_uint_hex("0x").is_err());
        assert!(parse_uint_hex("12").is_err());
        assert!(parse_uint_hex("0xzz").is_err());
    }
}
