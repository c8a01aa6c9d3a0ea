//! Concrete on-chain source and readiness probes.

use crate::error::{Error, Result};
use crate::order::{OnChainData, Order};
use crate::traits::{OnChainSource, ReadinessProbe};
use async_trait::async_trait;
use external_services::rpc::validate_address;
use external_services::{EthRpcClient, SharedRedisClient};
use serde_json::{json, Value};
use tracing::debug;

/// Addresses extracted from an order's off-chain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MakerTokenRequest {
    pub maker: String,
    pub maker_token: String,
    pub spender: String,
}

/// Looks up the maker's ERC-20 balance and the allowance granted to the
/// family's exchange contract.
///
/// Expects `offChainData` to carry `maker` and `makerToken` addresses.
pub struct Erc20Source {
    family: String,
    rpc: EthRpcClient,
    spender: String,
}

impl Erc20Source {
    pub fn new(family: impl Into<String>, rpc: EthRpcClient, spender: impl Into<String>) -> Result<Self> {
        let spender = spender.into();
        validate_address(&spender)?;
        Ok(Self {
            family: family.into(),
            rpc,
            spender,
        })
    }

    /// Extract the lookup request from an order.
    pub fn convert(&self, order: &Order) -> Result<MakerTokenRequest> {
        let data = order
            .off_chain_data
            .as_object()
            .ok_or_else(|| Error::Conversion(format!("{}: offChainData is not an object", order.order_hash)))?;

        Ok(MakerTokenRequest {
            maker: address_field(data, "maker", &order.order_hash)?,
            maker_token: address_field(data, "makerToken", &order.order_hash)?,
            spender: self.spender.clone(),
        })
    }
}

fn address_field(data: &serde_json::Map<String, Value>, field: &str, order_hash: &str) -> Result<String> {
    let value = data
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Conversion(format!("{}: missing '{}'", order_hash, field)))?;

    validate_address(value)
        .map(str::to_string)
        .map_err(|_| Error::Conversion(format!("{}: invalid '{}' address {}", order_hash, field, value)))
}

#[async_trait]
impl OnChainSource for Erc20Source {
    fn family(&self) -> &str {
        &self.family
    }

    async fn fetch_on_chain_data(&self, order: &Order) -> Result<OnChainData> {
        let request = self.convert(order)?;
        debug!(
            "Fetching balance/allowance for {} (maker {}, token {})",
            order.order_hash, request.maker, request.maker_token
        );

        let (maker_balance, maker_allowance) = tokio::try_join!(
            self.rpc.erc20_balance_of(&request.maker_token, &request.maker),
            self.rpc
                .erc20_allowance(&request.maker_token, &request.maker, &request.spender),
        )?;

        Ok(OnChainData {
            order_info: json!({
                "maker": request.maker,
                "makerToken": request.maker_token,
                "spender": request.spender,
            }),
            maker_balance,
            maker_allowance,
        })
    }
}

/// Ready once `eth_blockNumber` answers.
pub struct RpcReadinessProbe {
    rpc: EthRpcClient,
}

impl RpcReadinessProbe {
    pub fn new(rpc: EthRpcClient) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl ReadinessProbe for RpcReadinessProbe {
    fn name(&self) -> &str {
        self.rpc.url()
    }

    async fn probe(&self) -> Result<()> {
        let block = self.rpc.block_number().await?;
        debug!("RPC {} at block {}", self.rpc.url(), block);
        Ok(())
    }
}

/// Ready once Redis answers `PING`.
pub struct RedisReadinessProbe {
    client: SharedRedisClient,
}

impl RedisReadinessProbe {
    pub fn new(client: SharedRedisClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReadinessProbe for RedisReadinessProbe {
    fn name(&self) -> &str {
        "redis"
    }

    async fn probe(&self) -> Result<()> {
        Ok(self.client.ping().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPENDER: &str = "0xDef1C0ded9bec7F1a1670819833240f027b25EfF";
    const MAKER: &str = "0x6B175474E89094C44Da98b954EedeAC495271d0F";
    const TOKEN: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";

    fn source() -> Erc20Source {
        Erc20Source::new("zrx", EthRpcClient::new("http://localhost:8545"), SPENDER).unwrap()
    }

    fn order(off_chain_data: Value) -> Order {
        Order {
            order_hash: "0xabc".to_string(),
            order_book_name: "zrx".to_string(),
            off_chain_data,
            on_chain_data: None,
        }
    }

    #[test]
    fn test_new_rejects_bad_spender() {
        let result = Erc20Source::new("zrx", EthRpcClient::new("http://localhost:8545"), "0x12");
        assert!(result.is_err());
    }

    #[test]
    fn test_convert() {
        let request = source()
            .convert(&order(json!({"maker": MAKER, "makerToken": TOKEN, "price": "1"})))
            .unwrap();

        assert_eq!(
            request,
            MakerTokenRequest {
                maker: MAKER.to_string(),
                maker_token: TOKEN.to_string(),
                spender: SPENDER.to_string(),
            }
        );
    }

    #[test]
    fn test_convert_missing_field() {
        let err = source().convert(&order(json!({"maker": MAKER}))).unwrap_err();
        assert!(matches!(err, Error::Conversion(ref msg) if msg.contains("makerToken")));
    }

    #[test]
    fn test_convert_invalid_address() {
        let err = source()
            .convert(&order(json!({"maker": "0xnothex", "makerToken": TOKEN})))
            .unwrap_err();
        assert!(matches!(err, Error::Conversion(_)));
    }

    #[test]
    fn test_convert_non_object() {
        assert!(source().convert(&order(json!("raw"))).is_err());
    }

    #[test]
    fn test_family() {
        assert_eq!(source().family(), "zrx");
    }
}
