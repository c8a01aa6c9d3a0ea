//! Configuration from environment variables.

use crate::error::{Error, Result};
use crate::service::{ReadFailurePolicy, ReplicaServiceConfig};
use std::str::FromStr;
use std::time::Duration;

/// Default spender for the `zrx` order book (0x Exchange Proxy).
pub const DEFAULT_ORDER_BOOK_SPENDERS: &str = "zrx=0xDef1C0ded9bec7F1a1670819833240f027b25EfF";

/// Process configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaConfig {
    pub redis_url: String,
    pub update_stream: String,
    pub snapshot_stream: String,
    pub rpc_url: String,
    pub http_port: u16,
    pub metrics_port: u16,
    /// Zero disables periodic snapshots.
    pub snapshot_interval: Duration,
    pub read_batch_size: usize,
    pub read_block_ms: usize,
    pub batch_pause: Duration,
    pub read_failure_policy: ReadFailurePolicy,
    pub snapshot_retry: Duration,
    pub require_snapshot: bool,
    pub readiness_interval: Duration,
    pub enrich_on_start: bool,
    /// (order book name, spender address) pairs.
    pub order_book_spenders: Vec<(String, String)>,
}

impl ReplicaConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, applying defaults for unset
    /// variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let read_failure_policy = parse_policy(
            &get("READ_FAILURE_POLICY", "fatal"),
            parse_var(&lookup, "READ_RETRY_MAX_ATTEMPTS", 10)?,
            Duration::from_millis(parse_var(&lookup, "READ_RETRY_BASE_DELAY_MS", 500)?),
        )?;

        Ok(Self {
            redis_url: get("REDIS_URL", "redis://localhost:6379"),
            update_stream: get("UPDATE_STREAM", "updateStream"),
            snapshot_stream: get("SNAPSHOT_STREAM", "snapshotStream"),
            rpc_url: get("RPC_URL", "http://localhost:8545"),
            http_port: parse_var(&lookup, "HTTP_PORT", 8084)?,
            metrics_port: parse_var(&lookup, "METRICS_PORT", 9094)?,
            snapshot_interval: Duration::from_secs(parse_var(&lookup, "SNAPSHOT_INTERVAL_SECS", 60)?),
            read_batch_size: parse_var(&lookup, "READ_BATCH_SIZE", 100)?,
            read_block_ms: parse_var(&lookup, "READ_BLOCK_MS", 5000)?,
            batch_pause: Duration::from_millis(parse_var(&lookup, "BATCH_PAUSE_MS", 50)?),
            read_failure_policy,
            snapshot_retry: Duration::from_secs(parse_var(&lookup, "SNAPSHOT_RETRY_SECS", 5)?),
            require_snapshot: parse_bool(&get("REQUIRE_SNAPSHOT", "false")),
            readiness_interval: Duration::from_secs(parse_var(&lookup, "READINESS_INTERVAL_SECS", 5)?),
            enrich_on_start: parse_bool(&get("ENRICH_ON_START", "true")),
            order_book_spenders: parse_spenders(&get("ORDER_BOOK_SPENDERS", DEFAULT_ORDER_BOOK_SPENDERS))?,
        })
    }

    /// Consumer settings.
    pub fn service_config(&self) -> ReplicaServiceConfig {
        ReplicaServiceConfig {
            batch_size: self.read_batch_size,
            batch_pause: self.batch_pause,
            read_failure_policy: self.read_failure_policy,
        }
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("{}='{}': {}", key, raw, e))),
        None => Ok(default),
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

/// Parse `fatal` or `retry`.
pub fn parse_policy(value: &str, max_attempts: u32, base_delay: Duration) -> Result<ReadFailurePolicy> {
    match value.trim().to_ascii_lowercase().as_str() {
        "fatal" => Ok(ReadFailurePolicy::Fatal),
        "retry" if max_attempts > 0 => Ok(ReadFailurePolicy::Retry {
            max_attempts,
            base_delay,
        }),
        "retry" => Err(Error::Config("READ_RETRY_MAX_ATTEMPTS must be positive".to_string())),
        other => Err(Error::Config(format!("unknown READ_FAILURE_POLICY '{}'", other))),
    }
}

/// Parse `name=0xaddr,name=0xaddr`.
pub fn parse_spenders(value: &str) -> Result<Vec<(String, String)>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, spender) = pair
                .split_once('=')
                .ok_or_else(|| Error::Config(format!("expected name=address, got '{}'", pair)))?;
            let (name, spender) = (name.trim(), spender.trim());
            if name.is_empty() || spender.is_empty() {
                return Err(Error::Config(format!("expected name=address, got '{}'", pair)));
            }
            Ok((name.to_string(), spender.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ReplicaConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ReplicaConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();

        assert_eq!(config.update_stream, "updateStream");
        assert_eq!(config.snapshot_stream, "snapshotStream");
        assert_eq!(config.http_port, 8084);
        assert_eq!(config.snapshot_interval, Duration::from_secs(60));
        assert_eq!(config.batch_pause, Duration::from_millis(50));
        assert_eq!(config.read_failure_policy, ReadFailurePolicy::Fatal);
        assert_eq!(config.snapshot_retry, Duration::from_secs(5));
        assert!(!config.require_snapshot);
        assert!(config.enrich_on_start);
        assert_eq!(
            config.order_book_spenders,
            vec![(
                "zrx".to_string(),
                "0xDef1C0ded9bec7F1a1670819833240f027b25EfF".to_string()
            )]
        );
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("UPDATE_STREAM", "updates"),
            ("BATCH_PAUSE_MS", "0"),
            ("READ_FAILURE_POLICY", "Retry"),
            ("READ_RETRY_MAX_ATTEMPTS", "3"),
            ("REQUIRE_SNAPSHOT", "1"),
        ])
        .unwrap();

        assert_eq!(config.update_stream, "updates");
        assert!(config.service_config().batch_pause.is_zero());
        assert_eq!(
            config.read_failure_policy,
            ReadFailurePolicy::Retry {
                max_attempts: 3,
                base_delay: Duration::from_millis(500)
            }
        );
        assert!(config.require_snapshot);
    }

    #[test]
    fn test_invalid_values() {
        assert!(config(&[("HTTP_PORT", "http")]).is_err());
        assert!(config(&[("READ_FAILURE_POLICY", "ignore")]).is_err());
        assert!(config(&[("READ_FAILURE_POLICY", "retry"), ("READ_RETRY_MAX_ATTEMPTS", "0")]).is_err());
    }

    #[test]
    fn test_parse_spenders() {
        let spenders = parse_spenders(" zrx=0x1 , tempo = 0x2 ,").unwrap();
        assert_eq!(
            spenders,
            vec![
                ("zrx".to_string(), "0x1".to_string()),
                ("tempo".to_string(), "0x2".to_string())
            ]
        );

        assert!(parse_spenders("").unwrap().is_empty());
        assert!(parse_spenders("zrx").is_err());
        assert!(parse_spenders("=0x1").is_err());
    }
}
