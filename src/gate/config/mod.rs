//! Gateway configuration.
//!
//! This module models the JSON configuration document the gateway consumes.
//! Only the fields the gateway core actually reads are represented; unknown
//! keys are ignored at deserialization.
//!
//! Besides the raw tree, the module exposes the derived views the scheduler
//! works with: the ticker and asset lists, the pacing delays computed from
//! the configured requests-per-second limits, and the validated source-IP
//! pools.
//!
//! # Validation
//!
//! The public and private IP pools must be disjoint, with one exception:
//! the degenerate deployment where exactly one IP is shared between them.
//!
mod source;
pub use source::ConfigSource;

use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Duration;

use secrecy::Secret;
use serde::Deserialize;

use crate::gate::error::{GateError, Result};

/// Credentials of one API-key account.
///
/// Secrets are wrapped so they never appear in logs or debug output; when
/// the values are dropped, their memory is zeroed.
#[derive(Clone, Debug, Deserialize)]
pub struct AccountCredentials {
    pub api_key: Secret<String>,
    pub secret_key: Secret<String>,
    #[serde(default)]
    pub password: Option<Secret<String>>,
}

/// The root of the configuration document.
///
#[derive(Clone, Debug, Deserialize)]
pub struct GateConfig {
    pub data: ConfigData,
    pub algo: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ConfigData {
    pub configs: Configs,
    pub markets: Vec<Market>,
    pub assets_labels: Vec<AssetLabel>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Configs {
    pub gate_config: GateSection,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GateSection {
    pub exchange: ExchangeSection,
    pub rate_limits: RateLimits,
    pub aeron: TransportSection,
    pub info: InfoSection,
    pub gate: GateTuning,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ExchangeSection {
    pub exchange_id: String,
    pub credentials: AccountCredentials,
    /// Whether the credentials belong to the exchange's sandbox.
    pub is_test_keys: bool,
    #[serde(default)]
    pub accounts: Option<Vec<AccountCredentials>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RateLimits {
    /// Whether the driver's own request pacer stays enabled underneath the
    /// session pools.
    pub enable_ccxt_rate_limiter: bool,
    pub api_requests_per_seconds: ApiRequestsPerSeconds,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ApiRequestsPerSeconds {
    pub public: PublicRates,
    pub private: PrivateRates,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PublicRates {
    pub ip_list: Vec<IpAddr>,
    pub exchange_rps_limit: f64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PrivateRates {
    pub ip_list: Vec<IpAddr>,
    pub balance: f64,
    pub order_status: f64,
    pub exchange_rps_limit: f64,
}

/// One messaging channel endpoint, in the transport's own terms.
#[derive(Clone, Debug, Deserialize)]
pub struct ChannelSpec {
    pub channel: String,
    pub stream_id: i32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TransportSection {
    pub subscribers: SubscriberChannels,
    pub publishers: PublisherChannels,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SubscriberChannels {
    pub core: ChannelSpec,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PublisherChannels {
    pub orderbooks: ChannelSpec,
    pub balances: ChannelSpec,
    pub core: ChannelSpec,
    pub logs: ChannelSpec,
}

#[derive(Clone, Debug, Deserialize)]
pub struct InfoSection {
    pub node: String,
    pub instance: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GateTuning {
    pub order_book_depth: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Market {
    pub common_symbol: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AssetLabel {
    pub common: String,
}

impl GateConfig {
    pub fn gate_section(&self) -> &GateSection {
        &self.data.configs.gate_config
    }

    fn rates(&self) -> &ApiRequestsPerSeconds {
        &self.gate_section().rate_limits.api_requests_per_seconds
    }

    pub fn exchange_id(&self) -> &str {
        &self.gate_section().exchange.exchange_id
    }

    pub fn sandbox_mode(&self) -> bool {
        self.gate_section().exchange.is_test_keys
    }

    pub fn accounts(&self) -> Option<&[AccountCredentials]> {
        self.gate_section().exchange.accounts.as_deref()
    }

    /// Market symbols the gateway polls and trades.
    pub fn tickers(&self) -> Vec<String> {
        self.data
            .markets
            .iter()
            .map(|market| market.common_symbol.clone())
            .collect()
    }

    /// Asset codes the gateway reports balances for.
    pub fn assets(&self) -> Vec<String> {
        self.data
            .assets_labels
            .iter()
            .map(|label| label.common.clone())
            .collect()
    }

    pub fn public_ips(&self) -> &[IpAddr] {
        &self.rates().public.ip_list
    }

    pub fn private_ips(&self) -> &[IpAddr] {
        &self.rates().private.ip_list
    }

    pub fn order_book_depth(&self) -> u32 {
        self.gate_section().gate.order_book_depth
    }

    /// Pause between order-book fan-out rounds.
    pub fn orderbook_delay(&self) -> Duration {
        delay_from_rps(self.rates().public.exchange_rps_limit)
    }

    /// Pause between balance-watch iterations.
    pub fn balance_delay(&self) -> Duration {
        delay_from_rps(self.rates().private.balance)
    }

    /// Pause between order-watch iterations.
    pub fn order_status_delay(&self) -> Duration {
        delay_from_rps(self.rates().private.order_status)
    }

    /// Minimum inter-acquire interval of the private pool.
    pub fn private_delay(&self) -> Duration {
        delay_from_rps(self.rates().private.exchange_rps_limit)
    }

    /// Minimum inter-acquire interval of the public pool. Pacing of the
    /// public side is driven by the fan-out delay, not the pool.
    pub fn public_delay(&self) -> Duration {
        Duration::ZERO
    }

    /// Checks the constraints the deserializer cannot express.
    pub fn validate(&self) -> Result<()> {
        let rates = self.rates();
        for (name, rps) in [
            ("public.exchange_rps_limit", rates.public.exchange_rps_limit),
            ("private.balance", rates.private.balance),
            ("private.order_status", rates.private.order_status),
            ("private.exchange_rps_limit", rates.private.exchange_rps_limit),
        ] {
            if rps <= 0.0 {
                return Err(GateError::Config(format!(
                    "api_requests_per_seconds.{name} must be positive"
                )));
            }
        }

        if self.public_ips().is_empty() {
            return Err(GateError::Config("public.ip_list must not be empty".into()));
        }

        let public: HashSet<&IpAddr> = self.public_ips().iter().collect();
        let private: HashSet<&IpAddr> = self.private_ips().iter().collect();
        let shared_single_ip =
            public.len() == 1 && private.len() == 1 && public == private;
        if !shared_single_ip && public.intersection(&private).next().is_some() {
            return Err(GateError::Config(
                "public and private IP pools intersect".into(),
            ));
        }

        Ok(())
    }
}

fn delay_from_rps(rps: f64) -> Duration {
    Duration::from_secs_f64(1.0 / rps)
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    /// A complete configuration document for tests across the crate.
    pub(crate) fn sample_config_json() -> serde_json::Value {
        serde_json::json!({
            "data": {
                "configs": {
                    "gate_config": {
                        "exchange": {
                            "exchange_id": "hyperix",
                            "credentials": {
                                "api_key": "key-0",
                                "secret_key": "secret-0",
                                "password": null
                            },
                            "is_test_keys": true,
                            "accounts": [
                                {"api_key": "key-1", "secret_key": "secret-1"},
                                {"api_key": "key-2", "secret_key": "secret-2"}
                            ]
                        },
                        "rate_limits": {
                            "enable_ccxt_rate_limiter": false,
                            "api_requests_per_seconds": {
                                "public": {
                                    "ip_list": ["10.0.0.1", "10.0.0.2"],
                                    "exchange_rps_limit": 10.0
                                },
                                "private": {
                                    "ip_list": ["10.0.1.1"],
                                    "balance": 1.0,
                                    "order_status": 2.0,
                                    "exchange_rps_limit": 5.0
                                }
                            }
                        },
                        "aeron": {
                            "subscribers": {
                                "core": {"channel": "aeron:ipc", "stream_id": 1001}
                            },
                            "publishers": {
                                "orderbooks": {"channel": "aeron:ipc", "stream_id": 1002},
                                "balances": {"channel": "aeron:ipc", "stream_id": 1003},
                                "core": {"channel": "aeron:ipc", "stream_id": 1004},
                                "logs": {"channel": "aeron:ipc", "stream_id": 1005}
                            }
                        },
                        "info": {"node": "gate", "instance": "test-1"},
                        "gate": {"order_book_depth": 10}
                    }
                },
                "markets": [
                    {"common_symbol": "BTC/USDT"},
                    {"common_symbol": "ETH/USDT"}
                ],
                "assets_labels": [
                    {"common": "BTC"},
                    {"common": "ETH"},
                    {"common": "USDT"}
                ]
            },
            "algo": "spread-1"
        })
    }

    pub(crate) fn sample_config() -> GateConfig {
        serde_json::from_value(sample_config_json()).unwrap()
    }

    #[test]
    fn test_parses_consumed_fields() {
        let config = sample_config();
        assert_eq!(config.exchange_id(), "hyperix");
        assert!(config.sandbox_mode());
        assert_eq!(config.tickers(), vec!["BTC/USDT", "ETH/USDT"]);
        assert_eq!(config.assets(), vec!["BTC", "ETH", "USDT"]);
        assert_eq!(config.accounts().map(<[_]>::len), Some(2));
        assert_eq!(config.order_book_depth(), 10);
        assert_eq!(config.algo, "spread-1");
    }

    #[test]
    fn test_derived_delays() {
        let config = sample_config();
        assert_eq!(config.balance_delay(), Duration::from_secs(1));
        assert_eq!(config.order_status_delay(), Duration::from_millis(500));
        assert_eq!(config.private_delay(), Duration::from_millis(200));
        assert_eq!(config.orderbook_delay(), Duration::from_millis(100));
        assert_eq!(config.public_delay(), Duration::ZERO);
    }

    #[test]
    fn test_validation_accepts_disjoint_pools() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_intersecting_pools() {
        let mut json = sample_config_json();
        json["data"]["configs"]["gate_config"]["rate_limits"]["api_requests_per_seconds"]
            ["private"]["ip_list"] = serde_json::json!(["10.0.0.1", "10.0.1.1"]);
        let config: GateConfig = serde_json::from_value(json).unwrap();
        assert!(matches!(config.validate(), Err(GateError::Config(_))));
    }

    #[test]
    fn test_validation_allows_single_shared_ip() {
        let mut json = sample_config_json();
        let rates = &mut json["data"]["configs"]["gate_config"]["rate_limits"]
            ["api_requests_per_seconds"];
        rates["public"]["ip_list"] = serde_json::json!(["10.0.0.1"]);
        rates["private"]["ip_list"] = serde_json::json!(["10.0.0.1"]);
        let config: GateConfig = serde_json::from_value(json).unwrap();
        assert!(config.validate().is_ok());
    }
}
