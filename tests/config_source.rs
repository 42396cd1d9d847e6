//! Configuration acquisition from a file and from an HTTP endpoint.
//!
use std::io::Write;

use tidegate::gate::config::ConfigSource;

fn sample_document() -> String {
    serde_json::json!({
        "data": {
            "configs": {
                "gate_config": {
                    "exchange": {
                        "exchange_id": "hyperix",
                        "credentials": {"api_key": "k", "secret_key": "s"},
                        "is_test_keys": false
                    },
                    "rate_limits": {
                        "enable_ccxt_rate_limiter": true,
                        "api_requests_per_seconds": {
                            "public": {"ip_list": ["10.0.0.1"], "exchange_rps_limit": 10.0},
                            "private": {"ip_list": ["10.0.1.1"], "balance": 1.0,
                                        "order_status": 1.0, "exchange_rps_limit": 5.0}
                        }
                    },
                    "aeron": {
                        "subscribers": {"core": {"channel": "aeron:ipc", "stream_id": 1001}},
                        "publishers": {
                            "orderbooks": {"channel": "aeron:ipc", "stream_id": 1002},
                            "balances": {"channel": "aeron:ipc", "stream_id": 1003},
                            "core": {"channel": "aeron:ipc", "stream_id": 1004},
                            "logs": {"channel": "aeron:ipc", "stream_id": 1005}
                        }
                    },
                    "info": {"node": "gate", "instance": "prod-3"},
                    "gate": {"order_book_depth": 20}
                }
            },
            "markets": [{"common_symbol": "BTC/USDT"}],
            "assets_labels": [{"common": "BTC"}]
        },
        "algo": "spread-1"
    })
    .to_string()
}

#[tokio::test]
async fn loads_from_a_local_file() {
    let path = std::env::temp_dir().join(format!("tidegate-config-{}.json", std::process::id()));
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(sample_document().as_bytes()).unwrap();

    let config = ConfigSource::File(path.clone()).load().await.unwrap();
    assert_eq!(config.exchange_id(), "hyperix");
    assert_eq!(config.order_book_depth(), 20);
    assert!(config.validate().is_ok());

    std::fs::remove_file(path).ok();
}

#[tokio::test]
async fn loads_from_an_http_endpoint() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/configuration")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(sample_document())
        .create_async()
        .await;

    let url = format!("{}/configuration", server.url()).parse().unwrap();
    let config = ConfigSource::Http(url).load().await.unwrap();
    assert_eq!(config.tickers(), vec!["BTC/USDT"]);
    assert_eq!(config.gate_section().info.instance, "prod-3");
    mock.assert_async().await;
}

#[tokio::test]
async fn rejects_an_invalid_document() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/configuration")
        .with_status(200)
        .with_body("{\"data\": \"not a gateway config\"}")
        .create_async()
        .await;

    let url = format!("{}/configuration", server.url()).parse().unwrap();
    assert!(ConfigSource::Http(url).load().await.is_err());
}
