//! EastMoney and Sina clients against a local mock server

use market_data::sources::eastmoney::EastMoneyClient;
use market_data::sources::sina::SinaClient;
use market_data::{MarketDataError, MarketType, StockConfig};
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_eastmoney_batch_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/qt/ulist.np/get"))
        .and(query_param("fltt", "2"))
        .and(query_param("fields", "f2,f3,f12,f13,f14,f15,f16,f18,f232"))
        .and(query_param("secids", "1.600000,0.000001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "rc": 0,
            "data": {
                "total": 2,
                "diff": [
                    {"f2": 10.5, "f3": 1.2, "f12": "600000", "f13": 1, "f14": "浦发银行",
                     "f15": 10.6, "f16": 10.3, "f18": 10.37, "f232": "-"},
                    {"f2": 12.01, "f3": -0.5, "f12": "000001", "f13": 0, "f14": "平安银行",
                     "f15": 12.2, "f16": 12.1, "f18": 12.07, "f232": "-"}
                ]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = EastMoneyClient::new(&server.uri(), TIMEOUT).unwrap();
    let configs = vec![
        StockConfig::new("600000").with_market_type(MarketType::Shanghai),
        StockConfig::new("000001").with_market_type(MarketType::Shenzhen),
    ];

    let quotes = client.get_quotes(&configs).await.unwrap();
    assert_eq!(quotes.len(), 2);
    assert_eq!(quotes["600000"].price, 10.5);
    assert_eq!(quotes["000001"].market_type, MarketType::Shenzhen);
    assert!(client.health().is_healthy);
}

#[tokio::test]
async fn test_eastmoney_suspended_stock_has_no_quote() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/qt/ulist.np/get"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "rc": 0,
            "data": {
                "total": 2,
                "diff": [
                    {"f2": "-", "f3": "-", "f12": "600000", "f13": 1, "f14": "浦发银行",
                     "f15": "-", "f16": "-", "f18": 10.0, "f232": "-"},
                    {"f2": 12.01, "f3": -0.5, "f12": "000001", "f13": 0, "f14": "平安银行",
                     "f15": 12.2, "f16": 12.1, "f18": 12.07, "f232": "-"}
                ]
            }
        })))
        .mount(&server)
        .await;

    let client = EastMoneyClient::new(&server.uri(), TIMEOUT).unwrap();
    let configs = vec![
        StockConfig::new("600000").with_market_type(MarketType::Shanghai),
        StockConfig::new("000001").with_market_type(MarketType::Shenzhen),
    ];

    let quotes = client.get_quotes(&configs).await.unwrap();
    assert!(!quotes.contains_key("600000"));
    assert_eq!(quotes["000001"].price, 12.01);
    assert!(client.health().is_healthy);
}

#[tokio::test]
async fn test_eastmoney_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&server)
        .await;

    let client = EastMoneyClient::new(&server.uri(), TIMEOUT).unwrap();
    let result = client.get_quotes(&[StockConfig::new("AAPL")]).await;

    match result {
        Err(MarketDataError::RateLimit { retry_after, .. }) => assert_eq!(retry_after, Some(7)),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_eastmoney_server_error_marks_unhealthy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .mount(&server)
        .await;

    let client = EastMoneyClient::new(&server.uri(), TIMEOUT).unwrap();
    for _ in 0..3 {
        assert!(matches!(
            client.get_quotes(&[StockConfig::new("600000")]).await,
            Err(MarketDataError::Api(_))
        ));
    }
    assert!(!client.health().is_healthy);
}

#[tokio::test]
async fn test_eastmoney_garbage_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let client = EastMoneyClient::new(&server.uri(), TIMEOUT).unwrap();
    assert!(matches!(
        client.get_quotes(&[StockConfig::new("600000")]).await,
        Err(MarketDataError::InvalidResponse(_))
    ));
}

#[tokio::test]
async fn test_sina_after_hours_request() {
    let server = MockServer::start().await;
    let mut fields: Vec<String> = (0..30).map(|i| format!("{}.0", i)).collect();
    fields[0] = "苹果".to_string();
    fields[21] = "192.31".to_string();
    fields[22] = "0.87".to_string();
    let body = format!("var hq_str_gb_aapl=\"{}\";\n", fields.join(","));

    Mock::given(method("GET"))
        .and(path("/rn"))
        .and(query_param("list", "gb_aapl"))
        .and(header("Referer", "https://sina.com.cn"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(1)
        .mount(&server)
        .await;

    let client = SinaClient::new(&server.uri(), TIMEOUT).unwrap();
    let price = client.get_after_hours("AAPL").await.unwrap();
    assert_eq!(price.price, 192.31);
    assert_eq!(price.diff, 0.87);
}

#[tokio::test]
async fn test_sina_unknown_symbol() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rn"))
        .respond_with(ResponseTemplate::new(200).set_body_string("var hq_str_gb_zzzz=\"\";\n"))
        .mount(&server)
        .await;

    let client = SinaClient::new(&server.uri(), TIMEOUT).unwrap();
    assert!(matches!(
        client.get_after_hours("ZZZZ").await,
        Err(MarketDataError::NotFound(_))
    ));
}
