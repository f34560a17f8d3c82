use crate::sources::health::HealthTracker;
use crate::types::*;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

pub const EASTMONEY_BASE_URL: &str = "https://push2delay.eastmoney.com";

const QUOTE_FIELDS: &str = "f2,f3,f12,f13,f14,f15,f16,f18,f232";

/// EastMoney batch quote client (primary source)
pub struct EastMoneyClient {
    client: Client,
    base_url: String,
    health_tracker: HealthTracker,
}

impl EastMoneyClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| MarketDataError::Api(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            health_tracker: HealthTracker::new(),
        })
    }

    /// `secids` query value: "type.code" when qualified, else every candidate market
    pub fn secids(configs: &[StockConfig]) -> String {
        configs
            .iter()
            .flat_map(|config| match config.market_type {
                Some(market) => vec![format!("{}.{}", market.code(), config.code)],
                None => MarketType::CANDIDATES
                    .iter()
                    .map(|market| format!("{}.{}", market.code(), config.code))
                    .collect(),
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    fn build_url(&self, configs: &[StockConfig]) -> Result<url::Url> {
        let mut url = url::Url::parse(&format!("{}/api/qt/ulist.np/get", self.base_url))
            .map_err(|e| MarketDataError::Api(format!("Invalid EastMoney URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("fields", QUOTE_FIELDS)
            .append_pair("fltt", "2")
            .append_pair("secids", &Self::secids(configs));
        Ok(url)
    }

    /// Single request, no retry (the caller owns the retry policy)
    pub async fn get_quotes(&self, configs: &[StockConfig]) -> Result<HashMap<String, Quote>> {
        if configs.is_empty() {
            return Ok(HashMap::new());
        }

        debug!("Fetching {} quotes from EastMoney", configs.len());
        let request_start = Instant::now();
        let result = self.request_quotes(configs).await;
        self.health_tracker.record(&result, request_start.elapsed());
        result
    }

    async fn request_quotes(&self, configs: &[StockConfig]) -> Result<HashMap<String, Quote>> {
        let url = self.build_url(configs)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MarketDataError::Api(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(MarketDataError::RateLimit {
                source_name: "eastmoney".to_string(),
                retry_after,
            });
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(MarketDataError::Api(format!(
                "EastMoney API error ({}): {}",
                status, text
            )));
        }

        let body: UlistResponse = response
            .json()
            .await
            .map_err(|e| MarketDataError::InvalidResponse(e.to_string()))?;
        parse_ulist(body)
    }

    pub fn health(&self) -> SourceHealth {
        self.health_tracker.snapshot("eastmoney")
    }
}

#[async_trait::async_trait]
impl QuoteSource for EastMoneyClient {
    async fn fetch(&self, configs: &[StockConfig]) -> Result<HashMap<String, Quote>> {
        self.get_quotes(configs).await
    }

    fn name(&self) -> &str {
        "eastmoney"
    }

    fn health(&self) -> Option<SourceHealth> {
        Some(EastMoneyClient::health(self))
    }
}

// Response types for the ulist.np endpoint
#[derive(Debug, Deserialize)]
pub(crate) struct UlistResponse {
    data: Option<UlistData>,
}

#[derive(Debug, Deserialize)]
struct UlistData {
    diff: Option<Vec<UlistRow>>,
}

#[derive(Debug, Deserialize)]
struct UlistRow {
    #[serde(rename = "f2", default, deserialize_with = "optional_f64")]
    price: Option<f64>,
    #[serde(rename = "f3", default, deserialize_with = "lenient_f64")]
    diff: f64,
    #[serde(rename = "f12")]
    code: String,
    #[serde(rename = "f13")]
    market_type: i32,
    #[serde(rename = "f14", default)]
    name: String,
    #[serde(rename = "f15", default, deserialize_with = "lenient_f64")]
    high: f64,
    #[serde(rename = "f16", default, deserialize_with = "lenient_f64")]
    open: f64,
    #[serde(rename = "f18", default, deserialize_with = "lenient_f64")]
    base_price: f64,
    #[serde(rename = "f232", default)]
    underlying_code: Option<String>,
}

/// Suspended instruments report "-" instead of a number
fn optional_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|v: &f64| v.is_finite()))
}

fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(optional_f64(deserializer)?.unwrap_or(0.0))
}

pub(crate) fn parse_ulist(body: UlistResponse) -> Result<HashMap<String, Quote>> {
    let rows = body
        .data
        .and_then(|data| data.diff)
        .ok_or_else(|| MarketDataError::InvalidResponse("EastMoney returned no data".to_string()))?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let code = row.code.replace(' ', "");
            let price = match row.price {
                Some(price) if price > 0.0 => price,
                _ => {
                    debug!("{} has no traded price (suspended?), skipping", code);
                    return None;
                }
            };
            let quote = Quote {
                code: code.clone(),
                name: row.name.replace(' ', ""),
                price,
                diff: row.diff,
                market_type: MarketType::from(row.market_type),
                high: row.high,
                open: row.open,
                base_price: row.base_price,
                underlying_code: row
                    .underlying_code
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty() && c != "-"),
            };
            Some((code, quote))
        })
        .collect())
}
