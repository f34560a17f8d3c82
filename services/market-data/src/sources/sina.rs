use crate::sources::health::HealthTracker;
use crate::types::*;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::debug;

pub const SINA_BASE_URL: &str = "https://hq.sinajs.cn";
const SINA_REFERER: &str = "https://sina.com.cn";

const PRICE_FIELD: usize = 21;
const DIFF_FIELD: usize = 22;

/// Sina US quote client, used for pre/post-market prices (secondary source)
pub struct SinaClient {
    client: Client,
    base_url: String,
    health_tracker: HealthTracker,
}

impl SinaClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MarketDataError::Api(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            health_tracker: HealthTracker::new(),
        })
    }

    pub async fn get_after_hours(&self, code: &str) -> Result<AfterHoursPrice> {
        debug!("Fetching after-hours price for {} from Sina", code);
        let request_start = Instant::now();
        let result = self.request_after_hours(code).await;
        self.health_tracker.record(&result, request_start.elapsed());
        result
    }

    async fn request_after_hours(&self, code: &str) -> Result<AfterHoursPrice> {
        let symbol = format!("gb_{}", code.to_lowercase());
        let response = self
            .client
            .get(format!("{}/rn", self.base_url))
            .query(&[("list", symbol.as_str())])
            .header(reqwest::header::REFERER, SINA_REFERER)
            .send()
            .await
            .map_err(|e| MarketDataError::Api(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MarketDataError::Api(format!("Sina API error ({})", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| MarketDataError::InvalidResponse(e.to_string()))?;
        parse_hq_str(&body)
    }

    pub fn health(&self) -> SourceHealth {
        self.health_tracker.snapshot("sina")
    }
}

#[async_trait::async_trait]
impl AfterHoursSource for SinaClient {
    async fn fetch_after_hours(&self, code: &str) -> Result<AfterHoursPrice> {
        self.get_after_hours(code).await
    }

    fn name(&self) -> &str {
        "sina"
    }

    fn health(&self) -> Option<SourceHealth> {
        Some(SinaClient::health(self))
    }
}

/// Parse `var hq_str_gb_xxx="f0,f1,...";` into the after-hours price pair
pub fn parse_hq_str(body: &str) -> Result<AfterHoursPrice> {
    let start = body
        .find("hq_str_")
        .ok_or_else(|| MarketDataError::InvalidResponse("missing hq_str payload".to_string()))?;
    let rest = &body[start..];
    let open_quote = rest
        .find("=\"")
        .ok_or_else(|| MarketDataError::InvalidResponse("malformed hq_str payload".to_string()))?;
    let payload = &rest[open_quote + 2..];
    let close_quote = payload
        .find('"')
        .ok_or_else(|| MarketDataError::InvalidResponse("unterminated hq_str payload".to_string()))?;
    let payload = &payload[..close_quote];

    if payload.is_empty() {
        return Err(MarketDataError::NotFound("empty hq_str payload".to_string()));
    }

    let fields: Vec<&str> = payload.split(',').collect();
    if fields.len() <= DIFF_FIELD {
        return Err(MarketDataError::InvalidResponse(format!(
            "expected at least {} fields, got {}",
            DIFF_FIELD + 1,
            fields.len()
        )));
    }

    let parse = |idx: usize, what: &str| -> Result<f64> {
        fields[idx].trim().parse::<f64>().map_err(|e| {
            MarketDataError::InvalidResponse(format!("failed to parse {}: {}", what, e))
        })
    };

    Ok(AfterHoursPrice {
        price: parse(PRICE_FIELD, "price")?,
        diff: parse(DIFF_FIELD, "diff")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload_with(price: &str, diff: &str) -> String {
        let mut fields: Vec<String> = (0..30).map(|i| i.to_string()).collect();
        fields[0] = "Apple Inc".to_string();
        fields[PRICE_FIELD] = price.to_string();
        fields[DIFF_FIELD] = diff.to_string();
        format!("var hq_str_gb_aapl=\"{}\";\n", fields.join(","))
    }

    #[test]
    fn test_parse_price_and_diff() {
        let parsed = parse_hq_str(&payload_with("191.25", " -0.84")).unwrap();
        assert_eq!(parsed.price, 191.25);
        assert_eq!(parsed.diff, -0.84);
    }

    #[test]
    fn test_too_few_fields() {
        let body = "var hq_str_gb_aapl=\"Apple,1,2,3\";";
        assert!(matches!(
            parse_hq_str(body),
            Err(MarketDataError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_empty_payload_is_not_found() {
        assert!(matches!(
            parse_hq_str("var hq_str_gb_zzzz=\"\";"),
            Err(MarketDataError::NotFound(_))
        ));
    }

    #[test]
    fn test_unparsable_number() {
        assert!(parse_hq_str(&payload_with("n/a", "0.1")).is_err());
    }
}
