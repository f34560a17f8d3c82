//! Alert delivery

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// One fired alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Stock display name
    pub title: String,
    pub subtitle: String,
    pub message: String,
    pub link: String,
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()>;

    fn name(&self) -> &str;
}

/// Writes alerts to the log
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        info!(
            title = %notification.title,
            subtitle = %notification.subtitle,
            link = %notification.link,
            "{}",
            notification.message
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// POSTs alerts as JSON to an HTTP endpoint
#[derive(Clone)]
pub struct WebhookNotifier {
    url: String,
    client: Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        let payload = serde_json::json!({
            "title": notification.title,
            "subtitle": notification.subtitle,
            "message": notification.message,
            "url": notification.link,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        let response = self.client.post(&self.url).json(&payload).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Alert webhook failed: {} - {}", status, body));
        }

        debug!("Alert webhook sent for {}", notification.title);
        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}
