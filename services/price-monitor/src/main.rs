//! Price Monitor - watch-list price alerts
//!
//! 1. Loads settings (defaults, optional file, environment)
//! 2. Reads the watch-list JSON file on every tick (reloaded on change)
//! 3. Fetches quotes from EastMoney, with Sina after-hours prices for US listings
//! 4. Evaluates per-stock rules and sends deduplicated alerts

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

use market_data::{EastMoneyClient, MarketDataClient, SinaClient};
use price_monitor::{
    JsonFileConfigProvider, LogNotifier, MarketCalendar, MonitorLoop, MonitorSettings,
    NotificationDeduper, Notifier, Settings, WebhookNotifier,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let settings = Settings::load()?;

    tracing_subscriber::fmt()
        .with_max_level(settings.tracing_level())
        .init();

    info!("Starting Price Monitor...");
    info!(
        "Watch-list: {}, market timezone: {}",
        settings.stocks_file.display(),
        settings.market_timezone
    );

    let market_data = build_market_data(&settings)?;
    let notifier = build_notifier(&settings)?;
    info!("Alerts delivered via {} notifier", notifier.name());

    let monitor = MonitorLoop::new(
        Arc::new(JsonFileConfigProvider::new(&settings.stocks_file)),
        Arc::new(market_data),
        NotificationDeduper::new(settings.rule_cooldown(), settings.break_even_cooldown()),
        notifier,
        MarketCalendar::a_shares(settings.timezone()?),
        MonitorSettings::from(&settings),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(monitor.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    let _ = shutdown_tx.send(true);

    match handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Monitor loop failed: {}", e),
        Err(e) => error!("Monitor task panicked: {}", e),
    }

    info!("Price Monitor stopped");
    Ok(())
}

fn build_market_data(settings: &Settings) -> anyhow::Result<MarketDataClient> {
    let md = &settings.market_data;
    let config = md.client_config();
    let primary = EastMoneyClient::new(&md.primary_base_url, md.request_timeout())?;
    let secondary = SinaClient::new(&md.secondary_base_url, md.request_timeout())?;

    Ok(
        MarketDataClient::new(Arc::new(primary), config.build_cache(), config)
            .with_secondary(Arc::new(secondary)),
    )
}

fn build_notifier(settings: &Settings) -> anyhow::Result<Arc<dyn Notifier>> {
    match settings.notifier.webhook_url.as_deref() {
        Some(url) if !url.trim().is_empty() => Ok(Arc::new(WebhookNotifier::new(
            url,
            std::time::Duration::from_secs(settings.notifier.timeout_secs),
        )?)),
        _ => Ok(Arc::new(LogNotifier)),
    }
}
