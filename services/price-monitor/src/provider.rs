//! Watch-list providers

use market_data::StockConfig;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Supplies the stock list for each tick
#[async_trait::async_trait]
pub trait ConfigProvider: Send + Sync {
    async fn stock_configs(&self) -> anyhow::Result<Vec<StockConfig>>;
}

/// Fixed list, handy when embedding the monitor
#[derive(Debug, Clone, Default)]
pub struct StaticConfigProvider {
    configs: Vec<StockConfig>,
}

impl StaticConfigProvider {
    pub fn new(configs: Vec<StockConfig>) -> Self {
        Self { configs }
    }
}

#[async_trait::async_trait]
impl ConfigProvider for StaticConfigProvider {
    async fn stock_configs(&self) -> anyhow::Result<Vec<StockConfig>> {
        Ok(self.configs.clone())
    }
}

#[derive(Debug, Default)]
struct Loaded {
    modified: Option<SystemTime>,
    configs: Vec<StockConfig>,
}

/// JSON array of stock configs on disk, re-read when its mtime advances
#[derive(Debug)]
pub struct JsonFileConfigProvider {
    path: PathBuf,
    loaded: RwLock<Loaded>,
}

impl JsonFileConfigProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            loaded: RwLock::new(Loaded::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(&self) -> anyhow::Result<Vec<StockConfig>> {
        let raw = tokio::fs::read(&self.path).await?;
        let configs: Vec<StockConfig> = serde_json::from_slice(&raw)?;
        Ok(configs
            .into_iter()
            .filter(|config| !config.code.trim().is_empty())
            .collect())
    }
}

#[async_trait::async_trait]
impl ConfigProvider for JsonFileConfigProvider {
    async fn stock_configs(&self) -> anyhow::Result<Vec<StockConfig>> {
        let modified = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.modified().ok(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No watch-list at {}", self.path.display());
                let mut loaded = self.loaded.write().await;
                *loaded = Loaded::default();
                return Ok(Vec::new());
            }
            Err(e) => {
                warn!("Cannot stat {}: {}", self.path.display(), e);
                return Ok(self.loaded.read().await.configs.clone());
            }
        };

        {
            let loaded = self.loaded.read().await;
            if loaded.modified.is_some() && loaded.modified >= modified {
                return Ok(loaded.configs.clone());
            }
        }

        let mut loaded = self.loaded.write().await;
        match self.read_file().await {
            Ok(configs) => {
                info!(
                    "Loaded {} stocks from {}",
                    configs.len(),
                    self.path.display()
                );
                loaded.modified = modified;
                loaded.configs = configs;
            }
            Err(e) => {
                // Remember the mtime so a broken file is not re-parsed every tick
                warn!(
                    "Keeping previous watch-list, failed to load {}: {}",
                    self.path.display(),
                    e
                );
                loaded.modified = modified;
            }
        }
        Ok(loaded.configs.clone())
    }
}
