//! Per-pass view of the watch-list and held positions

use crate::market_hours::MarketPhase;
use chrono::{DateTime, Utc};
use market_data::{Quote, StockConfig};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

/// One watch-list row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockView {
    pub config: StockConfig,
    pub quote: Quote,
    /// Percent return vs cost, when a position with a cost basis is held
    pub return_pct: Option<f64>,
}

impl StockView {
    pub fn new(config: StockConfig, quote: Quote) -> Self {
        let return_pct = if config.position > 0.0 && config.cost_price > 0.0 {
            Some((quote.price - config.cost_price) / config.cost_price * 100.0)
        } else {
            None
        };
        Self {
            config,
            quote,
            return_pct,
        }
    }

    pub fn is_held(&self) -> bool {
        self.config.position > 0.0
    }
}

/// Totals over held positions
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PortfolioSummary {
    pub total_cost: Decimal,
    pub market_value: Decimal,
    pub return_pct: Option<Decimal>,
}

impl PortfolioSummary {
    pub fn from_views(views: &[StockView]) -> Self {
        let mut total_cost = Decimal::ZERO;
        let mut market_value = Decimal::ZERO;

        for view in views.iter().filter(|v| v.is_held()) {
            let (Ok(position), Ok(cost), Ok(price)) = (
                Decimal::try_from(view.config.position),
                Decimal::try_from(view.config.cost_price),
                Decimal::try_from(view.quote.price),
            ) else {
                continue;
            };
            total_cost += position * cost;
            market_value += position * price;
        }

        let return_pct = (total_cost > Decimal::ZERO).then(|| {
            ((market_value - total_cost) / total_cost * Decimal::ONE_HUNDRED).round_dp(2)
        });

        Self {
            total_cost: total_cost.round_dp(2),
            market_value: market_value.round_dp(2),
            return_pct,
        }
    }

    pub fn profit(&self) -> Decimal {
        self.market_value - self.total_cost
    }

    pub fn return_pct_f64(&self) -> Option<f64> {
        self.return_pct.and_then(|pct| pct.to_f64())
    }
}

/// Published after every successful pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorSnapshot {
    pub stocks: Vec<StockView>,
    pub summary: PortfolioSummary,
    pub phase: Option<MarketPhase>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl MonitorSnapshot {
    pub fn new(stocks: Vec<StockView>, phase: MarketPhase, updated_at: DateTime<Utc>) -> Self {
        let summary = PortfolioSummary::from_views(&stocks);
        Self {
            stocks,
            summary,
            phase: Some(phase),
            updated_at: Some(updated_at),
        }
    }

    /// Never populated by a successful pass
    pub fn is_empty(&self) -> bool {
        self.updated_at.is_none()
    }

    pub fn get(&self, code: &str) -> Option<&StockView> {
        self.stocks.iter().find(|view| view.config.code == code)
    }

    /// Codes shown in the menu-bar title
    pub fn title_codes(&self) -> Vec<&str> {
        self.stocks
            .iter()
            .filter(|view| view.config.shows_in_title())
            .map(|view| view.config.code.as_str())
            .collect()
    }
}
