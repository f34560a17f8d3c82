//! Display formatting for alerts and snapshots

use market_data::{MarketType, Quote, StockConfig};

pub const QUOTE_PAGE_BASE: &str = "https://xueqiu.com/S/";

/// Sub-unit prices get a third decimal
pub fn format_price(price: f64) -> String {
    if price.abs() < 1.0 {
        format!("{:.3}", price)
    } else {
        format!("{:.2}", price)
    }
}

pub fn format_message(quote: &Quote) -> String {
    format!("price {}; change {:.2}%", format_price(quote.price), quote.diff)
}

/// Quote page for the stock; mainland codes carry their exchange prefix
pub fn quote_link(config: &StockConfig, quote: &Quote) -> String {
    let market: MarketType = config.market_type.unwrap_or(quote.market_type);
    format!("{}{}{}", QUOTE_PAGE_BASE, market.exchange_prefix(), config.code)
}
