//! Price-threshold rules
//!
//! A rule string compiles to a pair of trigger bounds around a reference
//! price:
//!
//! ```text
//! [ '|' ] [ '+' | '-' ] <positive-number> [ '%' ]
//! ```
//!
//! `|` switches the reference from the prior close to the cost price, `+`
//! and `-` keep only the upward or downward side, and a trailing `%` makes
//! the magnitude relative. Anything that does not match is inert and never
//! triggers.

use market_data::{Quote, StockConfig};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Dedup key of the implicit break-even rule
pub const BREAK_EVEN_KEY: &str = "break-even";

/// Trigger range; `None` on either side means unbounded
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl Bounds {
    pub const UNBOUNDED: Bounds = Bounds {
        lower: None,
        upper: None,
    };

    pub fn new(lower: f64, upper: f64) -> Self {
        Self {
            lower: Some(lower),
            upper: Some(upper),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.lower.is_none() && self.upper.is_none()
    }

    /// True when `price` falls outside the range
    pub fn is_breached(&self, price: f64) -> bool {
        self.lower.is_some_and(|lower| price < lower) || self.upper.is_some_and(|upper| price > upper)
    }
}

/// Parsed rule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rule {
    pub relative_to_cost: bool,
    pub only_increase: bool,
    pub only_decrease: bool,
    pub is_percentage: bool,
    pub magnitude: f64,
    /// No marker at all ("11"); evaluated as a symmetric absolute band
    pub is_bare_absolute: bool,
}

impl Rule {
    /// `None` for malformed rules
    pub fn parse(text: &str) -> Option<Rule> {
        let mut rest = text.trim();

        let relative_to_cost = match rest.strip_prefix('|') {
            Some(stripped) => {
                rest = stripped;
                true
            }
            None => false,
        };

        let mut only_increase = false;
        let mut only_decrease = false;
        if let Some(stripped) = rest.strip_prefix('+') {
            only_increase = true;
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix('-') {
            only_decrease = true;
            rest = stripped;
        }

        let is_percentage = match rest.strip_suffix('%') {
            Some(stripped) => {
                rest = stripped;
                true
            }
            None => false,
        };

        // Signs were consumed above; a second one ("+-5") is malformed
        if rest.starts_with(['+', '-']) {
            return None;
        }

        let magnitude: f64 = rest.trim().parse().ok()?;
        if !magnitude.is_finite() || magnitude <= 0.0 {
            return None;
        }

        Some(Rule {
            relative_to_cost,
            only_increase,
            only_decrease,
            is_percentage,
            magnitude,
            is_bare_absolute: !relative_to_cost && !only_increase && !only_decrease && !is_percentage,
        })
    }

    pub fn reference(&self, base_price: f64, cost_price: f64) -> f64 {
        if self.relative_to_cost {
            cost_price
        } else {
            base_price
        }
    }

    /// Bounds around the selected reference, rounded half-up to 2 decimals.
    /// A non-positive reference (no cost basis, suspended quote) is inert.
    pub fn bounds(&self, base_price: f64, cost_price: f64) -> Bounds {
        let reference = self.reference(base_price, cost_price);
        if !reference.is_finite() || reference <= 0.0 {
            return Bounds::UNBOUNDED;
        }

        let Some((lower, upper)) = self.band(reference) else {
            return Bounds::UNBOUNDED;
        };

        Bounds {
            lower: (!self.only_increase).then_some(lower),
            upper: (!self.only_decrease).then_some(upper),
        }
    }

    fn band(&self, reference: f64) -> Option<(f64, f64)> {
        let reference = Decimal::try_from(reference).ok()?;
        let magnitude = Decimal::try_from(self.magnitude).ok()?;

        let (lower, upper) = if self.is_percentage {
            let ratio = magnitude.checked_div(Decimal::ONE_HUNDRED)?;
            (
                reference.checked_mul(Decimal::ONE.checked_sub(ratio)?)?,
                reference.checked_mul(Decimal::ONE.checked_add(ratio)?)?,
            )
        } else {
            (reference.checked_sub(magnitude)?, reference.checked_add(magnitude)?)
        };

        Some((round2(lower)?, round2(upper)?))
    }
}

fn round2(value: Decimal) -> Option<f64> {
    value
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
}

/// Bounds for a rule string; malformed rules are fully unbounded
pub fn evaluate(rule: &str, base_price: f64, cost_price: f64) -> Bounds {
    Rule::parse(rule)
        .map(|parsed| parsed.bounds(base_price, cost_price))
        .unwrap_or(Bounds::UNBOUNDED)
}

pub fn triggers(rule: &str, base_price: f64, cost_price: f64, current_price: f64) -> bool {
    evaluate(rule, base_price, cost_price).is_breached(current_price)
}

/// Held position that moved from loss (vs prior close) into profit today
pub fn break_even_triggered(config: &StockConfig, quote: &Quote) -> bool {
    config.position > 0.0
        && config.cost_price > quote.base_price
        && config.cost_price < quote.price
}

/// A rule that fired for one stock during a tick
#[derive(Debug, Clone, PartialEq)]
pub struct FiredRule {
    /// Dedup identifier: the rule string itself or [`BREAK_EVEN_KEY`]
    pub key: String,
    pub text: String,
}

/// Every rule of `config` that `quote` trips, break-even last.
/// A quote without a positive price trips nothing.
pub fn fired_rules(config: &StockConfig, quote: &Quote) -> Vec<FiredRule> {
    if !quote.price.is_finite() || quote.price <= 0.0 {
        return Vec::new();
    }

    let mut fired: Vec<FiredRule> = config
        .monitor_rules
        .iter()
        .filter(|rule| triggers(rule, quote.base_price, config.cost_price, quote.price))
        .map(|rule| FiredRule {
            key: rule.clone(),
            text: rule.clone(),
        })
        .collect();

    if break_even_triggered(config, quote) {
        fired.push(FiredRule {
            key: BREAK_EVEN_KEY.to_string(),
            text: "break even".to_string(),
        });
    }

    fired
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_data::MarketType;

    fn quote(price: f64, base_price: f64) -> Quote {
        Quote {
            code: "600000".to_string(),
            name: "浦发银行".to_string(),
            price,
            diff: 0.0,
            market_type: MarketType::Shanghai,
            high: price,
            open: base_price,
            base_price,
            underlying_code: None,
        }
    }

    #[test]
    fn test_parse_flags() {
        let rule = Rule::parse("|-5%").unwrap();
        assert!(rule.relative_to_cost);
        assert!(rule.only_decrease);
        assert!(!rule.only_increase);
        assert!(rule.is_percentage);
        assert_eq!(rule.magnitude, 5.0);
        assert!(!rule.is_bare_absolute);

        let rule = Rule::parse(" +0.5 ").unwrap();
        assert!(rule.only_increase);
        assert!(!rule.is_percentage);
        assert_eq!(rule.magnitude, 0.5);

        assert!(Rule::parse("11").unwrap().is_bare_absolute);
    }

    #[test]
    fn test_malformed_rules_are_inert() {
        for rule in ["", "%", "abc", "|", "+", "-%", "0", "-0%", "+-5", "5%%", "NaN", "inf"] {
            assert!(Rule::parse(rule).is_none(), "{:?} should not parse", rule);
            assert!(evaluate(rule, 10.0, 9.0).is_unbounded());
            for price in [0.0, 0.01, 10.0, 1e9] {
                assert!(!triggers(rule, 10.0, 9.0, price));
            }
        }
    }

    #[test]
    fn test_percentage_band() {
        assert_eq!(evaluate("3%", 10.0, 0.0), Bounds::new(9.7, 10.3));
        assert!(triggers("3%", 10.0, 0.0, 10.5));
        assert!(triggers("3%", 10.0, 0.0, 9.69));
        assert!(!triggers("3%", 10.0, 0.0, 10.0));
        assert!(!triggers("3%", 10.0, 0.0, 10.3));
    }

    #[test]
    fn test_cost_relative_downside() {
        let bounds = evaluate("|-5%", 10.0, 9.0);
        assert_eq!(bounds.lower, Some(8.55));
        assert_eq!(bounds.upper, None);
        assert!(triggers("|-5%", 10.0, 9.0, 8.0));
        assert!(!triggers("|-5%", 10.0, 9.0, 8.6));
        assert!(!triggers("|-5%", 10.0, 9.0, 1000.0));
    }

    #[test]
    fn test_cost_relative_band() {
        assert_eq!(evaluate("|1%", 10.0, 9.0), Bounds::new(8.91, 9.09));
    }

    #[test]
    fn test_one_sided_upside() {
        let bounds = evaluate("+2", 10.0, 0.0);
        assert_eq!(bounds.lower, None);
        assert_eq!(bounds.upper, Some(12.0));
        assert!(triggers("+2", 10.0, 0.0, 12.01));
        assert!(!triggers("+2", 10.0, 0.0, 0.5));
    }

    #[test]
    fn test_absolute_band_rounding() {
        // 10.005 rounds half-up
        assert_eq!(evaluate("0.005", 10.0, 0.0), Bounds::new(10.0, 10.01));
        assert_eq!(evaluate("11", 20.0, 0.0), Bounds::new(9.0, 31.0));
    }

    #[test]
    fn test_missing_reference_is_inert() {
        assert!(evaluate("|5%", 10.0, 0.0).is_unbounded());
        assert!(evaluate("5%", 0.0, 9.0).is_unbounded());
        assert!(!triggers("|-5%", 10.0, 0.0, 0.01));
    }

    #[test]
    fn test_break_even() {
        let held = StockConfig::new("600000").with_cost(10.5, 100.0);
        assert!(break_even_triggered(&held, &quote(10.6, 10.0)));
        assert!(!break_even_triggered(&held, &quote(10.4, 10.0)));
        assert!(!break_even_triggered(&held, &quote(10.6, 10.8)));

        let flat = StockConfig::new("600000").with_cost(10.5, 0.0);
        assert!(!break_even_triggered(&flat, &quote(10.6, 10.0)));
    }

    #[test]
    fn test_fired_rules_order() {
        let config = StockConfig::new("600000")
            .with_cost(10.5, 100.0)
            .with_rules(["3%", "|+10%", "bogus"]);

        let fired = fired_rules(&config, &quote(10.6, 10.0));
        let keys: Vec<&str> = fired.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["3%", BREAK_EVEN_KEY]);
    }

    #[test]
    fn test_unpriced_quote_fires_nothing() {
        let config = StockConfig::new("600000")
            .with_cost(10.5, 100.0)
            .with_rules(["3%", "-5%", "|-5%"]);

        assert!(fired_rules(&config, &quote(0.0, 10.0)).is_empty());
        assert!(fired_rules(&config, &quote(f64::NAN, 10.0)).is_empty());
        assert_eq!(fired_rules(&config, &quote(9.4, 10.0)).len(), 3);
    }
}
