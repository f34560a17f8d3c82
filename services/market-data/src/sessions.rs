//! Regular-session calendars evaluated in each market's own time zone

use crate::types::MarketType;
use chrono::{DateTime, Datelike, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

/// Regular trading session of one market
#[derive(Debug, Clone, Copy)]
pub struct MarketSession {
    pub timezone: Tz,
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl MarketSession {
    /// NYSE/Nasdaq regular hours, 09:30-16:00 America/New_York
    pub fn us_equities() -> Self {
        Self {
            timezone: chrono_tz::America::New_York,
            open: hm(9, 30),
            close: hm(16, 0),
        }
    }

    /// Session used for the after-hours refresh, if the market has one
    pub fn for_market(market: MarketType) -> Option<Self> {
        if market.is_us() {
            Some(Self::us_equities())
        } else {
            None
        }
    }

    pub fn is_regular_session<T: TimeZone>(&self, now: &DateTime<T>) -> bool {
        let local = now.with_timezone(&self.timezone);
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let time = local.time();
        time >= self.open && time < self.close
    }

    pub fn is_after_hours<T: TimeZone>(&self, now: &DateTime<T>) -> bool {
        !self.is_regular_session(now)
    }
}

/// True when `market` has an after-hours source and `now` falls outside its session
pub fn in_after_hours_window(market: MarketType, now: DateTime<Utc>) -> bool {
    MarketSession::for_market(market).is_some_and(|session| session.is_after_hours(&now))
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}
