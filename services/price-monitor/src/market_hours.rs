//! Open/closed phase of the home market

use chrono::{DateTime, Datelike, NaiveTime, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MarketPhase {
    Open,
    Closed,
}

/// Fixed local-time boundaries, in minutes after midnight
#[derive(Debug, Clone, Copy)]
pub struct MarketCalendar {
    timezone: Tz,
    opens_at: u32,
    lunch_starts: u32,
    lunch_ends: u32,
    closes_at: u32,
}

const fn minutes(hour: u32, minute: u32) -> u32 {
    hour * 60 + minute
}

impl MarketCalendar {
    /// A-share session with margins around the auction and close
    pub fn a_shares(timezone: Tz) -> Self {
        Self {
            timezone,
            opens_at: minutes(9, 15),
            lunch_starts: minutes(11, 40),
            lunch_ends: minutes(13, 0),
            closes_at: minutes(15, 10),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn phase_at(&self, now: DateTime<Utc>) -> MarketPhase {
        let local = now.with_timezone(&self.timezone);
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return MarketPhase::Closed;
        }

        let time: NaiveTime = local.time();
        let minute = minutes(time.hour(), time.minute());
        let closed = minute < self.opens_at
            || minute > self.closes_at
            || (minute > self.lunch_starts && minute < self.lunch_ends);

        if closed {
            MarketPhase::Closed
        } else {
            MarketPhase::Open
        }
    }
}

impl Default for MarketCalendar {
    fn default() -> Self {
        Self::a_shares(chrono_tz::Asia::Shanghai)
    }
}
