use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};

use crate::config::MarketHoursConfig;
use crate::events::MarketPhase;

/// Trading-hours calendar derived from [`MarketHoursConfig`]. All checks
/// convert the given UTC instant into the exchange timezone first.
#[derive(Debug, Clone)]
pub struct MarketCalendar {
    config: MarketHoursConfig,
}

impl MarketCalendar {
    #[must_use]
    pub fn new(config: MarketHoursConfig) -> Self {
        Self { config }
    }

    /// Whether `date` (in exchange-local terms) is a trading day.
    #[must_use]
    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        self.config.trading_days.contains(&date.weekday()) && !self.config.holidays.contains(&date)
    }

    /// Whether the market is open at the given UTC instant.
    #[must_use]
    pub fn is_open_at(&self, at: DateTime<Utc>) -> bool {
        let local = at.with_timezone(&self.config.timezone);
        if !self.is_trading_day(local.date_naive()) {
            return false;
        }
        let time = local.time();
        time >= self.config.open && time < self.config.close
    }

    #[must_use]
    pub fn phase_at(&self, at: DateTime<Utc>) -> MarketPhase {
        if self.is_open_at(at) {
            MarketPhase::Open
        } else {
            MarketPhase::Closed
        }
    }

    /// Whether the given UTC instant falls at or past the intraday cutoff.
    /// Returns false outside trading days, since there is nothing to square
    /// off when the session never opened.
    #[must_use]
    pub fn is_past_cutoff(&self, at: DateTime<Utc>, cutoff: NaiveTime) -> bool {
        let local = at.with_timezone(&self.config.timezone);
        self.is_trading_day(local.date_naive()) && local.time() >= cutoff
    }
}
