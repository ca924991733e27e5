use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use optionbot_core::events::{Bar, PriceTick};

/// Folds ticks into fixed-interval OHLC bars for one instrument.
///
/// Bar boundaries are floored to the interval (a 10:07:32 tick on a 5-minute
/// builder lands in the 10:05 bar). Ticks whose exchange timestamp is not
/// strictly newer than the last accepted tick are dropped, so duplicates and
/// out-of-order deliveries never corrupt a bar.
pub struct BarBuilder {
    instrument_id: String,
    interval_secs: i64,
    current: Option<WorkingBar>,
    last_exchange_ts: Option<DateTime<Utc>>,
}

struct WorkingBar {
    start: DateTime<Utc>,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
}

impl BarBuilder {
    #[must_use]
    pub fn new(instrument_id: impl Into<String>, interval_mins: u32) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            interval_secs: i64::from(interval_mins) * 60,
            current: None,
            last_exchange_ts: None,
        }
    }

    /// Feeds one tick. Returns the previous bar when this tick opens a new
    /// interval; returns `None` while a bar is still forming.
    pub fn on_tick(&mut self, tick: &PriceTick) -> Option<Bar> {
        if tick.instrument_id != self.instrument_id {
            return None;
        }
        if let Some(last) = self.last_exchange_ts {
            if tick.ts_exchange <= last {
                tracing::trace!(
                    instrument_id = %self.instrument_id,
                    ts = %tick.ts_exchange,
                    "dropping stale or duplicate tick"
                );
                return None;
            }
        }
        self.last_exchange_ts = Some(tick.ts_exchange);

        let start = self.floor_to_interval(tick.ts_exchange);
        match self.current.as_mut() {
            None => {
                self.current = Some(WorkingBar::open_at(start, tick.price));
                None
            }
            Some(working) if working.start == start => {
                working.apply(tick.price);
                None
            }
            Some(_) => {
                let completed = self.current.take().map(|w| w.finish(&self.instrument_id));
                self.current = Some(WorkingBar::open_at(start, tick.price));
                completed
            }
        }
    }

    /// The bar currently forming, if any. Used for status snapshots only;
    /// signals wait for completed bars.
    #[must_use]
    pub fn forming(&self) -> Option<Bar> {
        self.current.as_ref().map(|w| Bar {
            instrument_id: self.instrument_id.clone(),
            open: w.open,
            high: w.high,
            low: w.low,
            close: w.close,
            start: w.start,
        })
    }

    fn floor_to_interval(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let secs = ts.timestamp();
        let floored = secs - secs.rem_euclid(self.interval_secs);
        DateTime::from_timestamp(floored, 0).unwrap_or(ts)
    }
}

impl WorkingBar {
    fn open_at(start: DateTime<Utc>, price: Decimal) -> Self {
        Self {
            start,
            open: price,
            high: price,
            low: price,
            close: price,
        }
    }

    fn apply(&mut self, price: Decimal) {
        if price > self.high {
            self.high = price;
        }
        if price < self.low {
            self.low = price;
        }
        self.close = price;
    }

    fn finish(self, instrument_id: &str) -> Bar {
        Bar {
            instrument_id: instrument_id.to_owned(),
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            start: self.start,
        }
    }
}
