use std::cmp::Ordering;
use std::collections::VecDeque;

use optionbot_core::events::{Bar, Timeframe, TrendChanged, TrendDirection, TrendState};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

/// Dual moving-average trend detector with Bollinger bands for one timeframe.
///
/// Keeps a fixed-capacity ring of closes (the long period). Direction is Up
/// when the short MA is strictly above the long MA, Down when strictly below;
/// equality holds the previous direction. `TrendChanged` is edge-triggered:
/// it fires only on the first bar whose computed direction differs from the
/// previous one. Nothing fires while the ring is still warming up.
pub struct TrendDetector {
    timeframe: Timeframe,
    short_period: usize,
    long_period: usize,
    band_std_devs: f64,
    closes: VecDeque<Decimal>,
    state: TrendState,
}

impl TrendDetector {
    #[must_use]
    pub fn new(
        timeframe: Timeframe,
        short_period: usize,
        long_period: usize,
        band_std_devs: f64,
    ) -> Self {
        Self {
            timeframe,
            short_period,
            long_period,
            band_std_devs,
            closes: VecDeque::with_capacity(long_period + 1),
            state: TrendState::default(),
        }
    }

    /// Current indicator snapshot. Callers clone what they need; only this
    /// detector mutates it.
    #[must_use]
    pub fn state(&self) -> &TrendState {
        &self.state
    }

    /// Folds one completed bar into the ring and recomputes indicators.
    /// Returns an event only when the trend direction actually flipped.
    pub fn on_bar(&mut self, bar: &Bar) -> Option<TrendChanged> {
        self.closes.push_back(bar.close);
        if self.closes.len() > self.long_period {
            self.closes.pop_front();
        }

        if self.closes.len() >= self.short_period {
            self.state.short_ma = Some(self.sma(self.short_period));
        }
        if self.closes.len() < self.long_period {
            return None;
        }

        let short = self.sma(self.short_period);
        let long = self.sma(self.long_period);
        self.state.short_ma = Some(short);
        self.state.long_ma = Some(long);
        if let Some(offset) = self.band_offset() {
            self.state.lower_band = Some(long - offset);
            self.state.upper_band = Some(long + offset);
        }

        let direction = match short.cmp(&long) {
            Ordering::Greater => TrendDirection::Up,
            Ordering::Less => TrendDirection::Down,
            Ordering::Equal => self.state.direction,
        };

        if direction == self.state.direction {
            return None;
        }

        debug!(
            timeframe = %self.timeframe,
            ?direction,
            %short,
            %long,
            "trend direction changed"
        );
        self.state.direction = direction;
        self.state.last_changed_at = Some(bar.start);
        Some(TrendChanged {
            timeframe: self.timeframe,
            direction,
            at: bar.start,
        })
    }

    fn sma(&self, period: usize) -> Decimal {
        let sum: Decimal = self.closes.iter().rev().take(period).copied().sum();
        sum / Decimal::from(period as u64)
    }

    /// Band half-width: k * population stddev over the long window, done in
    /// f64 and converted back.
    fn band_offset(&self) -> Option<Decimal> {
        let values: Vec<f64> = self
            .closes
            .iter()
            .filter_map(|c| c.to_f64())
            .collect();
        if values.len() != self.long_period {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Decimal::from_f64_retain(self.band_std_devs * variance.sqrt())
    }
}
