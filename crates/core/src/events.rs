use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The two bar intervals analyzed in parallel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Timeframe {
    Major,
    Minor,
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Major => write!(f, "major"),
            Self::Minor => write!(f, "minor"),
        }
    }
}

/// A single traded price observation.
///
/// `ts_exchange` drives all signal timing; `ts_received` is only used to
/// measure feed freshness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTick {
    pub instrument_id: String,
    pub price: Decimal,
    pub ts_exchange: DateTime<Utc>,
    pub ts_received: DateTime<Utc>,
}

/// A completed OHLC bar for one timeframe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub instrument_id: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// Start of the bar interval (floored to the interval boundary).
    pub start: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum TrendDirection {
    Up,
    Down,
    #[default]
    Unknown,
}

/// Indicator snapshot for one timeframe. Owned and mutated only by the
/// trend detector for that timeframe; everyone else reads a copy.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TrendState {
    pub short_ma: Option<Decimal>,
    pub long_ma: Option<Decimal>,
    pub lower_band: Option<Decimal>,
    pub upper_band: Option<Decimal>,
    pub direction: TrendDirection,
    /// Updated exactly when `direction` changes, never on every bar.
    pub last_changed_at: Option<DateTime<Utc>>,
}

/// Edge-triggered crossover event: fires on the first bar whose direction
/// differs from the previous bar's computed direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendChanged {
    pub timeframe: Timeframe,
    pub direction: TrendDirection,
    pub at: DateTime<Utc>,
}

/// Session-monitor output consumed by the data-acquisition switch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MarketPhase {
    Open,
    Closed,
}
