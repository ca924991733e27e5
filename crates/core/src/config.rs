use chrono::{NaiveDate, NaiveTime, Weekday};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::TriggerKind;

/// Per-trigger parameters. Each trigger is independently enabled and
/// carries its own entry/target/stop percentages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// How far (in percent) below the indicator level the price may sit and
    /// still count as an approach.
    #[serde(default)]
    pub percentage_below: f64,
    #[serde(default = "default_target_pct")]
    pub target_pct: f64,
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            percentage_below: 0.0,
            target_pct: default_target_pct(),
            stop_loss_pct: default_stop_loss_pct(),
        }
    }
}

/// Trading-hours window, holiday calendar, and exchange timezone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketHoursConfig {
    #[serde(default = "default_timezone")]
    pub timezone: Tz,
    #[serde(default = "default_market_open")]
    pub open: NaiveTime,
    #[serde(default = "default_market_close")]
    pub close: NaiveTime,
    #[serde(default = "default_trading_days")]
    pub trading_days: Vec<Weekday>,
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,
}

impl Default for MarketHoursConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            open: default_market_open(),
            close: default_market_close(),
            trading_days: default_trading_days(),
            holidays: Vec::new(),
        }
    }
}

/// Feed and reconciliation timing knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Fixed delay between push reconnect attempts. Deliberately not
    /// exponential: the feed is low-volume and fast retries are acceptable.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
    /// Consecutive reconnect failures before an alert is raised.
    #[serde(default = "default_max_reconnect_failures")]
    pub max_reconnect_failures: u32,
    /// Poll-mode interval (market closed or push unavailable).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,
    /// Feed counts as stale once no tick has arrived for this long.
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
    /// Deadline on a single brokerage round-trip. A broker that stops
    /// answering must not park the engine loop.
    #[serde(default = "default_broker_timeout")]
    pub broker_timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: default_reconnect_delay(),
            max_reconnect_failures: default_max_reconnect_failures(),
            poll_interval_secs: default_poll_interval(),
            reconcile_interval_secs: default_reconcile_interval(),
            stale_after_secs: default_stale_after(),
            broker_timeout_secs: default_broker_timeout(),
        }
    }
}

/// Read-only trading configuration, fetched once at `start()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    pub config_id: String,

    /// Underlying index instrument id on the market-data feed.
    pub underlying_id: String,
    pub underlying_symbol: String,

    #[serde(default = "default_ma_short")]
    pub ma_short_period: usize,
    #[serde(default = "default_ma_long")]
    pub ma_long_period: usize,
    #[serde(default = "default_band_std_devs")]
    pub band_std_devs: f64,

    #[serde(default = "default_major_timeframe")]
    pub major_timeframe_mins: u32,
    #[serde(default = "default_minor_timeframe")]
    pub minor_timeframe_mins: u32,

    #[serde(default)]
    pub short_ma: TriggerConfig,
    #[serde(default)]
    pub long_ma: TriggerConfig,
    #[serde(default)]
    pub lower_band: TriggerConfig,

    /// Tie-break order when several triggers fire in the same cycle.
    #[serde(default = "default_trigger_priority")]
    pub trigger_priority: Vec<TriggerKind>,

    #[serde(default = "default_capital_allocation")]
    pub capital_allocation_pct: f64,
    #[serde(default = "default_lot_size")]
    pub lot_size: u32,
    #[serde(default = "default_min_strike_gap")]
    pub min_strike_gap: u32,
    #[serde(default = "default_strike_round_to")]
    pub strike_round_to: u32,
    #[serde(default = "default_tick_size")]
    pub tick_size: Decimal,

    /// Intraday cutoff after which all open positions are squared off.
    #[serde(default = "default_square_off_time")]
    pub square_off_time: NaiveTime,

    /// Flip Call/Put eligibility in the evaluator.
    #[serde(default)]
    pub reverse_signals: bool,

    #[serde(default)]
    pub suspend_call_entries: bool,
    #[serde(default)]
    pub suspend_put_entries: bool,

    #[serde(default)]
    pub market: MarketHoursConfig,
    #[serde(default)]
    pub feed: FeedConfig,
}

impl TradingConfig {
    /// Trigger parameters for a given kind.
    #[must_use]
    pub fn trigger(&self, kind: TriggerKind) -> &TriggerConfig {
        match kind {
            TriggerKind::ShortMa => &self.short_ma,
            TriggerKind::LongMa => &self.long_ma,
            TriggerKind::LowerBand => &self.lower_band,
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_target_pct() -> f64 {
    2.5
}

const fn default_stop_loss_pct() -> f64 {
    50.0
}

fn default_timezone() -> Tz {
    chrono_tz::Asia::Kolkata
}

fn default_market_open() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 15, 0).expect("valid time")
}

fn default_market_close() -> NaiveTime {
    NaiveTime::from_hms_opt(15, 30, 0).expect("valid time")
}

fn default_trading_days() -> Vec<Weekday> {
    vec![
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
    ]
}

const fn default_reconnect_delay() -> u64 {
    2
}

const fn default_max_reconnect_failures() -> u32 {
    5
}

const fn default_poll_interval() -> u64 {
    60
}

const fn default_reconcile_interval() -> u64 {
    5
}

const fn default_stale_after() -> u64 {
    30
}

const fn default_broker_timeout() -> u64 {
    10
}

const fn default_ma_short() -> usize {
    7
}

const fn default_ma_long() -> usize {
    20
}

const fn default_band_std_devs() -> f64 {
    2.0
}

const fn default_major_timeframe() -> u32 {
    15
}

const fn default_minor_timeframe() -> u32 {
    1
}

fn default_trigger_priority() -> Vec<TriggerKind> {
    vec![TriggerKind::ShortMa, TriggerKind::LongMa, TriggerKind::LowerBand]
}

const fn default_capital_allocation() -> f64 {
    16.67
}

const fn default_lot_size() -> u32 {
    75
}

const fn default_min_strike_gap() -> u32 {
    100
}

const fn default_strike_round_to() -> u32 {
    100
}

fn default_tick_size() -> Decimal {
    Decimal::new(5, 2) // 0.05
}

fn default_square_off_time() -> NaiveTime {
    NaiveTime::from_hms_opt(15, 20, 0).expect("valid time")
}
