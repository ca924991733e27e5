use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Option side traded by the engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OptionSide {
    Call,
    Put,
}

impl OptionSide {
    /// The opposite side (used by the reverse-signals flag).
    #[must_use]
    pub const fn flipped(self) -> Self {
        match self {
            Self::Call => Self::Put,
            Self::Put => Self::Call,
        }
    }
}

impl std::fmt::Display for OptionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // NSE option suffix convention.
        match self {
            Self::Call => write!(f, "CE"),
            Self::Put => write!(f, "PE"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InstrumentKind {
    Index,
    Call,
    Put,
}

/// A tradable instrument, recomputed from spot and the options universe on
/// every evaluator cycle. Never patched in place — stale strikes drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub id: String,
    pub kind: InstrumentKind,
    pub strike: Option<Decimal>,
    pub expiry: Option<NaiveDate>,
    pub trading_symbol: String,
    pub last_price: Decimal,
}

/// Entry trigger kinds, in their default priority order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    ShortMa,
    LongMa,
    LowerBand,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShortMa => write!(f, "short_ma"),
            Self::LongMa => write!(f, "long_ma"),
            Self::LowerBand => write!(f, "lower_band"),
        }
    }
}

/// Why an intent left the Open state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CloseReason {
    Target,
    StopLoss,
    SquareOff,
    Rejected,
    Manual,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Target => write!(f, "target"),
            Self::StopLoss => write!(f, "stop_loss"),
            Self::SquareOff => write!(f, "square_off"),
            Self::Rejected => write!(f, "rejected"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum IntentStatus {
    PendingSubmit,
    Open,
    Closed(CloseReason),
}

/// A locally-initiated trade. The engine owns the intent (target, stop,
/// originating trigger); the broker owns fill state, price, and quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeIntent {
    /// Also serves as the client-supplied correlation id on submission.
    pub id: String,
    pub instrument: Instrument,
    pub side: OptionSide,
    /// `None` for positions adopted from the broker, which the engine never
    /// initiated.
    pub entry_trigger: Option<TriggerKind>,
    pub entry_price: Decimal,
    pub target_price: Decimal,
    pub stop_loss_price: Decimal,
    pub quantity: u32,
    pub status: IntentStatus,
    pub broker_order_id: Option<String>,
    /// Open locally but missing from the broker's position set.
    pub orphaned: bool,
    pub last_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub created_at: DateTime<Utc>,
}

impl TradeIntent {
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == IntentStatus::Open
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BrokerOrderStatus {
    Open,
    Complete,
    Rejected,
    Cancelled,
}

/// Broker-reported order record. Read-only ground truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerOrder {
    pub order_id: String,
    /// Client correlation id echoed back by the broker, when present.
    pub correlation_id: Option<String>,
    pub trading_symbol: String,
    pub side: OrderSide,
    pub quantity: u32,
    pub price: Decimal,
    pub status: BrokerOrderStatus,
}

/// Broker-reported position record. Read-only ground truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub trading_symbol: String,
    pub quantity: i64,
    pub avg_price: Decimal,
    pub last_price: Decimal,
    pub pnl: Decimal,
}
