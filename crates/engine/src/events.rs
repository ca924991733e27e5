use chrono::{DateTime, Utc};
use optionbot_core::events::{MarketPhase, TrendState};
use optionbot_core::types::OptionSide;
use optionbot_market::switch::FeedSnapshot;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::commands::{EngineMode, EngineState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertKind {
    Session,
    Feed,
    Trade,
    Reconcile,
}

/// One operator-facing notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Why the session sits in Paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PauseCause {
    Manual,
    /// Forced by broker auth expiry; resume stays rejected until the
    /// operator re-authenticates.
    AuthExpired,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Performance {
    pub realized_pnl: Decimal,
    pub open_pnl: Decimal,
    pub trades: u32,
}

/// Display row for one open intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionInfo {
    pub trading_symbol: String,
    pub side: OptionSide,
    pub quantity: u32,
    pub entry_price: Decimal,
    pub last_price: Decimal,
    pub target_price: Decimal,
    pub stop_loss_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub orphaned: bool,
}

/// Point-in-time engine snapshot, published over `watch` and answered to
/// `GetStatus`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub state: EngineState,
    pub mode: Option<EngineMode>,
    pub pause_cause: Option<PauseCause>,
    pub market_phase: MarketPhase,
    pub trend_major: TrendState,
    pub trend_minor: TrendState,
    pub open_positions: Vec<PositionInfo>,
    pub untracked: Vec<String>,
    pub performance: Performance,
    pub alerts: Vec<Alert>,
    pub feed: Option<FeedSnapshot>,
}

impl Default for EngineStatus {
    fn default() -> Self {
        Self {
            state: EngineState::Stopped,
            mode: None,
            pause_cause: None,
            market_phase: MarketPhase::Closed,
            trend_major: TrendState::default(),
            trend_minor: TrendState::default(),
            open_positions: Vec::new(),
            untracked: Vec::new(),
            performance: Performance::default(),
            alerts: Vec::new(),
            feed: None,
        }
    }
}
