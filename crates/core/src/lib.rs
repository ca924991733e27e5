pub mod calendar;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod events;
pub mod sizing;
pub mod traits;
pub mod types;

pub use calendar::MarketCalendar;
pub use config::{FeedConfig, MarketHoursConfig, TradingConfig, TriggerConfig};
pub use config_loader::ConfigLoader;
pub use error::{BrokerError, EngineError};
pub use events::{Bar, MarketPhase, PriceTick, Timeframe, TrendChanged, TrendDirection, TrendState};
pub use traits::{Brokerage, MarketData, OrderAck, TickStream};
pub use types::{
    BrokerOrder, BrokerOrderStatus, BrokerPosition, CloseReason, Instrument, InstrumentKind,
    IntentStatus, OptionSide, OrderSide, TradeIntent, TriggerKind,
};
