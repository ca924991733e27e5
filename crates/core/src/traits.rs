use crate::error::BrokerError;
use crate::events::PriceTick;
use crate::types::{BrokerOrder, BrokerPosition, TradeIntent};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// A live sequence of ticks from a push subscription or a replay source.
#[async_trait]
pub trait TickStream: Send {
    /// Next tick, or `None` when the stream has ended.
    async fn next_tick(&mut self) -> Result<Option<PriceTick>>;
}

/// Market-data collaborator. Instruments are keyed by an opaque id.
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn subscribe(&self, instrument_ids: &[String]) -> Result<Box<dyn TickStream>>;
    async fn poll(&self, instrument_ids: &[String]) -> Result<Vec<PriceTick>>;
}

/// Acknowledgement for a submitted order, echoing the correlation id the
/// reconciler later matches broker records against.
#[derive(Debug, Clone)]
pub struct OrderAck {
    pub correlation_id: String,
}

/// Brokerage collaborator. All records it returns are ground truth.
#[async_trait]
pub trait Brokerage: Send + Sync {
    /// Cash available for new positions; sizing applies its allocation
    /// percentage to this.
    async fn available_capital(&self) -> Result<Decimal, BrokerError>;
    async fn submit_order(&self, intent: &TradeIntent) -> Result<OrderAck, BrokerError>;
    async fn list_orders(&self) -> Result<Vec<BrokerOrder>, BrokerError>;
    async fn list_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError>;
    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError>;
    async fn close_position(&self, trading_symbol: &str) -> Result<(), BrokerError>;
}
