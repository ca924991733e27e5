use std::collections::HashMap;

use async_trait::async_trait;
use optionbot_core::error::BrokerError;
use optionbot_core::traits::{Brokerage, OrderAck};
use optionbot_core::types::{
    BrokerOrder, BrokerOrderStatus, BrokerPosition, OrderSide, TradeIntent,
};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::info;

/// In-memory brokerage with immediate fills at the intent's entry price.
///
/// Backs historical sessions and tests. Like the real broker, whatever it
/// reports through `list_orders`/`list_positions` is ground truth for the
/// reconciler; the test hooks below exist to script rejection and auth-expiry
/// paths.
pub struct PaperBroker {
    inner: Mutex<State>,
}

struct State {
    cash: Decimal,
    orders: Vec<BrokerOrder>,
    positions: HashMap<String, BrokerPosition>,
    next_order_id: u64,
    auth_expired: bool,
    reject_next: Option<String>,
}

impl Default for PaperBroker {
    fn default() -> Self {
        Self::with_capital(Decimal::from(1_000_000))
    }
}

impl PaperBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capital(cash: Decimal) -> Self {
        Self {
            inner: Mutex::new(State {
                cash,
                orders: Vec::new(),
                positions: HashMap::new(),
                next_order_id: 0,
                auth_expired: false,
                reject_next: None,
            }),
        }
    }

    /// Makes every subsequent call fail with `AuthExpired` until
    /// [`restore_auth`](Self::restore_auth).
    pub async fn expire_auth(&self) {
        self.inner.lock().await.auth_expired = true;
    }

    pub async fn restore_auth(&self) {
        self.inner.lock().await.auth_expired = false;
    }

    /// The next submission is recorded as rejected instead of filled.
    pub async fn reject_next(&self, reason: impl Into<String>) {
        self.inner.lock().await.reject_next = Some(reason.into());
    }

    /// Marks a position to a new last price, recomputing its P&L.
    pub async fn mark_price(&self, trading_symbol: &str, last_price: Decimal) {
        let mut state = self.inner.lock().await;
        if let Some(position) = state.positions.get_mut(trading_symbol) {
            position.last_price = last_price;
            position.pnl = (last_price - position.avg_price) * Decimal::from(position.quantity);
        }
    }
}

impl State {
    fn check_auth(&self) -> Result<(), BrokerError> {
        if self.auth_expired {
            Err(BrokerError::AuthExpired)
        } else {
            Ok(())
        }
    }

    fn next_id(&mut self) -> String {
        self.next_order_id += 1;
        format!("PB-{}", self.next_order_id)
    }
}

#[async_trait]
impl Brokerage for PaperBroker {
    async fn available_capital(&self) -> Result<Decimal, BrokerError> {
        let state = self.inner.lock().await;
        state.check_auth()?;
        Ok(state.cash)
    }

    async fn submit_order(&self, intent: &TradeIntent) -> Result<OrderAck, BrokerError> {
        let mut state = self.inner.lock().await;
        state.check_auth()?;
        let order_id = state.next_id();

        if let Some(reason) = state.reject_next.take() {
            state.orders.push(BrokerOrder {
                order_id,
                correlation_id: Some(intent.id.clone()),
                trading_symbol: intent.instrument.trading_symbol.clone(),
                side: OrderSide::Buy,
                quantity: intent.quantity,
                price: intent.entry_price,
                status: BrokerOrderStatus::Rejected,
            });
            return Err(BrokerError::Rejected(reason));
        }

        info!(
            order_id,
            symbol = %intent.instrument.trading_symbol,
            quantity = intent.quantity,
            price = %intent.entry_price,
            "paper fill"
        );
        state.orders.push(BrokerOrder {
            order_id,
            correlation_id: Some(intent.id.clone()),
            trading_symbol: intent.instrument.trading_symbol.clone(),
            side: OrderSide::Buy,
            quantity: intent.quantity,
            price: intent.entry_price,
            status: BrokerOrderStatus::Complete,
        });

        let position = state
            .positions
            .entry(intent.instrument.trading_symbol.clone())
            .or_insert_with(|| BrokerPosition {
                trading_symbol: intent.instrument.trading_symbol.clone(),
                quantity: 0,
                avg_price: Decimal::ZERO,
                last_price: intent.entry_price,
                pnl: Decimal::ZERO,
            });
        let filled = i64::from(intent.quantity);
        let total = position.quantity + filled;
        if total != 0 {
            position.avg_price = (position.avg_price * Decimal::from(position.quantity)
                + intent.entry_price * Decimal::from(filled))
                / Decimal::from(total);
        }
        position.quantity = total;
        position.last_price = intent.entry_price;
        state.cash -= intent.entry_price * Decimal::from(filled);

        Ok(OrderAck {
            correlation_id: intent.id.clone(),
        })
    }

    async fn list_orders(&self) -> Result<Vec<BrokerOrder>, BrokerError> {
        let state = self.inner.lock().await;
        state.check_auth()?;
        Ok(state.orders.clone())
    }

    async fn list_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        let state = self.inner.lock().await;
        state.check_auth()?;
        Ok(state
            .positions
            .values()
            .filter(|p| p.quantity != 0)
            .cloned()
            .collect())
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError> {
        let mut state = self.inner.lock().await;
        state.check_auth()?;
        let Some(order) = state.orders.iter_mut().find(|o| o.order_id == order_id) else {
            return Err(BrokerError::Rejected(format!("unknown order {order_id}")));
        };
        if order.status == BrokerOrderStatus::Open {
            order.status = BrokerOrderStatus::Cancelled;
        }
        Ok(())
    }

    async fn close_position(&self, trading_symbol: &str) -> Result<(), BrokerError> {
        let mut state = self.inner.lock().await;
        state.check_auth()?;
        let Some(position) = state.positions.remove(trading_symbol) else {
            return Err(BrokerError::Rejected(format!(
                "no position in {trading_symbol}"
            )));
        };
        let order_id = state.next_id();
        let quantity = u32::try_from(position.quantity.unsigned_abs()).unwrap_or(u32::MAX);
        state.cash += position.last_price * Decimal::from(position.quantity);
        state.orders.push(BrokerOrder {
            order_id,
            correlation_id: None,
            trading_symbol: trading_symbol.to_string(),
            side: OrderSide::Sell,
            quantity,
            price: position.last_price,
            status: BrokerOrderStatus::Complete,
        });
        info!(symbol = trading_symbol, "paper position closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optionbot_core::types::{Instrument, InstrumentKind, IntentStatus, OptionSide, TriggerKind};
    use rust_decimal_macros::dec;

    fn intent(symbol: &str, quantity: u32, price: Decimal) -> TradeIntent {
        TradeIntent {
            id: format!("intent-{symbol}"),
            instrument: Instrument {
                id: symbol.to_string(),
                kind: InstrumentKind::Call,
                strike: Some(dec!(22500)),
                expiry: None,
                trading_symbol: symbol.to_string(),
                last_price: price,
            },
            side: OptionSide::Call,
            entry_trigger: Some(TriggerKind::ShortMa),
            entry_price: price,
            target_price: price * dec!(1.025),
            stop_loss_price: price / dec!(2),
            quantity,
            status: IntentStatus::PendingSubmit,
            broker_order_id: None,
            orphaned: false,
            last_price: price,
            unrealized_pnl: Decimal::ZERO,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn fill_creates_order_and_position() {
        let broker = PaperBroker::new();
        let ack = broker
            .submit_order(&intent("NIFTY24JUN22500CE", 75, dec!(100)))
            .await
            .expect("fill");
        assert_eq!(ack.correlation_id, "intent-NIFTY24JUN22500CE");

        let orders = broker.list_orders().await.expect("orders");
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, BrokerOrderStatus::Complete);

        let positions = broker.list_positions().await.expect("positions");
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].quantity, 75);
        assert_eq!(positions[0].avg_price, dec!(100));
    }

    #[tokio::test]
    async fn rejected_submission_leaves_no_position() {
        let broker = PaperBroker::new();
        broker.reject_next("margin shortfall").await;

        let err = broker
            .submit_order(&intent("NIFTY24JUN22500CE", 75, dec!(100)))
            .await
            .expect_err("rejected");
        assert!(matches!(err, BrokerError::Rejected(_)));

        let orders = broker.list_orders().await.expect("orders");
        assert_eq!(orders[0].status, BrokerOrderStatus::Rejected);
        assert!(broker.list_positions().await.expect("positions").is_empty());
    }

    #[tokio::test]
    async fn close_position_records_a_sell() {
        let broker = PaperBroker::new();
        broker
            .submit_order(&intent("NIFTY24JUN22500CE", 75, dec!(100)))
            .await
            .expect("fill");
        broker.mark_price("NIFTY24JUN22500CE", dec!(110)).await;

        broker
            .close_position("NIFTY24JUN22500CE")
            .await
            .expect("closed");
        assert!(broker.list_positions().await.expect("positions").is_empty());

        let orders = broker.list_orders().await.expect("orders");
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[1].side, OrderSide::Sell);
        assert_eq!(orders[1].price, dec!(110));
    }

    #[tokio::test]
    async fn expired_auth_fails_every_call() {
        let broker = PaperBroker::new();
        broker.expire_auth().await;

        assert!(matches!(
            broker.list_orders().await,
            Err(BrokerError::AuthExpired)
        ));
        assert!(matches!(
            broker
                .submit_order(&intent("NIFTY24JUN22500CE", 75, dec!(100)))
                .await,
            Err(BrokerError::AuthExpired)
        ));

        broker.restore_auth().await;
        assert!(broker.list_orders().await.is_ok());
    }

    #[tokio::test]
    async fn fills_debit_and_closes_credit_capital() {
        let broker = PaperBroker::with_capital(dec!(10000));
        broker
            .submit_order(&intent("NIFTY24JUN22500CE", 75, dec!(100)))
            .await
            .expect("fill");
        assert_eq!(broker.available_capital().await.expect("cash"), dec!(2500));

        broker.mark_price("NIFTY24JUN22500CE", dec!(110)).await;
        broker
            .close_position("NIFTY24JUN22500CE")
            .await
            .expect("closed");
        assert_eq!(
            broker.available_capital().await.expect("cash"),
            dec!(10750)
        );
    }

    #[tokio::test]
    async fn mark_price_updates_pnl() {
        let broker = PaperBroker::new();
        broker
            .submit_order(&intent("NIFTY24JUN22500CE", 75, dec!(100)))
            .await
            .expect("fill");
        broker.mark_price("NIFTY24JUN22500CE", dec!(102)).await;

        let positions = broker.list_positions().await.expect("positions");
        assert_eq!(positions[0].pnl, dec!(150));
    }
}
