use std::collections::HashSet;

use chrono::{DateTime, Utc};
use optionbot_core::types::{
    BrokerOrder, BrokerOrderStatus, BrokerPosition, CloseReason, Instrument, InstrumentKind,
    IntentStatus, OptionSide, TradeIntent,
};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

/// What changed during one reconciliation pass. Applying the same broker
/// snapshot again yields a quiet outcome.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    pub opened: Vec<String>,
    pub rejected: Vec<String>,
    pub orphaned: Vec<String>,
    pub untracked: Vec<String>,
    pub shorts: Vec<String>,
}

impl ReconcileOutcome {
    #[must_use]
    pub fn is_quiet(&self) -> bool {
        self.opened.is_empty()
            && self.rejected.is_empty()
            && self.orphaned.is_empty()
            && self.untracked.is_empty()
            && self.shorts.is_empty()
    }
}

/// Join of local intents and broker ground truth, for status snapshots.
#[derive(Debug, Clone, Default)]
pub struct ReconciledView {
    pub intents: Vec<TradeIntent>,
    pub untracked: Vec<BrokerPosition>,
}

/// Owns every trade intent after submission and merges in broker state.
///
/// The broker is authoritative for fills, prices, and quantities; local
/// state is authoritative for intent (target, stop, originating trigger).
/// Inconsistencies are surfaced, never auto-corrected: an open intent with
/// no broker position is flagged orphaned and kept, and a broker position
/// with no intent stays untracked until an operator adopts it. Short
/// positions never come out of this engine; they are reported once and
/// otherwise ignored.
#[derive(Default)]
pub struct Reconciler {
    intents: Vec<TradeIntent>,
    untracked: Vec<BrokerPosition>,
    shorts: HashSet<String>,
}

impl Reconciler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, intent: TradeIntent) {
        debug!(id = %intent.id, symbol = %intent.instrument.trading_symbol, "tracking intent");
        self.intents.push(intent);
    }

    #[must_use]
    pub fn intents(&self) -> &[TradeIntent] {
        &self.intents
    }

    pub fn open_intents(&self) -> impl Iterator<Item = &TradeIntent> {
        self.intents.iter().filter(|i| i.is_open())
    }

    /// True while any intent could still turn into (or is) a position.
    #[must_use]
    pub fn has_open_or_pending(&self) -> bool {
        self.intents
            .iter()
            .any(|i| matches!(i.status, IntentStatus::Open | IntentStatus::PendingSubmit))
    }

    #[must_use]
    pub fn view(&self) -> ReconciledView {
        ReconciledView {
            intents: self.intents.clone(),
            untracked: self.untracked.clone(),
        }
    }

    /// Closes an intent locally. Returns the closed intent for P&L
    /// accounting.
    pub fn mark_closed(&mut self, id: &str, reason: CloseReason) -> Option<&TradeIntent> {
        let intent = self.intents.iter_mut().find(|i| i.id == id)?;
        intent.status = IntentStatus::Closed(reason);
        info!(id, %reason, "intent closed");
        Some(intent)
    }

    /// Refreshes the last price of open intents on the given instrument.
    /// Returns true if anything was touched.
    pub fn update_price(&mut self, instrument_id: &str, price: Decimal) -> bool {
        let mut touched = false;
        for intent in &mut self.intents {
            if intent.is_open() && intent.instrument.id == instrument_id {
                intent.last_price = price;
                intent.unrealized_pnl =
                    (price - intent.entry_price) * Decimal::from(intent.quantity);
                touched = true;
            }
        }
        touched
    }

    /// Merges one broker snapshot. Idempotent: re-applying an unchanged
    /// snapshot changes nothing and reports nothing.
    pub fn apply(&mut self, orders: &[BrokerOrder], positions: &[BrokerPosition]) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();

        for intent in &mut self.intents {
            // An intent opened here falls straight through to the position
            // refresh below, so one pass fully absorbs one snapshot.
            let mut just_opened = false;
            if intent.status == IntentStatus::PendingSubmit {
                if let Some(order) = orders
                    .iter()
                    .find(|o| o.correlation_id.as_deref() == Some(intent.id.as_str()))
                {
                    match order.status {
                        BrokerOrderStatus::Complete | BrokerOrderStatus::Open => {
                            intent.status = IntentStatus::Open;
                            intent.broker_order_id = Some(order.order_id.clone());
                            intent.entry_price = order.price;
                            outcome.opened.push(intent.id.clone());
                            just_opened = true;
                        }
                        BrokerOrderStatus::Rejected | BrokerOrderStatus::Cancelled => {
                            intent.status = IntentStatus::Closed(CloseReason::Rejected);
                            intent.broker_order_id = Some(order.order_id.clone());
                            outcome.rejected.push(intent.id.clone());
                        }
                    }
                }
            }
            if intent.status == IntentStatus::Open {
                match positions.iter().find(|p| {
                    p.trading_symbol == intent.instrument.trading_symbol && p.quantity != 0
                }) {
                    Some(position) => {
                        if intent.orphaned {
                            info!(id = %intent.id, "orphaned intent matched a position again");
                            intent.orphaned = false;
                        }
                        // Broker wins on quantity and price. A short
                        // quantity can't be ours; keep the local one.
                        match u32::try_from(position.quantity) {
                            Ok(quantity) => intent.quantity = quantity,
                            Err(_) => warn!(
                                id = %intent.id,
                                quantity = position.quantity,
                                "short broker quantity ignored"
                            ),
                        }
                        intent.last_price = position.last_price;
                        intent.unrealized_pnl = (position.last_price - intent.entry_price)
                            * Decimal::from(intent.quantity);
                    }
                    // A fill can show up one snapshot before its position
                    // does; give a freshly opened intent that grace.
                    None if !intent.orphaned && !just_opened => {
                        warn!(id = %intent.id, "open intent has no broker position");
                        intent.orphaned = true;
                        outcome.orphaned.push(intent.id.clone());
                    }
                    None => {}
                }
            }
        }

        let tracked: HashSet<&str> = self
            .intents
            .iter()
            .filter(|i| matches!(i.status, IntentStatus::Open | IntentStatus::PendingSubmit))
            .map(|i| i.instrument.trading_symbol.as_str())
            .collect();
        let mut untracked = Vec::new();
        let mut shorts = HashSet::new();
        for position in positions.iter().filter(|p| p.quantity != 0) {
            if tracked.contains(position.trading_symbol.as_str()) {
                continue;
            }
            if position.quantity < 0 {
                if !self.shorts.contains(position.trading_symbol.as_str()) {
                    warn!(symbol = %position.trading_symbol, "short broker position ignored");
                    outcome.shorts.push(position.trading_symbol.clone());
                }
                shorts.insert(position.trading_symbol.clone());
                continue;
            }
            if !self
                .untracked
                .iter()
                .any(|p| p.trading_symbol == position.trading_symbol)
            {
                outcome.untracked.push(position.trading_symbol.clone());
            }
            untracked.push(position.clone());
        }
        self.untracked = untracked;
        self.shorts = shorts;

        outcome
    }

    /// Operator adoption of an untracked broker position. The adopted intent
    /// carries no entry trigger; target and stop come from the caller.
    pub fn adopt_untracked(
        &mut self,
        trading_symbol: &str,
        target_price: Decimal,
        stop_loss_price: Decimal,
        now: DateTime<Utc>,
    ) -> Option<&TradeIntent> {
        let idx = self
            .untracked
            .iter()
            .position(|p| p.trading_symbol == trading_symbol)?;
        let position = self.untracked.remove(idx);

        let side = if trading_symbol.ends_with("PE") {
            OptionSide::Put
        } else {
            OptionSide::Call
        };
        let quantity = u32::try_from(position.quantity).unwrap_or(0);
        let intent = TradeIntent {
            id: format!("adopted-{trading_symbol}"),
            instrument: Instrument {
                id: trading_symbol.to_string(),
                kind: match side {
                    OptionSide::Call => InstrumentKind::Call,
                    OptionSide::Put => InstrumentKind::Put,
                },
                strike: None,
                expiry: None,
                trading_symbol: trading_symbol.to_string(),
                last_price: position.last_price,
            },
            side,
            entry_trigger: None,
            entry_price: position.avg_price,
            target_price,
            stop_loss_price,
            quantity,
            status: IntentStatus::Open,
            broker_order_id: None,
            orphaned: false,
            last_price: position.last_price,
            unrealized_pnl: position.pnl,
            created_at: now,
        };
        info!(symbol = trading_symbol, "adopted untracked position");
        self.intents.push(intent);
        self.intents.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optionbot_core::types::{OrderSide, TriggerKind};
    use rust_decimal_macros::dec;

    fn intent(id: &str, symbol: &str) -> TradeIntent {
        TradeIntent {
            id: id.to_string(),
            instrument: Instrument {
                id: symbol.to_string(),
                kind: InstrumentKind::Call,
                strike: Some(dec!(22500)),
                expiry: None,
                trading_symbol: symbol.to_string(),
                last_price: dec!(100),
            },
            side: OptionSide::Call,
            entry_trigger: Some(TriggerKind::ShortMa),
            entry_price: dec!(100),
            target_price: dec!(102.50),
            stop_loss_price: dec!(50),
            quantity: 75,
            status: IntentStatus::PendingSubmit,
            broker_order_id: None,
            orphaned: false,
            last_price: dec!(100),
            unrealized_pnl: Decimal::ZERO,
            created_at: Utc::now(),
        }
    }

    fn order(correlation_id: &str, symbol: &str, status: BrokerOrderStatus) -> BrokerOrder {
        BrokerOrder {
            order_id: format!("OB-{correlation_id}"),
            correlation_id: Some(correlation_id.to_string()),
            trading_symbol: symbol.to_string(),
            side: OrderSide::Buy,
            quantity: 75,
            price: dec!(101),
            status,
        }
    }

    fn position(symbol: &str, quantity: i64, last: Decimal) -> BrokerPosition {
        BrokerPosition {
            trading_symbol: symbol.to_string(),
            quantity,
            avg_price: dec!(101),
            last_price: last,
            pnl: (last - dec!(101)) * Decimal::from(quantity),
        }
    }

    #[test]
    fn pending_intent_opens_by_correlation_id() {
        let mut rec = Reconciler::new();
        rec.track(intent("i1", "NIFTY24JUN22500CE"));

        let orders = [order("i1", "NIFTY24JUN22500CE", BrokerOrderStatus::Complete)];
        let positions = [position("NIFTY24JUN22500CE", 75, dec!(103))];
        let outcome = rec.apply(&orders, &positions);

        assert_eq!(outcome.opened, vec!["i1".to_string()]);
        let tracked = &rec.intents()[0];
        assert_eq!(tracked.status, IntentStatus::Open);
        assert_eq!(tracked.broker_order_id.as_deref(), Some("OB-i1"));
        // Broker price wins over the local estimate, and the position
        // refresh lands in the same pass as the open.
        assert_eq!(tracked.entry_price, dec!(101));
        assert_eq!(tracked.last_price, dec!(103));
        assert_eq!(tracked.unrealized_pnl, dec!(150));
    }

    #[test]
    fn rejected_order_closes_intent_and_frees_refire() {
        let mut rec = Reconciler::new();
        rec.track(intent("i1", "NIFTY24JUN22500CE"));

        let orders = [order("i1", "NIFTY24JUN22500CE", BrokerOrderStatus::Rejected)];
        let outcome = rec.apply(&orders, &[]);

        assert_eq!(outcome.rejected, vec!["i1".to_string()]);
        assert_eq!(
            rec.intents()[0].status,
            IntentStatus::Closed(CloseReason::Rejected)
        );
        assert!(!rec.has_open_or_pending());
    }

    #[test]
    fn missing_position_flags_orphan_once_and_keeps_intent() {
        let mut rec = Reconciler::new();
        rec.track(intent("i1", "NIFTY24JUN22500CE"));
        rec.apply(
            &[order("i1", "NIFTY24JUN22500CE", BrokerOrderStatus::Complete)],
            &[position("NIFTY24JUN22500CE", 75, dec!(103))],
        );

        let first = rec.apply(&[], &[]);
        assert_eq!(first.orphaned, vec!["i1".to_string()]);
        assert!(rec.intents()[0].orphaned);
        assert!(rec.intents()[0].is_open());

        // Re-applying the same empty snapshot reports nothing new.
        let second = rec.apply(&[], &[]);
        assert!(second.is_quiet());

        // The position reappearing clears the flag.
        rec.apply(&[], &[position("NIFTY24JUN22500CE", 75, dec!(104))]);
        assert!(!rec.intents()[0].orphaned);
    }

    #[test]
    fn reconciliation_is_idempotent_for_unchanged_snapshot() {
        let mut rec = Reconciler::new();
        rec.track(intent("i1", "NIFTY24JUN22500CE"));
        let orders = [order("i1", "NIFTY24JUN22500CE", BrokerOrderStatus::Complete)];
        let positions = [position("NIFTY24JUN22500CE", 75, dec!(103))];

        let first = rec.apply(&orders, &positions);
        assert!(!first.is_quiet());
        let view_after_first = rec.view();
        assert_eq!(view_after_first.intents[0].unrealized_pnl, dec!(150));

        let second = rec.apply(&orders, &positions);
        assert!(second.is_quiet());
        let view_after_second = rec.view();
        assert_eq!(
            view_after_first.intents[0].unrealized_pnl,
            view_after_second.intents[0].unrealized_pnl
        );
        assert_eq!(view_after_first.untracked.len(), view_after_second.untracked.len());
    }

    #[test]
    fn untracked_position_is_surfaced_but_never_auto_adopted() {
        let mut rec = Reconciler::new();
        let positions = [position("NIFTY24JUN22400PE", 75, dec!(80))];

        let outcome = rec.apply(&[], &positions);
        assert_eq!(outcome.untracked, vec!["NIFTY24JUN22400PE".to_string()]);
        assert!(rec.intents().is_empty());
        assert_eq!(rec.view().untracked.len(), 1);

        // Reported once, not on every pass.
        assert!(rec.apply(&[], &positions).is_quiet());
    }

    #[test]
    fn adoption_is_an_explicit_operator_action() {
        let mut rec = Reconciler::new();
        rec.apply(&[], &[position("NIFTY24JUN22400PE", 75, dec!(80))]);

        let adopted = rec
            .adopt_untracked("NIFTY24JUN22400PE", dec!(90), dec!(40), Utc::now())
            .expect("adopted")
            .clone();
        assert_eq!(adopted.side, OptionSide::Put);
        assert_eq!(adopted.entry_trigger, None);
        assert_eq!(adopted.entry_price, dec!(101));
        assert_eq!(adopted.status, IntentStatus::Open);
        assert!(rec.view().untracked.is_empty());
    }

    #[test]
    fn broker_quantity_wins_over_local() {
        let mut rec = Reconciler::new();
        rec.track(intent("i1", "NIFTY24JUN22500CE"));
        rec.apply(
            &[order("i1", "NIFTY24JUN22500CE", BrokerOrderStatus::Complete)],
            &[position("NIFTY24JUN22500CE", 150, dec!(103))],
        );
        assert_eq!(rec.intents()[0].quantity, 150);
    }

    #[test]
    fn short_position_is_reported_once_and_never_adoptable() {
        let mut rec = Reconciler::new();
        let positions = [position("NIFTY24JUN22400PE", -75, dec!(80))];

        let outcome = rec.apply(&[], &positions);
        assert_eq!(outcome.shorts, vec!["NIFTY24JUN22400PE".to_string()]);
        assert!(outcome.untracked.is_empty());
        assert!(rec.view().untracked.is_empty());

        assert!(rec.apply(&[], &positions).is_quiet());
        assert!(rec
            .adopt_untracked("NIFTY24JUN22400PE", dec!(90), dec!(40), Utc::now())
            .is_none());
    }

    #[test]
    fn short_quantity_does_not_clobber_open_intent() {
        let mut rec = Reconciler::new();
        rec.track(intent("i1", "NIFTY24JUN22500CE"));
        let orders = [order("i1", "NIFTY24JUN22500CE", BrokerOrderStatus::Complete)];
        rec.apply(&orders, &[position("NIFTY24JUN22500CE", 75, dec!(103))]);

        rec.apply(&orders, &[position("NIFTY24JUN22500CE", -75, dec!(104))]);
        let tracked = &rec.intents()[0];
        assert_eq!(tracked.quantity, 75);
        // Broker price still wins.
        assert_eq!(tracked.last_price, dec!(104));
    }
}
