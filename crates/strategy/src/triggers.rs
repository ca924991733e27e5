use chrono::{DateTime, Utc};
use optionbot_core::config::TradingConfig;
use optionbot_core::events::{TrendDirection, TrendState};
use optionbot_core::sizing::align_to_tick;
use optionbot_core::types::{
    Instrument, IntentStatus, OptionSide, TradeIntent, TriggerKind,
};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

/// Inputs for one evaluation cycle. Built from detector snapshots and the
/// session's suspension flags once per completed minor bar.
pub struct EvalContext<'a> {
    /// Close of the minor bar that triggered this cycle.
    pub spot: Decimal,
    pub major: &'a TrendState,
    pub minor: &'a TrendState,
    pub suspend_call_entries: bool,
    pub suspend_put_entries: bool,
    /// An open or pending intent already exists for the underlying.
    pub has_open_position: bool,
}

/// Decision output: which side to buy and which trigger fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntrySignal {
    pub side: OptionSide,
    pub trigger: TriggerKind,
}

/// Entry-trigger evaluator.
///
/// A trigger fires when the major trend picks a side, the spot sits at or
/// just below the trigger's indicator level on the minor timeframe, the side
/// is not suspended, and no position is already open. Triggers are checked
/// in the configured priority order and at most one signal is produced per
/// cycle.
pub struct TriggerEvaluator {
    config: TradingConfig,
}

impl TriggerEvaluator {
    #[must_use]
    pub fn new(config: TradingConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> Option<EntrySignal> {
        if ctx.has_open_position {
            return None;
        }

        let side = match ctx.major.direction {
            TrendDirection::Up => OptionSide::Call,
            TrendDirection::Down => OptionSide::Put,
            TrendDirection::Unknown => return None,
        };
        let side = if self.config.reverse_signals {
            side.flipped()
        } else {
            side
        };

        let suspended = match side {
            OptionSide::Call => ctx.suspend_call_entries,
            OptionSide::Put => ctx.suspend_put_entries,
        };
        if suspended {
            debug!(%side, "entry suppressed: side suspended");
            return None;
        }

        for kind in &self.config.trigger_priority {
            let params = self.config.trigger(*kind);
            if !params.enabled {
                continue;
            }
            let Some(level) = level_for(ctx.minor, *kind) else {
                continue;
            };
            if approaches(ctx.spot, level, params.percentage_below) {
                debug!(trigger = %kind, %side, spot = %ctx.spot, %level, "entry trigger fired");
                return Some(EntrySignal {
                    side,
                    trigger: *kind,
                });
            }
        }
        None
    }

    /// Materializes a fired signal into a trade intent. Both sides are long
    /// premium buys, so the target sits above the entry and the stop below,
    /// both aligned down to the exchange tick.
    #[must_use]
    pub fn build_intent(
        &self,
        id: String,
        signal: EntrySignal,
        instrument: Instrument,
        entry_price: Decimal,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> TradeIntent {
        let params = self.config.trigger(signal.trigger);
        let target =
            entry_price * (Decimal::ONE_HUNDRED + pct(params.target_pct)) / Decimal::ONE_HUNDRED;
        let stop =
            entry_price * (Decimal::ONE_HUNDRED - pct(params.stop_loss_pct)) / Decimal::ONE_HUNDRED;
        TradeIntent {
            id,
            instrument,
            side: signal.side,
            entry_trigger: Some(signal.trigger),
            entry_price,
            target_price: align_to_tick(target, self.config.tick_size),
            stop_loss_price: align_to_tick(stop, self.config.tick_size),
            quantity,
            status: IntentStatus::PendingSubmit,
            broker_order_id: None,
            orphaned: false,
            last_price: entry_price,
            unrealized_pnl: Decimal::ZERO,
            created_at: now,
        }
    }
}

fn level_for(minor: &TrendState, kind: TriggerKind) -> Option<Decimal> {
    match kind {
        TriggerKind::ShortMa => minor.short_ma,
        TriggerKind::LongMa => minor.long_ma,
        TriggerKind::LowerBand => minor.lower_band,
    }
}

/// Spot counts as approaching a level when it sits at the level or within
/// `percentage_below` percent beneath it. Above the level never fires.
fn approaches(spot: Decimal, level: Decimal, percentage_below: f64) -> bool {
    if spot > level {
        return false;
    }
    let floor = level * (Decimal::ONE_HUNDRED - pct(percentage_below)) / Decimal::ONE_HUNDRED;
    spot >= floor
}

fn pct(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use optionbot_core::types::InstrumentKind;
    use rust_decimal_macros::dec;

    fn config() -> TradingConfig {
        let mut config: TradingConfig = serde_json::from_value(serde_json::json!({
            "config_id": "test",
            "underlying_id": "256265",
            "underlying_symbol": "NIFTY 50"
        }))
        .expect("config parses");
        config.short_ma.percentage_below = 1.0;
        config.long_ma.percentage_below = 1.0;
        config.lower_band.percentage_below = 1.0;
        config
    }

    fn trend(direction: TrendDirection) -> TrendState {
        TrendState {
            short_ma: Some(dec!(100)),
            long_ma: Some(dec!(95)),
            lower_band: Some(dec!(90)),
            upper_band: Some(dec!(110)),
            direction,
            last_changed_at: None,
        }
    }

    fn ctx<'a>(spot: Decimal, major: &'a TrendState, minor: &'a TrendState) -> EvalContext<'a> {
        EvalContext {
            spot,
            major,
            minor,
            suspend_call_entries: false,
            suspend_put_entries: false,
            has_open_position: false,
        }
    }

    #[test]
    fn uptrend_near_short_ma_buys_call() {
        let evaluator = TriggerEvaluator::new(config());
        let major = trend(TrendDirection::Up);
        let minor = trend(TrendDirection::Up);

        let signal = evaluator
            .evaluate(&ctx(dec!(99.5), &major, &minor))
            .expect("signal");
        assert_eq!(signal.side, OptionSide::Call);
        assert_eq!(signal.trigger, TriggerKind::ShortMa);
    }

    #[test]
    fn downtrend_picks_put() {
        let evaluator = TriggerEvaluator::new(config());
        let major = trend(TrendDirection::Down);
        let minor = trend(TrendDirection::Down);

        let signal = evaluator
            .evaluate(&ctx(dec!(100), &major, &minor))
            .expect("signal");
        assert_eq!(signal.side, OptionSide::Put);
    }

    #[test]
    fn spot_above_level_does_not_fire() {
        let evaluator = TriggerEvaluator::new(config());
        let major = trend(TrendDirection::Up);
        let minor = trend(TrendDirection::Up);

        assert!(evaluator.evaluate(&ctx(dec!(101), &major, &minor)).is_none());
    }

    #[test]
    fn at_most_one_signal_follows_priority() {
        // Spot 94.5 is within 1% of both the long MA (95) and the lower band
        // (90 is too far) — and well below the short MA's 1% window.
        let evaluator = TriggerEvaluator::new(config());
        let major = trend(TrendDirection::Up);
        let minor = trend(TrendDirection::Up);

        let signal = evaluator
            .evaluate(&ctx(dec!(94.5), &major, &minor))
            .expect("signal");
        assert_eq!(signal.trigger, TriggerKind::LongMa);
    }

    #[test]
    fn priority_order_is_respected() {
        let mut config = config();
        config.trigger_priority =
            vec![TriggerKind::LowerBand, TriggerKind::LongMa, TriggerKind::ShortMa];
        let evaluator = TriggerEvaluator::new(config);
        let major = trend(TrendDirection::Up);
        let mut minor = trend(TrendDirection::Up);
        // Make every level equal so all three triggers are in range.
        minor.short_ma = Some(dec!(100));
        minor.long_ma = Some(dec!(100));
        minor.lower_band = Some(dec!(100));

        let signal = evaluator
            .evaluate(&ctx(dec!(99.5), &major, &minor))
            .expect("signal");
        assert_eq!(signal.trigger, TriggerKind::LowerBand);
    }

    #[test]
    fn suspension_blocks_new_entries_only() {
        let evaluator = TriggerEvaluator::new(config());
        let major = trend(TrendDirection::Up);
        let minor = trend(TrendDirection::Up);

        let mut context = ctx(dec!(99.5), &major, &minor);
        context.suspend_call_entries = true;
        assert!(evaluator.evaluate(&context).is_none());

        // Puts are unaffected by the call-side flag.
        let major_down = trend(TrendDirection::Down);
        let mut context = ctx(dec!(99.5), &major_down, &minor);
        context.suspend_call_entries = true;
        assert!(evaluator.evaluate(&context).is_some());
    }

    #[test]
    fn open_position_blocks_refire() {
        let evaluator = TriggerEvaluator::new(config());
        let major = trend(TrendDirection::Up);
        let minor = trend(TrendDirection::Up);

        let mut context = ctx(dec!(99.5), &major, &minor);
        context.has_open_position = true;
        assert!(evaluator.evaluate(&context).is_none());
    }

    #[test]
    fn unknown_major_trend_is_silent() {
        let evaluator = TriggerEvaluator::new(config());
        let major = trend(TrendDirection::Unknown);
        let minor = trend(TrendDirection::Up);

        assert!(evaluator.evaluate(&ctx(dec!(99.5), &major, &minor)).is_none());
    }

    #[test]
    fn reverse_signals_flips_side() {
        let mut config = config();
        config.reverse_signals = true;
        let evaluator = TriggerEvaluator::new(config);
        let major = trend(TrendDirection::Up);
        let minor = trend(TrendDirection::Up);

        let signal = evaluator
            .evaluate(&ctx(dec!(99.5), &major, &minor))
            .expect("signal");
        assert_eq!(signal.side, OptionSide::Put);
    }

    #[test]
    fn intent_carries_tick_aligned_target_and_stop() {
        let evaluator = TriggerEvaluator::new(config());
        let instrument = Instrument {
            id: "12345".to_string(),
            kind: InstrumentKind::Call,
            strike: Some(dec!(22500)),
            expiry: None,
            trading_symbol: "NIFTY24JUN22500CE".to_string(),
            last_price: dec!(100),
        };
        let signal = EntrySignal {
            side: OptionSide::Call,
            trigger: TriggerKind::ShortMa,
        };

        let intent = evaluator.build_intent(
            "intent-1".to_string(),
            signal,
            instrument,
            dec!(100),
            75,
            Utc::now(),
        );
        // Defaults: target +2.5%, stop -50%.
        assert_eq!(intent.target_price, dec!(102.50));
        assert_eq!(intent.stop_loss_price, dec!(50.00));
        assert_eq!(intent.status, IntentStatus::PendingSubmit);
        assert!(!intent.orphaned);
    }
}
