use optionbot_core::types::{CloseReason, TradeIntent};
use rust_decimal::Decimal;

/// Exit rule for one open intent.
///
/// Stop-loss is checked before target, and both before the time cutoff, so
/// a gap through both levels exits at the protective price. Returns `None`
/// while the position should stay open.
#[must_use]
pub fn check_exit(
    intent: &TradeIntent,
    last_price: Decimal,
    past_square_off: bool,
) -> Option<CloseReason> {
    if !intent.is_open() {
        return None;
    }
    if last_price <= intent.stop_loss_price {
        return Some(CloseReason::StopLoss);
    }
    if last_price >= intent.target_price {
        return Some(CloseReason::Target);
    }
    if past_square_off {
        return Some(CloseReason::SquareOff);
    }
    None
}
