use chrono::{Datelike, NaiveDate, Weekday};
use optionbot_core::config::TradingConfig;
use optionbot_core::types::{Instrument, InstrumentKind, OptionSide};
use rust_decimal::Decimal;

/// Out-of-the-money strike for the given side.
///
/// Calls round up from spot plus the minimum gap; puts round down from spot
/// minus it. Both snap to the exchange's strike step.
#[must_use]
pub fn strike_for(side: OptionSide, spot: Decimal, min_gap: u32, round_to: u32) -> Decimal {
    let gap = Decimal::from(min_gap);
    let step = Decimal::from(round_to);
    match side {
        OptionSide::Call => ((spot + gap) / step).ceil() * step,
        OptionSide::Put => ((spot - gap) / step).floor() * step,
    }
}

/// NSE-style monthly option symbol, e.g. `NIFTY24JUN22500CE`.
#[must_use]
pub fn trading_symbol(
    underlying: &str,
    expiry: NaiveDate,
    strike: Decimal,
    side: OptionSide,
) -> String {
    format!(
        "{}{}{}{}{}",
        underlying,
        expiry.format("%y"),
        expiry.format("%b").to_string().to_uppercase(),
        strike.normalize(),
        side,
    )
}

/// Nearest monthly expiry on or after `date`: the last Thursday of the NSE
/// month, rolling into the next month once it has passed. Used when a
/// session starts without an explicit contract expiry.
#[must_use]
pub fn monthly_expiry(date: NaiveDate) -> NaiveDate {
    match last_thursday(date.year(), date.month()) {
        Some(expiry) if expiry >= date => expiry,
        _ => {
            let (year, month) = if date.month() == 12 {
                (date.year() + 1, 1)
            } else {
                (date.year(), date.month() + 1)
            };
            last_thursday(year, month).unwrap_or(date)
        }
    }
}

fn last_thursday(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    // Walk back from the last day of the month to a Thursday.
    let mut day = NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()?;
    while day.weekday() != Weekday::Thu {
        day = day.pred_opt()?;
    }
    Some(day)
}

/// Builds the tradable contract for this cycle. Always derived fresh from
/// the current spot; a cached instrument would drift away from the money.
#[must_use]
pub fn select_contract(
    config: &TradingConfig,
    side: OptionSide,
    spot: Decimal,
    expiry: NaiveDate,
) -> Instrument {
    let strike = strike_for(side, spot, config.min_strike_gap, config.strike_round_to);
    let symbol = trading_symbol(&config.underlying_symbol, expiry, strike, side);
    Instrument {
        id: symbol.clone(),
        kind: match side {
            OptionSide::Call => InstrumentKind::Call,
            OptionSide::Put => InstrumentKind::Put,
        },
        strike: Some(strike),
        expiry: Some(expiry),
        trading_symbol: symbol,
        last_price: Decimal::ZERO,
    }
}
