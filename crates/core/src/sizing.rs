use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Number of whole lots affordable with the allocated slice of capital.
/// Returns 0 when even one lot exceeds the allocation.
#[must_use]
pub fn lots_for_capital(
    available_capital: Decimal,
    premium: Decimal,
    lot_size: u32,
    allocation_pct: f64,
) -> u32 {
    if premium <= Decimal::ZERO || lot_size == 0 {
        return 0;
    }
    let Some(pct) = Decimal::from_f64_retain(allocation_pct) else {
        return 0;
    };
    let allocated = available_capital * pct / Decimal::ONE_HUNDRED;
    let per_lot = premium * Decimal::from(lot_size);
    if per_lot <= Decimal::ZERO {
        return 0;
    }
    (allocated / per_lot).floor().to_u32().unwrap_or(0)
}

/// Rounds a price down to the nearest exchange tick.
#[must_use]
pub fn align_to_tick(price: Decimal, tick: Decimal) -> Decimal {
    if tick <= Decimal::ZERO {
        return price;
    }
    (price / tick).floor() * tick
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn lots_floor_to_whole_multiples() {
        // 16.67% of 10 lakh = 166,700; one lot of 75 @ 120 = 9,000.
        let lots = lots_for_capital(dec!(1000000), dec!(120), 75, 16.67);
        assert_eq!(lots, 18);
    }

    #[test]
    fn zero_when_one_lot_is_unaffordable() {
        let lots = lots_for_capital(dec!(10000), dec!(500), 75, 16.67);
        assert_eq!(lots, 0);
    }

    #[test]
    fn zero_premium_yields_zero_lots() {
        assert_eq!(lots_for_capital(dec!(100000), dec!(0), 75, 16.67), 0);
    }

    #[test]
    fn tick_alignment_rounds_down() {
        assert_eq!(align_to_tick(dec!(123.47), dec!(0.05)), dec!(123.45));
        assert_eq!(align_to_tick(dec!(123.45), dec!(0.05)), dec!(123.45));
    }
}
