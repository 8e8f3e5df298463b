//! Fixed-precision decimal arithmetic with directed rounding.
//!
//! All money and quantity math in the engine flows through here. Floats never
//! appear in sizing, target, or profit calculations — `rust_decimal::Decimal`
//! carries arbitrary base-10 precision with no binary-float drift.

use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::str::FromStr;

/// Decimal places used for persisted/target prices, unless an exchange's
/// own precision overrides it.
pub const PRICE_SCALE: u32 = 2;

/// Decimal places used for order quantities, unless an exchange's own
/// precision overrides it.
pub const AMOUNT_SCALE: u32 = 8;

/// Directed rounding mode for `to_scale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundMode {
    Down,
    Up,
    HalfUp,
}

/// Round `value` to `scale` decimal places using the given directed mode.
pub fn to_scale(value: Decimal, scale: u32, mode: RoundMode) -> Decimal {
    use rust_decimal::RoundingStrategy;
    match mode {
        RoundMode::Down => value.round_dp_with_strategy(scale, RoundingStrategy::ToZero),
        RoundMode::Up => round_up(value, scale),
        RoundMode::HalfUp => value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero),
    }
}

fn round_up(value: Decimal, scale: u32) -> Decimal {
    let truncated = value.round_dp_with_strategy(scale, rust_decimal::RoundingStrategy::ToZero);
    if truncated == value {
        truncated
    } else if value.is_sign_positive() {
        truncated + smallest_unit(scale)
    } else {
        truncated - smallest_unit(scale)
    }
}

fn smallest_unit(scale: u32) -> Decimal {
    Decimal::new(1, scale)
}

/// Parse a decimal from a wire/string value, mapping failures to `None`
/// rather than panicking — callers decide how to surface a `ValidationError`.
pub fn parse(value: &str) -> Option<Decimal> {
    Decimal::from_str(value.trim()).ok()
}

/// `a.cmp(&b)`, spelled out for call sites that read more naturally as a
/// named comparison than an operator (mirrors the spec's `DecimalMath.cmp`).
pub fn cmp(a: Decimal, b: Decimal) -> Ordering {
    a.cmp(&b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rounds_down_truncates_toward_zero() {
        assert_eq!(to_scale(dec!(93988.567), 2, RoundMode::Down), dec!(93988.56));
    }

    #[test]
    fn rounds_up_bumps_on_any_remainder() {
        assert_eq!(to_scale(dec!(93987.001), 2, RoundMode::Up), dec!(93987.01));
        assert_eq!(to_scale(dec!(93987.00), 2, RoundMode::Up), dec!(93987.00));
    }

    #[test]
    fn rounds_half_up() {
        assert_eq!(to_scale(dec!(1.005), 2, RoundMode::HalfUp), dec!(1.01));
        assert_eq!(to_scale(dec!(1.004), 2, RoundMode::HalfUp), dec!(1.00));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse("not-a-number").is_none());
        assert_eq!(parse(" 1.50 "), Some(dec!(1.50)));
    }
}
