// ===============================
// src/math.rs
// ===============================
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;
use std::str::FromStr;

use crate::error::{GatewayError, Result};

/// Round `value` to the nearest multiple of `increment` in decimal arithmetic.
///
/// The quotient `value / increment` is rounded half away from zero, then scaled
/// back by the increment, so `round_to_increment(401.46, 0.01)` is exactly
/// `401.46`. A non-positive increment leaves the value untouched. A quotient
/// outside the decimal range is a config error.
pub fn round_to_increment(value: Decimal, increment: Decimal) -> Result<Decimal> {
    if increment <= Decimal::ZERO {
        return Ok(value);
    }
    let out_of_range = || GatewayError::Config(format!("{value} cannot be rounded to increment {increment}"));
    let steps = value
        .checked_div(increment)
        .ok_or_else(out_of_range)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    Ok(steps.checked_mul(increment).ok_or_else(out_of_range)?.normalize())
}

/// Venue payloads carry numbers either as JSON numbers (`50492.0`) or as
/// strings (`"50492"`). Both go through the textual form so no binary float
/// rounding leaks into the book.
pub fn decimal_from_value(v: &Value) -> Option<Decimal> {
    match v {
        Value::String(s) => parse_decimal(s),
        Value::Number(n) => parse_decimal(&n.to_string()),
        _ => None,
    }
}

pub fn parse_decimal(s: &str) -> Option<Decimal> {
    let s = s.trim();
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn rounds_to_tick_without_float_drift() {
        assert_eq!(round_to_increment(dec!(401.46), dec!(0.01)).unwrap(), dec!(401.46));
        assert_eq!(round_to_increment(dec!(0.1) + dec!(0.2), dec!(0.1)).unwrap(), dec!(0.3));
        assert_eq!(round_to_increment(dec!(0.00123), dec!(0.0001)).unwrap(), dec!(0.0012));
        assert_eq!(round_to_increment(dec!(30017), dec!(5)).unwrap(), dec!(30015));
    }

    #[test]
    fn half_rounds_away_from_zero() {
        assert_eq!(round_to_increment(dec!(0.25), dec!(0.1)).unwrap(), dec!(0.3));
        assert_eq!(round_to_increment(dec!(-0.25), dec!(0.1)).unwrap(), dec!(-0.3));
        assert_eq!(round_to_increment(dec!(2.5), dec!(1)).unwrap(), dec!(3));
    }

    #[test]
    fn zero_increment_is_identity() {
        assert_eq!(round_to_increment(dec!(1.2345), Decimal::ZERO).unwrap(), dec!(1.2345));
    }

    #[test]
    fn out_of_range_quotient_is_an_error() {
        assert!(matches!(round_to_increment(Decimal::MAX, dec!(0.0001)), Err(GatewayError::Config(_))));
        assert_eq!(round_to_increment(Decimal::MAX, Decimal::ONE).unwrap(), Decimal::MAX);
    }

    #[test]
    fn decimals_from_json_numbers_and_strings() {
        assert_eq!(decimal_from_value(&json!(0.8454)), Some(dec!(0.8454)));
        assert_eq!(decimal_from_value(&json!("48644")), Some(dec!(48644)));
        assert_eq!(decimal_from_value(&json!(1e-5)), Some(dec!(0.00001)));
        assert_eq!(decimal_from_value(&json!(null)), None);
    }
}
