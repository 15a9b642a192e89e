use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::logic::format::format_decimal;
use crate::model::{Unit, MAX_QUANTITY, MIN_QUANTITY};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuantityError {
    #[error("quantity is missing")]
    Missing,
    #[error("quantity is not a number")]
    NotANumber,
    #[error("quantity is not a whole number of base units")]
    NotWhole,
    #[error("quantity is below the minimum")]
    TooSmall,
    /// `remaining` is the largest amount, in base units, that still fits
    #[error("quantity exceeds the remaining {remaining}")]
    TooLarge { remaining: i64 },
}

impl QuantityError {
    /// Field message shown next to the quantity input, in terms of the unit
    /// the user entered.
    pub fn message(&self, unit: &Unit) -> String {
        match self {
            QuantityError::Missing => "Enter a quantity".to_string(),
            QuantityError::NotANumber => "Enter a number".to_string(),
            QuantityError::NotWhole => "Enter a whole number".to_string(),
            QuantityError::TooSmall => format!(
                "Enter a larger quantity (smallest is {} {})",
                format_decimal(unit.from_base(MIN_QUANTITY)),
                unit.name_singular
            ),
            QuantityError::TooLarge { remaining } => {
                let largest = unit.from_base(*remaining);
                format!(
                    "Enter a smaller quantity (largest is {} {})",
                    format_decimal(largest),
                    unit.name_for(largest)
                )
            }
        }
    }
}

/// A quantity in base units within `MIN_QUANTITY..=MAX_QUANTITY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BaseQuantity(i64);

impl BaseQuantity {
    pub fn new(value: i64) -> Result<Self, QuantityError> {
        if value < MIN_QUANTITY {
            return Err(QuantityError::TooSmall);
        }
        if value > MAX_QUANTITY {
            return Err(QuantityError::TooLarge {
                remaining: MAX_QUANTITY,
            });
        }
        Ok(Self(value))
    }

    pub fn get(self) -> i64 {
        self.0
    }

    /// `self + existing`, or the room left next to `existing` when the sum
    /// would pass the maximum.
    pub fn merged_with(self, existing: i64) -> Result<Self, QuantityError> {
        let total = existing.saturating_add(self.0);
        if total > MAX_QUANTITY {
            return Err(QuantityError::TooLarge {
                remaining: (MAX_QUANTITY - existing).max(0),
            });
        }
        Ok(Self(total))
    }
}

/// Parses user input; comma and dot are both accepted as decimal separator.
/// Anything but an optional sign, digits and one separator is not a number.
pub fn parse_amount(text: &str) -> Result<Decimal, QuantityError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(QuantityError::Missing);
    }
    let unsigned = text.strip_prefix(['-', '+']).unwrap_or(text);
    let separators = unsigned.chars().filter(|c| matches!(c, ',' | '.')).count();
    let well_formed = separators <= 1
        && unsigned.chars().any(|c| c.is_ascii_digit())
        && unsigned
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, ',' | '.'));
    if !well_formed {
        return Err(QuantityError::NotANumber);
    }
    Decimal::from_str(&text.replace(',', ".")).map_err(|_| QuantityError::NotANumber)
}

/// Converts an entered amount into base units. The product must be exactly
/// integral; nothing is rounded.
pub fn to_base(amount: Decimal, unit: &Unit) -> Result<i64, QuantityError> {
    let base = amount
        .checked_mul(unit.conversion_to_base)
        .ok_or(QuantityError::TooLarge {
            remaining: MAX_QUANTITY,
        })?;

    if !base.fract().is_zero() {
        return Err(QuantityError::NotWhole);
    }

    match base.to_i64() {
        Some(value) => Ok(value),
        None if base.is_sign_negative() => Err(QuantityError::TooSmall),
        None => Err(QuantityError::TooLarge {
            remaining: MAX_QUANTITY,
        }),
    }
}

/// Text to a bounded base quantity in one step.
pub fn parse_base_quantity(text: &str, unit: &Unit) -> Result<BaseQuantity, QuantityError> {
    let amount = parse_amount(text)?;
    BaseQuantity::new(to_base(amount, unit)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(name: &str, to_base: Decimal, from_base: Decimal) -> Unit {
        Unit {
            id: 1,
            name_singular: name.to_string(),
            name_plural: name.to_string(),
            conversion_to_base: to_base,
            conversion_from_base: from_base,
        }
    }

    fn gram() -> Unit {
        unit("g", Decimal::ONE, Decimal::ONE)
    }

    fn kilogram() -> Unit {
        unit("kg", Decimal::new(1000, 0), Decimal::new(1, 3))
    }

    #[test]
    fn test_parse_accepts_comma_and_dot() {
        assert_eq!(parse_amount("1,5"), Ok(Decimal::new(15, 1)));
        assert_eq!(parse_amount(" 1.5 "), Ok(Decimal::new(15, 1)));
        assert_eq!(parse_amount(""), Err(QuantityError::Missing));
        assert_eq!(parse_amount("   "), Err(QuantityError::Missing));
        assert_eq!(parse_amount("a lot"), Err(QuantityError::NotANumber));
        assert_eq!(parse_amount("-2"), Ok(Decimal::new(-2, 0)));
    }

    #[test]
    fn test_parse_rejects_odd_number_forms() {
        for text in ["1_000", "1e3", "1,000.5", "1.2.3", "+-1", "-", ",", "0x10"] {
            assert_eq!(parse_amount(text), Err(QuantityError::NotANumber), "{}", text);
        }
    }

    #[test]
    fn test_exact_conversion() {
        assert_eq!(parse_base_quantity("250", &gram()).map(BaseQuantity::get), Ok(250));
        assert_eq!(parse_base_quantity("1,5", &kilogram()).map(BaseQuantity::get), Ok(1500));
        assert_eq!(parse_base_quantity("1,234", &kilogram()).map(BaseQuantity::get), Ok(1234));
    }

    #[test]
    fn test_non_integral_base_value_is_rejected_not_rounded() {
        assert_eq!(parse_base_quantity("1,2345", &kilogram()), Err(QuantityError::NotWhole));
        assert_eq!(parse_base_quantity("2,5", &gram()), Err(QuantityError::NotWhole));

        // 1,234 of a unit worth 100 base units would be 123.4
        let hectogram = unit("hg", Decimal::new(100, 0), Decimal::new(1, 2));
        assert_eq!(parse_base_quantity("1,234", &hectogram), Err(QuantityError::NotWhole));
    }

    #[test]
    fn test_factor_with_no_binary_representation_stays_exact() {
        // 0.1 * 30 is not exactly 3 in floating point
        let tenth = unit("dg", Decimal::new(1, 1), Decimal::new(10, 0));
        assert_eq!(parse_base_quantity("30", &tenth).map(BaseQuantity::get), Ok(3));
    }

    #[test]
    fn test_bounds() {
        assert_eq!(parse_base_quantity("0", &gram()), Err(QuantityError::TooSmall));
        assert_eq!(parse_base_quantity("-3", &gram()), Err(QuantityError::TooSmall));
        assert_eq!(
            parse_base_quantity("10,001", &kilogram()),
            Err(QuantityError::TooLarge { remaining: 10_000 })
        );
        assert_eq!(parse_base_quantity("10", &kilogram()).map(BaseQuantity::get), Ok(10_000));
    }

    #[test]
    fn test_merge_reports_remaining_room() {
        let three = BaseQuantity::new(3).unwrap();
        assert_eq!(three.merged_with(2).map(BaseQuantity::get), Ok(5));
        assert_eq!(
            three.merged_with(9_998),
            Err(QuantityError::TooLarge { remaining: 2 })
        );
    }

    #[test]
    fn test_messages_use_entered_unit() {
        let kg = kilogram();
        assert_eq!(
            QuantityError::TooLarge { remaining: 9_500 }.message(&kg),
            "Enter a smaller quantity (largest is 9,5 kg)"
        );
        assert_eq!(
            QuantityError::TooSmall.message(&gram()),
            "Enter a larger quantity (smallest is 1 g)"
        );
    }
}
