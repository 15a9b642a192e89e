use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::{Id, Unit};

/// Decimal places kept when rendering a converted quantity.
pub const DISPLAY_DECIMALS: u32 = 3;

/// A base quantity rendered in its most readable unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedQuantity {
    /// Number alone, e.g. `1,25`; also used to prefill quantity inputs
    pub value: String,
    pub unit_id: Option<Id>,
    pub unit_name: Option<String>,
    /// Number and unit name, e.g. `1,25 l`
    pub text: String,
}

/// Picks the unit giving the smallest displayed value that is still at least
/// one. Units are visited in display order; a later unit only replaces the
/// current choice when it is strictly smaller, so the first unit wins ties.
pub fn select_unit(quantity: i64, units: &[Unit]) -> Option<&Unit> {
    let mut best: Option<(&Unit, Decimal)> = None;

    for unit in units {
        let value = unit.from_base(quantity);
        best = match best {
            None => Some((unit, value)),
            Some((_, best_value)) if value < best_value && value >= Decimal::ONE => {
                Some((unit, value))
            }
            keep => keep,
        };
    }

    best.map(|(unit, _)| unit)
}

/// Renders with a decimal comma and without trailing zeros.
pub fn format_decimal(value: Decimal) -> String {
    value
        .round_dp(DISPLAY_DECIMALS)
        .normalize()
        .to_string()
        .replace('.', ",")
}

pub fn format_quantity(quantity: i64, units: &[Unit]) -> FormattedQuantity {
    let Some(unit) = select_unit(quantity, units) else {
        let value = quantity.to_string();
        return FormattedQuantity {
            text: value.clone(),
            value,
            unit_id: None,
            unit_name: None,
        };
    };

    let value = format_decimal(unit.from_base(quantity));
    // Singular for exactly one, so compare the rendered value
    let shown: Decimal = unit.from_base(quantity).round_dp(DISPLAY_DECIMALS);
    let name = unit.name_for(shown).to_string();

    FormattedQuantity {
        text: format!("{} {}", value, name),
        value,
        unit_id: Some(unit.id),
        unit_name: Some(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(id: Id, singular: &str, plural: &str, to_base: Decimal, from_base: Decimal) -> Unit {
        Unit {
            id,
            name_singular: singular.to_string(),
            name_plural: plural.to_string(),
            conversion_to_base: to_base,
            conversion_from_base: from_base,
        }
    }

    fn bottles() -> Vec<Unit> {
        vec![unit(1, "bottle", "bottles", Decimal::ONE, Decimal::ONE)]
    }

    fn volume() -> Vec<Unit> {
        vec![
            unit(2, "ml", "ml", Decimal::ONE, Decimal::ONE),
            unit(3, "l", "l", Decimal::new(1000, 0), Decimal::new(1, 3)),
        ]
    }

    #[test]
    fn test_formatted_quantity() {
        assert_eq!(format_quantity(1, &bottles()).text, "1 bottle");
        assert_eq!(format_quantity(3, &bottles()).text, "3 bottles");
        assert_eq!(format_quantity(1, &volume()).text, "1 ml");
        assert_eq!(format_quantity(33, &volume()).text, "33 ml");
        assert_eq!(format_quantity(999, &volume()).text, "999 ml");
        assert_eq!(format_quantity(1000, &volume()).text, "1 l");
        assert_eq!(format_quantity(1250, &volume()).text, "1,25 l");
    }

    #[test]
    fn test_selection_reports_unit_and_prefill_value() {
        let formatted = format_quantity(1250, &volume());
        assert_eq!(formatted.unit_id, Some(3));
        assert_eq!(formatted.value, "1,25");
    }

    #[test]
    fn test_singular_only_for_exactly_one() {
        let pieces = vec![unit(1, "piece", "pieces", Decimal::ONE, Decimal::ONE)];
        assert_eq!(format_quantity(1, &pieces).text, "1 piece");
        assert_eq!(format_quantity(2, &pieces).text, "2 pieces");

        let kilos = vec![
            unit(2, "gram", "grams", Decimal::ONE, Decimal::ONE),
            unit(3, "kilo", "kilos", Decimal::new(1000, 0), Decimal::new(1, 3)),
        ];
        assert_eq!(format_quantity(1000, &kilos).text, "1 kilo");
        assert_eq!(format_quantity(1500, &kilos).text, "1,5 kilos");
    }

    #[test]
    fn test_first_unit_wins_ties() {
        let twins = vec![
            unit(1, "a", "a", Decimal::ONE, Decimal::ONE),
            unit(2, "b", "b", Decimal::ONE, Decimal::ONE),
        ];
        assert_eq!(select_unit(5, &twins).map(|u| u.id), Some(1));
    }

    #[test]
    fn test_no_units_renders_bare_number() {
        assert_eq!(format_quantity(7, &[]).text, "7");
        assert!(select_unit(7, &[]).is_none());
    }

    #[test]
    fn test_display_rounding_trims_insignificant_digits() {
        assert_eq!(format_decimal(Decimal::new(12500, 4)), "1,25");
        assert_eq!(format_decimal(Decimal::new(1_333_333, 6)), "1,333");
        assert_eq!(format_decimal(Decimal::new(10, 0)), "10");
    }
}
