use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::Id;

/// A convertible unit of a dimension. Quantities are stored in the dimension's
/// base unit, whose factors are both 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: Id,
    pub name_singular: String,
    pub name_plural: String,
    pub conversion_to_base: Decimal,
    pub conversion_from_base: Decimal,
}

impl Unit {
    pub fn is_base_unit(&self) -> bool {
        self.conversion_to_base == Decimal::ONE
    }

    /// Value of `base_quantity` expressed in this unit.
    pub fn from_base(&self, base_quantity: i64) -> Decimal {
        Decimal::from(base_quantity) * self.conversion_from_base
    }

    pub fn name_for(&self, value: Decimal) -> &str {
        if value > Decimal::ONE {
            &self.name_plural
        } else {
            &self.name_singular
        }
    }
}

/// A measurement axis. Units are kept in configured display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub id: Id,
    pub name: String,
    pub units: Vec<Unit>,
}

impl Dimension {
    pub fn unit(&self, unit_id: Id) -> Option<&Unit> {
        self.units.iter().find(|u| u.id == unit_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Id,
    pub name_singular: String,
    pub name_plural: String,
    pub dimensions: Vec<Dimension>,
}

impl Product {
    pub fn dimension(&self, dimension_id: Id) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.id == dimension_id)
    }

    /// Finds a unit among all of the product's dimensions together with the
    /// dimension it belongs to.
    pub fn find_unit(&self, unit_id: Id) -> Option<(&Dimension, &Unit)> {
        self.dimensions
            .iter()
            .find_map(|d| d.unit(unit_id).map(|u| (d, u)))
    }
}

/// Product to be created by seeding; dimensions are referenced by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name_singular: String,
    pub name_plural: String,
    pub dimension_ids: Vec<Id>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn litre() -> Unit {
        Unit {
            id: 3,
            name_singular: "l".to_string(),
            name_plural: "l".to_string(),
            conversion_to_base: Decimal::new(1000, 0),
            conversion_from_base: Decimal::new(1, 3),
        }
    }

    #[test]
    fn test_from_base_uses_reciprocal_factor() {
        assert_eq!(litre().from_base(1250), Decimal::new(125, 2));
        assert!(!litre().is_base_unit());
    }

    #[test]
    fn test_find_unit_reports_owning_dimension() {
        let product = Product {
            id: 1,
            name_singular: "Milk".to_string(),
            name_plural: "Milk".to_string(),
            dimensions: vec![Dimension {
                id: 7,
                name: "volume".to_string(),
                units: vec![litre()],
            }],
        };

        let (dimension, unit) = product.find_unit(3).unwrap();
        assert_eq!(dimension.id, 7);
        assert_eq!(unit.name_singular, "l");
        assert!(product.find_unit(99).is_none());
    }
}
