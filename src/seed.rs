use anyhow::Result;
use rust_decimal::Decimal;

use crate::model::{Dimension, Id, NewProduct, Unit};
use crate::store::{CatalogStore, ConstraintKind};

// Must match the rows inserted by migrations/0002_default_dimensions.sql
pub const COUNT_DIMENSION_ID: Id = 1;
pub const MASS_DIMENSION_ID: Id = 2;
pub const VOLUME_DIMENSION_ID: Id = 3;

pub const PIECE_UNIT_ID: Id = 1;
pub const GRAM_UNIT_ID: Id = 2;
pub const KILOGRAM_UNIT_ID: Id = 3;
pub const MILLILITRE_UNIT_ID: Id = 4;
pub const LITRE_UNIT_ID: Id = 5;

fn unit(id: Id, singular: &str, plural: &str, to_base: Decimal, from_base: Decimal) -> Unit {
    Unit {
        id,
        name_singular: singular.to_string(),
        name_plural: plural.to_string(),
        conversion_to_base: to_base,
        conversion_from_base: from_base,
    }
}

/// Count, mass and volume with their units in display order.
pub fn default_dimensions() -> Vec<Dimension> {
    let thousand = Decimal::new(1000, 0);
    let thousandth = Decimal::new(1, 3);

    vec![
        Dimension {
            id: COUNT_DIMENSION_ID,
            name: "count".to_string(),
            units: vec![unit(PIECE_UNIT_ID, "piece", "pieces", Decimal::ONE, Decimal::ONE)],
        },
        Dimension {
            id: MASS_DIMENSION_ID,
            name: "mass".to_string(),
            units: vec![
                unit(GRAM_UNIT_ID, "g", "g", Decimal::ONE, Decimal::ONE),
                unit(KILOGRAM_UNIT_ID, "kg", "kg", thousand, thousandth),
            ],
        },
        Dimension {
            id: VOLUME_DIMENSION_ID,
            name: "volume".to_string(),
            units: vec![
                unit(MILLILITRE_UNIT_ID, "ml", "ml", Decimal::ONE, Decimal::ONE),
                unit(LITRE_UNIT_ID, "l", "l", thousand, thousandth),
            ],
        },
    ]
}

fn demo_products() -> Vec<NewProduct> {
    let product = |singular: &str, plural: &str, dimension_ids: &[Id]| NewProduct {
        name_singular: singular.to_string(),
        name_plural: plural.to_string(),
        dimension_ids: dimension_ids.to_vec(),
    };

    vec![
        product("Apple", "Apples", &[COUNT_DIMENSION_ID, MASS_DIMENSION_ID]),
        product("Egg", "Eggs", &[COUNT_DIMENSION_ID]),
        product("Flour", "Flour", &[MASS_DIMENSION_ID]),
        product("Milk", "Milk", &[VOLUME_DIMENSION_ID]),
        product("Potato", "Potatoes", &[COUNT_DIMENSION_ID, MASS_DIMENSION_ID]),
        product("Orange juice", "Orange juice", &[VOLUME_DIMENSION_ID]),
    ]
}

/// Creates the demo products. Products that already exist are left alone, so
/// seeding twice is harmless.
pub async fn load_seed_data<S: CatalogStore + ?Sized>(store: &S) -> Result<()> {
    for product in demo_products() {
        let name = product.name_singular.clone();
        match store.create_product(product).await {
            Ok(created) => log::info!("Seeded product '{}' ({})", name, created.id),
            Err(e) if e.constraint_kind() == Some(ConstraintKind::ProductName) => {
                log::debug!("Product '{}' already present", name)
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_default_units_are_reciprocal_pairs() {
        for dimension in default_dimensions() {
            assert!(dimension.units[0].is_base_unit(), "{}", dimension.name);
            for unit in &dimension.units {
                assert_eq!(unit.conversion_to_base * unit.conversion_from_base, Decimal::ONE);
            }
        }
    }

    #[tokio::test]
    async fn test_seeding_twice_is_harmless() {
        let store = MemoryStore::new();
        load_seed_data(&store).await.unwrap();
        load_seed_data(&store).await.unwrap();
    }
}
