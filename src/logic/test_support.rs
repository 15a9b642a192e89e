use crate::model::{NewProduct, Product};
use crate::seed::{COUNT_DIMENSION_ID, MASS_DIMENSION_ID, VOLUME_DIMENSION_ID};
use crate::store::{CatalogStore, MemoryStore};

pub const ANNA: i64 = 1;
pub const BERT: i64 = 2;

pub async fn product(store: &MemoryStore, singular: &str, plural: &str, dimension_ids: &[i64]) -> Product {
    store
        .create_product(NewProduct {
            name_singular: singular.to_string(),
            name_plural: plural.to_string(),
            dimension_ids: dimension_ids.to_vec(),
        })
        .await
        .unwrap()
}

/// Store with one product measurable by count and by mass
pub async fn apple_store() -> (MemoryStore, Product) {
    let store = MemoryStore::new();
    let apple = product(&store, "Apple", "Apples", &[COUNT_DIMENSION_ID, MASS_DIMENSION_ID]).await;
    (store, apple)
}

pub async fn milk(store: &MemoryStore) -> Product {
    product(store, "Milk", "Milk", &[VOLUME_DIMENSION_ID]).await
}
