//! Read models for the plan and shop screens and the quantity form.
//!
//! Every view that leads to a mutation carries a freshly generated
//! idempotency key for the client to submit with it.

use serde::Serialize;
use std::collections::HashMap;

use crate::logic::format::{format_quantity, FormattedQuantity};
use crate::model::{IdempotencyKey, Id, Item, ItemChange, ItemState, Product};
use crate::store::{ListStore, ListTransaction, ListedItem, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Id },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemView {
    pub id: Id,
    pub product_id: Id,
    pub name_singular: String,
    pub name_plural: String,
    pub dimension_id: Id,
    pub quantity: i64,
    pub state: ItemState,
    pub display: FormattedQuantity,
}

impl ItemView {
    fn new(item: &Item, product: &Product) -> Self {
        let units = product
            .dimension(item.dimension_id)
            .map(|d| d.units.as_slice())
            .unwrap_or_default();

        Self {
            id: item.id,
            product_id: item.product_id,
            name_singular: product.name_singular.clone(),
            name_plural: product.name_plural.clone(),
            dimension_id: item.dimension_id,
            quantity: item.quantity,
            state: item.state,
            display: format_quantity(item.quantity, units),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanView {
    pub added: Vec<ItemView>,
    pub removed: Vec<ItemView>,
    pub products: Vec<Product>,
    pub idempotency_key: IdempotencyKey,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShopView {
    pub added: Vec<ItemView>,
    pub gathered: Vec<ItemView>,
    pub idempotency_key: IdempotencyKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitOption {
    pub id: Id,
    pub dimension_id: Id,
    pub name: String,
}

/// Everything needed to render the set-quantity form for one item.
#[derive(Debug, Clone, Serialize)]
pub struct ItemFormView {
    pub item: ItemView,
    /// Prefilled unit and value, as the formatter would show them
    pub unit_id: Option<Id>,
    pub quantity: String,
    pub units: Vec<UnitOption>,
    pub idempotency_key: IdempotencyKey,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemHistory {
    pub item: ItemView,
    pub changes: Vec<ItemChange>,
}

/// Added items and removed items, each most recently touched first.
pub async fn plan<S: ListStore + ?Sized>(store: &S) -> Result<PlanView, ViewError> {
    let mut tx = store.begin().await?;
    let products = tx.list_products().await?;
    let added = tx.list_items(ItemState::Added).await?;
    let removed = tx.list_items(ItemState::Removed).await?;
    tx.rollback().await?;

    let by_id = index(&products);
    Ok(PlanView {
        added: views(&added, &by_id),
        removed: views(&removed, &by_id),
        products,
        idempotency_key: IdempotencyKey::generate(),
    })
}

/// Added items by product name, gathered items most recently touched first.
pub async fn shop<S: ListStore + ?Sized>(store: &S) -> Result<ShopView, ViewError> {
    let mut tx = store.begin().await?;
    let products = tx.list_products().await?;
    let added = tx.list_items(ItemState::Added).await?;
    let gathered = tx.list_items(ItemState::Gathered).await?;
    tx.rollback().await?;

    let by_id = index(&products);
    let mut added = views(&added, &by_id);
    added.sort_by_key(|view| view.name_singular.to_lowercase());

    Ok(ShopView {
        added,
        gathered: views(&gathered, &by_id),
        idempotency_key: IdempotencyKey::generate(),
    })
}

pub async fn item_form<S: ListStore + ?Sized>(store: &S, item_id: Id) -> Result<ItemFormView, ViewError> {
    let mut tx = store.begin().await?;
    let (item, product) = load(&mut *tx, item_id).await?;
    tx.rollback().await?;

    let view = ItemView::new(&item, &product);
    let units = product
        .dimensions
        .iter()
        .flat_map(|d| {
            d.units.iter().map(move |u| UnitOption {
                id: u.id,
                dimension_id: d.id,
                name: u.name_plural.clone(),
            })
        })
        .collect();

    Ok(ItemFormView {
        unit_id: view.display.unit_id,
        quantity: view.display.value.clone(),
        item: view,
        units,
        idempotency_key: IdempotencyKey::generate(),
    })
}

/// The audit trail of one item, oldest change first.
pub async fn item_history<S: ListStore + ?Sized>(store: &S, item_id: Id) -> Result<ItemHistory, ViewError> {
    let mut tx = store.begin().await?;
    let (item, product) = load(&mut *tx, item_id).await?;
    let changes = tx.list_item_changes(item_id).await?;
    tx.rollback().await?;

    Ok(ItemHistory {
        item: ItemView::new(&item, &product),
        changes,
    })
}

async fn load(tx: &mut dyn ListTransaction, item_id: Id) -> Result<(Item, Product), ViewError> {
    let item = tx.get_item(item_id).await?.ok_or(ViewError::NotFound {
        entity: "item",
        id: item_id,
    })?;
    let product = tx.get_product(item.product_id).await?.ok_or(ViewError::NotFound {
        entity: "product",
        id: item.product_id,
    })?;
    Ok((item, product))
}

fn index(products: &[Product]) -> HashMap<Id, &Product> {
    products.iter().map(|p| (p.id, p)).collect()
}

fn views(listed: &[ListedItem], products: &HashMap<Id, &Product>) -> Vec<ItemView> {
    listed
        .iter()
        .filter_map(|l| {
            let product = products.get(&l.item.product_id);
            if product.is_none() {
                log::warn!("Item {} refers to unknown product {}", l.item.id, l.item.product_id);
            }
            product.map(|p| ItemView::new(&l.item, p))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::mutations::{AddItem, ListService};
    use crate::logic::test_support::{apple_store, milk, product, ANNA};
    use crate::model::UserContext;
    use crate::seed::{COUNT_DIMENSION_ID, LITRE_UNIT_ID, MILLILITRE_UNIT_ID, PIECE_UNIT_ID};
    use crate::store::MemoryStore;
    use std::sync::Arc;

    async fn add(store: &MemoryStore, product_id: Id, unit_id: Id, quantity: &str) -> Id {
        ListService::new(Arc::new(store.clone()))
            .add_item(
                &UserContext::new(ANNA),
                &IdempotencyKey::generate(),
                AddItem {
                    product_id,
                    unit_id: Some(unit_id),
                    quantity: quantity.to_string(),
                },
            )
            .await
            .unwrap();
        store.items().await.last().map(|i| i.id).unwrap()
    }

    async fn set_state(store: &MemoryStore, item_id: Id, state: ItemState) {
        let service = ListService::new(Arc::new(store.clone()));
        let user = UserContext::new(ANNA);
        let key = IdempotencyKey::generate();
        match state {
            ItemState::Gathered => service.check_item(&user, &key, item_id).await.unwrap(),
            ItemState::Removed => service.remove_item(&user, &key, item_id).await.unwrap(),
            ItemState::Added => unreachable!(),
        };
    }

    #[tokio::test]
    async fn test_plan_orders_by_most_recent_change() {
        let (store, apple) = apple_store().await;
        let milk = milk(&store).await;
        let apples = add(&store, apple.id, PIECE_UNIT_ID, "3").await;
        let milk_item = add(&store, milk.id, LITRE_UNIT_ID, "1,25").await;

        let view = plan(&store).await.unwrap();
        let ids: Vec<Id> = view.added.iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![milk_item, apples]);
        assert_eq!(view.added[0].display.text, "1,25 l");
        assert_eq!(view.added[1].display.text, "3 pieces");
        assert_eq!(view.products.len(), 2);

        // Touching apples again moves them to the top
        add(&store, apple.id, PIECE_UNIT_ID, "1").await;
        let view = plan(&store).await.unwrap();
        assert_eq!(view.added[0].id, apples);
    }

    #[tokio::test]
    async fn test_plan_lists_removed_items_separately() {
        let (store, apple) = apple_store().await;
        let item = add(&store, apple.id, PIECE_UNIT_ID, "2").await;
        set_state(&store, item, ItemState::Removed).await;

        let view = plan(&store).await.unwrap();
        assert!(view.added.is_empty());
        assert_eq!(view.removed.len(), 1);
        assert_eq!(view.removed[0].state, ItemState::Removed);
    }

    #[tokio::test]
    async fn test_shop_sorts_added_by_name_ignoring_case() {
        let store = MemoryStore::new();
        let zucchini = product(&store, "zucchini", "zucchinis", &[COUNT_DIMENSION_ID]).await;
        let bread = product(&store, "Bread", "Breads", &[COUNT_DIMENSION_ID]).await;
        let apple = product(&store, "apple", "apples", &[COUNT_DIMENSION_ID]).await;
        let gathered = add(&store, apple.id, PIECE_UNIT_ID, "2").await;
        set_state(&store, gathered, ItemState::Gathered).await;
        for p in [&zucchini, &bread, &apple] {
            add(&store, p.id, PIECE_UNIT_ID, "1").await;
        }

        let view = shop(&store).await.unwrap();
        let names: Vec<&str> = view.added.iter().map(|v| v.name_singular.as_str()).collect();
        assert_eq!(names, vec!["apple", "Bread", "zucchini"]);
        assert_eq!(view.gathered.len(), 1);
        assert_eq!(view.gathered[0].display.text, "2 pieces");
    }

    #[tokio::test]
    async fn test_item_form_prefills_formatted_quantity() {
        let (store, _) = apple_store().await;
        let milk = milk(&store).await;
        let item = add(&store, milk.id, MILLILITRE_UNIT_ID, "1500").await;

        let form = item_form(&store, item).await.unwrap();
        assert_eq!(form.unit_id, Some(LITRE_UNIT_ID));
        assert_eq!(form.quantity, "1,5");
        let unit_ids: Vec<Id> = form.units.iter().map(|u| u.id).collect();
        assert_eq!(unit_ids, vec![MILLILITRE_UNIT_ID, LITRE_UNIT_ID]);
    }

    #[tokio::test]
    async fn test_history_and_missing_item() {
        let (store, apple) = apple_store().await;
        let item = add(&store, apple.id, PIECE_UNIT_ID, "2").await;
        set_state(&store, item, ItemState::Gathered).await;

        let history = item_history(&store, item).await.unwrap();
        let states: Vec<ItemState> = history.changes.iter().map(|c| c.state).collect();
        assert_eq!(states, vec![ItemState::Added, ItemState::Gathered]);

        let err = item_form(&store, 404).await.unwrap_err();
        assert!(matches!(err, ViewError::NotFound { entity: "item", id: 404 }));
    }

    #[tokio::test]
    async fn test_views_carry_distinct_fresh_keys() {
        let store = MemoryStore::new();
        let first = plan(&store).await.unwrap();
        let second = plan(&store).await.unwrap();
        assert_ne!(first.idempotency_key, second.idempotency_key);
    }
}
