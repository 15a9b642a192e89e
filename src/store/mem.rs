use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::model::{
    Dimension, IdempotencyKey, Id, Item, ItemChange, ItemState, NewItem, NewItemChange, NewProduct,
    Product,
};
use crate::seed::default_dimensions;
use crate::store::traits::{
    CatalogStore, ConstraintKind, ListStore, ListTransaction, ListedItem, StoreError, StoreResult,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    dimensions: Vec<Dimension>,
    products: BTreeMap<Id, Product>,
    items: BTreeMap<Id, Item>,
    changes: Vec<ItemChange>,
    keys: HashMap<IdempotencyKey, DateTime<Utc>>,
    next_product_id: Id,
    next_item_id: Id,
    next_change_id: Id,
}

impl MemoryState {
    fn check_added_unique(&self, item: &Item) -> StoreResult<()> {
        if item.state != ItemState::Added {
            return Ok(());
        }
        let clash = self.items.values().any(|other| {
            other.id != item.id
                && other.state == ItemState::Added
                && other.product_id == item.product_id
                && other.dimension_id == item.dimension_id
        });
        if clash {
            return Err(StoreError::Constraint {
                kind: ConstraintKind::AddedItem,
                message: format!(
                    "an added item already exists for product {} in dimension {}",
                    item.product_id, item.dimension_id
                ),
            });
        }
        Ok(())
    }

    fn last_change_id(&self, item_id: Id) -> Option<Id> {
        self.changes
            .iter()
            .rev()
            .find(|c| c.item_id == item_id)
            .map(|c| c.id)
    }
}

/// Store kept entirely in process memory. Transactions are serialised: a
/// transaction holds the whole state until it commits or is dropped, and a
/// dropped or rolled back transaction restores the state it started from.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    /// Empty list with the default count, mass and volume dimensions
    pub fn new() -> Self {
        Self::with_dimensions(default_dimensions())
    }

    pub fn with_dimensions(dimensions: Vec<Dimension>) -> Self {
        let state = MemoryState {
            dimensions,
            next_product_id: 1,
            next_item_id: 1,
            next_change_id: 1,
            ..MemoryState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// All items regardless of state, by id
    pub async fn items(&self) -> Vec<Item> {
        self.state.lock().await.items.values().cloned().collect()
    }

    pub async fn item_changes(&self) -> Vec<ItemChange> {
        self.state.lock().await.changes.clone()
    }

    pub async fn idempotency_key_count(&self) -> usize {
        self.state.lock().await.keys.len()
    }

    /// Backdates a stored key, for exercising retention
    pub async fn set_key_processed_at(&self, key: &IdempotencyKey, processed_at: DateTime<Utc>) {
        if let Some(at) = self.state.lock().await.keys.get_mut(key) {
            *at = processed_at;
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    snapshot: Option<MemoryState>,
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.guard = snapshot;
        }
    }
}

#[async_trait::async_trait]
impl ListStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn ListTransaction>> {
        let guard = self.state.clone().lock_owned().await;
        let snapshot = Some(guard.clone());
        Ok(Box::new(MemoryTransaction { guard, snapshot }))
    }
}

#[async_trait::async_trait]
impl ListTransaction for MemoryTransaction {
    async fn get_product(&mut self, id: Id) -> StoreResult<Option<Product>> {
        Ok(self.guard.products.get(&id).cloned())
    }

    async fn list_products(&mut self) -> StoreResult<Vec<Product>> {
        let mut products: Vec<Product> = self.guard.products.values().cloned().collect();
        products.sort_by_key(|p| p.name_singular.to_lowercase());
        Ok(products)
    }

    async fn get_item(&mut self, id: Id) -> StoreResult<Option<Item>> {
        Ok(self.guard.items.get(&id).cloned())
    }

    async fn get_added_item(&mut self, product_id: Id, dimension_id: Id) -> StoreResult<Option<Item>> {
        Ok(self
            .guard
            .items
            .values()
            .find(|i| {
                i.state == ItemState::Added
                    && i.product_id == product_id
                    && i.dimension_id == dimension_id
            })
            .cloned())
    }

    async fn list_items(&mut self, state: ItemState) -> StoreResult<Vec<ListedItem>> {
        let mut listed: Vec<ListedItem> = self
            .guard
            .items
            .values()
            .filter(|i| i.state == state)
            .map(|item| ListedItem {
                last_change_id: self.guard.last_change_id(item.id),
                item: item.clone(),
            })
            .collect();
        listed.sort_by(|a, b| b.last_change_id.cmp(&a.last_change_id));
        Ok(listed)
    }

    async fn insert_item(&mut self, new: NewItem) -> StoreResult<Item> {
        let item = Item {
            id: self.guard.next_item_id,
            product_id: new.product_id,
            dimension_id: new.dimension_id,
            quantity: new.quantity,
            state: ItemState::Added,
        };
        self.guard.check_added_unique(&item)?;
        self.guard.next_item_id += 1;
        self.guard.items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn update_item(&mut self, item: &Item) -> StoreResult<()> {
        if !self.guard.items.contains_key(&item.id) {
            return Err(StoreError::Corrupt(format!("item {} does not exist", item.id)));
        }
        self.guard.check_added_unique(item)?;
        self.guard.items.insert(item.id, item.clone());
        Ok(())
    }

    async fn insert_item_change(&mut self, change: NewItemChange) -> StoreResult<ItemChange> {
        let stored = ItemChange {
            id: self.guard.next_change_id,
            item_id: change.item_id,
            user_id: change.user_id,
            dimension_id: change.dimension_id,
            quantity: change.quantity,
            state: change.state,
            recorded_at: change.recorded_at,
        };
        self.guard.next_change_id += 1;
        self.guard.changes.push(stored.clone());
        Ok(stored)
    }

    async fn list_item_changes(&mut self, item_id: Id) -> StoreResult<Vec<ItemChange>> {
        Ok(self
            .guard
            .changes
            .iter()
            .filter(|c| c.item_id == item_id)
            .cloned()
            .collect())
    }

    async fn lock_idempotency_key(&mut self, _key: &IdempotencyKey) -> StoreResult<()> {
        // The transaction already holds the whole state
        Ok(())
    }

    async fn idempotency_key_exists(&mut self, key: &IdempotencyKey) -> StoreResult<bool> {
        Ok(self.guard.keys.contains_key(key))
    }

    async fn insert_idempotency_key(
        &mut self,
        key: &IdempotencyKey,
        processed_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        if self.guard.keys.contains_key(key) {
            return Err(StoreError::Constraint {
                kind: ConstraintKind::IdempotencyKey,
                message: format!("key {} already processed", key),
            });
        }
        self.guard.keys.insert(key.clone(), processed_at);
        Ok(())
    }

    async fn delete_idempotency_keys_before(&mut self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let before = self.guard.keys.len();
        self.guard.keys.retain(|_, processed_at| *processed_at >= cutoff);
        Ok((before - self.guard.keys.len()) as u64)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut tx = self;
        tx.snapshot = None;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        // Drop restores the snapshot
        Ok(())
    }
}

#[async_trait::async_trait]
impl CatalogStore for MemoryStore {
    async fn create_product(&self, new: NewProduct) -> StoreResult<Product> {
        let mut state = self.state.lock().await;

        let taken = |name: &str| {
            let name = name.to_lowercase();
            state.products.values().any(|p| {
                p.name_singular.to_lowercase() == name || p.name_plural.to_lowercase() == name
            })
        };
        if taken(&new.name_singular) || taken(&new.name_plural) {
            return Err(StoreError::Constraint {
                kind: ConstraintKind::ProductName,
                message: format!("product '{}' already exists", new.name_singular),
            });
        }

        let mut dimensions = Vec::with_capacity(new.dimension_ids.len());
        for dimension_id in &new.dimension_ids {
            let dimension = state
                .dimensions
                .iter()
                .find(|d| d.id == *dimension_id)
                .cloned()
                .ok_or_else(|| StoreError::Constraint {
                    kind: ConstraintKind::Other,
                    message: format!("dimension {} does not exist", dimension_id),
                })?;
            dimensions.push(dimension);
        }

        let product = Product {
            id: state.next_product_id,
            name_singular: new.name_singular,
            name_plural: new.name_plural,
            dimensions,
        };
        state.next_product_id += 1;
        state.products.insert(product.id, product.clone());
        Ok(product)
    }
}
