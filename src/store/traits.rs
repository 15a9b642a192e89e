use chrono::{DateTime, Utc};

use crate::model::{
    IdempotencyKey, Id, Item, ItemChange, ItemState, NewItem, NewItemChange, NewProduct,
    Product,
};

/// Which unique constraint a rejected write ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// The idempotency key was admitted by an earlier commit
    IdempotencyKey,
    /// Another `added` item exists for the same product and dimension
    AddedItem,
    ProductName,
    Other,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind:?} constraint violated: {message}")]
    Constraint { kind: ConstraintKind, message: String },
    #[error("database error in {operation}: {source}")]
    Database {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn constraint_kind(&self) -> Option<ConstraintKind> {
        match self {
            StoreError::Constraint { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// An item together with the id of its newest change, used for
/// "most recently touched" ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedItem {
    pub item: Item,
    pub last_change_id: Option<Id>,
}

/// Entry point for the mutation path: every action runs in its own transaction.
#[async_trait::async_trait]
pub trait ListStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn ListTransaction>>;
}

/// All reads and writes of one user action. Dropping a transaction without
/// calling `commit` discards every write made through it.
#[async_trait::async_trait]
pub trait ListTransaction: Send {
    async fn get_product(&mut self, id: Id) -> StoreResult<Option<Product>>;
    async fn list_products(&mut self) -> StoreResult<Vec<Product>>;

    /// Reads an item and locks it for the rest of the transaction
    async fn get_item(&mut self, id: Id) -> StoreResult<Option<Item>>;
    /// The single `added` item for (product, dimension), locked
    async fn get_added_item(&mut self, product_id: Id, dimension_id: Id) -> StoreResult<Option<Item>>;
    /// Items in `state` ordered by their newest change, most recent first
    async fn list_items(&mut self, state: ItemState) -> StoreResult<Vec<ListedItem>>;
    async fn insert_item(&mut self, item: NewItem) -> StoreResult<Item>;
    async fn update_item(&mut self, item: &Item) -> StoreResult<()>;

    async fn insert_item_change(&mut self, change: NewItemChange) -> StoreResult<ItemChange>;
    /// Changes of one item in commit order
    async fn list_item_changes(&mut self, item_id: Id) -> StoreResult<Vec<ItemChange>>;

    /// Blocks until no other open transaction holds `key`, then holds it
    /// until this transaction ends
    async fn lock_idempotency_key(&mut self, key: &IdempotencyKey) -> StoreResult<()>;
    async fn idempotency_key_exists(&mut self, key: &IdempotencyKey) -> StoreResult<bool>;
    /// Fails with `ConstraintKind::IdempotencyKey` when the key is already present
    async fn insert_idempotency_key(
        &mut self,
        key: &IdempotencyKey,
        processed_at: DateTime<Utc>,
    ) -> StoreResult<()>;
    async fn delete_idempotency_keys_before(&mut self, cutoff: DateTime<Utc>) -> StoreResult<u64>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// Catalogue writes made outside the list transactions, used for seeding.
#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
    async fn create_product(&self, product: NewProduct) -> StoreResult<Product>;
}

pub trait Store: ListStore + CatalogStore + Send + Sync {}

impl<T: ListStore + CatalogStore + Send + Sync> Store for T {}
