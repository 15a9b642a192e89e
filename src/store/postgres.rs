//! PostgreSQL-backed list store.
//!
//! Unique violations (SQLSTATE `23505`) are classified by constraint name:
//!
//! | Constraint | ConstraintKind |
//! |------------|----------------|
//! | `idempotency_keys_key_unique` | `IdempotencyKey` |
//! | `items_one_added_per_product_dimension` | `AddedItem` |
//! | `products_name_singular_unique`, `products_name_plural_unique` | `ProductName` |
//! | anything else | `Other` |
//!
//! Every other sqlx error becomes `StoreError::Database` tagged with the
//! operation that failed.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnection, PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::collections::HashMap;

use crate::model::{
    Dimension, IdempotencyKey, Id, Item, ItemChange, ItemState, NewItem, NewItemChange, NewProduct,
    Product, Unit, UnknownItemState,
};
use crate::store::traits::{
    CatalogStore, ConstraintKind, ListStore, ListTransaction, ListedItem, StoreError, StoreResult,
};

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        use anyhow::Context;

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Apply the SQL files under `migrations/`
    pub async fn migrate(&self) -> anyhow::Result<()> {
        use anyhow::Context;

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait::async_trait]
impl ListStore for PostgresStore {
    async fn begin(&self) -> StoreResult<Box<dyn ListTransaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(Box::new(PostgresTransaction { tx }))
    }
}

#[async_trait::async_trait]
impl ListTransaction for PostgresTransaction {
    async fn get_product(&mut self, id: Id) -> StoreResult<Option<Product>> {
        let row = sqlx::query("SELECT id, name_singular, name_plural FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let dimensions = fetch_dimensions(&mut self.tx).await?;
        let links = fetch_product_dimension_links(&mut self.tx, Some(id)).await?;
        Ok(Some(product_from_row(&row, &dimensions, &links)?))
    }

    async fn list_products(&mut self) -> StoreResult<Vec<Product>> {
        let rows = sqlx::query(
            "SELECT id, name_singular, name_plural FROM products ORDER BY LOWER(name_singular)",
        )
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("list_products", e))?;

        let dimensions = fetch_dimensions(&mut self.tx).await?;
        let links = fetch_product_dimension_links(&mut self.tx, None).await?;
        rows.iter()
            .map(|row| product_from_row(row, &dimensions, &links))
            .collect()
    }

    async fn get_item(&mut self, id: Id) -> StoreResult<Option<Item>> {
        let row = sqlx::query(
            "SELECT id, product_id, dimension_id, quantity, state FROM items WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("get_item", e))?;

        row.as_ref().map(item_from_row).transpose()
    }

    async fn get_added_item(&mut self, product_id: Id, dimension_id: Id) -> StoreResult<Option<Item>> {
        let row = sqlx::query(
            r#"
            SELECT id, product_id, dimension_id, quantity, state
            FROM items
            WHERE product_id = $1 AND dimension_id = $2 AND state = 'added'
            FOR UPDATE
            "#,
        )
        .bind(product_id)
        .bind(dimension_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("get_added_item", e))?;

        row.as_ref().map(item_from_row).transpose()
    }

    async fn list_items(&mut self, state: ItemState) -> StoreResult<Vec<ListedItem>> {
        let rows = sqlx::query(
            r#"
            SELECT i.id, i.product_id, i.dimension_id, i.quantity, i.state,
                   MAX(c.id) AS last_change_id
            FROM items i
            LEFT JOIN item_changes c ON c.item_id = i.id
            WHERE i.state = $1
            GROUP BY i.id
            ORDER BY MAX(c.id) DESC NULLS LAST
            "#,
        )
        .bind(state.as_str())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("list_items", e))?;

        rows.iter()
            .map(|row| {
                Ok(ListedItem {
                    item: item_from_row(row)?,
                    last_change_id: get(row, "last_change_id")?,
                })
            })
            .collect()
    }

    async fn insert_item(&mut self, new: NewItem) -> StoreResult<Item> {
        let row = sqlx::query(
            r#"
            INSERT INTO items (product_id, dimension_id, quantity, state)
            VALUES ($1, $2, $3, 'added')
            RETURNING id, product_id, dimension_id, quantity, state
            "#,
        )
        .bind(new.product_id)
        .bind(new.dimension_id)
        .bind(new.quantity)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_item", e))?;

        item_from_row(&row)
    }

    async fn update_item(&mut self, item: &Item) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE items SET dimension_id = $1, quantity = $2, state = $3 WHERE id = $4",
        )
        .bind(item.dimension_id)
        .bind(item.quantity)
        .bind(item.state.as_str())
        .bind(item.id)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_item", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Corrupt(format!("item {} does not exist", item.id)));
        }
        Ok(())
    }

    async fn insert_item_change(&mut self, change: NewItemChange) -> StoreResult<ItemChange> {
        let row = sqlx::query(
            r#"
            INSERT INTO item_changes (item_id, user_id, dimension_id, quantity, state, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, item_id, user_id, dimension_id, quantity, state, recorded_at
            "#,
        )
        .bind(change.item_id)
        .bind(change.user_id)
        .bind(change.dimension_id)
        .bind(change.quantity)
        .bind(change.state.as_str())
        .bind(change.recorded_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_item_change", e))?;

        item_change_from_row(&row)
    }

    async fn list_item_changes(&mut self, item_id: Id) -> StoreResult<Vec<ItemChange>> {
        let rows = sqlx::query(
            r#"
            SELECT id, item_id, user_id, dimension_id, quantity, state, recorded_at
            FROM item_changes
            WHERE item_id = $1
            ORDER BY id
            "#,
        )
        .bind(item_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("list_item_changes", e))?;

        rows.iter().map(item_change_from_row).collect()
    }

    async fn lock_idempotency_key(&mut self, key: &IdempotencyKey) -> StoreResult<()> {
        // Released by commit or rollback
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(key.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_idempotency_key", e))?;
        Ok(())
    }

    async fn idempotency_key_exists(&mut self, key: &IdempotencyKey) -> StoreResult<bool> {
        let row = sqlx::query("SELECT 1 FROM idempotency_keys WHERE key = $1")
            .bind(key.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("idempotency_key_exists", e))?;
        Ok(row.is_some())
    }

    async fn insert_idempotency_key(
        &mut self,
        key: &IdempotencyKey,
        processed_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query("INSERT INTO idempotency_keys (key, processed_at) VALUES ($1, $2)")
            .bind(key.as_str())
            .bind(processed_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_idempotency_key", e))?;
        Ok(())
    }

    async fn delete_idempotency_keys_before(&mut self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM idempotency_keys WHERE processed_at < $1")
            .bind(cutoff)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_idempotency_keys", e))?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

#[async_trait::async_trait]
impl CatalogStore for PostgresStore {
    async fn create_product(&self, new: NewProduct) -> StoreResult<Product> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let row = sqlx::query(
            "INSERT INTO products (name_singular, name_plural) VALUES ($1, $2) RETURNING id, name_singular, name_plural",
        )
        .bind(&new.name_singular)
        .bind(&new.name_plural)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;
        let product_id: Id = get(&row, "id")?;

        for dimension_id in &new.dimension_ids {
            sqlx::query("INSERT INTO product_dimensions (product_id, dimension_id) VALUES ($1, $2)")
                .bind(product_id)
                .bind(*dimension_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("insert_product_dimension", e))?;
        }

        let dimensions = fetch_dimensions(&mut tx).await?;
        let links = fetch_product_dimension_links(&mut tx, Some(product_id)).await?;
        let product = product_from_row(&row, &dimensions, &links)?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(product)
    }
}

/// All dimensions with their units in display order
async fn fetch_dimensions(conn: &mut PgConnection) -> StoreResult<Vec<Dimension>> {
    let dimension_rows = sqlx::query("SELECT id, name FROM dimensions ORDER BY id")
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("list_dimensions", e))?;

    let unit_rows = sqlx::query(
        r#"
        SELECT id, dimension_id, name_singular, name_plural, conversion_to_base, conversion_from_base
        FROM units
        ORDER BY dimension_id, position
        "#,
    )
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("list_units", e))?;

    let mut units: HashMap<Id, Vec<Unit>> = HashMap::new();
    for row in &unit_rows {
        let dimension_id: Id = get(row, "dimension_id")?;
        units.entry(dimension_id).or_default().push(Unit {
            id: get(row, "id")?,
            name_singular: get(row, "name_singular")?,
            name_plural: get(row, "name_plural")?,
            conversion_to_base: get(row, "conversion_to_base")?,
            conversion_from_base: get(row, "conversion_from_base")?,
        });
    }

    dimension_rows
        .iter()
        .map(|row| {
            let id: Id = get(row, "id")?;
            Ok(Dimension {
                id,
                name: get(row, "name")?,
                units: units.remove(&id).unwrap_or_default(),
            })
        })
        .collect()
}

/// (product_id, dimension_id) pairs, optionally for one product
async fn fetch_product_dimension_links(
    conn: &mut PgConnection,
    product_id: Option<Id>,
) -> StoreResult<Vec<(Id, Id)>> {
    let rows = sqlx::query(
        r#"
        SELECT product_id, dimension_id
        FROM product_dimensions
        WHERE $1::BIGINT IS NULL OR product_id = $1
        ORDER BY product_id, dimension_id
        "#,
    )
    .bind(product_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("list_product_dimensions", e))?;

    rows.iter()
        .map(|row| Ok((get(row, "product_id")?, get(row, "dimension_id")?)))
        .collect()
}

fn product_from_row(row: &PgRow, dimensions: &[Dimension], links: &[(Id, Id)]) -> StoreResult<Product> {
    let id: Id = get(row, "id")?;
    let dimensions = links
        .iter()
        .filter(|(product_id, _)| *product_id == id)
        .filter_map(|(_, dimension_id)| dimensions.iter().find(|d| d.id == *dimension_id))
        .cloned()
        .collect();

    Ok(Product {
        id,
        name_singular: get(row, "name_singular")?,
        name_plural: get(row, "name_plural")?,
        dimensions,
    })
}

fn item_from_row(row: &PgRow) -> StoreResult<Item> {
    Ok(Item {
        id: get(row, "id")?,
        product_id: get(row, "product_id")?,
        dimension_id: get(row, "dimension_id")?,
        quantity: get(row, "quantity")?,
        state: state_from_row(row)?,
    })
}

fn item_change_from_row(row: &PgRow) -> StoreResult<ItemChange> {
    Ok(ItemChange {
        id: get(row, "id")?,
        item_id: get(row, "item_id")?,
        user_id: get(row, "user_id")?,
        dimension_id: get(row, "dimension_id")?,
        quantity: get(row, "quantity")?,
        state: state_from_row(row)?,
        recorded_at: get(row, "recorded_at")?,
    })
}

fn state_from_row(row: &PgRow) -> StoreResult<ItemState> {
    let state: String = get(row, "state")?;
    state
        .parse()
        .map_err(|e: UnknownItemState| StoreError::Corrupt(e.to_string()))
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Corrupt(format!("column '{}': {}", column, e)))
}

/// Map sqlx errors to StoreError.
fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            let kind = match db_err.constraint() {
                Some("idempotency_keys_key_unique") => ConstraintKind::IdempotencyKey,
                Some("items_one_added_per_product_dimension") => ConstraintKind::AddedItem,
                Some("products_name_singular_unique") | Some("products_name_plural_unique") => {
                    ConstraintKind::ProductName
                }
                _ => ConstraintKind::Other,
            };
            return StoreError::Constraint {
                kind,
                message: format!("{} in {}", db_err.message(), operation),
            };
        }
    }
    StoreError::Database {
        operation,
        source: err,
    }
}
