//! Item state machine and quantity merging.
//!
//! Every write goes through a caller-owned transaction and appends exactly one
//! `ItemChange` per item transition. Reads that decide between "create" and
//! "merge" happen inside the same transaction as the write.

use chrono::{DateTime, Utc};

use crate::logic::quantity::{BaseQuantity, QuantityError};
use crate::model::{Id, Item, ItemState, NewItem, NewItemChange};
use crate::store::{ListTransaction, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Quantity(#[from] QuantityError),
    /// Undo was requested for a state the item is no longer in
    #[error("item {item_id} is {actual}, expected {expected}")]
    UnexpectedState {
        item_id: Id,
        expected: ItemState,
        actual: ItemState,
    },
    #[error("item {item_id} cannot go from {from} to {to}")]
    InvalidTransition {
        item_id: Id,
        from: ItemState,
        to: ItemState,
    },
    #[error("item {item_id} is {state}; only added items have an adjustable quantity")]
    NotOnList { item_id: Id, state: ItemState },
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct ItemLifecycle<'t, T: ListTransaction + ?Sized> {
    tx: &'t mut T,
    user_id: Id,
    now: DateTime<Utc>,
}

impl<'t, T: ListTransaction + ?Sized> ItemLifecycle<'t, T> {
    pub fn new(tx: &'t mut T, user_id: Id) -> Self {
        Self {
            tx,
            user_id,
            now: Utc::now(),
        }
    }

    /// Puts `delta` of a product on the list, merging into the existing
    /// `added` item for the dimension when there is one.
    pub async fn add(
        &mut self,
        product_id: Id,
        dimension_id: Id,
        delta: BaseQuantity,
    ) -> Result<Item, LifecycleError> {
        match self.tx.get_added_item(product_id, dimension_id).await? {
            Some(existing) => self.merge_into(existing, delta).await,
            None => {
                let item = self
                    .tx
                    .insert_item(NewItem {
                        product_id,
                        dimension_id,
                        quantity: delta.get(),
                    })
                    .await?;
                self.record(&item).await?;
                Ok(item)
            }
        }
    }

    /// Sets an absolute quantity, possibly in another dimension of the same
    /// product. When the target dimension already has an `added` item, this
    /// item is removed and the other one absorbs the quantity.
    pub async fn set_quantity(
        &mut self,
        mut item: Item,
        dimension_id: Id,
        quantity: BaseQuantity,
    ) -> Result<Item, LifecycleError> {
        if item.state != ItemState::Added {
            return Err(LifecycleError::NotOnList {
                item_id: item.id,
                state: item.state,
            });
        }

        if item.dimension_id != dimension_id {
            if let Some(other) = self.tx.get_added_item(item.product_id, dimension_id).await? {
                // Bounds first, so a rejected merge writes nothing
                quantity.merged_with(other.quantity)?;
                self.remove(item).await?;
                return self.merge_into(other, quantity).await;
            }
        }

        item.dimension_id = dimension_id;
        item.quantity = quantity.get();
        self.tx.update_item(&item).await?;
        self.record(&item).await?;
        Ok(item)
    }

    pub async fn check(&mut self, item: Item) -> Result<Item, LifecycleError> {
        self.transition(item, ItemState::Gathered).await
    }

    pub async fn remove(&mut self, item: Item) -> Result<Item, LifecycleError> {
        self.transition(item, ItemState::Removed).await
    }

    /// Brings a gathered or removed item back onto the list. `expected` is the
    /// state the caller saw; a mismatch means someone else already acted.
    /// If the product was re-added in the meantime, the quantity is merged
    /// into that item instead and this one keeps its state.
    pub async fn undo(&mut self, item: Item, expected: ItemState) -> Result<Item, LifecycleError> {
        if item.state != expected {
            return Err(LifecycleError::UnexpectedState {
                item_id: item.id,
                expected,
                actual: item.state,
            });
        }
        if !item.state.can_transition_to(ItemState::Added) {
            return Err(LifecycleError::InvalidTransition {
                item_id: item.id,
                from: item.state,
                to: ItemState::Added,
            });
        }

        match self
            .tx
            .get_added_item(item.product_id, item.dimension_id)
            .await?
        {
            Some(other) => {
                let quantity = BaseQuantity::new(item.quantity)?;
                self.merge_into(other, quantity).await
            }
            None => self.transition(item, ItemState::Added).await,
        }
    }

    async fn merge_into(&mut self, mut existing: Item, delta: BaseQuantity) -> Result<Item, LifecycleError> {
        existing.quantity = delta.merged_with(existing.quantity)?.get();
        self.tx.update_item(&existing).await?;
        self.record(&existing).await?;
        Ok(existing)
    }

    async fn transition(&mut self, mut item: Item, to: ItemState) -> Result<Item, LifecycleError> {
        if !item.state.can_transition_to(to) {
            return Err(LifecycleError::InvalidTransition {
                item_id: item.id,
                from: item.state,
                to,
            });
        }
        item.state = to;
        self.tx.update_item(&item).await?;
        self.record(&item).await?;
        Ok(item)
    }

    async fn record(&mut self, item: &Item) -> Result<(), StoreError> {
        self.tx
            .insert_item_change(NewItemChange::of(item, self.user_id, self.now))
            .await?;
        Ok(())
    }
}
