//! The five mutating list operations.
//!
//! Each call runs validation, the lifecycle writes and key admission in one
//! transaction: `begin -> key lock and replay check -> apply -> admit ->
//! commit`. Field errors and hard errors roll back before the key is
//! admitted, so a client may retry them with the same key.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::logic::idempotency::{self, Admission};
use crate::logic::lifecycle::{ItemLifecycle, LifecycleError};
use crate::logic::quantity::{parse_base_quantity, BaseQuantity};
use crate::model::{
    Dimension, FieldErrors, IdempotencyKey, Id, Item, ItemState, Product, Unit, UserContext,
};
use crate::store::{ConstraintKind, ListStore, ListTransaction, StoreError};

const CHOOSE_A_UNIT: &str = "Choose a unit";

/// Page the client is sent to after a successful mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Plan,
    Shop,
}

impl Destination {
    pub fn path(&self) -> &'static str {
        match self {
            Destination::Plan => "/plan",
            Destination::Shop => "/shop",
        }
    }

    /// Undoing a gather returns to the shop view, anything else to the plan
    fn after_undo(old_state: &str) -> Self {
        match old_state.parse::<ItemState>() {
            Ok(ItemState::Gathered) => Destination::Shop,
            _ => Destination::Plan,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The effect is committed. `replayed` is set when it was committed by an
    /// earlier request carrying the same key.
    Done {
        destination: Destination,
        replayed: bool,
    },
    /// Nothing was written and the key was not consumed
    Rejected(FieldErrors),
}

#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Id },
    #[error("item {item_id} cannot go from {from} to {to}")]
    InvalidTransition {
        item_id: Id,
        from: ItemState,
        to: ItemState,
    },
    #[error("item {item_id} is {state}, not on the list")]
    NotOnList { item_id: Id, state: ItemState },
    /// A concurrent request created the `added` item first
    #[error("concurrent change to the list: {0}")]
    Conflict(String),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for MutationError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Constraint {
                kind: ConstraintKind::AddedItem,
                message,
            } => MutationError::Conflict(message),
            other => MutationError::Store(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddItem {
    pub product_id: Id,
    /// `None` when the form carried no usable unit
    pub unit_id: Option<Id>,
    pub quantity: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetQuantity {
    pub item_id: Id,
    pub unit_id: Option<Id>,
    pub quantity: String,
}

/// States arrive as form text and are validated as fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Undo {
    pub item_id: Id,
    pub old_state: String,
    pub new_state: String,
}

/// What the apply step of an operation produced: where to go next, field
/// errors to report, or a hard error.
type Applied = Result<Result<Destination, FieldErrors>, MutationError>;

pub struct ListService<S: ListStore + ?Sized> {
    store: Arc<S>,
}

impl<S: ListStore + ?Sized> Clone for ListService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: ListStore + ?Sized> ListService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn add_item(
        &self,
        user: &UserContext,
        key: &IdempotencyKey,
        request: AddItem,
    ) -> Result<Outcome, MutationError> {
        let mut tx = self.store.begin().await?;
        if idempotency::already_processed(&mut *tx, key).await? {
            return replayed(tx, "add item", key, Destination::Plan).await;
        }
        let applied = apply_add(&mut *tx, user, &request).await;
        finish(tx, "add item", key, applied).await
    }

    pub async fn set_quantity(
        &self,
        user: &UserContext,
        key: &IdempotencyKey,
        request: SetQuantity,
    ) -> Result<Outcome, MutationError> {
        let mut tx = self.store.begin().await?;
        if idempotency::already_processed(&mut *tx, key).await? {
            return replayed(tx, "set quantity", key, Destination::Plan).await;
        }
        let applied = apply_set_quantity(&mut *tx, user, &request).await;
        finish(tx, "set quantity", key, applied).await
    }

    /// added -> gathered
    pub async fn check_item(
        &self,
        user: &UserContext,
        key: &IdempotencyKey,
        item_id: Id,
    ) -> Result<Outcome, MutationError> {
        let mut tx = self.store.begin().await?;
        if idempotency::already_processed(&mut *tx, key).await? {
            return replayed(tx, "check item", key, Destination::Shop).await;
        }
        let applied = apply_transition(&mut *tx, user, item_id, ItemState::Gathered).await;
        finish(tx, "check item", key, applied).await
    }

    /// added -> removed
    pub async fn remove_item(
        &self,
        user: &UserContext,
        key: &IdempotencyKey,
        item_id: Id,
    ) -> Result<Outcome, MutationError> {
        let mut tx = self.store.begin().await?;
        if idempotency::already_processed(&mut *tx, key).await? {
            return replayed(tx, "remove item", key, Destination::Plan).await;
        }
        let applied = apply_transition(&mut *tx, user, item_id, ItemState::Removed).await;
        finish(tx, "remove item", key, applied).await
    }

    /// gathered/removed -> added
    pub async fn undo(
        &self,
        user: &UserContext,
        key: &IdempotencyKey,
        request: Undo,
    ) -> Result<Outcome, MutationError> {
        let mut tx = self.store.begin().await?;
        if idempotency::already_processed(&mut *tx, key).await? {
            let destination = Destination::after_undo(&request.old_state);
            return replayed(tx, "undo", key, destination).await;
        }
        let applied = apply_undo(&mut *tx, user, &request).await;
        finish(tx, "undo", key, applied).await
    }
}

async fn apply_add(tx: &mut dyn ListTransaction, user: &UserContext, request: &AddItem) -> Applied {
    let product = load_product(tx, request.product_id).await?;
    let (dimension, unit, quantity) = match read_quantity(&product, request.unit_id, &request.quantity) {
        Ok(parsed) => parsed,
        Err(errors) => return Ok(Err(errors)),
    };

    let mut engine = ItemLifecycle::new(tx, user.user_id);
    let result = engine.add(product.id, dimension.id, quantity).await;
    settle(result, Some(unit), Destination::Plan)
}

async fn apply_set_quantity(
    tx: &mut dyn ListTransaction,
    user: &UserContext,
    request: &SetQuantity,
) -> Applied {
    let item = load_item(tx, request.item_id).await?;
    let product = load_product(tx, item.product_id).await?;
    let (dimension, unit, quantity) = match read_quantity(&product, request.unit_id, &request.quantity) {
        Ok(parsed) => parsed,
        Err(errors) => return Ok(Err(errors)),
    };

    let mut engine = ItemLifecycle::new(tx, user.user_id);
    let result = engine.set_quantity(item, dimension.id, quantity).await;
    settle(result, Some(unit), Destination::Plan)
}

async fn apply_transition(
    tx: &mut dyn ListTransaction,
    user: &UserContext,
    item_id: Id,
    to: ItemState,
) -> Applied {
    let item = load_item(tx, item_id).await?;

    let mut engine = ItemLifecycle::new(tx, user.user_id);
    let (result, destination) = match to {
        ItemState::Gathered => (engine.check(item).await, Destination::Shop),
        ItemState::Removed => (engine.remove(item).await, Destination::Plan),
        ItemState::Added => {
            return Err(MutationError::InvalidTransition {
                item_id,
                from: item.state,
                to,
            })
        }
    };
    settle(result, None, destination)
}

async fn apply_undo(tx: &mut dyn ListTransaction, user: &UserContext, request: &Undo) -> Applied {
    let item = load_item(tx, request.item_id).await?;

    let mut errors = FieldErrors::new();
    if request.new_state.parse::<ItemState>() != Ok(ItemState::Added) {
        errors.insert("new_state", "Undo can only put an item back on the list");
    }
    let old_state = match request.old_state.parse::<ItemState>() {
        Ok(state @ (ItemState::Gathered | ItemState::Removed)) => Some(state),
        _ => {
            errors.insert("old_state", "Undo needs the state the item was in");
            None
        }
    };
    let Some(old_state) = old_state.filter(|_| errors.is_empty()) else {
        return Ok(Err(errors));
    };

    // Used to word a merge that would pass the maximum
    let product = load_product(tx, item.product_id).await?;
    let unit = product
        .dimension(item.dimension_id)
        .and_then(|d| d.units.first())
        .cloned();

    let mut engine = ItemLifecycle::new(tx, user.user_id);
    let result = engine.undo(item, old_state).await;
    settle(result, unit.as_ref(), Destination::after_undo(old_state.as_str()))
}

/// Unit choice and quantity text to a dimension and bounded base quantity.
fn read_quantity<'p>(
    product: &'p Product,
    unit_id: Option<Id>,
    text: &str,
) -> Result<(&'p Dimension, &'p Unit, BaseQuantity), FieldErrors> {
    let Some((dimension, unit)) = unit_id.and_then(|id| product.find_unit(id)) else {
        return Err(FieldErrors::single("unit_id", CHOOSE_A_UNIT));
    };
    let quantity =
        parse_base_quantity(text, unit).map_err(|e| FieldErrors::single("quantity", e.message(unit)))?;
    Ok((dimension, unit, quantity))
}

/// Sorts a lifecycle result into success, field errors or a hard error.
/// `unit` words quantity messages in the unit the user entered.
fn settle(result: Result<Item, LifecycleError>, unit: Option<&Unit>, destination: Destination) -> Applied {
    match result {
        Ok(_) => Ok(Ok(destination)),
        Err(LifecycleError::Quantity(e)) => {
            let message = match unit {
                Some(unit) => e.message(unit),
                None => e.to_string(),
            };
            Ok(Err(FieldErrors::single("quantity", message)))
        }
        Err(LifecycleError::UnexpectedState { actual, .. }) => Ok(Err(FieldErrors::single(
            "old_state",
            format!("This item has already been changed; it is now {}", actual),
        ))),
        Err(LifecycleError::InvalidTransition { item_id, from, to }) => {
            Err(MutationError::InvalidTransition { item_id, from, to })
        }
        Err(LifecycleError::NotOnList { item_id, state }) => Err(MutationError::NotOnList { item_id, state }),
        Err(LifecycleError::Store(e)) => Err(e.into()),
    }
}

async fn load_item(tx: &mut dyn ListTransaction, item_id: Id) -> Result<Item, MutationError> {
    tx.get_item(item_id).await?.ok_or(MutationError::NotFound {
        entity: "item",
        id: item_id,
    })
}

async fn load_product(tx: &mut dyn ListTransaction, product_id: Id) -> Result<Product, MutationError> {
    tx.get_product(product_id).await?.ok_or(MutationError::NotFound {
        entity: "product",
        id: product_id,
    })
}

/// Admits the key and commits, or rolls back when the apply step did not
/// succeed or the key turns out to be taken.
async fn finish(
    mut tx: Box<dyn ListTransaction>,
    action: &'static str,
    key: &IdempotencyKey,
    applied: Applied,
) -> Result<Outcome, MutationError> {
    let destination = match applied {
        Ok(Ok(destination)) => destination,
        Ok(Err(errors)) => {
            rollback(tx, action).await;
            log::debug!("Rejected {}: {:?}", action, errors);
            return Ok(Outcome::Rejected(errors));
        }
        Err(e) => {
            rollback(tx, action).await;
            return Err(e);
        }
    };

    match idempotency::admit(&mut *tx, key, Utc::now()).await {
        Ok(Admission::First) => {
            tx.commit().await?;
            log::info!("Committed {} ({})", action, key);
            Ok(Outcome::Done {
                destination,
                replayed: false,
            })
        }
        Ok(Admission::AlreadyProcessed) => replayed(tx, action, key, destination).await,
        Err(e) => {
            rollback(tx, action).await;
            Err(e.into())
        }
    }
}

async fn replayed(
    tx: Box<dyn ListTransaction>,
    action: &'static str,
    key: &IdempotencyKey,
    destination: Destination,
) -> Result<Outcome, MutationError> {
    rollback(tx, action).await;
    log::debug!("Replayed {} ({}), nothing applied", action, key);
    Ok(Outcome::Done {
        destination,
        replayed: true,
    })
}

async fn rollback(tx: Box<dyn ListTransaction>, action: &'static str) {
    if let Err(e) = tx.rollback().await {
        log::warn!("Rollback of {} failed: {}", action, e);
    }
}
