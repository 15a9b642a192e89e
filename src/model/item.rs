use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::model::Id;

pub const MIN_QUANTITY: i64 = 1;
pub const MAX_QUANTITY: i64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    /// On the list, waiting to be bought
    Added,
    /// Put into the basket
    Gathered,
    /// Taken off the list without buying
    Removed,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Added => "added",
            ItemState::Gathered => "gathered",
            ItemState::Removed => "removed",
        }
    }

    /// The item state machine. `gathered` and `removed` are only ever left
    /// by going back to `added`.
    pub fn can_transition_to(self, to: ItemState) -> bool {
        matches!(
            (self, to),
            (ItemState::Added, ItemState::Gathered)
                | (ItemState::Added, ItemState::Removed)
                | (ItemState::Gathered, ItemState::Added)
                | (ItemState::Removed, ItemState::Added)
        )
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown item state '{0}'")]
pub struct UnknownItemState(pub String);

impl FromStr for ItemState {
    type Err = UnknownItemState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "added" => Ok(ItemState::Added),
            "gathered" => Ok(ItemState::Gathered),
            "removed" => Ok(ItemState::Removed),
            other => Err(UnknownItemState(other.to_string())),
        }
    }
}

/// A pending quantity of a product in one dimension. Rows are never deleted;
/// only state and quantity change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: Id,
    pub product_id: Id,
    pub dimension_id: Id,
    /// In base units of the dimension
    pub quantity: i64,
    pub state: ItemState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub product_id: Id,
    pub dimension_id: Id,
    pub quantity: i64,
}

/// Append-only audit record of one committed transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemChange {
    pub id: Id,
    pub item_id: Id,
    pub user_id: Id,
    pub dimension_id: Id,
    pub quantity: i64,
    pub state: ItemState,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItemChange {
    pub item_id: Id,
    pub user_id: Id,
    pub dimension_id: Id,
    pub quantity: i64,
    pub state: ItemState,
    pub recorded_at: DateTime<Utc>,
}

impl NewItemChange {
    pub fn of(item: &Item, user_id: Id, recorded_at: DateTime<Utc>) -> Self {
        Self {
            item_id: item.id,
            user_id,
            dimension_id: item.dimension_id,
            quantity: item.quantity,
            state: item.state,
            recorded_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use ItemState::*;

        let allowed = [(Added, Gathered), (Added, Removed), (Gathered, Added), (Removed, Added)];
        for from in [Added, Gathered, Removed] {
            for to in [Added, Gathered, Removed] {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_state_text_round_trips_through_storage_form() {
        assert_eq!("gathered".parse::<ItemState>(), Ok(ItemState::Gathered));
        assert_eq!(ItemState::Removed.to_string(), "removed");
        let err = "deleted".parse::<ItemState>().unwrap_err();
        assert_eq!(err.to_string(), "unknown item state 'deleted'");
    }
}
