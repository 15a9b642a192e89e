use serde::{Deserialize, Serialize};

use crate::model::Id;

/// Authenticated user on whose behalf a mutation runs; recorded in the audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: Id,
}

impl UserContext {
    pub fn new(user_id: Id) -> Self {
        Self { user_id }
    }
}
