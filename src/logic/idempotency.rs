//! Idempotency ledger.
//!
//! A key is admitted by inserting it in the same transaction as the
//! mutation it guards. The store's unique constraint decides the winner when
//! two requests race with the same key: the loser sees a typed
//! `ConstraintKind::IdempotencyKey` violation and rolls back.
//!
//! Requests carrying the same key are also serialised on the key itself
//! before they read any item, so the second of two concurrent submissions
//! finds the first one's key rather than the item state it produced.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::model::IdempotencyKey;
use crate::store::{ConstraintKind, ListStore, ListTransaction, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First time the key is seen; commit the work
    First,
    /// An earlier commit already used the key; discard the work
    AlreadyProcessed,
}

pub async fn admit<T: ListTransaction + ?Sized>(
    tx: &mut T,
    key: &IdempotencyKey,
    processed_at: DateTime<Utc>,
) -> StoreResult<Admission> {
    match tx.insert_idempotency_key(key, processed_at).await {
        Ok(()) => Ok(Admission::First),
        Err(e) if e.constraint_kind() == Some(ConstraintKind::IdempotencyKey) => {
            Ok(Admission::AlreadyProcessed)
        }
        Err(e) => Err(e),
    }
}

/// Check made before any work. Waits out a concurrent request holding the
/// same key first, so a double submission sees the earlier commit instead of
/// the state it left behind. `admit` still has the final say.
pub async fn already_processed<T: ListTransaction + ?Sized>(
    tx: &mut T,
    key: &IdempotencyKey,
) -> StoreResult<bool> {
    tx.lock_idempotency_key(key).await?;
    tx.idempotency_key_exists(key).await
}

/// Deletes keys processed before `now - retention` in a transaction of its own.
pub async fn sweep_once<S: ListStore + ?Sized>(store: &S, retention: chrono::Duration) -> StoreResult<u64> {
    let cutoff = Utc::now() - retention;
    let mut tx = store.begin().await?;
    let deleted = tx.delete_idempotency_keys_before(cutoff).await?;
    tx.commit().await?;
    Ok(deleted)
}

/// Runs `sweep_once` every `interval`, starting immediately. A failed sweep
/// stops the sweeper; request handling is not affected.
pub fn spawn_key_sweeper<S: ListStore + ?Sized + 'static>(
    store: Arc<S>,
    interval: Duration,
    retention: chrono::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match sweep_once(&*store, retention).await {
                Ok(0) => log::debug!("Idempotency sweep removed nothing"),
                Ok(deleted) => log::info!("Idempotency sweep removed {} expired keys", deleted),
                Err(e) => {
                    log::error!("Idempotency sweep failed, stopping sweeper: {}", e);
                    break;
                }
            }
        }
    })
}
