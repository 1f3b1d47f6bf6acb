mod availability;
mod conflict;
mod error;
mod journal;
mod mutations;
mod queries;
mod store;

pub use availability::{busy_periods, free_slots, gaps};
pub use conflict::find_conflict;
pub use error::EngineError;
pub use journal::WalStore;
pub use store::{BookingStore, InMemoryStore, StoreError};

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::model::*;

type ScopeLock = Arc<Mutex<()>>;

/// The availability engine.
///
/// Holds no booking state of its own: everything lives in the store. What it
/// does own is one mutex per `(room, date)` scope, so the availability check and
/// the write that follows it run without another writer touching that scope.
pub struct Engine {
    store: Arc<dyn BookingStore>,
    scope_locks: DashMap<Scope, ScopeLock>,
}

impl Engine {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self {
            store,
            scope_locks: DashMap::new(),
        }
    }

    /// Engine over a fresh [`InMemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    fn scope_lock(&self, scope: Scope) -> ScopeLock {
        self.scope_locks.entry(scope).or_default().clone()
    }

    pub(super) async fn lock_scope(&self, scope: Scope) -> OwnedMutexGuard<()> {
        self.scope_lock(scope).lock_owned().await
    }

    /// Lock two scopes (possibly the same one) in sorted order to prevent deadlocks.
    pub(super) async fn lock_scopes(&self, a: Scope, b: Scope) -> Vec<OwnedMutexGuard<()>> {
        let mut scopes = vec![a, b];
        scopes.sort();
        scopes.dedup();
        let mut guards = Vec::with_capacity(scopes.len());
        for scope in scopes {
            guards.push(self.lock_scope(scope).await);
        }
        guards
    }

    /// Drop scope locks nobody holds or waits on. Returns how many were removed.
    pub fn prune_scope_locks(&self) -> usize {
        let before = self.scope_locks.len();
        self.scope_locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - self.scope_locks.len()
    }

    pub fn scope_lock_count(&self) -> usize {
        self.scope_locks.len()
    }

    pub(super) async fn require_room(&self, room_id: RoomId) -> Result<Room, EngineError> {
        self.store
            .get_room(room_id)
            .await?
            .ok_or(EngineError::RoomNotFound(room_id))
    }
}
