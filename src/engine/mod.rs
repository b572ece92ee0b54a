mod approval;
mod conflict;
mod error;
mod mutations;
mod queries;

pub use conflict::{find_conflicts, has_conflict};
pub use error::EngineError;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, MutexGuard, OwnedRwLockWriteGuard, RwLock};

use crate::model::*;
use crate::notify::NotifyHub;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

/// The reservation store. Each room's reservations sit behind that room's
/// lock; every check-then-write runs under the write lock.
pub struct Engine {
    pub(super) rooms: DashMap<RoomId, SharedRoomState>,
    /// Reverse lookup: reservation id → room id
    pub(super) reservation_to_room: DashMap<ReservationId, RoomId>,
    /// Held while a new id is computed and inserted, so `max + 1` stays unique.
    pub(super) ids: Mutex<()>,
    pub notify: Arc<NotifyHub>,
}

impl Engine {
    pub fn new(notify: Arc<NotifyHub>) -> Self {
        Self {
            rooms: DashMap::new(),
            reservation_to_room: DashMap::new(),
            ids: Mutex::new(()),
            notify,
        }
    }

    pub fn get_room_state(&self, id: &RoomId) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn get_room_for_reservation(&self, id: &ReservationId) -> Option<RoomId> {
        self.reservation_to_room.get(id).map(|e| *e.value())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn reservation_count(&self) -> usize {
        self.reservation_to_room.len()
    }

    /// `max(existing ids, 0) + 1`. Caller holds `ids`.
    pub(super) fn next_reservation_id(&self, _ids: &MutexGuard<'_, ()>) -> ReservationId {
        self.reservation_to_room
            .iter()
            .map(|e| *e.key())
            .max()
            .unwrap_or(0)
            + 1
    }

    /// `max(existing ids, 0) + 1`. Caller holds `ids`.
    pub(super) fn next_room_id(&self, _ids: &MutexGuard<'_, ()>) -> RoomId {
        self.rooms.iter().map(|e| *e.key()).max().unwrap_or(0) + 1
    }

    /// Every room handle, collected up front so no map shard stays locked
    /// across an await.
    pub(super) fn room_handles(&self) -> Vec<SharedRoomState> {
        self.rooms.iter().map(|e| e.value().clone()).collect()
    }

    /// Lookup reservation → room, acquire the room's write lock.
    pub(super) async fn resolve_reservation_write(
        &self,
        id: ReservationId,
    ) -> Result<OwnedRwLockWriteGuard<RoomState>, EngineError> {
        let room_id = self
            .get_room_for_reservation(&id)
            .ok_or(EngineError::ReservationNotFound(id))?;
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::ReservationNotFound(id))?;
        let guard = rs.write_owned().await;
        if guard.deleted || guard.get(id).is_none() {
            return Err(EngineError::ReservationNotFound(id));
        }
        Ok(guard)
    }

    pub(super) fn publish(&self, event: Event) {
        tracing::debug!(?event, "publishing reservation event");
        self.notify.send(&event);
    }
}
