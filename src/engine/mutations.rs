use std::sync::Arc;

use tokio::sync::{MutexGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::info;

use crate::limits::*;
use crate::model::*;

use super::conflict::{
    check_no_conflict, now_ms, validate_attendees, validate_new_reservation, validate_new_room,
    validate_notes, validate_phone, validate_span, validate_title,
};
use super::{Engine, EngineError};

impl Engine {
    // ── Rooms ────────────────────────────────────────────────

    pub async fn create_room(&self, input: NewRoom) -> Result<Room, EngineError> {
        validate_new_room(&input)?;
        if self.rooms.len() >= MAX_ROOMS {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }

        let ids = self.ids.lock().await;
        let id = self.next_room_id(&ids);
        let room = input.into_room(id);
        self.rooms
            .insert(id, Arc::new(RwLock::new(RoomState::new(room.clone()))));
        drop(ids);

        info!(room_id = id, name = %room.name, "room created");
        Ok(room)
    }

    pub async fn update_room(&self, id: RoomId, patch: RoomPatch) -> Result<Room, EngineError> {
        if let Some(name) = &patch.name {
            if name.trim().is_empty() {
                return Err(EngineError::Validation("room name is required"));
            }
            if name.len() > MAX_NAME_LEN {
                return Err(EngineError::LimitExceeded("room name too long"));
            }
        }
        if patch.capacity == Some(0) {
            return Err(EngineError::Validation("room capacity must be positive"));
        }

        let rs = self.get_room_state(&id).ok_or(EngineError::RoomNotFound(id))?;
        let mut guard = rs.write().await;
        if guard.deleted {
            return Err(EngineError::RoomNotFound(id));
        }
        // Live bookings must still fit.
        if let Some(capacity) = patch.capacity
            && guard
                .reservations
                .iter()
                .any(|r| r.status != ReservationStatus::Rejected && r.attendees > capacity)
        {
            return Err(EngineError::Validation(
                "capacity below attendees of an existing reservation",
            ));
        }
        patch.apply(&mut guard.room);
        Ok(guard.room.clone())
    }

    /// Remove the room and every reservation that references it. Returns the
    /// ids of the cascaded reservations.
    pub async fn delete_room(&self, id: RoomId) -> Result<Vec<ReservationId>, EngineError> {
        let (_, rs) = self.rooms.remove(&id).ok_or(EngineError::RoomNotFound(id))?;
        let mut guard = rs.write().await;
        guard.deleted = true;
        let removed = std::mem::take(&mut guard.reservations);
        drop(guard);

        let mut cascaded = Vec::with_capacity(removed.len());
        for r in removed {
            self.reservation_to_room.remove(&r.id);
            self.publish(Event::ReservationCancelled {
                reservation_id: r.id,
                room_id: id,
                owner_user_id: r.user_id,
            });
            cascaded.push(r.id);
        }

        info!(room_id = id, cascaded = cascaded.len(), "room deleted");
        Ok(cascaded)
    }

    // ── Reservations ─────────────────────────────────────────

    /// Take the id lock, then the room's write lock, in that order.
    pub(super) async fn lock_for_insert(
        &self,
        room_id: RoomId,
    ) -> Result<(MutexGuard<'_, ()>, OwnedRwLockWriteGuard<RoomState>), EngineError> {
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        let ids = self.ids.lock().await;
        let guard = rs.write_owned().await;
        if guard.deleted {
            return Err(EngineError::RoomNotFound(room_id));
        }
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many reservations on room"));
        }
        Ok((ids, guard))
    }

    /// Validate, assign the next id and insert as `pending`. Caller holds both
    /// locks from [`Engine::lock_for_insert`].
    pub(super) fn insert_pending(
        &self,
        ids: &MutexGuard<'_, ()>,
        rs: &mut RoomState,
        input: NewReservation,
    ) -> Result<Reservation, EngineError> {
        validate_new_reservation(&input, &rs.room)?;
        let reservation = Reservation {
            id: self.next_reservation_id(ids),
            room_id: input.room_id,
            user_id: input.user_id,
            title: input.title,
            span: input.span,
            attendees: input.attendees,
            notes: input.notes,
            contact_phone: input.contact_phone,
            status: ReservationStatus::Pending,
            created_at: now_ms(),
        };
        rs.insert_reservation(reservation.clone());
        self.reservation_to_room
            .insert(reservation.id, reservation.room_id);
        Ok(reservation)
    }

    /// Store a reservation as `pending` without looking at other bookings.
    /// This is also the forced submit after a conflict warning.
    pub async fn create_reservation(
        &self,
        input: NewReservation,
    ) -> Result<Reservation, EngineError> {
        let (ids, mut guard) = self.lock_for_insert(input.room_id).await?;
        let reservation = self.insert_pending(&ids, &mut guard, input)?;
        drop(guard);
        drop(ids);

        info!(
            reservation_id = reservation.id,
            room_id = reservation.room_id,
            "reservation submitted"
        );
        self.publish(Event::ReservationSubmitted {
            reservation_id: reservation.id,
            room_id: reservation.room_id,
            owner_user_id: reservation.user_id,
        });
        Ok(reservation)
    }

    /// Merge the patch into the reservation. Shape is validated; overlap with
    /// confirmed bookings is not. See [`Engine::update_with_conflict_check`].
    pub async fn update_reservation(
        &self,
        id: ReservationId,
        patch: ReservationPatch,
    ) -> Result<Reservation, EngineError> {
        self.patch_reservation(id, patch, false).await
    }

    pub(super) async fn patch_reservation(
        &self,
        id: ReservationId,
        patch: ReservationPatch,
        check_confirmed: bool,
    ) -> Result<Reservation, EngineError> {
        let mut guard = self.resolve_reservation_write(id).await?;
        let current = guard
            .get(id)
            .ok_or(EngineError::ReservationNotFound(id))?;
        let is_confirmed = current.is_confirmed();

        // The untouched bound comes from the stored span, read under the lock.
        let new_span = if patch.start.is_some() || patch.end.is_some() {
            let span = Span::try_new(
                patch.start.unwrap_or(current.span.start),
                patch.end.unwrap_or(current.span.end),
            )
            .ok_or(EngineError::Validation("end time must be after start time"))?;
            validate_span(&span)?;
            Some(span)
        } else {
            None
        };

        if let Some(title) = &patch.title {
            validate_title(title)?;
        }
        if let Some(attendees) = patch.attendees {
            validate_attendees(attendees, guard.room.capacity)?;
        }
        if let Some(notes) = &patch.notes {
            validate_notes(notes)?;
        }
        if let Some(Some(phone)) = &patch.contact_phone {
            validate_phone(phone)?;
        }
        if check_confirmed
            && is_confirmed
            && let Some(span) = &new_span
        {
            check_no_conflict(&guard, span, Some(id))?;
        }

        // Re-insert so the start-ordered index survives a span change.
        let mut reservation = guard
            .remove_reservation(id)
            .ok_or(EngineError::ReservationNotFound(id))?;
        if let Some(title) = patch.title {
            reservation.title = title;
        }
        if let Some(span) = new_span {
            reservation.span = span;
        }
        if let Some(attendees) = patch.attendees {
            reservation.attendees = attendees;
        }
        if let Some(notes) = patch.notes {
            reservation.notes = notes;
        }
        if let Some(phone) = patch.contact_phone {
            reservation.contact_phone = phone;
        }
        guard.insert_reservation(reservation.clone());
        drop(guard);

        self.publish(Event::ReservationUpdated {
            reservation_id: id,
            room_id: reservation.room_id,
            owner_user_id: reservation.user_id,
        });
        Ok(reservation)
    }

    /// Cancel a reservation in any status. Deleting an unknown id is a no-op
    /// and returns `None`.
    pub async fn delete_reservation(&self, id: ReservationId) -> Option<Reservation> {
        let mut guard = self.resolve_reservation_write(id).await.ok()?;
        let removed = guard.remove_reservation(id)?;
        self.reservation_to_room.remove(&id);
        drop(guard);

        info!(reservation_id = id, room_id = removed.room_id, "reservation cancelled");
        self.publish(Event::ReservationCancelled {
            reservation_id: id,
            room_id: removed.room_id,
            owner_user_id: removed.user_id,
        });
        Some(removed)
    }

    // ── Seeding ──────────────────────────────────────────────

    /// Insert a room with a fixed id.
    pub(crate) async fn restore_room(&self, room: Room) -> Result<(), EngineError> {
        if self.rooms.contains_key(&room.id) {
            return Err(EngineError::Validation("duplicate room id"));
        }
        if room.capacity == 0 {
            return Err(EngineError::Validation("room capacity must be positive"));
        }
        let _ids = self.ids.lock().await;
        self.rooms
            .insert(room.id, Arc::new(RwLock::new(RoomState::new(room))));
        Ok(())
    }

    /// Insert a reservation with a fixed id and status. Confirmed entries must
    /// not break the no-overlap rule.
    pub(crate) async fn restore_reservation(
        &self,
        reservation: Reservation,
    ) -> Result<(), EngineError> {
        validate_span(&reservation.span)?;
        let (_ids, mut guard) = self.lock_for_insert(reservation.room_id).await?;
        if self.reservation_to_room.contains_key(&reservation.id) {
            return Err(EngineError::Validation("duplicate reservation id"));
        }
        if reservation.is_confirmed() {
            check_no_conflict(&guard, &reservation.span, Some(reservation.id))?;
        }
        self.reservation_to_room
            .insert(reservation.id, reservation.room_id);
        guard.insert_reservation(reservation);
        Ok(())
    }
}
