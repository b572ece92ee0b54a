use tracing::{debug, info};

use crate::model::*;
use crate::observability::{CONFLICTS_TOTAL, RESERVATION_TRANSITIONS_TOTAL};

use super::conflict::{check_no_conflict, room_conflicts, validate_new_reservation, validate_span};
use super::{Engine, EngineError};

fn record_conflict(operation: &'static str) {
    metrics::counter!(CONFLICTS_TOTAL, "operation" => operation).increment(1);
}

fn record_transition(status: ReservationStatus) {
    metrics::counter!(RESERVATION_TRANSITIONS_TOTAL, "status" => status.as_str()).increment(1);
}

impl Engine {
    /// Submit with a pre-check. Overlapping confirmed bookings produce a
    /// warning and nothing is stored; otherwise the reservation is created
    /// as `pending`. Check and insert happen under one room lock.
    pub async fn create_with_conflict_check(
        &self,
        input: NewReservation,
    ) -> Result<Submission, EngineError> {
        let (ids, mut guard) = self.lock_for_insert(input.room_id).await?;
        validate_new_reservation(&input, &guard.room)?;

        let conflicting = room_conflicts(&guard, &input.span, None);
        if !conflicting.is_empty() {
            drop(guard);
            drop(ids);
            record_conflict("submit");
            info!(
                room_id = input.room_id,
                span = %input.span,
                conflicts = conflicting.len(),
                "submission overlaps confirmed reservations"
            );
            return Ok(Submission::ConflictWarning(ConflictWarning {
                room_id: input.room_id,
                span: input.span,
                conflicting,
            }));
        }

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
        Ok(Submission::Created(reservation))
    }

    /// `pending → confirmed`, refused if another confirmed reservation on the
    /// room overlaps. Approving an already confirmed reservation is a no-op.
    pub async fn approve(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        let mut guard = self.resolve_reservation_write(id).await?;
        let current = guard
            .get(id)
            .cloned()
            .ok_or(EngineError::ReservationNotFound(id))?;

        match current.status {
            ReservationStatus::Confirmed => {
                debug!(reservation_id = id, "approve: already confirmed");
                return Ok(current);
            }
            ReservationStatus::Rejected => {
                return Err(EngineError::InvalidTransition {
                    id,
                    status: current.status,
                });
            }
            ReservationStatus::Pending => {}
        }

        if let Err(e) = check_no_conflict(&guard, &current.span, Some(id)) {
            record_conflict("approve");
            info!(reservation_id = id, error = %e, "approval refused");
            return Err(e);
        }

        let r = guard
            .get_mut(id)
            .ok_or(EngineError::ReservationNotFound(id))?;
        r.status = ReservationStatus::Confirmed;
        let approved = r.clone();
        drop(guard);

        record_transition(ReservationStatus::Confirmed);
        info!(reservation_id = id, room_id = approved.room_id, "reservation approved");
        self.publish(Event::ReservationStatusChanged {
            reservation_id: id,
            room_id: approved.room_id,
            owner_user_id: approved.user_id,
            status: ReservationStatus::Confirmed,
        });
        Ok(approved)
    }

    /// `pending → rejected`. Rejecting twice is a no-op; a confirmed
    /// reservation can only be cancelled, not rejected.
    pub async fn reject(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        let mut guard = self.resolve_reservation_write(id).await?;
        let r = guard
            .get_mut(id)
            .ok_or(EngineError::ReservationNotFound(id))?;

        match r.status {
            ReservationStatus::Rejected => {
                debug!(reservation_id = id, "reject: already rejected");
                return Ok(r.clone());
            }
            ReservationStatus::Confirmed => {
                return Err(EngineError::InvalidTransition {
                    id,
                    status: r.status,
                });
            }
            ReservationStatus::Pending => {}
        }

        r.status = ReservationStatus::Rejected;
        let rejected = r.clone();
        drop(guard);

        record_transition(ReservationStatus::Rejected);
        info!(reservation_id = id, room_id = rejected.room_id, "reservation rejected");
        self.publish(Event::ReservationStatusChanged {
            reservation_id: id,
            room_id: rejected.room_id,
            owner_user_id: rejected.user_id,
            status: ReservationStatus::Rejected,
        });
        Ok(rejected)
    }

    /// [`Engine::update_reservation`], refusing to move a confirmed
    /// reservation onto another confirmed one. The check and the write share
    /// one room lock.
    pub async fn update_with_conflict_check(
        &self,
        id: ReservationId,
        patch: ReservationPatch,
    ) -> Result<Reservation, EngineError> {
        let result = self.patch_reservation(id, patch, true).await;
        if let Err(EngineError::Conflict(other)) = &result {
            record_conflict("update");
            info!(reservation_id = id, conflicts_with = other, "update refused");
        }
        result
    }

    /// Move the end time of a confirmed reservation later. Only the added
    /// window `[old_end, new_end)` is checked against confirmed bookings;
    /// start and status are unchanged.
    pub async fn extend(&self, id: ReservationId, new_end: Ms) -> Result<Reservation, EngineError> {
        self.extend_with(id, |_| Ok(new_end)).await
    }

    /// [`Engine::extend`] by a duration relative to the current end.
    pub async fn extend_by(&self, id: ReservationId, by_ms: Ms) -> Result<Reservation, EngineError> {
        if by_ms <= 0 {
            return Err(EngineError::Validation("extension must be positive"));
        }
        self.extend_with(id, |end| {
            end.checked_add(by_ms)
                .ok_or(EngineError::LimitExceeded("timestamp out of range"))
        })
        .await
    }

    async fn extend_with<F>(&self, id: ReservationId, new_end: F) -> Result<Reservation, EngineError>
    where
        F: FnOnce(Ms) -> Result<Ms, EngineError>,
    {
        let mut guard = self.resolve_reservation_write(id).await?;
        let current = guard
            .get(id)
            .cloned()
            .ok_or(EngineError::ReservationNotFound(id))?;

        if !current.is_confirmed() {
            return Err(EngineError::Validation(
                "only confirmed reservations can be extended",
            ));
        }
        let new_end = new_end(current.span.end)?;
        if new_end <= current.span.end {
            return Err(EngineError::Validation(
                "new end time must be after the current end time",
            ));
        }
        validate_span(&Span::new(current.span.start, new_end))?;

        let added = Span::new(current.span.end, new_end);
        if let Err(e) = check_no_conflict(&guard, &added, Some(id)) {
            record_conflict("extend");
            info!(reservation_id = id, error = %e, "extension refused");
            return Err(e);
        }

        // Start is unchanged, so the sorted position holds.
        let r = guard
            .get_mut(id)
            .ok_or(EngineError::ReservationNotFound(id))?;
        r.span.end = new_end;
        let extended = r.clone();
        drop(guard);

        info!(reservation_id = id, end = %format_timestamp(new_end), "reservation extended");
        self.publish(Event::ReservationExtended {
            reservation_id: id,
            room_id: extended.room_id,
            owner_user_id: extended.user_id,
            end: new_end,
        });
        Ok(extended)
    }
}
