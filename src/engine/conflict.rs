use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    chrono::Utc::now().timestamp_millis()
}

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    if span.end <= span.start {
        return Err(EngineError::Validation("end time must be after start time"));
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("reservation too long"));
    }
    Ok(())
}

pub(crate) fn validate_title(title: &str) -> Result<(), EngineError> {
    if title.trim().is_empty() {
        return Err(EngineError::Validation("title is required"));
    }
    if title.len() > MAX_TITLE_LEN {
        return Err(EngineError::LimitExceeded("title too long"));
    }
    Ok(())
}

pub(crate) fn validate_notes(notes: &str) -> Result<(), EngineError> {
    if notes.len() > MAX_NOTES_LEN {
        return Err(EngineError::LimitExceeded("notes too long"));
    }
    Ok(())
}

pub(crate) fn validate_attendees(attendees: u32, capacity: u32) -> Result<(), EngineError> {
    if attendees < 1 {
        return Err(EngineError::Validation("at least 1 attendee is required"));
    }
    if attendees > capacity {
        return Err(EngineError::Validation("attendees exceed room capacity"));
    }
    Ok(())
}

/// Contact phones are Indonesian numbers: `62` followed by 8 to 15 digits,
/// spaces and dashes ignored.
pub(crate) fn validate_phone(phone: &str) -> Result<(), EngineError> {
    let digits: String = phone.chars().filter(|c| *c != ' ' && *c != '-').collect();
    let valid = digits
        .strip_prefix("62")
        .is_some_and(|rest| (8..=15).contains(&rest.len()) && rest.bytes().all(|b| b.is_ascii_digit()));
    if !valid {
        return Err(EngineError::Validation("invalid contact phone number"));
    }
    Ok(())
}

pub(crate) fn validate_new_reservation(
    input: &NewReservation,
    room: &Room,
) -> Result<(), EngineError> {
    if !room.is_available {
        return Err(EngineError::Validation("room is not open for booking"));
    }
    validate_title(&input.title)?;
    validate_span(&input.span)?;
    validate_attendees(input.attendees, room.capacity)?;
    validate_notes(&input.notes)?;
    if let Some(phone) = &input.contact_phone {
        validate_phone(phone)?;
    }
    Ok(())
}

pub(crate) fn validate_new_room(room: &NewRoom) -> Result<(), EngineError> {
    if room.name.trim().is_empty() {
        return Err(EngineError::Validation("room name is required"));
    }
    if room.name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("room name too long"));
    }
    if room.capacity == 0 {
        return Err(EngineError::Validation("room capacity must be positive"));
    }
    Ok(())
}

fn collides(existing: &Reservation, candidate: &Candidate) -> bool {
    existing.room_id == candidate.room_id
        && existing.is_confirmed()
        && Some(existing.id) != candidate.exclude_id
        && candidate.span.start < existing.span.end
        && candidate.span.end > existing.span.start
}

/// True if `candidate` overlaps any confirmed reservation for its room,
/// other than `candidate.exclude_id`. Degenerate candidates never conflict;
/// reject them with [`validate_span`] first.
pub fn has_conflict<'a, I>(existing: I, candidate: &Candidate) -> bool
where
    I: IntoIterator<Item = &'a Reservation>,
{
    if candidate.span.end <= candidate.span.start {
        return false;
    }
    existing.into_iter().any(|r| collides(r, candidate))
}

/// Like [`has_conflict`], but names every offending reservation.
pub fn find_conflicts<'a, I>(existing: I, candidate: &Candidate) -> Vec<ReservationId>
where
    I: IntoIterator<Item = &'a Reservation>,
{
    if candidate.span.end <= candidate.span.start {
        return Vec::new();
    }
    existing
        .into_iter()
        .filter(|r| collides(r, candidate))
        .map(|r| r.id)
        .collect()
}

/// Conflicts for `span` on this room, narrowed with the sorted index first.
pub(crate) fn room_conflicts(
    rs: &RoomState,
    span: &Span,
    exclude_id: Option<ReservationId>,
) -> Vec<ReservationId> {
    let candidate = Candidate {
        room_id: rs.id(),
        span: *span,
        exclude_id,
    };
    find_conflicts(rs.overlapping(span), &candidate)
}

pub(crate) fn check_no_conflict(
    rs: &RoomState,
    span: &Span,
    exclude_id: Option<ReservationId>,
) -> Result<(), EngineError> {
    match room_conflicts(rs, span, exclude_id).first() {
        Some(&id) => Err(EngineError::Conflict(id)),
        None => Ok(()),
    }
}
