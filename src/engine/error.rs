use crate::model::{ReservationId, ReservationStatus, RoomId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Malformed input, rejected before any mutation.
    Validation(&'static str),
    RoomNotFound(RoomId),
    ReservationNotFound(ReservationId),
    /// The change would overlap this confirmed reservation.
    Conflict(ReservationId),
    InvalidTransition {
        id: ReservationId,
        status: ReservationStatus,
    },
    LimitExceeded(&'static str),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "invalid input: {msg}"),
            EngineError::RoomNotFound(id) => write!(f, "room not found: {id}"),
            EngineError::ReservationNotFound(id) => write!(f, "reservation not found: {id}"),
            EngineError::Conflict(id) => {
                write!(f, "time slot conflicts with confirmed reservation {id}")
            }
            EngineError::InvalidTransition { id, status } => {
                write!(f, "reservation {id} is already {status}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}
