use std::collections::HashSet;

use crate::limits::*;
use crate::model::*;

use super::conflict::room_conflicts;
use super::{Engine, EngineError};

impl Engine {
    pub async fn get_room(&self, id: RoomId) -> Option<Room> {
        let rs = self.get_room_state(&id)?;
        let guard = rs.read().await;
        (!guard.deleted).then(|| guard.room.clone())
    }

    /// Rooms matching `filter`, ordered by id.
    pub async fn list_rooms(&self, filter: &RoomFilter) -> Vec<Room> {
        let mut rooms = Vec::new();
        for rs in self.room_handles() {
            let guard = rs.read().await;
            if !guard.deleted && filter.matches(&guard.room) {
                rooms.push(guard.room.clone());
            }
        }
        rooms.sort_by_key(|r| r.id);
        rooms
    }

    pub async fn get_reservation(&self, id: ReservationId) -> Option<Reservation> {
        let room_id = self.get_room_for_reservation(&id)?;
        let rs = self.get_room_state(&room_id)?;
        let guard = rs.read().await;
        guard.get(id).cloned()
    }

    /// Reservations matching `filter`, ordered by id.
    pub async fn list_reservations(&self, filter: &ReservationFilter) -> Vec<Reservation> {
        if let Some(id) = filter.id {
            return self
                .get_reservation(id)
                .await
                .filter(|r| filter.matches(r))
                .into_iter()
                .collect();
        }

        let handles = match filter.room_id {
            Some(room_id) => self.get_room_state(&room_id).into_iter().collect(),
            None => self.room_handles(),
        };
        let mut out = Vec::new();
        for rs in handles {
            let guard = rs.read().await;
            out.extend(guard.reservations.iter().filter(|r| filter.matches(r)).cloned());
        }
        out.sort_by_key(|r| r.id);
        out
    }

    /// One room's reservations in start order.
    pub async fn list_by_room(&self, room_id: RoomId) -> Vec<Reservation> {
        match self.get_room_state(&room_id) {
            Some(rs) => rs.read().await.reservations.clone(),
            None => Vec::new(),
        }
    }

    pub async fn list_by_user(&self, user_id: UserId) -> Vec<Reservation> {
        self.list_reservations(&ReservationFilter {
            user_id: Some(user_id),
            ..Default::default()
        })
        .await
    }

    pub async fn list_all(&self) -> Vec<Reservation> {
        self.list_reservations(&ReservationFilter::default()).await
    }

    /// The approval queue.
    pub async fn list_pending(&self) -> Vec<Reservation> {
        self.list_reservations(&ReservationFilter {
            status: Some(ReservationStatus::Pending),
            ..Default::default()
        })
        .await
    }

    /// Confirmed reservations the candidate would overlap, in start order.
    pub async fn conflicts_for(&self, candidate: &Candidate) -> Result<Vec<Reservation>, EngineError> {
        if candidate.span.end <= candidate.span.start {
            return Err(EngineError::Validation("end time must be after start time"));
        }
        if candidate.span.start < MIN_VALID_TIMESTAMP_MS
            || candidate.span.end > MAX_VALID_TIMESTAMP_MS
        {
            return Err(EngineError::LimitExceeded("timestamp out of range"));
        }
        if candidate.span.duration_ms() > MAX_QUERY_WINDOW_MS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        let rs = self
            .get_room_state(&candidate.room_id)
            .ok_or(EngineError::RoomNotFound(candidate.room_id))?;
        let guard = rs.read().await;
        let ids = room_conflicts(&guard, &candidate.span, candidate.exclude_id);
        Ok(ids.into_iter().filter_map(|id| guard.get(id).cloned()).collect())
    }

    pub async fn check_conflict(&self, candidate: &Candidate) -> Result<bool, EngineError> {
        Ok(!self.conflicts_for(candidate).await?.is_empty())
    }

    /// Pending reservations that currently overlap a confirmed one. Approving
    /// any of them would fail.
    pub async fn pending_conflicts(&self) -> HashSet<ReservationId> {
        let mut flagged = HashSet::new();
        for rs in self.room_handles() {
            let guard = rs.read().await;
            for r in guard.reservations.iter().filter(|r| r.is_pending()) {
                if !room_conflicts(&guard, &r.span, Some(r.id)).is_empty() {
                    flagged.insert(r.id);
                }
            }
        }
        flagged
    }
}
