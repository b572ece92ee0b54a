use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unix milliseconds. The only time type.
pub type Ms = i64;

pub type RoomId = u64;
pub type ReservationId = u64;
pub type UserId = u64;

pub const HOUR_MS: Ms = 3_600_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    #[serde(with = "iso_ms")]
    pub start: Ms,
    #[serde(with = "iso_ms")]
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// `None` for zero-length or inverted bounds.
    pub fn try_new(start: Ms, end: Ms) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    /// Saturates instead of overflowing on extreme bounds.
    pub fn duration_ms(&self) -> Ms {
        self.end.saturating_sub(self.start)
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", format_timestamp(self.start), format_timestamp(self.end))
    }
}

// ── Timestamps ───────────────────────────────────────────────────

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const ACCEPTED_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parse an ISO-8601 timestamp. Offset-less values are taken as wall-clock
/// time and stored as if they were UTC.
pub fn parse_timestamp(s: &str) -> Option<Ms> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    ACCEPTED_FORMATS.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(s, fmt)
            .ok()
            .map(|dt| dt.and_utc().timestamp_millis())
    })
}

pub fn format_timestamp(ms: Ms) -> String {
    match DateTime::<Utc>::from_timestamp_millis(ms) {
        Some(dt) => dt.format(TIMESTAMP_FORMAT).to_string(),
        None => ms.to_string(),
    }
}

/// Serde adapter: ISO text on the way out, ISO text or raw millis on the way in.
pub mod iso_ms {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{Ms, format_timestamp, parse_timestamp};

    pub fn serialize<S: Serializer>(ms: &Ms, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_timestamp(*ms))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Ms, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Millis(i64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Millis(ms) => Ok(ms),
            Raw::Text(s) => {
                parse_timestamp(&s).ok_or_else(|| D::Error::custom(format!("bad timestamp: {s}")))
            }
        }
    }
}

// ── Rooms ────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub capacity: u32,
    pub floor: i32,
    /// Price per hour in whole currency units.
    pub hourly_rate: u64,
    #[serde(default)]
    pub amenities: BTreeSet<String>,
    #[serde(default = "default_true")]
    pub is_available: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parking_cars: u32,
    #[serde(default)]
    pub parking_motorcycles: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewRoom {
    pub name: String,
    pub kind: Option<String>,
    pub capacity: u32,
    pub floor: i32,
    pub hourly_rate: u64,
    pub amenities: BTreeSet<String>,
    pub description: Option<String>,
    pub parking_cars: u32,
    pub parking_motorcycles: u32,
}

impl NewRoom {
    pub fn into_room(self, id: RoomId) -> Room {
        Room {
            id,
            name: self.name,
            kind: self.kind,
            capacity: self.capacity,
            floor: self.floor,
            hourly_rate: self.hourly_rate,
            amenities: self.amenities,
            is_available: true,
            description: self.description,
            parking_cars: self.parking_cars,
            parking_motorcycles: self.parking_motorcycles,
        }
    }
}

/// Fields an admin may change on a room. `None` leaves the field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomPatch {
    pub name: Option<String>,
    pub kind: Option<String>,
    pub capacity: Option<u32>,
    pub floor: Option<i32>,
    pub hourly_rate: Option<u64>,
    pub amenities: Option<BTreeSet<String>>,
    pub is_available: Option<bool>,
    pub description: Option<String>,
    pub parking_cars: Option<u32>,
    pub parking_motorcycles: Option<u32>,
}

impl RoomPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(self, room: &mut Room) {
        if let Some(name) = self.name {
            room.name = name;
        }
        if let Some(kind) = self.kind {
            room.kind = Some(kind);
        }
        if let Some(capacity) = self.capacity {
            room.capacity = capacity;
        }
        if let Some(floor) = self.floor {
            room.floor = floor;
        }
        if let Some(rate) = self.hourly_rate {
            room.hourly_rate = rate;
        }
        if let Some(amenities) = self.amenities {
            room.amenities = amenities;
        }
        if let Some(available) = self.is_available {
            room.is_available = available;
        }
        if let Some(description) = self.description {
            room.description = Some(description);
        }
        if let Some(cars) = self.parking_cars {
            room.parking_cars = cars;
        }
        if let Some(motorcycles) = self.parking_motorcycles {
            room.parking_motorcycles = motorcycles;
        }
    }
}

/// Room search criteria. Every set criterion must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomFilter {
    pub min_capacity: Option<u32>,
    pub kind: Option<String>,
    pub amenities: Vec<String>,
}

impl RoomFilter {
    pub fn matches(&self, room: &Room) -> bool {
        if self.min_capacity.is_some_and(|min| room.capacity < min) {
            return false;
        }
        if let Some(kind) = &self.kind
            && room.kind.as_deref() != Some(kind.as_str())
        {
            return false;
        }
        self.amenities.iter().all(|a| room.amenities.contains(a))
    }
}

// ── Reservations ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Rejected,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(ReservationStatus::Pending),
            "confirmed" => Ok(ReservationStatus::Confirmed),
            "rejected" => Ok(ReservationStatus::Rejected),
            other => Err(format!("unknown reservation status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub title: String,
    pub span: Span,
    pub attendees: u32,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub contact_phone: Option<String>,
    pub status: ReservationStatus,
    #[serde(with = "iso_ms")]
    pub created_at: Ms,
}

impl Reservation {
    pub fn is_confirmed(&self) -> bool {
        self.status == ReservationStatus::Confirmed
    }

    pub fn is_pending(&self) -> bool {
        self.status == ReservationStatus::Pending
    }

    /// Room rate times booked duration, with part hours charged pro rata and
    /// rounded to the nearest whole unit.
    pub fn estimated_cost(&self, room: &Room) -> u64 {
        let hour = HOUR_MS as u128;
        let duration = u128::try_from(self.span.duration_ms()).unwrap_or(0);
        let cost = (u128::from(room.hourly_rate) * duration + hour / 2) / hour;
        u64::try_from(cost).unwrap_or(u64::MAX)
    }
}

/// Requester input for a new reservation. Status and id are never caller-supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub title: String,
    pub span: Span,
    pub attendees: u32,
    pub notes: String,
    pub contact_phone: Option<String>,
}

/// Reservation listing criteria. Every set criterion must match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReservationFilter {
    pub id: Option<ReservationId>,
    pub room_id: Option<RoomId>,
    pub user_id: Option<UserId>,
    pub status: Option<ReservationStatus>,
}

impl ReservationFilter {
    pub fn matches(&self, r: &Reservation) -> bool {
        self.id.is_none_or(|id| r.id == id)
            && self.room_id.is_none_or(|id| r.room_id == id)
            && self.user_id.is_none_or(|id| r.user_id == id)
            && self.status.is_none_or(|s| r.status == s)
    }
}

/// Fields a requester may change after submission. Status only moves
/// through approve/reject.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationPatch {
    pub title: Option<String>,
    /// A one-sided change keeps the other bound as stored at write time.
    pub start: Option<Ms>,
    pub end: Option<Ms>,
    pub attendees: Option<u32>,
    pub notes: Option<String>,
    /// `Some(None)` clears the phone.
    pub contact_phone: Option<Option<String>>,
}

impl ReservationPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn reschedule(span: Span) -> Self {
        Self {
            start: Some(span.start),
            end: Some(span.end),
            ..Default::default()
        }
    }
}

/// A candidate interval for the conflict check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub room_id: RoomId,
    pub span: Span,
    /// Reservation to ignore, so a booking never conflicts with itself.
    pub exclude_id: Option<ReservationId>,
}

// ── Room state ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RoomState {
    pub room: Room,
    /// All reservations on this room, sorted by `span.start`.
    pub reservations: Vec<Reservation>,
    /// Set under the write lock when the room is removed, so late writers
    /// holding a stale handle fail instead of inserting orphans.
    pub deleted: bool,
}

impl RoomState {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            reservations: Vec::new(),
            deleted: false,
        }
    }

    pub fn id(&self) -> RoomId {
        self.room.id
    }

    /// Insert reservation maintaining sort order by span.start.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        debug_assert!(
            self.get(reservation.id).is_none(),
            "duplicate reservation id {}",
            reservation.id
        );
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.span.start, |r| r.span.start)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove_reservation(&mut self, id: ReservationId) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        Some(self.reservations.remove(pos))
    }

    pub fn get(&self, id: ReservationId) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    pub fn get_mut(&mut self, id: ReservationId) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    /// Return only reservations whose span overlaps the query window.
    /// Uses binary search to skip reservations starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.span.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.span.end > query.start)
    }
}

// ── Notifications ────────────────────────────────────────────────

/// Published on every reservation change, addressed to the reservation's owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    ReservationSubmitted {
        reservation_id: ReservationId,
        room_id: RoomId,
        owner_user_id: UserId,
    },
    ReservationStatusChanged {
        reservation_id: ReservationId,
        room_id: RoomId,
        owner_user_id: UserId,
        status: ReservationStatus,
    },
    ReservationExtended {
        reservation_id: ReservationId,
        room_id: RoomId,
        owner_user_id: UserId,
        #[serde(with = "iso_ms")]
        end: Ms,
    },
    ReservationUpdated {
        reservation_id: ReservationId,
        room_id: RoomId,
        owner_user_id: UserId,
    },
    ReservationCancelled {
        reservation_id: ReservationId,
        room_id: RoomId,
        owner_user_id: UserId,
    },
}

impl Event {
    pub fn owner_user_id(&self) -> UserId {
        match self {
            Event::ReservationSubmitted { owner_user_id, .. }
            | Event::ReservationStatusChanged { owner_user_id, .. }
            | Event::ReservationExtended { owner_user_id, .. }
            | Event::ReservationUpdated { owner_user_id, .. }
            | Event::ReservationCancelled { owner_user_id, .. } => *owner_user_id,
        }
    }

    pub fn reservation_id(&self) -> ReservationId {
        match self {
            Event::ReservationSubmitted { reservation_id, .. }
            | Event::ReservationStatusChanged { reservation_id, .. }
            | Event::ReservationExtended { reservation_id, .. }
            | Event::ReservationUpdated { reservation_id, .. }
            | Event::ReservationCancelled { reservation_id, .. } => *reservation_id,
        }
    }
}

// ── Workflow result types ────────────────────────────────────────

/// Returned instead of a reservation when the pre-check finds confirmed
/// bookings in the way. The caller may retry with a forced submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictWarning {
    pub room_id: RoomId,
    pub span: Span,
    pub conflicting: Vec<ReservationId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Created(Reservation),
    ConflictWarning(ConflictWarning),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reservation(id: ReservationId, start: Ms, end: Ms) -> Reservation {
        Reservation {
            id,
            room_id: 1,
            user_id: 1,
            title: format!("r{id}"),
            span: Span::new(start, end),
            attendees: 1,
            notes: String::new(),
            contact_phone: None,
            status: ReservationStatus::Confirmed,
            created_at: 0,
        }
    }

    fn room(capacity: u32, kind: &str, amenities: &[&str]) -> Room {
        NewRoom {
            name: "Orion".into(),
            kind: Some(kind.into()),
            capacity,
            amenities: amenities.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
        .into_room(1)
    }

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200)); // half-open
    }

    #[test]
    fn estimated_cost_is_pro_rata() {
        let mut orion = room(20, "conference", &[]);
        orion.hourly_rate = 50_000;
        let hour = HOUR_MS;

        assert_eq!(reservation(1, 0, 3 * hour).estimated_cost(&orion), 150_000);
        assert_eq!(reservation(2, 0, hour + hour / 2).estimated_cost(&orion), 75_000);
        // 20 minutes of 50_000/h is 16_666.67
        assert_eq!(reservation(3, 0, hour / 3).estimated_cost(&orion), 16_667);

        orion.hourly_rate = 0;
        assert_eq!(reservation(4, 0, hour).estimated_cost(&orion), 0);
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
    }

    #[test]
    fn span_try_new_rejects_degenerate() {
        assert!(Span::try_new(100, 100).is_none());
        assert!(Span::try_new(200, 100).is_none());
        assert_eq!(Span::try_new(100, 101), Some(Span::new(100, 101)));
    }

    #[test]
    fn timestamp_formats() {
        let a = parse_timestamp("2025-07-15T09:00").unwrap();
        let b = parse_timestamp("2025-07-15T09:00:00").unwrap();
        let c = parse_timestamp("2025-07-15 09:00").unwrap();
        let d = parse_timestamp("2025-07-15T09:00:00Z").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a, d);
        assert_eq!(parse_timestamp("2025-07-15T10:00").unwrap() - a, HOUR_MS);
        assert_eq!(format_timestamp(a), "2025-07-15T09:00:00");
        assert!(parse_timestamp("next tuesday").is_none());
    }

    #[test]
    fn status_parse() {
        assert_eq!("Confirmed".parse::<ReservationStatus>(), Ok(ReservationStatus::Confirmed));
        assert_eq!("pending".parse::<ReservationStatus>(), Ok(ReservationStatus::Pending));
        assert!("cancelled".parse::<ReservationStatus>().is_err());
        assert_eq!(ReservationStatus::Rejected.to_string(), "rejected");
    }

    #[test]
    fn reservation_ordering() {
        let mut rs = RoomState::new(room(10, "meeting", &[]));
        rs.insert_reservation(reservation(1, 300, 400));
        rs.insert_reservation(reservation(2, 100, 200));
        rs.insert_reservation(reservation(3, 200, 300));
        let starts: Vec<Ms> = rs.reservations.iter().map(|r| r.span.start).collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn remove_nonexistent_returns_none() {
        let mut rs = RoomState::new(room(10, "meeting", &[]));
        rs.insert_reservation(reservation(1, 100, 200));
        assert!(rs.remove_reservation(42).is_none());
        assert_eq!(rs.reservations.len(), 1);
        assert_eq!(rs.remove_reservation(1).map(|r| r.id), Some(1));
        assert!(rs.reservations.is_empty());
    }

    #[test]
    fn overlapping_skips_past_and_future() {
        let mut rs = RoomState::new(room(10, "meeting", &[]));
        rs.insert_reservation(reservation(1, 100, 200));
        rs.insert_reservation(reservation(2, 450, 600));
        rs.insert_reservation(reservation(3, 1000, 1100));

        let hits: Vec<_> = rs.overlapping(&Span::new(500, 800)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 2);
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        let mut rs = RoomState::new(room(10, "meeting", &[]));
        rs.insert_reservation(reservation(1, 100, 200));
        assert_eq!(rs.overlapping(&Span::new(200, 300)).count(), 0);
        assert_eq!(rs.overlapping(&Span::new(0, 100)).count(), 0);
    }

    #[test]
    fn overlapping_long_booking_spanning_query() {
        let mut rs = RoomState::new(room(10, "meeting", &[]));
        rs.insert_reservation(reservation(1, 0, 10_000));
        assert_eq!(rs.overlapping(&Span::new(500, 600)).count(), 1);
    }

    #[test]
    fn room_filter_matches() {
        let orion = room(20, "conference", &["projector", "whiteboard"]);

        assert!(RoomFilter::default().matches(&orion));
        assert!(RoomFilter { min_capacity: Some(20), ..Default::default() }.matches(&orion));
        assert!(!RoomFilter { min_capacity: Some(21), ..Default::default() }.matches(&orion));
        assert!(!RoomFilter { kind: Some("focus".into()), ..Default::default() }.matches(&orion));
        assert!(
            RoomFilter { amenities: vec!["projector".into()], ..Default::default() }.matches(&orion)
        );
        assert!(
            !RoomFilter {
                amenities: vec!["projector".into(), "coffee-machine".into()],
                ..Default::default()
            }
            .matches(&orion)
        );
    }

    #[test]
    fn room_patch_only_touches_set_fields() {
        let mut orion = room(20, "conference", &["projector"]);
        let patch = RoomPatch {
            capacity: Some(12),
            is_available: Some(false),
            ..Default::default()
        };
        assert!(!patch.is_empty());
        patch.apply(&mut orion);
        assert_eq!(orion.capacity, 12);
        assert!(!orion.is_available);
        assert_eq!(orion.name, "Orion");
        assert_eq!(orion.kind.as_deref(), Some("conference"));
        assert!(RoomPatch::default().is_empty());
    }

    #[test]
    fn event_json_carries_owner_and_status() {
        let event = Event::ReservationStatusChanged {
            reservation_id: 7,
            room_id: 1,
            owner_user_id: 2,
            status: ReservationStatus::Confirmed,
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "reservation_status_changed");
        assert_eq!(json["reservation_id"], 7);
        assert_eq!(json["owner_user_id"], 2);
        assert_eq!(json["status"], "confirmed");
        assert_eq!(event.owner_user_id(), 2);
        assert_eq!(event.reservation_id(), 7);
    }

    #[test]
    fn reservation_json_uses_iso_timestamps() {
        let start = parse_timestamp("2025-07-15T09:00").unwrap();
        let r = reservation(1, start, start + HOUR_MS);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["span"]["start"], "2025-07-15T09:00:00");
        assert_eq!(json["span"]["end"], "2025-07-15T10:00:00");
        assert_eq!(json["status"], "confirmed");
    }
}
