use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::accounts::{Account, Directory, DirectoryError};
use crate::engine::{Engine, EngineError};
use crate::model::{Reservation, Room};

const BUNDLED: &str = include_str!("../data/seed.json");

#[derive(Debug)]
pub enum SeedError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Engine(EngineError),
    Directory(DirectoryError),
}

impl std::fmt::Display for SeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeedError::Io(e) => write!(f, "seed read error: {e}"),
            SeedError::Parse(e) => write!(f, "seed parse error: {e}"),
            SeedError::Engine(e) => write!(f, "invalid seed data: {e}"),
            SeedError::Directory(e) => write!(f, "invalid seed users: {e}"),
        }
    }
}

impl std::error::Error for SeedError {}

impl From<std::io::Error> for SeedError {
    fn from(e: std::io::Error) -> Self {
        SeedError::Io(e)
    }
}

impl From<serde_json::Error> for SeedError {
    fn from(e: serde_json::Error) -> Self {
        SeedError::Parse(e)
    }
}

impl From<EngineError> for SeedError {
    fn from(e: EngineError) -> Self {
        SeedError::Engine(e)
    }
}

impl From<DirectoryError> for SeedError {
    fn from(e: DirectoryError) -> Self {
        SeedError::Directory(e)
    }
}

/// Startup fixture: rooms, reservations with their ids and statuses, and the
/// accounts allowed to connect.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub reservations: Vec<Reservation>,
    #[serde(default)]
    pub users: Vec<Account>,
}

impl Seed {
    pub fn from_json(json: &str) -> Result<Self, SeedError> {
        Ok(serde_json::from_str(json)?)
    }

    /// The fixture compiled into the binary.
    pub fn bundled() -> Result<Self, SeedError> {
        Self::from_json(BUNDLED)
    }

    pub fn from_path(path: &Path) -> Result<Self, SeedError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Load rooms and reservations into `engine`. Fails on duplicate ids,
    /// dangling room references or overlapping confirmed reservations.
    pub async fn load_into(self, engine: &Engine) -> Result<Directory, SeedError> {
        let directory = Directory::new(self.users)?;

        let rooms = self.rooms.len();
        for room in self.rooms {
            engine.restore_room(room).await?;
        }

        // Confirmed first, so a pending fixture never shadows the check.
        let mut reservations = self.reservations;
        reservations.sort_by_key(|r| !r.is_confirmed());
        let count = reservations.len();
        for reservation in reservations {
            engine.restore_reservation(reservation).await?;
        }

        info!(
            rooms,
            reservations = count,
            users = directory.len(),
            "seed loaded"
        );
        Ok(directory)
    }
}
