use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{Reservation, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: UserId,
    pub username: String,
    pub password: String,
    pub role: Role,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl Account {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Owners and admins may edit, extend or cancel a reservation.
    pub fn can_manage(&self, reservation: &Reservation) -> bool {
        self.is_admin() || reservation.user_id == self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    DuplicateUsername(String),
    DuplicateId(UserId),
}

impl std::fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirectoryError::DuplicateUsername(name) => write!(f, "duplicate username: {name}"),
            DirectoryError::DuplicateId(id) => write!(f, "duplicate user id: {id}"),
        }
    }
}

impl std::error::Error for DirectoryError {}

/// Known accounts, fixed at startup.
#[derive(Debug, Default)]
pub struct Directory {
    by_username: HashMap<String, Account>,
}

impl Directory {
    pub fn new(accounts: Vec<Account>) -> Result<Self, DirectoryError> {
        let mut by_username = HashMap::with_capacity(accounts.len());
        let mut ids = std::collections::HashSet::new();
        for account in accounts {
            if !ids.insert(account.id) {
                return Err(DirectoryError::DuplicateId(account.id));
            }
            if by_username.contains_key(&account.username) {
                return Err(DirectoryError::DuplicateUsername(account.username));
            }
            by_username.insert(account.username.clone(), account);
        }
        Ok(Self { by_username })
    }

    pub fn lookup(&self, username: &str) -> Option<&Account> {
        self.by_username.get(username)
    }

    pub fn len(&self) -> usize {
        self.by_username.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_username.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ReservationStatus, Span};

    fn account(id: UserId, username: &str, role: Role) -> Account {
        Account {
            id,
            username: username.into(),
            password: "secret".into(),
            role,
            name: username.into(),
            email: String::new(),
            department: String::new(),
            phone: None,
        }
    }

    #[test]
    fn lookup_by_username() {
        let dir = Directory::new(vec![account(1, "admin", Role::Admin)]).unwrap();
        assert_eq!(dir.lookup("admin").unwrap().id, 1);
        assert!(dir.lookup("ghost").is_none());
    }

    #[test]
    fn duplicates_rejected() {
        let dup_name = Directory::new(vec![
            account(1, "sam", Role::User),
            account(2, "sam", Role::User),
        ]);
        assert_eq!(
            dup_name.unwrap_err(),
            DirectoryError::DuplicateUsername("sam".into())
        );

        let dup_id = Directory::new(vec![
            account(1, "sam", Role::User),
            account(1, "alex", Role::User),
        ]);
        assert_eq!(dup_id.unwrap_err(), DirectoryError::DuplicateId(1));
    }

    #[test]
    fn owner_or_admin_manages() {
        let owner = account(2, "owner", Role::User);
        let stranger = account(3, "stranger", Role::User);
        let admin = account(1, "admin", Role::Admin);
        let reservation = Reservation {
            id: 1,
            room_id: 1,
            user_id: 2,
            title: "Sync".into(),
            span: Span::new(0, 1),
            attendees: 1,
            notes: String::new(),
            contact_phone: None,
            status: ReservationStatus::Pending,
            created_at: 0,
        };

        assert!(owner.can_manage(&reservation));
        assert!(admin.can_manage(&reservation));
        assert!(!stranger.can_manage(&reservation));
    }

    #[test]
    fn role_json_is_lowercase() {
        let json = serde_json::to_value(account(1, "admin", Role::Admin)).unwrap();
        assert_eq!(json["role"], "admin");
    }
}
