use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 PHC string, never exposed in JSON
    pub first_name: String,
    pub last_name: String,
    pub active: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Applies a profile change set in place; returns whether anything differed.
    /// `updated_at` is left to the caller.
    pub fn apply(&mut self, changes: &ProfileChanges) -> bool {
        let mut changed = false;
        changed |= replace(&mut self.username, &changes.username);
        changed |= replace(&mut self.email, &changes.email);
        changed |= replace(&mut self.first_name, &changes.first_name);
        changed |= replace(&mut self.last_name, &changes.last_name);
        changed |= replace(&mut self.password_hash, &changes.password_hash);
        changed
    }
}

fn replace(slot: &mut String, value: &Option<String>) -> bool {
    match value {
        Some(v) if v != slot => {
            slot.clone_from(v);
            true
        }
        _ => false,
    }
}

/// Validated input for inserting a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub active: bool,
}

/// Validated partial update of a user row. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password_hash: Option<String>,
}

impl ProfileChanges {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.password_hash.is_none()
    }
}
