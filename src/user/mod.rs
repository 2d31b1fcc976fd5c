mod repository;
mod service;

pub use repository::*;
pub use service::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::EntityKind;
use crate::role::Role;
use crate::store::{Entity, Field, MutationStore};

pub type UserStore = MutationStore<User>;

/// User as saved on database and replicated on the bus.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub name: String,
    pub username: String,
    pub email: String,
    /// PHC string of the password hash.
    pub password: String,
    /// Empty when unknown.
    pub phone: String,
    pub role_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Changes to a [`User`]. Missing or empty values are ignored.
#[derive(Clone, Debug, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub phone: Option<String>,
    pub role_id: Option<String>,
}

fn replace(target: &mut String, value: Option<String>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        *target = value;
    }
}

impl Entity for User {
    const KIND: EntityKind = EntityKind::User;
    const UNIQUE_FIELDS: &'static [Field] =
        &[Field::Username, Field::Email, Field::Phone];

    type Patch = UserPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn field(&self, field: Field) -> Option<&str> {
        Some(match field {
            Field::Id => &self.id,
            Field::Username => &self.username,
            Field::Email => &self.email,
            Field::Phone => &self.phone,
        })
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn apply(&mut self, patch: UserPatch, at: DateTime<Utc>) {
        replace(&mut self.name, patch.name);
        replace(&mut self.username, patch.username);
        replace(&mut self.email, patch.email);
        replace(&mut self.password, patch.password);
        replace(&mut self.phone, patch.phone);
        replace(&mut self.role_id, patch.role_id);
        self.updated_at = at.max(self.created_at);
    }
}

/// Role attached to a [`UserResponse`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoleSummary {
    pub id: String,
    pub name: String,
}

/// User as exposed by the HTTP API. Never carries the password.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub username: String,
    pub email: String,
    pub phone: String,
    pub role: RoleSummary,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserResponse {
    /// Build a response. `role` is `None` when the role is not mirrored yet.
    pub fn new(user: User, role: Option<Role>) -> Self {
        let role = match role {
            Some(role) => RoleSummary {
                id: role.id,
                name: role.name,
            },
            None => RoleSummary {
                id: user.role_id,
                name: String::new(),
            },
        };

        Self {
            id: user.id,
            name: user.name,
            username: user.username,
            email: user.email,
            phone: user.phone,
            role,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}
