//! Roles, mirrored from the service owning them.
pub mod repository;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::EntityKind;
use crate::store::{Entity, Field, MutationStore};

pub type RoleStore = MutationStore<Role>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn new(id: &str, name: &str, at: DateTime<Utc>) -> Self {
        Self {
            id: id.to_owned(),
            name: name.to_owned(),
            created_at: at,
            updated_at: at,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RolePatch {
    pub name: Option<String>,
}

impl Entity for Role {
    const KIND: EntityKind = EntityKind::Role;
    const UNIQUE_FIELDS: &'static [Field] = &[];

    type Patch = RolePatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn field(&self, field: Field) -> Option<&str> {
        match field {
            Field::Id => Some(&self.id),
            _ => None,
        }
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn apply(&mut self, patch: RolePatch, at: DateTime<Utc>) {
        if let Some(name) = patch.name.filter(|n| !n.is_empty()) {
            self.name = name;
        }
        self.updated_at = at.max(self.created_at);
    }
}
