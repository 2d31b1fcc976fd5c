//! Apply events published by other services to the local mirror.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::clock::Clock;
use crate::event::{EntityKind, InboundMessage, Operation, RoutingKey};
use crate::role::{Role, RolePatch, RoleStore};
use crate::store::{Field, StoreError};
use crate::user::{User, UserPatch, UserStore};

#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    #[error("payload is not a valid snapshot")]
    Payload(#[from] serde_json::Error),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What happened to a consumed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// Insert of a record already mirrored.
    Duplicate,
    /// Delete of a record not mirrored.
    Missing,
    /// Unknown routing key.
    Ignored,
}

impl Outcome {
    fn as_str(&self) -> &'static str {
        match self {
            Outcome::Applied => "applied",
            Outcome::Duplicate => "duplicate",
            Outcome::Missing => "missing",
            Outcome::Ignored => "ignored",
        }
    }
}

/// User fields as found on the wire. Anything may be absent.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UserSnapshot {
    id: Option<String>,
    name: Option<String>,
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
    phone: Option<String>,
    role_id: Option<String>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RoleSnapshot {
    id: Option<String>,
    name: Option<String>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

fn required(
    value: Option<String>,
    name: &'static str,
) -> Result<String, ReplicationError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(ReplicationError::MissingField(name))
}

/// Creation and modification dates of a snapshot, keeping
/// `updated_at >= created_at`.
fn dates(
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let created_at = created_at.unwrap_or(now);
    (created_at, updated_at.unwrap_or(created_at).max(created_at))
}

/// Consume mirrored events.
///
/// Consumption is terminal: nothing applied here is published again.
#[derive(Clone)]
pub struct EventSubscriber {
    users: UserStore,
    roles: RoleStore,
    clock: Arc<dyn Clock>,
}

impl EventSubscriber {
    /// Create a new [`EventSubscriber`].
    pub fn new(users: UserStore, roles: RoleStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            users,
            roles,
            clock,
        }
    }

    /// Apply one message to the local store.
    ///
    /// Replayed inserts and deletes of absent records succeed, so a message
    /// delivered twice converges to the same state.
    pub async fn handle(
        &self,
        message: &InboundMessage,
    ) -> Result<Outcome, ReplicationError> {
        let Some(key) = message.method.as_deref().and_then(RoutingKey::parse)
        else {
            tracing::warn!(
                topic = %message.topic,
                method = ?message.method,
                "unrecognized event, ignoring"
            );
            metrics::counter!("events_consumed_total", "method" => "unknown", "outcome" => "ignored")
                .increment(1);
            return Ok(Outcome::Ignored);
        };

        let outcome = match key.kind {
            EntityKind::User => {
                self.apply_user(key.operation, &message.payload).await?
            },
            EntityKind::Role => {
                self.apply_role(key.operation, &message.payload).await?
            },
        };

        metrics::counter!("events_consumed_total", "method" => key.to_string(), "outcome" => outcome.as_str())
            .increment(1);
        tracing::debug!(method = %key, outcome = outcome.as_str(), "event consumed");

        Ok(outcome)
    }

    async fn apply_user(
        &self,
        operation: Operation,
        payload: &[u8],
    ) -> Result<Outcome, ReplicationError> {
        let snapshot: UserSnapshot = serde_json::from_slice(payload)?;
        let id = required(snapshot.id, "id")?;
        let now = self.clock.now();

        match operation {
            Operation::Insert => {
                let (created_at, updated_at) =
                    dates(snapshot.created_at, snapshot.updated_at, now);
                let user = User {
                    id,
                    name: snapshot.name.unwrap_or_default(),
                    username: required(snapshot.username, "username")?,
                    email: required(snapshot.email, "email")?,
                    password: snapshot.password.unwrap_or_default(),
                    phone: snapshot.phone.unwrap_or_default(),
                    role_id: required(snapshot.role_id, "role_id")?,
                    created_at,
                    updated_at,
                };

                insert_outcome(self.users.create(user).await)
            },
            Operation::Update => {
                let patch = UserPatch {
                    name: snapshot.name,
                    username: snapshot.username,
                    email: snapshot.email,
                    password: snapshot.password,
                    phone: snapshot.phone,
                    role_id: snapshot.role_id,
                };
                let at = snapshot.updated_at.unwrap_or(now);

                self.users.update(&id, patch, at).await?;
                Ok(Outcome::Applied)
            },
            Operation::Delete => delete_outcome(self.users.delete(&id).await),
        }
    }

    async fn apply_role(
        &self,
        operation: Operation,
        payload: &[u8],
    ) -> Result<Outcome, ReplicationError> {
        let snapshot: RoleSnapshot = serde_json::from_slice(payload)?;
        let id = required(snapshot.id, "id")?;
        let now = self.clock.now();

        match operation {
            Operation::Insert => {
                let (created_at, updated_at) =
                    dates(snapshot.created_at, snapshot.updated_at, now);
                let role = Role {
                    id,
                    name: required(snapshot.name, "name")?,
                    created_at,
                    updated_at,
                };

                insert_outcome(self.roles.create(role).await)
            },
            Operation::Update => {
                let patch = RolePatch {
                    name: snapshot.name,
                };
                let at = snapshot.updated_at.unwrap_or(now);

                self.roles.update(&id, patch, at).await?;
                Ok(Outcome::Applied)
            },
            Operation::Delete => delete_outcome(self.roles.delete(&id).await),
        }
    }
}

fn insert_outcome<E>(
    result: Result<E, StoreError>,
) -> Result<Outcome, ReplicationError> {
    match result {
        Ok(_) => Ok(Outcome::Applied),
        Err(StoreError::Conflict { field: Field::Id }) => Ok(Outcome::Duplicate),
        Err(err) => Err(err.into()),
    }
}

fn delete_outcome(
    result: Result<(), StoreError>,
) -> Result<Outcome, ReplicationError> {
    match result {
        Ok(()) => Ok(Outcome::Applied),
        Err(StoreError::NotFound { .. }) => Ok(Outcome::Missing),
        Err(err) => Err(err.into()),
    }
}
