//! Authoritative local store for replicated entities.
//!
//! [`MutationStore`] wraps a [`Repository`] and adds what every backend must
//! honor: a deadline on each call, uniqueness checks before writes and
//! `NotFound` on missing identities.
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::event::EntityKind;

/// Default deadline of a store call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised by the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} `{id}` not found")]
    NotFound { kind: EntityKind, id: String },
    #[error("{field} already registered")]
    Conflict { field: Field },
    #[error("store call exceeded its deadline")]
    Timeout,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Columns usable as lookup keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Id,
    Username,
    Email,
    Phone,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Field::Id => write!(f, "id"),
            Field::Username => write!(f, "username"),
            Field::Email => write!(f, "email"),
            Field::Phone => write!(f, "phone"),
        }
    }
}

/// A record owned by a [`MutationStore`].
pub trait Entity: Clone + Send + Sync + 'static {
    const KIND: EntityKind;
    /// Fields that no two records may share. Empty values are not checked.
    const UNIQUE_FIELDS: &'static [Field];

    /// Partial modification; absent fields keep their value.
    type Patch: Send;

    fn id(&self) -> &str;

    /// Value of a lookup field, if this entity has it.
    fn field(&self, field: Field) -> Option<&str>;

    fn created_at(&self) -> DateTime<Utc>;

    /// Apply a patch and refresh `updated_at`, never before `created_at`.
    fn apply(&mut self, patch: Self::Patch, at: DateTime<Utc>);
}

/// Storage backend of one entity kind.
#[async_trait]
pub trait Repository<E: Entity>: Send + Sync {
    async fn insert(&self, record: &E) -> Result<(), StoreError>;

    async fn find_by_field(
        &self,
        field: Field,
        value: &str,
    ) -> Result<Option<E>, StoreError>;

    /// Overwrite a record. Returns `false` if nothing matched.
    async fn update(&self, record: &E) -> Result<bool, StoreError>;

    /// Returns `false` if nothing matched.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    async fn list(&self) -> Result<Vec<E>, StoreError>;
}

pub struct MutationStore<E: Entity> {
    repository: Arc<dyn Repository<E>>,
    deadline: Duration,
}

impl<E: Entity> Clone for MutationStore<E> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            deadline: self.deadline,
        }
    }
}

impl<E: Entity> MutationStore<E> {
    /// Create a new [`MutationStore`].
    pub fn new(repository: Arc<dyn Repository<E>>) -> Self {
        Self {
            repository,
            deadline: DEFAULT_TIMEOUT,
        }
    }

    /// Set the deadline of each call.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    async fn within<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.deadline, call)
            .await
            .map_err(|_| StoreError::Timeout)?
    }

    fn not_found(id: &str) -> StoreError {
        StoreError::NotFound {
            kind: E::KIND,
            id: id.to_owned(),
        }
    }

    /// Fail with `Conflict` if another record holds one of the unique values.
    async fn ensure_unique(&self, record: &E) -> Result<(), StoreError> {
        for field in E::UNIQUE_FIELDS {
            let Some(value) = record.field(*field).filter(|v| !v.is_empty())
            else {
                continue;
            };

            if let Some(other) =
                self.repository.find_by_field(*field, value).await?
            {
                if other.id() != record.id() {
                    return Err(StoreError::Conflict { field: *field });
                }
            }
        }

        Ok(())
    }

    /// Insert a new record.
    pub async fn create(&self, record: E) -> Result<E, StoreError> {
        self.within(async {
            if self
                .repository
                .find_by_field(Field::Id, record.id())
                .await?
                .is_some()
            {
                return Err(StoreError::Conflict { field: Field::Id });
            }
            self.ensure_unique(&record).await?;
            self.repository.insert(&record).await?;

            Ok(record)
        })
        .await
    }

    pub async fn get_by_id(&self, id: &str) -> Result<E, StoreError> {
        self.within(async {
            self.repository
                .find_by_field(Field::Id, id)
                .await?
                .ok_or_else(|| Self::not_found(id))
        })
        .await
    }

    pub async fn get_by_unique_field(
        &self,
        field: Field,
        value: &str,
    ) -> Result<Option<E>, StoreError> {
        self.within(self.repository.find_by_field(field, value)).await
    }

    /// Apply `patch` to an existing record and persist it.
    pub async fn update(
        &self,
        id: &str,
        patch: E::Patch,
        at: DateTime<Utc>,
    ) -> Result<E, StoreError> {
        self.within(async {
            let mut record = self
                .repository
                .find_by_field(Field::Id, id)
                .await?
                .ok_or_else(|| Self::not_found(id))?;

            record.apply(patch, at);
            self.ensure_unique(&record).await?;

            if !self.repository.update(&record).await? {
                return Err(Self::not_found(id));
            }

            Ok(record)
        })
        .await
    }

    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.within(async {
            if self.repository.delete(id).await? {
                Ok(())
            } else {
                Err(Self::not_found(id))
            }
        })
        .await
    }

    /// Every record, oldest first.
    pub async fn list_all(&self) -> Result<Vec<E>, StoreError> {
        let mut records = self.within(self.repository.list()).await?;
        records.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });

        Ok(records)
    }
}
