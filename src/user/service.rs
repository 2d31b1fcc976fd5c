use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::clock::Clock;
use crate::crypto::PasswordManager;
use crate::error::{Result, ServerError};
use crate::event::{Delivery, EntityKind, Envelope, EventPublisher, Operation};
use crate::role::{Role, RoleStore};
use crate::store::Field;
use crate::user::{User, UserPatch, UserResponse, UserStore};

/// Result of a committed local write.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation<T> {
    pub record: T,
    /// Whether the announcing event reached the bus.
    pub delivery: Delivery,
}

/// Fields of a user to create.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    pub role_id: String,
}

/// User manager.
///
/// Every accepted write is announced on the bus, except password changes
/// which stay local.
#[derive(Clone)]
pub struct UserService {
    users: UserStore,
    roles: RoleStore,
    publisher: EventPublisher,
    passwords: PasswordManager,
    clock: Arc<dyn Clock>,
}

impl UserService {
    /// Create a new [`UserService`].
    pub fn new(
        users: UserStore,
        roles: RoleStore,
        publisher: EventPublisher,
        passwords: PasswordManager,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            roles,
            publisher,
            passwords,
            clock,
        }
    }

    async fn role(&self, role_id: &str) -> Result<Role> {
        self.roles
            .get_by_unique_field(Field::Id, role_id)
            .await?
            .ok_or_else(|| ServerError::BadRequest("role not found".into()))
    }

    async fn present(&self, user: User) -> Result<UserResponse> {
        let role = self.roles.get_by_unique_field(Field::Id, &user.role_id).await?;
        Ok(UserResponse::new(user, role))
    }

    async fn announce(&self, operation: Operation, user: &User) -> Delivery {
        match Envelope::snapshot(EntityKind::User, operation, user) {
            Ok(envelope) => self.publisher.announce(envelope).await,
            Err(err) => {
                tracing::warn!(user_id = %user.id, error = %err, "cannot serialize user event");
                Delivery::Failed(err.to_string())
            },
        }
    }

    /// Create a user with a random identifier and announce it.
    pub async fn create(&self, new: NewUser) -> Result<Mutation<UserResponse>> {
        let role = self.role(&new.role_id).await?;
        let now = self.clock.now();

        let user = User {
            id: Uuid::new_v4().to_string(),
            name: new.name,
            username: new.username,
            email: new.email,
            password: self.passwords.hash_password(&new.password)?,
            phone: new.phone,
            role_id: new.role_id,
            created_at: now,
            updated_at: now,
        };
        let id = self.users.create(user).await?.id;

        // the event carries the committed row, not the request.
        let user = self.users.get_by_id(&id).await?;
        let delivery = self.announce(Operation::Insert, &user).await;
        tracing::info!(user_id = %id, delivered = delivery.is_delivered(), "user created");

        Ok(Mutation {
            record: UserResponse::new(user, Some(role)),
            delivery,
        })
    }

    /// Every user, oldest first.
    pub async fn list(&self) -> Result<Vec<UserResponse>> {
        let roles = self
            .roles
            .list_all()
            .await?
            .into_iter()
            .map(|role| (role.id.clone(), role))
            .collect::<HashMap<_, _>>();

        Ok(self
            .users
            .list_all()
            .await?
            .into_iter()
            .map(|user| {
                let role = roles.get(&user.role_id).cloned();
                UserResponse::new(user, role)
            })
            .collect())
    }

    pub async fn get(&self, id: &str) -> Result<UserResponse> {
        let user = self.users.get_by_id(id).await?;
        self.present(user).await
    }

    /// Update profile fields and announce the new snapshot.
    pub async fn update_profile(
        &self,
        id: &str,
        patch: UserPatch,
    ) -> Result<Mutation<UserResponse>> {
        if let Some(role_id) = patch.role_id.as_deref().filter(|r| !r.is_empty())
        {
            self.role(role_id).await?;
        }
        let patch = UserPatch {
            password: None,
            ..patch
        };

        self.users.update(id, patch, self.clock.now()).await?;

        let user = self.users.get_by_id(id).await?;
        let delivery = self.announce(Operation::Update, &user).await;
        tracing::info!(user_id = %id, delivered = delivery.is_delivered(), "user updated");

        Ok(Mutation {
            record: self.present(user).await?,
            delivery,
        })
    }

    /// Replace the password. `current` is checked when given.
    ///
    /// Not announced on the bus.
    pub async fn update_password(
        &self,
        id: &str,
        current: Option<&str>,
        password: &str,
    ) -> Result<UserResponse> {
        if let Some(current) = current {
            let user = self.users.get_by_id(id).await?;
            self.passwords.verify_password(current, &user.password)?;
        }

        let patch = UserPatch {
            password: Some(self.passwords.hash_password(password)?),
            ..Default::default()
        };
        let user = self.users.update(id, patch, self.clock.now()).await?;
        tracing::info!(user_id = %id, "password updated");

        self.present(user).await
    }

    /// Delete a user and announce its identity.
    pub async fn delete(&self, id: &str) -> Result<Mutation<String>> {
        self.users.delete(id).await?;

        let delivery = self
            .publisher
            .announce(Envelope::deletion(EntityKind::User, id))
            .await;
        tracing::info!(user_id = %id, delivered = delivery.is_delivered(), "user deleted");

        Ok(Mutation {
            record: id.to_owned(),
            delivery,
        })
    }
}
