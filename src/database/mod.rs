//! database (db) union structure.
#[cfg(test)]
pub mod memory;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::Postgres;
use crate::store::{Field, StoreError};

pub const DEFAULT_CREDENTIALS: &str = "postgres";
pub const DEFAULT_DATABASE_NAME: &str = "roster";
pub const DEFAULT_POOL_SIZE: u32 = 10;

/// PostgreSQL connection pool shared by repositories.
#[derive(Clone)]
pub struct Database {
    pub postgres: PgPool,
}

impl Database {
    /// Init database connections.
    ///
    /// Connections are checked out of the pool for one query and given
    /// back right after.
    pub async fn new(config: &Postgres) -> Result<Self, sqlx::Error> {
        let username =
            config.username.as_deref().unwrap_or(DEFAULT_CREDENTIALS);
        let password =
            config.password.as_deref().unwrap_or(DEFAULT_CREDENTIALS);
        let db = config.database.as_deref().unwrap_or(DEFAULT_DATABASE_NAME);
        let hostname = &config.address;

        let addr = format!("postgres://{username}:{password}@{hostname}/{db}");
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size.unwrap_or(DEFAULT_POOL_SIZE));
        let postgres = pool.connect(&addr).await?;

        tracing::info!(%hostname, %db, "postgres connected");

        Ok(Self { postgres })
    }

    /// Apply pending migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!().run(&self.postgres).await
    }
}

/// Turn unique violations into [`StoreError::Conflict`].
///
/// Uniqueness is checked before writing; this catches concurrent writers
/// that passed the check at the same time.
pub fn conflict(err: sqlx::Error) -> StoreError {
    let field = match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            match db.constraint() {
                Some("users_username_key") => Some(Field::Username),
                Some("users_email_key") => Some(Field::Email),
                Some("users_phone_key") => Some(Field::Phone),
                Some(_) => Some(Field::Id),
                None => None,
            }
        },
        _ => None,
    };

    match field {
        Some(field) => StoreError::Conflict { field },
        None => StoreError::Database(err),
    }
}
