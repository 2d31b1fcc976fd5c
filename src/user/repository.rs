//! Handle database requests.

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use crate::database::conflict;
use crate::store::{Field, Repository, StoreError};
use crate::user::User;

#[derive(Clone)]
pub struct UserRepository {
    pool: Pool<Postgres>,
}

impl UserRepository {
    /// Create a new [`UserRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<User> for UserRepository {
    /// Insert [`User`] into database.
    async fn insert(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO users (id, name, username, email, password, phone, role_id, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password)
        .bind(&user.phone)
        .bind(&user.role_id)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(conflict)?;

        Ok(())
    }

    /// Find a user using one of its lookup fields.
    async fn find_by_field(
        &self,
        field: Field,
        value: &str,
    ) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&get_by_field_query(field))
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn update(&self, user: &User) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"UPDATE users
                SET name = $1, username = $2, email = $3, password = $4, phone = $5, role_id = $6, updated_at = $7
                WHERE id = $8"#,
        )
        .bind(&user.name)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password)
        .bind(&user.phone)
        .bind(&user.role_id)
        .bind(user.updated_at)
        .bind(&user.id)
        .execute(&self.pool)
        .await
        .map_err(conflict)?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, user_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(r#"DELETE FROM users WHERE id = $1"#)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(&format!(
            "{SELECT} ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }
}

const SELECT: &str = r#"SELECT
                id,
                name,
                username,
                email,
                password,
                phone,
                role_id,
                created_at,
                updated_at
            FROM users"#;

fn get_by_field_query(field: Field) -> String {
    format!("{SELECT} WHERE {field} = $1")
}
