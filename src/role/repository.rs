//! Handle `roles` table requests.

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use super::Role;
use crate::database::conflict;
use crate::store::{Field, Repository, StoreError};

const SELECT: &str = "SELECT id, name, created_at, updated_at FROM roles";

#[derive(Clone)]
pub struct RoleRepository {
    pool: Pool<Postgres>,
}

impl RoleRepository {
    /// Create a new [`RoleRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<Role> for RoleRepository {
    async fn insert(&self, role: &Role) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO roles (id, name, created_at, updated_at)
                VALUES ($1, $2, $3, $4)"#,
        )
        .bind(&role.id)
        .bind(&role.name)
        .bind(role.created_at)
        .bind(role.updated_at)
        .execute(&self.pool)
        .await
        .map_err(conflict)?;

        Ok(())
    }

    async fn find_by_field(
        &self,
        field: Field,
        value: &str,
    ) -> Result<Option<Role>, StoreError> {
        if field != Field::Id {
            return Ok(None);
        }

        let role = sqlx::query_as::<_, Role>(&format!("{SELECT} WHERE id = $1"))
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        Ok(role)
    }

    async fn update(&self, role: &Role) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"UPDATE roles SET name = $1, updated_at = $2 WHERE id = $3"#,
        )
        .bind(&role.name)
        .bind(role.updated_at)
        .bind(&role.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(r#"DELETE FROM roles WHERE id = $1"#)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list(&self) -> Result<Vec<Role>, StoreError> {
        let roles = sqlx::query_as::<_, Role>(&format!(
            "{SELECT} ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(roles)
    }
}
