use chrono::Utc;
use sqlx::Row;

use procure_core::domain::department::DepartmentId;
use procure_core::domain::user::{User, UserId, UserRole};

use super::{decode_err, RepositoryError, UserRepository};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let name: String = row.try_get("name").map_err(decode_err)?;
    let email: String = row.try_get("email").map_err(decode_err)?;
    let role: String = row.try_get("role").map_err(decode_err)?;
    let department_id: Option<String> = row.try_get("department_id").map_err(decode_err)?;
    let is_department_head: bool = row.try_get("is_department_head").map_err(decode_err)?;

    let role = UserRole::parse(&role)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown user role `{role}`")))?;

    Ok(User {
        id: UserId(id),
        name,
        email,
        role,
        department_id: department_id.map(DepartmentId),
        is_department_head,
    })
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, email, role, department_id, is_department_head
             FROM app_user WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO app_user (id, name, email, role, department_id, is_department_head, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 email = excluded.email,
                 role = excluded.role,
                 department_id = excluded.department_id,
                 is_department_head = excluded.is_department_head",
        )
        .bind(&user.id.0)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(user.department_id.as_ref().map(|id| id.0.as_str()))
        .bind(user.is_department_head)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
