use chrono::Utc;
use sqlx::Row;

use procure_core::domain::department::{Department, DepartmentId};

use super::{decode_err, parse_u32, DepartmentRepository, RepositoryError};
use crate::DbPool;

pub struct SqlDepartmentRepository {
    pool: DbPool,
}

impl SqlDepartmentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_department(row: &sqlx::sqlite::SqliteRow) -> Result<Department, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let code: String = row.try_get("code").map_err(decode_err)?;
    let name: String = row.try_get("name").map_err(decode_err)?;
    let approval_order: i64 = row.try_get("approval_order").map_err(decode_err)?;
    let requires_approval: bool = row.try_get("requires_approval").map_err(decode_err)?;

    Ok(Department {
        id: DepartmentId(id),
        code,
        name,
        approval_order: parse_u32("approval_order", approval_order)?,
        requires_approval,
    })
}

#[async_trait::async_trait]
impl DepartmentRepository for SqlDepartmentRepository {
    async fn find_by_id(&self, id: &DepartmentId) -> Result<Option<Department>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, code, name, approval_order, requires_approval
             FROM department WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_department).transpose()
    }

    async fn list_approval_departments(&self) -> Result<Vec<Department>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, code, name, approval_order, requires_approval
             FROM department
             WHERE requires_approval = 1
             ORDER BY approval_order ASC, code ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_department).collect()
    }

    async fn save(&self, department: Department) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO department (id, code, name, approval_order, requires_approval, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 code = excluded.code,
                 name = excluded.name,
                 approval_order = excluded.approval_order,
                 requires_approval = excluded.requires_approval",
        )
        .bind(&department.id.0)
        .bind(&department.code)
        .bind(&department.name)
        .bind(i64::from(department.approval_order))
        .bind(department.requires_approval)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
