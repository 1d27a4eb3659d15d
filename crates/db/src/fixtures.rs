use serde::Serialize;
use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Canonical demo directory: the approval chain of a mid-size construction company.
const SEED_DEPARTMENTS: &[SeedDepartment] = &[
    SeedDepartment { id: "dept-logistica", approval_order: 1, requires_approval: true },
    SeedDepartment { id: "dept-administracion", approval_order: 2, requires_approval: true },
    SeedDepartment { id: "dept-operaciones", approval_order: 2, requires_approval: true },
    SeedDepartment { id: "dept-general", approval_order: 3, requires_approval: true },
    SeedDepartment { id: "dept-marketing", approval_order: 0, requires_approval: false },
];

const SEED_USERS: &[SeedUser] = &[
    SeedUser { id: "usr-admin", role: "admin", department_id: None, is_department_head: false },
    SeedUser {
        id: "usr-logistica-head",
        role: "staff",
        department_id: Some("dept-logistica"),
        is_department_head: true,
    },
    SeedUser {
        id: "usr-logistica-staff",
        role: "staff",
        department_id: Some("dept-logistica"),
        is_department_head: false,
    },
    SeedUser {
        id: "usr-administracion-head",
        role: "staff",
        department_id: Some("dept-administracion"),
        is_department_head: true,
    },
    SeedUser {
        id: "usr-operaciones-head",
        role: "staff",
        department_id: Some("dept-operaciones"),
        is_department_head: true,
    },
    SeedUser {
        id: "usr-general-head",
        role: "staff",
        department_id: Some("dept-general"),
        is_department_head: true,
    },
    SeedUser {
        id: "usr-marketing-staff",
        role: "staff",
        department_id: Some("dept-marketing"),
        is_department_head: false,
    },
];

/// Demo departments and users for local runs and end-to-end tests.
///
/// Loading is idempotent: rows are upserted by id.
pub struct DemoDirectory;

impl DemoDirectory {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_directory.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            departments_seeded: SEED_DEPARTMENTS.iter().map(|department| department.id).collect(),
            users_seeded: SEED_USERS.iter().map(|user| user.id).collect(),
        })
    }

    /// Checks that every seeded row exists with the expected chain attributes.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for department in SEED_DEPARTMENTS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM department
                               WHERE id = ?1 AND approval_order = ?2 AND requires_approval = ?3)",
            )
            .bind(department.id)
            .bind(department.approval_order)
            .bind(department.requires_approval)
            .fetch_one(pool)
            .await?;
            checks.push((department.id, present == 1));
        }

        for user in SEED_USERS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM app_user
                               WHERE id = ?1 AND role = ?2
                                 AND department_id IS ?3 AND is_department_head = ?4)",
            )
            .bind(user.id)
            .bind(user.role)
            .bind(user.department_id)
            .bind(user.is_department_head)
            .fetch_one(pool)
            .await?;
            checks.push((user.id, present == 1));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the demo directory. Fails if orders still reference its users.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let user_ids = sql_array_from_ids(SEED_USERS.iter().map(|user| user.id));
        let department_ids = sql_array_from_ids(SEED_DEPARTMENTS.iter().map(|dept| dept.id));

        sqlx::query(&format!("DELETE FROM app_user WHERE id IN {user_ids}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM department WHERE id IN {department_ids}"))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedDepartment {
    id: &'static str,
    approval_order: i64,
    requires_approval: bool,
}

#[derive(Debug, Clone, Copy)]
struct SeedUser {
    id: &'static str,
    role: &'static str,
    department_id: Option<&'static str>,
    is_department_head: bool,
}

fn sql_array_from_ids<'a>(ids: impl Iterator<Item = &'a str>) -> String {
    let quoted = ids.map(|id| format!("'{id}'")).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug, Serialize)]
pub struct SeedResult {
    pub departments_seeded: Vec<&'static str>,
    pub users_seeded: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
