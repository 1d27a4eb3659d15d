use chrono::Utc;
use sqlx::{Row, Sqlite, Transaction};

use procure_core::approvals::{derive_order_status, CommitOutcome, DecisionCommit, RejectionPolicy};
use procure_core::domain::approval::{ApprovalDecision, ApprovalEntry, ApprovalId, ApprovalStatus};
use procure_core::domain::department::DepartmentId;
use procure_core::domain::order::{Order, OrderId};
use procure_core::domain::user::UserId;

use super::order::insert_order;
use super::{
    decode_err, parse_optional_timestamp, parse_timestamp, parse_u32, ApprovalLedgerRepository,
    RepositoryError,
};
use crate::DbPool;

const ENTRY_COLUMNS: &str = "id, order_id, department_id, department_name, approver_id, status,
                             comments, approved_at, approval_order, created_at";

pub struct SqlApprovalLedgerRepository {
    pool: DbPool,
}

impl SqlApprovalLedgerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_status(value: &str) -> Result<ApprovalStatus, RepositoryError> {
    ApprovalStatus::parse(value)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown approval status `{value}`")))
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalEntry, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let order_id: String = row.try_get("order_id").map_err(decode_err)?;
    let department_id: String = row.try_get("department_id").map_err(decode_err)?;
    let department_name: String = row.try_get("department_name").map_err(decode_err)?;
    let approver_id: Option<String> = row.try_get("approver_id").map_err(decode_err)?;
    let status: String = row.try_get("status").map_err(decode_err)?;
    let comments: Option<String> = row.try_get("comments").map_err(decode_err)?;
    let approved_at: Option<String> = row.try_get("approved_at").map_err(decode_err)?;
    let approval_order: i64 = row.try_get("approval_order").map_err(decode_err)?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;

    Ok(ApprovalEntry {
        id: ApprovalId(id),
        order_id: OrderId(order_id),
        department_id: DepartmentId(department_id),
        department_name,
        approver_id: approver_id.map(UserId),
        status: parse_status(&status)?,
        comments,
        approved_at: parse_optional_timestamp("approved_at", approved_at)?,
        approval_order: parse_u32("approval_order", approval_order)?,
        created_at: parse_timestamp("created_at", created_at)?,
    })
}

async fn load_ledger(
    tx: &mut Transaction<'_, Sqlite>,
    order_id: &OrderId,
) -> Result<Vec<ApprovalEntry>, RepositoryError> {
    let rows = sqlx::query(&format!(
        "SELECT {ENTRY_COLUMNS} FROM approval_entry
         WHERE order_id = ? ORDER BY approval_order ASC, department_name ASC"
    ))
    .bind(&order_id.0)
    .fetch_all(&mut **tx)
    .await?;

    rows.iter().map(row_to_entry).collect()
}

async fn insert_entries(
    tx: &mut Transaction<'_, Sqlite>,
    order_id: &OrderId,
    entries: &[ApprovalEntry],
) -> Result<(), RepositoryError> {
    if let Some(foreign) = entries.iter().find(|entry| &entry.order_id != order_id) {
        return Err(RepositoryError::Conflict(format!(
            "entry `{}` belongs to order `{}`, not `{}`",
            foreign.id.0, foreign.order_id.0, order_id.0
        )));
    }

    let existing: i64 =
        sqlx::query_scalar("SELECT COUNT(1) FROM approval_entry WHERE order_id = ?")
            .bind(&order_id.0)
            .fetch_one(&mut **tx)
            .await?;
    if existing > 0 {
        return Err(RepositoryError::Conflict(format!(
            "order `{}` already has an approval ledger",
            order_id.0
        )));
    }

    for entry in entries {
        sqlx::query(&format!(
            "INSERT INTO approval_entry ({ENTRY_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&entry.id.0)
        .bind(&entry.order_id.0)
        .bind(&entry.department_id.0)
        .bind(&entry.department_name)
        .bind(entry.approver_id.as_ref().map(|id| id.0.as_str()))
        .bind(entry.status.as_str())
        .bind(&entry.comments)
        .bind(entry.approved_at.map(|at| at.to_rfc3339()))
        .bind(i64::from(entry.approval_order))
        .bind(entry.created_at.to_rfc3339())
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

#[async_trait::async_trait]
impl ApprovalLedgerRepository for SqlApprovalLedgerRepository {
    async fn insert_all(
        &self,
        order_id: &OrderId,
        entries: Vec<ApprovalEntry>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        insert_entries(&mut tx, order_id, &entries).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn create_with_ledger(
        &self,
        order: Order,
        entries: Vec<ApprovalEntry>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        insert_order(&mut tx, &order).await?;
        insert_entries(&mut tx, &order.id, &entries).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_for_order(
        &self,
        order_id: &OrderId,
    ) -> Result<Vec<ApprovalEntry>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM approval_entry
             WHERE order_id = ? ORDER BY approval_order ASC, department_name ASC"
        ))
        .bind(&order_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn list_pending_for_department(
        &self,
        department_id: &DepartmentId,
    ) -> Result<Vec<ApprovalEntry>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM approval_entry
             WHERE department_id = ? AND status = 'pending'
             ORDER BY created_at ASC, order_id ASC"
        ))
        .bind(&department_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn commit_decision(
        &self,
        commit: DecisionCommit,
    ) -> Result<CommitOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // The write comes first so the transaction takes the write lock before reading.
        let updated = sqlx::query(
            "UPDATE approval_entry
             SET status = ?, approver_id = ?, comments = ?, approved_at = ?
             WHERE id = ? AND order_id = ? AND status = 'pending'",
        )
        .bind(commit.decision.resulting_status().as_str())
        .bind(&commit.approver_id.0)
        .bind(&commit.comments)
        .bind(commit.decided_at.to_rfc3339())
        .bind(&commit.entry_id.0)
        .bind(&commit.order_id.0)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let current = sqlx::query(
                "SELECT department_name, status FROM approval_entry WHERE id = ? AND order_id = ?",
            )
            .bind(&commit.entry_id.0)
            .bind(&commit.order_id.0)
            .fetch_optional(&mut *tx)
            .await?;
            tx.rollback().await?;

            return match current {
                Some(row) => {
                    let department_name: String =
                        row.try_get("department_name").map_err(decode_err)?;
                    let status: String = row.try_get("status").map_err(decode_err)?;
                    Ok(CommitOutcome::AlreadyProcessed {
                        department_name,
                        status: parse_status(&status)?,
                    })
                }
                None => Ok(CommitOutcome::EntryNotFound),
            };
        }

        if commit.decision == ApprovalDecision::Reject
            && commit.rejection_policy == RejectionPolicy::SkipRemaining
        {
            sqlx::query(
                "UPDATE approval_entry SET status = 'skipped'
                 WHERE order_id = ? AND status = 'pending'",
            )
            .bind(&commit.order_id.0)
            .execute(&mut *tx)
            .await?;
        }

        let ledger = load_ledger(&mut tx, &commit.order_id).await?;
        let order_status = derive_order_status(&ledger);

        sqlx::query("UPDATE purchase_order SET status = ?, updated_at = ? WHERE id = ?")
            .bind(order_status.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(&commit.order_id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(CommitOutcome::Applied { order_status, ledger })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use procure_core::approvals::{plan_seed, CommitOutcome, DecisionCommit, RejectionPolicy};
    use procure_core::domain::approval::{ApprovalDecision, ApprovalEntry, ApprovalStatus};
    use procure_core::domain::department::{Department, DepartmentId};
    use procure_core::domain::order::{Order, OrderId, OrderLine, OrderStatus};
    use procure_core::domain::user::{User, UserId, UserRole};

    use super::SqlApprovalLedgerRepository;
    use crate::repositories::{
        ApprovalLedgerRepository, DepartmentRepository, OrderRepository, RepositoryError,
        SqlDepartmentRepository, SqlOrderRepository, SqlUserRepository, UserRepository,
    };
    use crate::{connect_with_settings, migrations, DbPool};

    fn departments() -> Vec<Department> {
        [
            ("dept-log", "LOGISTICA", "Logística", 1),
            ("dept-adm", "ADMINISTRACION", "Gerencia de Administración", 2),
            ("dept-ops", "OPERACIONES", "Gerencia de Operaciones", 2),
            ("dept-gg", "GERENCIA_GENERAL", "Gerencia General", 3),
        ]
        .into_iter()
        .map(|(id, code, name, rank)| Department {
            id: DepartmentId(id.to_string()),
            code: code.to_string(),
            name: name.to_string(),
            approval_order: rank,
            requires_approval: true,
        })
        .collect()
    }

    async fn setup() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let department_repo = SqlDepartmentRepository::new(pool.clone());
        for department in departments() {
            department_repo.save(department).await.expect("save department");
        }

        let user_repo = SqlUserRepository::new(pool.clone());
        for (id, department) in
            [("usr-log-head", "dept-log"), ("usr-adm-head", "dept-adm"), ("usr-ops-head", "dept-ops")]
        {
            user_repo
                .save(User {
                    id: UserId(id.to_string()),
                    name: id.to_string(),
                    email: format!("{id}@example.pe"),
                    role: UserRole::Staff,
                    department_id: Some(DepartmentId(department.to_string())),
                    is_department_head: true,
                })
                .await
                .expect("save user");
        }
        pool
    }

    fn order_record(id: &str) -> Order {
        let now = Utc::now();
        Order {
            id: OrderId(id.to_string()),
            applicant_id: UserId("usr-log-head".to_string()),
            store_id: "almacen-callao".to_string(),
            items: vec![OrderLine {
                description: "Ladrillo King Kong 18 huecos".to_string(),
                quantity: 1000,
                unit_price: Decimal::new(95, 2),
                line_total: Decimal::new(95000, 2),
            }],
            subtotal: Decimal::new(95000, 2),
            tax: Decimal::new(17100, 2),
            total: Decimal::new(112100, 2),
            currency: "PEN".to_string(),
            status: OrderStatus::Pending,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    async fn seeded_order(pool: &DbPool, id: &str) -> (OrderId, Vec<ApprovalEntry>) {
        let order = order_record(id);
        let order_id = order.id.clone();
        SqlOrderRepository::new(pool.clone()).create(order).await.expect("create order");

        let plan =
            plan_seed(&order_id, &DepartmentId("dept-log".to_string()), &departments(), Utc::now())
                .expect("plan");
        SqlApprovalLedgerRepository::new(pool.clone())
            .insert_all(&order_id, plan.clone())
            .await
            .expect("seed");
        (order_id, plan)
    }

    fn commit_for(
        order_id: &OrderId,
        entry: &ApprovalEntry,
        approver: &str,
        decision: ApprovalDecision,
        rejection_policy: RejectionPolicy,
    ) -> DecisionCommit {
        DecisionCommit {
            order_id: order_id.clone(),
            entry_id: entry.id.clone(),
            approver_id: UserId(approver.to_string()),
            decision,
            comments: Some("revisado".to_string()),
            decided_at: Utc::now(),
            rejection_policy,
        }
    }

    fn entry_for<'a>(ledger: &'a [ApprovalEntry], department: &str) -> &'a ApprovalEntry {
        ledger
            .iter()
            .find(|entry| entry.department_id.0 == department)
            .expect("entry for department")
    }

    #[tokio::test]
    async fn seeded_ledger_lists_in_rank_then_name_order() {
        let pool = setup().await;
        let (order_id, _) = seeded_order(&pool, "PO-1").await;

        let names: Vec<String> = SqlApprovalLedgerRepository::new(pool)
            .list_for_order(&order_id)
            .await
            .expect("list")
            .into_iter()
            .map(|entry| entry.department_name)
            .collect();

        assert_eq!(
            names,
            vec![
                "Logística",
                "Gerencia de Administración",
                "Gerencia de Operaciones",
                "Gerencia General"
            ]
        );
    }

    #[tokio::test]
    async fn second_seed_is_refused_and_leaves_ledger_intact() {
        let pool = setup().await;
        let (order_id, plan) = seeded_order(&pool, "PO-2").await;
        let repo = SqlApprovalLedgerRepository::new(pool);

        let replan =
            plan_seed(&order_id, &DepartmentId("dept-log".to_string()), &departments(), Utc::now())
                .expect("plan");
        let result = repo.insert_all(&order_id, replan).await;

        assert!(matches!(result, Err(RepositoryError::Conflict(_))));
        assert_eq!(repo.list_for_order(&order_id).await.expect("list").len(), plan.len());
    }

    #[tokio::test]
    async fn failed_batch_inserts_nothing() {
        let pool = setup().await;
        let (order_id, _) = seeded_order(&pool, "PO-3").await;
        let other = OrderId("PO-3b".to_string());
        let repo = SqlApprovalLedgerRepository::new(pool.clone());

        // PO-3b is not a stored order, so the foreign key fails on the first row.
        let mut plan =
            plan_seed(&other, &DepartmentId("dept-log".to_string()), &departments(), Utc::now())
                .expect("plan");
        plan.truncate(2);
        assert!(repo.insert_all(&other, plan).await.is_err());
        assert!(repo.list_for_order(&other).await.expect("list").is_empty());
        assert_eq!(repo.list_for_order(&order_id).await.expect("list").len(), 4);
    }

    #[tokio::test]
    async fn order_with_ledger_is_written_in_one_transaction() {
        let pool = setup().await;
        let repo = SqlApprovalLedgerRepository::new(pool.clone());
        let orders = SqlOrderRepository::new(pool);

        let accepted = order_record("PO-6");
        let plan =
            plan_seed(&accepted.id, &DepartmentId("dept-log".to_string()), &departments(), Utc::now())
                .expect("plan");
        repo.create_with_ledger(accepted.clone(), plan).await.expect("create with ledger");
        assert_eq!(
            orders.find_by_id(&accepted.id).await.expect("find").map(|order| order.items.len()),
            Some(1)
        );
        assert_eq!(repo.list_for_order(&accepted.id).await.expect("list").len(), 4);

        // A repeated entry violates the primary key after the order row is written.
        let refused = order_record("PO-7");
        let mut broken =
            plan_seed(&refused.id, &DepartmentId("dept-log".to_string()), &departments(), Utc::now())
                .expect("plan");
        broken.push(broken[0].clone());
        assert!(repo.create_with_ledger(refused.clone(), broken).await.is_err());
        assert_eq!(orders.find_by_id(&refused.id).await.expect("find"), None);
        assert!(repo.list_for_order(&refused.id).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn approve_moves_order_to_in_progress() {
        let pool = setup().await;
        let (order_id, plan) = seeded_order(&pool, "PO-4").await;
        let repo = SqlApprovalLedgerRepository::new(pool.clone());

        let outcome = repo
            .commit_decision(commit_for(
                &order_id,
                entry_for(&plan, "dept-log"),
                "usr-log-head",
                ApprovalDecision::Approve,
                RejectionPolicy::SkipRemaining,
            ))
            .await
            .expect("commit");

        let CommitOutcome::Applied { order_status, ledger } = outcome else {
            panic!("expected applied outcome");
        };
        assert_eq!(order_status, OrderStatus::InProgress);
        let logistica = entry_for(&ledger, "dept-log");
        assert_eq!(logistica.status, ApprovalStatus::Approved);
        assert_eq!(logistica.approver_id, Some(UserId("usr-log-head".to_string())));
        assert!(logistica.approved_at.is_some());

        let stored = SqlOrderRepository::new(pool).find_by_id(&order_id).await.expect("find");
        assert_eq!(stored.map(|order| order.status), Some(OrderStatus::InProgress));
    }

    #[tokio::test]
    async fn second_decision_on_same_entry_is_already_processed() {
        let pool = setup().await;
        let (order_id, plan) = seeded_order(&pool, "PO-5").await;
        let repo = SqlApprovalLedgerRepository::new(pool);
        let logistica = entry_for(&plan, "dept-log");

        let first = repo
            .commit_decision(commit_for(
                &order_id,
                logistica,
                "usr-log-head",
                ApprovalDecision::Approve,
                RejectionPolicy::SkipRemaining,
            ))
            .await
            .expect("first");
        let second = repo
            .commit_decision(commit_for(
                &order_id,
                logistica,
                "usr-log-head",
                ApprovalDecision::Reject,
                RejectionPolicy::SkipRemaining,
            ))
            .await
            .expect("second");

        assert!(matches!(first, CommitOutcome::Applied { .. }));
        assert_eq!(
            second,
            CommitOutcome::AlreadyProcessed {
                department_name: "Logística".to_string(),
                status: ApprovalStatus::Approved,
            }
        );
    }

    #[tokio::test]
    async fn rejection_skips_remaining_entries_atomically() {
        let pool = setup().await;
        let (order_id, plan) = seeded_order(&pool, "PO-6").await;
        let repo = SqlApprovalLedgerRepository::new(pool.clone());

        repo.commit_decision(commit_for(
            &order_id,
            entry_for(&plan, "dept-log"),
            "usr-log-head",
            ApprovalDecision::Approve,
            RejectionPolicy::SkipRemaining,
        ))
        .await
        .expect("approve");
        let outcome = repo
            .commit_decision(commit_for(
                &order_id,
                entry_for(&plan, "dept-adm"),
                "usr-adm-head",
                ApprovalDecision::Reject,
                RejectionPolicy::SkipRemaining,
            ))
            .await
            .expect("reject");

        let CommitOutcome::Applied { order_status, ledger } = outcome else {
            panic!("expected applied outcome");
        };
        assert_eq!(order_status, OrderStatus::Rejected);
        assert_eq!(entry_for(&ledger, "dept-ops").status, ApprovalStatus::Skipped);
        assert_eq!(entry_for(&ledger, "dept-gg").status, ApprovalStatus::Skipped);
        assert_eq!(entry_for(&ledger, "dept-log").status, ApprovalStatus::Approved);

        let stored = SqlOrderRepository::new(pool).find_by_id(&order_id).await.expect("find");
        assert_eq!(stored.map(|order| order.status), Some(OrderStatus::Rejected));
    }

    #[tokio::test]
    async fn leave_pending_policy_keeps_siblings_pending() {
        let pool = setup().await;
        let (order_id, plan) = seeded_order(&pool, "PO-7").await;
        let repo = SqlApprovalLedgerRepository::new(pool);

        let outcome = repo
            .commit_decision(commit_for(
                &order_id,
                entry_for(&plan, "dept-log"),
                "usr-log-head",
                ApprovalDecision::Reject,
                RejectionPolicy::LeavePending,
            ))
            .await
            .expect("reject");

        let CommitOutcome::Applied { order_status, ledger } = outcome else {
            panic!("expected applied outcome");
        };
        assert_eq!(order_status, OrderStatus::Rejected);
        assert_eq!(ledger.iter().filter(|entry| entry.status == ApprovalStatus::Pending).count(), 3);
    }

    #[tokio::test]
    async fn unknown_entry_is_reported() {
        let pool = setup().await;
        let (order_id, plan) = seeded_order(&pool, "PO-8").await;
        let repo = SqlApprovalLedgerRepository::new(pool);

        let mut commit = commit_for(
            &order_id,
            entry_for(&plan, "dept-log"),
            "usr-log-head",
            ApprovalDecision::Approve,
            RejectionPolicy::SkipRemaining,
        );
        commit.order_id = OrderId("PO-other".to_string());

        assert_eq!(repo.commit_decision(commit).await.expect("commit"), CommitOutcome::EntryNotFound);
    }

    #[tokio::test]
    async fn pending_entries_are_listed_per_department() {
        let pool = setup().await;
        let (first_order, _) = seeded_order(&pool, "PO-9").await;
        let (second_order, _) = seeded_order(&pool, "PO-10").await;
        let repo = SqlApprovalLedgerRepository::new(pool);

        let pending = repo
            .list_pending_for_department(&DepartmentId("dept-adm".to_string()))
            .await
            .expect("list pending");

        let orders: Vec<&OrderId> = pending.iter().map(|entry| &entry.order_id).collect();
        assert_eq!(orders.len(), 2);
        assert!(orders.contains(&&first_order));
        assert!(orders.contains(&&second_order));
    }
}
