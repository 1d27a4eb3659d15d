use std::collections::{HashMap, HashSet};

use chrono::Utc;
use tokio::sync::RwLock;

use procure_core::approvals::{apply_commit, CommitOutcome, DecisionCommit};
use procure_core::domain::approval::ApprovalEntry;
use procure_core::domain::department::{Department, DepartmentId};
use procure_core::domain::order::{Order, OrderId, OrderStatus};
use procure_core::domain::user::{User, UserId};

use super::{
    ApprovalLedgerRepository, DepartmentRepository, OrderRepository, RepositoryError,
    UserRepository,
};

#[derive(Default)]
pub struct InMemoryDepartmentRepository {
    departments: RwLock<HashMap<String, Department>>,
}

#[async_trait::async_trait]
impl DepartmentRepository for InMemoryDepartmentRepository {
    async fn find_by_id(&self, id: &DepartmentId) -> Result<Option<Department>, RepositoryError> {
        let departments = self.departments.read().await;
        Ok(departments.get(&id.0).cloned())
    }

    async fn list_approval_departments(&self) -> Result<Vec<Department>, RepositoryError> {
        let departments = self.departments.read().await;
        let mut approving: Vec<Department> = departments
            .values()
            .filter(|department| department.requires_approval)
            .cloned()
            .collect();
        approving.sort_by(|left, right| {
            left.approval_order.cmp(&right.approval_order).then_with(|| left.code.cmp(&right.code))
        });
        Ok(approving)
    }

    async fn save(&self, department: Department) -> Result<(), RepositoryError> {
        let mut departments = self.departments.write().await;
        departments.insert(department.id.0.clone(), department);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(&id.0).cloned())
    }

    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        users.insert(user.id.0.clone(), user);
        Ok(())
    }
}

#[derive(Default)]
struct LedgerState {
    orders: HashMap<String, Order>,
    entries: HashMap<String, Vec<ApprovalEntry>>,
}

/// Orders and their approval chains behind a single lock, so a decision commit updates
/// both in one step the same way the SQL store does inside a transaction.
#[derive(Default)]
pub struct InMemoryOrderLedger {
    state: RwLock<LedgerState>,
}

fn sort_ledger(entries: &mut [ApprovalEntry]) {
    entries.sort_by(|left, right| {
        left.approval_order
            .cmp(&right.approval_order)
            .then_with(|| left.department_name.cmp(&right.department_name))
    });
}

/// Checks a chain against the stored state before anything is written.
fn validate_batch(
    state: &LedgerState,
    order_id: &OrderId,
    entries: &[ApprovalEntry],
) -> Result<(), RepositoryError> {
    if state.entries.get(&order_id.0).is_some_and(|existing| !existing.is_empty()) {
        return Err(RepositoryError::Conflict(format!(
            "order `{}` already has an approval ledger",
            order_id.0
        )));
    }
    if let Some(foreign) = entries.iter().find(|entry| &entry.order_id != order_id) {
        return Err(RepositoryError::Conflict(format!(
            "entry `{}` belongs to order `{}`, not `{}`",
            foreign.id.0, foreign.order_id.0, order_id.0
        )));
    }
    let mut departments = HashSet::new();
    if let Some(duplicate) =
        entries.iter().find(|entry| !departments.insert(entry.department_id.clone()))
    {
        return Err(RepositoryError::Conflict(format!(
            "department `{}` appears twice in the ledger of order `{}`",
            duplicate.department_id.0, order_id.0
        )));
    }
    Ok(())
}

#[async_trait::async_trait]
impl OrderRepository for InMemoryOrderLedger {
    async fn create(&self, order: Order) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if state.orders.contains_key(&order.id.0) {
            return Err(RepositoryError::Conflict(format!("order `{}` already exists", order.id.0)));
        }
        state.orders.insert(order.id.0.clone(), order);
        Ok(())
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.orders.get(&id.0).cloned())
    }

    async fn update_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        match state.orders.get_mut(&id.0) {
            Some(order) => {
                order.status = status;
                order.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait::async_trait]
impl ApprovalLedgerRepository for InMemoryOrderLedger {
    async fn insert_all(
        &self,
        order_id: &OrderId,
        mut entries: Vec<ApprovalEntry>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if !state.orders.contains_key(&order_id.0) {
            return Err(RepositoryError::Conflict(format!("order `{}` does not exist", order_id.0)));
        }
        validate_batch(&state, order_id, &entries)?;

        sort_ledger(&mut entries);
        state.entries.insert(order_id.0.clone(), entries);
        Ok(())
    }

    async fn create_with_ledger(
        &self,
        order: Order,
        mut entries: Vec<ApprovalEntry>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if state.orders.contains_key(&order.id.0) {
            return Err(RepositoryError::Conflict(format!("order `{}` already exists", order.id.0)));
        }
        validate_batch(&state, &order.id, &entries)?;

        sort_ledger(&mut entries);
        state.entries.insert(order.id.0.clone(), entries);
        state.orders.insert(order.id.0.clone(), order);
        Ok(())
    }

    async fn list_for_order(
        &self,
        order_id: &OrderId,
    ) -> Result<Vec<ApprovalEntry>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.entries.get(&order_id.0).cloned().unwrap_or_default())
    }

    async fn list_pending_for_department(
        &self,
        department_id: &DepartmentId,
    ) -> Result<Vec<ApprovalEntry>, RepositoryError> {
        let state = self.state.read().await;
        let mut pending: Vec<ApprovalEntry> = state
            .entries
            .values()
            .flatten()
            .filter(|entry| &entry.department_id == department_id && entry.is_pending())
            .cloned()
            .collect();
        pending.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.order_id.0.cmp(&right.order_id.0))
        });
        Ok(pending)
    }

    async fn commit_decision(
        &self,
        commit: DecisionCommit,
    ) -> Result<CommitOutcome, RepositoryError> {
        let mut state = self.state.write().await;
        let LedgerState { orders, entries } = &mut *state;

        let Some(ledger) = entries.get_mut(&commit.order_id.0) else {
            return Ok(CommitOutcome::EntryNotFound);
        };

        let outcome = apply_commit(ledger, &commit);
        if let CommitOutcome::Applied { order_status, .. } = &outcome {
            if let Some(order) = orders.get_mut(&commit.order_id.0) {
                order.status = *order_status;
                order.updated_at = Utc::now();
            }
        }
        Ok(outcome)
    }
}
