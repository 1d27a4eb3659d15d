use async_trait::async_trait;
use thiserror::Error;

use procure_core::approvals::{CommitOutcome, DecisionCommit};
use procure_core::domain::approval::ApprovalEntry;
use procure_core::domain::department::{Department, DepartmentId};
use procure_core::domain::order::{Order, OrderId, OrderStatus};
use procure_core::domain::user::{User, UserId};

pub mod department;
pub mod ledger;
pub mod memory;
pub mod order;
pub mod user;

pub use department::SqlDepartmentRepository;
pub use ledger::SqlApprovalLedgerRepository;
pub use memory::{InMemoryDepartmentRepository, InMemoryOrderLedger, InMemoryUserRepository};
pub use order::SqlOrderRepository;
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Registry of departments and their rank in the approval chain.
#[async_trait]
pub trait DepartmentRepository: Send + Sync {
    async fn find_by_id(&self, id: &DepartmentId) -> Result<Option<Department>, RepositoryError>;

    /// Departments with `requires_approval`, ordered by rank then code.
    async fn list_approval_departments(&self) -> Result<Vec<Department>, RepositoryError>;

    async fn save(&self, department: Department) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    async fn save(&self, user: User) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Inserts a new order with its lines. Fails with `Conflict` when the id is taken.
    async fn create(&self, order: Order) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Returns `false` when no order with `id` exists.
    async fn update_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
    ) -> Result<bool, RepositoryError>;
}

/// Per-order approval chain storage.
#[async_trait]
pub trait ApprovalLedgerRepository: Send + Sync {
    /// Inserts a whole chain atomically. Fails with `Conflict` when the order already has one.
    async fn insert_all(
        &self,
        order_id: &OrderId,
        entries: Vec<ApprovalEntry>,
    ) -> Result<(), RepositoryError>;

    /// Stores a new order and its whole chain in one atomic unit. On any failure
    /// neither the order nor its entries are visible.
    async fn create_with_ledger(
        &self,
        order: Order,
        entries: Vec<ApprovalEntry>,
    ) -> Result<(), RepositoryError>;

    /// Entries ordered by `approval_order`, then department name.
    async fn list_for_order(&self, order_id: &OrderId)
        -> Result<Vec<ApprovalEntry>, RepositoryError>;

    async fn list_pending_for_department(
        &self,
        department_id: &DepartmentId,
    ) -> Result<Vec<ApprovalEntry>, RepositoryError>;

    /// Applies a decision with compare-and-set on the entry, the rejection policy on its
    /// siblings, and the derived order status, all in one atomic unit.
    async fn commit_decision(
        &self,
        commit: DecisionCommit,
    ) -> Result<CommitOutcome, RepositoryError>;
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_timestamp(
    column: &str,
    value: String,
) -> Result<chrono::DateTime<chrono::Utc>, RepositoryError> {
    chrono::DateTime::parse_from_rfc3339(&value)
        .map(|timestamp| timestamp.with_timezone(&chrono::Utc))
        .map_err(|error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        })
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<chrono::DateTime<chrono::Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn decode_err(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}
