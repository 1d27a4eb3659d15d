pub mod approvals;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;

pub use approvals::{
    all_approved, apply_commit, blocking_departments, derive_order_status, evaluate_eligibility,
    plan_seed, CommitOutcome, DecisionCommit, Eligibility, EligibilityDenial, LedgerSummary,
    RejectionPolicy, SeedPlanError,
};
pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use domain::approval::{ApprovalDecision, ApprovalEntry, ApprovalId, ApprovalStatus};
pub use domain::department::{Department, DepartmentId};
pub use domain::order::{Order, OrderDraft, OrderId, OrderLine, OrderLineDraft, OrderStatus};
pub use domain::user::{CurrentUser, User, UserId, UserRole};
pub use errors::{DomainError, ErrorKind, InterfaceError, WorkflowError};
