use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::approval::{ApprovalDecision, ApprovalEntry, ApprovalId, ApprovalStatus};
use crate::domain::department::{Department, DepartmentId};
use crate::domain::order::{Order, OrderId, OrderStatus};
use crate::domain::user::{User, UserId};
use crate::errors::{ErrorKind, WorkflowError};

/// What happens to entries still pending when another entry of the same order is rejected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionPolicy {
    /// Move them to `skipped` in the same commit as the rejection.
    #[default]
    SkipRemaining,
    /// Leave them pending; the closed order keeps them unreachable.
    LeavePending,
}

impl RejectionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SkipRemaining => "skip_remaining",
            Self::LeavePending => "leave_pending",
        }
    }
}

impl std::str::FromStr for RejectionPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "skip_remaining" => Ok(Self::SkipRemaining),
            "leave_pending" => Ok(Self::LeavePending),
            other => Err(format!(
                "unsupported rejection policy `{other}` (expected skip_remaining|leave_pending)"
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EligibilityDenial {
    UnknownUser { user_id: String },
    NotDepartmentHead { user_id: String },
    NoDepartmentAssigned { user_id: String },
    NoApprovalForDepartment { department_id: String },
    AlreadyProcessed { department_name: String, status: ApprovalStatus },
    OrderClosed { status: OrderStatus },
    PreviousApprovalsIncomplete { waiting_on: Vec<String> },
}

impl EligibilityDenial {
    pub fn reason(&self) -> String {
        match self {
            Self::UnknownUser { user_id } => format!("user `{user_id}` is not registered"),
            Self::NotDepartmentHead { user_id } => {
                format!("user `{user_id}` is not a department head")
            }
            Self::NoDepartmentAssigned { user_id } => {
                format!("user `{user_id}` has no department assigned")
            }
            Self::NoApprovalForDepartment { department_id } => format!(
                "no pending approval for department `{department_id}` on this order"
            ),
            Self::AlreadyProcessed { department_name, status } => match status {
                ApprovalStatus::Approved => {
                    format!("already processed: {department_name} has already approved this order")
                }
                ApprovalStatus::Rejected => {
                    format!("already processed: {department_name} has already rejected this order")
                }
                ApprovalStatus::Skipped => format!(
                    "already processed: the {department_name} approval was skipped after a rejection"
                ),
                ApprovalStatus::Pending => {
                    format!("already processed: {department_name} approval is not actionable")
                }
            },
            Self::OrderClosed { status } => {
                format!("order is already {} and accepts no further decisions", status.as_str())
            }
            Self::PreviousApprovalsIncomplete { waiting_on } => format!(
                "previous approvals in the chain are incomplete: waiting on {}",
                waiting_on.join(", ")
            ),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownUser { .. } => ErrorKind::NotAuthenticated,
            Self::NotDepartmentHead { .. }
            | Self::NoDepartmentAssigned { .. }
            | Self::NoApprovalForDepartment { .. } => ErrorKind::NotAuthorized,
            Self::AlreadyProcessed { .. } | Self::OrderClosed { .. } => ErrorKind::AlreadyProcessed,
            Self::PreviousApprovalsIncomplete { .. } => ErrorKind::OrderingViolation,
        }
    }

    pub fn into_error(self) -> WorkflowError {
        let reason = self.reason();
        match self {
            Self::UnknownUser { .. } => WorkflowError::NotAuthenticated { reason },
            Self::NotDepartmentHead { .. }
            | Self::NoDepartmentAssigned { .. }
            | Self::NoApprovalForDepartment { .. } => WorkflowError::NotAuthorized { reason },
            Self::AlreadyProcessed { .. } | Self::OrderClosed { .. } => {
                WorkflowError::AlreadyProcessed { reason }
            }
            Self::PreviousApprovalsIncomplete { waiting_on } => {
                WorkflowError::OrderingViolation { reason, waiting_on }
            }
        }
    }
}

/// Answer to "may this user decide on this order right now?".
///
/// `entry` is the user's department entry whenever one was located, so callers can act
/// on it (or explain why they cannot) without querying the ledger again.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
    pub can_approve: bool,
    pub reason: Option<String>,
    pub denial: Option<EligibilityDenial>,
    pub entry: Option<ApprovalEntry>,
}

impl Eligibility {
    fn allow(entry: ApprovalEntry) -> Self {
        Self { can_approve: true, reason: None, denial: None, entry: Some(entry) }
    }

    fn deny(denial: EligibilityDenial, entry: Option<ApprovalEntry>) -> Self {
        Self { can_approve: false, reason: Some(denial.reason()), denial: Some(denial), entry }
    }

    /// Converts a denial into the matching workflow error; an eligible result yields its entry.
    pub fn into_result(self) -> Result<ApprovalEntry, WorkflowError> {
        match (self.denial, self.entry) {
            (Some(denial), _) => Err(denial.into_error()),
            (None, Some(entry)) => Ok(entry),
            (None, None) => Err(WorkflowError::Internal(
                "eligible result carried no approval entry".to_owned(),
            )),
        }
    }
}

/// Evaluates the eligibility preconditions in order, stopping at the first that fails.
pub fn evaluate_eligibility(
    user_id: &UserId,
    user: Option<&User>,
    order: &Order,
    ledger: &[ApprovalEntry],
) -> Eligibility {
    let Some(user) = user else {
        return Eligibility::deny(EligibilityDenial::UnknownUser { user_id: user_id.0.clone() }, None);
    };

    if !user.is_department_head {
        return Eligibility::deny(
            EligibilityDenial::NotDepartmentHead { user_id: user.id.0.clone() },
            None,
        );
    }

    let Some(department_id) = &user.department_id else {
        return Eligibility::deny(
            EligibilityDenial::NoDepartmentAssigned { user_id: user.id.0.clone() },
            None,
        );
    };

    let Some(entry) = ledger
        .iter()
        .find(|entry| entry.order_id == order.id && &entry.department_id == department_id)
    else {
        return Eligibility::deny(
            EligibilityDenial::NoApprovalForDepartment { department_id: department_id.0.clone() },
            None,
        );
    };

    if !entry.is_pending() {
        return Eligibility::deny(
            EligibilityDenial::AlreadyProcessed {
                department_name: entry.department_name.clone(),
                status: entry.status,
            },
            Some(entry.clone()),
        );
    }

    if !order.status.accepts_decisions() {
        return Eligibility::deny(
            EligibilityDenial::OrderClosed { status: order.status },
            Some(entry.clone()),
        );
    }

    let waiting_on = blocking_departments(ledger, entry.approval_order);
    if !waiting_on.is_empty() {
        return Eligibility::deny(
            EligibilityDenial::PreviousApprovalsIncomplete { waiting_on },
            Some(entry.clone()),
        );
    }

    Eligibility::allow(entry.clone())
}

/// Names of departments ranked strictly below `rank` that have not approved yet, in rank order.
pub fn blocking_departments(ledger: &[ApprovalEntry], rank: u32) -> Vec<String> {
    let mut blocking: Vec<&ApprovalEntry> = ledger
        .iter()
        .filter(|entry| entry.approval_order < rank && entry.status != ApprovalStatus::Approved)
        .collect();
    blocking.sort_by(|left, right| {
        left.approval_order
            .cmp(&right.approval_order)
            .then_with(|| left.department_name.cmp(&right.department_name))
    });

    let mut seen = HashSet::new();
    blocking
        .into_iter()
        .filter(|entry| seen.insert(entry.department_name.clone()))
        .map(|entry| entry.department_name.clone())
        .collect()
}

/// Aggregate order status as a pure function of its ledger.
pub fn derive_order_status(ledger: &[ApprovalEntry]) -> OrderStatus {
    if ledger.iter().any(|entry| entry.status == ApprovalStatus::Rejected) {
        return OrderStatus::Rejected;
    }

    if !ledger.is_empty() && ledger.iter().all(|entry| entry.status == ApprovalStatus::Approved) {
        return OrderStatus::Approved;
    }

    if ledger.iter().any(|entry| entry.status == ApprovalStatus::Approved) {
        return OrderStatus::InProgress;
    }

    OrderStatus::Pending
}

pub fn all_approved(ledger: &[ApprovalEntry]) -> bool {
    derive_order_status(ledger) == OrderStatus::Approved
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SeedPlanError {
    EmptyRegistry,
    InvalidRank { department_code: String },
    ApplicantDepartmentNotFound { department_id: DepartmentId },
}

impl SeedPlanError {
    pub fn reason(&self) -> String {
        match self {
            Self::EmptyRegistry => "no approval-requiring departments are configured".to_owned(),
            Self::InvalidRank { department_code } => {
                format!("department `{department_code}` has an approval order of zero")
            }
            Self::ApplicantDepartmentNotFound { department_id } => format!(
                "applicant department `{}` is not among approval-requiring departments",
                department_id.0
            ),
        }
    }
}

impl From<SeedPlanError> for WorkflowError {
    fn from(value: SeedPlanError) -> Self {
        WorkflowError::seeding(value.reason())
    }
}

/// Builds the full pending chain for a new order from the department registry.
pub fn plan_seed(
    order_id: &OrderId,
    applicant_department_id: &DepartmentId,
    departments: &[Department],
    now: DateTime<Utc>,
) -> Result<Vec<ApprovalEntry>, SeedPlanError> {
    let mut approving: Vec<&Department> =
        departments.iter().filter(|department| department.requires_approval).collect();
    if approving.is_empty() {
        return Err(SeedPlanError::EmptyRegistry);
    }

    if let Some(department) = approving.iter().find(|department| department.approval_order == 0) {
        return Err(SeedPlanError::InvalidRank { department_code: department.code.clone() });
    }

    if !approving.iter().any(|department| &department.id == applicant_department_id) {
        return Err(SeedPlanError::ApplicantDepartmentNotFound {
            department_id: applicant_department_id.clone(),
        });
    }

    approving.sort_by(|left, right| {
        left.approval_order.cmp(&right.approval_order).then_with(|| left.code.cmp(&right.code))
    });

    Ok(approving
        .into_iter()
        .map(|department| ApprovalEntry {
            id: ApprovalId(Uuid::new_v4().to_string()),
            order_id: order_id.clone(),
            department_id: department.id.clone(),
            department_name: department.name.clone(),
            approver_id: None,
            status: ApprovalStatus::Pending,
            comments: None,
            approved_at: None,
            approval_order: department.approval_order,
            created_at: now,
        })
        .collect())
}

/// A decision ready to be committed against the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecisionCommit {
    pub order_id: OrderId,
    pub entry_id: ApprovalId,
    pub approver_id: UserId,
    pub decision: ApprovalDecision,
    pub comments: Option<String>,
    pub decided_at: DateTime<Utc>,
    pub rejection_policy: RejectionPolicy,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied { order_status: OrderStatus, ledger: Vec<ApprovalEntry> },
    /// The entry was no longer pending when the commit ran.
    AlreadyProcessed { department_name: String, status: ApprovalStatus },
    EntryNotFound,
}

/// Applies a decision to an in-memory ledger snapshot with compare-and-set semantics.
///
/// Returns the derived order status on success; the ledger is untouched on conflict.
pub fn apply_commit(ledger: &mut [ApprovalEntry], commit: &DecisionCommit) -> CommitOutcome {
    let Some(target) = ledger
        .iter_mut()
        .find(|entry| entry.id == commit.entry_id && entry.order_id == commit.order_id)
    else {
        return CommitOutcome::EntryNotFound;
    };

    if !target.is_pending() {
        return CommitOutcome::AlreadyProcessed {
            department_name: target.department_name.clone(),
            status: target.status,
        };
    }

    target.status = commit.decision.resulting_status();
    target.approver_id = Some(commit.approver_id.clone());
    target.approved_at = Some(commit.decided_at);
    target.comments = commit.comments.clone();

    if commit.decision == ApprovalDecision::Reject
        && commit.rejection_policy == RejectionPolicy::SkipRemaining
    {
        for entry in ledger.iter_mut().filter(|entry| entry.is_pending()) {
            entry.status = ApprovalStatus::Skipped;
        }
    }

    CommitOutcome::Applied { order_status: derive_order_status(ledger), ledger: ledger.to_vec() }
}

/// Progress counters for one order's chain.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub total: usize,
    pub approved: usize,
    pub pending: usize,
    pub rejected: usize,
    pub skipped: usize,
    /// Lowest rank that still has pending entries and is not blocked by an earlier rank.
    pub actionable_rank: Option<u32>,
}

impl LedgerSummary {
    pub fn from_ledger(ledger: &[ApprovalEntry]) -> Self {
        let count = |status: ApprovalStatus| ledger.iter().filter(|e| e.status == status).count();
        let actionable_rank = if derive_order_status(ledger).accepts_decisions() {
            ledger
                .iter()
                .filter(|entry| entry.is_pending())
                .map(|entry| entry.approval_order)
                .min()
                .filter(|rank| blocking_departments(ledger, *rank).is_empty())
        } else {
            None
        };

        Self {
            total: ledger.len(),
            approved: count(ApprovalStatus::Approved),
            pending: count(ApprovalStatus::Pending),
            rejected: count(ApprovalStatus::Rejected),
            skipped: count(ApprovalStatus::Skipped),
            actionable_rank,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::domain::approval::{ApprovalDecision, ApprovalEntry, ApprovalId, ApprovalStatus};
    use crate::domain::department::{Department, DepartmentId};
    use crate::domain::order::{Order, OrderId, OrderStatus};
    use crate::domain::user::{User, UserId, UserRole};
    use crate::errors::ErrorKind;

    use super::{
        apply_commit, derive_order_status, evaluate_eligibility, plan_seed, CommitOutcome,
        DecisionCommit, EligibilityDenial, LedgerSummary, RejectionPolicy, SeedPlanError,
    };

    fn department(id: &str, name: &str, rank: u32, requires_approval: bool) -> Department {
        Department {
            id: DepartmentId(id.to_string()),
            code: id.to_ascii_uppercase(),
            name: name.to_string(),
            approval_order: rank,
            requires_approval,
        }
    }

    fn registry() -> Vec<Department> {
        vec![
            department("gerencia-general", "Gerencia General", 3, true),
            department("logistica", "Logística", 1, true),
            department("administracion", "Gerencia de Administración", 2, true),
            department("marketing", "Marketing", 1, false),
        ]
    }

    fn head(id: &str, department: &str) -> User {
        User {
            id: UserId(id.to_string()),
            name: id.to_string(),
            email: format!("{id}@constructora.pe"),
            role: UserRole::Staff,
            department_id: Some(DepartmentId(department.to_string())),
            is_department_head: true,
        }
    }

    fn order(status: OrderStatus) -> Order {
        Order {
            id: OrderId("PO-100".to_string()),
            applicant_id: UserId("u-applicant".to_string()),
            store_id: "store-lima".to_string(),
            items: Vec::new(),
            subtotal: Decimal::ZERO,
            tax: Decimal::ZERO,
            total: Decimal::ZERO,
            currency: "PEN".to_string(),
            status,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn seeded() -> Vec<ApprovalEntry> {
        plan_seed(
            &OrderId("PO-100".to_string()),
            &DepartmentId("logistica".to_string()),
            &registry(),
            Utc::now(),
        )
        .expect("seed plan")
    }

    fn set_status(ledger: &mut [ApprovalEntry], department: &str, status: ApprovalStatus) {
        for entry in ledger.iter_mut().filter(|entry| entry.department_id.0 == department) {
            entry.status = status;
        }
    }

    fn commit(entry: &ApprovalEntry, decision: ApprovalDecision) -> DecisionCommit {
        DecisionCommit {
            order_id: entry.order_id.clone(),
            entry_id: entry.id.clone(),
            approver_id: UserId("u-head".to_string()),
            decision,
            comments: Some("conforme".to_string()),
            decided_at: Utc::now(),
            rejection_policy: RejectionPolicy::SkipRemaining,
        }
    }

    #[test]
    fn seed_plan_orders_by_rank_and_skips_non_gating_departments() {
        let ledger = seeded();

        let ranks: Vec<(String, u32)> =
            ledger.iter().map(|e| (e.department_id.0.clone(), e.approval_order)).collect();
        assert_eq!(
            ranks,
            vec![
                ("logistica".to_string(), 1),
                ("administracion".to_string(), 2),
                ("gerencia-general".to_string(), 3),
            ]
        );
        assert!(ledger.iter().all(|entry| entry.status == ApprovalStatus::Pending));
        assert!(ledger.iter().all(|entry| entry.approver_id.is_none()));
    }

    #[test]
    fn seed_plan_fails_when_applicant_department_does_not_gate() {
        let error = plan_seed(
            &OrderId("PO-1".to_string()),
            &DepartmentId("marketing".to_string()),
            &registry(),
            Utc::now(),
        )
        .expect_err("marketing does not require approval");

        assert_eq!(
            error,
            SeedPlanError::ApplicantDepartmentNotFound {
                department_id: DepartmentId("marketing".to_string())
            }
        );
    }

    #[test]
    fn seed_plan_fails_on_empty_registry_and_zero_rank() {
        let empty = plan_seed(
            &OrderId("PO-1".to_string()),
            &DepartmentId("logistica".to_string()),
            &[department("marketing", "Marketing", 1, false)],
            Utc::now(),
        );
        assert_eq!(empty, Err(SeedPlanError::EmptyRegistry));

        let zero_rank = plan_seed(
            &OrderId("PO-1".to_string()),
            &DepartmentId("logistica".to_string()),
            &[department("logistica", "Logística", 0, true)],
            Utc::now(),
        );
        assert!(matches!(zero_rank, Err(SeedPlanError::InvalidRank { .. })));
    }

    #[test]
    fn eligibility_short_circuits_in_documented_order() {
        let ledger = seeded();
        let order = order(OrderStatus::Pending);

        let missing = evaluate_eligibility(&UserId("ghost".to_string()), None, &order, &ledger);
        assert!(matches!(missing.denial, Some(EligibilityDenial::UnknownUser { .. })));

        let mut staff = head("u-staff", "logistica");
        staff.is_department_head = false;
        let result = evaluate_eligibility(&staff.id, Some(&staff), &order, &ledger);
        assert!(matches!(result.denial, Some(EligibilityDenial::NotDepartmentHead { .. })));

        let mut floating = head("u-floating", "logistica");
        floating.department_id = None;
        let result = evaluate_eligibility(&floating.id, Some(&floating), &order, &ledger);
        assert!(matches!(result.denial, Some(EligibilityDenial::NoDepartmentAssigned { .. })));

        let marketing = head("u-marketing", "marketing");
        let result = evaluate_eligibility(&marketing.id, Some(&marketing), &order, &ledger);
        assert!(matches!(result.denial, Some(EligibilityDenial::NoApprovalForDepartment { .. })));
        assert_eq!(result.denial.map(|denial| denial.kind()), Some(ErrorKind::NotAuthorized));
    }

    #[test]
    fn higher_rank_waits_for_lower_ranks_and_names_them() {
        let ledger = seeded();
        let manager = head("u-gg", "gerencia-general");

        let result =
            evaluate_eligibility(&manager.id, Some(&manager), &order(OrderStatus::Pending), &ledger);

        assert!(!result.can_approve);
        assert_eq!(
            result.denial,
            Some(EligibilityDenial::PreviousApprovalsIncomplete {
                waiting_on: vec!["Logística".to_string(), "Gerencia de Administración".to_string()]
            })
        );
        assert!(result.reason.as_deref().unwrap_or_default().contains("Gerencia de Administración"));
    }

    #[test]
    fn rejected_lower_rank_blocks_as_ordering_violation() {
        let mut ledger = seeded();
        set_status(&mut ledger, "logistica", ApprovalStatus::Rejected);
        let admin_head = head("u-adm", "administracion");

        let result = evaluate_eligibility(
            &admin_head.id,
            Some(&admin_head),
            &order(OrderStatus::InProgress),
            &ledger,
        );
        assert!(matches!(
            result.denial,
            Some(EligibilityDenial::PreviousApprovalsIncomplete { .. })
        ));
    }

    #[test]
    fn same_rank_siblings_do_not_block_each_other() {
        let mut departments = registry();
        departments.push(department("almacen", "Almacén", 1, true));
        let mut ledger = plan_seed(
            &OrderId("PO-100".to_string()),
            &DepartmentId("logistica".to_string()),
            &departments,
            Utc::now(),
        )
        .expect("seed plan");
        let order = order(OrderStatus::Pending);

        let logistics = head("u-log", "logistica");
        let warehouse = head("u-alm", "almacen");
        assert!(evaluate_eligibility(&logistics.id, Some(&logistics), &order, &ledger).can_approve);
        assert!(evaluate_eligibility(&warehouse.id, Some(&warehouse), &order, &ledger).can_approve);

        set_status(&mut ledger, "logistica", ApprovalStatus::Approved);
        let after = evaluate_eligibility(&warehouse.id, Some(&warehouse), &order, &ledger);
        assert!(after.can_approve, "sibling approval must not change eligibility");
        assert_eq!(after.entry.map(|entry| entry.status), Some(ApprovalStatus::Pending));
    }

    #[test]
    fn processed_entry_and_closed_order_report_already_processed() {
        let mut ledger = seeded();
        set_status(&mut ledger, "logistica", ApprovalStatus::Approved);
        let logistics = head("u-log", "logistica");

        let result = evaluate_eligibility(
            &logistics.id,
            Some(&logistics),
            &order(OrderStatus::InProgress),
            &ledger,
        );
        assert_eq!(result.denial.as_ref().map(|d| d.kind()), Some(ErrorKind::AlreadyProcessed));
        assert!(result.reason.as_deref().unwrap_or_default().contains("approved"));

        let fresh = seeded();
        let closed = evaluate_eligibility(
            &logistics.id,
            Some(&logistics),
            &order(OrderStatus::Rejected),
            &fresh,
        );
        assert_eq!(closed.denial, Some(EligibilityDenial::OrderClosed { status: OrderStatus::Rejected }));
    }

    #[test]
    fn eligibility_is_idempotent_without_intervening_decisions() {
        let ledger = seeded();
        let order = order(OrderStatus::Pending);
        let admin_head = head("u-adm", "administracion");

        let first = evaluate_eligibility(&admin_head.id, Some(&admin_head), &order, &ledger);
        let second = evaluate_eligibility(&admin_head.id, Some(&admin_head), &order, &ledger);
        assert_eq!(first, second);
    }

    #[test]
    fn derivation_follows_transition_table() {
        let mut ledger = seeded();
        assert_eq!(derive_order_status(&ledger), OrderStatus::Pending);

        set_status(&mut ledger, "logistica", ApprovalStatus::Approved);
        assert_eq!(derive_order_status(&ledger), OrderStatus::InProgress);

        set_status(&mut ledger, "administracion", ApprovalStatus::Approved);
        set_status(&mut ledger, "gerencia-general", ApprovalStatus::Approved);
        assert_eq!(derive_order_status(&ledger), OrderStatus::Approved);

        set_status(&mut ledger, "gerencia-general", ApprovalStatus::Rejected);
        assert_eq!(derive_order_status(&ledger), OrderStatus::Rejected);

        assert_eq!(derive_order_status(&[]), OrderStatus::Pending);
    }

    #[test]
    fn commit_is_compare_and_set() {
        let mut ledger = seeded();
        let first = ledger[0].clone();

        let applied = apply_commit(&mut ledger, &commit(&first, ApprovalDecision::Approve));
        assert!(matches!(
            applied,
            CommitOutcome::Applied { order_status: OrderStatus::InProgress, .. }
        ));
        assert_eq!(ledger[0].approver_id, Some(UserId("u-head".to_string())));
        assert!(ledger[0].approved_at.is_some());

        let snapshot = ledger.clone();
        let second = apply_commit(&mut ledger, &commit(&first, ApprovalDecision::Reject));
        assert_eq!(
            second,
            CommitOutcome::AlreadyProcessed {
                department_name: "Logística".to_string(),
                status: ApprovalStatus::Approved,
            }
        );
        assert_eq!(ledger, snapshot, "conflicting commit must not touch the ledger");
    }

    #[test]
    fn rejection_policy_controls_remaining_entries() {
        let mut skipped = seeded();
        let first = skipped[0].clone();
        let outcome = apply_commit(&mut skipped, &commit(&first, ApprovalDecision::Reject));
        assert!(matches!(outcome, CommitOutcome::Applied { order_status: OrderStatus::Rejected, .. }));
        assert!(skipped[1..].iter().all(|entry| entry.status == ApprovalStatus::Skipped));

        let mut left = seeded();
        let first = left[0].clone();
        let mut leave = commit(&first, ApprovalDecision::Reject);
        leave.rejection_policy = RejectionPolicy::LeavePending;
        apply_commit(&mut left, &leave);
        assert!(left[1..].iter().all(|entry| entry.status == ApprovalStatus::Pending));
        assert_eq!(derive_order_status(&left), OrderStatus::Rejected);
    }

    #[test]
    fn commit_for_unknown_entry_reports_not_found() {
        let mut ledger = seeded();
        let mut missing = commit(&ledger[0].clone(), ApprovalDecision::Approve);
        missing.entry_id = ApprovalId("nope".to_string());
        assert_eq!(apply_commit(&mut ledger, &missing), CommitOutcome::EntryNotFound);
    }

    #[test]
    fn summary_tracks_actionable_rank() {
        let mut ledger = seeded();
        assert_eq!(LedgerSummary::from_ledger(&ledger).actionable_rank, Some(1));

        set_status(&mut ledger, "logistica", ApprovalStatus::Approved);
        let summary = LedgerSummary::from_ledger(&ledger);
        assert_eq!(summary.actionable_rank, Some(2));
        assert_eq!((summary.approved, summary.pending), (1, 2));

        set_status(&mut ledger, "administracion", ApprovalStatus::Rejected);
        assert_eq!(LedgerSummary::from_ledger(&ledger).actionable_rank, None);
    }

    #[test]
    fn rejection_policy_parses_from_config_strings() {
        assert_eq!("leave_pending".parse::<RejectionPolicy>(), Ok(RejectionPolicy::LeavePending));
        assert!("cancel_all".parse::<RejectionPolicy>().is_err());
        assert_eq!(RejectionPolicy::default(), RejectionPolicy::SkipRemaining);
    }
}
