use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use procure_core::approvals::{
    all_approved, evaluate_eligibility, plan_seed, CommitOutcome, DecisionCommit, Eligibility,
    EligibilityDenial, LedgerSummary, RejectionPolicy,
};
use procure_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use procure_core::config::WorkflowConfig;
use procure_core::domain::approval::{ApprovalDecision, ApprovalEntry};
use procure_core::domain::department::DepartmentId;
use procure_core::domain::order::{Order, OrderDraft, OrderId, OrderStatus};
use procure_core::domain::user::{CurrentUser, User, UserId};
use procure_core::errors::WorkflowError;
use procure_db::repositories::{
    ApprovalLedgerRepository, DepartmentRepository, InMemoryDepartmentRepository,
    InMemoryOrderLedger, InMemoryUserRepository, OrderRepository, RepositoryError,
    SqlApprovalLedgerRepository, SqlDepartmentRepository, SqlOrderRepository, SqlUserRepository,
    UserRepository,
};
use procure_db::DbPool;

use crate::locks::OrderLocks;

/// Correlates the log lines and audit events of one inbound request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub correlation_id: String,
}

impl RequestContext {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self { correlation_id: correlation_id.into() }
    }

    pub fn generated() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::generated()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    pub default_currency: String,
    pub tax_rate_pct: Decimal,
    pub rejection_policy: RejectionPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_currency: "PEN".to_owned(),
            tax_rate_pct: Decimal::new(18, 0),
            rejection_policy: RejectionPolicy::SkipRemaining,
        }
    }
}

impl From<&WorkflowConfig> for EngineSettings {
    fn from(config: &WorkflowConfig) -> Self {
        Self {
            default_currency: config.default_currency.clone(),
            tax_rate_pct: config.tax_rate_pct,
            rejection_policy: config.rejection_policy,
        }
    }
}

/// Storage ports the engine depends on.
#[derive(Clone)]
pub struct EngineRepositories {
    pub departments: Arc<dyn DepartmentRepository>,
    pub users: Arc<dyn UserRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub ledger: Arc<dyn ApprovalLedgerRepository>,
}

impl EngineRepositories {
    pub fn sql(pool: DbPool) -> Self {
        Self {
            departments: Arc::new(SqlDepartmentRepository::new(pool.clone())),
            users: Arc::new(SqlUserRepository::new(pool.clone())),
            orders: Arc::new(SqlOrderRepository::new(pool.clone())),
            ledger: Arc::new(SqlApprovalLedgerRepository::new(pool)),
        }
    }

    /// Orders and ledger share one store so decision commits stay atomic.
    pub fn in_memory() -> Self {
        let order_ledger = Arc::new(InMemoryOrderLedger::default());
        Self {
            departments: Arc::new(InMemoryDepartmentRepository::default()),
            users: Arc::new(InMemoryUserRepository::default()),
            orders: order_ledger.clone(),
            ledger: order_ledger,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DecisionOutcome {
    pub order_id: OrderId,
    pub entry: ApprovalEntry,
    pub order_status: OrderStatus,
    pub all_approved: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SubmittedOrder {
    pub order: Order,
    pub approvals: Vec<ApprovalEntry>,
}

/// A pending entry the user may decide on right now.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActionableApproval {
    pub order: Order,
    pub entry: ApprovalEntry,
    pub summary: LedgerSummary,
}

pub struct ApprovalEngine {
    repos: EngineRepositories,
    audit: Arc<dyn AuditSink>,
    locks: OrderLocks,
    settings: EngineSettings,
}

impl ApprovalEngine {
    pub fn new(
        repos: EngineRepositories,
        audit: Arc<dyn AuditSink>,
        settings: EngineSettings,
    ) -> Self {
        Self { repos, audit, locks: OrderLocks::default(), settings }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn repositories(&self) -> &EngineRepositories {
        &self.repos
    }

    /// Creates the full pending chain for an existing order.
    pub async fn seed_approvals(
        &self,
        ctx: &RequestContext,
        order_id: &OrderId,
        applicant_department_id: &DepartmentId,
    ) -> Result<Vec<ApprovalEntry>, WorkflowError> {
        let _guard = self.locks.acquire(order_id).await;
        self.require_order(ctx, order_id).await?;

        let plan = self.plan_chain(ctx, order_id, applicant_department_id).await?;
        self.persist_chain(ctx, order_id, plan).await
    }

    pub async fn check_eligibility(
        &self,
        ctx: &RequestContext,
        user_id: &UserId,
        order_id: &OrderId,
    ) -> Result<Eligibility, WorkflowError> {
        let order = self.require_order(ctx, order_id).await?;
        let user = self.find_user(ctx, user_id).await?;
        let ledger = self.load_ledger(ctx, order_id).await?;

        Ok(evaluate_eligibility(user_id, user.as_ref(), &order, &ledger))
    }

    /// Records an approve/reject decision and recomputes the order status.
    pub async fn apply_decision(
        &self,
        ctx: &RequestContext,
        user_id: &UserId,
        order_id: &OrderId,
        decision: &str,
        comments: Option<String>,
    ) -> Result<DecisionOutcome, WorkflowError> {
        let decision: ApprovalDecision = decision.parse()?;
        let _guard = self.locks.acquire(order_id).await;

        let eligibility = self.check_eligibility(ctx, user_id, order_id).await?;
        if let Some(denial) = &eligibility.denial {
            self.record_denial(ctx, user_id, order_id, decision, denial);
        }
        let entry = eligibility.into_result()?;

        let commit = DecisionCommit {
            order_id: order_id.clone(),
            entry_id: entry.id.clone(),
            approver_id: user_id.clone(),
            decision,
            comments: comments.map(|text| text.trim().to_owned()).filter(|text| !text.is_empty()),
            decided_at: Utc::now(),
            rejection_policy: self.settings.rejection_policy,
        };

        let outcome = self
            .repos
            .ledger
            .commit_decision(commit)
            .await
            .map_err(|error| self.storage_failure(ctx, "commit_decision", error))?;

        match outcome {
            CommitOutcome::Applied { order_status, ledger } => {
                let entry = ledger
                    .iter()
                    .find(|candidate| candidate.id == entry.id)
                    .cloned()
                    .unwrap_or(entry);
                let all_approved = all_approved(&ledger);

                info!(
                    event_name = "workflow.decision.applied",
                    correlation_id = %ctx.correlation_id,
                    order_id = %order_id.0,
                    user_id = %user_id.0,
                    department = %entry.department_name,
                    decision = decision.as_str(),
                    order_status = order_status.as_str(),
                    "approval decision applied"
                );
                self.audit.emit(
                    AuditEvent::new(
                        Some(order_id.clone()),
                        &ctx.correlation_id,
                        "approval.decision.applied",
                        AuditCategory::Decision,
                        &user_id.0,
                        AuditOutcome::Success,
                    )
                    .with_metadata("decision", decision.as_str())
                    .with_metadata("department", entry.department_name.clone())
                    .with_metadata("order_status", order_status.as_str()),
                );

                Ok(DecisionOutcome {
                    order_id: order_id.clone(),
                    entry,
                    order_status,
                    all_approved,
                })
            }
            CommitOutcome::AlreadyProcessed { department_name, status } => {
                let denial = EligibilityDenial::AlreadyProcessed { department_name, status };
                self.record_denial(ctx, user_id, order_id, decision, &denial);
                Err(denial.into_error())
            }
            CommitOutcome::EntryNotFound => Err(WorkflowError::not_found("approval entry", entry.id.0)),
        }
    }

    pub async fn list_approvals(
        &self,
        ctx: &RequestContext,
        order_id: &OrderId,
    ) -> Result<Vec<ApprovalEntry>, WorkflowError> {
        self.require_order(ctx, order_id).await?;
        self.load_ledger(ctx, order_id).await
    }

    pub async fn get_order(
        &self,
        ctx: &RequestContext,
        order_id: &OrderId,
    ) -> Result<Order, WorkflowError> {
        self.require_order(ctx, order_id).await
    }

    /// Validates a draft, stores it as a pending order and seeds its approval chain.
    ///
    /// The chain is planned before anything is written, and the order is stored together
    /// with its chain, so a failed submission never leaves an order without a ledger.
    pub async fn submit_order(
        &self,
        ctx: &RequestContext,
        applicant_id: &UserId,
        draft: OrderDraft,
    ) -> Result<SubmittedOrder, WorkflowError> {
        let applicant = self.require_user(ctx, applicant_id).await?;
        let Some(department_id) = applicant.department_id.clone() else {
            return Err(WorkflowError::Validation {
                reason: format!("applicant `{}` has no department assigned", applicant_id.0),
            });
        };

        let order_id = OrderId(format!("PO-{}", Uuid::new_v4().simple()));
        let order = draft.into_order(
            order_id.clone(),
            applicant_id.clone(),
            &self.settings.default_currency,
            self.settings.tax_rate_pct,
        )?;

        let _guard = self.locks.acquire(&order_id).await;
        let plan = self.plan_chain(ctx, &order_id, &department_id).await?;

        if let Err(error) = self.repos.ledger.create_with_ledger(order.clone(), plan.clone()).await
        {
            return Err(self.seeding_failure(ctx, &order_id, seeding_reason(error)));
        }

        info!(
            event_name = "workflow.order.submitted",
            correlation_id = %ctx.correlation_id,
            order_id = %order_id.0,
            applicant_id = %applicant_id.0,
            total = %order.total,
            currency = %order.currency,
            "purchase order submitted"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(order_id.clone()),
                &ctx.correlation_id,
                "order.submitted",
                AuditCategory::Submission,
                &applicant_id.0,
                AuditOutcome::Success,
            )
            .with_metadata("total", order.total.to_string())
            .with_metadata("currency", order.currency.clone()),
        );
        self.record_seeded(ctx, &order_id, plan.len());

        Ok(SubmittedOrder { order, approvals: plan })
    }

    /// Moves an approved order to `completed`. Administrators only.
    pub async fn complete_order(
        &self,
        ctx: &RequestContext,
        user_id: &UserId,
        order_id: &OrderId,
    ) -> Result<Order, WorkflowError> {
        let user = self.require_user(ctx, user_id).await?;
        if !CurrentUser::from(&user).is_admin() {
            return Err(WorkflowError::NotAuthorized {
                reason: format!("user `{}` is not allowed to complete orders", user_id.0),
            });
        }

        let _guard = self.locks.acquire(order_id).await;
        let mut order = self.require_order(ctx, order_id).await?;
        order.transition_to(OrderStatus::Completed)?;

        let updated = self
            .repos
            .orders
            .update_status(order_id, OrderStatus::Completed)
            .await
            .map_err(|error| self.storage_failure(ctx, "update_order_status", error))?;
        if !updated {
            return Err(WorkflowError::not_found("order", order_id.0.clone()));
        }

        info!(
            event_name = "workflow.order.completed",
            correlation_id = %ctx.correlation_id,
            order_id = %order_id.0,
            user_id = %user_id.0,
            "purchase order completed"
        );
        self.audit.emit(AuditEvent::new(
            Some(order_id.clone()),
            &ctx.correlation_id,
            "order.completed",
            AuditCategory::Lifecycle,
            &user_id.0,
            AuditOutcome::Success,
        ));

        Ok(order)
    }

    /// Pending entries of the user's department that the user may decide on now.
    pub async fn list_actionable(
        &self,
        ctx: &RequestContext,
        user_id: &UserId,
    ) -> Result<Vec<ActionableApproval>, WorkflowError> {
        let user = self.require_user(ctx, user_id).await?;
        let (true, Some(department_id)) = (user.is_department_head, user.department_id.as_ref())
        else {
            return Ok(Vec::new());
        };

        let pending = self
            .repos
            .ledger
            .list_pending_for_department(department_id)
            .await
            .map_err(|error| self.storage_failure(ctx, "list_pending_for_department", error))?;

        let mut actionable = Vec::new();
        for entry in pending {
            let Some(order) = self.find_order(ctx, &entry.order_id).await? else {
                continue;
            };
            let ledger = self.load_ledger(ctx, &order.id).await?;
            let eligibility = evaluate_eligibility(user_id, Some(&user), &order, &ledger);
            if let (true, Some(entry)) = (eligibility.can_approve, eligibility.entry) {
                actionable.push(ActionableApproval {
                    summary: LedgerSummary::from_ledger(&ledger),
                    order,
                    entry,
                });
            }
        }

        Ok(actionable)
    }

    async fn plan_chain(
        &self,
        ctx: &RequestContext,
        order_id: &OrderId,
        applicant_department_id: &DepartmentId,
    ) -> Result<Vec<ApprovalEntry>, WorkflowError> {
        let departments = match self.repos.departments.list_approval_departments().await {
            Ok(departments) => departments,
            Err(error) => {
                return Err(self.seeding_failure(
                    ctx,
                    order_id,
                    format!("department registry could not be read: {error}"),
                ))
            }
        };

        plan_seed(order_id, applicant_department_id, &departments, Utc::now())
            .map_err(|error| self.seeding_failure(ctx, order_id, error.reason()))
    }

    async fn persist_chain(
        &self,
        ctx: &RequestContext,
        order_id: &OrderId,
        plan: Vec<ApprovalEntry>,
    ) -> Result<Vec<ApprovalEntry>, WorkflowError> {
        if let Err(error) = self.repos.ledger.insert_all(order_id, plan.clone()).await {
            return Err(self.seeding_failure(ctx, order_id, seeding_reason(error)));
        }
        self.record_seeded(ctx, order_id, plan.len());
        Ok(plan)
    }

    fn record_seeded(&self, ctx: &RequestContext, order_id: &OrderId, entries: usize) {
        info!(
            event_name = "workflow.seed.completed",
            correlation_id = %ctx.correlation_id,
            order_id = %order_id.0,
            entries,
            "approval ledger seeded"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(order_id.clone()),
                &ctx.correlation_id,
                "approval.ledger.seeded",
                AuditCategory::Seeding,
                "system",
                AuditOutcome::Success,
            )
            .with_metadata("entries", entries.to_string()),
        );
    }

    async fn require_order(
        &self,
        ctx: &RequestContext,
        order_id: &OrderId,
    ) -> Result<Order, WorkflowError> {
        self.find_order(ctx, order_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("order", order_id.0.clone()))
    }

    async fn find_order(
        &self,
        ctx: &RequestContext,
        order_id: &OrderId,
    ) -> Result<Option<Order>, WorkflowError> {
        self.repos
            .orders
            .find_by_id(order_id)
            .await
            .map_err(|error| self.storage_failure(ctx, "find_order", error))
    }

    async fn find_user(
        &self,
        ctx: &RequestContext,
        user_id: &UserId,
    ) -> Result<Option<User>, WorkflowError> {
        self.repos
            .users
            .find_by_id(user_id)
            .await
            .map_err(|error| self.storage_failure(ctx, "find_user", error))
    }

    async fn require_user(
        &self,
        ctx: &RequestContext,
        user_id: &UserId,
    ) -> Result<User, WorkflowError> {
        self.find_user(ctx, user_id).await?.ok_or_else(|| WorkflowError::NotAuthenticated {
            reason: format!("user `{}` is not registered", user_id.0),
        })
    }

    async fn load_ledger(
        &self,
        ctx: &RequestContext,
        order_id: &OrderId,
    ) -> Result<Vec<ApprovalEntry>, WorkflowError> {
        self.repos
            .ledger
            .list_for_order(order_id)
            .await
            .map_err(|error| self.storage_failure(ctx, "list_for_order", error))
    }

    fn record_denial(
        &self,
        ctx: &RequestContext,
        user_id: &UserId,
        order_id: &OrderId,
        decision: ApprovalDecision,
        denial: &EligibilityDenial,
    ) {
        info!(
            event_name = "workflow.decision.denied",
            correlation_id = %ctx.correlation_id,
            order_id = %order_id.0,
            user_id = %user_id.0,
            decision = decision.as_str(),
            kind = denial.kind().as_str(),
            reason = %denial.reason(),
            "approval decision denied"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(order_id.clone()),
                &ctx.correlation_id,
                "approval.decision.denied",
                AuditCategory::Decision,
                &user_id.0,
                AuditOutcome::Rejected,
            )
            .with_metadata("decision", decision.as_str())
            .with_metadata("kind", denial.kind().as_str()),
        );
    }

    fn seeding_failure(
        &self,
        ctx: &RequestContext,
        order_id: &OrderId,
        reason: String,
    ) -> WorkflowError {
        error!(
            event_name = "workflow.seed.failed",
            correlation_id = %ctx.correlation_id,
            order_id = %order_id.0,
            reason = %reason,
            "approval ledger seeding failed"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(order_id.clone()),
                &ctx.correlation_id,
                "approval.ledger.seed_failed",
                AuditCategory::Seeding,
                "system",
                AuditOutcome::Failed,
            )
            .with_metadata("reason", reason.clone()),
        );
        WorkflowError::seeding(reason)
    }

    fn storage_failure(
        &self,
        ctx: &RequestContext,
        operation: &'static str,
        error: RepositoryError,
    ) -> WorkflowError {
        warn!(
            event_name = "workflow.storage.failed",
            correlation_id = %ctx.correlation_id,
            operation,
            error = %error,
            "storage operation failed"
        );
        WorkflowError::Internal(format!("{operation}: {error}"))
    }
}

fn seeding_reason(error: RepositoryError) -> String {
    match error {
        RepositoryError::Conflict(detail) => detail,
        other => format!("approval ledger could not be stored: {other}"),
    }
}
