use std::sync::Arc;

use rust_decimal::Decimal;

use procure_core::approvals::RejectionPolicy;
use procure_core::audit::{AuditOutcome, InMemoryAuditSink};
use procure_core::domain::approval::ApprovalStatus;
use procure_core::domain::department::{Department, DepartmentId};
use procure_core::domain::order::{OrderDraft, OrderId, OrderLineDraft, OrderStatus};
use procure_core::domain::user::{User, UserId, UserRole};
use procure_core::errors::{ErrorKind, WorkflowError};
use procure_db::{connect_with_settings, migrations, DemoDirectory};
use procure_workflow::{ApprovalEngine, EngineRepositories, EngineSettings, RequestContext};

struct Fixture {
    engine: Arc<ApprovalEngine>,
    audit: InMemoryAuditSink,
}

async fn demo_engine(rejection_policy: RejectionPolicy) -> Fixture {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("pool");
    migrations::run_pending(&pool).await.expect("migrations");
    DemoDirectory::load(&pool).await.expect("demo directory");

    let audit = InMemoryAuditSink::default();
    let settings = EngineSettings { rejection_policy, ..EngineSettings::default() };
    let engine =
        ApprovalEngine::new(EngineRepositories::sql(pool), Arc::new(audit.clone()), settings);
    Fixture { engine: Arc::new(engine), audit }
}

fn user(id: &str) -> UserId {
    UserId(id.to_string())
}

fn draft() -> OrderDraft {
    OrderDraft {
        store_id: "obra-san-isidro".to_string(),
        items: vec![
            OrderLineDraft {
                description: "Fierro corrugado 1/2\"".to_string(),
                quantity: 120,
                unit_price: Decimal::new(3450, 2),
            },
            OrderLineDraft {
                description: "Alambre negro N16 kg".to_string(),
                quantity: 25,
                unit_price: Decimal::new(720, 2),
            },
        ],
        currency: None,
        notes: Some("Entrega en obra antes del vaciado".to_string()),
    }
}

async fn submit(fixture: &Fixture) -> OrderId {
    fixture
        .engine
        .submit_order(&RequestContext::generated(), &user("usr-logistica-staff"), draft())
        .await
        .expect("submit order")
        .order
        .id
}

async fn decide(
    fixture: &Fixture,
    approver: &str,
    order_id: &OrderId,
    decision: &str,
) -> Result<procure_workflow::DecisionOutcome, WorkflowError> {
    fixture
        .engine
        .apply_decision(&RequestContext::generated(), &user(approver), order_id, decision, None)
        .await
}

#[tokio::test]
async fn single_department_chain_is_approved_by_its_head() {
    let repos = EngineRepositories::in_memory();
    repos
        .departments
        .save(Department {
            id: DepartmentId("dept-obras".to_string()),
            code: "OBRAS".to_string(),
            name: "Obras".to_string(),
            approval_order: 1,
            requires_approval: true,
        })
        .await
        .expect("save department");
    for (id, head) in [("usr-obras-staff", false), ("usr-obras-head", true)] {
        repos
            .users
            .save(User {
                id: user(id),
                name: id.to_string(),
                email: format!("{id}@example.pe"),
                role: UserRole::Staff,
                department_id: Some(DepartmentId("dept-obras".to_string())),
                is_department_head: head,
            })
            .await
            .expect("save user");
    }
    let engine = ApprovalEngine::new(
        repos,
        Arc::new(InMemoryAuditSink::default()),
        EngineSettings::default(),
    );
    let ctx = RequestContext::generated();

    let submitted =
        engine.submit_order(&ctx, &user("usr-obras-staff"), draft()).await.expect("submit");
    assert_eq!(submitted.approvals.len(), 1);

    let outcome = engine
        .apply_decision(
            &ctx,
            &user("usr-obras-head"),
            &submitted.order.id,
            "approve",
            Some("  conforme  ".to_string()),
        )
        .await
        .expect("approve");

    assert_eq!(outcome.order_status, OrderStatus::Approved);
    assert!(outcome.all_approved);
    assert_eq!(outcome.entry.status, ApprovalStatus::Approved);
    assert_eq!(outcome.entry.comments.as_deref(), Some("conforme"));
    assert_eq!(outcome.entry.approver_id, Some(user("usr-obras-head")));
    assert!(outcome.entry.approved_at.is_some());
}

#[tokio::test]
async fn later_rank_waits_for_earlier_rank() {
    let fixture = demo_engine(RejectionPolicy::SkipRemaining).await;
    let order_id = submit(&fixture).await;

    let error = decide(&fixture, "usr-administracion-head", &order_id, "approve")
        .await
        .expect_err("rank 2 cannot act before rank 1");
    assert_eq!(error.kind(), ErrorKind::OrderingViolation);
    let WorkflowError::OrderingViolation { waiting_on, .. } = error else {
        panic!("expected ordering violation");
    };
    assert_eq!(waiting_on, vec!["Logística".to_string()]);

    let first = decide(&fixture, "usr-logistica-head", &order_id, "approve").await.expect("rank 1");
    assert_eq!(first.order_status, OrderStatus::InProgress);
    assert!(!first.all_approved);

    decide(&fixture, "usr-administracion-head", &order_id, "approve").await.expect("rank 2a");
    decide(&fixture, "usr-operaciones-head", &order_id, "approve").await.expect("rank 2b");
    let last = decide(&fixture, "usr-general-head", &order_id, "approve").await.expect("rank 3");

    assert_eq!(last.order_status, OrderStatus::Approved);
    assert!(last.all_approved);
    let order =
        fixture.engine.get_order(&RequestContext::generated(), &order_id).await.expect("order");
    assert_eq!(order.status, OrderStatus::Approved);
}

#[tokio::test]
async fn rejection_closes_the_order_under_both_policies() {
    for (policy, expected_tail) in [
        (RejectionPolicy::SkipRemaining, ApprovalStatus::Skipped),
        (RejectionPolicy::LeavePending, ApprovalStatus::Pending),
    ] {
        let fixture = demo_engine(policy).await;
        let order_id = submit(&fixture).await;

        let rejected =
            decide(&fixture, "usr-logistica-head", &order_id, "reject").await.expect("reject");
        assert_eq!(rejected.order_status, OrderStatus::Rejected);

        let error = decide(&fixture, "usr-administracion-head", &order_id, "approve")
            .await
            .expect_err("order is closed");
        assert_eq!(error.kind(), ErrorKind::AlreadyProcessed, "policy {policy:?}");

        let ledger = fixture
            .engine
            .list_approvals(&RequestContext::generated(), &order_id)
            .await
            .expect("ledger");
        assert_eq!(ledger[0].status, ApprovalStatus::Rejected);
        assert!(ledger[1..].iter().all(|entry| entry.status == expected_tail), "policy {policy:?}");

        let actionable = fixture
            .engine
            .list_actionable(&RequestContext::generated(), &user("usr-administracion-head"))
            .await
            .expect("inbox");
        assert!(actionable.is_empty());
    }
}

#[tokio::test]
async fn same_rank_heads_approve_concurrently() {
    let fixture = demo_engine(RejectionPolicy::SkipRemaining).await;
    let order_id = submit(&fixture).await;
    decide(&fixture, "usr-logistica-head", &order_id, "approve").await.expect("rank 1");

    let handles: Vec<_> = ["usr-administracion-head", "usr-operaciones-head"]
        .into_iter()
        .map(|approver| {
            let engine = Arc::clone(&fixture.engine);
            let order_id = order_id.clone();
            tokio::spawn(async move {
                engine
                    .apply_decision(
                        &RequestContext::generated(),
                        &user(approver),
                        &order_id,
                        "approve",
                        None,
                    )
                    .await
            })
        })
        .collect();

    for handle in handles {
        let outcome = handle.await.expect("join").expect("same-rank approval");
        assert_eq!(outcome.order_status, OrderStatus::InProgress);
    }

    let inbox = fixture
        .engine
        .list_actionable(&RequestContext::generated(), &user("usr-general-head"))
        .await
        .expect("inbox");
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].order.id, order_id);
    assert_eq!(inbox[0].summary.approved, 3);
    assert_eq!(inbox[0].summary.actionable_rank, Some(3));
}

#[tokio::test]
async fn double_submission_is_applied_once() {
    let fixture = demo_engine(RejectionPolicy::SkipRemaining).await;
    let order_id = submit(&fixture).await;

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let engine = Arc::clone(&fixture.engine);
            let order_id = order_id.clone();
            tokio::spawn(async move {
                engine
                    .apply_decision(
                        &RequestContext::generated(),
                        &user("usr-logistica-head"),
                        &order_id,
                        "approve",
                        None,
                    )
                    .await
            })
        })
        .collect();

    let mut applied = 0;
    let mut already_processed = 0;
    for handle in handles {
        match handle.await.expect("join") {
            Ok(_) => applied += 1,
            Err(error) if error.kind() == ErrorKind::AlreadyProcessed => already_processed += 1,
            Err(error) => panic!("unexpected error: {error}"),
        }
    }
    assert_eq!((applied, already_processed), (1, 1));

    let denials = fixture
        .audit
        .events()
        .into_iter()
        .filter(|event| event.outcome == AuditOutcome::Rejected)
        .count();
    assert_eq!(denials, 1);
}

#[tokio::test]
async fn inbox_lists_only_actionable_orders() {
    let fixture = demo_engine(RejectionPolicy::SkipRemaining).await;
    let first = submit(&fixture).await;
    let second = submit(&fixture).await;
    let ctx = RequestContext::generated();

    let logistica = fixture
        .engine
        .list_actionable(&ctx, &user("usr-logistica-head"))
        .await
        .expect("logistica inbox");
    assert_eq!(logistica.len(), 2);

    let staff =
        fixture.engine.list_actionable(&ctx, &user("usr-logistica-staff")).await.expect("staff");
    assert!(staff.is_empty());

    decide(&fixture, "usr-logistica-head", &first, "approve").await.expect("approve first");

    let operaciones = fixture
        .engine
        .list_actionable(&ctx, &user("usr-operaciones-head"))
        .await
        .expect("operaciones inbox");
    let ids: Vec<&OrderId> = operaciones.iter().map(|item| &item.order.id).collect();
    assert_eq!(ids, vec![&first]);
    assert!(!ids.contains(&&second));

    let unknown = fixture.engine.list_actionable(&ctx, &user("usr-ghost")).await.expect_err("ghost");
    assert_eq!(unknown.kind(), ErrorKind::NotAuthenticated);
}

#[tokio::test]
async fn eligibility_explains_denials() {
    let fixture = demo_engine(RejectionPolicy::SkipRemaining).await;
    let order_id = submit(&fixture).await;
    let ctx = RequestContext::generated();

    let staff = fixture
        .engine
        .check_eligibility(&ctx, &user("usr-logistica-staff"), &order_id)
        .await
        .expect("eligibility");
    assert!(!staff.can_approve);
    assert!(staff.reason.as_deref().unwrap_or_default().contains("not a department head"));

    let head = fixture
        .engine
        .check_eligibility(&ctx, &user("usr-logistica-head"), &order_id)
        .await
        .expect("eligibility");
    assert!(head.can_approve);
    assert_eq!(head.entry.map(|entry| entry.department_id.0), Some("dept-logistica".to_string()));

    let missing = fixture
        .engine
        .check_eligibility(&ctx, &user("usr-logistica-head"), &OrderId("PO-missing".to_string()))
        .await
        .expect_err("missing order");
    assert_eq!(missing.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn applicant_outside_the_chain_cannot_submit() {
    let fixture = demo_engine(RejectionPolicy::SkipRemaining).await;

    let error = fixture
        .engine
        .submit_order(&RequestContext::generated(), &user("usr-marketing-staff"), draft())
        .await
        .expect_err("marketing does not approve orders");

    assert_eq!(error.kind(), ErrorKind::SeedingError);
    assert!(fixture.audit.events().iter().all(|event| event.event_type != "order.submitted"));
}
