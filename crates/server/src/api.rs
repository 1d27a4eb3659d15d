//! JSON routes over the approval engine.
//!
//! - `POST /orders`                    submit a purchase order as the current user
//! - `GET  /orders/{id}`               order header, lines and status
//! - `GET  /orders/{id}/approvals`     the order's approval chain
//! - `GET  /orders/{id}/eligibility`   whether the current user may decide now
//! - `POST /orders/{id}/decision`      approve or reject
//! - `POST /orders/{id}/complete`      mark an approved order completed (admins)
//! - `GET  /approvals/inbox`           entries the current user may act on
//!
//! The caller is identified by the `x-user-id` header. An `x-request-id` header, when
//! present, becomes the correlation id of every log line and audit event for the call.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use procure_core::approvals::Eligibility;
use procure_core::domain::approval::ApprovalEntry;
use procure_core::domain::order::{Order, OrderDraft, OrderId};
use procure_core::domain::user::CurrentUser;
use procure_core::errors::{ErrorKind, InterfaceError, WorkflowError};
use procure_workflow::{
    AccessGuard, ActionableApproval, ApprovalEngine, DecisionOutcome, RequestContext,
    SubmittedOrder,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct ApiState {
    engine: Arc<ApprovalEngine>,
    guard: Arc<dyn AccessGuard>,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub decision: String,
    #[serde(default)]
    pub comments: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
    pub correlation_id: String,
}

/// Error response carrying the interface-level classification of a failure.
#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl ApiError {
    fn from_workflow(error: WorkflowError, ctx: &RequestContext) -> Self {
        Self(error.into_interface(ctx.correlation_id.clone()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            InterfaceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            kind: self.0.kind(),
            message: self.0.message().to_owned(),
            correlation_id: self.0.correlation_id().to_owned(),
        };

        let mut response = (status, Json(body)).into_response();
        if let Ok(value) = HeaderValue::from_str(self.0.correlation_id()) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        response
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn router(engine: Arc<ApprovalEngine>, guard: Arc<dyn AccessGuard>) -> Router {
    Router::new()
        .route("/orders", post(submit_order))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/approvals", get(list_approvals))
        .route("/orders/{id}/eligibility", get(check_eligibility))
        .route("/orders/{id}/decision", post(apply_decision))
        .route("/orders/{id}/complete", post(complete_order))
        .route("/approvals/inbox", get(inbox))
        .with_state(ApiState { engine, guard })
}

fn request_context(headers: &HeaderMap) -> RequestContext {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(RequestContext::new)
        .unwrap_or_else(RequestContext::generated)
}

async fn current_user(
    state: &ApiState,
    headers: &HeaderMap,
    ctx: &RequestContext,
) -> Result<CurrentUser, ApiError> {
    let credential = headers.get(USER_ID_HEADER).and_then(|value| value.to_str().ok());
    state.guard.require_current_user(credential).await.map_err(|error| {
        warn!(
            event_name = "api.access.denied",
            correlation_id = %ctx.correlation_id,
            kind = error.kind().as_str(),
            "request rejected by access guard"
        );
        ApiError::from_workflow(error, ctx)
    })
}

async fn submit_order(
    State(state): State<ApiState>,
    headers: HeaderMap,
    payload: Result<Json<OrderDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmittedOrder>), ApiError> {
    let ctx = request_context(&headers);
    let user = current_user(&state, &headers, &ctx).await?;
    let Json(draft) = payload.map_err(|rejection| invalid_body(rejection, &ctx))?;

    let submitted = state
        .engine
        .submit_order(&ctx, &user.user_id, draft)
        .await
        .map_err(|error| ApiError::from_workflow(error, &ctx))?;
    Ok((StatusCode::CREATED, Json(submitted)))
}

async fn get_order(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Order> {
    let ctx = request_context(&headers);
    current_user(&state, &headers, &ctx).await?;

    state
        .engine
        .get_order(&ctx, &OrderId(id))
        .await
        .map(Json)
        .map_err(|error| ApiError::from_workflow(error, &ctx))
}

async fn list_approvals(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Vec<ApprovalEntry>> {
    let ctx = request_context(&headers);
    current_user(&state, &headers, &ctx).await?;

    state
        .engine
        .list_approvals(&ctx, &OrderId(id))
        .await
        .map(Json)
        .map_err(|error| ApiError::from_workflow(error, &ctx))
}

async fn check_eligibility(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Eligibility> {
    let ctx = request_context(&headers);
    let user = current_user(&state, &headers, &ctx).await?;

    state
        .engine
        .check_eligibility(&ctx, &user.user_id, &OrderId(id))
        .await
        .map(Json)
        .map_err(|error| ApiError::from_workflow(error, &ctx))
}

async fn apply_decision(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<DecisionRequest>, JsonRejection>,
) -> ApiResult<DecisionOutcome> {
    let ctx = request_context(&headers);
    let user = current_user(&state, &headers, &ctx).await?;
    let Json(request) = payload.map_err(|rejection| invalid_body(rejection, &ctx))?;

    state
        .engine
        .apply_decision(&ctx, &user.user_id, &OrderId(id), &request.decision, request.comments)
        .await
        .map(Json)
        .map_err(|error| ApiError::from_workflow(error, &ctx))
}

async fn complete_order(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Order> {
    let ctx = request_context(&headers);
    let user = current_user(&state, &headers, &ctx).await?;

    state
        .engine
        .complete_order(&ctx, &user.user_id, &OrderId(id))
        .await
        .map(Json)
        .map_err(|error| ApiError::from_workflow(error, &ctx))
}

async fn inbox(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<Vec<ActionableApproval>> {
    let ctx = request_context(&headers);
    let user = current_user(&state, &headers, &ctx).await?;

    state
        .engine
        .list_actionable(&ctx, &user.user_id)
        .await
        .map(Json)
        .map_err(|error| ApiError::from_workflow(error, &ctx))
}

fn invalid_body(rejection: JsonRejection, ctx: &RequestContext) -> ApiError {
    ApiError::from_workflow(
        WorkflowError::Validation { reason: format!("invalid request body: {}", rejection.body_text()) },
        ctx,
    )
}
