use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::order::OrderStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid order transition from {from:?} to {to:?}")]
    InvalidOrderTransition { from: OrderStatus, to: OrderStatus },
    #[error("invalid order: {0}")]
    InvalidOrder(String),
    #[error("unknown decision `{0}` (expected approve|reject)")]
    UnknownDecision(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Machine-checkable classification of a workflow failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotAuthenticated,
    NotAuthorized,
    NotFound,
    AlreadyProcessed,
    OrderingViolation,
    SeedingError,
    ValidationError,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotAuthenticated => "not_authenticated",
            Self::NotAuthorized => "not_authorized",
            Self::NotFound => "not_found",
            Self::AlreadyProcessed => "already_processed",
            Self::OrderingViolation => "ordering_violation",
            Self::SeedingError => "seeding_error",
            Self::ValidationError => "validation_error",
            Self::Internal => "internal",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("not authenticated: {reason}")]
    NotAuthenticated { reason: String },
    #[error("not authorized: {reason}")]
    NotAuthorized { reason: String },
    #[error("{resource} `{id}` not found")]
    NotFound { resource: &'static str, id: String },
    #[error("already processed: {reason}")]
    AlreadyProcessed { reason: String },
    #[error("ordering violation: {reason}")]
    OrderingViolation { reason: String, waiting_on: Vec<String> },
    #[error("approval ledger seeding failed: {reason}")]
    Seeding { reason: String },
    #[error("validation failed: {reason}")]
    Validation { reason: String },
    #[error("internal failure: {0}")]
    Internal(String),
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotAuthenticated { .. } => ErrorKind::NotAuthenticated,
            Self::NotAuthorized { .. } => ErrorKind::NotAuthorized,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyProcessed { .. } => ErrorKind::AlreadyProcessed,
            Self::OrderingViolation { .. } => ErrorKind::OrderingViolation,
            Self::Seeding { .. } => ErrorKind::SeedingError,
            Self::Validation { .. } => ErrorKind::ValidationError,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { resource, id: id.into() }
    }

    pub fn seeding(reason: impl Into<String>) -> Self {
        Self::Seeding { reason: reason.into() }
    }

    /// Message that is safe to show to the person who triggered the failure.
    pub fn user_message(&self) -> String {
        match self {
            Self::Internal(_) => "An unexpected internal error occurred.".to_owned(),
            Self::Seeding { .. } => {
                "The approval chain could not be created. An administrator has been notified."
                    .to_owned()
            }
            Self::NotFound { resource, id } => format!("{resource} `{id}` was not found"),
            Self::NotAuthenticated { reason }
            | Self::NotAuthorized { reason }
            | Self::AlreadyProcessed { reason }
            | Self::OrderingViolation { reason, .. }
            | Self::Validation { reason } => reason.clone(),
        }
    }
}

impl From<DomainError> for WorkflowError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InvalidOrder(reason) => Self::Validation { reason },
            error @ DomainError::UnknownDecision(_) => Self::Validation { reason: error.to_string() },
            error @ DomainError::InvalidOrderTransition { .. } => {
                Self::Validation { reason: error.to_string() }
            }
            DomainError::InvariantViolation(message) => Self::Internal(message),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { kind: ErrorKind, message: String, correlation_id: String },
    #[error("unauthorized: {message}")]
    Unauthorized { kind: ErrorKind, message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { kind: ErrorKind, message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { kind: ErrorKind, message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { kind: ErrorKind, message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { kind: ErrorKind, message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BadRequest { kind, .. }
            | Self::Unauthorized { kind, .. }
            | Self::Forbidden { kind, .. }
            | Self::NotFound { kind, .. }
            | Self::Conflict { kind, .. }
            | Self::Internal { kind, .. } => *kind,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::Unauthorized { message, .. }
            | Self::Forbidden { message, .. }
            | Self::NotFound { message, .. }
            | Self::Conflict { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Unauthorized { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl WorkflowError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Unauthorized { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<WorkflowError> for InterfaceError {
    fn from(value: WorkflowError) -> Self {
        let kind = value.kind();
        let message = value.user_message();
        let correlation_id = "unassigned".to_owned();
        match kind {
            ErrorKind::NotAuthenticated => Self::Unauthorized { kind, message, correlation_id },
            ErrorKind::NotAuthorized => Self::Forbidden { kind, message, correlation_id },
            ErrorKind::NotFound => Self::NotFound { kind, message, correlation_id },
            ErrorKind::AlreadyProcessed | ErrorKind::OrderingViolation => {
                Self::Conflict { kind, message, correlation_id }
            }
            ErrorKind::ValidationError => Self::BadRequest { kind, message, correlation_id },
            ErrorKind::SeedingError | ErrorKind::Internal => {
                Self::Internal { kind, message, correlation_id }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::order::OrderStatus;
    use crate::errors::{DomainError, ErrorKind, InterfaceError, WorkflowError};

    #[test]
    fn domain_validation_maps_to_bad_request_interface_error() {
        let interface = WorkflowError::from(DomainError::InvalidOrder("no items".to_owned()))
            .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                kind: ErrorKind::ValidationError,
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(interface.message(), "no items");
    }

    #[test]
    fn ordering_violation_keeps_specific_reason() {
        let interface = WorkflowError::OrderingViolation {
            reason: "waiting on Gerencia de Administración".to_owned(),
            waiting_on: vec!["Gerencia de Administración".to_owned()],
        }
        .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::Conflict { .. }));
        assert_eq!(interface.kind(), ErrorKind::OrderingViolation);
        assert_eq!(interface.message(), "waiting on Gerencia de Administración");
    }

    #[test]
    fn internal_error_does_not_leak_storage_details() {
        let interface = WorkflowError::Internal("database lock timeout on approval_entry".to_owned())
            .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.message(), "An unexpected internal error occurred.");
        assert_eq!(interface.correlation_id(), "req-3");
    }

    #[test]
    fn invalid_transition_is_reported_as_validation() {
        let error = WorkflowError::from(DomainError::InvalidOrderTransition {
            from: OrderStatus::InProgress,
            to: OrderStatus::Completed,
        });
        assert_eq!(error.kind(), ErrorKind::ValidationError);
    }

    #[test]
    fn error_kinds_serialize_as_snake_case() {
        let encoded = serde_json::to_string(&ErrorKind::AlreadyProcessed).expect("serialize");
        assert_eq!(encoded, "\"already_processed\"");
        assert_eq!(ErrorKind::SeedingError.as_str(), "seeding_error");
    }
}
