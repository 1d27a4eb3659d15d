use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use procure_core::domain::user::{CurrentUser, UserId};
use procure_core::errors::WorkflowError;
use procure_db::repositories::UserRepository;

/// Resolves the caller's identity from whatever credential the transport carries.
///
/// Token issuance lives outside this system; a guard only maps a presented credential
/// to a registered user.
#[async_trait]
pub trait AccessGuard: Send + Sync {
    async fn resolve_current_user(
        &self,
        credential: Option<&str>,
    ) -> Result<Option<CurrentUser>, WorkflowError>;

    async fn require_current_user(
        &self,
        credential: Option<&str>,
    ) -> Result<CurrentUser, WorkflowError> {
        self.resolve_current_user(credential).await?.ok_or_else(|| {
            WorkflowError::NotAuthenticated {
                reason: "a valid user identity is required".to_owned(),
            }
        })
    }
}

/// Treats the credential as a user id and looks it up in the user directory.
pub struct DirectoryAccessGuard {
    users: Arc<dyn UserRepository>,
}

impl DirectoryAccessGuard {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl AccessGuard for DirectoryAccessGuard {
    async fn resolve_current_user(
        &self,
        credential: Option<&str>,
    ) -> Result<Option<CurrentUser>, WorkflowError> {
        let Some(user_id) = credential.map(str::trim).filter(|value| !value.is_empty()) else {
            return Ok(None);
        };

        let user = self.users.find_by_id(&UserId(user_id.to_owned())).await.map_err(|error| {
            warn!(
                event_name = "workflow.access.lookup_failed",
                user_id = %user_id,
                error = %error,
                "user lookup failed while resolving identity"
            );
            WorkflowError::Internal(error.to_string())
        })?;

        Ok(user.as_ref().map(CurrentUser::from))
    }
}
