//! Request authentication.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use lessoncraft_auth::Role;
use lessoncraft_core::UserId;
use lessoncraft_orchestrator::SessionFabric;
use lessoncraft_store::LessonStore;

use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated caller, extracted from the `Authorization` header.
///
/// The configured admin token authenticates as the `admin` role without a
/// user record; everything else must be a valid JWT.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The caller's user ID.
    pub user_id: UserId,
    /// The caller's role.
    pub role: Role,
}

impl AuthUser {
    /// Reject callers that cannot author lessons.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` for learners.
    pub fn require_author(&self) -> Result<(), ApiError> {
        if self.role.can_author() {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }

    /// Reject callers that are not admins.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` for non-admins.
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.role.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

impl<F, L> FromRequestParts<Arc<AppState<F, L>>> for AuthUser
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<F, L>>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;

        if state
            .config
            .admin_token
            .as_deref()
            .is_some_and(|admin| admin == token)
        {
            return Ok(Self {
                user_id: UserId::new("admin"),
                role: Role::Admin,
            });
        }

        let claims = state.tokens.validate(token)?;
        Ok(Self {
            user_id: claims.user_id,
            role: claims.role,
        })
    }
}
