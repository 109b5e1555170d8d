//! Actor context extracted from gateway headers.
//!
//! The upstream gateway authenticates the caller and forwards `X-User-ID` and
//! `X-User-Role`. This service trusts both and only decides what the role may do.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "X-User-ID";
pub const USER_ROLE_HEADER: &str = "X-User-Role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Clerk,
    Resident,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "clerk" => Some(Role::Clerk),
            "resident" => Some(Role::Resident),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Clerk => "clerk",
            Role::Resident => "resident",
        }
    }
}

/// Authenticated caller of a request.
#[derive(Debug, Clone, Copy)]
pub struct ActorContext {
    pub user_id: Uuid,
    pub role: Role,
}

impl ActorContext {
    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Clerk)
    }

    /// Admins and clerks.
    pub fn require_staff(&self) -> Result<(), AppError> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(AppError::Forbidden(anyhow::anyhow!(
                "This action requires an admin or clerk"
            )))
        }
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(AppError::Forbidden(anyhow::anyhow!(
                "This action requires an admin"
            )))
        }
    }

    pub fn require_resident(&self) -> Result<(), AppError> {
        if self.role == Role::Resident {
            Ok(())
        } else {
            Err(AppError::Forbidden(anyhow::anyhow!(
                "This action is only available to residents"
            )))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ActorContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing X-User-ID header")))?;
        let user_id = Uuid::parse_str(user_id.trim())
            .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Invalid X-User-ID header")))?;

        let role = parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(Role::parse)
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!("Missing or unknown X-User-Role header"))
            })?;

        let span = tracing::Span::current();
        span.record("user_id", tracing::field::display(user_id));
        span.record("role", role.as_str());

        Ok(ActorContext { user_id, role })
    }
}
