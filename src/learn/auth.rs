//! Caller identity.
//!
//! Authentication happens upstream; the gateway forwards the authenticated
//! user's id in the `x-user-id` header.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use std::sync::Arc;
use uuid::Uuid;

use super::error::{LearnError, LearnResult};
use super::types::{Course, User};
use super::with_engine;
use crate::core::shared::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Id of the authenticated caller, without a database lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity(pub Uuid);

/// The authenticated caller's stored user record
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

pub fn identity_from_parts(parts: &Parts) -> LearnResult<Identity> {
    parts
        .headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .map(Identity)
        .ok_or(LearnError::Unauthorized)
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = LearnError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        identity_from_parts(parts)
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = LearnError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Identity(user_id) = identity_from_parts(parts)?;

        let user = with_engine(state, move |engine| engine.find_user(user_id)).await?;
        user.map(CurrentUser).ok_or(LearnError::Unauthorized)
    }
}

pub fn require_instructor(user: &User) -> LearnResult<()> {
    if user.can_teach() {
        Ok(())
    } else {
        Err(LearnError::forbidden("Only instructors can perform this action"))
    }
}

/// Owner of the course, or an admin
pub fn ensure_course_owner(user: &User, course: &Course) -> LearnResult<()> {
    if course.instructor_id == user.id || user.is_admin() {
        Ok(())
    } else {
        Err(LearnError::forbidden("You do not manage this course"))
    }
}
