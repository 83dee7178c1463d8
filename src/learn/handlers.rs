//! HTTP handlers for the Learn module.
//!
//! Every handler answers `{"success": true, "data": ...}` on success; failures
//! are rendered by [`LearnError`]'s `IntoResponse`.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::auth::{CurrentUser, Identity};
use super::error::LearnError;
use super::extract::{ApiJson, ApiPath, ApiQuery, JsonOrDefault};
use super::quizzes::generate_quiz as generate_quiz_for_lecture;
use super::remedial::generate_remedial_content;
use super::types::*;
use super::with_engine;
use crate::core::shared::state::AppState;

type HandlerResult = Result<axum::response::Response, LearnError>;

fn ok<T: Serialize>(data: T) -> HandlerResult {
    Ok(Json(json!({ "success": true, "data": data })).into_response())
}

fn created<T: Serialize>(data: T) -> HandlerResult {
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "data": data }))).into_response())
}

fn done() -> HandlerResult {
    Ok(Json(json!({ "success": true })).into_response())
}

// ============================================================================
// USERS
// ============================================================================

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<CreateUserRequest>,
) -> HandlerResult {
    created(with_engine(&state, move |engine| engine.create_user(req)).await?)
}

pub async fn get_me(CurrentUser(user): CurrentUser) -> HandlerResult {
    ok(user)
}

/// Public profile of another user
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    _caller: Identity,
    ApiPath(user_id): ApiPath<Uuid>,
) -> HandlerResult {
    let user = with_engine(&state, move |engine| engine.get_user(user_id)).await?;
    ok(UserSummary::from(user))
}

pub async fn update_me(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> HandlerResult {
    ok(with_engine(&state, move |engine| engine.update_profile(user.id, req)).await?)
}

// ============================================================================
// COURSES
// ============================================================================

pub async fn list_courses(
    State(state): State<Arc<AppState>>,
    ApiQuery(filters): ApiQuery<CourseFilters>,
) -> HandlerResult {
    ok(with_engine(&state, move |engine| engine.list_courses(filters)).await?)
}

pub async fn create_course(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiJson(req): ApiJson<CreateCourseRequest>,
) -> HandlerResult {
    created(with_engine(&state, move |engine| engine.create_course(&user, req)).await?)
}

pub async fn list_my_courses(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> HandlerResult {
    ok(with_engine(&state, move |engine| engine.list_instructor_courses(&user)).await?)
}

pub async fn get_course(
    State(state): State<Arc<AppState>>,
    viewer: Option<CurrentUser>,
    ApiPath(course_id): ApiPath<Uuid>,
) -> HandlerResult {
    let viewer = viewer.map(|CurrentUser(u)| u);
    ok(with_engine(&state, move |engine| engine.get_course_detail(course_id, viewer.as_ref())).await?)
}

pub async fn update_course(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(course_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateCourseRequest>,
) -> HandlerResult {
    ok(with_engine(&state, move |engine| engine.update_course(&user, course_id, req)).await?)
}

pub async fn delete_course(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(course_id): ApiPath<Uuid>,
) -> HandlerResult {
    with_engine(&state, move |engine| engine.delete_course(&user, course_id)).await?;
    done()
}

pub async fn publish_course(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(course_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<PublishRequest>,
) -> HandlerResult {
    ok(with_engine(&state, move |engine| engine.set_published(&user, course_id, req.published)).await?)
}

// ============================================================================
// LECTURES
// ============================================================================

pub async fn list_lectures(
    State(state): State<Arc<AppState>>,
    viewer: Option<CurrentUser>,
    ApiPath(course_id): ApiPath<Uuid>,
) -> HandlerResult {
    let viewer = viewer.map(|CurrentUser(u)| u);
    ok(with_engine(&state, move |engine| engine.list_lectures(course_id, viewer.as_ref())).await?)
}

pub async fn create_lecture(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(course_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<CreateLectureRequest>,
) -> HandlerResult {
    created(with_engine(&state, move |engine| engine.create_lecture(&user, course_id, req)).await?)
}

pub async fn reorder_lectures(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(course_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<ReorderLecturesRequest>,
) -> HandlerResult {
    ok(with_engine(&state, move |engine| {
        engine.reorder_lectures(&user, course_id, req.lecture_ids)
    })
    .await?)
}

pub async fn get_lecture(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(lecture_id): ApiPath<Uuid>,
) -> HandlerResult {
    ok(with_engine(&state, move |engine| engine.get_lecture(&user, lecture_id)).await?)
}

pub async fn update_lecture(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(lecture_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateLectureRequest>,
) -> HandlerResult {
    ok(with_engine(&state, move |engine| engine.update_lecture(&user, lecture_id, req)).await?)
}

pub async fn delete_lecture(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(lecture_id): ApiPath<Uuid>,
) -> HandlerResult {
    with_engine(&state, move |engine| engine.delete_lecture(&user, lecture_id)).await?;
    done()
}

pub async fn complete_lecture(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(lecture_id): ApiPath<Uuid>,
) -> HandlerResult {
    ok(with_engine(&state, move |engine| engine.complete_lecture(&user, lecture_id)).await?)
}

// ============================================================================
// QUIZZES
// ============================================================================

pub async fn get_quiz(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(lecture_id): ApiPath<Uuid>,
) -> HandlerResult {
    ok(with_engine(&state, move |engine| engine.get_quiz_for_lecture(&user, lecture_id)).await?)
}

pub async fn create_quiz(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(lecture_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<CreateQuizRequest>,
) -> HandlerResult {
    created(with_engine(&state, move |engine| engine.create_quiz(&user, lecture_id, req)).await?)
}

pub async fn generate_quiz(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(lecture_id): ApiPath<Uuid>,
    JsonOrDefault(req): JsonOrDefault<GenerateQuizRequest>,
) -> HandlerResult {
    created(generate_quiz_for_lecture(&state, user, lecture_id, req).await?)
}

pub async fn update_quiz(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(quiz_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateQuizRequest>,
) -> HandlerResult {
    ok(with_engine(&state, move |engine| engine.update_quiz(&user, quiz_id, req)).await?)
}

pub async fn delete_quiz(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(quiz_id): ApiPath<Uuid>,
) -> HandlerResult {
    with_engine(&state, move |engine| engine.delete_quiz(&user, quiz_id)).await?;
    done()
}

pub async fn submit_attempt(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(quiz_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<SubmitAttemptRequest>,
) -> HandlerResult {
    created(with_engine(&state, move |engine| engine.submit_attempt(&user, quiz_id, req)).await?)
}

pub async fn list_attempts(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(quiz_id): ApiPath<Uuid>,
) -> HandlerResult {
    ok(with_engine(&state, move |engine| engine.list_attempts(&user, quiz_id)).await?)
}

// ============================================================================
// REMEDIATION
// ============================================================================

pub async fn generate_remedial(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(attempt_id): ApiPath<Uuid>,
) -> HandlerResult {
    ok(generate_remedial_content(&state, user, attempt_id).await?)
}

pub async fn list_remedial(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiQuery(filters): ApiQuery<RemedialFilters>,
) -> HandlerResult {
    ok(with_engine(&state, move |engine| engine.list_remedial_content(&user, filters)).await?)
}

pub async fn list_misconceptions(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiQuery(filters): ApiQuery<MisconceptionFilters>,
) -> HandlerResult {
    ok(with_engine(&state, move |engine| engine.list_misconceptions(&user, filters)).await?)
}

// ============================================================================
// ENROLLMENTS
// ============================================================================

pub async fn list_enrollments(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> HandlerResult {
    ok(with_engine(&state, move |engine| engine.list_enrollments(&user)).await?)
}

pub async fn enroll(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(course_id): ApiPath<Uuid>,
) -> HandlerResult {
    created(with_engine(&state, move |engine| engine.enroll(&user, course_id)).await?)
}

pub async fn unenroll(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(course_id): ApiPath<Uuid>,
) -> HandlerResult {
    with_engine(&state, move |engine| engine.unenroll(&user, course_id)).await?;
    done()
}

pub async fn get_enrollment(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(course_id): ApiPath<Uuid>,
) -> HandlerResult {
    ok(with_engine(&state, move |engine| engine.get_enrollment(&user, course_id)).await?)
}

pub async fn course_roster(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(course_id): ApiPath<Uuid>,
) -> HandlerResult {
    ok(with_engine(&state, move |engine| engine.course_roster(&user, course_id)).await?)
}

// ============================================================================
// REVIEWS
// ============================================================================

pub async fn list_reviews(
    State(state): State<Arc<AppState>>,
    ApiPath(course_id): ApiPath<Uuid>,
) -> HandlerResult {
    ok(with_engine(&state, move |engine| engine.list_reviews(course_id)).await?)
}

pub async fn create_review(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(course_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<CreateReviewRequest>,
) -> HandlerResult {
    created(with_engine(&state, move |engine| engine.create_review(&user, course_id, req)).await?)
}

pub async fn update_review(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(review_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateReviewRequest>,
) -> HandlerResult {
    ok(with_engine(&state, move |engine| engine.update_review(&user, review_id, req)).await?)
}

pub async fn delete_review(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(review_id): ApiPath<Uuid>,
) -> HandlerResult {
    with_engine(&state, move |engine| engine.delete_review(&user, review_id)).await?;
    done()
}

// ============================================================================
// ANALYTICS
// ============================================================================

pub async fn course_analytics(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(course_id): ApiPath<Uuid>,
) -> HandlerResult {
    ok(with_engine(&state, move |engine| engine.course_analytics(&user, course_id)).await?)
}

pub async fn student_dashboard(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> HandlerResult {
    ok(with_engine(&state, move |engine| engine.student_dashboard(&user)).await?)
}
