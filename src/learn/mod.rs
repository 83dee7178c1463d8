//! # Learn Module
//!
//! Course authoring and adaptive learning:
//! - Course and lecture management (CRUD, ordering, publishing)
//! - Quizzes, one per lecture, hand-written or AI-generated
//! - Attempt grading with misconception tracking
//! - AI remedial content built from a student's wrong answers
//! - Enrollments with lecture-completion progress
//! - Course reviews with rating rollups
//!
//! Storage goes through Diesel on a blocking thread; handlers are Axum.

pub mod analytics;
pub mod auth;
pub mod courses;
pub mod enrollments;
pub mod error;
pub mod extract;
pub mod grading;
pub mod handlers;
pub mod lectures;
pub mod prompts;
pub mod quizzes;
pub mod remedial;
pub mod reviews;
pub mod types;
pub mod users;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

use crate::core::rate_limit::{ai_rate_limit, RateLimitState};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{DbConn, DbPool};

pub use error::{LearnError, LearnResult};
pub use handlers::*;
pub use types::*;

// ============================================================================
// LEARN ENGINE
// ============================================================================

/// Synchronous storage operations for the Learn module. Every method blocks
/// on the database and must run on the blocking pool (see [`with_engine`]).
#[derive(Clone)]
pub struct LearnEngine {
    db: DbPool,
}

impl LearnEngine {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub(crate) fn conn(&self) -> LearnResult<DbConn> {
        Ok(self.db.get()?)
    }
}

/// Run `f` against a fresh engine on tokio's blocking pool
pub async fn with_engine<T, F>(state: &AppState, f: F) -> LearnResult<T>
where
    F: FnOnce(&LearnEngine) -> LearnResult<T> + Send + 'static,
    T: Send + 'static,
{
    let engine = LearnEngine::new(state.conn.clone());
    tokio::task::spawn_blocking(move || f(&engine)).await?
}

// ============================================================================
// ROUTE CONFIGURATION
// ============================================================================

pub fn configure_learn_routes(rate_limits: Arc<RateLimitState>) -> Router<Arc<AppState>> {
    let ai_routes = Router::new()
        .route("/api/lectures/:id/quiz/generate", post(generate_quiz))
        .route("/api/attempts/:id/remedial", post(generate_remedial))
        .route_layer(middleware::from_fn_with_state(rate_limits, ai_rate_limit));

    Router::new()
        // Users
        .route("/api/users", post(create_user))
        .route("/api/users/me", get(get_me).put(update_me))
        .route("/api/users/:id", get(get_user))
        // Courses
        .route("/api/courses", get(list_courses).post(create_course))
        .route("/api/courses/mine", get(list_my_courses))
        .route(
            "/api/courses/:id",
            get(get_course).put(update_course).delete(delete_course),
        )
        .route("/api/courses/:id/publish", post(publish_course))
        // Lectures
        .route(
            "/api/courses/:id/lectures",
            get(list_lectures).post(create_lecture),
        )
        .route("/api/courses/:id/lectures/order", put(reorder_lectures))
        .route(
            "/api/lectures/:id",
            get(get_lecture).put(update_lecture).delete(delete_lecture),
        )
        .route("/api/lectures/:id/complete", post(complete_lecture))
        // Quizzes
        .route("/api/lectures/:id/quiz", get(get_quiz).post(create_quiz))
        .route("/api/quizzes/:id", put(update_quiz).delete(delete_quiz))
        .route(
            "/api/quizzes/:id/attempts",
            get(list_attempts).post(submit_attempt),
        )
        // Remediation
        .route("/api/remedial", get(list_remedial))
        .route("/api/misconceptions", get(list_misconceptions))
        // Enrollments
        .route("/api/enrollments", get(list_enrollments))
        .route(
            "/api/courses/:id/enroll",
            post(enroll).delete(unenroll),
        )
        .route("/api/courses/:id/enrollment", get(get_enrollment))
        .route("/api/courses/:id/roster", get(course_roster))
        // Reviews
        .route(
            "/api/courses/:id/reviews",
            get(list_reviews).post(create_review),
        )
        .route("/api/reviews/:id", put(update_review).delete(delete_review))
        // Analytics
        .route("/api/courses/:id/analytics", get(course_analytics))
        .route("/api/dashboard", get(student_dashboard))
        .merge(ai_routes)
}
