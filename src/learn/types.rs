//! Types for the Learn module
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::shared::schema::learn::*;

// ============================================================================
// DATA MODELS
// ============================================================================

// ----- User Models -----

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub image_url: Option<String>,
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Student,
    Instructor,
    Admin,
}

impl From<&str> for UserRole {
    fn from(s: &str) -> Self {
        match s {
            "instructor" => Self::Instructor,
            "admin" => Self::Admin,
            _ => Self::Student,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Student => write!(f, "student"),
            Self::Instructor => write!(f, "instructor"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl User {
    pub fn role(&self) -> UserRole {
        UserRole::from(self.role.as_str())
    }

    pub fn is_admin(&self) -> bool {
        self.role() == UserRole::Admin
    }

    pub fn can_teach(&self) -> bool {
        matches!(self.role(), UserRole::Instructor | UserRole::Admin)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub role: Option<UserRole>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub image_url: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub image_url: Option<String>,
    pub bio: Option<String>,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            image_url: user.image_url,
            bio: user.bio,
        }
    }
}

// ----- Course Models -----

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = courses)]
pub struct Course {
    pub id: Uuid,
    pub instructor_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub level: String,
    pub thumbnail_url: Option<String>,
    pub price_cents: i32,
    pub is_published: bool,
    pub average_rating: f64,
    pub review_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const COURSE_LEVELS: [&str; 3] = ["beginner", "intermediate", "advanced"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCourseRequest {
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub level: Option<String>,
    pub thumbnail_url: Option<String>,
    pub price_cents: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCourseRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub level: Option<String>,
    pub thumbnail_url: Option<String>,
    pub price_cents: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    pub published: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourseFilters {
    pub category: Option<String>,
    pub level: Option<String>,
    pub search: Option<String>,
    pub instructor_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LectureSummary {
    pub id: Uuid,
    pub title: String,
    pub position: i32,
    pub duration_minutes: i32,
    pub is_free_preview: bool,
    pub has_quiz: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseDetailResponse {
    pub course: Course,
    pub instructor: UserSummary,
    pub lectures: Vec<LectureSummary>,
    pub total_duration_minutes: i32,
}

// ----- Lecture Models -----

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = lectures)]
pub struct Lecture {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub content: Option<String>,
    pub video_url: Option<String>,
    pub duration_minutes: i32,
    pub position: i32,
    pub is_free_preview: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLectureRequest {
    pub title: String,
    pub content: Option<String>,
    pub video_url: Option<String>,
    pub duration_minutes: Option<i32>,
    pub is_free_preview: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateLectureRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub video_url: Option<String>,
    pub duration_minutes: Option<i32>,
    pub is_free_preview: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderLecturesRequest {
    pub lecture_ids: Vec<Uuid>,
}

// ----- Quiz Models -----

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = quizzes)]
pub struct Quiz {
    pub id: Uuid,
    pub lecture_id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub passing_score: i32,
    pub questions: serde_json::Value,
    pub is_ai_generated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer_index: usize,
    #[serde(default)]
    pub explanation: Option<String>,
}

pub const DEFAULT_PASSING_SCORE: i32 = 70;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateQuizRequest {
    pub title: Option<String>,
    pub passing_score: Option<i32>,
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateQuizRequest {
    pub title: Option<String>,
    pub passing_score: Option<i32>,
    pub questions: Option<Vec<QuizQuestion>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateQuizRequest {
    pub num_questions: Option<usize>,
    pub passing_score: Option<i32>,
}

/// A question as shown to a viewer; answers are hidden from students
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionView {
    pub question: String,
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizView {
    pub id: Uuid,
    pub lecture_id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub passing_score: i32,
    pub is_ai_generated: bool,
    pub questions: Vec<QuestionView>,
}

// ----- Attempt Models -----

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = quiz_attempts)]
pub struct QuizAttempt {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub student_id: Uuid,
    pub answers: serde_json::Value,
    pub correct_count: i32,
    pub total_questions: i32,
    pub score: i32,
    pub passed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedAnswer {
    pub question_index: usize,
    /// Signed so that garbage input grades as incorrect instead of failing to parse
    pub selected_answer_index: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAttemptRequest {
    pub answers: Vec<SubmittedAnswer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedQuestion {
    pub question_index: usize,
    pub question: String,
    pub selected_answer_index: Option<i64>,
    pub correct_answer_index: usize,
    pub is_correct: bool,
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptResult {
    pub attempt: QuizAttempt,
    pub passing_score: i32,
    pub breakdown: Vec<GradedQuestion>,
    pub misconceptions_recorded: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptHistory {
    pub attempts: Vec<QuizAttempt>,
    pub best_attempt: Option<QuizAttempt>,
}

// ----- Enrollment Models -----

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = enrollments)]
pub struct Enrollment {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub completed_lectures: Vec<Uuid>,
    pub progress: i32,
    pub status: String,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_accessed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Completed,
}

impl From<&str> for EnrollmentStatus {
    fn from(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            _ => Self::Active,
        }
    }
}

impl std::fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentWithCourse {
    pub enrollment: Enrollment,
    pub course: Course,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub enrollment: Enrollment,
    pub student_name: String,
    pub student_email: String,
}

// ----- Review Models -----

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = course_reviews)]
pub struct CourseReview {
    pub id: Uuid,
    pub course_id: Uuid,
    pub student_id: Uuid,
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReviewRequest {
    pub rating: i32,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateReviewRequest {
    pub rating: Option<i32>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewWithAuthor {
    pub review: CourseReview,
    pub student_name: String,
    pub student_image_url: Option<String>,
}

// ----- Remediation Models -----

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = misconceptions)]
pub struct Misconception {
    pub id: Uuid,
    pub student_id: Uuid,
    pub quiz_id: Uuid,
    pub attempt_id: Uuid,
    pub lecture_id: Uuid,
    pub question_index: i32,
    pub question: String,
    pub selected_answer: Option<String>,
    pub correct_answer: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = remedial_contents)]
pub struct RemedialContent {
    pub id: Uuid,
    pub student_id: Uuid,
    pub quiz_id: Uuid,
    pub attempt_id: Uuid,
    pub lecture_id: Uuid,
    pub content: String,
    pub misconception_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemedialFilters {
    pub course_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MisconceptionFilters {
    pub quiz_id: Option<Uuid>,
}

// ----- Statistics -----

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MissedQuestion {
    pub quiz_id: Uuid,
    pub question_index: i32,
    pub question: String,
    pub miss_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseAnalytics {
    pub course_id: Uuid,
    pub enrolled_count: i64,
    pub completed_count: i64,
    pub average_progress: f64,
    pub attempt_count: i64,
    pub pass_rate: f64,
    pub average_score: f64,
    pub average_rating: f64,
    pub review_count: i32,
    pub most_missed_questions: Vec<MissedQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentDashboard {
    pub courses_enrolled: i64,
    pub courses_completed: i64,
    pub average_progress: f64,
    pub quiz_attempts: i64,
    pub average_quiz_score: f64,
    pub remedial_items: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_role_conversion() {
        assert_eq!(UserRole::from("student"), UserRole::Student);
        assert_eq!(UserRole::from("instructor"), UserRole::Instructor);
        assert_eq!(UserRole::from("admin"), UserRole::Admin);
        assert_eq!(UserRole::from("unknown"), UserRole::Student);
        assert_eq!(UserRole::Instructor.to_string(), "instructor");
    }

    #[test]
    fn test_enrollment_status_round_trip() {
        for status in [EnrollmentStatus::Active, EnrollmentStatus::Completed] {
            assert_eq!(EnrollmentStatus::from(status.to_string().as_str()), status);
        }
    }

    #[test]
    fn test_question_view_hides_absent_answers() {
        let view = QuestionView {
            question: "2 + 2?".into(),
            options: vec!["3".into(), "4".into()],
            correct_answer_index: None,
            explanation: None,
        };
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("correct_answer_index").is_none());
        assert!(json.get("explanation").is_none());
    }

    #[test]
    fn test_quiz_question_explanation_optional() {
        let q: QuizQuestion = serde_json::from_str(
            r#"{"question": "Q", "options": ["a", "b"], "correct_answer_index": 1}"#,
        )
        .unwrap();
        assert_eq!(q.correct_answer_index, 1);
        assert!(q.explanation.is_none());
    }
}
