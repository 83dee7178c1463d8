use chrono::Utc;
use diesel::prelude::*;
use diesel::PgConnection;
use log::{info, warn};
use uuid::Uuid;

use super::auth::ensure_course_owner;
use super::courses::{load_course, validate_title};
use super::error::{LearnError, LearnResult};
use super::grading::{grade, selected_option_text};
use super::lectures::{can_view_content, is_enrolled, load_lecture};
use super::prompts::{
    clamp_question_count, parse_generated_questions, quiz_generation_messages,
    quiz_generation_options,
};
use super::types::*;
use super::{with_engine, LearnEngine};
use crate::core::shared::state::AppState;
use crate::core::shared::schema::learn::*;

pub const MAX_QUESTIONS: usize = 50;
const MIN_OPTIONS: usize = 2;
const MAX_OPTIONS: usize = 6;

pub(crate) fn validate_questions(questions: &[QuizQuestion]) -> LearnResult<()> {
    if questions.is_empty() || questions.len() > MAX_QUESTIONS {
        return Err(LearnError::validation(format!(
            "A quiz needs between 1 and {MAX_QUESTIONS} questions"
        )));
    }

    for (idx, q) in questions.iter().enumerate() {
        let n = idx + 1;
        if q.question.trim().is_empty() {
            return Err(LearnError::validation(format!("Question {n} has no text")));
        }
        if !(MIN_OPTIONS..=MAX_OPTIONS).contains(&q.options.len()) {
            return Err(LearnError::validation(format!(
                "Question {n} needs between {MIN_OPTIONS} and {MAX_OPTIONS} options"
            )));
        }
        if q.options.iter().any(|o| o.trim().is_empty()) {
            return Err(LearnError::validation(format!("Question {n} has an empty option")));
        }
        if q.correct_answer_index >= q.options.len() {
            return Err(LearnError::validation(format!(
                "Question {n} marks a correct answer that is not one of its options"
            )));
        }
    }
    Ok(())
}

fn validate_passing_score(score: i32) -> LearnResult<i32> {
    if !(0..=100).contains(&score) {
        return Err(LearnError::validation("Passing score must be between 0 and 100"));
    }
    Ok(score)
}

pub(crate) fn quiz_questions(quiz: &Quiz) -> LearnResult<Vec<QuizQuestion>> {
    serde_json::from_value(quiz.questions.clone())
        .map_err(|e| LearnError::Internal(format!("Stored questions of quiz {} are invalid: {e}", quiz.id)))
}

pub(crate) fn load_quiz(conn: &mut PgConnection, quiz_id: Uuid) -> LearnResult<Quiz> {
    quizzes::table
        .filter(quizzes::id.eq(quiz_id))
        .first::<Quiz>(conn)
        .optional()?
        .ok_or_else(|| LearnError::not_found("Quiz"))
}

/// Shape a quiz for a viewer, with or without the answer key
pub fn quiz_view(quiz: &Quiz, questions: Vec<QuizQuestion>, reveal_answers: bool) -> QuizView {
    QuizView {
        id: quiz.id,
        lecture_id: quiz.lecture_id,
        course_id: quiz.course_id,
        title: quiz.title.clone(),
        passing_score: quiz.passing_score,
        is_ai_generated: quiz.is_ai_generated,
        questions: questions
            .into_iter()
            .map(|q| QuestionView {
                question: q.question,
                options: q.options,
                correct_answer_index: reveal_answers.then_some(q.correct_answer_index),
                explanation: if reveal_answers { q.explanation } else { None },
            })
            .collect(),
    }
}

/// `best_attempt` is the highest score, earliest attempt on ties
pub fn best_attempt(attempts: &[QuizAttempt]) -> Option<&QuizAttempt> {
    attempts
        .iter()
        .reduce(|best, a| {
            if a.score > best.score || (a.score == best.score && a.created_at < best.created_at) {
                a
            } else {
                best
            }
        })
}

impl LearnEngine {
    // ----- Quiz Operations -----

    fn insert_quiz(
        &self,
        user: &User,
        lecture_id: Uuid,
        title: Option<String>,
        passing_score: Option<i32>,
        questions: Vec<QuizQuestion>,
        is_ai_generated: bool,
    ) -> LearnResult<Quiz> {
        validate_questions(&questions)?;
        let passing_score = validate_passing_score(passing_score.unwrap_or(DEFAULT_PASSING_SCORE))?;

        let mut conn = self.conn()?;
        let lecture = load_lecture(&mut conn, lecture_id)?;
        let course = load_course(&mut conn, lecture.course_id)?;
        ensure_course_owner(user, &course)?;

        let title = match title.filter(|t| !t.trim().is_empty()) {
            Some(t) => validate_title(&t)?,
            None => format!("{} Quiz", lecture.title),
        };

        let now = Utc::now();
        let quiz = Quiz {
            id: Uuid::new_v4(),
            lecture_id,
            course_id: course.id,
            title,
            passing_score,
            questions: serde_json::to_value(&questions)?,
            is_ai_generated,
            created_at: now,
            updated_at: now,
        };

        diesel::insert_into(quizzes::table)
            .values(&quiz)
            .execute(&mut conn)
            .map_err(|e| match LearnError::from(e) {
                LearnError::Duplicate(_) => {
                    LearnError::Duplicate("This lecture already has a quiz".into())
                }
                other => other,
            })?;

        info!(
            "Quiz {} ({} questions{}) created for lecture {}",
            quiz.id,
            questions.len(),
            if is_ai_generated { ", AI" } else { "" },
            lecture_id
        );
        Ok(quiz)
    }

    pub fn create_quiz(&self, user: &User, lecture_id: Uuid, req: CreateQuizRequest) -> LearnResult<Quiz> {
        self.insert_quiz(user, lecture_id, req.title, req.passing_score, req.questions, false)
    }

    /// Lecture to generate from, after ownership and duplicate checks
    pub fn quiz_generation_source(&self, user: &User, lecture_id: Uuid) -> LearnResult<Lecture> {
        let mut conn = self.conn()?;
        let lecture = load_lecture(&mut conn, lecture_id)?;
        let course = load_course(&mut conn, lecture.course_id)?;
        ensure_course_owner(user, &course)?;

        let existing: i64 = quizzes::table
            .filter(quizzes::lecture_id.eq(lecture_id))
            .count()
            .get_result(&mut conn)?;
        if existing > 0 {
            return Err(LearnError::Duplicate("This lecture already has a quiz".into()));
        }
        Ok(lecture)
    }

    pub fn get_quiz_for_lecture(&self, viewer: &User, lecture_id: Uuid) -> LearnResult<QuizView> {
        let mut conn = self.conn()?;
        let lecture = load_lecture(&mut conn, lecture_id)?;
        let course = load_course(&mut conn, lecture.course_id)?;

        let quiz: Quiz = quizzes::table
            .filter(quizzes::lecture_id.eq(lecture_id))
            .first::<Quiz>(&mut conn)
            .optional()?
            .ok_or_else(|| LearnError::not_found("Quiz"))?;

        let is_owner = ensure_course_owner(viewer, &course).is_ok();
        if !is_owner && !can_view_content(&mut conn, Some(viewer), &course, &lecture)? {
            return Err(LearnError::forbidden("Enroll in the course to take this quiz"));
        }

        let questions = quiz_questions(&quiz)?;
        Ok(quiz_view(&quiz, questions, is_owner))
    }

    pub fn update_quiz(&self, user: &User, quiz_id: Uuid, req: UpdateQuizRequest) -> LearnResult<Quiz> {
        let mut conn = self.conn()?;
        let mut quiz = load_quiz(&mut conn, quiz_id)?;
        let course = load_course(&mut conn, quiz.course_id)?;
        ensure_course_owner(user, &course)?;

        if let Some(title) = req.title {
            quiz.title = validate_title(&title)?;
        }
        if let Some(score) = req.passing_score {
            quiz.passing_score = validate_passing_score(score)?;
        }
        if let Some(questions) = req.questions {
            validate_questions(&questions)?;
            quiz.questions = serde_json::to_value(&questions)?;
        }
        quiz.updated_at = Utc::now();

        diesel::update(quizzes::table.filter(quizzes::id.eq(quiz_id)))
            .set((
                quizzes::title.eq(&quiz.title),
                quizzes::passing_score.eq(quiz.passing_score),
                quizzes::questions.eq(&quiz.questions),
                quizzes::updated_at.eq(quiz.updated_at),
            ))
            .execute(&mut conn)?;

        info!("Quiz {} updated by {}", quiz_id, user.id);
        Ok(quiz)
    }

    pub fn delete_quiz(&self, user: &User, quiz_id: Uuid) -> LearnResult<()> {
        let mut conn = self.conn()?;
        let quiz = load_quiz(&mut conn, quiz_id)?;
        let course = load_course(&mut conn, quiz.course_id)?;
        ensure_course_owner(user, &course)?;

        conn.transaction::<_, LearnError, _>(|conn| {
            diesel::delete(remedial_contents::table.filter(remedial_contents::quiz_id.eq(quiz_id)))
                .execute(conn)?;
            diesel::delete(misconceptions::table.filter(misconceptions::quiz_id.eq(quiz_id)))
                .execute(conn)?;
            diesel::delete(quiz_attempts::table.filter(quiz_attempts::quiz_id.eq(quiz_id)))
                .execute(conn)?;
            diesel::delete(quizzes::table.filter(quizzes::id.eq(quiz_id))).execute(conn)?;
            Ok(())
        })?;

        info!("Quiz {} deleted by {}", quiz_id, user.id);
        Ok(())
    }

    // ----- Attempt Operations -----

    /// Grade and store an attempt, recording a misconception for every
    /// question the student got wrong
    pub fn submit_attempt(
        &self,
        student: &User,
        quiz_id: Uuid,
        req: SubmitAttemptRequest,
    ) -> LearnResult<AttemptResult> {
        let mut conn = self.conn()?;
        let quiz = load_quiz(&mut conn, quiz_id)?;

        if !is_enrolled(&mut conn, student.id, quiz.course_id)? {
            return Err(LearnError::forbidden("Enroll in the course to take this quiz"));
        }

        let questions = quiz_questions(&quiz)?;
        let outcome = grade(&questions, &req.answers, quiz.passing_score)?;

        let now = Utc::now();
        let attempt = QuizAttempt {
            id: Uuid::new_v4(),
            quiz_id,
            student_id: student.id,
            answers: serde_json::to_value(&req.answers)?,
            correct_count: outcome.correct_count as i32,
            total_questions: outcome.total_questions as i32,
            score: outcome.score,
            passed: outcome.passed,
            created_at: now,
        };

        let recorded: Vec<Misconception> = outcome
            .incorrect()
            .map(|graded| {
                let question = &questions[graded.question_index];
                Misconception {
                    id: Uuid::new_v4(),
                    student_id: student.id,
                    quiz_id,
                    attempt_id: attempt.id,
                    lecture_id: quiz.lecture_id,
                    question_index: graded.question_index as i32,
                    question: question.question.clone(),
                    selected_answer: selected_option_text(question, graded.selected_answer_index),
                    correct_answer: question.options[question.correct_answer_index].clone(),
                    created_at: now,
                }
            })
            .collect();

        conn.transaction::<_, LearnError, _>(|conn| {
            diesel::insert_into(quiz_attempts::table)
                .values(&attempt)
                .execute(conn)?;
            if !recorded.is_empty() {
                diesel::insert_into(misconceptions::table)
                    .values(&recorded)
                    .execute(conn)?;
            }
            Ok(())
        })?;

        info!(
            "Student {} scored {}% on quiz {} ({})",
            student.id,
            attempt.score,
            quiz_id,
            if attempt.passed { "passed" } else { "failed" }
        );

        Ok(AttemptResult {
            attempt,
            passing_score: quiz.passing_score,
            breakdown: outcome.breakdown,
            misconceptions_recorded: recorded.len(),
        })
    }

    pub fn list_attempts(&self, student: &User, quiz_id: Uuid) -> LearnResult<AttemptHistory> {
        let mut conn = self.conn()?;
        load_quiz(&mut conn, quiz_id)?;

        let attempts: Vec<QuizAttempt> = quiz_attempts::table
            .filter(quiz_attempts::quiz_id.eq(quiz_id))
            .filter(quiz_attempts::student_id.eq(student.id))
            .order(quiz_attempts::created_at.desc())
            .load(&mut conn)?;

        let best_attempt = best_attempt(&attempts).cloned();
        Ok(AttemptHistory {
            attempts,
            best_attempt,
        })
    }
}

/// Ask the model for a question set and store it as an AI-generated quiz
pub async fn generate_quiz(
    state: &AppState,
    user: User,
    lecture_id: Uuid,
    req: GenerateQuizRequest,
) -> LearnResult<Quiz> {
    let num_questions = clamp_question_count(req.num_questions)?;
    if let Some(score) = req.passing_score {
        validate_passing_score(score)?;
    }

    let source_user = user.clone();
    let lecture = with_engine(state, move |engine| {
        engine.quiz_generation_source(&source_user, lecture_id)
    })
    .await?;

    let messages = quiz_generation_messages(&lecture.title, lecture.content.as_deref(), num_questions);
    let raw = state
        .llm_provider
        .generate(&messages, &quiz_generation_options())
        .await
        .inspect_err(|e| warn!("Quiz generation for lecture {} failed: {}", lecture_id, e))?;

    let mut questions = parse_generated_questions(&raw)
        .inspect_err(|e| warn!("Unusable quiz output for lecture {}: {}", lecture_id, e))?;
    questions.truncate(num_questions);

    with_engine(state, move |engine| {
        engine.insert_quiz(&user, lecture_id, None, req.passing_score, questions, true)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn question(options: &[&str], correct: usize) -> QuizQuestion {
        QuizQuestion {
            question: "Which one?".into(),
            options: options.iter().map(|o| o.to_string()).collect(),
            correct_answer_index: correct,
            explanation: Some("See lecture".into()),
        }
    }

    fn attempt(score: i32, minutes_ago: i64) -> QuizAttempt {
        QuizAttempt {
            id: Uuid::new_v4(),
            quiz_id: Uuid::nil(),
            student_id: Uuid::nil(),
            answers: serde_json::json!([]),
            correct_count: 0,
            total_questions: 10,
            score,
            passed: score >= 70,
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[test]
    fn test_validate_questions_accepts_valid_set() {
        let questions = vec![question(&["a", "b"], 1), question(&["a", "b", "c", "d", "e", "f"], 5)];
        assert!(validate_questions(&questions).is_ok());
    }

    #[test]
    fn test_validate_questions_rejects_bad_sets() {
        assert!(validate_questions(&[]).is_err());
        assert!(validate_questions(&[question(&["only"], 0)]).is_err());
        assert!(validate_questions(&[question(&["a", "b", "c", "d", "e", "f", "g"], 0)]).is_err());
        assert!(validate_questions(&[question(&["a", "b"], 2)]).is_err());
        assert!(validate_questions(&[question(&["a", " "], 0)]).is_err());

        let mut blank = question(&["a", "b"], 0);
        blank.question = "  ".into();
        assert!(validate_questions(&[blank]).is_err());

        let too_many: Vec<_> = (0..=MAX_QUESTIONS).map(|_| question(&["a", "b"], 0)).collect();
        assert!(validate_questions(&too_many).is_err());
    }

    #[test]
    fn test_validate_passing_score() {
        assert_eq!(validate_passing_score(0).unwrap(), 0);
        assert_eq!(validate_passing_score(100).unwrap(), 100);
        assert!(validate_passing_score(101).is_err());
        assert!(validate_passing_score(-5).is_err());
    }

    #[test]
    fn test_quiz_view_hides_answers_from_students() {
        let questions = vec![question(&["a", "b"], 1)];
        let quiz = Quiz {
            id: Uuid::new_v4(),
            lecture_id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
            title: "Check".into(),
            passing_score: 70,
            questions: serde_json::to_value(&questions).unwrap(),
            is_ai_generated: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let parsed = quiz_questions(&quiz).unwrap();
        assert_eq!(parsed, questions);

        let student = quiz_view(&quiz, parsed.clone(), false);
        assert_eq!(student.questions[0].correct_answer_index, None);
        assert_eq!(student.questions[0].explanation, None);

        let owner = quiz_view(&quiz, parsed, true);
        assert_eq!(owner.questions[0].correct_answer_index, Some(1));
        assert_eq!(owner.questions[0].explanation.as_deref(), Some("See lecture"));
    }

    #[test]
    fn test_best_attempt_prefers_score_then_earliest() {
        assert!(best_attempt(&[]).is_none());

        let attempts = vec![attempt(80, 1), attempt(90, 5), attempt(90, 30), attempt(40, 60)];
        let best = best_attempt(&attempts).unwrap();
        assert_eq!(best.score, 90);
        assert_eq!(best.id, attempts[2].id);
    }
}
