//! Remedial content built from a student's recorded misconceptions.

use chrono::Utc;
use diesel::prelude::*;
use log::{info, warn};
use uuid::Uuid;

use super::courses::load_course;
use super::error::{LearnError, LearnResult};
use super::lectures::load_lecture;
use super::prompts::{remedial_messages, RemedialItem};
use super::quizzes::{load_quiz, quiz_questions};
use super::types::*;
use super::{with_engine, LearnEngine};
use crate::core::shared::schema::learn::*;
use crate::core::shared::state::AppState;
use crate::llm::{GenerationOptions, LlmError};

/// Everything the tutor prompt needs for one attempt
#[derive(Debug, Clone)]
pub struct RemedialContext {
    pub attempt: QuizAttempt,
    pub course_title: String,
    pub lecture: Lecture,
    pub misconceptions: Vec<Misconception>,
    pub items: Vec<RemedialItem>,
}

#[derive(Debug, Clone)]
pub enum RemedialSource {
    Existing(RemedialContent),
    Needed(Box<RemedialContext>),
}

/// Pair each misconception with its question's explanation, if the quiz
/// still has that question
pub fn remedial_items(misconceptions: &[Misconception], questions: &[QuizQuestion]) -> Vec<RemedialItem> {
    misconceptions
        .iter()
        .map(|m| RemedialItem {
            question: m.question.clone(),
            selected_answer: m.selected_answer.clone(),
            correct_answer: m.correct_answer.clone(),
            explanation: usize::try_from(m.question_index)
                .ok()
                .and_then(|idx| questions.get(idx))
                .filter(|q| q.question == m.question)
                .and_then(|q| q.explanation.clone()),
        })
        .collect()
}

impl LearnEngine {
    // ----- Remediation Operations -----

    pub fn remedial_source(&self, student: &User, attempt_id: Uuid) -> LearnResult<RemedialSource> {
        let mut conn = self.conn()?;

        let attempt: QuizAttempt = quiz_attempts::table
            .filter(quiz_attempts::id.eq(attempt_id))
            .first::<QuizAttempt>(&mut conn)
            .optional()?
            .filter(|a| a.student_id == student.id)
            .ok_or_else(|| LearnError::not_found("Attempt"))?;

        if let Some(existing) = remedial_contents::table
            .filter(remedial_contents::attempt_id.eq(attempt_id))
            .first::<RemedialContent>(&mut conn)
            .optional()?
        {
            return Ok(RemedialSource::Existing(existing));
        }

        let wrong: Vec<Misconception> = misconceptions::table
            .filter(misconceptions::attempt_id.eq(attempt_id))
            .order(misconceptions::question_index.asc())
            .load(&mut conn)?;
        if wrong.is_empty() {
            return Err(LearnError::validation(
                "This attempt has no wrong answers to review",
            ));
        }

        let quiz = load_quiz(&mut conn, attempt.quiz_id)?;
        let lecture = load_lecture(&mut conn, quiz.lecture_id)?;
        let course = load_course(&mut conn, quiz.course_id)?;
        let items = remedial_items(&wrong, &quiz_questions(&quiz)?);

        Ok(RemedialSource::Needed(Box::new(RemedialContext {
            attempt,
            course_title: course.title,
            lecture,
            misconceptions: wrong,
            items,
        })))
    }

    /// Store generated content; a concurrent request that already stored
    /// content for the attempt wins
    pub fn store_remedial(&self, context: &RemedialContext, content: String) -> LearnResult<RemedialContent> {
        let mut conn = self.conn()?;

        let remedial = RemedialContent {
            id: Uuid::new_v4(),
            student_id: context.attempt.student_id,
            quiz_id: context.attempt.quiz_id,
            attempt_id: context.attempt.id,
            lecture_id: context.lecture.id,
            content,
            misconception_ids: context.misconceptions.iter().map(|m| m.id).collect(),
            created_at: Utc::now(),
        };

        match diesel::insert_into(remedial_contents::table)
            .values(&remedial)
            .execute(&mut conn)
            .map_err(LearnError::from)
        {
            Ok(_) => {
                info!(
                    "Stored remedial content {} for attempt {}",
                    remedial.id, remedial.attempt_id
                );
                Ok(remedial)
            }
            Err(LearnError::Duplicate(_)) => Ok(remedial_contents::table
                .filter(remedial_contents::attempt_id.eq(context.attempt.id))
                .first::<RemedialContent>(&mut conn)?),
            Err(e) => Err(e),
        }
    }

    pub fn list_remedial_content(
        &self,
        student: &User,
        filters: RemedialFilters,
    ) -> LearnResult<Vec<RemedialContent>> {
        let mut conn = self.conn()?;

        let mut query = remedial_contents::table
            .filter(remedial_contents::student_id.eq(student.id))
            .into_boxed();

        if let Some(course_id) = filters.course_id {
            let quiz_ids: Vec<Uuid> = quizzes::table
                .filter(quizzes::course_id.eq(course_id))
                .select(quizzes::id)
                .load(&mut conn)?;
            query = query.filter(remedial_contents::quiz_id.eq_any(quiz_ids));
        }

        Ok(query
            .order(remedial_contents::created_at.desc())
            .load::<RemedialContent>(&mut conn)?)
    }

    pub fn list_misconceptions(
        &self,
        student: &User,
        filters: MisconceptionFilters,
    ) -> LearnResult<Vec<Misconception>> {
        let mut conn = self.conn()?;

        let mut query = misconceptions::table
            .filter(misconceptions::student_id.eq(student.id))
            .into_boxed();
        if let Some(quiz_id) = filters.quiz_id {
            query = query.filter(misconceptions::quiz_id.eq(quiz_id));
        }

        Ok(query
            .order(misconceptions::created_at.desc())
            .load::<Misconception>(&mut conn)?)
    }
}

/// Content for an attempt's wrong answers; generated once, then served from storage
pub async fn generate_remedial_content(
    state: &AppState,
    student: User,
    attempt_id: Uuid,
) -> LearnResult<RemedialContent> {
    let source = with_engine(state, move |engine| engine.remedial_source(&student, attempt_id)).await?;

    let context = match source {
        RemedialSource::Existing(content) => return Ok(content),
        RemedialSource::Needed(context) => *context,
    };

    let messages = remedial_messages(
        &context.course_title,
        &context.lecture.title,
        context.lecture.content.as_deref(),
        &context.items,
    );
    let content = state
        .llm_provider
        .generate(&messages, &GenerationOptions::default())
        .await
        .inspect_err(|e| warn!("Remedial generation for attempt {} failed: {}", attempt_id, e))?;

    let content = content.trim().to_string();
    if content.is_empty() {
        return Err(LlmError::EmptyResponse.into());
    }

    with_engine(state, move |engine| engine.store_remedial(&context, content)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn misconception(question_index: i32, question: &str) -> Misconception {
        Misconception {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            quiz_id: Uuid::new_v4(),
            attempt_id: Uuid::new_v4(),
            lecture_id: Uuid::new_v4(),
            question_index,
            question: question.into(),
            selected_answer: Some("Wrong".into()),
            correct_answer: "Right".into(),
            created_at: Utc::now(),
        }
    }

    fn question(text: &str, explanation: Option<&str>) -> QuizQuestion {
        QuizQuestion {
            question: text.into(),
            options: vec!["Wrong".into(), "Right".into()],
            correct_answer_index: 1,
            explanation: explanation.map(String::from),
        }
    }

    #[test]
    fn test_remedial_items_attach_explanations() {
        let questions = vec![question("Q1", Some("E1")), question("Q2", None)];
        let items = remedial_items(&[misconception(0, "Q1"), misconception(1, "Q2")], &questions);

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].explanation.as_deref(), Some("E1"));
        assert_eq!(items[0].selected_answer.as_deref(), Some("Wrong"));
        assert_eq!(items[0].correct_answer, "Right");
        assert_eq!(items[1].explanation, None);
    }

    #[test]
    fn test_remedial_items_skip_explanations_after_quiz_edit() {
        // Question 0 was rewritten after the attempt, index 5 no longer exists
        let questions = vec![question("Rewritten", Some("New"))];
        let items = remedial_items(&[misconception(0, "Q1"), misconception(5, "Q6")], &questions);

        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.explanation.is_none()));
        assert_eq!(items[1].question, "Q6");
    }
}
