use diesel::prelude::*;
use std::collections::HashMap;
use uuid::Uuid;

use super::auth::ensure_course_owner;
use super::courses::load_course;
use super::error::LearnResult;
use super::types::*;
use super::LearnEngine;
use crate::core::shared::schema::learn::*;

const TOP_MISSED: usize = 5;

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn mean(values: &[i32]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sum: i64 = values.iter().map(|&v| i64::from(v)).sum();
    round1(sum as f64 / values.len() as f64)
}

/// Percentage of `hits` in `total`, one decimal
pub fn rate(hits: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round1(hits as f64 / total as f64 * 100.0)
}

/// Most frequently missed questions, ties broken by quiz then question index
pub fn most_missed(rows: Vec<(Uuid, i32, String)>, limit: usize) -> Vec<MissedQuestion> {
    let mut counts: HashMap<(Uuid, i32), (String, i64)> = HashMap::new();
    for (quiz_id, question_index, question) in rows {
        let entry = counts
            .entry((quiz_id, question_index))
            .or_insert_with(|| (question, 0));
        entry.1 += 1;
    }

    let mut missed: Vec<MissedQuestion> = counts
        .into_iter()
        .map(|((quiz_id, question_index), (question, miss_count))| MissedQuestion {
            quiz_id,
            question_index,
            question,
            miss_count,
        })
        .collect();

    missed.sort_by(|a, b| {
        b.miss_count
            .cmp(&a.miss_count)
            .then(a.quiz_id.cmp(&b.quiz_id))
            .then(a.question_index.cmp(&b.question_index))
    });
    missed.truncate(limit);
    missed
}

impl LearnEngine {
    // ----- Statistics -----

    pub fn course_analytics(&self, user: &User, course_id: Uuid) -> LearnResult<CourseAnalytics> {
        let mut conn = self.conn()?;
        let course = load_course(&mut conn, course_id)?;
        ensure_course_owner(user, &course)?;

        let enrollment_rows: Vec<(i32, String)> = enrollments::table
            .filter(enrollments::course_id.eq(course_id))
            .select((enrollments::progress, enrollments::status))
            .load(&mut conn)?;
        let progress: Vec<i32> = enrollment_rows.iter().map(|(p, _)| *p).collect();
        let completed_count = enrollment_rows
            .iter()
            .filter(|(_, status)| EnrollmentStatus::from(status.as_str()) == EnrollmentStatus::Completed)
            .count();

        let quiz_ids: Vec<Uuid> = quizzes::table
            .filter(quizzes::course_id.eq(course_id))
            .select(quizzes::id)
            .load(&mut conn)?;

        let attempt_rows: Vec<(i32, bool)> = quiz_attempts::table
            .filter(quiz_attempts::quiz_id.eq_any(&quiz_ids))
            .select((quiz_attempts::score, quiz_attempts::passed))
            .load(&mut conn)?;
        let scores: Vec<i32> = attempt_rows.iter().map(|(s, _)| *s).collect();
        let passed = attempt_rows.iter().filter(|(_, p)| *p).count();

        let missed_rows: Vec<(Uuid, i32, String)> = misconceptions::table
            .filter(misconceptions::quiz_id.eq_any(&quiz_ids))
            .select((
                misconceptions::quiz_id,
                misconceptions::question_index,
                misconceptions::question,
            ))
            .load(&mut conn)?;

        Ok(CourseAnalytics {
            course_id,
            enrolled_count: enrollment_rows.len() as i64,
            completed_count: completed_count as i64,
            average_progress: mean(&progress),
            attempt_count: attempt_rows.len() as i64,
            pass_rate: rate(passed, attempt_rows.len()),
            average_score: mean(&scores),
            average_rating: course.average_rating,
            review_count: course.review_count,
            most_missed_questions: most_missed(missed_rows, TOP_MISSED),
        })
    }

    pub fn student_dashboard(&self, student: &User) -> LearnResult<StudentDashboard> {
        let mut conn = self.conn()?;

        let enrollment_rows: Vec<(i32, String)> = enrollments::table
            .filter(enrollments::student_id.eq(student.id))
            .select((enrollments::progress, enrollments::status))
            .load(&mut conn)?;
        let progress: Vec<i32> = enrollment_rows.iter().map(|(p, _)| *p).collect();
        let courses_completed = enrollment_rows
            .iter()
            .filter(|(_, status)| EnrollmentStatus::from(status.as_str()) == EnrollmentStatus::Completed)
            .count();

        let scores: Vec<i32> = quiz_attempts::table
            .filter(quiz_attempts::student_id.eq(student.id))
            .select(quiz_attempts::score)
            .load(&mut conn)?;

        let remedial_items: i64 = remedial_contents::table
            .filter(remedial_contents::student_id.eq(student.id))
            .count()
            .get_result(&mut conn)?;

        Ok(StudentDashboard {
            courses_enrolled: enrollment_rows.len() as i64,
            courses_completed: courses_completed as i64,
            average_progress: mean(&progress),
            quiz_attempts: scores.len() as i64,
            average_quiz_score: mean(&scores),
            remedial_items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_rate() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[50, 100, 75]), 75.0);
        assert_eq!(mean(&[33, 34]), 33.5);
        assert_eq!(mean(&[10, 20, 20]), 16.7);

        assert_eq!(rate(0, 0), 0.0);
        assert_eq!(rate(1, 3), 33.3);
        assert_eq!(rate(4, 4), 100.0);
    }

    #[test]
    fn test_most_missed_ranks_and_limits() {
        let quiz = Uuid::from_u128(1);
        let other = Uuid::from_u128(2);
        let mut rows = Vec::new();
        for _ in 0..3 {
            rows.push((quiz, 2, "Q3".to_string()));
        }
        rows.push((quiz, 0, "Q1".to_string()));
        rows.push((other, 0, "Other Q1".to_string()));
        rows.push((other, 0, "Other Q1".to_string()));
        for i in 5..10 {
            rows.push((other, i, format!("Q{i}")));
        }

        let top = most_missed(rows, 3);
        assert_eq!(top.len(), 3);
        assert_eq!((top[0].question.as_str(), top[0].miss_count), ("Q3", 3));
        assert_eq!((top[1].question.as_str(), top[1].miss_count), ("Other Q1", 2));
        // Single misses tie; the lower quiz id wins
        assert_eq!((top[2].quiz_id, top[2].question_index), (quiz, 0));
    }
}
