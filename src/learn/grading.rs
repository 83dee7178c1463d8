//! Quiz attempt scoring.
//!
//! Grading is pure: it takes the stored question set and the submitted
//! answers and produces the score plus a per-question breakdown. Storage of
//! the attempt and its misconceptions happens in [`super::quizzes`].

use std::collections::HashMap;

use super::error::{LearnError, LearnResult};
use super::types::{GradedQuestion, QuizQuestion, SubmittedAnswer};

#[derive(Debug, Clone, PartialEq)]
pub struct GradeOutcome {
    pub correct_count: usize,
    pub total_questions: usize,
    pub score: i32,
    pub passed: bool,
    pub breakdown: Vec<GradedQuestion>,
}

impl GradeOutcome {
    pub fn incorrect(&self) -> impl Iterator<Item = &GradedQuestion> {
        self.breakdown.iter().filter(|q| !q.is_correct)
    }
}

/// `round(correct / total * 100)`, halves rounding up
pub fn score_percentage(correct: usize, total: usize) -> i32 {
    if total == 0 {
        return 0;
    }
    ((correct.min(total) as f64 / total as f64) * 100.0).round() as i32
}

pub fn grade(
    questions: &[QuizQuestion],
    answers: &[SubmittedAnswer],
    passing_score: i32,
) -> LearnResult<GradeOutcome> {
    if questions.is_empty() {
        return Err(LearnError::validation("This quiz has no questions"));
    }

    let mut selections: HashMap<usize, Option<i64>> = HashMap::with_capacity(answers.len());
    for answer in answers {
        if answer.question_index >= questions.len() {
            return Err(LearnError::validation(format!(
                "Question index {} is out of range",
                answer.question_index
            )));
        }
        if selections
            .insert(answer.question_index, answer.selected_answer_index)
            .is_some()
        {
            return Err(LearnError::validation(format!(
                "Question {} was answered more than once",
                answer.question_index
            )));
        }
    }

    let breakdown: Vec<GradedQuestion> = questions
        .iter()
        .enumerate()
        .map(|(idx, question)| {
            let selected = selections.get(&idx).copied().flatten();
            let is_correct = selected
                .and_then(|s| usize::try_from(s).ok())
                .is_some_and(|s| s < question.options.len() && s == question.correct_answer_index);

            GradedQuestion {
                question_index: idx,
                question: question.question.clone(),
                selected_answer_index: selected,
                correct_answer_index: question.correct_answer_index,
                is_correct,
                explanation: question.explanation.clone(),
            }
        })
        .collect();

    let correct_count = breakdown.iter().filter(|q| q.is_correct).count();
    let score = score_percentage(correct_count, questions.len());

    Ok(GradeOutcome {
        correct_count,
        total_questions: questions.len(),
        score,
        passed: score >= passing_score,
        breakdown,
    })
}

/// Text of the option a student picked, if the selection points at one
pub fn selected_option_text(question: &QuizQuestion, selected: Option<i64>) -> Option<String> {
    selected
        .and_then(|s| usize::try_from(s).ok())
        .and_then(|s| question.options.get(s))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(correct: usize) -> QuizQuestion {
        QuizQuestion {
            question: format!("Pick option {correct}"),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_answer_index: correct,
            explanation: Some("Because".into()),
        }
    }

    fn answer(question_index: usize, selected: i64) -> SubmittedAnswer {
        SubmittedAnswer {
            question_index,
            selected_answer_index: Some(selected),
        }
    }

    #[test]
    fn test_all_correct() {
        let questions = vec![question(0), question(2)];
        let outcome = grade(&questions, &[answer(0, 0), answer(1, 2)], 70).unwrap();
        assert_eq!(outcome.correct_count, 2);
        assert_eq!(outcome.score, 100);
        assert!(outcome.passed);
        assert_eq!(outcome.incorrect().count(), 0);
    }

    #[test]
    fn test_score_rounds_half_up() {
        // 1 of 8 = 12.5%
        let questions: Vec<_> = (0..8).map(|_| question(1)).collect();
        let outcome = grade(&questions, &[answer(0, 1)], 70).unwrap();
        assert_eq!(outcome.score, 13);

        assert_eq!(score_percentage(2, 3), 67);
        assert_eq!(score_percentage(1, 3), 33);
    }

    #[test]
    fn test_pass_at_exact_threshold() {
        let questions: Vec<_> = (0..10).map(|_| question(3)).collect();
        let answers: Vec<_> = (0..7).map(|i| answer(i, 3)).collect();
        let outcome = grade(&questions, &answers, 70).unwrap();
        assert_eq!(outcome.score, 70);
        assert!(outcome.passed);

        let outcome = grade(&questions, &answers[..6], 70).unwrap();
        assert_eq!(outcome.score, 60);
        assert!(!outcome.passed);
    }

    #[test]
    fn test_unanswered_and_out_of_range_are_incorrect() {
        let questions = vec![question(0), question(1), question(2)];
        let answers = vec![
            SubmittedAnswer {
                question_index: 0,
                selected_answer_index: None,
            },
            answer(1, 9),
            answer(2, -1),
        ];
        let outcome = grade(&questions, &answers, 50).unwrap();
        assert_eq!(outcome.correct_count, 0);
        assert_eq!(outcome.score, 0);
        assert_eq!(outcome.incorrect().count(), 3);
    }

    #[test]
    fn test_missing_answers_count_against_total() {
        let questions = vec![question(0), question(0), question(0), question(0)];
        let outcome = grade(&questions, &[answer(2, 0)], 70).unwrap();
        assert_eq!(outcome.total_questions, 4);
        assert_eq!(outcome.score, 25);
        assert!(outcome.breakdown[2].is_correct);
        assert_eq!(outcome.breakdown[0].selected_answer_index, None);
    }

    #[test]
    fn test_rejects_bad_question_indexes() {
        let questions = vec![question(0)];
        assert!(matches!(
            grade(&questions, &[answer(1, 0)], 70),
            Err(LearnError::Validation(_))
        ));
        assert!(matches!(
            grade(&questions, &[answer(0, 0), answer(0, 1)], 70),
            Err(LearnError::Validation(_))
        ));
    }

    #[test]
    fn test_empty_quiz_cannot_be_graded() {
        assert!(matches!(grade(&[], &[], 70), Err(LearnError::Validation(_))));
    }

    #[test]
    fn test_breakdown_reveals_answers() {
        let outcome = grade(&[question(2)], &[answer(0, 1)], 70).unwrap();
        let graded = &outcome.breakdown[0];
        assert_eq!(graded.correct_answer_index, 2);
        assert_eq!(graded.explanation.as_deref(), Some("Because"));
        assert!(!graded.is_correct);
    }

    #[test]
    fn test_selected_option_text() {
        let q = question(0);
        assert_eq!(selected_option_text(&q, Some(1)).as_deref(), Some("b"));
        assert_eq!(selected_option_text(&q, Some(7)), None);
        assert_eq!(selected_option_text(&q, Some(-2)), None);
        assert_eq!(selected_option_text(&q, None), None);
    }
}
