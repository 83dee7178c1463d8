use chrono::Utc;
use diesel::prelude::*;
use diesel::PgConnection;
use log::info;
use uuid::Uuid;

use super::courses::{load_course, lock_course};
use super::error::{LearnError, LearnResult};
use super::lectures::is_enrolled;
use super::types::*;
use super::LearnEngine;
use crate::core::shared::schema::learn::*;

const MAX_COMMENT_CHARS: usize = 2000;

pub fn validate_rating(rating: i32) -> LearnResult<i32> {
    if !(1..=5).contains(&rating) {
        return Err(LearnError::validation("Rating must be between 1 and 5"));
    }
    Ok(rating)
}

fn validate_comment(comment: Option<String>) -> LearnResult<Option<String>> {
    match comment.map(|c| c.trim().to_string()) {
        Some(c) if c.chars().count() > MAX_COMMENT_CHARS => Err(LearnError::validation(format!(
            "Comment must be at most {MAX_COMMENT_CHARS} characters"
        ))),
        Some(c) if c.is_empty() => Ok(None),
        other => Ok(other),
    }
}

/// Mean rating rounded to one decimal and the review count; `(0.0, 0)` for none
pub fn rating_rollup(ratings: &[i32]) -> (f64, i32) {
    if ratings.is_empty() {
        return (0.0, 0);
    }
    let sum: i64 = ratings.iter().map(|&r| i64::from(r)).sum();
    let mean = sum as f64 / ratings.len() as f64;
    ((mean * 10.0).round() / 10.0, ratings.len() as i32)
}

fn refresh_course_rating(conn: &mut PgConnection, course_id: Uuid) -> LearnResult<()> {
    let ratings: Vec<i32> = course_reviews::table
        .filter(course_reviews::course_id.eq(course_id))
        .select(course_reviews::rating)
        .load(conn)?;
    let (average, count) = rating_rollup(&ratings);

    diesel::update(courses::table.filter(courses::id.eq(course_id)))
        .set((
            courses::average_rating.eq(average),
            courses::review_count.eq(count),
        ))
        .execute(conn)?;
    Ok(())
}

fn load_review(conn: &mut PgConnection, review_id: Uuid) -> LearnResult<CourseReview> {
    course_reviews::table
        .filter(course_reviews::id.eq(review_id))
        .first::<CourseReview>(conn)
        .optional()?
        .ok_or_else(|| LearnError::not_found("Review"))
}

fn ensure_review_author(user: &User, review: &CourseReview) -> LearnResult<()> {
    if review.student_id == user.id || user.is_admin() {
        Ok(())
    } else {
        Err(LearnError::forbidden("You can only change your own review"))
    }
}

impl LearnEngine {
    // ----- Review Operations -----

    pub fn create_review(
        &self,
        student: &User,
        course_id: Uuid,
        req: CreateReviewRequest,
    ) -> LearnResult<CourseReview> {
        let rating = validate_rating(req.rating)?;
        let comment = validate_comment(req.comment)?;

        let mut conn = self.conn()?;
        load_course(&mut conn, course_id)?;
        if !is_enrolled(&mut conn, student.id, course_id)? {
            return Err(LearnError::forbidden("Only enrolled students can review a course"));
        }

        let now = Utc::now();
        let review = CourseReview {
            id: Uuid::new_v4(),
            course_id,
            student_id: student.id,
            rating,
            comment,
            created_at: now,
            updated_at: now,
        };

        conn.transaction::<_, LearnError, _>(|conn| {
            lock_course(conn, course_id)?;
            diesel::insert_into(course_reviews::table)
                .values(&review)
                .execute(conn)
                .map_err(|e| match LearnError::from(e) {
                    LearnError::Duplicate(_) => {
                        LearnError::Duplicate("You have already reviewed this course".into())
                    }
                    other => other,
                })?;
            refresh_course_rating(conn, course_id)
        })?;

        info!("Student {} reviewed course {} ({}/5)", student.id, course_id, rating);
        Ok(review)
    }

    pub fn update_review(
        &self,
        user: &User,
        review_id: Uuid,
        req: UpdateReviewRequest,
    ) -> LearnResult<CourseReview> {
        let mut conn = self.conn()?;
        let mut review = load_review(&mut conn, review_id)?;
        ensure_review_author(user, &review)?;

        if let Some(rating) = req.rating {
            review.rating = validate_rating(rating)?;
        }
        if req.comment.is_some() {
            review.comment = validate_comment(req.comment)?;
        }
        review.updated_at = Utc::now();

        conn.transaction::<_, LearnError, _>(|conn| {
            lock_course(conn, review.course_id)?;
            diesel::update(course_reviews::table.filter(course_reviews::id.eq(review_id)))
                .set((
                    course_reviews::rating.eq(review.rating),
                    course_reviews::comment.eq(&review.comment),
                    course_reviews::updated_at.eq(review.updated_at),
                ))
                .execute(conn)?;
            refresh_course_rating(conn, review.course_id)
        })?;

        info!("Review {} updated", review_id);
        Ok(review)
    }

    pub fn delete_review(&self, user: &User, review_id: Uuid) -> LearnResult<()> {
        let mut conn = self.conn()?;
        let review = load_review(&mut conn, review_id)?;
        ensure_review_author(user, &review)?;

        conn.transaction::<_, LearnError, _>(|conn| {
            lock_course(conn, review.course_id)?;
            diesel::delete(course_reviews::table.filter(course_reviews::id.eq(review_id)))
                .execute(conn)?;
            refresh_course_rating(conn, review.course_id)
        })?;

        info!("Review {} deleted by {}", review_id, user.id);
        Ok(())
    }

    pub fn list_reviews(&self, course_id: Uuid) -> LearnResult<Vec<ReviewWithAuthor>> {
        let mut conn = self.conn()?;
        load_course(&mut conn, course_id)?;

        let rows: Vec<(CourseReview, (String, Option<String>))> = course_reviews::table
            .inner_join(users::table.on(users::id.eq(course_reviews::student_id)))
            .filter(course_reviews::course_id.eq(course_id))
            .order(course_reviews::created_at.desc())
            .select((course_reviews::all_columns, (users::name, users::image_url)))
            .load(&mut conn)?;

        Ok(rows
            .into_iter()
            .map(|(review, (student_name, student_image_url))| ReviewWithAuthor {
                review,
                student_name,
                student_image_url,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rating() {
        for rating in 1..=5 {
            assert_eq!(validate_rating(rating).unwrap(), rating);
        }
        assert!(validate_rating(0).is_err());
        assert!(validate_rating(6).is_err());
    }

    #[test]
    fn test_validate_comment() {
        assert_eq!(validate_comment(None).unwrap(), None);
        assert_eq!(validate_comment(Some("  ".into())).unwrap(), None);
        assert_eq!(
            validate_comment(Some(" Great course ".into())).unwrap().as_deref(),
            Some("Great course")
        );
        assert!(validate_comment(Some("x".repeat(MAX_COMMENT_CHARS + 1))).is_err());
    }

    #[test]
    fn test_rating_rollup() {
        assert_eq!(rating_rollup(&[]), (0.0, 0));
        assert_eq!(rating_rollup(&[5]), (5.0, 1));
        assert_eq!(rating_rollup(&[4, 5]), (4.5, 2));
        // 13 / 3 = 4.333...
        assert_eq!(rating_rollup(&[4, 4, 5]), (4.3, 3));
        // 14 / 3 = 4.666...
        assert_eq!(rating_rollup(&[4, 5, 5]), (4.7, 3));
    }

    #[test]
    fn test_review_author_guard() {
        let now = Utc::now();
        let author = Uuid::new_v4();
        let review = CourseReview {
            id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
            student_id: author,
            rating: 4,
            comment: None,
            created_at: now,
            updated_at: now,
        };
        let user = |id: Uuid, role: &str| User {
            id,
            name: "Reviewer".into(),
            email: "r@example.com".into(),
            role: role.into(),
            image_url: None,
            bio: None,
            created_at: now,
            updated_at: now,
        };

        assert!(ensure_review_author(&user(author, "student"), &review).is_ok());
        assert!(ensure_review_author(&user(Uuid::new_v4(), "admin"), &review).is_ok());
        assert!(ensure_review_author(&user(Uuid::new_v4(), "student"), &review).is_err());
    }
}
