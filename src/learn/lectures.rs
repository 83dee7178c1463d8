use chrono::Utc;
use diesel::prelude::*;
use diesel::PgConnection;
use log::info;
use std::collections::HashSet;
use uuid::Uuid;

use super::auth::ensure_course_owner;
use super::courses::{load_course, lock_course, validate_title};
use super::enrollments::recompute_course_progress;
use super::error::{LearnError, LearnResult};
use super::types::*;
use super::LearnEngine;
use crate::core::shared::schema::learn::*;

const MAX_CONTENT_CHARS: usize = 100_000;

fn validate_duration(minutes: i32) -> LearnResult<i32> {
    if !(0..=24 * 60).contains(&minutes) {
        return Err(LearnError::validation("Duration must be between 0 and 1440 minutes"));
    }
    Ok(minutes)
}

fn validate_content(content: Option<String>) -> LearnResult<Option<String>> {
    match content {
        Some(c) if c.chars().count() > MAX_CONTENT_CHARS => Err(LearnError::validation(format!(
            "Lecture content must be at most {MAX_CONTENT_CHARS} characters"
        ))),
        Some(c) if c.trim().is_empty() => Ok(None),
        other => Ok(other),
    }
}

/// Every id in `ordered` must be a lecture of the course, exactly once
pub(crate) fn validate_order(existing: &[Uuid], ordered: &[Uuid]) -> LearnResult<()> {
    let existing_set: HashSet<&Uuid> = existing.iter().collect();
    let ordered_set: HashSet<&Uuid> = ordered.iter().collect();

    if ordered.len() != existing.len() || ordered_set.len() != ordered.len() || existing_set != ordered_set {
        return Err(LearnError::validation(
            "Lecture order must list every lecture of the course exactly once",
        ));
    }
    Ok(())
}

pub(crate) fn load_lecture(conn: &mut PgConnection, lecture_id: Uuid) -> LearnResult<Lecture> {
    lectures::table
        .filter(lectures::id.eq(lecture_id))
        .first::<Lecture>(conn)
        .optional()?
        .ok_or_else(|| LearnError::not_found("Lecture"))
}

pub(crate) fn is_enrolled(conn: &mut PgConnection, student_id: Uuid, course_id: Uuid) -> LearnResult<bool> {
    let count: i64 = enrollments::table
        .filter(enrollments::student_id.eq(student_id))
        .filter(enrollments::course_id.eq(course_id))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

/// Instructor/admin, enrolled student, or a free preview of a published course
pub(crate) fn can_view_content(
    conn: &mut PgConnection,
    viewer: Option<&User>,
    course: &Course,
    lecture: &Lecture,
) -> LearnResult<bool> {
    if let Some(user) = viewer {
        if ensure_course_owner(user, course).is_ok() {
            return Ok(true);
        }
    }
    if !course.is_published {
        return Ok(false);
    }
    if lecture.is_free_preview {
        return Ok(true);
    }
    match viewer {
        Some(user) => is_enrolled(conn, user.id, course.id),
        None => Ok(false),
    }
}

fn renumber(conn: &mut PgConnection, ordered_ids: &[Uuid]) -> LearnResult<()> {
    let now = Utc::now();
    for (idx, lecture_id) in ordered_ids.iter().enumerate() {
        diesel::update(lectures::table.filter(lectures::id.eq(lecture_id)))
            .set((
                lectures::position.eq(idx as i32 + 1),
                lectures::updated_at.eq(now),
            ))
            .execute(conn)?;
    }
    Ok(())
}

impl LearnEngine {
    // ----- Lecture Operations -----

    pub fn create_lecture(
        &self,
        user: &User,
        course_id: Uuid,
        req: CreateLectureRequest,
    ) -> LearnResult<Lecture> {
        let mut conn = self.conn()?;
        let course = load_course(&mut conn, course_id)?;
        ensure_course_owner(user, &course)?;

        let title = validate_title(&req.title)?;
        let content = validate_content(req.content)?;
        let duration_minutes = validate_duration(req.duration_minutes.unwrap_or(0))?;

        let lecture = conn.transaction::<_, LearnError, _>(|conn| {
            lock_course(conn, course_id)?;
            let max_position: Option<i32> = lectures::table
                .filter(lectures::course_id.eq(course_id))
                .select(diesel::dsl::max(lectures::position))
                .first(conn)?;

            let now = Utc::now();
            let lecture = Lecture {
                id: Uuid::new_v4(),
                course_id,
                title,
                content,
                video_url: req.video_url.filter(|u| !u.trim().is_empty()),
                duration_minutes,
                position: max_position.unwrap_or(0) + 1,
                is_free_preview: req.is_free_preview.unwrap_or(false),
                created_at: now,
                updated_at: now,
            };

            diesel::insert_into(lectures::table)
                .values(&lecture)
                .execute(conn)?;

            // A new lecture lowers everyone's completion share
            recompute_course_progress(conn, course_id)?;
            Ok(lecture)
        })?;

        info!("Lecture {} added to course {} at position {}", lecture.id, course_id, lecture.position);
        Ok(lecture)
    }

    /// Lectures in order; content is stripped where the viewer has no access
    pub fn list_lectures(&self, course_id: Uuid, viewer: Option<&User>) -> LearnResult<Vec<Lecture>> {
        let mut conn = self.conn()?;
        let course = load_course(&mut conn, course_id)?;

        let is_owner = viewer.is_some_and(|v| ensure_course_owner(v, &course).is_ok());
        if !course.is_published && !is_owner {
            return Err(LearnError::not_found("Course"));
        }

        let rows: Vec<Lecture> = lectures::table
            .filter(lectures::course_id.eq(course_id))
            .order(lectures::position.asc())
            .load(&mut conn)?;

        let enrolled = match viewer {
            Some(user) if !is_owner => is_enrolled(&mut conn, user.id, course_id)?,
            _ => false,
        };

        Ok(rows
            .into_iter()
            .map(|mut lecture| {
                if !(is_owner || enrolled || lecture.is_free_preview) {
                    lecture.content = None;
                    lecture.video_url = None;
                }
                lecture
            })
            .collect())
    }

    pub fn get_lecture(&self, viewer: &User, lecture_id: Uuid) -> LearnResult<Lecture> {
        let mut conn = self.conn()?;
        let lecture = load_lecture(&mut conn, lecture_id)?;
        let course = load_course(&mut conn, lecture.course_id)?;

        if !can_view_content(&mut conn, Some(viewer), &course, &lecture)? {
            return Err(LearnError::forbidden("Enroll in the course to view this lecture"));
        }

        if viewer.id != course.instructor_id {
            diesel::update(
                enrollments::table
                    .filter(enrollments::student_id.eq(viewer.id))
                    .filter(enrollments::course_id.eq(course.id)),
            )
            .set(enrollments::last_accessed_at.eq(Utc::now()))
            .execute(&mut conn)?;
        }

        Ok(lecture)
    }

    pub fn update_lecture(
        &self,
        user: &User,
        lecture_id: Uuid,
        req: UpdateLectureRequest,
    ) -> LearnResult<Lecture> {
        let mut conn = self.conn()?;
        let mut lecture = load_lecture(&mut conn, lecture_id)?;
        let course = load_course(&mut conn, lecture.course_id)?;
        ensure_course_owner(user, &course)?;

        if let Some(title) = req.title {
            lecture.title = validate_title(&title)?;
        }
        if req.content.is_some() {
            lecture.content = validate_content(req.content)?;
        }
        if let Some(video_url) = req.video_url {
            lecture.video_url = Some(video_url).filter(|u| !u.trim().is_empty());
        }
        if let Some(duration) = req.duration_minutes {
            lecture.duration_minutes = validate_duration(duration)?;
        }
        if let Some(is_free_preview) = req.is_free_preview {
            lecture.is_free_preview = is_free_preview;
        }
        lecture.updated_at = Utc::now();

        diesel::update(lectures::table.filter(lectures::id.eq(lecture_id)))
            .set((
                lectures::title.eq(&lecture.title),
                lectures::content.eq(&lecture.content),
                lectures::video_url.eq(&lecture.video_url),
                lectures::duration_minutes.eq(lecture.duration_minutes),
                lectures::is_free_preview.eq(lecture.is_free_preview),
                lectures::updated_at.eq(lecture.updated_at),
            ))
            .execute(&mut conn)?;

        Ok(lecture)
    }

    pub fn reorder_lectures(
        &self,
        user: &User,
        course_id: Uuid,
        ordered_ids: Vec<Uuid>,
    ) -> LearnResult<Vec<Lecture>> {
        let mut conn = self.conn()?;
        let course = load_course(&mut conn, course_id)?;
        ensure_course_owner(user, &course)?;

        conn.transaction::<_, LearnError, _>(|conn| {
            lock_course(conn, course_id)?;
            let existing: Vec<Uuid> = lectures::table
                .filter(lectures::course_id.eq(course_id))
                .select(lectures::id)
                .load(conn)?;
            validate_order(&existing, &ordered_ids)?;
            renumber(conn, &ordered_ids)
        })?;

        info!("Reordered {} lectures of course {}", ordered_ids.len(), course_id);
        Ok(lectures::table
            .filter(lectures::course_id.eq(course_id))
            .order(lectures::position.asc())
            .load(&mut conn)?)
    }

    /// Removes the lecture with its quiz history, closes the position gap and
    /// drops the lecture from every enrollment's completion set.
    pub fn delete_lecture(&self, user: &User, lecture_id: Uuid) -> LearnResult<()> {
        let mut conn = self.conn()?;
        let lecture = load_lecture(&mut conn, lecture_id)?;
        let course = load_course(&mut conn, lecture.course_id)?;
        ensure_course_owner(user, &course)?;
        let course_id = course.id;

        conn.transaction::<_, LearnError, _>(|conn| {
            lock_course(conn, course_id)?;
            diesel::delete(remedial_contents::table.filter(remedial_contents::lecture_id.eq(lecture_id)))
                .execute(conn)?;
            diesel::delete(misconceptions::table.filter(misconceptions::lecture_id.eq(lecture_id)))
                .execute(conn)?;
            let quiz_ids: Vec<Uuid> = quizzes::table
                .filter(quizzes::lecture_id.eq(lecture_id))
                .select(quizzes::id)
                .load(conn)?;
            diesel::delete(quiz_attempts::table.filter(quiz_attempts::quiz_id.eq_any(&quiz_ids)))
                .execute(conn)?;
            diesel::delete(quizzes::table.filter(quizzes::lecture_id.eq(lecture_id))).execute(conn)?;
            diesel::delete(lectures::table.filter(lectures::id.eq(lecture_id))).execute(conn)?;

            let remaining: Vec<Uuid> = lectures::table
                .filter(lectures::course_id.eq(course_id))
                .order(lectures::position.asc())
                .select(lectures::id)
                .load(conn)?;
            renumber(conn, &remaining)?;

            let affected: Vec<Enrollment> = enrollments::table
                .filter(enrollments::course_id.eq(course_id))
                .load(conn)?;
            for enrollment in affected
                .into_iter()
                .filter(|e| e.completed_lectures.contains(&lecture_id))
            {
                let completed: Vec<Uuid> = enrollment
                    .completed_lectures
                    .into_iter()
                    .filter(|id| *id != lecture_id)
                    .collect();
                diesel::update(enrollments::table.filter(enrollments::id.eq(enrollment.id)))
                    .set(enrollments::completed_lectures.eq(completed))
                    .execute(conn)?;
            }

            recompute_course_progress(conn, course_id)
        })?;

        info!("Lecture {} deleted from course {}", lecture_id, course_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_order_accepts_permutation() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        assert!(validate_order(&[a, b, c], &[c, a, b]).is_ok());
    }

    #[test]
    fn test_validate_order_rejects_missing_duplicate_or_foreign() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert!(validate_order(&[a, b], &[a]).is_err());
        assert!(validate_order(&[a, b], &[a, a]).is_err());
        assert!(validate_order(&[a, b], &[a, Uuid::new_v4()]).is_err());
        assert!(validate_order(&[a, b], &[a, b, b]).is_err());
    }

    #[test]
    fn test_validate_duration() {
        assert!(validate_duration(-1).is_err());
        assert_eq!(validate_duration(45).unwrap(), 45);
        assert!(validate_duration(24 * 60 + 1).is_err());
    }

    #[test]
    fn test_validate_content_blank_becomes_none() {
        assert_eq!(validate_content(Some("   ".into())).unwrap(), None);
        assert_eq!(
            validate_content(Some("Ownership".into())).unwrap(),
            Some("Ownership".into())
        );
        assert!(validate_content(Some("x".repeat(MAX_CONTENT_CHARS + 1))).is_err());
    }
}
