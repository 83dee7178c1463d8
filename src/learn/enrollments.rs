use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use log::info;
use uuid::Uuid;

use super::auth::ensure_course_owner;
use super::courses::load_course;
use super::error::{LearnError, LearnResult};
use super::lectures::load_lecture;
use super::types::*;
use super::LearnEngine;
use crate::core::shared::schema::learn::*;

/// `round(completed / total * 100)`, 0 for a course without lectures
pub fn progress_percentage(completed: usize, total: usize) -> i32 {
    if total == 0 {
        return 0;
    }
    let completed = completed.min(total);
    ((completed as f64 / total as f64) * 100.0).round() as i32
}

/// Status and completion timestamp that follow from a progress value
pub(crate) fn status_for_progress(
    progress: i32,
    previous_completed_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> (EnrollmentStatus, Option<DateTime<Utc>>) {
    if progress >= 100 {
        (EnrollmentStatus::Completed, previous_completed_at.or(Some(now)))
    } else {
        (EnrollmentStatus::Active, None)
    }
}

/// Recalculate progress for every enrollment of a course, e.g. after the
/// lecture set changed
pub(crate) fn recompute_course_progress(conn: &mut PgConnection, course_id: Uuid) -> LearnResult<()> {
    let lecture_ids: Vec<Uuid> = lectures::table
        .filter(lectures::course_id.eq(course_id))
        .select(lectures::id)
        .load(conn)?;

    let rows: Vec<Enrollment> = enrollments::table
        .filter(enrollments::course_id.eq(course_id))
        .load(conn)?;

    let now = Utc::now();
    for enrollment in rows {
        let completed = enrollment
            .completed_lectures
            .iter()
            .filter(|id| lecture_ids.contains(id))
            .count();
        let progress = progress_percentage(completed, lecture_ids.len());
        let (status, completed_at) = status_for_progress(progress, enrollment.completed_at, now);

        if progress != enrollment.progress || status.to_string() != enrollment.status {
            diesel::update(enrollments::table.filter(enrollments::id.eq(enrollment.id)))
                .set((
                    enrollments::progress.eq(progress),
                    enrollments::status.eq(status.to_string()),
                    enrollments::completed_at.eq(completed_at),
                ))
                .execute(conn)?;
        }
    }
    Ok(())
}

pub(crate) fn find_enrollment(
    conn: &mut PgConnection,
    student_id: Uuid,
    course_id: Uuid,
) -> LearnResult<Option<Enrollment>> {
    Ok(enrollments::table
        .filter(enrollments::student_id.eq(student_id))
        .filter(enrollments::course_id.eq(course_id))
        .first::<Enrollment>(conn)
        .optional()?)
}

impl LearnEngine {
    // ----- Enrollment Operations -----

    pub fn enroll(&self, student: &User, course_id: Uuid) -> LearnResult<Enrollment> {
        let mut conn = self.conn()?;
        let course = load_course(&mut conn, course_id)?;

        if !course.is_published {
            return Err(LearnError::not_found("Course"));
        }
        if course.instructor_id == student.id {
            return Err(LearnError::validation("You cannot enroll in your own course"));
        }

        let now = Utc::now();
        let enrollment = Enrollment {
            id: Uuid::new_v4(),
            student_id: student.id,
            course_id,
            completed_lectures: Vec::new(),
            progress: 0,
            status: EnrollmentStatus::Active.to_string(),
            enrolled_at: now,
            completed_at: None,
            last_accessed_at: now,
        };

        diesel::insert_into(enrollments::table)
            .values(&enrollment)
            .execute(&mut conn)
            .map_err(|e| match LearnError::from(e) {
                LearnError::Duplicate(_) => {
                    LearnError::Duplicate("You are already enrolled in this course".into())
                }
                other => other,
            })?;

        info!("Student {} enrolled in course {}", student.id, course_id);
        Ok(enrollment)
    }

    pub fn unenroll(&self, student: &User, course_id: Uuid) -> LearnResult<()> {
        let mut conn = self.conn()?;
        let deleted = diesel::delete(
            enrollments::table
                .filter(enrollments::student_id.eq(student.id))
                .filter(enrollments::course_id.eq(course_id)),
        )
        .execute(&mut conn)?;

        if deleted == 0 {
            return Err(LearnError::not_found("Enrollment"));
        }
        info!("Student {} left course {}", student.id, course_id);
        Ok(())
    }

    pub fn list_enrollments(&self, student: &User) -> LearnResult<Vec<EnrollmentWithCourse>> {
        let mut conn = self.conn()?;

        let rows: Vec<(Enrollment, Course)> = enrollments::table
            .inner_join(courses::table)
            .filter(enrollments::student_id.eq(student.id))
            .order(enrollments::last_accessed_at.desc())
            .load(&mut conn)?;

        Ok(rows
            .into_iter()
            .map(|(enrollment, course)| EnrollmentWithCourse { enrollment, course })
            .collect())
    }

    pub fn get_enrollment(&self, student: &User, course_id: Uuid) -> LearnResult<Enrollment> {
        let mut conn = self.conn()?;
        find_enrollment(&mut conn, student.id, course_id)?
            .ok_or_else(|| LearnError::not_found("Enrollment"))
    }

    /// Mark a lecture done; repeated calls are no-ops apart from the access time
    pub fn complete_lecture(&self, student: &User, lecture_id: Uuid) -> LearnResult<Enrollment> {
        let mut conn = self.conn()?;
        let lecture = load_lecture(&mut conn, lecture_id)?;

        let updated = conn.transaction::<_, LearnError, _>(|conn| {
            let mut enrollment = enrollments::table
                .filter(enrollments::student_id.eq(student.id))
                .filter(enrollments::course_id.eq(lecture.course_id))
                .for_update()
                .first::<Enrollment>(conn)
                .optional()?
                .ok_or_else(|| LearnError::forbidden("Enroll in the course to track progress"))?;

            let lecture_ids: Vec<Uuid> = lectures::table
                .filter(lectures::course_id.eq(lecture.course_id))
                .select(lectures::id)
                .load(conn)?;

            if !enrollment.completed_lectures.contains(&lecture_id) {
                enrollment.completed_lectures.push(lecture_id);
            }
            let completed = enrollment
                .completed_lectures
                .iter()
                .filter(|id| lecture_ids.contains(id))
                .count();

            let now = Utc::now();
            enrollment.progress = progress_percentage(completed, lecture_ids.len());
            let (status, completed_at) =
                status_for_progress(enrollment.progress, enrollment.completed_at, now);
            enrollment.status = status.to_string();
            enrollment.completed_at = completed_at;
            enrollment.last_accessed_at = now;

            diesel::update(enrollments::table.filter(enrollments::id.eq(enrollment.id)))
                .set((
                    enrollments::completed_lectures.eq(&enrollment.completed_lectures),
                    enrollments::progress.eq(enrollment.progress),
                    enrollments::status.eq(&enrollment.status),
                    enrollments::completed_at.eq(enrollment.completed_at),
                    enrollments::last_accessed_at.eq(now),
                ))
                .execute(conn)?;

            Ok(enrollment)
        })?;

        info!(
            "Student {} completed lecture {} ({}%)",
            student.id, lecture_id, updated.progress
        );
        Ok(updated)
    }

    pub fn course_roster(&self, user: &User, course_id: Uuid) -> LearnResult<Vec<RosterEntry>> {
        let mut conn = self.conn()?;
        let course = load_course(&mut conn, course_id)?;
        ensure_course_owner(user, &course)?;

        let rows: Vec<(Enrollment, (String, String))> = enrollments::table
            .inner_join(users::table.on(users::id.eq(enrollments::student_id)))
            .filter(enrollments::course_id.eq(course_id))
            .order(enrollments::enrolled_at.asc())
            .select((enrollments::all_columns, (users::name, users::email)))
            .load(&mut conn)?;

        Ok(rows
            .into_iter()
            .map(|(enrollment, (student_name, student_email))| RosterEntry {
                enrollment,
                student_name,
                student_email,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_progress_percentage_rounds() {
        assert_eq!(progress_percentage(0, 3), 0);
        assert_eq!(progress_percentage(1, 3), 33);
        assert_eq!(progress_percentage(2, 3), 67);
        assert_eq!(progress_percentage(3, 3), 100);
        assert_eq!(progress_percentage(1, 8), 13);
    }

    #[test]
    fn test_progress_without_lectures_is_zero() {
        assert_eq!(progress_percentage(0, 0), 0);
        assert_eq!(progress_percentage(4, 0), 0);
    }

    #[test]
    fn test_progress_never_exceeds_hundred() {
        assert_eq!(progress_percentage(5, 4), 100);
    }

    #[test]
    fn test_status_for_progress() {
        let now = Utc::now();
        let earlier = now - Duration::days(2);

        assert_eq!(status_for_progress(50, None, now), (EnrollmentStatus::Active, None));
        assert_eq!(
            status_for_progress(100, None, now),
            (EnrollmentStatus::Completed, Some(now))
        );
        assert_eq!(
            status_for_progress(100, Some(earlier), now),
            (EnrollmentStatus::Completed, Some(earlier))
        );
        // Losing completion (e.g. a new lecture) clears the timestamp
        assert_eq!(status_for_progress(80, Some(earlier), now), (EnrollmentStatus::Active, None));
    }
}
