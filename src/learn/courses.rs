use chrono::Utc;
use diesel::prelude::*;
use diesel::PgConnection;
use log::info;
use std::collections::HashSet;
use uuid::Uuid;

use super::auth::{ensure_course_owner, require_instructor};
use super::error::{LearnError, LearnResult};
use super::types::*;
use super::LearnEngine;
use crate::core::shared::schema::learn::*;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

pub(crate) fn validate_title(title: &str) -> LearnResult<String> {
    let title = title.trim();
    let len = title.chars().count();
    if !(3..=200).contains(&len) {
        return Err(LearnError::validation("Title must be between 3 and 200 characters"));
    }
    Ok(title.to_string())
}

pub(crate) fn validate_level(level: &str) -> LearnResult<String> {
    let level = level.trim().to_lowercase();
    if COURSE_LEVELS.contains(&level.as_str()) {
        Ok(level)
    } else {
        Err(LearnError::validation(format!(
            "Level must be one of: {}",
            COURSE_LEVELS.join(", ")
        )))
    }
}

fn validate_category(category: &str) -> LearnResult<String> {
    let category = category.trim();
    if category.is_empty() || category.chars().count() > 50 {
        return Err(LearnError::validation("Category must be between 1 and 50 characters"));
    }
    Ok(category.to_string())
}

fn validate_price(price_cents: i32) -> LearnResult<i32> {
    if price_cents < 0 {
        return Err(LearnError::validation("Price cannot be negative"));
    }
    Ok(price_cents)
}

/// Clamp pagination to sane bounds
pub(crate) fn page_bounds(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = offset.unwrap_or(0).max(0);
    (limit, offset)
}

/// Escape LIKE metacharacters so user search text matches literally
pub(crate) fn like_pattern(search: &str) -> String {
    let escaped = search
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

pub(crate) fn load_course(conn: &mut PgConnection, course_id: Uuid) -> LearnResult<Course> {
    courses::table
        .filter(courses::id.eq(course_id))
        .first::<Course>(conn)
        .optional()?
        .ok_or_else(|| LearnError::not_found("Course"))
}

/// Loads the course holding its row lock until the transaction ends.
/// Writers that derive course-wide values (lecture positions, rating rollup)
/// take it first so they apply one at a time.
pub(crate) fn lock_course(conn: &mut PgConnection, course_id: Uuid) -> LearnResult<Course> {
    courses::table
        .filter(courses::id.eq(course_id))
        .for_update()
        .first::<Course>(conn)
        .optional()?
        .ok_or_else(|| LearnError::not_found("Course"))
}

impl LearnEngine {
    // ----- Course Operations -----

    pub fn create_course(&self, instructor: &User, req: CreateCourseRequest) -> LearnResult<Course> {
        require_instructor(instructor)?;

        let now = Utc::now();
        let course = Course {
            id: Uuid::new_v4(),
            instructor_id: instructor.id,
            title: validate_title(&req.title)?,
            description: req.description.filter(|d| !d.trim().is_empty()),
            category: validate_category(&req.category)?,
            level: validate_level(req.level.as_deref().unwrap_or("beginner"))?,
            thumbnail_url: req.thumbnail_url,
            price_cents: validate_price(req.price_cents.unwrap_or(0))?,
            is_published: false,
            average_rating: 0.0,
            review_count: 0,
            created_at: now,
            updated_at: now,
        };

        let mut conn = self.conn()?;
        diesel::insert_into(courses::table)
            .values(&course)
            .execute(&mut conn)?;

        info!("Instructor {} created course {}", instructor.id, course.id);
        Ok(course)
    }

    /// Published courses only, newest first
    pub fn list_courses(&self, filters: CourseFilters) -> LearnResult<Vec<Course>> {
        let mut conn = self.conn()?;

        let mut query = courses::table
            .filter(courses::is_published.eq(true))
            .into_boxed();

        if let Some(category) = filters.category.filter(|c| !c.trim().is_empty()) {
            query = query.filter(courses::category.eq(category.trim().to_string()));
        }

        if let Some(level) = filters.level.filter(|l| !l.trim().is_empty()) {
            query = query.filter(courses::level.eq(validate_level(&level)?));
        }

        if let Some(instructor_id) = filters.instructor_id {
            query = query.filter(courses::instructor_id.eq(instructor_id));
        }

        if let Some(search) = filters.search.filter(|s| !s.trim().is_empty()) {
            let pattern = like_pattern(&search);
            query = query.filter(
                courses::title
                    .ilike(pattern.clone())
                    .or(courses::description.ilike(pattern)),
            );
        }

        let (limit, offset) = page_bounds(filters.limit, filters.offset);

        Ok(query
            .order(courses::created_at.desc())
            .limit(limit)
            .offset(offset)
            .load::<Course>(&mut conn)?)
    }

    pub fn list_instructor_courses(&self, instructor: &User) -> LearnResult<Vec<Course>> {
        require_instructor(instructor)?;
        let mut conn = self.conn()?;

        Ok(courses::table
            .filter(courses::instructor_id.eq(instructor.id))
            .order(courses::updated_at.desc())
            .load::<Course>(&mut conn)?)
    }

    /// Course with its instructor and lecture outline. Drafts are only
    /// visible to their instructor and admins.
    pub fn get_course_detail(
        &self,
        course_id: Uuid,
        viewer: Option<&User>,
    ) -> LearnResult<CourseDetailResponse> {
        let mut conn = self.conn()?;
        let course = load_course(&mut conn, course_id)?;

        if !course.is_published {
            let can_view = viewer.is_some_and(|v| ensure_course_owner(v, &course).is_ok());
            if !can_view {
                return Err(LearnError::not_found("Course"));
            }
        }

        let instructor: User = users::table
            .filter(users::id.eq(course.instructor_id))
            .first(&mut conn)?;

        let lecture_rows: Vec<Lecture> = lectures::table
            .filter(lectures::course_id.eq(course_id))
            .order(lectures::position.asc())
            .load(&mut conn)?;

        let quiz_lectures: HashSet<Uuid> = quizzes::table
            .filter(quizzes::course_id.eq(course_id))
            .select(quizzes::lecture_id)
            .load::<Uuid>(&mut conn)?
            .into_iter()
            .collect();

        let total_duration_minutes = lecture_rows.iter().map(|l| l.duration_minutes).sum();
        let lectures = lecture_rows
            .into_iter()
            .map(|l| LectureSummary {
                has_quiz: quiz_lectures.contains(&l.id),
                id: l.id,
                title: l.title,
                position: l.position,
                duration_minutes: l.duration_minutes,
                is_free_preview: l.is_free_preview,
            })
            .collect();

        Ok(CourseDetailResponse {
            course,
            instructor: instructor.into(),
            lectures,
            total_duration_minutes,
        })
    }

    pub fn update_course(
        &self,
        user: &User,
        course_id: Uuid,
        req: UpdateCourseRequest,
    ) -> LearnResult<Course> {
        let mut conn = self.conn()?;
        let mut course = load_course(&mut conn, course_id)?;
        ensure_course_owner(user, &course)?;

        if let Some(title) = req.title {
            course.title = validate_title(&title)?;
        }
        if let Some(description) = req.description {
            course.description = Some(description).filter(|d| !d.trim().is_empty());
        }
        if let Some(category) = req.category {
            course.category = validate_category(&category)?;
        }
        if let Some(level) = req.level {
            course.level = validate_level(&level)?;
        }
        if let Some(thumbnail_url) = req.thumbnail_url {
            course.thumbnail_url = Some(thumbnail_url).filter(|u| !u.trim().is_empty());
        }
        if let Some(price_cents) = req.price_cents {
            course.price_cents = validate_price(price_cents)?;
        }
        course.updated_at = Utc::now();

        diesel::update(courses::table.filter(courses::id.eq(course_id)))
            .set((
                courses::title.eq(&course.title),
                courses::description.eq(&course.description),
                courses::category.eq(&course.category),
                courses::level.eq(&course.level),
                courses::thumbnail_url.eq(&course.thumbnail_url),
                courses::price_cents.eq(course.price_cents),
                courses::updated_at.eq(course.updated_at),
            ))
            .execute(&mut conn)?;

        info!("Course {} updated by {}", course_id, user.id);
        Ok(course)
    }

    pub fn set_published(&self, user: &User, course_id: Uuid, published: bool) -> LearnResult<Course> {
        let mut conn = self.conn()?;
        let mut course = load_course(&mut conn, course_id)?;
        ensure_course_owner(user, &course)?;

        if published {
            let lecture_count: i64 = lectures::table
                .filter(lectures::course_id.eq(course_id))
                .count()
                .get_result(&mut conn)?;
            if lecture_count == 0 {
                return Err(LearnError::validation(
                    "A course needs at least one lecture before it can be published",
                ));
            }
        }

        course.is_published = published;
        course.updated_at = Utc::now();
        diesel::update(courses::table.filter(courses::id.eq(course_id)))
            .set((
                courses::is_published.eq(published),
                courses::updated_at.eq(course.updated_at),
            ))
            .execute(&mut conn)?;

        info!(
            "Course {} {}",
            course_id,
            if published { "published" } else { "unpublished" }
        );
        Ok(course)
    }

    pub fn delete_course(&self, user: &User, course_id: Uuid) -> LearnResult<()> {
        let mut conn = self.conn()?;
        let course = load_course(&mut conn, course_id)?;
        ensure_course_owner(user, &course)?;

        conn.transaction::<_, LearnError, _>(|conn| {
            let quiz_ids: Vec<Uuid> = quizzes::table
                .filter(quizzes::course_id.eq(course_id))
                .select(quizzes::id)
                .load(conn)?;

            diesel::delete(remedial_contents::table.filter(remedial_contents::quiz_id.eq_any(&quiz_ids)))
                .execute(conn)?;
            diesel::delete(misconceptions::table.filter(misconceptions::quiz_id.eq_any(&quiz_ids)))
                .execute(conn)?;
            diesel::delete(quiz_attempts::table.filter(quiz_attempts::quiz_id.eq_any(&quiz_ids)))
                .execute(conn)?;
            diesel::delete(quizzes::table.filter(quizzes::course_id.eq(course_id))).execute(conn)?;
            diesel::delete(lectures::table.filter(lectures::course_id.eq(course_id))).execute(conn)?;
            diesel::delete(enrollments::table.filter(enrollments::course_id.eq(course_id)))
                .execute(conn)?;
            diesel::delete(course_reviews::table.filter(course_reviews::course_id.eq(course_id)))
                .execute(conn)?;
            diesel::delete(courses::table.filter(courses::id.eq(course_id))).execute(conn)?;
            Ok(())
        })?;

        info!("Course {} deleted by {}", course_id, user.id);
        Ok(())
    }
}
