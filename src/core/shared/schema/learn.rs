diesel::table! {
    users (id) {
        id -> Uuid,
        name -> Text,
        email -> Text,
        role -> Text,
        image_url -> Nullable<Text>,
        bio -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    courses (id) {
        id -> Uuid,
        instructor_id -> Uuid,
        title -> Text,
        description -> Nullable<Text>,
        category -> Text,
        level -> Text,
        thumbnail_url -> Nullable<Text>,
        price_cents -> Int4,
        is_published -> Bool,
        average_rating -> Float8,
        review_count -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    lectures (id) {
        id -> Uuid,
        course_id -> Uuid,
        title -> Text,
        content -> Nullable<Text>,
        video_url -> Nullable<Text>,
        duration_minutes -> Int4,
        position -> Int4,
        is_free_preview -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    quizzes (id) {
        id -> Uuid,
        lecture_id -> Uuid,
        course_id -> Uuid,
        title -> Text,
        passing_score -> Int4,
        questions -> Jsonb,
        is_ai_generated -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    quiz_attempts (id) {
        id -> Uuid,
        quiz_id -> Uuid,
        student_id -> Uuid,
        answers -> Jsonb,
        correct_count -> Int4,
        total_questions -> Int4,
        score -> Int4,
        passed -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    enrollments (id) {
        id -> Uuid,
        student_id -> Uuid,
        course_id -> Uuid,
        completed_lectures -> Array<Uuid>,
        progress -> Int4,
        status -> Text,
        enrolled_at -> Timestamptz,
        completed_at -> Nullable<Timestamptz>,
        last_accessed_at -> Timestamptz,
    }
}

diesel::table! {
    course_reviews (id) {
        id -> Uuid,
        course_id -> Uuid,
        student_id -> Uuid,
        rating -> Int4,
        comment -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    misconceptions (id) {
        id -> Uuid,
        student_id -> Uuid,
        quiz_id -> Uuid,
        attempt_id -> Uuid,
        lecture_id -> Uuid,
        question_index -> Int4,
        question -> Text,
        selected_answer -> Nullable<Text>,
        correct_answer -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    remedial_contents (id) {
        id -> Uuid,
        student_id -> Uuid,
        quiz_id -> Uuid,
        attempt_id -> Uuid,
        lecture_id -> Uuid,
        content -> Text,
        misconception_ids -> Array<Uuid>,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(courses -> users (instructor_id));
diesel::joinable!(lectures -> courses (course_id));
diesel::joinable!(quizzes -> lectures (lecture_id));
diesel::joinable!(quiz_attempts -> quizzes (quiz_id));
diesel::joinable!(enrollments -> courses (course_id));
diesel::joinable!(course_reviews -> courses (course_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    courses,
    lectures,
    quizzes,
    quiz_attempts,
    enrollments,
    course_reviews,
    misconceptions,
    remedial_contents,
);
