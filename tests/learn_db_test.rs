#[cfg(test)]
mod learn_db_integration_tests {
    use async_trait::async_trait;
    use diesel::prelude::*;
    use learnserver::core::config::{
        AppConfig, DatabaseConfig, LlmConfig, MediaConfig, RateLimitConfig, ServerConfig,
    };
    use learnserver::core::shared::schema::learn::*;
    use learnserver::core::shared::state::AppState;
    use learnserver::core::shared::utils::{create_lazy_conn, run_migrations, DbPool};
    use learnserver::learn::remedial::generate_remedial_content;
    use learnserver::learn::reviews::rating_rollup;
    use learnserver::learn::{
        CreateCourseRequest, CreateLectureRequest, CreateQuizRequest, CreateReviewRequest,
        CreateUserRequest, Lecture, LearnEngine, LearnError, QuizQuestion, SubmitAttemptRequest,
        SubmittedAnswer, UpdateReviewRequest, User, UserRole,
    };
    use learnserver::llm::{ChatMessage, GenerationOptions, LLMProvider, LlmError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, OnceLock};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    static POOL: OnceLock<Option<DbPool>> = OnceLock::new();

    /// Pool against DATABASE_URL with migrations applied, or None when no
    /// database is reachable
    fn pool() -> Option<DbPool> {
        POOL.get_or_init(|| {
            let url = std::env::var("DATABASE_URL").ok()?;
            let pool = create_lazy_conn(&url);
            if pool.get_timeout(Duration::from_secs(2)).is_err() {
                return None;
            }
            run_migrations(&pool).ok()?;
            Some(pool)
        })
        .clone()
    }

    fn engine() -> Option<LearnEngine> {
        match pool() {
            Some(pool) => Some(LearnEngine::new(pool)),
            None => {
                println!("Skipping test - PostgreSQL not available (set DATABASE_URL)");
                None
            }
        }
    }

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LLMProvider for CountingProvider {
        async fn generate(
            &self,
            _messages: &[ChatMessage],
            _options: &GenerationOptions,
        ) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("## Review\nRevisit how ownership moves values.".to_string())
        }

        async fn generate_stream(
            &self,
            _messages: &[ChatMessage],
            _options: &GenerationOptions,
            _tx: mpsc::Sender<String>,
        ) -> Result<(), LlmError> {
            Ok(())
        }
    }

    fn app_state(pool: DbPool, provider: Arc<CountingProvider>) -> AppState {
        let config = AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 0,
                cors_origins: vec![],
            },
            database: DatabaseConfig {
                url: String::new(),
                max_connections: 1,
            },
            llm: LlmConfig::default(),
            media: MediaConfig::default(),
            rate_limit: RateLimitConfig::default(),
        };
        AppState::new(pool, config, provider)
    }

    fn user(engine: &LearnEngine, role: UserRole) -> User {
        engine
            .create_user(CreateUserRequest {
                name: format!("Test {role}"),
                email: format!("{role}-{}@example.com", Uuid::new_v4()),
                role: Some(role),
                image_url: None,
            })
            .unwrap()
    }

    fn course(engine: &LearnEngine, instructor: &User) -> Uuid {
        engine
            .create_course(
                instructor,
                CreateCourseRequest {
                    title: "Ownership in Practice".into(),
                    description: Some("Borrowing without tears".into()),
                    category: "programming".into(),
                    level: Some("beginner".into()),
                    thumbnail_url: None,
                    price_cents: None,
                },
            )
            .unwrap()
            .id
    }

    fn lecture(engine: &LearnEngine, instructor: &User, course_id: Uuid, title: &str) -> Lecture {
        engine
            .create_lecture(
                instructor,
                course_id,
                CreateLectureRequest {
                    title: title.into(),
                    content: Some(format!("Notes for {title}")),
                    video_url: None,
                    duration_minutes: Some(10),
                    is_free_preview: None,
                },
            )
            .unwrap()
    }

    /// Published course with one lecture
    fn published_course(engine: &LearnEngine, instructor: &User) -> (Uuid, Lecture) {
        let course_id = course(engine, instructor);
        let first = lecture(engine, instructor, course_id, "Moves and copies");
        engine.set_published(instructor, course_id, true).unwrap();
        (course_id, first)
    }

    fn quiz_request() -> CreateQuizRequest {
        CreateQuizRequest {
            title: None,
            passing_score: Some(50),
            questions: vec![
                QuizQuestion {
                    question: "Which type is Copy?".into(),
                    options: vec!["String".into(), "u32".into(), "Vec<u8>".into()],
                    correct_answer_index: 1,
                    explanation: None,
                },
                QuizQuestion {
                    question: "What does `&mut` grant?".into(),
                    options: vec!["Shared read".into(), "Exclusive access".into()],
                    correct_answer_index: 1,
                    explanation: Some("Only one mutable borrow at a time".into()),
                },
            ],
        }
    }

    fn answers(selected: [i64; 2]) -> SubmitAttemptRequest {
        SubmitAttemptRequest {
            answers: selected
                .iter()
                .enumerate()
                .map(|(idx, &choice)| SubmittedAnswer {
                    question_index: idx,
                    selected_answer_index: Some(choice),
                })
                .collect(),
        }
    }

    #[test]
    fn test_duplicate_writes_are_conflicts() {
        let Some(engine) = engine() else { return };
        let instructor = user(&engine, UserRole::Instructor);
        let student = user(&engine, UserRole::Student);
        let (course_id, first) = published_course(&engine, &instructor);

        engine.enroll(&student, course_id).unwrap();
        assert!(matches!(
            engine.enroll(&student, course_id),
            Err(LearnError::Duplicate(_))
        ));

        let review = || CreateReviewRequest {
            rating: 4,
            comment: None,
        };
        engine.create_review(&student, course_id, review()).unwrap();
        assert!(matches!(
            engine.create_review(&student, course_id, review()),
            Err(LearnError::Duplicate(_))
        ));

        engine.create_quiz(&instructor, first.id, quiz_request()).unwrap();
        assert!(matches!(
            engine.create_quiz(&instructor, first.id, quiz_request()),
            Err(LearnError::Duplicate(_))
        ));
        assert!(matches!(
            engine.quiz_generation_source(&instructor, first.id),
            Err(LearnError::Duplicate(_))
        ));
    }

    #[test]
    fn test_admin_cannot_self_register() {
        let Some(engine) = engine() else { return };
        let result = engine.create_user(CreateUserRequest {
            name: "Mallory".into(),
            email: format!("mallory-{}@example.com", Uuid::new_v4()),
            role: Some(UserRole::Admin),
            image_url: None,
        });
        assert!(matches!(result, Err(LearnError::Validation(_))));
    }

    #[test]
    fn test_get_user_unknown_is_not_found() {
        let Some(engine) = engine() else { return };
        let student = user(&engine, UserRole::Student);

        assert_eq!(engine.get_user(student.id).unwrap().email, student.email);
        assert!(matches!(
            engine.get_user(Uuid::new_v4()),
            Err(LearnError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_remedial_content_is_generated_once_per_attempt() {
        let Some(pool) = pool() else {
            println!("Skipping test - PostgreSQL not available (set DATABASE_URL)");
            return;
        };
        let engine = LearnEngine::new(pool.clone());
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let state = app_state(pool, provider.clone());

        let (student, failed_attempt, perfect_attempt) = tokio::task::spawn_blocking(move || {
            let instructor = user(&engine, UserRole::Instructor);
            let student = user(&engine, UserRole::Student);
            let (course_id, first) = published_course(&engine, &instructor);
            let quiz = engine.create_quiz(&instructor, first.id, quiz_request()).unwrap();
            engine.enroll(&student, course_id).unwrap();

            let failed = engine.submit_attempt(&student, quiz.id, answers([0, 1])).unwrap();
            assert_eq!(failed.misconceptions_recorded, 1);
            let perfect = engine.submit_attempt(&student, quiz.id, answers([1, 1])).unwrap();
            assert_eq!(perfect.misconceptions_recorded, 0);
            (student, failed.attempt.id, perfect.attempt.id)
        })
        .await
        .unwrap();

        let first = generate_remedial_content(&state, student.clone(), failed_attempt)
            .await
            .unwrap();
        let second = generate_remedial_content(&state, student.clone(), failed_attempt)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        let result = generate_remedial_content(&state, student, perfect_attempt).await;
        assert!(matches!(result, Err(LearnError::Validation(_))));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delete_course_removes_dependent_rows() {
        let Some(engine) = engine() else { return };
        let instructor = user(&engine, UserRole::Instructor);
        let student = user(&engine, UserRole::Student);
        let (course_id, first) = published_course(&engine, &instructor);
        let quiz = engine.create_quiz(&instructor, first.id, quiz_request()).unwrap();
        engine.enroll(&student, course_id).unwrap();
        engine.submit_attempt(&student, quiz.id, answers([0, 0])).unwrap();
        engine
            .create_review(&student, course_id, CreateReviewRequest { rating: 2, comment: None })
            .unwrap();

        engine.delete_course(&instructor, course_id).unwrap();

        let mut conn = pool().unwrap().get().unwrap();
        let counts: [i64; 6] = [
            lectures::table
                .filter(lectures::course_id.eq(course_id))
                .count()
                .get_result(&mut conn)
                .unwrap(),
            quizzes::table
                .filter(quizzes::course_id.eq(course_id))
                .count()
                .get_result(&mut conn)
                .unwrap(),
            quiz_attempts::table
                .filter(quiz_attempts::quiz_id.eq(quiz.id))
                .count()
                .get_result(&mut conn)
                .unwrap(),
            misconceptions::table
                .filter(misconceptions::quiz_id.eq(quiz.id))
                .count()
                .get_result(&mut conn)
                .unwrap(),
            enrollments::table
                .filter(enrollments::course_id.eq(course_id))
                .count()
                .get_result(&mut conn)
                .unwrap(),
            course_reviews::table
                .filter(course_reviews::course_id.eq(course_id))
                .count()
                .get_result(&mut conn)
                .unwrap(),
        ];
        assert_eq!(counts, [0; 6]);
        assert!(matches!(
            engine.get_course_detail(course_id, Some(&instructor)),
            Err(LearnError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_lecture_renumbers_and_recomputes_progress() {
        let Some(engine) = engine() else { return };
        let instructor = user(&engine, UserRole::Instructor);
        let student = user(&engine, UserRole::Student);
        let (course_id, first) = published_course(&engine, &instructor);
        let second = lecture(&engine, &instructor, course_id, "Borrowing rules");
        let third = lecture(&engine, &instructor, course_id, "Lifetimes");
        engine.enroll(&student, course_id).unwrap();

        engine.complete_lecture(&student, first.id).unwrap();
        let progress = engine.complete_lecture(&student, second.id).unwrap().progress;
        assert_eq!(progress, 67);

        engine.delete_lecture(&instructor, second.id).unwrap();

        let remaining = engine.list_lectures(course_id, Some(&instructor)).unwrap();
        let ids: Vec<Uuid> = remaining.iter().map(|l| l.id).collect();
        let positions: Vec<i32> = remaining.iter().map(|l| l.position).collect();
        assert_eq!(ids, vec![first.id, third.id]);
        assert_eq!(positions, vec![1, 2]);
        assert_eq!(engine.get_enrollment(&student, course_id).unwrap().progress, 50);
    }

    #[test]
    fn test_rating_rollup_follows_review_changes() {
        let Some(engine) = engine() else { return };
        let instructor = user(&engine, UserRole::Instructor);
        let alice = user(&engine, UserRole::Student);
        let bob = user(&engine, UserRole::Student);
        let (course_id, _) = published_course(&engine, &instructor);
        engine.enroll(&alice, course_id).unwrap();
        engine.enroll(&bob, course_id).unwrap();

        let rollup = || {
            let course = engine.get_course_detail(course_id, None).unwrap().course;
            (course.average_rating, course.review_count)
        };

        let five = engine
            .create_review(&alice, course_id, CreateReviewRequest { rating: 5, comment: None })
            .unwrap();
        let three = engine
            .create_review(&bob, course_id, CreateReviewRequest { rating: 3, comment: None })
            .unwrap();
        assert_eq!(rollup(), (4.0, 2));

        engine
            .update_review(
                &bob,
                three.id,
                UpdateReviewRequest {
                    rating: Some(4),
                    comment: None,
                },
            )
            .unwrap();
        assert_eq!(rollup(), (4.5, 2));

        engine.delete_review(&alice, five.id).unwrap();
        assert_eq!(rollup(), (4.0, 1));
    }

    #[test]
    fn test_concurrent_reviews_keep_rollup_consistent() {
        let Some(engine) = engine() else { return };
        let instructor = user(&engine, UserRole::Instructor);
        let (course_id, _) = published_course(&engine, &instructor);

        let students: Vec<User> = (0..8).map(|_| user(&engine, UserRole::Student)).collect();
        for student in &students {
            engine.enroll(student, course_id).unwrap();
        }
        let ratings: Vec<i32> = (0..8).map(|i| i % 5 + 1).collect();

        std::thread::scope(|s| {
            for (student, &rating) in students.iter().zip(&ratings) {
                let engine = engine.clone();
                s.spawn(move || {
                    engine
                        .create_review(student, course_id, CreateReviewRequest { rating, comment: None })
                        .unwrap();
                });
            }
        });

        let course = engine.get_course_detail(course_id, None).unwrap().course;
        assert_eq!((course.average_rating, course.review_count), rating_rollup(&ratings));
    }

    #[test]
    fn test_concurrent_lecture_creation_gets_distinct_positions() {
        let Some(engine) = engine() else { return };
        let instructor = user(&engine, UserRole::Instructor);
        let course_id = course(&engine, &instructor);

        std::thread::scope(|s| {
            for n in 0..8 {
                let engine = engine.clone();
                let instructor = &instructor;
                s.spawn(move || {
                    lecture(&engine, instructor, course_id, &format!("Lecture {n}"));
                });
            }
        });

        let mut positions: Vec<i32> = engine
            .list_lectures(course_id, Some(&instructor))
            .unwrap()
            .iter()
            .map(|l| l.position)
            .collect();
        positions.sort_unstable();
        assert_eq!(positions, (1..=8).collect::<Vec<_>>());
    }
}
