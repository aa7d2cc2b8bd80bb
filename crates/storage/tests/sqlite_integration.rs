use chrono::Duration;
use quiz_core::model::{
    AnswerOption, AnswerWrite, AttemptStatus, OptionId, Question, QuestionId, QuestionKind,
    QuestionSet, QuestionSetId, SetStatus, UserId,
};
use quiz_core::scoring::{PassPolicy, ScoreCard, grade_attempt};
use quiz_core::time::fixed_now;
use storage::repository::{
    AnswerUpsert, AttemptRepository, CatalogRepository, NewAttempt, StorageError,
};
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn build_set(id: u64, sort_order: i64, status: SetStatus) -> QuestionSet {
    let mc = Question::new(
        QuestionId::new(1),
        "Which planet is largest?",
        QuestionKind::MultipleChoice,
        vec![
            AnswerOption::new(OptionId::new(1), "Mars", false),
            AnswerOption::new(OptionId::new(2), "Jupiter", true),
            AnswerOption::new(OptionId::new(3), "Venus", false),
        ],
    )
    .unwrap();
    let tf = Question::new(
        QuestionId::new(2),
        "Water boils at 100C at sea level",
        QuestionKind::TrueFalse,
        vec![
            AnswerOption::new(OptionId::new(1), "True", true),
            AnswerOption::new(OptionId::new(2), "False", false),
        ],
    )
    .unwrap();
    QuestionSet::new(
        QuestionSetId::new(id),
        format!("Week {id}"),
        Some("Science basics".into()),
        sort_order,
        Some("https://video.example/watch?v=week"),
        status,
        vec![mc, tf],
    )
    .unwrap()
}

fn upsert(question: u64, option: Option<u64>, seq: u64) -> AnswerUpsert {
    AnswerUpsert {
        question_id: QuestionId::new(question),
        selected: option.map(OptionId::new),
        seq,
        answered_at: fixed_now(),
    }
}

#[tokio::test]
async fn sqlite_roundtrips_question_sets() {
    let repo = connect("memdb_catalog").await;

    let set = build_set(1, 1, SetStatus::Active);
    repo.upsert_question_set(&set).await.unwrap();

    let fetched = repo
        .get_question_set(QuestionSetId::new(1))
        .await
        .unwrap()
        .expect("set stored");
    assert_eq!(fetched, set);
    assert_eq!(fetched.questions()[0].correct_option_id(), OptionId::new(2));

    // Replacing a set rewrites its questions.
    let replaced = QuestionSet::new(
        QuestionSetId::new(1),
        "Week 1 (revised)",
        None,
        1,
        None,
        SetStatus::Active,
        vec![set.questions()[1].clone()],
    )
    .unwrap();
    repo.upsert_question_set(&replaced).await.unwrap();
    let fetched = repo
        .get_question_set(QuestionSetId::new(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.question_count(), 1);
    assert_eq!(fetched.title(), "Week 1 (revised)");
}

#[tokio::test]
async fn sqlite_lists_active_sets_by_sort_order() {
    let repo = connect("memdb_active_order").await;
    repo.upsert_question_set(&build_set(1, 30, SetStatus::Active))
        .await
        .unwrap();
    repo.upsert_question_set(&build_set(2, 10, SetStatus::Active))
        .await
        .unwrap();
    repo.upsert_question_set(&build_set(3, 20, SetStatus::Draft))
        .await
        .unwrap();

    let ids: Vec<u64> = repo
        .list_active_question_sets()
        .await
        .unwrap()
        .iter()
        .map(|s| s.id().value())
        .collect();
    assert_eq!(ids, vec![2, 1]);
}

#[tokio::test]
async fn sqlite_enforces_single_open_attempt() {
    let repo = connect("memdb_open_attempt").await;
    repo.upsert_question_set(&build_set(1, 1, SetStatus::Active))
        .await
        .unwrap();

    let new = NewAttempt {
        user_id: UserId::new(7),
        question_set_id: QuestionSetId::new(1),
        started_at: fixed_now(),
    };
    let first = repo.create_attempt(new).await.unwrap();
    assert_eq!(first.status(), AttemptStatus::InProgress);

    let err = repo.create_attempt(new).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict));

    let open = repo
        .find_open_attempt(UserId::new(7), QuestionSetId::new(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(open.id(), first.id());
}

#[tokio::test]
async fn sqlite_answer_upserts_keep_latest_sequence() {
    let repo = connect("memdb_answers").await;
    repo.upsert_question_set(&build_set(1, 1, SetStatus::Active))
        .await
        .unwrap();
    let attempt = repo
        .create_attempt(NewAttempt {
            user_id: UserId::new(1),
            question_set_id: QuestionSetId::new(1),
            started_at: fixed_now(),
        })
        .await
        .unwrap();

    assert_eq!(
        repo.upsert_answer(attempt.id(), &upsert(1, Some(1), 1))
            .await
            .unwrap(),
        AnswerWrite::Applied
    );
    assert_eq!(
        repo.upsert_answer(attempt.id(), &upsert(1, Some(2), 3))
            .await
            .unwrap(),
        AnswerWrite::Applied
    );
    // Arrives late: must not clobber seq 3.
    assert_eq!(
        repo.upsert_answer(attempt.id(), &upsert(1, Some(3), 2))
            .await
            .unwrap(),
        AnswerWrite::Stale
    );
    repo.upsert_answer(attempt.id(), &upsert(2, None, 4))
        .await
        .unwrap();

    let stored = repo.get_attempt(attempt.id()).await.unwrap().unwrap();
    assert_eq!(stored.selected_option(QuestionId::new(1)), Some(OptionId::new(2)));
    assert_eq!(stored.selected_option(QuestionId::new(2)), None);
    assert_eq!(stored.answers().len(), 2);
    assert_eq!(stored.last_seq(), 4);
}

#[tokio::test]
async fn sqlite_submit_freezes_score_once() {
    let repo = connect("memdb_submit").await;
    repo.upsert_question_set(&build_set(1, 1, SetStatus::Active))
        .await
        .unwrap();
    let new = NewAttempt {
        user_id: UserId::new(1),
        question_set_id: QuestionSetId::new(1),
        started_at: fixed_now(),
    };
    let attempt = repo.create_attempt(new).await.unwrap();
    repo.upsert_answer(attempt.id(), &upsert(1, Some(2), 1))
        .await
        .unwrap();

    let set = build_set(1, 1, SetStatus::Active);
    let answered = repo.get_attempt(attempt.id()).await.unwrap().unwrap();
    let grading = grade_attempt(&set, &answered, PassPolicy::default()).unwrap();
    let card = *grading.card();
    assert_eq!(card, ScoreCard::from_persisted(1, 2, 50, false).unwrap());

    let submitted_at = fixed_now() + Duration::minutes(4);
    let submitted = repo
        .submit_attempt(attempt.id(), &grading, submitted_at)
        .await
        .unwrap();
    assert_eq!(submitted.status(), AttemptStatus::Submitted);
    assert_eq!(submitted.score(), Some(&card));
    assert_eq!(submitted.grading(), Some(&grading));
    assert_eq!(submitted.submitted_at(), Some(submitted_at));

    let err = repo
        .submit_attempt(attempt.id(), &grading, submitted_at)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict));

    let err = repo
        .upsert_answer(attempt.id(), &upsert(2, Some(1), 2))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict));

    let stored = repo.get_attempt(attempt.id()).await.unwrap().unwrap();
    assert_eq!(stored.score(), Some(&card));

    // Closed attempts no longer block a retry.
    let retry = repo.create_attempt(new).await.unwrap();
    assert_ne!(retry.id(), attempt.id());

    let history = repo.list_attempts_for_user(UserId::new(1)).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(
        history[0].selected_option(QuestionId::new(1)),
        Some(OptionId::new(2))
    );
    assert!(history[1].answers().is_empty());
}

#[tokio::test]
async fn sqlite_unknown_attempt_is_not_found() {
    let repo = connect("memdb_missing").await;
    let missing = quiz_core::model::AttemptId::new(404);

    assert!(repo.get_attempt(missing).await.unwrap().is_none());
    let err = repo
        .upsert_answer(missing, &upsert(1, Some(1), 1))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound));

    let set = build_set(1, 1, SetStatus::Active);
    let blank = quiz_core::model::Attempt::start(missing, UserId::new(1), set.id(), fixed_now());
    let grading = grade_attempt(&set, &blank, PassPolicy::default()).unwrap();
    let err = repo
        .submit_attempt(missing, &grading, fixed_now())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
}

#[tokio::test]
async fn sqlite_review_survives_catalog_edits() {
    let repo = connect("memdb_review").await;
    repo.upsert_question_set(&build_set(1, 1, SetStatus::Active))
        .await
        .unwrap();
    let new = NewAttempt {
        user_id: UserId::new(3),
        question_set_id: QuestionSetId::new(1),
        started_at: fixed_now(),
    };
    let attempt = repo.create_attempt(new).await.unwrap();
    repo.upsert_answer(attempt.id(), &upsert(1, Some(2), 1))
        .await
        .unwrap();
    repo.upsert_answer(attempt.id(), &upsert(2, Some(1), 2))
        .await
        .unwrap();

    let answered = repo.get_attempt(attempt.id()).await.unwrap().unwrap();
    let set = build_set(1, 1, SetStatus::Active);
    let grading = grade_attempt(&set, &answered, PassPolicy::default()).unwrap();
    repo.submit_attempt(attempt.id(), &grading, fixed_now())
        .await
        .unwrap();

    // The catalog moves question 1's correct answer after submission.
    let edited = QuestionSet::new(
        QuestionSetId::new(1),
        "Week 1",
        None,
        1,
        None,
        SetStatus::Active,
        vec![
            Question::new(
                QuestionId::new(1),
                "Which planet has the most moons?",
                QuestionKind::MultipleChoice,
                vec![
                    AnswerOption::new(OptionId::new(1), "Saturn", true),
                    AnswerOption::new(OptionId::new(2), "Jupiter", false),
                ],
            )
            .unwrap(),
        ],
    )
    .unwrap();
    repo.upsert_question_set(&edited).await.unwrap();

    let history = repo.list_attempts_for_user(UserId::new(3)).await.unwrap();
    let stored = &history[0];
    let review = stored.review();
    assert_eq!(review.len(), 2);
    assert_eq!(review[0].question_text, "Which planet is largest?");
    assert_eq!(review[0].correct_option_id, OptionId::new(2));
    assert_eq!(review[0].options.len(), 3);
    assert_eq!(review[0].options[1].text, "Jupiter");
    assert!(review[0].is_correct);
    assert_eq!(review[1].kind, QuestionKind::TrueFalse);

    let correct = review.iter().filter(|line| line.is_correct).count();
    let card = stored.score().unwrap();
    assert_eq!(u32::try_from(correct).unwrap(), card.correct());
    assert_eq!(card.percentage(), 100);
    assert_eq!(stored.grading(), Some(&grading));
}
