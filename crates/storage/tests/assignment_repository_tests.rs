//! Integration tests against a live PostgreSQL instance.
//!
//! Run with `cargo test -p lingopath-storage --features postgres-tests` and a
//! `DATABASE_URL` pointing at a scratch database.

#![cfg(feature = "postgres-tests")]

use chrono::{Duration, Utc};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use lingopath_domain::{
    AssessmentError, AssignedAssessment, AssignmentRepository, AssignmentStatus, ItemRepository,
    ResponsePayload, SessionStatus,
};
use lingopath_storage::{
    PgAssignmentRepository, PgItemRepository, create_pool, run_migrations,
};

async fn setup_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for postgres-tests");
    let pool = create_pool(&url, 5).await.expect("connect");
    run_migrations(&pool).await.expect("migrate");
    pool
}

async fn seed_template(pool: &PgPool) -> Uuid {
    let template_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO assessment_templates \
            (id, learning_pathway_id, name, assessment_type, rubric, version, is_active) \
         VALUES ($1, $2, 'Placement fixture', 'PLACEMENT', $3, 1, TRUE)",
    )
    .bind(template_id)
    .bind(Uuid::new_v4())
    .bind(json!({"proficiency_levels": ["A1", "A2", "B1"]}))
    .execute(pool)
    .await
    .expect("seed template");
    template_id
}

async fn seed_item(pool: &PgPool, template_id: Uuid, skills: &[&str], active: bool) -> Uuid {
    let item_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO assessment_items \
            (id, content, item_type, skill_area, target_proficiency_level, parameters, is_active) \
         VALUES ($1, $2, 'multiple_choice', $3, 'B1', $4, $5)",
    )
    .bind(item_id)
    .bind(json!({
        "item": "Pick the correct option",
        "options": ["a", "b", "c"],
        "correct_answer": "b"
    }))
    .bind(json!(skills))
    .bind(json!({"discrimination": 1.0, "difficulty": 0.0, "guessing": 0.25}))
    .bind(active)
    .execute(pool)
    .await
    .expect("seed item");

    sqlx::query("INSERT INTO template_items (template_id, item_id) VALUES ($1, $2)")
        .bind(template_id)
        .bind(item_id)
        .execute(pool)
        .await
        .expect("link item");

    item_id
}

fn fresh_assignment(template_id: Uuid) -> AssignedAssessment {
    AssignedAssessment {
        id: Uuid::new_v4(),
        template_id,
        test_taker_id: format!("taker-{}", Uuid::new_v4()),
        test_taker_type: "student".to_string(),
        assigned_by: Some("admin-1".to_string()),
        assigned_at: Utc::now(),
        due_at: None,
        status: AssignmentStatus::Pending,
        notes: None,
        session: None,
    }
}

#[tokio::test]
async fn test_aggregate_round_trip() {
    let pool = setup_pool().await;
    let repo = PgAssignmentRepository::new(pool.clone());
    let template_id = seed_template(&pool).await;
    let item_id = seed_item(&pool, template_id, &["grammar"], true).await;

    let mut assignment = fresh_assignment(template_id);
    repo.create(&assignment).await.expect("create");

    let now = Utc::now();
    let session_id = Uuid::new_v4();
    assignment
        .start_session(session_id, now, now + Duration::minutes(120), 0.0, None, None)
        .expect("start");
    assignment
        .present_question(Uuid::new_v4(), item_id, now)
        .expect("present");
    repo.save(&assignment).await.expect("save");

    let loaded = repo
        .get_by_id(assignment.id)
        .await
        .expect("load")
        .expect("exists");

    assert_eq!(loaded.status, AssignmentStatus::InProgress);
    let session = loaded.session.as_ref().expect("session loaded");
    assert_eq!(session.id, session_id);
    assert_eq!(session.status, SessionStatus::InProgress);
    assert_eq!(session.questions_answered, 0);
    assert_eq!(session.revision, Some(0));
    assert_eq!(session.responses.len(), 1);
    assert_eq!(session.pending_response().unwrap().item_id, item_id);
    // Timestamps come back UTC-aware and close to what went in.
    assert!((session.started_at - now).num_seconds().abs() < 1);
}

#[tokio::test]
async fn test_submit_and_reload_updates_estimates() {
    let pool = setup_pool().await;
    let repo = PgAssignmentRepository::new(pool.clone());
    let template_id = seed_template(&pool).await;
    let item_id = seed_item(&pool, template_id, &["grammar"], true).await;

    let mut assignment = fresh_assignment(template_id);
    repo.create(&assignment).await.expect("create");

    let now = Utc::now();
    assignment
        .start_session(Uuid::new_v4(), now, now + Duration::minutes(120), 0.0, None, None)
        .expect("start");
    assignment
        .present_question(Uuid::new_v4(), item_id, now)
        .expect("present");
    repo.save(&assignment).await.expect("save fresh");

    let mut loaded = repo
        .get_by_id(assignment.id)
        .await
        .expect("load")
        .expect("exists");
    loaded
        .submit_response(ResponsePayload::new("b"), true, 1.0, Some(20), Utc::now())
        .expect("submit");
    loaded
        .update_ability_estimate(0.51239, Some(0.8812))
        .expect("estimate");
    repo.save(&loaded).await.expect("save submitted");

    let session_id = loaded.session.as_ref().unwrap().id;
    let reloaded = repo
        .get_by_session_id(session_id)
        .await
        .expect("load by session")
        .expect("exists");
    let session = reloaded.session.as_ref().unwrap();

    assert_eq!(session.questions_answered, 1);
    // NUMERIC(8,4) truncates to four decimal places.
    assert!((session.current_ability.unwrap() - 0.5124).abs() < 1e-9);
    assert!((session.standard_error.unwrap() - 0.8812).abs() < 1e-9);
    let submitted = session.submitted_responses();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].raw_score, Some(1.0));
    assert_eq!(submitted[0].time_taken, Some(20));
    assert!(session.pending_response().is_none());
}

#[tokio::test]
async fn test_concurrent_save_loses_optimistic_race() {
    let pool = setup_pool().await;
    let repo = PgAssignmentRepository::new(pool.clone());
    let template_id = seed_template(&pool).await;
    let item_id = seed_item(&pool, template_id, &["grammar"], true).await;

    let mut assignment = fresh_assignment(template_id);
    repo.create(&assignment).await.expect("create");
    let now = Utc::now();
    assignment
        .start_session(Uuid::new_v4(), now, now + Duration::minutes(120), 0.0, None, None)
        .expect("start");
    assignment
        .present_question(Uuid::new_v4(), item_id, now)
        .expect("present");
    repo.save(&assignment).await.expect("save fresh");

    // Two requests load the same aggregate state.
    let mut first = repo.get_by_id(assignment.id).await.unwrap().unwrap();
    let mut second = repo.get_by_id(assignment.id).await.unwrap().unwrap();

    first
        .submit_response(ResponsePayload::new("b"), true, 1.0, None, Utc::now())
        .expect("first submit");
    repo.save(&first).await.expect("first save wins");

    second
        .submit_response(ResponsePayload::new("c"), false, 0.0, None, Utc::now())
        .expect("second submit in memory");
    let result = repo.save(&second).await;
    assert!(
        matches!(result, Err(AssessmentError::Conflict(_))),
        "second save must lose: {result:?}"
    );
}

#[tokio::test]
async fn test_get_by_session_id_returns_terminal_session() {
    let pool = setup_pool().await;
    let repo = PgAssignmentRepository::new(pool.clone());
    let template_id = seed_template(&pool).await;
    let item_id = seed_item(&pool, template_id, &["grammar"], true).await;

    let mut assignment = fresh_assignment(template_id);
    repo.create(&assignment).await.expect("create");
    let now = Utc::now();
    assignment
        .start_session(Uuid::new_v4(), now, now + Duration::minutes(120), 0.0, None, None)
        .expect("start");
    assignment
        .present_question(Uuid::new_v4(), item_id, now)
        .expect("present");
    assignment
        .submit_response(ResponsePayload::new("b"), true, 1.0, None, now)
        .expect("submit");
    assignment.complete_assessment(now).expect("complete");
    repo.save(&assignment).await.expect("save");

    let session_id = assignment.session.as_ref().unwrap().id;

    // By assignment id the aggregate has no ACTIVE session any more...
    let by_id = repo.get_by_id(assignment.id).await.unwrap().unwrap();
    assert!(by_id.session.is_none());

    // ...but by session id the terminal session is still reachable.
    let by_session = repo.get_by_session_id(session_id).await.unwrap().unwrap();
    let session = by_session.session.as_ref().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.completed_at.is_some());
}

#[tokio::test]
async fn test_items_by_skill_areas_filters_and_excludes() {
    let pool = setup_pool().await;
    let items = PgItemRepository::new(pool.clone());
    let template_id = seed_template(&pool).await;

    let grammar = seed_item(&pool, template_id, &["grammar"], true).await;
    let listening = seed_item(&pool, template_id, &["listening"], true).await;
    let inactive = seed_item(&pool, template_id, &["grammar"], false).await;

    let matched = items
        .get_items_by_skill_areas(template_id, &["grammar".to_string()], &[])
        .await
        .expect("query");
    let ids: Vec<_> = matched.iter().map(|i| i.id).collect();
    assert!(ids.contains(&grammar));
    assert!(!ids.contains(&listening));
    assert!(!ids.contains(&inactive));

    // Empty filter accepts every active item.
    let all_active = items
        .get_items_by_skill_areas(template_id, &[], &[])
        .await
        .expect("query");
    let ids: Vec<_> = all_active.iter().map(|i| i.id).collect();
    assert!(ids.contains(&grammar));
    assert!(ids.contains(&listening));
    assert!(!ids.contains(&inactive));

    // Exclusion drops already-presented items.
    let excluded = items
        .get_items_by_skill_areas(template_id, &[], &[grammar])
        .await
        .expect("query");
    assert!(!excluded.iter().any(|i| i.id == grammar));
}
