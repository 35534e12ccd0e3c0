//! End-to-end tests for the /api/artist-syncs surface, driven through the
//! full router with an in-memory database.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::Utc;
use sea_orm::{Database, DatabaseConnection};
use serde_json::{Value as JsonValue, json};
use tower::ServiceExt;
use uuid::Uuid;

use tokio_util::sync::CancellationToken;

use artist_sync::config::AppConfig;
use artist_sync::models::sync_job::{SyncStatus, SyncSource};
use artist_sync::repositories::{JobUpdate, SyncJobRepository};
use artist_sync::server::{AppState, create_app, run_server};
use migration::{Migrator, MigratorTrait};

async fn setup() -> (axum::Router, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    Migrator::up(&db, None).await.unwrap();

    let state = AppState {
        db: db.clone(),
        config: Arc::new(AppConfig::default()),
    };
    (create_app(state), db)
}

fn post_json(uri: &str, body: JsonValue) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> JsonValue {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn enqueue_body(source: &str, source_id: &str) -> JsonValue {
    json!({
        "source": source,
        "sourceId": source_id,
        "syncInterval": "daily",
        "priority": 5,
    })
}

#[tokio::test]
async fn enqueue_returns_job_in_dashboard_shape() {
    let (app, _db) = setup().await;

    let response = app
        .oneshot(post_json("/api/artist-syncs", enqueue_body("spotify", "7G1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let job = body_json(response).await;
    assert_eq!(job["source"], "spotify");
    assert_eq!(job["sourceId"], "7G1");
    assert_eq!(job["syncStatus"], "pending");
    assert_eq!(job["priority"], 5);
    assert_eq!(job["syncInterval"], "daily");
    assert!(job["id"].as_str().unwrap().parse::<Uuid>().is_ok());
    assert!(job["mentorId"].is_null());
    assert!(job["lastSynced"].is_null());
    assert!(job["syncError"].is_null());
    assert!(job["rawData"].is_null());
    assert!(job["createdAt"].is_string());
}

#[tokio::test]
async fn enqueue_duplicate_active_key_conflicts() {
    let (app, _db) = setup().await;

    let first = app
        .clone()
        .oneshot(post_json("/api/artist-syncs", enqueue_body("spotify", "7G1")))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .oneshot(post_json("/api/artist-syncs", enqueue_body("spotify", "7G1")))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);

    let error = body_json(second).await;
    assert_eq!(error["code"], "CONFLICT");
}

#[tokio::test]
async fn enqueue_re_adopts_failed_job() {
    let (app, db) = setup().await;
    let repo = SyncJobRepository::new(db);

    let response = app
        .clone()
        .oneshot(post_json("/api/artist-syncs", enqueue_body("spotify", "7G1")))
        .await
        .unwrap();
    let created = body_json(response).await;
    let id: Uuid = created["id"].as_str().unwrap().parse().unwrap();

    // Drive the job to failed with spent attempts.
    repo.compare_and_set_status(id, SyncStatus::Pending, SyncStatus::Running, JobUpdate::default())
        .await
        .unwrap();
    repo.compare_and_set_status(
        id,
        SyncStatus::Running,
        SyncStatus::Failed,
        JobUpdate {
            sync_error: Some("NotFoundUpstream: entity no longer exists upstream".to_string()),
            attempt_count: Some(2),
            last_synced: Some(Utc::now().fixed_offset()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let response = app
        .oneshot(post_json("/api/artist-syncs", enqueue_body("spotify", "7G1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let adopted = body_json(response).await;
    assert_eq!(adopted["id"], created["id"]);
    assert_eq!(adopted["syncStatus"], "pending");
    assert!(adopted["syncError"].is_null());
}

#[tokio::test]
async fn enqueue_rejects_bad_input() {
    let (app, _db) = setup().await;

    // Out-of-range priority.
    let mut body = enqueue_body("spotify", "7G1");
    body["priority"] = json!(11);
    let response = app
        .clone()
        .oneshot(post_json("/api/artist-syncs", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = body_json(response).await;
    assert_eq!(error["code"], "VALIDATION_FAILED");

    // Blank source id.
    let response = app
        .clone()
        .oneshot(post_json("/api/artist-syncs", enqueue_body("spotify", "   ")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Unknown source enum value.
    let response = app
        .oneshot(post_json("/api/artist-syncs", enqueue_body("myspace", "7G1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_filters_by_status_and_source() {
    let (app, db) = setup().await;
    let repo = SyncJobRepository::new(db);

    for (source, source_id) in [("spotify", "a"), ("spotify", "b"), ("lastfm", "c")] {
        let response = app
            .clone()
            .oneshot(post_json("/api/artist-syncs", enqueue_body(source, source_id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    // Move one spotify job to running.
    let claimed = repo
        .find_by_key(SyncSource::Spotify, "a")
        .await
        .unwrap()
        .unwrap();
    repo.compare_and_set_status(
        claimed.id,
        SyncStatus::Pending,
        SyncStatus::Running,
        JobUpdate::default(),
    )
    .await
    .unwrap();

    let all = body_json(app.clone().oneshot(get("/api/artist-syncs")).await.unwrap()).await;
    assert_eq!(all.as_array().unwrap().len(), 3);

    let pending_spotify = body_json(
        app.clone()
            .oneshot(get("/api/artist-syncs?status=pending&source=spotify"))
            .await
            .unwrap(),
    )
    .await;
    let jobs = pending_spotify.as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["sourceId"], "b");

    let invalid = app
        .oneshot(get("/api/artist-syncs?status=done"))
        .await
        .unwrap();
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_unknown_job_is_not_found() {
    let (app, _db) = setup().await;

    let response = app
        .oneshot(get(&format!("/api/artist-syncs/{}", Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let error = body_json(response).await;
    assert_eq!(error["code"], "NOT_FOUND");
}

#[tokio::test]
async fn raw_data_is_an_opaque_json_string() {
    let (app, db) = setup().await;
    let repo = SyncJobRepository::new(db);

    let response = app
        .clone()
        .oneshot(post_json("/api/artist-syncs", enqueue_body("spotify", "7G1")))
        .await
        .unwrap();
    let created = body_json(response).await;
    let id: Uuid = created["id"].as_str().unwrap().parse().unwrap();

    let payload = json!({"name": "Nina Simone", "followers": {"total": 42}});
    repo.compare_and_set_status(id, SyncStatus::Pending, SyncStatus::Running, JobUpdate::default())
        .await
        .unwrap();
    repo.compare_and_set_status(
        id,
        SyncStatus::Running,
        SyncStatus::Success,
        JobUpdate {
            last_synced: Some(Utc::now().fixed_offset()),
            raw_data: Some(payload.clone()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let job = body_json(
        app.oneshot(get(&format!("/api/artist-syncs/{id}")))
            .await
            .unwrap(),
    )
    .await;

    assert_eq!(job["syncStatus"], "success");
    // The payload arrives as a string that itself parses back to the JSON.
    let raw = job["rawData"].as_str().expect("rawData must be a string");
    let reparsed: JsonValue = serde_json::from_str(raw).unwrap();
    assert_eq!(reparsed, payload);
    assert!(job["lastSynced"].is_string());
}

#[tokio::test]
async fn refresh_resets_retry_budget_and_dueness() {
    let (app, db) = setup().await;
    let repo = SyncJobRepository::new(db);

    let response = app
        .clone()
        .oneshot(post_json("/api/artist-syncs", enqueue_body("spotify", "7G1")))
        .await
        .unwrap();
    let created = body_json(response).await;
    let id: Uuid = created["id"].as_str().unwrap().parse().unwrap();

    // Park the job failed with a spent retry budget.
    repo.compare_and_set_status(id, SyncStatus::Pending, SyncStatus::Running, JobUpdate::default())
        .await
        .unwrap();
    repo.compare_and_set_status(
        id,
        SyncStatus::Running,
        SyncStatus::Failed,
        JobUpdate {
            sync_error: Some("AdapterUnavailable: upstream 503".to_string()),
            attempt_count: Some(5),
            last_synced: Some(Utc::now().fixed_offset()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/artist-syncs/{id}/refresh"),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let refreshed = body_json(response).await;
    assert_eq!(refreshed["syncStatus"], "pending");
    // Cleared lastSynced is the overdue sentinel.
    assert!(refreshed["lastSynced"].is_null());
    assert!(refreshed["syncError"].is_null());

    let current = repo.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(current.attempt_count, 0);
}

#[tokio::test]
async fn refresh_of_running_job_is_rejected() {
    let (app, db) = setup().await;
    let repo = SyncJobRepository::new(db);

    let response = app
        .clone()
        .oneshot(post_json("/api/artist-syncs", enqueue_body("spotify", "7G1")))
        .await
        .unwrap();
    let created = body_json(response).await;
    let id: Uuid = created["id"].as_str().unwrap().parse().unwrap();

    repo.compare_and_set_status(id, SyncStatus::Pending, SyncStatus::Running, JobUpdate::default())
        .await
        .unwrap();

    let response = app
        .oneshot(post_json(
            &format!("/api/artist-syncs/{id}/refresh"),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let error = body_json(response).await;
    assert_eq!(error["code"], "ALREADY_IN_FLIGHT");
}

#[tokio::test]
async fn refresh_unknown_job_is_not_found() {
    let (app, _db) = setup().await;

    let response = app
        .oneshot(post_json(
            &format!("/api/artist-syncs/{}/refresh", Uuid::new_v4()),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn root_and_health_respond() {
    let (app, _db) = setup().await;

    let root = body_json(app.clone().oneshot(get("/")).await.unwrap()).await;
    assert_eq!(root["service"], "artist-sync");

    let health = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);
}

#[tokio::test]
async fn concurrent_enqueues_accept_exactly_one() {
    // One pooled connection so every request hits the same database and the
    // unique active-key index arbitrates the race.
    let mut options = sea_orm::ConnectOptions::new("sqlite::memory:".to_owned());
    options.max_connections(1);
    let db = Database::connect(options).await.unwrap();
    Migrator::up(&db, None).await.unwrap();

    let app = create_app(AppState {
        db,
        config: Arc::new(AppConfig::default()),
    });

    let mut requests = Vec::new();
    for _ in 0..6 {
        let app = app.clone();
        requests.push(tokio::spawn(async move {
            app.oneshot(post_json("/api/artist-syncs", enqueue_body("spotify", "7G1")))
                .await
                .unwrap()
                .status()
        }));
    }

    let mut accepted = 0;
    let mut conflicts = 0;
    for request in requests {
        match request.await.unwrap() {
            StatusCode::OK => accepted += 1,
            StatusCode::CONFLICT => conflicts += 1,
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(accepted, 1);
    assert_eq!(conflicts, 5);
}

#[tokio::test]
async fn errors_carry_the_request_trace_id() {
    let (app, _db) = setup().await;

    let response = app
        .oneshot(get(&format!("/api/artist-syncs/{}", Uuid::new_v4())))
        .await
        .unwrap();
    let trace_id = response
        .headers()
        .get("x-trace-id")
        .expect("every response carries a trace id")
        .to_str()
        .unwrap()
        .to_string();
    assert!(trace_id.starts_with("req-"));

    let error = body_json(response).await;
    assert_eq!(error["trace_id"], json!(trace_id));
}

#[tokio::test]
async fn server_drains_on_shutdown_signal() {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    Migrator::up(&db, None).await.unwrap();

    let mut config = AppConfig::default();
    config.api_bind_addr = "127.0.0.1:0".to_string();

    let shutdown = CancellationToken::new();
    let server = tokio::spawn(run_server(Arc::new(config), db, shutdown.clone()));

    // Let the listener bind, then signal shutdown; the task must finish
    // instead of serving forever.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    shutdown.cancel();

    tokio::time::timeout(std::time::Duration::from_secs(5), server)
        .await
        .expect("server should stop once the token fires")
        .unwrap()
        .unwrap();
}
