#![allow(clippy::unwrap_used, clippy::expect_used)]

//! State survives a restart when a database path is configured

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use imreview_core::{IdentityConfig, ReviewConfig, Role};
use imreview_server::{create_router, AppState};

fn config(db: &std::path::Path, author: &str, reviewer: &str, editor: &str) -> ReviewConfig {
    let mut config = ReviewConfig::default();
    config.storage.database_path = Some(db.to_string_lossy().into_owned());
    for (id, name, role) in [
        (author, "author", Role::Author),
        (reviewer, "reviewer", Role::Reviewer),
        (editor, "editor", Role::Editor),
    ] {
        config.identities.push(IdentityConfig {
            id: id.to_string(),
            name: name.to_string(),
            email: String::new(),
            role,
            token: format!("token-{}", name),
        });
    }
    config
}

async fn send(app: &Router, method: Method, uri: &str, token: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer token-{}", token))
        .header(header::CONTENT_TYPE, "application/json");
    let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_workflow_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("imreview.db");
    let (author, reviewer, editor) = (
        Uuid::new_v4().to_string(),
        Uuid::new_v4().to_string(),
        Uuid::new_v4().to_string(),
    );
    let config = config(&db, &author, &reviewer, &editor);

    let manuscript_id = {
        let app = create_router(Arc::new(AppState::from_config(&config).unwrap()));
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/manuscripts",
            "author",
            Some(json!({
                "title": "Durable Review State",
                "abstract": "Reviews outlive the process.",
                "section": "Systems",
                "journalId": Uuid::new_v4().to_string(),
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/api/v1/manuscripts/{}/assign-reviewer/{}", id, reviewer),
            "editor",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/api/v1/manuscripts/{}/reviews", id),
            "reviewer",
            Some(json!({
                "content": "Sound design, minor wording issues.",
                "score": 8,
                "recommendation": "accept_minor",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        id
    };

    let app = create_router(Arc::new(AppState::from_config(&config).unwrap()));
    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/v1/manuscripts/{}", manuscript_id),
        "editor",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "accepted");

    let (_, body) = send(
        &app,
        Method::GET,
        &format!("/api/v1/manuscripts/{}/reviews", manuscript_id),
        "editor",
        None,
    )
    .await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["data"][0]["recommendation"], "accept_minor");
    assert_eq!(body["data"][0]["score"], 8);

    let (_, body) = send(
        &app,
        Method::GET,
        &format!("/api/v1/manuscripts/{}/history", manuscript_id),
        "author",
        None,
    )
    .await;
    assert_eq!(body["count"], 3);
}

#[tokio::test]
async fn test_failed_write_leaves_state_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("imreview.db");
    let (author, reviewer, editor) = (
        Uuid::new_v4().to_string(),
        Uuid::new_v4().to_string(),
        Uuid::new_v4().to_string(),
    );
    let config = config(&db, &author, &reviewer, &editor);
    let state = Arc::new(AppState::from_config(&config).unwrap());
    let app = create_router(state.clone());

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/manuscripts",
        "author",
        Some(json!({
            "title": "Writes That Fail",
            "abstract": "Storage goes away mid-flight.",
            "section": "Systems",
            "journalId": Uuid::new_v4().to_string(),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["data"]["id"].as_str().unwrap().to_string();
    let sequence = state.workflow.read().await.events().current_sequence();

    // The review row is written before the events, so the transaction
    // fails halfway through
    rusqlite::Connection::open(&db)
        .unwrap()
        .execute_batch("DROP TABLE events;")
        .unwrap();

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/v1/manuscripts/{}/assign-reviewer/{}", id, reviewer),
        "editor",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Internal storage error");

    {
        let workflow = state.workflow.read().await;
        let manuscript_id = imreview_core::ManuscriptId::parse(&id).unwrap();
        assert_eq!(
            workflow.manuscript(&manuscript_id).unwrap().status(),
            imreview_core::ManuscriptStatus::Submitted
        );
        assert_eq!(workflow.review_count(), 0);
        assert_eq!(workflow.events().current_sequence(), sequence);
    }

    let (_, body) = send(
        &app,
        Method::GET,
        &format!("/api/v1/manuscripts/{}", id),
        "editor",
        None,
    )
    .await;
    assert_eq!(body["data"]["status"], "submitted");

    let stored = rusqlite::Connection::open(&db).unwrap();
    let reviews: i64 = stored
        .query_row("SELECT COUNT(*) FROM reviews", [], |row| row.get(0))
        .unwrap();
    assert_eq!(reviews, 0);
}
