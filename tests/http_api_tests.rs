// Integration tests for the HTTP control API
//
// Requests go straight through the router with offline speech services and
// silent capture, so a full create/listen/stop/end cycle runs in-process.

use anyhow::Result;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use lingualeap::audio::{CaptureConstraints, CaptureSource, NullSink};
use lingualeap::http::SessionTemplate;
use lingualeap::session::SessionConfig;
use lingualeap::{
    create_router, AppState, BridgeConfig, MemoryStore, SessionServices, SpeechBridge,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

fn test_state() -> AppState {
    let services = SessionServices {
        speech: Arc::new(SpeechBridge::new(BridgeConfig::default())),
        store: Arc::new(MemoryStore::new()),
        sink: Arc::new(NullSink),
    };
    let template = SessionTemplate {
        config: SessionConfig {
            meter_interval: Duration::from_millis(10),
            ..SessionConfig::default()
        },
        capture_source: CaptureSource::Silence,
        constraints: CaptureConstraints {
            buffer_duration_ms: 50,
            ..Default::default()
        },
    };
    AppState::new(services, template)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Result<(StatusCode, Value)> {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?,
        None => request.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    Ok((status, value))
}

async fn create_session(app: &Router, body: Value) -> Result<String> {
    let (status, created) = send(app, Method::POST, "/sessions", Some(body)).await?;
    assert_eq!(status, StatusCode::CREATED, "create failed: {}", created);
    Ok(created["session_id"]
        .as_str()
        .expect("session id")
        .to_string())
}

#[tokio::test]
async fn test_health_check() -> Result<()> {
    let app = create_router(test_state());

    let (status, body) = send(&app, Method::GET, "/health", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".to_string()));

    Ok(())
}

#[tokio::test]
async fn test_full_session_cycle() -> Result<()> {
    let app = create_router(test_state());
    let user_id = Uuid::new_v4();

    let (status, created) = send(
        &app,
        Method::POST,
        "/sessions",
        Some(json!({ "user_id": user_id, "topic": "Weekend plans", "user_name": "Ada" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["mode"], "solo");
    assert_eq!(created["state"], "idle");
    assert_eq!(created["topic"], "Weekend plans");
    let id = created["session_id"].as_str().expect("session id").to_string();

    let (status, listen) = send(&app, Method::POST, &format!("/sessions/{id}/listen/start"), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listen["started"], true);
    assert_eq!(listen["state"], "listening");

    // Already listening
    let (_, again) = send(&app, Method::POST, &format!("/sessions/{id}/listen/start"), None).await?;
    assert_eq!(again["started"], false);

    tokio::time::sleep(Duration::from_millis(250)).await;

    let (status, outcome) = send(&app, Method::POST, &format!("/sessions/{id}/listen/stop"), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["outcome"], "exchange");
    assert_eq!(outcome["user"]["speaker"], "Ada");
    assert_eq!(outcome["spoken"], false);

    let (_, transcript) = send(&app, Method::GET, &format!("/sessions/{id}/transcript"), None).await?;
    let turns = transcript.as_array().expect("turn list");
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0]["kind"], "user");
    assert_eq!(turns[1]["kind"], "ai");

    let (_, status_body) = send(&app, Method::GET, &format!("/sessions/{id}/status"), None).await?;
    assert_eq!(status_body["state"], "idle");
    assert_eq!(status_body["turn_count"], 2);
    assert_eq!(status_body["online"], false);

    let (_, cancel) = send(&app, Method::POST, &format!("/sessions/{id}/cancel"), None).await?;
    assert_eq!(cancel["cancelled"], false, "Nothing in flight");

    let (status, summary) = send(&app, Method::POST, &format!("/sessions/{id}/end"), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["turns"].as_array().map(Vec::len), Some(2));
    assert_eq!(summary["feedback"]["duration_minutes"], 1);
    assert!(summary["conversation_id"].is_string());
    assert_eq!(summary["progress"]["total_conversations"], 1);

    // Ended sessions are dropped from the registry
    let (status, _) = send(&app, Method::POST, &format!("/sessions/{id}/end"), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::GET, &format!("/sessions/{id}/status"), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::POST, &format!("/sessions/{id}/listen/start"), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn test_stop_without_listening_is_ignored() -> Result<()> {
    let app = create_router(test_state());
    let id = create_session(&app, json!({ "user_id": Uuid::new_v4() })).await?;

    let (status, outcome) = send(&app, Method::POST, &format!("/sessions/{id}/listen/stop"), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["outcome"], "ignored");

    let (_, status_body) = send(&app, Method::GET, &format!("/sessions/{id}/status"), None).await?;
    assert_eq!(status_body["topic"], "Free conversation");
    assert_eq!(status_body["turn_count"], 0);

    Ok(())
}

#[tokio::test]
async fn test_partner_session_needs_match() -> Result<()> {
    let state = test_state();
    let app = create_router(state.clone());
    let user_id = Uuid::new_v4();

    let (status, body) = send(
        &app,
        Method::POST,
        "/sessions",
        Some(json!({ "user_id": user_id, "mode": "partner" })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let record = state
        .services
        .store
        .create_match(lingualeap::store::MatchRecord::new(
            user_id,
            Some(Uuid::new_v4()),
            "Music",
        ))
        .await?;

    let (status, created) = send(
        &app,
        Method::POST,
        "/sessions",
        Some(json!({ "user_id": user_id, "mode": "partner", "match_id": record.id })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["mode"], "partner");
    assert_eq!(created["match_id"], json!(record.id));
    assert_eq!(created["topic"], "Music");

    // An AI match has nobody to partner with
    let solo = state
        .services
        .store
        .create_match(lingualeap::store::MatchRecord::new(user_id, None, "Music"))
        .await?;
    let (status, body) = send(
        &app,
        Method::POST,
        "/sessions",
        Some(json!({ "user_id": user_id, "mode": "partner", "match_id": solo.id })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap_or_default().contains("no partner"));

    // Outsiders cannot join someone else's match
    let (status, _) = send(
        &app,
        Method::POST,
        "/sessions",
        Some(json!({ "user_id": Uuid::new_v4(), "mode": "partner", "match_id": record.id })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn test_topic_override_for_existing_match() -> Result<()> {
    let state = test_state();
    let app = create_router(state.clone());
    let user_id = Uuid::new_v4();
    let record = state
        .services
        .store
        .create_match(lingualeap::store::MatchRecord::new(user_id, None, "Food"))
        .await?;

    let id = create_session(
        &app,
        json!({ "user_id": user_id, "match_id": record.id, "topic": "Street food" }),
    )
    .await?;

    let (_, status_body) = send(&app, Method::GET, &format!("/sessions/{id}/status"), None).await?;
    assert_eq!(status_body["topic"], "Street food");

    let stored = state.services.store.get_match(record.id).await?.expect("match");
    assert_eq!(stored.conversation_topic, "Street food");

    Ok(())
}

#[tokio::test]
async fn test_unknown_ids_are_not_found() -> Result<()> {
    let app = create_router(test_state());
    let missing = Uuid::new_v4();

    for (method, path) in [
        (Method::POST, "listen/start"),
        (Method::POST, "listen/stop"),
        (Method::POST, "cancel"),
        (Method::POST, "end"),
        (Method::GET, "status"),
        (Method::GET, "transcript"),
    ] {
        let (status, body) = send(&app, method, &format!("/sessions/{missing}/{path}"), None).await?;
        assert_eq!(status, StatusCode::NOT_FOUND, "{path}");
        assert!(body["error"].as_str().unwrap_or_default().contains("not found"));
    }

    let (status, _) = send(
        &app,
        Method::POST,
        "/sessions",
        Some(json!({ "user_id": Uuid::new_v4(), "match_id": missing })),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn test_time_limit_ends_session() -> Result<()> {
    let mut state = test_state();
    let mut template = (*state.template).clone();
    template.config.time_limit = Some(Duration::from_millis(150));
    state.template = Arc::new(template);
    let app = create_router(state.clone());
    let user_id = Uuid::new_v4();

    let id = create_session(&app, json!({ "user_id": user_id })).await?;
    tokio::time::sleep(Duration::from_millis(400)).await;

    let (status, _) = send(&app, Method::GET, &format!("/sessions/{id}/status"), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(state.sessions.read().await.is_empty());

    // The watcher still persisted feedback for the session
    let feedback = state.services.store.recent_feedback(user_id, 5).await?;
    assert_eq!(feedback.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_ended_sessions_leave_registry_empty() -> Result<()> {
    let state = test_state();
    let app = create_router(state.clone());

    for _ in 0..5 {
        let id = create_session(&app, json!({ "user_id": Uuid::new_v4() })).await?;
        assert_eq!(state.sessions.read().await.len(), 1);

        let (status, _) = send(&app, Method::POST, &format!("/sessions/{id}/end"), None).await?;
        assert_eq!(status, StatusCode::OK);
    }

    assert!(state.sessions.read().await.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_time_limit_after_manual_end_is_quiet() -> Result<()> {
    let mut state = test_state();
    let mut template = (*state.template).clone();
    template.config.time_limit = Some(Duration::from_millis(100));
    state.template = Arc::new(template);
    let app = create_router(state.clone());
    let user_id = Uuid::new_v4();

    let id = create_session(&app, json!({ "user_id": user_id })).await?;
    let (status, _) = send(&app, Method::POST, &format!("/sessions/{id}/end"), None).await?;
    assert_eq!(status, StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(250)).await;

    // Only the manual end produced feedback
    let feedback = state.services.store.recent_feedback(user_id, 5).await?;
    assert_eq!(feedback.len(), 1);
    assert!(state.sessions.read().await.is_empty());

    Ok(())
}
