mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{CaptureScript, Harness};
use loqa_tutor::error::CaptureError;
use loqa_tutor::session::SessionState;
use loqa_tutor::tutor::TutorReply;
use loqa_tutor::wakelock::WakeLock;
use loqa_tutor::{create_router, AppState};
use serde_json::Value;
use tower::ServiceExt;

fn router(h: &Harness) -> Router {
    create_router(AppState::new(h.controller.clone()))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

    (status, json)
}

#[tokio::test]
async fn test_health_check() {
    let h = Harness::new();
    let app = router(&h);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_start_and_stop_session() {
    let h = Harness::new();
    let app = router(&h);

    let (status, body) = call(&app, "POST", "/session/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "listening");
    assert_eq!(body["session_id"], "tutor-test");
    assert!(body["started_at"].is_string());

    let (status, body) = call(&app, "GET", "/session/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_active"], true);
    assert_eq!(body["state"], "listening");
    assert!(body["notice"].is_null());

    let (status, body) = call(&app, "POST", "/session/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "inactive");
    assert_eq!(body["stats"]["is_active"], false);
}

#[tokio::test]
async fn test_start_maps_fatal_capture_errors() {
    let h = Harness::new();
    let app = router(&h);

    h.capture
        .script(CaptureScript::Fail(CaptureError::PermissionDenied));
    let (status, body) = call(&app, "POST", "/session/start", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "permission_denied");

    h.capture.script(CaptureScript::Fail(CaptureError::Unsupported(
        "no recognizer".to_string(),
    )));
    let (status, body) = call(&app, "POST", "/session/start", None).await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(body["kind"], "unsupported");

    h.capture.script(CaptureScript::Fail(CaptureError::Failed(
        "engine crashed".to_string(),
    )));
    let (status, body) = call(&app, "POST", "/session/start", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["kind"], "capture");

    // A recoverable failure leaves the session running
    let (_, body) = call(&app, "GET", "/session/status", None).await;
    assert_eq!(body["state"], "idle");
    assert_eq!(body["notice"]["fatal"], false);
}

#[tokio::test]
async fn test_typed_text_produces_transcript() {
    let mut h = Harness::new();
    let app = router(&h);
    h.tutor.reply(Ok(TutorReply::new("Paris is lovely in spring.")));
    h.tutor.hold();

    let (status, body) = call(&app, "POST", "/session/text", Some(serde_json::json!({ "text": "I visit Paris" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "invalid_state");

    call(&app, "POST", "/session/start", None).await;

    let (status, body) = call(&app, "POST", "/session/text", Some(serde_json::json!({ "text": "I visit Paris" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "awaiting_reply");

    h.tutor.release();
    h.wait_for(|s| s.transcript.len() == 2 && s.state == SessionState::Listening)
        .await;

    let (status, body) = call(&app, "GET", "/session/transcript", None).await;
    assert_eq!(status, StatusCode::OK);
    let turns = body.as_array().unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0]["speaker"], "user");
    assert_eq!(turns[0]["text"], "I visit Paris");
    assert_eq!(turns[1]["speaker"], "tutor");

    let (_, body) = call(&app, "GET", "/session/status", None).await;
    assert_eq!(body["turns_count"], 2);
}

#[tokio::test]
async fn test_retry_without_failure_conflicts() {
    let mut h = Harness::new();
    let app = router(&h);
    h.capture
        .script(CaptureScript::Events(vec![loqa_tutor::CaptureEvent::EndOfSpeech]));

    call(&app, "POST", "/session/start", None).await;
    h.wait_for(|s| s.state == SessionState::Idle).await;

    let (status, body) = call(&app, "POST", "/session/retry", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "invalid_state");

    let (status, body) = call(&app, "POST", "/session/listen", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "listening");

    let (status, _) = call(&app, "POST", "/session/finish", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_wake_lock_revocation_is_reported() {
    let h = Harness::new();
    let app = router(&h);

    call(&app, "POST", "/session/start", None).await;
    assert_eq!(h.wake_lock.acquires(), 1);

    let (status, body) = call(&app, "POST", "/session/wake-lock/revoked", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "listening");

    // Commands are handled in order; this one runs after the notice
    h.controller.listen().await.unwrap();
    assert!(h.wake_lock.is_held());
    assert_eq!(h.wake_lock.releases(), 1);
    assert_eq!(h.wake_lock.acquires(), 2);
}
