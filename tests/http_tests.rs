//! HTTP client and orchestrator against a local axum backend.

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use futures::StreamExt;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dryrun_preview::config::ApiSection;
use dryrun_preview::errors::PreviewError;
use dryrun_preview::preview::prober::RetryPolicy;
use dryrun_preview::preview::{
    DryRunApi, HttpDryRunApi, JobStatus, MemoryResumeStore, Message, Orchestrator,
    OrchestratorOptions, Outcome, Phase,
};

const TOKEN: &str = "secret";

#[derive(Default)]
struct Backend {
    status_calls: AtomicUsize,
    stream_teams: Mutex<Vec<String>>,
}

type Params = Query<HashMap<String, String>>;

async fn status(State(backend): State<Arc<Backend>>, Query(params): Params) -> Response {
    let call = backend.status_calls.fetch_add(1, Ordering::SeqCst);
    match params.get("correlationId").map(String::as_str) {
        Some("ghost") => Json(Value::Null).into_response(),
        Some("empty") => StatusCode::OK.into_response(),
        Some("done") => Json(json!("COMPLETED")).into_response(),
        // Not visible on the first call.
        Some("abc") if call == 0 => StatusCode::NOT_FOUND.into_response(),
        Some("abc") => Json(json!("IN_PROGRESS")).into_response(),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
    }
}

async fn snapshot(Query(params): Params) -> Response {
    match params.get("correlationId").map(String::as_str) {
        Some("abc") | Some("done") => Json(json!({
            "messages": [{ "id": 1, "content": "hello (final)" }],
            "status": "COMPLETED",
            "description": "done"
        }))
        .into_response(),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "try later").into_response(),
    }
}

async fn stream(
    State(backend): State<Arc<Backend>>,
    Query(params): Params,
    headers: HeaderMap,
) -> Response {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"));
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    if let Some(team) = params.get("teamId") {
        backend.stream_teams.lock().unwrap().push(team.clone());
    }

    let frames = vec![
        json!({
            "id": "e1",
            "dryRunId": "abc",
            "organizationId": "o1",
            "teamId": "t1",
            "type": "MESSAGE_ADDED",
            "payload": { "message": { "id": 1, "content": "hello" } },
            "timestamp": "2026-01-01T00:00:00Z"
        }),
        json!({ "type": "STATUS_UPDATED", "payload": { "status": "COMPLETED" } }),
    ];
    let events = futures::stream::iter(
        frames
            .into_iter()
            .map(|frame| Ok::<_, Infallible>(Event::default().data(frame.to_string()))),
    );
    Sse::new(events).into_response()
}

async fn serve() -> (String, Arc<Backend>) {
    let backend = Arc::new(Backend::default());
    let app = Router::new()
        .route("/dry-run/status", get(status))
        .route("/dry-run/snapshot", get(snapshot))
        .route("/dry-run/stream", get(stream))
        .with_state(backend.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/"), backend)
}

fn client(base_url: &str, token: Option<&str>) -> HttpDryRunApi {
    let api = ApiSection {
        base_url: base_url.to_string(),
        request_timeout_secs: 5,
        ..ApiSection::default()
    };
    HttpDryRunApi::new(api, token.map(str::to_string)).unwrap()
}

#[tokio::test]
async fn test_status_not_found_and_null_mean_unknown() {
    let (base, _backend) = serve().await;
    let api = client(&base, None);

    assert_eq!(api.fetch_status(&"abc".into(), &"t1".into()).await.unwrap(), None);
    assert_eq!(
        api.fetch_status(&"abc".into(), &"t1".into()).await.unwrap(),
        Some(JobStatus::InProgress)
    );
    assert_eq!(api.fetch_status(&"ghost".into(), &"t1".into()).await.unwrap(), None);
    assert_eq!(api.fetch_status(&"empty".into(), &"t1".into()).await.unwrap(), None);
}

#[tokio::test]
async fn test_status_server_error_is_returned() {
    let (base, _backend) = serve().await;
    let api = client(&base, None);

    let err = api
        .fetch_status(&"broken".into(), &"t1".into())
        .await
        .unwrap_err();
    assert!(matches!(err, PreviewError::Status { status: 500, ref body } if body == "boom"));
}

#[tokio::test]
async fn test_snapshot_round_trip_and_failure() {
    let (base, _backend) = serve().await;
    let api = client(&base, None);

    let snapshot = api.fetch_snapshot(&"abc".into(), &"t1".into()).await.unwrap();
    assert_eq!(snapshot.messages, vec![Message::new(1, "hello (final)")]);
    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.description.as_deref(), Some("done"));

    let err = api
        .fetch_snapshot(&"nope".into(), &"t1".into())
        .await
        .unwrap_err();
    assert!(matches!(err, PreviewError::Status { status: 503, .. }));
}

#[tokio::test]
async fn test_stream_requires_bearer_token() {
    let (base, _backend) = serve().await;
    let api = client(&base, None);

    let err = match api.open_stream(&"abc".into(), &"t1".into(), None).await {
        Ok(_) => panic!("stream opened without a token"),
        Err(e) => e,
    };
    assert!(matches!(err, PreviewError::ConnectionOpenRejected { status: 401 }));
}

#[tokio::test]
async fn test_stream_yields_event_payloads() {
    let (base, backend) = serve().await;
    let api = client(&base, None);

    let events = api
        .open_stream(&"abc".into(), &"t1".into(), Some(TOKEN))
        .await
        .unwrap();
    let payloads: Vec<String> = events.map(|item| item.unwrap()).collect().await;

    assert_eq!(payloads.len(), 2);
    assert!(payloads[0].contains("MESSAGE_ADDED"));
    assert!(payloads[1].contains("COMPLETED"));
    assert_eq!(*backend.stream_teams.lock().unwrap(), vec!["t1".to_string()]);
}

#[tokio::test]
async fn test_invalid_base_url_is_a_config_error() {
    let api = ApiSection {
        base_url: "not a url".into(),
        ..ApiSection::default()
    };
    assert!(matches!(
        HttpDryRunApi::new(api, None),
        Err(PreviewError::Config(_))
    ));
}

fn options(token: Option<&str>) -> OrchestratorOptions {
    OrchestratorOptions {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
        },
        auth_token: token.map(str::to_string),
    }
}

#[tokio::test]
async fn test_orchestrator_over_http() {
    let (base, backend) = serve().await;
    let orchestrator = Orchestrator::spawn(
        Arc::new(client(&base, None)),
        Arc::new(MemoryResumeStore::new()),
        options(Some(TOKEN)),
    );

    let mut rx = orchestrator.track("abc", "t1").await.unwrap();
    let view = tokio::time::timeout(Duration::from_secs(30), rx.wait_for(|v| v.is_terminal()))
        .await
        .unwrap()
        .unwrap()
        .clone();

    assert_eq!(view.phase, Phase::Terminal(Outcome::Ok));
    assert_eq!(view.messages(), &[Message::new(1, "hello (final)")]);
    assert_eq!(view.status(), Some(JobStatus::Completed));
    assert_eq!(view.description(), Some("done"));
    assert_eq!(backend.status_calls.load(Ordering::SeqCst), 2);

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_orchestrator_over_http_without_token() {
    let (base, _backend) = serve().await;
    let orchestrator = Orchestrator::spawn(
        Arc::new(client(&base, None)),
        Arc::new(MemoryResumeStore::new()),
        options(None),
    );

    let mut rx = orchestrator.track("abc", "t1").await.unwrap();
    let view = tokio::time::timeout(Duration::from_secs(30), rx.wait_for(|v| v.is_terminal()))
        .await
        .unwrap()
        .unwrap()
        .clone();

    assert_eq!(view.phase, Phase::Terminal(Outcome::Error));
    assert_eq!(
        view.error(),
        Some("stream connection rejected with HTTP 401")
    );
    assert!(view.messages().is_empty());
}

#[tokio::test]
async fn test_orchestrator_terminal_probe_over_http() {
    let (base, _backend) = serve().await;
    let orchestrator = Orchestrator::spawn(
        Arc::new(client(&base, None)),
        Arc::new(MemoryResumeStore::new()),
        options(None),
    );

    let mut rx = orchestrator.track("done", "t1").await.unwrap();
    let view = tokio::time::timeout(Duration::from_secs(30), rx.wait_for(|v| v.is_terminal()))
        .await
        .unwrap()
        .unwrap()
        .clone();

    assert_eq!(view.phase, Phase::Terminal(Outcome::Ok));
    assert_eq!(view.description(), Some("done"));
}
