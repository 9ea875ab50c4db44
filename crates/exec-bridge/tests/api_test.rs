//! HTTP-level tests against the router.
#![cfg(unix)]

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use exec_bridge::{router, AppState};
use exec_bridge_core::ServerConfig;

/// Echoes its target and arguments, then upper-cases one input line.
const SCRIPT: &str = r#"echo "target=$0"; echo "args=$*"; read line; echo "got $line" | tr a-z A-Z"#;

struct Fixture {
    app: Router,
    root: TempDir,
}

fn fixture_with(max_sessions: usize) -> Fixture {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir(root.path().join("Show.S01")).unwrap();
    std::fs::write(root.path().join("movie.mkv"), b"x").unwrap();

    let mut config = ServerConfig::default();
    config.browse.roots = vec![root.path().to_path_buf()];
    config.command.program = "/bin/sh".to_string();
    config.command.args = vec!["-c".to_string(), SCRIPT.to_string()];
    config.command.env.clear();
    config.sessions.max_sessions = max_sessions;
    config.sessions.kill_grace_ms = 500;

    Fixture {
        app: router(AppState::new(&config)),
        root,
    }
}

fn fixture() -> Fixture {
    fixture_with(4)
}

impl Fixture {
    fn path(&self, name: &str) -> String {
        self.root.path().join(name).to_string_lossy().into_owned()
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn start(&self, name: &str, args: &str) -> String {
        let (status, body) = self
            .post("/api/sessions", json!({"path": self.path(name), "args": args}))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["id"].as_str().unwrap().to_string()
    }

    /// Read the whole SSE stream and return the decoded data payloads.
    async fn stream(&self, id: &str) -> Vec<Value> {
        let request = Request::get(format!("/api/sessions/{id}/stream"))
            .body(Body::empty())
            .unwrap();
        let response = self.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = tokio::time::timeout(
            Duration::from_secs(10),
            axum::body::to_bytes(response.into_body(), usize::MAX),
        )
        .await
        .expect("stream never ended")
        .unwrap();

        String::from_utf8_lossy(&bytes)
            .lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .map(|data| serde_json::from_str(data).unwrap())
            .collect()
    }

    async fn wait_for_state(&self, id: &str, state: &str) {
        let uri = format!("/api/sessions/{id}");
        let poll = async {
            loop {
                let (_, body) = self.get(&uri).await;
                if body["data"]["state"] == state {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(10), poll)
            .await
            .expect("session never reached expected state");
    }
}

fn text_of(events: &[Value], kind: &str) -> String {
    events
        .iter()
        .filter(|e| e["type"] == kind)
        .filter_map(|e| e["data"].as_str())
        .collect()
}

#[tokio::test]
async fn test_health() {
    let fx = fixture();
    let (status, body) = fx.get("/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "healthy");
}

#[tokio::test]
async fn test_browse_root() {
    let fx = fixture();
    let uri = format!("/api/browse?path={}", fx.root.path().display());
    let (status, body) = fx.get(&uri).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["count"], 2);
    assert_eq!(body["data"]["items"][0]["name"], "Show.S01");
    assert_eq!(body["data"]["items"][0]["kind"], "folder");
    assert_eq!(body["data"]["items"][1]["kind"], "file");
}

#[tokio::test]
async fn test_browse_defaults_to_first_root() {
    let fx = fixture();
    let (status, body) = fx.get("/api/browse").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["count"], 2);
}

#[tokio::test]
async fn test_browse_errors() {
    let fx = fixture();

    let (status, body) = fx.get("/api/browse?path=/").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);

    let uri = format!("/api/browse?path={}", fx.path("missing"));
    let (status, _) = fx.get(&uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let uri = format!("/api/browse?path={}", fx.path("movie.mkv"));
    let (status, _) = fx.get(&uri).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_full_session_flow() {
    let fx = fixture();
    let id = fx.start("Show.S01", "--tmdb 42 -d 'two words'").await;

    let (status, body) = fx
        .post(&format!("/api/sessions/{id}/input"), json!({"input": "hello"}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let events = fx.stream(&id).await;
    assert_eq!(events[0]["type"], "system");
    assert!(events[0]["data"].as_str().unwrap().starts_with("Executing: /bin/sh"));

    let stdout = text_of(&events, "stdout");
    assert!(stdout.contains("target="), "{stdout}");
    assert!(stdout.contains("Show.S01"), "{stdout}");
    assert!(stdout.contains("args=--tmdb 42 -d two words"), "{stdout}");
    assert!(stdout.contains("GOT HELLO"), "{stdout}");

    assert_eq!(events.last().unwrap(), &json!({"type": "exit", "code": 0}));
    assert_eq!(events.iter().filter(|e| e["type"] == "exit").count(), 1);
}

#[tokio::test]
async fn test_start_validation() {
    let fx = fixture();

    let (status, _) = fx.post("/api/sessions", json!({"args": ""})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = fx
        .post("/api/sessions", json!({"path": fx.path("movie.mkv"), "args": "\"open"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = fx.post("/api/sessions", json!({"path": "/", "args": ""})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let request = Request::post("/api/sessions")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = fx.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_second_stream_conflicts() {
    let fx = fixture();
    let id = fx.start("movie.mkv", "").await;

    let first = fx
        .app
        .clone()
        .oneshot(
            Request::get(format!("/api/sessions/{id}/stream"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let (status, _) = fx.get(&format!("/api/sessions/{id}/stream")).await;
    assert_eq!(status, StatusCode::CONFLICT);

    drop(first);
    let (status, _) = fx.post(&format!("/api/sessions/{id}/kill"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_kill_always_succeeds() {
    let fx = fixture();
    let id = fx.start("movie.mkv", "").await;

    let (status, body) = fx.post(&format!("/api/sessions/{id}/kill"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["message"], "Process terminated");

    let request = Request::delete(format!("/api/sessions/{id}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = fx.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, _) = fx.post("/api/sessions/not-an-id/kill", json!({})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = fx.get(&format!("/api/sessions/{id}/stream")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_input_errors() {
    let fx = fixture();

    let (status, _) = fx
        .post(
            "/api/sessions/00000000-0000-4000-8000-000000000000/input",
            json!({"input": "x"}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let id = fx.start("movie.mkv", "").await;
    fx.post(&format!("/api/sessions/{id}/input"), json!({"input": "bye"}))
        .await;
    fx.wait_for_state(&id, "exited").await;

    let (status, body) = fx
        .post(&format!("/api/sessions/{id}/input"), json!({"input": "late"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_session_limit() {
    let fx = fixture_with(1);
    let id = fx.start("movie.mkv", "").await;

    let (status, _) = fx
        .post("/api/sessions", json!({"path": fx.path("movie.mkv"), "args": ""}))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    fx.post(&format!("/api/sessions/{id}/kill"), json!({})).await;
}

#[tokio::test]
async fn test_list_sessions() {
    let fx = fixture();
    let a = fx.start("movie.mkv", "").await;
    let b = fx.start("Show.S01", "").await;

    let (status, body) = fx.get("/api/sessions").await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|s| s["id"].as_str())
        .collect();
    assert!(ids.contains(&a.as_str()));
    assert!(ids.contains(&b.as_str()));

    for id in [a, b] {
        fx.post(&format!("/api/sessions/{id}/kill"), json!({})).await;
    }
}

#[tokio::test]
async fn test_unknown_route() {
    let fx = fixture();
    let (status, body) = fx.get("/api/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}
