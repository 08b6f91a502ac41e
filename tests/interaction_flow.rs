use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use catalink::app::{build_router, AppState};
use catalink::chat::{ChannelInfo, ChatApi};
use catalink::error::ChatError;
use catalink::render::View;
use catalink::store::Store;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::util::ServiceExt;

const WEBHOOK_SECRET: &str = "test-secret";

#[derive(Default)]
struct FakeChat {
    channels: Mutex<Vec<ChannelInfo>>,
    creates: AtomicUsize,
    renames: AtomicUsize,
    next_id: AtomicUsize,
}

#[async_trait::async_trait]
impl ChatApi for FakeChat {
    async fn send_message(&self, _: &str, _: &View) -> Result<String, ChatError> {
        Ok("m1".into())
    }
    async fn edit_message(&self, _: &str, _: &str, _: &View) -> Result<(), ChatError> {
        Ok(())
    }
    async fn delete_message(&self, _: &str, _: &str) -> Result<(), ChatError> {
        Ok(())
    }
    async fn list_channels(&self) -> Result<Vec<ChannelInfo>, ChatError> {
        Ok(self.channels.lock().unwrap().clone())
    }
    async fn create_channel(&self, name: &str) -> Result<ChannelInfo, ChatError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let channel = ChannelInfo {
            id: format!("c{id}"),
            name: name.to_string(),
        };
        self.channels.lock().unwrap().push(channel.clone());
        Ok(channel)
    }
    async fn rename_channel(&self, channel_id: &str, name: &str) -> Result<(), ChatError> {
        self.renames.fetch_add(1, Ordering::SeqCst);
        let mut channels = self.channels.lock().unwrap();
        if let Some(channel) = channels.iter_mut().find(|c| c.id == channel_id) {
            channel.name = name.to_string();
        }
        Ok(())
    }
}

struct Harness {
    app: Router,
    chat: Arc<FakeChat>,
    _data_dir: tempfile::TempDir,
}

fn harness() -> Harness {
    let data_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::new(data_dir.path()));
    let chat = Arc::new(FakeChat::default());
    let state = AppState::new(store, chat.clone(), WEBHOOK_SECRET.to_string());
    Harness {
        app: build_router(state),
        chat,
        _data_dir: data_dir,
    }
}

fn sign(body: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(body.as_bytes());
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

async fn post(app: &Router, path: &str, payload: Value) -> (StatusCode, Value) {
    let body = payload.to_string();
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .header("x-catalink-signature", sign(&body))
        .body(Body::from(body))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn stamped(mut payload: Value) -> Value {
    payload["timestamp"] = json!(Utc::now().to_rfc3339());
    payload
}

async fn run_command(app: &Router, command: Value) -> Value {
    let (status, reply) = post(app, "/commands", stamped(command)).await;
    assert_eq!(status, StatusCode::OK);
    reply["view"].clone()
}

async fn interact(app: &Router, token: &str, input: Option<&str>) -> Value {
    let mut event = json!({ "token": token });
    if let Some(input) = input {
        event["input"] = json!(input);
    }
    let (status, reply) = post(app, "/interactions", stamped(json!({ "event": event }))).await;
    assert_eq!(status, StatusCode::OK);
    reply
}

fn control_token(view: &Value, label_part: &str) -> String {
    view["controls"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["label"].as_str().unwrap().contains(label_part))
        .map(|c| c["token"].as_str().unwrap().to_string())
        .unwrap()
}

#[tokio::test]
async fn unsigned_requests_never_reach_dispatch() {
    let h = harness();
    let body = stamped(json!({ "event": { "token": "view_all:films:" } })).to_string();

    let request = Request::builder()
        .method("POST")
        .uri("/interactions")
        .header("content-type", "application/json")
        .header("x-catalink-signature", "sha256=deadbeef")
        .body(Body::from(body))
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn stale_timestamps_are_rejected() {
    let h = harness();
    let payload = json!({
        "timestamp": "2020-01-01T00:00:00Z",
        "event": { "token": "view_all:films:" },
    });
    let (status, _) = post(&h.app, "/interactions", payload).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn add_rate_and_select_scenario() {
    let h = harness();

    let view = run_command(
        &h.app,
        json!({
            "command": "add",
            "category": "films",
            "title": "Dune",
            "url": "http://x",
            "themes": "scifi,drama",
        }),
    )
    .await;
    assert!(view["title"].as_str().unwrap().contains("Dune"));
    assert!(view["fields"][0]["value"]
        .as_str()
        .unwrap()
        .contains("Scifi"));

    // Not rated yet.
    let reply = interact(&h.app, "select:films:Dune", None).await;
    assert_eq!(reply["type"], "show");
    assert!(reply["view"]["body"]
        .as_str()
        .unwrap()
        .contains("not rated yet"));

    // Rating sub-flow: first open, then submit 4 and 5.
    let reply = interact(&h.app, "rate:films:dune", None).await;
    assert_eq!(reply["type"], "open_rating");
    assert_eq!(reply["target"], "dune");

    interact(&h.app, "rate:films:dune", Some("4")).await;
    let reply = interact(&h.app, "rate:films:dune", Some("5")).await;
    // 4.5 rounds up to five stars on the display line.
    assert!(reply["view"]["body"].as_str().unwrap().contains("★★★★★"));

    // The select path re-reads the store rather than any cached page.
    let reply = interact(&h.app, "select:films:dune", None).await;
    assert!(!reply["view"]["body"]
        .as_str()
        .unwrap()
        .contains("not rated yet"));
}

#[tokio::test]
async fn pagination_over_the_wire_edits_in_place() {
    let h = harness();
    for i in 0..25 {
        run_command(
            &h.app,
            json!({
                "command": "add",
                "category": "games",
                "title": format!("Game {i:02}"),
                "url": format!("http://g/{i}"),
            }),
        )
        .await;
    }

    let reply = interact(&h.app, "view_all:games:", None).await;
    assert_eq!(reply["type"], "show");
    let page = &reply["view"];
    assert!(page["body"].as_str().unwrap().contains("Page 1/3"));

    let next = control_token(page, "Next");
    let reply = interact(&h.app, &next, None).await;
    assert_eq!(reply["type"], "edit");
    assert!(reply["view"]["body"].as_str().unwrap().contains("Page 2/3"));

    // Replay prev past the boundary: still page 1, still an edit.
    let prev = control_token(&reply["view"], "Previous");
    let mut last = Value::Null;
    for _ in 0..5 {
        last = interact(&h.app, &prev, None).await;
    }
    assert_eq!(last["type"], "edit");
    assert!(last["view"]["body"].as_str().unwrap().contains("Page 1/3"));
}

#[tokio::test]
async fn search_flow_title_theme_and_no_match() {
    let h = harness();
    run_command(
        &h.app,
        json!({
            "command": "add",
            "category": "films",
            "title": "Dune",
            "url": "http://x",
            "themes": "scifi",
        }),
    )
    .await;

    let reply = interact(&h.app, "search:films:", None).await;
    assert_eq!(reply["type"], "open_search");

    let reply = interact(&h.app, "search:films:", Some("dune")).await;
    assert_eq!(reply["view"]["title"], "Dune");

    let reply = interact(&h.app, "search:films:", Some("scifi")).await;
    assert!(reply["view"]["body"].as_str().unwrap().contains("**Dune**"));

    let reply = interact(&h.app, "search:films:", Some("western")).await;
    assert!(reply["view"]["body"].as_str().unwrap().contains("No film"));

    let reply = interact(&h.app, "search:films:", Some("")).await;
    assert!(reply["view"]["body"].as_str().unwrap().contains("No film"));
}

#[tokio::test]
async fn series_import_and_season_removal() {
    let h = harness();

    let view = run_command(
        &h.app,
        json!({
            "command": "import_seasons",
            "title": "Foo",
            "seasons": "S1:http://a,S2:http://b",
        }),
    )
    .await;
    assert!(view["body"].as_str().unwrap().contains("2"));

    let reply = interact(&h.app, "select:series:foo", None).await;
    let body = reply["view"]["body"].as_str().unwrap();
    let s1 = body.find("Season 1").unwrap();
    let s2 = body.find("Season 2").unwrap();
    assert!(s1 < s2);

    let view = run_command(
        &h.app,
        json!({ "command": "delete_season", "title": "foo", "number": 1 }),
    )
    .await;
    assert!(view["body"].as_str().unwrap().contains("1 left"));

    // Removing the last season of the bare series removes the series.
    let view = run_command(
        &h.app,
        json!({ "command": "delete_season", "title": "foo", "number": 2 }),
    )
    .await;
    assert!(view["body"].as_str().unwrap().contains("series is gone"));

    let reply = interact(&h.app, "select:series:foo", None).await;
    assert!(reply["view"]["body"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn mutations_trigger_counter_reconciliation() {
    let h = harness();
    run_command(
        &h.app,
        json!({
            "command": "add",
            "category": "software",
            "title": "Gimp",
            "url": "http://g",
        }),
    )
    .await;

    // The post-command sweep runs on a spawned task.
    let mut found = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let names: Vec<String> = h
            .chat
            .channels
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.name.clone())
            .collect();
        if names.contains(&"Available software : 1".to_string()) {
            found = true;
            break;
        }
    }
    assert!(found, "counter channel was never reconciled");
}

#[tokio::test]
async fn unknown_category_commands_are_rejected_softly() {
    let h = harness();
    let view = run_command(
        &h.app,
        json!({
            "command": "add",
            "category": "books",
            "title": "Dune",
            "url": "http://x",
        }),
    )
    .await;
    assert!(view["body"].as_str().unwrap().contains("Unknown category"));

    let reply = interact(&h.app, "select:books:dune", None).await;
    assert!(reply["view"]["body"].as_str().unwrap().contains("Not found"));
}
