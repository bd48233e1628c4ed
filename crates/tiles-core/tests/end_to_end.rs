//! End-to-end dispatch through the message router against a mock provider.
//!
//! Each test wires a full [`Engine`] with a file-backed cache in a temp
//! directory and the primary endpoint pointed at a [`wiremock`] server.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tiles_core::{CacheEntry, CacheStore, Engine, JsonFileStore, StoreKind, derive_key};
use tiles_llm::StaticSettings;
use tiles_types::config::{ProviderKind, ProviderSettings, TilesConfig};
use tiles_types::{Descriptor, Label, SecretString};

// ── Helpers ─────────────────────────────────────────────────────────────

struct Harness {
    engine: Engine,
    _dir: TempDir,
    cache_path: std::path::PathBuf,
}

fn harness(server: &MockServer, key: &str) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("cache.json");

    let mut config = TilesConfig::default();
    config.endpoints.openai = server.uri();
    config.cache.path = Some(cache_path.clone());
    config.retry.max_retries = 0;

    let settings = Arc::new(StaticSettings::new(ProviderSettings {
        kind: ProviderKind::OpenAi,
        model: "gpt-4o-mini".into(),
        api_key: SecretString::new(key),
        force_local: false,
    }));
    Harness {
        engine: Engine::with_store(config, settings, StoreKind::File),
        _dir: dir,
        cache_path,
    }
}

fn tiles() -> Vec<Descriptor> {
    vec![
        Descriptor::new("Linear algebra lecture 5", "MIT OpenCourseWare", 3100),
        Descriptor::new("Funny fails compilation", "FailArmy", 420),
        Descriptor::new("My 5am morning routine", "StudyTube", 780),
    ]
}

fn classify_msg(tiles: &[Descriptor]) -> Value {
    json!({"type": "CLASSIFY_BATCH", "navId": 1000, "payload": tiles})
}

fn chat_envelope(items: Value) -> Value {
    json!({
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": json!({"items": items}).to_string()},
            "finish_reason": "stop"
        }]
    })
}

/// Items the provider was asked to classify, read from the request body.
fn requested_items(request: &wiremock::Request) -> Vec<Value> {
    let body: Value = serde_json::from_slice(&request.body).unwrap();
    let user: Value = serde_json::from_str(body["messages"][1]["content"].as_str().unwrap()).unwrap();
    user["items"].as_array().unwrap().clone()
}

fn labels(reply: &Value) -> Vec<String> {
    reply["result"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["label"].as_str().unwrap().to_string())
        .collect()
}

// ── Scenarios ───────────────────────────────────────────────────────────

#[tokio::test]
async fn all_misses_are_classified_and_stored() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_envelope(json!([
            {"index": 0, "label": "Learning - Academic Study", "confidence": 0.93},
            {"index": 1, "label": "Entertainment", "confidence": 0.88},
            {"index": 2, "label": "Motivation & Self", "confidence": 0.71},
        ]))))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, "sk-test");
    let reply = h.engine.router().handle(classify_msg(&tiles())).await;

    assert_eq!(reply["ok"], true);
    assert_eq!(
        labels(&reply),
        vec!["Learning - Academic Study", "Entertainment", "Motivation & Self"]
    );
    for label in labels(&reply) {
        assert!(Label::parse(&label).is_some());
    }

    h.engine.shutdown().await;
    let keys: Vec<_> = tiles().iter().map(derive_key).collect();
    let reopened = JsonFileStore::new(&h.cache_path);
    let stored = reopened.get_many(&keys).await.unwrap();
    assert_eq!(stored.len(), 3);
    assert_eq!(stored[&keys[1]].label, Label::Entertainment);
}

#[tokio::test]
async fn partial_hits_send_only_the_miss() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_envelope(json!([
            {"index": 0, "label": "Entertainment", "confidence": 0.9},
        ]))))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, "sk-test");
    let batch = tiles();
    let now = Utc::now();
    JsonFileStore::new(&h.cache_path)
        .put_many(vec![
            CacheEntry::new(derive_key(&batch[0]), Label::AcademicStudy, 0.9, now),
            CacheEntry::new(derive_key(&batch[2]), Label::MotivationSelf, 0.8, now),
        ])
        .await
        .unwrap();

    let reply = h.engine.router().handle(classify_msg(&batch)).await;
    assert_eq!(reply["ok"], true);
    assert_eq!(
        labels(&reply),
        vec!["Learning - Academic Study", "Entertainment", "Motivation & Self"]
    );
    let indices: Vec<u64> = reply["result"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["index"].as_u64().unwrap())
        .collect();
    assert_eq!(indices, vec![0, 1, 2]);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let sent = requested_items(&requests[0]);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["title"], "Funny fails compilation");
    h.engine.shutdown().await;
}

#[tokio::test]
async fn malformed_output_resolves_to_custom_zero() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "Sure! Here are your labels: ..."}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, "sk-test");
    let reply = h.engine.router().handle(classify_msg(&tiles())).await;

    assert_eq!(reply["ok"], true);
    let result = reply["result"].as_array().unwrap();
    assert_eq!(result.len(), 3);
    for r in result {
        assert_eq!(r["label"], "Custom");
        assert_eq!(r["confidence"], 0.0);
    }
    h.engine.shutdown().await;
    assert_eq!(h.engine.cache().len().await.unwrap(), 0);
}

#[tokio::test]
async fn missing_key_classifies_locally_without_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&server, "");
    let reply = h.engine.router().handle(classify_msg(&tiles())).await;

    assert_eq!(reply["ok"], true);
    assert_eq!(
        labels(&reply),
        vec!["Learning - Academic Study", "Entertainment", "Motivation & Self"]
    );
    assert!(server.received_requests().await.unwrap().is_empty());
    h.engine.shutdown().await;
}

// ── Protocol edges ──────────────────────────────────────────────────────

#[tokio::test]
async fn invalid_payload_is_rejected_before_any_work() {
    let server = MockServer::start().await;
    let h = harness(&server, "sk-test");

    let reply = h
        .engine
        .router()
        .handle(json!({"type": "CLASSIFY_BATCH", "navId": 1, "payload": {"title": "x"}, "id": "r1"}))
        .await;
    assert_eq!(
        reply,
        json!({"ok": false, "error": "Invalid payload: expected array of TileMetadata", "id": "r1"})
    );
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn stale_nav_id_short_circuits() {
    let server = MockServer::start().await;
    let h = harness(&server, "sk-test");
    let router = h.engine.router();

    let nav = router
        .handle(json!({"type": "NAVIGATION_CHANGED", "navId": 2000}))
        .await;
    assert_eq!(nav, json!({"ok": true, "aborted": true, "navId": 2000}));

    let reply = router.handle(classify_msg(&tiles())).await;
    assert_eq!(reply, json!({"stale": true}));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_nav_id_uses_active_epoch() {
    let server = MockServer::start().await;
    let h = harness(&server, "");
    let router = h.engine.router();

    router.handle(json!({"type": "NAVIGATION_CHANGED", "navId": 55})).await;
    let reply = router
        .handle(json!({"type": "CLASSIFY_BATCH", "items": [{"title": "Morning routine"}]}))
        .await;
    assert_eq!(reply["ok"], true);
    h.engine.shutdown().await;
}

#[tokio::test]
async fn api_config_never_reveals_key() {
    let server = MockServer::start().await;
    let h = harness(&server, "sk-secret-value");
    let reply = h.engine.router().handle(json!({"type": "GET_API_CONFIG"})).await;

    assert_eq!(reply["ok"], true);
    assert_eq!(reply["provider"], "openai");
    assert_eq!(reply["model"], "gpt-4o-mini");
    assert_eq!(reply["hasKey"], true);
    assert!(!reply.to_string().contains("sk-secret-value"));
}
