//! HTTP contract tests for the relay routes.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use tempfile::TempDir;
use tower::ServiceExt;

use oraculo::answer::{AnswerPipeline, NO_INDEX_MESSAGE};
use oraculo::embeddings::MockEmbeddingProvider;
use oraculo::ingest::{IngestJob, ingest_channel};
use oraculo::llm::MockChatModel;
use oraculo::records::{EvidenceRecord, Question, RecordStore};
use oraculo_relay::webhook::{RelayState, router};
use oraculo_relay::{Turn, TurnBuffer};

struct TestHarness {
    state: RelayState,
    jobs: flume::Receiver<IngestJob>,
    _turns: flume::Receiver<Turn>,
    _dirs: (TempDir, TempDir),
}

async fn harness() -> TestHarness {
    let index_dir = TempDir::new().unwrap();
    let db_dir = TempDir::new().unwrap();
    let store = RecordStore::open(db_dir.path().join("records.db")).await.unwrap();
    let answers = Arc::new(AnswerPipeline::new(
        Arc::new(MockEmbeddingProvider::new()),
        Arc::new(MockChatModel::scripted(["unused"])),
        store.clone(),
        index_dir.path(),
        5,
    ));
    let (turns, turn_queue) = TurnBuffer::new(Duration::from_secs(120));
    let (ingest, jobs) = ingest_channel();

    TestHarness {
        state: RelayState {
            turns,
            store,
            answers,
            ingest,
        },
        jobs,
        _turns: turn_queue,
        _dirs: (index_dir, db_dir),
    }
}

fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[tokio::test]
async fn valid_webhook_payload_is_acknowledged_and_buffered() {
    let harness = harness().await;
    let app = router(harness.state.clone());

    let payload = serde_json::json!({
        "data": {
            "key": { "remoteJid": "5511999@s.whatsapp.net" },
            "message": { "conversation": "hi" }
        }
    });
    let response = app.oneshot(json_request("/webhook/whatsapp", payload)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "OK");
    assert_eq!(harness.state.turns.pending_senders(), 1);
}

#[tokio::test]
async fn jid_without_at_is_a_bad_request() {
    let harness = harness().await;
    let app = router(harness.state);

    let payload = serde_json::json!({
        "data": {
            "key": { "remoteJid": "5511999" },
            "message": { "conversation": "hi" }
        }
    });
    let response = app.oneshot(json_request("/webhook/whatsapp", payload)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await, "remoteJid is not a phone jid");
}

#[tokio::test]
async fn textless_payload_is_a_bad_request() {
    let harness = harness().await;
    let app = router(harness.state);

    let payload = serde_json::json!({
        "data": {
            "key": { "remoteJid": "5511999@s.whatsapp.net" },
            "message": { "imageMessage": { "caption": null } }
        }
    });
    let response = app.oneshot(json_request("/webhook/whatsapp", payload)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await, "no message text in payload");
}

#[tokio::test]
async fn training_intake_persists_and_enqueues_exactly_one_job() {
    let harness = harness().await;
    let app = router(harness.state.clone());

    let response = app
        .oneshot(json_request(
            "/trainings",
            serde_json::json!({ "raw_text": "the refund policy is thirty days" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body: serde_json::Value =
        serde_json::from_str(&body_text(response).await).unwrap();
    let id = body["id"].as_str().unwrap().to_string();

    let job = harness.jobs.try_recv().unwrap();
    assert_eq!(job.record_id, id);
    assert!(harness.jobs.try_recv().is_err(), "exactly one job per record");

    let stored = harness.state.store.get_training(&id).await.unwrap();
    assert!(stored.is_some());
}

#[tokio::test]
async fn contentless_training_intake_is_rejected() {
    let harness = harness().await;
    let app = router(harness.state);

    let response = app
        .oneshot(json_request("/trainings", serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn asking_without_an_index_streams_the_fixed_message() {
    let harness = harness().await;
    let app = router(harness.state);

    let response = app
        .oneshot(json_request(
            "/questions",
            serde_json::json!({ "text": "anyone home?" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_text(response).await;
    assert!(body.contains(NO_INDEX_MESSAGE));
}

#[tokio::test]
async fn evidence_read_back_returns_persisted_rows() {
    let harness = harness().await;
    let app = router(harness.state.clone());

    let question = Question::new("what grounds this?");
    harness.state.store.insert_question(&question).await.unwrap();
    harness
        .state
        .store
        .insert_evidence(vec![EvidenceRecord::new(
            &question.id,
            Some("policy.md".into()),
            "the grounding chunk",
        )])
        .await
        .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!("/questions/{}/evidence", question.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let rows: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 1);
    assert_eq!(rows[0]["origin"], "policy.md");
    assert_eq!(rows[0]["content"], "the grounding chunk");
}
