//! Answer pipeline behavior: fixed messages for missing preconditions,
//! persisted evidence, and the never-raises stream boundary.

use std::sync::Arc;

use futures_util::StreamExt;
use tempfile::TempDir;

use oraculo::answer::{AnswerPipeline, FAILURE_MESSAGE, NO_EVIDENCE_MESSAGE, NO_INDEX_MESSAGE};
use oraculo::embeddings::{EmbeddingProvider, MockEmbeddingProvider};
use oraculo::index::{IndexEntry, VectorIndex};
use oraculo::llm::MockChatModel;
use oraculo::records::RecordStore;

const DIMENSIONS: usize = 64;

async fn store() -> (TempDir, RecordStore) {
    let dir = TempDir::new().unwrap();
    let store = RecordStore::open(dir.path().join("records.db")).await.unwrap();
    (dir, store)
}

async fn collect(stream: impl futures_util::Stream<Item = String>) -> Vec<String> {
    futures_util::pin_mut!(stream);
    let mut tokens = Vec::new();
    while let Some(token) = stream.next().await {
        tokens.push(token);
    }
    tokens
}

/// Builds and saves an index over the given (text, origin) chunks.
async fn seed_index(dir: &TempDir, embedder: &MockEmbeddingProvider, chunks: &[(&str, Option<&str>)]) {
    let mut entries = Vec::new();
    for (text, origin) in chunks {
        entries.push(IndexEntry {
            text: text.to_string(),
            origin: origin.map(str::to_string),
            embedding: embedder.embed(text).await.unwrap(),
        });
    }
    let index = VectorIndex::build("mock", DIMENSIONS, entries).unwrap();
    index.save(dir.path()).unwrap();
}

#[tokio::test]
async fn missing_index_yields_one_fixed_message_and_no_model_call() {
    let index_dir = TempDir::new().unwrap();
    let (_db, store) = store().await;
    let chat = MockChatModel::scripted(["never"]);
    let pipeline = AnswerPipeline::new(
        Arc::new(MockEmbeddingProvider::with_dimensions(DIMENSIONS)),
        Arc::new(chat.clone()),
        store,
        index_dir.path(),
        5,
    );

    let question = pipeline.open_question("anyone there?").await.unwrap();
    let tokens = collect(pipeline.answer(question)).await;

    assert_eq!(tokens, vec![NO_INDEX_MESSAGE.to_string()]);
    assert!(chat.calls().is_empty(), "no completion may be attempted");
}

#[tokio::test]
async fn empty_retrieval_yields_the_no_evidence_message() {
    let index_dir = TempDir::new().unwrap();
    let (_db, store) = store().await;
    let embedder = MockEmbeddingProvider::with_dimensions(DIMENSIONS);
    seed_index(&index_dir, &embedder, &[]).await;

    let chat = MockChatModel::scripted(["never"]);
    let pipeline = AnswerPipeline::new(
        Arc::new(embedder),
        Arc::new(chat.clone()),
        store,
        index_dir.path(),
        5,
    );

    let question = pipeline.open_question("what now?").await.unwrap();
    let tokens = collect(pipeline.answer(question)).await;

    assert_eq!(tokens, vec![NO_EVIDENCE_MESSAGE.to_string()]);
    assert!(chat.calls().is_empty());
}

#[tokio::test]
async fn grounded_answer_streams_tokens_and_persists_evidence() {
    let index_dir = TempDir::new().unwrap();
    let (_db, store) = store().await;
    let embedder = MockEmbeddingProvider::with_dimensions(DIMENSIONS);
    seed_index(
        &index_dir,
        &embedder,
        &[
            ("Refunds are honored within thirty days.", Some("uploads/policy.md")),
            ("Support answers within two business days.", None),
        ],
    )
    .await;

    let chat = MockChatModel::scripted(["Refunds ", "take ", "thirty days."]);
    let pipeline = AnswerPipeline::new(
        Arc::new(embedder),
        Arc::new(chat.clone()),
        store.clone(),
        index_dir.path(),
        5,
    );

    let question = pipeline
        .open_question("how long do refunds take?")
        .await
        .unwrap();
    let tokens = collect(pipeline.answer(question.clone())).await;
    assert_eq!(tokens.join(""), "Refunds take thirty days.");

    let evidence = store.evidence_for_question(&question.id).await.unwrap();
    assert_eq!(evidence.len(), 2);
    assert!(
        evidence
            .iter()
            .any(|row| row.origin.as_deref() == Some("uploads/policy.md"))
    );

    let calls = chat.calls();
    assert_eq!(calls.len(), 1);
    let (system, user) = &calls[0];
    assert!(system.contains("[source: policy.md]"));
    assert!(system.contains("[source: Unknown]"));
    assert!(system.contains("Refunds are honored within thirty days."));
    assert_eq!(user, "how long do refunds take?");
}

#[tokio::test]
async fn generation_failure_becomes_a_single_diagnostic_token() {
    let index_dir = TempDir::new().unwrap();
    let (_db, store) = store().await;
    let embedder = MockEmbeddingProvider::with_dimensions(DIMENSIONS);
    seed_index(&index_dir, &embedder, &[("Some knowledge.", None)]).await;

    let pipeline = AnswerPipeline::new(
        Arc::new(embedder),
        Arc::new(MockChatModel::failing()),
        store,
        index_dir.path(),
        5,
    );

    let question = pipeline.open_question("will this work?").await.unwrap();
    let tokens = collect(pipeline.answer(question)).await;
    assert_eq!(tokens, vec![FAILURE_MESSAGE.to_string()]);
}

#[tokio::test]
async fn top_k_bounds_the_retrieved_evidence() {
    let index_dir = TempDir::new().unwrap();
    let (_db, store) = store().await;
    let embedder = MockEmbeddingProvider::with_dimensions(DIMENSIONS);
    let chunks: Vec<String> = (0..8)
        .map(|i| format!("Fact number {i} about the warranty program."))
        .collect();
    let chunk_refs: Vec<(&str, Option<&str>)> =
        chunks.iter().map(|text| (text.as_str(), None)).collect();
    seed_index(&index_dir, &embedder, &chunk_refs).await;

    let pipeline = AnswerPipeline::new(
        Arc::new(embedder),
        Arc::new(MockChatModel::scripted(["ok"])),
        store.clone(),
        index_dir.path(),
        3,
    );

    let question = pipeline.open_question("warranty?").await.unwrap();
    let _ = collect(pipeline.answer(question.clone())).await;

    let evidence = store.evidence_for_question(&question.id).await.unwrap();
    assert_eq!(evidence.len(), 3);
}
