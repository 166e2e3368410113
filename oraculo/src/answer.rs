//! Answer pipeline: retrieve evidence, persist it, stream a grounded
//! completion.
//!
//! The returned stream is one-shot and never raises past its boundary:
//! missing preconditions become a single fixed message, and any
//! retrieval or generation failure becomes a single diagnostic token
//! ending the stream.

use futures_util::{Stream, StreamExt};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::embeddings::{EmbeddingProvider, OpenAiEmbeddings};
use crate::index::VectorIndex;
use crate::llm::{ChatModel, OpenAiChat, TokenStream};
use crate::records::{EvidenceRecord, Question, RecordStore};
use crate::types::EngineError;

/// Yielded when no index has been built yet; no model call is made.
pub const NO_INDEX_MESSAGE: &str =
    "The knowledge base has not been trained yet. Add training material and ask again.";

/// Yielded when retrieval finds nothing for the question.
pub const NO_EVIDENCE_MESSAGE: &str =
    "I could not find relevant information for that question in the knowledge base.";

/// Yielded when retrieval or generation fails mid-flight.
pub const FAILURE_MESSAGE: &str =
    "Something went wrong while preparing the answer. Please try again shortly.";

/// Source label used when a chunk carries no origin metadata.
const UNKNOWN_SOURCE: &str = "Unknown";

/// One-shot answer stream; finite, never raises past its boundary.
pub type AnswerStream = Pin<Box<dyn Stream<Item = String> + Send>>;

pub struct AnswerPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    chat: Arc<dyn ChatModel>,
    store: RecordStore,
    index_dir: PathBuf,
    top_k: usize,
}

impl AnswerPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        chat: Arc<dyn ChatModel>,
        store: RecordStore,
        index_dir: impl Into<PathBuf>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            chat,
            store,
            index_dir: index_dir.into(),
            top_k,
        }
    }

    pub fn from_config(config: &EngineConfig, store: RecordStore) -> Result<Self, EngineError> {
        let embedder = OpenAiEmbeddings::new(
            &config.openai_api_key,
            &config.openai_base_url,
            config.embedding_model.clone(),
            config.embedding_dimensions,
            config.request_timeout,
        )?;
        let chat = OpenAiChat::new(
            &config.openai_api_key,
            &config.openai_base_url,
            config.chat_model.clone(),
        )?;
        Ok(Self::new(
            Arc::new(embedder),
            Arc::new(chat),
            store,
            config.index_dir.clone(),
            config.top_k,
        ))
    }

    /// Persists the question row answers and evidence will link to.
    pub async fn open_question(&self, text: &str) -> Result<Question, EngineError> {
        let question = Question::new(text);
        self.store.insert_question(&question).await?;
        Ok(question)
    }

    /// Streams the answer for a recorded question.
    pub fn answer(&self, question: Question) -> AnswerStream {
        let embedder = Arc::clone(&self.embedder);
        let chat = Arc::clone(&self.chat);
        let store = self.store.clone();
        let index_dir = self.index_dir.clone();
        let top_k = self.top_k;

        Box::pin(async_stream::stream! {
            if !VectorIndex::exists(&index_dir) {
                yield NO_INDEX_MESSAGE.to_string();
                return;
            }

            let opened =
                open_completion(&embedder, &chat, &store, &index_dir, top_k, &question).await;
            match opened {
                Ok(Some(mut tokens)) => {
                    while let Some(token) = tokens.next().await {
                        match token {
                            Ok(token) => {
                                if !token.is_empty() {
                                    yield token;
                                }
                            }
                            Err(err) => {
                                tracing::error!(
                                    question = %question.id,
                                    error = %err,
                                    "completion stream failed"
                                );
                                yield FAILURE_MESSAGE.to_string();
                                return;
                            }
                        }
                    }
                }
                Ok(None) => {
                    yield NO_EVIDENCE_MESSAGE.to_string();
                }
                Err(err) => {
                    tracing::error!(
                        question = %question.id,
                        error = %err,
                        "answer preparation failed"
                    );
                    yield FAILURE_MESSAGE.to_string();
                }
            }
        })
    }
}

/// Embed, retrieve, persist evidence, and open the completion stream.
/// `Ok(None)` means retrieval came back empty.
async fn open_completion(
    embedder: &Arc<dyn EmbeddingProvider>,
    chat: &Arc<dyn ChatModel>,
    store: &RecordStore,
    index_dir: &Path,
    top_k: usize,
    question: &Question,
) -> Result<Option<TokenStream>, EngineError> {
    let query = embedder.embed(&question.text).await?;
    let index = VectorIndex::load(index_dir, embedder.dimensions())?;
    let hits = index.search(&query, top_k);
    if hits.is_empty() {
        return Ok(None);
    }

    let evidence: Vec<EvidenceRecord> = hits
        .iter()
        .map(|hit| EvidenceRecord::new(&question.id, hit.origin.clone(), &hit.text))
        .collect();
    store.insert_evidence(evidence).await?;

    let mut system = String::from(
        "You answer questions strictly from the reference material below. \
         When the material does not cover the question, say so.\n",
    );
    for hit in &hits {
        system.push_str(&format!(
            "\n[source: {}]\n{}\n",
            source_label(hit.origin.as_deref()),
            hit.text
        ));
    }

    let tokens = chat.stream_completion(&system, &question.text).await?;
    Ok(Some(tokens))
}

/// Human-readable label for a chunk origin: the file name portion when
/// one can be derived, the raw origin otherwise, `"Unknown"` when absent.
fn source_label(origin: Option<&str>) -> String {
    match origin {
        Some(origin) => Path::new(origin)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| origin.to_string()),
        None => UNKNOWN_SOURCE.to_string(),
    }
}
