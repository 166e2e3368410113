//! ```text
//! TrainingRecord ──► extract ──► SourceDocuments
//!                                      │
//!                                      ▼
//!                          chunking::TextSplitter ──► text chunks
//!                                      │
//!                                      ▼
//!                        embeddings::EmbeddingProvider
//!                                      │
//!                                      ▼
//! ingest::IngestionPipeline ──► index::VectorIndex (two on-disk artifacts)
//!                                      │
//!                                      ▼
//! question ──► answer::AnswerPipeline ──► retrieved evidence + token stream
//!                        │
//!                        └─► llm::ChatModel (streamed completion, temperature 0)
//! ```
//!
//! The engine behind a retrieval-grounded chat assistant. Training
//! records are normalized, chunked, embedded, and merged into a
//! persisted flat vector index; questions are answered by retrieving
//! the nearest chunks and streaming a grounded completion. Questions,
//! training records, and the evidence backing each answer live in a
//! small SQLite store for audit.

pub mod answer;
pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod records;
pub mod types;

pub use answer::{AnswerPipeline, AnswerStream};
pub use chunking::TextSplitter;
pub use config::EngineConfig;
pub use embeddings::{EmbeddingProvider, MockEmbeddingProvider, OpenAiEmbeddings};
pub use extract::{SourceDocument, extract};
pub use index::{IndexError, Scored, VectorIndex};
pub use ingest::{IngestJob, IngestOutcome, IngestionPipeline, spawn_ingest_worker};
pub use llm::{ChatModel, MockChatModel, OpenAiChat, TokenStream};
pub use records::{EvidenceRecord, Question, RecordStore, TrainingRecord};
pub use types::EngineError;
