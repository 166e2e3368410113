//! Ingestion pipeline and its single-writer job queue.
//!
//! `ingest` runs extract → chunk → embed → merge → save for one
//! training record. The persisted index is a shared mutable resource,
//! so every load-modify-save window holds the pipeline's write lock,
//! and deployments funnel all ingestion through one worker task fed by
//! a job channel: records are announced with an [`IngestJob`] carrying
//! the record id, never by side effect.
//!
//! Corrupt artifacts are wiped and the index is rebuilt from the
//! current batch only. Content ingested before the corruption is gone
//! until an operator re-runs ingestion over the stored records; the
//! outcome flags the rebuild so callers can log it loudly.

use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::chunking::TextSplitter;
use crate::config::EngineConfig;
use crate::embeddings::{EmbeddingProvider, OpenAiEmbeddings};
use crate::extract::extract;
use crate::index::{IndexEntry, IndexError, VectorIndex};
use crate::records::{RecordStore, TrainingRecord};
use crate::types::EngineError;

/// Queue message: one per created training record.
#[derive(Clone, Debug)]
pub struct IngestJob {
    pub record_id: String,
}

/// What an ingestion run did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The record had no extractable content; nothing changed.
    NoContent,
    Indexed {
        chunks: usize,
        /// True when corrupt artifacts were discarded and the index
        /// was rebuilt from this batch alone.
        rebuilt: bool,
    },
}

pub struct IngestionPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    splitter: TextSplitter,
    index_dir: PathBuf,
    http: Client,
    write_lock: Mutex<()>,
}

impl IngestionPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        splitter: TextSplitter,
        index_dir: impl Into<PathBuf>,
        http: Client,
    ) -> Self {
        Self {
            embedder,
            splitter,
            index_dir: index_dir.into(),
            http,
            write_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        let embedder = OpenAiEmbeddings::new(
            &config.openai_api_key,
            &config.openai_base_url,
            config.embedding_model.clone(),
            config.embedding_dimensions,
            config.request_timeout,
        )?;
        let http = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self::new(
            Arc::new(embedder),
            TextSplitter::new(config.chunk_size, config.chunk_overlap),
            config.index_dir.clone(),
            http,
        ))
    }

    pub fn index_dir(&self) -> &std::path::Path {
        &self.index_dir
    }

    /// Ingest one training record into the persisted index.
    pub async fn ingest(&self, record: &TrainingRecord) -> Result<IngestOutcome, EngineError> {
        let documents = extract(record, &self.http).await?;
        if documents.is_empty() {
            tracing::info!(record = %record.id, "no extractable content, skipping");
            return Ok(IngestOutcome::NoContent);
        }

        let mut texts = Vec::new();
        let mut origins = Vec::new();
        for document in &documents {
            for chunk in self.splitter.split(&document.text) {
                texts.push(chunk);
                origins.push(document.origin.clone());
            }
        }
        if texts.is_empty() {
            tracing::info!(record = %record.id, "documents reduced to no chunks, skipping");
            return Ok(IngestOutcome::NoContent);
        }

        let vectors = self.embedder.embed_batch(&texts).await?;
        let entries: Vec<IndexEntry> = texts
            .into_iter()
            .zip(origins)
            .zip(vectors)
            .map(|((text, origin), embedding)| IndexEntry {
                text,
                origin,
                embedding,
            })
            .collect();
        let chunk_count = entries.len();

        // One writer at a time: the whole load-modify-save window is
        // exclusive, otherwise concurrent ingests drop each other's rows.
        let _guard = self.write_lock.lock().await;

        let mut rebuilt = false;
        let mut index = if VectorIndex::exists(&self.index_dir) {
            match VectorIndex::load(&self.index_dir, self.embedder.dimensions()) {
                Ok(index) => index,
                Err(IndexError::Corrupt { dir, reason }) => {
                    tracing::warn!(
                        dir = %dir.display(),
                        reason = %reason,
                        "index artifacts are corrupt; discarding and rebuilding from this batch"
                    );
                    VectorIndex::wipe(&self.index_dir)?;
                    rebuilt = true;
                    VectorIndex::build(self.embedder.name(), self.embedder.dimensions(), Vec::new())?
                }
                Err(err) => return Err(err.into()),
            }
        } else {
            VectorIndex::build(self.embedder.name(), self.embedder.dimensions(), Vec::new())?
        };

        index.add(entries)?;
        index.save(&self.index_dir)?;

        tracing::info!(
            record = %record.id,
            chunks = chunk_count,
            total = index.len(),
            rebuilt,
            "training record ingested"
        );
        Ok(IngestOutcome::Indexed {
            chunks: chunk_count,
            rebuilt,
        })
    }

    /// Creates the index with a single seed entry when none exists.
    /// Returns `false` if an index was already present.
    pub async fn initialize_index(&self, seed_text: &str) -> Result<bool, EngineError> {
        let _guard = self.write_lock.lock().await;
        if VectorIndex::exists(&self.index_dir) {
            return Ok(false);
        }
        let embedding = self.embedder.embed(seed_text).await?;
        let index = VectorIndex::build(
            self.embedder.name(),
            self.embedder.dimensions(),
            vec![IndexEntry {
                text: seed_text.to_string(),
                origin: None,
                embedding,
            }],
        )?;
        index.save(&self.index_dir)?;
        Ok(true)
    }

    /// Removes the persisted artifacts. Callers re-ingest afterwards.
    pub async fn wipe_index(&self) -> Result<(), EngineError> {
        let _guard = self.write_lock.lock().await;
        VectorIndex::wipe(&self.index_dir)?;
        Ok(())
    }
}

/// Unbounded job channel for ingest announcements.
pub fn ingest_channel() -> (flume::Sender<IngestJob>, flume::Receiver<IngestJob>) {
    flume::unbounded()
}

/// Spawns the single ingestion worker. It drains jobs until every
/// sender is dropped; failures are logged, never retried here — retry
/// policy belongs to whoever enqueues.
pub fn spawn_ingest_worker(
    pipeline: Arc<IngestionPipeline>,
    store: RecordStore,
    jobs: flume::Receiver<IngestJob>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Ok(job) = jobs.recv_async().await {
            match store.get_training(&job.record_id).await {
                Ok(Some(record)) => {
                    if let Err(err) = pipeline.ingest(&record).await {
                        tracing::error!(record = %job.record_id, error = %err, "ingestion failed");
                    }
                }
                Ok(None) => {
                    tracing::warn!(record = %job.record_id, "ingest job for unknown record");
                }
                Err(err) => {
                    tracing::error!(record = %job.record_id, error = %err, "could not load training record");
                }
            }
        }
        tracing::debug!("ingest queue closed, worker exiting");
    })
}
