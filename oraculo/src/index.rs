//! Persisted flat vector index.
//!
//! The index is the single source of truth for retrieval. On disk it
//! is a named directory holding exactly two artifacts:
//!
//! * [`VECTORS_FILE`] — bincode-encoded embedding matrix;
//! * [`CATALOG_FILE`] — JSON catalog pairing each vector with its chunk
//!   text and origin, plus the embedding model name and dimensions.
//!
//! Both present means the index exists; either absent means it does
//! not. Artifacts that are present but unreadable, or that disagree
//! with each other or with the configured embedding dimensions, load
//! as [`IndexError::Corrupt`] — the caller's cue to wipe and rebuild.
//! Saves stage both artifacts under temporary names and rename them
//! into place so a crashed writer never leaves a half-written index
//! that is indistinguishable from a missing one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

pub const VECTORS_FILE: &str = "vectors.bin";
pub const CATALOG_FILE: &str = "catalog.json";

#[derive(Debug, Error)]
pub enum IndexError {
    /// One or both artifacts are absent.
    #[error("no index at {}", dir.display())]
    Missing { dir: PathBuf },

    /// Artifacts exist but cannot be trusted; wipe and rebuild.
    #[error("corrupt index at {}: {reason}", dir.display())]
    Corrupt { dir: PathBuf, reason: String },

    /// An entry's embedding width disagrees with the index.
    #[error("dimension mismatch: entry has {got}, index expects {expected}")]
    Dimensions { expected: usize, got: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode error: {0}")]
    Encode(String),
}

/// A chunk ready for insertion: text, origin metadata, embedding.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexEntry {
    pub text: String,
    pub origin: Option<String>,
    pub embedding: Vec<f32>,
}

/// A retrieval hit, best match first in [`VectorIndex::search`] output.
#[derive(Clone, Debug, PartialEq)]
pub struct Scored {
    pub text: String,
    pub origin: Option<String>,
    pub score: f32,
}

#[derive(Serialize, Deserialize)]
struct VectorPayload {
    dimensions: u32,
    vectors: Vec<Vec<f32>>,
}

#[derive(Serialize, Deserialize)]
struct CatalogEntry {
    text: String,
    origin: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct Catalog {
    model: String,
    dimensions: usize,
    written_at: DateTime<Utc>,
    entries: Vec<CatalogEntry>,
}

struct StoredEntry {
    text: String,
    origin: Option<String>,
    vector: Vec<f32>,
    norm: f32,
}

/// In-memory flat index over embedded chunks with cosine search.
pub struct VectorIndex {
    model: String,
    dimensions: usize,
    entries: Vec<StoredEntry>,
}

impl VectorIndex {
    /// Builds a fresh index from a batch of entries.
    pub fn build(
        model: impl Into<String>,
        dimensions: usize,
        entries: Vec<IndexEntry>,
    ) -> Result<Self, IndexError> {
        let mut index = Self {
            model: model.into(),
            dimensions,
            entries: Vec::new(),
        };
        index.add(entries)?;
        Ok(index)
    }

    /// Appends entries. Membership is what matters; the relative order
    /// of pre-existing entries is unspecified to callers.
    pub fn add(&mut self, entries: Vec<IndexEntry>) -> Result<(), IndexError> {
        for entry in entries {
            if entry.embedding.len() != self.dimensions {
                return Err(IndexError::Dimensions {
                    expected: self.dimensions,
                    got: entry.embedding.len(),
                });
            }
            let norm = l2_norm(&entry.embedding);
            self.entries.push(StoredEntry {
                text: entry.text,
                origin: entry.origin,
                vector: entry.embedding,
                norm,
            });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Cosine search: up to `k` hits, best first. Score ties keep
    /// insertion order so identical queries return identical rankings.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<Scored> {
        let query_norm = l2_norm(query);
        if k == 0 || query_norm == 0.0 || query.len() != self.dimensions {
            return Vec::new();
        }
        let mut scored: Vec<Scored> = self
            .entries
            .iter()
            .filter(|entry| entry.norm > 0.0)
            .map(|entry| Scored {
                text: entry.text.clone(),
                origin: entry.origin.clone(),
                score: cosine_similarity(query, &entry.vector, query_norm, entry.norm),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    /// True when both artifacts are present under `dir`.
    pub fn exists(dir: impl AsRef<Path>) -> bool {
        let dir = dir.as_ref();
        dir.join(VECTORS_FILE).is_file() && dir.join(CATALOG_FILE).is_file()
    }

    /// Removes the artifacts (leftover temp files included). Used by
    /// corruption recovery and explicit re-ingestion.
    pub fn wipe(dir: impl AsRef<Path>) -> Result<(), IndexError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Ok(());
        }
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            if name == VECTORS_FILE || name == CATALOG_FILE || name.contains(".tmp-") {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    /// Loads the index, verifying artifact agreement and that the
    /// stored dimensions match the currently configured embedding
    /// width — a mismatch signals a stale index needing a rebuild.
    pub fn load(dir: impl AsRef<Path>, expected_dimensions: usize) -> Result<Self, IndexError> {
        let dir = dir.as_ref();
        if !Self::exists(dir) {
            return Err(IndexError::Missing {
                dir: dir.to_path_buf(),
            });
        }

        let corrupt = |reason: String| IndexError::Corrupt {
            dir: dir.to_path_buf(),
            reason,
        };

        let vector_bytes = fs::read(dir.join(VECTORS_FILE))?;
        let (payload, _): (VectorPayload, usize) =
            bincode::serde::decode_from_slice(&vector_bytes, bincode::config::standard())
                .map_err(|err| corrupt(format!("vector artifact undecodable: {err}")))?;

        let catalog_bytes = fs::read(dir.join(CATALOG_FILE))?;
        let catalog: Catalog = serde_json::from_slice(&catalog_bytes)
            .map_err(|err| corrupt(format!("catalog artifact undecodable: {err}")))?;

        if payload.dimensions as usize != catalog.dimensions {
            return Err(corrupt(format!(
                "artifacts disagree on dimensions ({} vs {})",
                payload.dimensions, catalog.dimensions
            )));
        }
        if payload.vectors.len() != catalog.entries.len() {
            return Err(corrupt(format!(
                "{} vectors for {} catalog entries",
                payload.vectors.len(),
                catalog.entries.len()
            )));
        }
        if catalog.dimensions != expected_dimensions {
            return Err(corrupt(format!(
                "index built with {} dimensions, embeddings now produce {}",
                catalog.dimensions, expected_dimensions
            )));
        }

        let mut entries = Vec::with_capacity(catalog.entries.len());
        for (meta, vector) in catalog.entries.into_iter().zip(payload.vectors) {
            if vector.len() != expected_dimensions {
                return Err(corrupt(format!(
                    "vector row has {} components, expected {}",
                    vector.len(),
                    expected_dimensions
                )));
            }
            let norm = l2_norm(&vector);
            entries.push(StoredEntry {
                text: meta.text,
                origin: meta.origin,
                vector,
                norm,
            });
        }

        Ok(Self {
            model: catalog.model,
            dimensions: expected_dimensions,
            entries,
        })
    }

    /// Persists both artifacts, replacing any prior set. Each artifact
    /// is written to a temporary sibling and renamed into place.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<(), IndexError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let payload = VectorPayload {
            dimensions: self.dimensions as u32,
            vectors: self.entries.iter().map(|entry| entry.vector.clone()).collect(),
        };
        let vector_bytes = bincode::serde::encode_to_vec(&payload, bincode::config::standard())
            .map_err(|err| IndexError::Encode(err.to_string()))?;

        let catalog = Catalog {
            model: self.model.clone(),
            dimensions: self.dimensions,
            written_at: Utc::now(),
            entries: self
                .entries
                .iter()
                .map(|entry| CatalogEntry {
                    text: entry.text.clone(),
                    origin: entry.origin.clone(),
                })
                .collect(),
        };
        let catalog_bytes =
            serde_json::to_vec_pretty(&catalog).map_err(|err| IndexError::Encode(err.to_string()))?;

        let stamp = Uuid::new_v4().simple().to_string();
        let vectors_tmp = dir.join(format!("{VECTORS_FILE}.tmp-{stamp}"));
        let catalog_tmp = dir.join(format!("{CATALOG_FILE}.tmp-{stamp}"));

        fs::write(&vectors_tmp, &vector_bytes)?;
        fs::write(&catalog_tmp, &catalog_bytes)?;
        fs::rename(&vectors_tmp, dir.join(VECTORS_FILE))?;
        fs::rename(&catalog_tmp, dir.join(CATALOG_FILE))?;
        Ok(())
    }
}

fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|v| v * v).sum::<f32>().sqrt()
}

fn cosine_similarity(a: &[f32], b: &[f32], a_norm: f32, b_norm: f32) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    dot / (a_norm * b_norm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(text: &str, embedding: Vec<f32>) -> IndexEntry {
        IndexEntry {
            text: text.to_string(),
            origin: Some("doc.md".to_string()),
            embedding,
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let index = VectorIndex::build(
            "mock",
            3,
            vec![
                entry("alpha", vec![1.0, 0.0, 0.0]),
                entry("beta", vec![0.0, 1.0, 0.0]),
            ],
        )
        .unwrap();
        index.save(dir.path()).unwrap();

        assert!(VectorIndex::exists(dir.path()));
        let loaded = VectorIndex::load(dir.path(), 3).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.model(), "mock");

        let hits = loaded.search(&[1.0, 0.0, 0.0], 5);
        assert_eq!(hits[0].text, "alpha");
    }

    #[test]
    fn save_leaves_no_temp_artifacts() {
        let dir = tempdir().unwrap();
        let index = VectorIndex::build("mock", 2, vec![entry("a", vec![1.0, 0.0])]).unwrap();
        index.save(dir.path()).unwrap();
        index.save(dir.path()).unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2, "only the two live artifacts: {names:?}");
    }

    #[test]
    fn missing_artifact_means_no_index() {
        let dir = tempdir().unwrap();
        let index = VectorIndex::build("mock", 2, vec![entry("a", vec![1.0, 0.0])]).unwrap();
        index.save(dir.path()).unwrap();
        std::fs::remove_file(dir.path().join(CATALOG_FILE)).unwrap();

        assert!(!VectorIndex::exists(dir.path()));
        assert!(matches!(
            VectorIndex::load(dir.path(), 2),
            Err(IndexError::Missing { .. })
        ));
    }

    #[test]
    fn garbage_artifacts_load_as_corrupt() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(VECTORS_FILE), b"not bincode").unwrap();
        std::fs::write(dir.path().join(CATALOG_FILE), b"not json").unwrap();

        assert!(matches!(
            VectorIndex::load(dir.path(), 2),
            Err(IndexError::Corrupt { .. })
        ));
    }

    #[test]
    fn stale_dimensions_load_as_corrupt() {
        let dir = tempdir().unwrap();
        let index = VectorIndex::build("mock", 2, vec![entry("a", vec![1.0, 0.0])]).unwrap();
        index.save(dir.path()).unwrap();

        assert!(matches!(
            VectorIndex::load(dir.path(), 4),
            Err(IndexError::Corrupt { .. })
        ));
    }

    #[test]
    fn search_bounds_and_orders_results() {
        let index = VectorIndex::build(
            "mock",
            2,
            vec![
                entry("east", vec![1.0, 0.0]),
                entry("north", vec![0.0, 1.0]),
                entry("northeast", vec![1.0, 1.0]),
            ],
        )
        .unwrap();

        let hits = index.search(&[1.0, 0.1], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "east");
        assert!(hits[0].score >= hits[1].score);

        assert!(index.search(&[1.0, 0.0], 0).is_empty());
        assert!(index.search(&[0.0, 0.0], 3).is_empty());
    }

    #[test]
    fn add_rejects_mismatched_widths() {
        let mut index = VectorIndex::build("mock", 2, Vec::new()).unwrap();
        let err = index.add(vec![entry("bad", vec![1.0, 2.0, 3.0])]).unwrap_err();
        assert!(matches!(err, IndexError::Dimensions { expected: 2, got: 3 }));
    }

    #[test]
    fn wipe_removes_artifacts_and_leftovers() {
        let dir = tempdir().unwrap();
        let index = VectorIndex::build("mock", 2, vec![entry("a", vec![1.0, 0.0])]).unwrap();
        index.save(dir.path()).unwrap();
        std::fs::write(dir.path().join("vectors.bin.tmp-deadbeef"), b"stale").unwrap();

        VectorIndex::wipe(dir.path()).unwrap();
        assert!(!VectorIndex::exists(dir.path()));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
