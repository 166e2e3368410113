//! Relational store for training records, questions, and retrieved
//! evidence.
//!
//! Training records are written once by the intake surface and
//! consumed by the ingestion worker; questions are written when an
//! answer run starts; evidence rows capture exactly which chunks
//! grounded each answer so sources can be shown after the fact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio_rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::types::EngineError;

/// An operator-submitted training input. Immutable once stored.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub id: String,
    pub site: Option<String>,
    pub raw_text: Option<String>,
    pub document_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TrainingRecord {
    pub fn new(
        site: Option<String>,
        raw_text: Option<String>,
        document_path: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            site,
            raw_text,
            document_path,
            created_at: Utc::now(),
        }
    }

    /// True when at least one extractable field is populated.
    pub fn has_content(&self) -> bool {
        let filled = |field: &Option<String>| {
            field
                .as_deref()
                .is_some_and(|value| !value.trim().is_empty())
        };
        filled(&self.site) || filled(&self.raw_text) || filled(&self.document_path)
    }
}

/// A user question. Immutable once stored.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Question {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}

/// A chunk that grounded an answer, linked to its question.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub id: String,
    pub question_id: String,
    pub origin: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl EvidenceRecord {
    pub fn new(
        question_id: impl Into<String>,
        origin: Option<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            question_id: question_id.into(),
            origin,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS trainings (
    id TEXT PRIMARY KEY,
    site TEXT,
    raw_text TEXT,
    document_path TEXT,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS questions (
    id TEXT PRIMARY KEY,
    text TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS evidence (
    id TEXT PRIMARY KEY,
    question_id TEXT NOT NULL,
    origin TEXT,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS evidence_question ON evidence (question_id);
";

/// SQLite-backed store shared by the engine and the relay service.
#[derive(Clone)]
pub struct RecordStore {
    conn: Connection,
}

impl RecordStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let conn = Connection::open(path.as_ref().to_path_buf()).await?;
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)
                ?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    pub async fn insert_training(&self, record: &TrainingRecord) -> Result<(), EngineError> {
        let record = record.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO trainings (id, site, raw_text, document_path, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    (
                        record.id,
                        record.site,
                        record.raw_text,
                        record.document_path,
                        record.created_at.to_rfc3339(),
                    ),
                )
                ?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get_training(&self, id: &str) -> Result<Option<TrainingRecord>, EngineError> {
        let id = id.to_string();
        let record = self
            .conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT id, site, raw_text, document_path, created_at \
                     FROM trainings WHERE id = ?1",
                    [&id],
                    |row| {
                        Ok(TrainingRecord {
                            id: row.get(0)?,
                            site: row.get(1)?,
                            raw_text: row.get(2)?,
                            document_path: row.get(3)?,
                            created_at: parse_timestamp(&row.get::<_, String>(4)?),
                        })
                    },
                )
                .optional()
            })
            .await?;
        Ok(record)
    }

    /// All training records, oldest first, for full re-ingestion.
    pub async fn list_trainings(&self) -> Result<Vec<TrainingRecord>, EngineError> {
        let records = self
            .conn
            .call(|conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, site, raw_text, document_path, created_at \
                         FROM trainings ORDER BY created_at, id",
                    )
                    ?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(TrainingRecord {
                            id: row.get(0)?,
                            site: row.get(1)?,
                            raw_text: row.get(2)?,
                            document_path: row.get(3)?,
                            created_at: parse_timestamp(&row.get::<_, String>(4)?),
                        })
                    })
                    ?;
                let mut records = Vec::new();
                for row in rows {
                    records.push(row?);
                }
                Ok(records)
            })
            .await?;
        Ok(records)
    }

    pub async fn insert_question(&self, question: &Question) -> Result<(), EngineError> {
        let question = question.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO questions (id, text, created_at) VALUES (?1, ?2, ?3)",
                    (
                        question.id,
                        question.text,
                        question.created_at.to_rfc3339(),
                    ),
                )
                ?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn insert_evidence(&self, rows: Vec<EvidenceRecord>) -> Result<(), EngineError> {
        if rows.is_empty() {
            return Ok(());
        }
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                for row in rows {
                    tx.execute(
                        "INSERT INTO evidence (id, question_id, origin, content, created_at) \
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        (
                            row.id,
                            row.question_id,
                            row.origin,
                            row.content,
                            row.created_at.to_rfc3339(),
                        ),
                    )
                    ?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn evidence_for_question(
        &self,
        question_id: &str,
    ) -> Result<Vec<EvidenceRecord>, EngineError> {
        let question_id = question_id.to_string();
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, question_id, origin, content, created_at \
                         FROM evidence WHERE question_id = ?1 ORDER BY created_at, id",
                    )
                    ?;
                let rows = stmt
                    .query_map([&question_id], |row| {
                        Ok(EvidenceRecord {
                            id: row.get(0)?,
                            question_id: row.get(1)?,
                            origin: row.get(2)?,
                            content: row.get(3)?,
                            created_at: parse_timestamp(&row.get::<_, String>(4)?),
                        })
                    })
                    ?;
                let mut records = Vec::new();
                for row in rows {
                    records.push(row?);
                }
                Ok(records)
            })
            .await?;
        Ok(rows)
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|stamp| stamp.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
