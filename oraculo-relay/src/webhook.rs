//! HTTP surface: inbound WhatsApp webhook, training intake, and the
//! question/evidence routes.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use oraculo::answer::AnswerPipeline;
use oraculo::ingest::IngestJob;
use oraculo::records::{RecordStore, TrainingRecord};

use crate::buffer::TurnBuffer;

/// Shared state behind every route.
#[derive(Clone)]
pub struct RelayState {
    pub turns: TurnBuffer,
    pub store: RecordStore,
    pub answers: Arc<AnswerPipeline>,
    pub ingest: flume::Sender<IngestJob>,
}

pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/webhook/whatsapp", post(receive_inbound))
        .route("/trainings", post(create_training))
        .route("/questions", post(ask_question))
        .route("/questions/{id}/evidence", get(question_evidence))
        .with_state(state)
}

/// A validated inbound message: sender phone and raw text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub phone: String,
    pub text: String,
}

/// Why an inbound payload was rejected; the Display text is the
/// response body.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InboundRejection {
    #[error("missing data.key.remoteJid")]
    MissingJid,

    #[error("remoteJid is not a phone jid")]
    BadJid,

    #[error("no message text in payload")]
    NoText,
}

/// Pulls the sender phone and message text out of an Evolution API
/// webhook payload. The text may arrive under any of three keys
/// depending on the client that sent it.
pub fn parse_inbound(payload: &Value) -> Result<InboundMessage, InboundRejection> {
    let jid = payload
        .pointer("/data/key/remoteJid")
        .and_then(Value::as_str)
        .ok_or(InboundRejection::MissingJid)?;
    let phone = jid
        .split_once('@')
        .map(|(phone, _)| phone)
        .filter(|phone| !phone.is_empty())
        .ok_or(InboundRejection::BadJid)?;

    let message = payload
        .pointer("/data/message")
        .ok_or(InboundRejection::NoText)?;
    let text = message
        .pointer("/extendedTextMessage/text")
        .and_then(Value::as_str)
        .or_else(|| message.get("conversation").and_then(Value::as_str))
        .or_else(|| message.pointer("/textMessage/text").and_then(Value::as_str))
        .filter(|text| !text.trim().is_empty())
        .ok_or(InboundRejection::NoText)?;

    Ok(InboundMessage {
        phone: phone.to_string(),
        text: text.to_string(),
    })
}

async fn receive_inbound(State(state): State<RelayState>, Json(payload): Json<Value>) -> Response {
    match parse_inbound(&payload) {
        Ok(message) => {
            tracing::debug!(phone = %message.phone, "inbound message buffered");
            state.turns.append(&message.phone, &message.text);
            (StatusCode::OK, "OK").into_response()
        }
        Err(rejection) => {
            tracing::debug!(error = %rejection, "inbound payload rejected");
            (StatusCode::BAD_REQUEST, rejection.to_string()).into_response()
        }
    }
}

#[derive(Deserialize)]
struct TrainingIntake {
    site: Option<String>,
    raw_text: Option<String>,
    document_path: Option<String>,
}

/// Persists a training record and announces exactly one ingest job.
async fn create_training(
    State(state): State<RelayState>,
    Json(intake): Json<TrainingIntake>,
) -> Response {
    let record = TrainingRecord::new(intake.site, intake.raw_text, intake.document_path);
    if !record.has_content() {
        return (
            StatusCode::BAD_REQUEST,
            "training record needs site, raw_text, or document_path",
        )
            .into_response();
    }
    if let Err(err) = state.store.insert_training(&record).await {
        tracing::error!(error = %err, "could not persist training record");
        return (StatusCode::INTERNAL_SERVER_ERROR, "storage failure").into_response();
    }
    if state
        .ingest
        .send(IngestJob {
            record_id: record.id.clone(),
        })
        .is_err()
    {
        tracing::error!(record = %record.id, "ingest queue is closed");
        return (StatusCode::INTERNAL_SERVER_ERROR, "ingest queue closed").into_response();
    }
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "id": record.id })),
    )
        .into_response()
}

#[derive(Deserialize)]
struct AskBody {
    text: String,
}

/// Records a question and streams its answer tokens over SSE.
async fn ask_question(State(state): State<RelayState>, Json(body): Json<AskBody>) -> Response {
    if body.text.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "question text is empty").into_response();
    }
    let question = match state.answers.open_question(&body.text).await {
        Ok(question) => question,
        Err(err) => {
            tracing::error!(error = %err, "could not record question");
            return (StatusCode::INTERNAL_SERVER_ERROR, "storage failure").into_response();
        }
    };
    let stream = state
        .answers
        .answer(question)
        .map(|token| Ok::<_, Infallible>(SseEvent::default().data(token)));
    Sse::new(stream).into_response()
}

/// Audit read-back: which chunks grounded a given answer.
async fn question_evidence(
    State(state): State<RelayState>,
    Path(question_id): Path<String>,
) -> Response {
    match state.store.evidence_for_question(&question_id).await {
        Ok(rows) => Json(rows).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "could not load evidence");
            (StatusCode::INTERNAL_SERVER_ERROR, "storage failure").into_response()
        }
    }
}
