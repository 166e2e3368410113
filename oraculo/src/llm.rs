//! Chat completion clients: the external language model collaborator.

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use crate::types::EngineError;

/// Lazy, finite sequence of completion text fragments.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, EngineError>> + Send>>;

/// Streams grounded completions. Implementations pin temperature to 0
/// so repeated runs over the same evidence stay stable.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn stream_completion(&self, system: &str, user: &str) -> Result<TokenStream, EngineError>;
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
///
/// The underlying HTTP client is built without a total-request
/// timeout: completion streams are open-ended and the caller owns the
/// connection lifetime.
#[derive(Clone)]
pub struct OpenAiChat {
    client: Client,
    endpoint: String,
    model: String,
}

impl OpenAiChat {
    pub fn new(api_key: &str, base_url: &str, model: impl Into<String>) -> Result<Self, EngineError> {
        if api_key.trim().is_empty() {
            return Err(EngineError::Config("chat API key is empty".into()));
        }
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| EngineError::Config("chat API key is not a valid header".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder().default_headers(headers).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.into(),
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    stream: bool,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct StreamFrame {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn stream_completion(&self, system: &str, user: &str) -> Result<TokenStream, EngineError> {
        let request = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            stream: true,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let mut bytes = response.bytes_stream();
        let stream = async_stream::stream! {
            let mut buffer = String::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        yield Err(EngineError::Http(err));
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim().to_string();
                    buffer.drain(..=pos);
                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data == "[DONE]" {
                        return;
                    }
                    match serde_json::from_str::<StreamFrame>(data) {
                        Ok(frame) => {
                            let token = frame
                                .choices
                                .into_iter()
                                .next()
                                .and_then(|choice| choice.delta.content);
                            if let Some(token) = token {
                                if !token.is_empty() {
                                    yield Ok(token);
                                }
                            }
                        }
                        Err(err) => {
                            yield Err(EngineError::Completion(format!(
                                "unreadable stream frame: {err}"
                            )));
                            return;
                        }
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

/// Scripted chat model for tests: replays fixed tokens or fails on
/// request, and records every (system, user) prompt pair it received.
#[derive(Clone, Default)]
pub struct MockChatModel {
    tokens: Vec<String>,
    fail: bool,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockChatModel {
    pub fn scripted<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
            fail: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing() -> Self {
        Self {
            tokens: Vec::new(),
            fail: true,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Prompt pairs observed so far.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().expect("mock call log poisoned").clone()
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn stream_completion(&self, system: &str, user: &str) -> Result<TokenStream, EngineError> {
        self.calls
            .lock()
            .expect("mock call log poisoned")
            .push((system.to_string(), user.to_string()));
        if self.fail {
            return Err(EngineError::Completion("scripted failure".into()));
        }
        let tokens = self.tokens.clone();
        let stream = async_stream::stream! {
            for token in tokens {
                yield Ok(token);
            }
        };
        Ok(Box::pin(stream))
    }
}
