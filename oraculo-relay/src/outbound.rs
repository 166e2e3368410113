//! Outbound Evolution API client.
//!
//! Sends text replies over `POST /message/sendText/{instance}/`,
//! authenticated with the instance's static `apikey` header. Transport
//! failures are logged and reported as `None` — a missed reply must
//! never take the relay down.

use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::time::Duration;

use crate::types::RelayError;

#[derive(Clone)]
pub struct EvolutionApi {
    client: Client,
    base_url: String,
    keys: HashMap<String, String>,
}

impl EvolutionApi {
    pub fn new(
        base_url: impl Into<String>,
        keys: HashMap<String, String>,
    ) -> Result<Self, RelayError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            keys,
        })
    }

    /// Sends a text message; `None` means the endpoint was unreachable
    /// or the instance has no configured key.
    pub async fn send_text(&self, instance: &str, number: &str, text: &str) -> Option<StatusCode> {
        let Some(key) = self.keys.get(instance) else {
            tracing::warn!(instance, "no api key configured for instance");
            return None;
        };
        let url = format!(
            "{}/message/sendText/{}/",
            self.base_url.trim_end_matches('/'),
            instance
        );
        let body = serde_json::json!({ "number": number, "text": text });

        match self
            .client
            .post(&url)
            .header("apikey", key)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    tracing::info!(instance, number, %status, "reply delivered");
                } else {
                    tracing::warn!(instance, number, %status, "evolution api rejected reply");
                }
                Some(status)
            }
            Err(err) => {
                tracing::warn!(instance, number, error = %err, "evolution api unreachable");
                None
            }
        }
    }
}
