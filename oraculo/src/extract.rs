//! Turning stored training records into normalized text documents.
//!
//! A record may carry raw text, a path to an uploaded document, or a
//! site reference; any combination yields zero or more
//! [`SourceDocument`]s. Producing nothing is not an error — the
//! ingestion pipeline treats it as a logged no-op.

use reqwest::Client;
use scraper::{Html, Selector};
use std::path::Path;
use url::Url;

use crate::records::TrainingRecord;
use crate::types::EngineError;

/// Elements whose text survives HTML reduction. Script/style bodies
/// never match and are dropped with everything else outside this set.
const CONTENT_SELECTOR: &str = "p, h1, h2, h3, h4, h5, h6, li, td, th, blockquote, pre";

/// A normalized text document with its origin identifier.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceDocument {
    pub text: String,
    /// Human-readable origin: a file name or URL. `None` for raw text.
    pub origin: Option<String>,
}

/// Extracts every normalized document a training record can provide.
pub async fn extract(
    record: &TrainingRecord,
    http: &Client,
) -> Result<Vec<SourceDocument>, EngineError> {
    let mut documents = Vec::new();

    if let Some(raw) = record.raw_text.as_deref() {
        if !raw.trim().is_empty() {
            documents.push(SourceDocument {
                text: raw.trim().to_string(),
                origin: None,
            });
        }
    }

    if let Some(path) = record.document_path.as_deref() {
        let text = tokio::fs::read_to_string(path).await.map_err(|err| {
            EngineError::Extraction(format!("unreadable document {path}: {err}"))
        })?;
        if !text.trim().is_empty() {
            documents.push(SourceDocument {
                text: text.trim().to_string(),
                origin: Some(file_name(path)),
            });
        }
    }

    if let Some(site) = record.site.as_deref() {
        let url = Url::parse(site)
            .map_err(|err| EngineError::Extraction(format!("invalid site url {site}: {err}")))?;
        let body = http
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let text = html_to_text(&body);
        if !text.trim().is_empty() {
            documents.push(SourceDocument {
                text,
                origin: Some(url.to_string()),
            });
        }
    }

    Ok(documents)
}

/// Reduces an HTML page to the visible text of its content elements.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let selector =
        Selector::parse(CONTENT_SELECTOR).expect("content selector is statically valid");

    let mut paragraphs: Vec<String> = Vec::new();
    for element in document.select(&selector) {
        // Nested matches (li inside td, pre inside li) would duplicate
        // text; only take elements with no matching ancestor.
        let has_matching_ancestor = element
            .ancestors()
            .filter_map(scraper::ElementRef::wrap)
            .any(|ancestor| selector.matches(&ancestor));
        if has_matching_ancestor {
            continue;
        }
        let text = element
            .text()
            .collect::<Vec<_>>()
            .join(" ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if !text.is_empty() {
            paragraphs.push(text);
        }
    }
    paragraphs.join("\n\n")
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}
