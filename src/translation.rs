//! Client for the external translation service.
//!
//! Translation is best effort: callers on the signaling path use
//! [`TranslationClient::translate_or_annotate`], which never fails.

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("translation disabled")]
    Disabled,

    #[error("{0}")]
    Request(#[from] reqwest::Error),

    #[error("Translation API error: {0}")]
    Status(StatusCode),

    #[error("response has no translatedText")]
    MissingField,
}

/// A transcript and its translation, as relayed to the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Translation {
    pub original_text: String,
    pub translated_text: String,
    pub source_lang: String,
    pub target_lang: String,
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateResponse {
    translated_text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TranslationClient {
    http: reqwest::Client,
    /// `None` when translation is switched off.
    url: Option<String>,
}

impl TranslationClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, TranslationError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: Some(url.into()),
        })
    }

    pub fn disabled() -> Self {
        Self {
            http: reqwest::Client::new(),
            url: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    pub async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, TranslationError> {
        let url = self.url.as_deref().ok_or(TranslationError::Disabled)?;

        let response = self
            .http
            .post(url)
            .json(&TranslateRequest {
                q: text,
                source,
                target,
                format: "text",
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TranslationError::Status(response.status()));
        }

        let body: TranslateResponse = response.json().await?;
        body.translated_text.ok_or(TranslationError::MissingField)
    }

    /// Translate, substituting an error-annotated string on failure.
    pub async fn translate_or_annotate(&self, text: &str, source: &str, target: &str) -> Translation {
        let translated_text = match self.translate(text, source, target).await {
            Ok(translated) => {
                debug!("Translated {} chars {} -> {}", text.len(), source, target);
                translated
            }
            Err(e) => {
                warn!("Translation unavailable: {}", e);
                format!("[Translation error: {}]", e)
            }
        };

        Translation {
            original_text: text.to_owned(),
            translated_text,
            source_lang: source.to_owned(),
            target_lang: target.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, routing::post};
    use serde_json::{Value, json};
    use tokio::net::TcpListener;

    async fn mock_service(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/translate", addr)
    }

    #[tokio::test]
    async fn translates_through_service() {
        let url = mock_service(Router::new().route(
            "/translate",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["q"], "hello");
                assert_eq!(body["source"], "en");
                assert_eq!(body["target"], "vi");
                assert_eq!(body["format"], "text");
                Json(json!({"translatedText": "xin chào"}))
            }),
        ))
        .await;

        let client = TranslationClient::new(url, Duration::from_secs(5)).unwrap();
        let result = client.translate_or_annotate("hello", "en", "vi").await;

        assert_eq!(
            result,
            Translation {
                original_text: "hello".to_string(),
                translated_text: "xin chào".to_string(),
                source_lang: "en".to_string(),
                target_lang: "vi".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn service_error_status_is_annotated() {
        let url = mock_service(Router::new().route(
            "/translate",
            post(|| async { (axum::http::StatusCode::BAD_GATEWAY, "down") }),
        ))
        .await;

        let client = TranslationClient::new(url, Duration::from_secs(5)).unwrap();
        let err = client.translate("hello", "en", "vi").await.unwrap_err();
        assert!(matches!(err, TranslationError::Status(StatusCode::BAD_GATEWAY)));

        let result = client.translate_or_annotate("hello", "en", "vi").await;
        assert!(result.translated_text.starts_with("[Translation error: "));
        assert_eq!(result.original_text, "hello");
    }

    #[tokio::test]
    async fn disabled_client_annotates_without_network() {
        let client = TranslationClient::disabled();
        assert!(!client.is_enabled());

        let result = client.translate_or_annotate("hi", "en", "vi").await;
        assert_eq!(result.translated_text, "[Translation error: translation disabled]");
    }
}
