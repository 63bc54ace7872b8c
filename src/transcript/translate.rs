use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::Translator;

const TRANSLATE_URL: &str = "https://translation.googleapis.com/language/translate/v2";

/// Google Cloud Translation (v2 REST)
pub struct GoogleTranslator {
    api_key: String,
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    target: &'a str,
    format: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    data: TranslateData,
}

#[derive(Debug, Deserialize)]
struct TranslateData {
    #[serde(default)]
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

impl TranslateResponse {
    fn into_text(self) -> Result<String> {
        self.data
            .translations
            .into_iter()
            .next()
            .map(|t| t.translated_text)
            .ok_or_else(|| anyhow!("translation response contained no translations"))
    }
}

impl GoogleTranslator {
    pub fn new(api_key: impl Into<String>, timeout_seconds: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;
        Ok(Self {
            api_key: api_key.into(),
            endpoint: TRANSLATE_URL.to_string(),
            client,
        })
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate(&self, text: &str, target_language: &str) -> Result<String> {
        debug!("Translating {} characters to {}", text.len(), target_language);

        let request = TranslateRequest {
            q: text,
            target: target_language,
            format: "text",
        };

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Translation API error {}: {}", status, body));
        }

        let parsed: TranslateResponse = response.json().await?;
        parsed.into_text()
    }
}

/// Used when no translation API key is configured; always fails, so
/// transcripts stay in their spoken language.
#[derive(Debug, Default, Clone)]
pub struct NoTranslator;

#[async_trait]
impl Translator for NoTranslator {
    async fn translate(&self, _text: &str, target_language: &str) -> Result<String> {
        Err(anyhow!("no translator configured for target {}", target_language))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parsing() {
        let body = r#"{"data": {"translations": [{"translatedText": "Hello everyone", "detectedSourceLanguage": "es"}]}}"#;
        let parsed: TranslateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.into_text().unwrap(), "Hello everyone");
    }

    #[test]
    fn test_empty_translations_is_error() {
        let parsed: TranslateResponse = serde_json::from_str(r#"{"data": {"translations": []}}"#).unwrap();
        assert!(parsed.into_text().is_err());
    }

    #[test]
    fn test_request_shape() {
        let request = TranslateRequest {
            q: "hola",
            target: "en",
            format: "text",
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value, serde_json::json!({"q": "hola", "target": "en", "format": "text"}));
    }

    #[tokio::test]
    async fn test_no_translator_fails() {
        assert!(NoTranslator.translate("hola", "en").await.is_err());
    }
}
