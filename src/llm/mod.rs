pub mod providers;
pub mod structured;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use structured::{
    GenerationRequest, GenerationResult, RetryPolicy, Shape, ShapeNode, StructuredGenerator,
    UserPrompt,
};

/// LLM provider types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum LLMProvider {
    LMStudio,
    Gemini,
    OpenAI,
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LLMConfig {
    pub provider: LLMProvider,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::Gemini,
            endpoint: None,
            api_key: None,
            model: "gemini-1.5-flash-latest".to_string(),
            max_tokens: 8192,
            temperature: 1.0,
            timeout_seconds: 120,
        }
    }
}

/// Chat message for LLM communication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// LLM response
#[derive(Debug, Clone)]
pub struct LLMResponse {
    pub content: String,
    pub tokens_used: Option<u32>,
}

/// Trait for LLM providers
#[async_trait]
pub trait LLM: Send + Sync {
    /// Send a conversation; `temperature` overrides the configured default.
    async fn chat(&self, messages: Vec<ChatMessage>, temperature: Option<f32>) -> Result<LLMResponse>;
    async fn is_available(&self) -> bool;
    fn provider_type(&self) -> LLMProvider;

    /// Single-prompt generation: prompt in, untrusted text out.
    async fn generate(&self, prompt: &str, temperature: Option<f32>) -> Result<String> {
        let response = self.chat(vec![ChatMessage::user(prompt)], temperature).await?;
        Ok(response.content)
    }
}

/// Create LLM instance based on configuration
pub fn create_llm(config: &LLMConfig) -> Result<Box<dyn LLM>> {
    match config.provider {
        LLMProvider::LMStudio => Ok(Box::new(providers::LMStudioProvider::new(config.clone())?)),
        LLMProvider::Gemini => Ok(Box::new(providers::GeminiProvider::new(config.clone())?)),
        LLMProvider::OpenAI => Ok(Box::new(providers::OpenAIProvider::new(config.clone())?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_llm_requires_key_for_cloud_providers() {
        let config = LLMConfig::default();
        assert!(create_llm(&config).is_err());

        let config = LLMConfig {
            api_key: Some("test-key".to_string()),
            ..LLMConfig::default()
        };
        let llm = create_llm(&config).unwrap();
        assert_eq!(llm.provider_type(), LLMProvider::Gemini);
    }

    #[test]
    fn test_lmstudio_needs_no_key() {
        let config = LLMConfig {
            provider: LLMProvider::LMStudio,
            endpoint: Some("http://localhost:1234/v1/chat/completions".to_string()),
            ..LLMConfig::default()
        };
        let llm = create_llm(&config).unwrap();
        assert_eq!(llm.provider_type(), LLMProvider::LMStudio);
    }
}
