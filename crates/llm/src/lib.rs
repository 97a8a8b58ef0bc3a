//! Prompt-in / text-out client over either a local Ollama server or the
//! OpenAI chat API. Model and temperature are bound at construction; every
//! request carries a timeout so a stuck model surfaces as an error the
//! caller can fall back from.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("unsupported LLM provider '{0}'")]
    UnknownProvider(String),
    #[error("OPENAI_API_KEY is required for the openai provider")]
    MissingApiKey,
    #[error("llm request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("llm response had no text")]
    EmptyResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Ollama,
    OpenAi,
}

impl Provider {
    pub fn parse(raw: &str) -> Result<Self, LlmError> {
        match raw.to_lowercase().as_str() {
            "ollama" => Ok(Provider::Ollama),
            "openai" => Ok(Provider::OpenAi),
            other => Err(LlmError::UnknownProvider(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: Provider,
    pub model: String,
    pub temperature: f64,
    pub ollama_base_url: String,
    pub openai_api_key: Option<String>,
}

impl LlmConfig {
    /// Reads `LLM_PROVIDER`, `LLM_MODEL`, `LLM_TEMPERATURE`,
    /// `OLLAMA_BASE_URL`, and `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self, LlmError> {
        let provider =
            Provider::parse(&std::env::var("LLM_PROVIDER").unwrap_or_else(|_| "ollama".into()))?;
        let model =
            std::env::var("LLM_MODEL").unwrap_or_else(|_| "qwen2.5:7b-instruct".to_string());
        let temperature = std::env::var("LLM_TEMPERATURE")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0.0);
        let ollama_base_url = std::env::var("OLLAMA_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:11434".to_string())
            .trim_end_matches('/')
            .to_string();
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();

        if provider == Provider::OpenAi && openai_api_key.is_none() {
            return Err(LlmError::MissingApiKey);
        }

        Ok(Self {
            provider,
            model,
            temperature,
            ollama_base_url,
            openai_api_key,
        })
    }
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct OpenAiChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

pub struct LlmClient {
    config: LlmConfig,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> Result<Self, LlmError> {
        Self::new(LlmConfig::from_env()?)
    }

    pub async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<String, LlmError> {
        match self.config.provider {
            Provider::Ollama => self.generate_ollama(prompt, system_prompt).await,
            Provider::OpenAi => self.generate_openai(prompt, system_prompt).await,
        }
    }

    async fn generate_ollama(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<String, LlmError> {
        let body = json!({
            "model": self.config.model,
            "prompt": format!("{}\n{}", system_prompt.unwrap_or(""), prompt),
            "stream": false,
            "options": {"temperature": self.config.temperature},
        });

        let response: OllamaGenerateResponse = self
            .http
            .post(format!("{}/api/generate", self.config.ollama_base_url))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.response.trim().to_string())
    }

    async fn generate_openai(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<String, LlmError> {
        let mut messages = Vec::new();
        if let Some(system) = system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": prompt}));

        let body = json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
        });

        let api_key = self
            .config
            .openai_api_key
            .as_deref()
            .ok_or(LlmError::MissingApiKey)?;

        let response: OpenAiChatResponse = self
            .http
            .post(OPENAI_CHAT_URL)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let text = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or(LlmError::EmptyResponse)?;
        Ok(text)
    }
}

/// Removes the ``` fences models like to wrap JSON answers in.
pub fn strip_code_fences(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// First `{…}` span of the text parsed as JSON (greedy to the last closing
/// brace, so nested objects survive). `None` when there is no valid object.
pub fn extract_first_json(text: &str) -> Option<Value> {
    let cleaned = strip_code_fences(text);
    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&cleaned[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_object_embedded_in_prose() {
        let text = "Sure! Here you go: {\"company\": \"Banco BV\", \"installment_amount\": 630.62} hope that helps";
        let value = extract_first_json(text).unwrap();
        assert_eq!(value["company"], "Banco BV");
        assert_eq!(value["installment_amount"], 630.62);
    }

    #[test]
    fn extracts_nested_objects_greedily() {
        let value = extract_first_json("{\"a\": {\"b\": 1}}").unwrap();
        assert_eq!(value["a"]["b"], 1);
    }

    #[test]
    fn strips_markdown_fences_before_parsing() {
        let text = "```json\n{\"new_name\": false, \"id\": 3}\n```";
        let value = extract_first_json(text).unwrap();
        assert_eq!(value["id"], 3);
        assert_eq!(value["new_name"], false);
    }

    #[test]
    fn rejects_text_without_json() {
        assert!(extract_first_json("no object here").is_none());
        assert!(extract_first_json("{broken").is_none());
        assert!(extract_first_json("} {").is_none());
    }

    #[test]
    fn provider_parsing() {
        assert_eq!(Provider::parse("ollama").unwrap(), Provider::Ollama);
        assert_eq!(Provider::parse("OpenAI").unwrap(), Provider::OpenAi);
        assert!(Provider::parse("bedrock").is_err());
    }
}
