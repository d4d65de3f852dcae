use super::base::ProviderConfig;
use anyhow::Result;

/// Configuration for any provider speaking the OpenAI chat-completions
/// dialect (OpenAI itself, Ollama, and other compatible endpoints).
pub struct OpenAiProviderConfig {
    /// Display name used in surfaced errors
    pub provider: String,
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

impl OpenAiProviderConfig {
    pub fn new(provider: String, host: String, api_key: String, model: String) -> Self {
        Self {
            provider,
            host,
            api_key,
            model,
            temperature: None,
            max_tokens: None,
        }
    }
}

impl ProviderConfig for OpenAiProviderConfig {
    fn from_env() -> Result<Self> {
        let api_key = Self::get_env("OPENAI_API_KEY", true, None)?
            .ok_or_else(|| anyhow::anyhow!("OpenAI API key should be present"))?;

        let host = Self::get_env(
            "OPENAI_API_HOST",
            false,
            Some("https://api.openai.com/v1".to_string()),
        )?
        .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        let model = Self::get_env("OPENAI_MODEL", false, Some("gpt-4o-mini".to_string()))?
            .unwrap_or_else(|| "gpt-4o-mini".to_string());

        Ok(Self::new("OpenAI".to_string(), host, api_key, model))
    }
}
