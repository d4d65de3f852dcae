use super::base::ProviderConfig;
use anyhow::Result;

pub struct AnthropicProviderConfig {
    /// Display name used in surfaced errors
    pub provider: String,
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

impl AnthropicProviderConfig {
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

impl ProviderConfig for AnthropicProviderConfig {
    fn from_env() -> Result<Self> {
        let api_key = Self::get_env("ANTHROPIC_API_KEY", true, None)?
            .ok_or_else(|| anyhow::anyhow!("Anthropic API key should be present"))?;

        let host = Self::get_env(
            "ANTHROPIC_API_HOST",
            false,
            Some("https://api.anthropic.com".to_string()),
        )?
        .unwrap_or_else(|| "https://api.anthropic.com".to_string());

        let model = Self::get_env(
            "ANTHROPIC_MODEL",
            false,
            Some("claude-3-5-sonnet-latest".to_string()),
        )?
        .unwrap_or_else(|| "claude-3-5-sonnet-latest".to_string());

        Ok(Self::new("Anthropic".to_string(), host, api_key, model))
    }
}
