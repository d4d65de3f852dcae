//! Static catalogue of the providers the assistant can talk to.
//!
//! Loaded once at startup, never mutated. Unknown ids fall back to the
//! default provider so a stale settings value cannot brick the chat.

/// Which request/response dialect a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    OpenAi,
    Anthropic,
}

#[derive(Debug, Clone, Copy)]
pub struct ProviderDef {
    pub id: &'static str,
    pub name: &'static str,
    pub base_url: &'static str,
    pub default_model: &'static str,
    pub models: &'static [&'static str],
    pub format: WireFormat,
    pub default_max_tokens: i32,
    pub requires_api_key: bool,
}

pub const DEFAULT_PROVIDER_ID: &str = "openai";

/// The default provider is the first entry.
pub static PROVIDERS: &[ProviderDef] = &[
    ProviderDef {
        id: "openai",
        name: "OpenAI",
        base_url: "https://api.openai.com/v1",
        default_model: "gpt-4o-mini",
        models: &["gpt-4o", "gpt-4o-mini", "gpt-4.1", "gpt-4.1-mini", "o4-mini"],
        format: WireFormat::OpenAi,
        default_max_tokens: 4096,
        requires_api_key: true,
    },
    ProviderDef {
        id: "anthropic",
        name: "Anthropic",
        base_url: "https://api.anthropic.com",
        default_model: "claude-3-5-sonnet-latest",
        models: &[
            "claude-3-5-sonnet-latest",
            "claude-3-5-haiku-latest",
            "claude-3-opus-latest",
        ],
        format: WireFormat::Anthropic,
        default_max_tokens: 4096,
        requires_api_key: true,
    },
    ProviderDef {
        id: "ollama",
        name: "Ollama",
        base_url: "http://localhost:11434/v1",
        default_model: "qwen2.5",
        models: &["qwen2.5", "llama3.2", "mistral"],
        format: WireFormat::OpenAi,
        default_max_tokens: 4096,
        requires_api_key: false,
    },
];

pub fn default_provider() -> &'static ProviderDef {
    &PROVIDERS[0]
}

/// Look up a provider definition, falling back to the default for ids not
/// in the catalogue.
pub fn find(id: &str) -> &'static ProviderDef {
    PROVIDERS.iter().find(|def| def.id == id).unwrap_or_else(|| {
        tracing::warn!(provider = id, "unknown provider id, using default");
        default_provider()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_known_provider() {
        let def = find("anthropic");
        assert_eq!(def.id, "anthropic");
        assert_eq!(def.format, WireFormat::Anthropic);
        assert!(def.models.contains(&def.default_model));
    }

    #[test]
    fn test_unknown_provider_falls_back_to_default() {
        let def = find("definitely-not-a-provider");
        assert_eq!(def.id, DEFAULT_PROVIDER_ID);
    }

    #[test]
    fn test_default_provider_is_first_entry() {
        assert_eq!(default_provider().id, DEFAULT_PROVIDER_ID);
    }

    #[test]
    fn test_every_default_model_is_listed() {
        for def in PROVIDERS {
            assert!(
                def.models.contains(&def.default_model),
                "default model of {} missing from its model list",
                def.id
            );
        }
    }
}
