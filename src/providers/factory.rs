use std::sync::Arc;

use crate::errors::ProviderResult;
use crate::providers::anthropic::AnthropicProvider;
use crate::providers::base::{Adapter, Provider};
use crate::providers::configs::{AnthropicProviderConfig, OpenAiProviderConfig};
use crate::providers::openai::OpenAiProvider;
use crate::providers::registry::{self, WireFormat};

/// Build an adapter for a provider id. Unknown ids resolve to the default
/// provider; a missing model or max_tokens takes the definition's default.
pub fn create_adapter(
    provider_id: &str,
    api_key: &str,
    model: Option<&str>,
    max_tokens: Option<i32>,
    streaming: bool,
) -> ProviderResult<Arc<Adapter>> {
    let def = registry::find(provider_id);
    let model = model.unwrap_or(def.default_model).to_string();
    let max_tokens = max_tokens.unwrap_or(def.default_max_tokens);

    let provider: Box<dyn Provider> = match def.format {
        WireFormat::OpenAi => {
            let mut config = OpenAiProviderConfig::new(
                def.name.to_string(),
                def.base_url.to_string(),
                api_key.to_string(),
                model.clone(),
            );
            config.max_tokens = Some(max_tokens);
            Box::new(OpenAiProvider::new(config)?)
        }
        WireFormat::Anthropic => {
            let mut config = AnthropicProviderConfig::new(
                def.name.to_string(),
                def.base_url.to_string(),
                api_key.to_string(),
                model.clone(),
            );
            config.max_tokens = Some(max_tokens);
            Box::new(AnthropicProvider::new(config)?)
        }
    };

    Ok(Arc::new(Adapter::new(
        def,
        model,
        provider,
        streaming,
        !api_key.is_empty(),
    )))
}

/// Single-slot adapter cache, owned by whatever session object drives the
/// factory. The slot is wholly replaced when any of (provider, key, model)
/// changes; callers must not depend on adapter identity.
#[derive(Default)]
pub struct AdapterCache {
    key: Option<String>,
    adapter: Option<Arc<Adapter>>,
}

impl AdapterCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(
        &mut self,
        provider_id: &str,
        api_key: &str,
        model: Option<&str>,
        max_tokens: Option<i32>,
        streaming: bool,
    ) -> ProviderResult<Arc<Adapter>> {
        let def = registry::find(provider_id);
        let key = format!(
            "{}:{}:{}",
            def.id,
            api_key,
            model.unwrap_or(def.default_model)
        );

        if self.key.as_deref() == Some(key.as_str()) {
            if let Some(adapter) = &self.adapter {
                return Ok(Arc::clone(adapter));
            }
        }

        let adapter = create_adapter(provider_id, api_key, model, max_tokens, streaming)?;
        tracing::debug!(provider = def.id, "adapter cache slot replaced");
        self.key = Some(key);
        self.adapter = Some(Arc::clone(&adapter));
        Ok(adapter)
    }
}
