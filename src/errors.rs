use thiserror::Error;

/// How much of an error response body is kept when surfacing a failure.
const BODY_EXCERPT_LIMIT: usize = 512;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("No API key configured for {0}")]
    MissingApiKey(String),

    #[error("{provider} ({model}) request failed: {status} {body}")]
    Api {
        provider: String,
        model: String,
        status: u16,
        body: String,
    },

    #[error("request error: {0}")]
    Network(#[from] reqwest::Error),
}

impl ProviderError {
    pub fn api(provider: &str, model: &str, status: u16, body: &str) -> Self {
        let body = if body.len() > BODY_EXCERPT_LIMIT {
            let mut end = BODY_EXCERPT_LIMIT;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}…", &body[..end])
        } else {
            body.to_string()
        };
        ProviderError::Api {
            provider: provider.to_string(),
            model: model.to_string(),
            status,
            body,
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_truncates_body() {
        let body = "x".repeat(2000);
        let error = ProviderError::api("OpenAI", "gpt-4o-mini", 500, &body);
        match error {
            ProviderError::Api { status, body, .. } => {
                assert_eq!(status, 500);
                assert!(body.len() < 600);
                assert!(body.ends_with('…'));
            }
            _ => panic!("Expected Api variant"),
        }
    }

    #[test]
    fn test_error_message_includes_provider_and_model() {
        let error = ProviderError::api("Anthropic", "claude-3-5-sonnet-latest", 429, "overloaded");
        let message = error.to_string();
        assert!(message.contains("Anthropic"));
        assert!(message.contains("claude-3-5-sonnet-latest"));
        assert!(message.contains("429"));
    }
}
