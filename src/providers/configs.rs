pub mod anthropic;
pub mod base;
pub mod openai;

pub use self::anthropic::AnthropicProviderConfig;
pub use self::base::ProviderConfig;
pub use self::openai::OpenAiProviderConfig;
