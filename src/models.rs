//! These models represent the objects passed around by the assistant core
//!
//! There are several related formats we need to interact with:
//! - chat messages and attachments, sent from the interface to the core
//! - openai chat-completions messages/tools, sent from the core to the LLM
//! - anthropic messages/tools, sent from the core to the LLM
//!
//! These overlap to varying degrees. Wire payloads are converted to and from
//! the internal structs at the provider boundary; because of the need for
//! compatibility, the internal models are not an exact match to any wire
//! format.
pub mod content;
pub mod message;
pub mod role;
pub mod tool;
