use serde::{Deserialize, Serialize};

/// Where the bytes of an attachment live: a reference the provider fetches,
/// or the data itself carried inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MediaSource {
    Url { url: String },
    Base64 { media_type: String, data: String },
}

impl MediaSource {
    pub fn url<S: Into<String>>(url: S) -> Self {
        MediaSource::Url { url: url.into() }
    }

    pub fn base64<M: Into<String>, D: Into<String>>(media_type: M, data: D) -> Self {
        MediaSource::Base64 {
            media_type: media_type.into(),
            data: data.into(),
        }
    }

    /// Render as a single URL string, inlining base64 data as a data: URL.
    pub fn as_url(&self) -> String {
        match self {
            MediaSource::Url { url } => url.clone(),
            MediaSource::Base64 { media_type, data } => {
                format!("data:{};base64,{}", media_type, data)
            }
        }
    }

    /// Short human-readable description used when a part has to degrade to text.
    pub fn label(&self) -> &str {
        match self {
            MediaSource::Url { url } => url,
            MediaSource::Base64 { media_type, .. } => media_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaPart {
    pub source: MediaSource,
}

/// A multimodal attachment carried inside a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    Text(TextPart),
    Image(MediaPart),
    Video(MediaPart),
    Document(MediaPart),
}

impl ContentPart {
    pub fn text<S: Into<String>>(text: S) -> Self {
        ContentPart::Text(TextPart { text: text.into() })
    }

    pub fn image(source: MediaSource) -> Self {
        ContentPart::Image(MediaPart { source })
    }

    pub fn video(source: MediaSource) -> Self {
        ContentPart::Video(MediaPart { source })
    }

    pub fn document(source: MediaSource) -> Self {
        ContentPart::Document(MediaPart { source })
    }

    /// Get the text if this is a Text variant
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text(part) => Some(&part.text),
            _ => None,
        }
    }
}
