use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde::{Deserialize, Serialize};

pub const NO_READABLE_CONTENT: &str = "No readable content found.";
pub const DECODE_ERROR: &str = "Error decoding email.";

const LENIENT_STANDARD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartBody {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// One node of a provider payload tree, in the provider's wire shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: Option<PartBody>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

impl MessagePart {
    fn data(&self) -> Option<&str> {
        self.body
            .as_ref()
            .and_then(|b| b.data.as_deref())
            .filter(|d| !d.is_empty())
    }

    /// Case-insensitive header lookup; empty string when missing.
    pub fn header(&self, name: &str) -> String {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.clone())
            .unwrap_or_default()
    }

    pub fn has_attachment(&self) -> bool {
        self.parts.iter().any(|p| !p.filename.is_empty())
    }
}

/// Decode provider body data (URL-safe base64) into text.
pub fn decode_body_data(data: &str) -> String {
    let normalized = data.trim().replace('-', "+").replace('_', "/");
    match LENIENT_STANDARD.decode(normalized) {
        Ok(bytes) => String::from_utf8(bytes).unwrap_or_else(|_| DECODE_ERROR.to_string()),
        Err(_) => DECODE_ERROR.to_string(),
    }
}

/// Best human-readable body of a payload: HTML over plain text, recursing
/// into nested multipart sections.
pub fn extract_body(payload: &MessagePart) -> String {
    find_body(payload).unwrap_or_else(|| NO_READABLE_CONTENT.to_string())
}

fn find_body(part: &MessagePart) -> Option<String> {
    if let Some(data) = part.data() {
        return Some(decode_body_data(data));
    }

    for mime_type in ["text/html", "text/plain"] {
        if let Some(data) = part
            .parts
            .iter()
            .find(|p| p.mime_type == mime_type)
            .and_then(|p| p.data())
        {
            return Some(decode_body_data(data));
        }
    }

    part.parts
        .iter()
        .filter(|p| p.mime_type.starts_with("multipart/"))
        .find_map(|p| find_body(p).filter(|body| !body.is_empty()))
}
