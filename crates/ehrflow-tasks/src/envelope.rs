use serde::{Deserialize, Serialize};

/// Outbound transport envelope staged in object storage between the
/// preparation and send stages. The main payload travels with inline
/// attachments; oversized attachments are referenced externally and sent as
/// separate transport units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundEnvelope {
    pub payload: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_attachments: Vec<ExternalAttachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub content_type: String,
    pub is_base64: bool,
    pub description: AttachmentDescription,
    pub payload: String,
}

/// Reference to an attachment sent as its own transport unit rather than
/// inline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalAttachment {
    pub document_id: String,
    pub message_id: String,
    pub description: AttachmentDescription,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentDescription {
    pub filename: String,
    pub content_type: String,
    pub compressed: bool,
    pub large_attachment: bool,
    pub original_base64: bool,
    pub length: usize,
}

impl AttachmentDescription {
    /// Description of one chunk of an oversized attachment. Chunks are never
    /// recompressed and keep the original base64 encoding.
    pub fn for_chunk(filename: &str, content_type: &str, length: usize) -> Self {
        Self {
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            compressed: false,
            large_attachment: false,
            original_base64: true,
            length,
        }
    }
}
