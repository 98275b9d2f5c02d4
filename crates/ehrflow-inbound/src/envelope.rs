use serde::{Deserialize, Serialize};

/// Inbound transport message as delivered by the messaging layer: the ebXML
/// routing envelope and the clinical payload, both XML, wrapped in JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "ebXML")]
    pub ebxml: String,
    pub payload: String,
}
