//! Interfaces to the systems the pipeline talks to: the upstream record
//! provider, the outbound transport, object storage and the payload template
//! renderer. The executors depend only on these traits; HTTP-backed
//! implementations live in the server crate.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use ehrflow_core::{CoreError, Result};

use crate::definitions::{GetDocumentTask, GetStructuredRecordTask};

/// Structured record returned by the upstream provider, with references to
/// the documents that must be fetched separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredRecord {
    /// Serialized record body, ready for envelope assembly.
    pub payload: String,
    #[serde(default)]
    pub documents: Vec<DocumentReference>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentReference {
    pub document_id: String,
    pub access_url: String,
}

/// Binary document fetched from the provider, carried base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentPayload {
    pub content_type: String,
    pub base64_content: String,
}

/// Upstream clinical-record provider.
#[async_trait]
pub trait RecordClient: Send + Sync {
    async fn fetch_structured_record(
        &self,
        task: &GetStructuredRecordTask,
    ) -> Result<StructuredRecord>;

    async fn fetch_document(&self, task: &GetDocumentTask) -> Result<DocumentPayload>;
}

/// Correlation identifiers attached to every outbound transport send.
#[derive(Debug, Clone)]
pub struct TransportCorrelation {
    pub conversation_id: String,
    pub message_id: String,
    pub from_ods_code: String,
}

/// Outbound messaging transport. Implementations must distinguish
/// connection-level failures (retryable, [`CoreError::TransportConnection`])
/// from upstream rejections ([`CoreError::TransportServer`]).
#[async_trait]
pub trait TransportClient: Send + Sync {
    async fn send_to_transport(
        &self,
        payload: &str,
        correlation: &TransportCorrelation,
    ) -> Result<()>;
}

/// Staging storage for prepared payloads between the fetch and send stages.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, name: &str, bytes: Vec<u8>) -> Result<()>;

    async fn download(&self, name: &str) -> Result<Vec<u8>>;
}

/// Templates for the payloads the pipeline generates itself rather than
/// passing through.
#[derive(Debug, Clone)]
pub enum PayloadTemplate {
    Acknowledgement(AckTemplateParameters),
    AbsentAttachment(AbsentAttachmentParameters),
    DocumentPart(DocumentPartParameters),
}

#[derive(Debug, Clone)]
pub struct AckTemplateParameters {
    pub message_id: String,
    pub message_ref: String,
    pub type_code: String,
    pub from_asid: String,
    pub to_asid: String,
    pub reason_code: Option<String>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AbsentAttachmentParameters {
    pub document_id: String,
    pub reason: String,
}

/// One chunk of an oversized attachment, wrapped as its own transport unit.
#[derive(Debug, Clone)]
pub struct DocumentPartParameters {
    pub message_id: String,
    pub filename: String,
    pub content: String,
}

pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &PayloadTemplate) -> Result<String>;
}

/// Map-backed [`ObjectStore`] for tests and single-process runs.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn upload(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        self.objects
            .lock()
            .expect("object store lock poisoned")
            .insert(name.to_string(), bytes);
        Ok(())
    }

    async fn download(&self, name: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .expect("object store lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::not_found("Object", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_then_download_returns_bytes() {
        let store = InMemoryObjectStore::new();
        store.upload("c-1/doc.json", b"body".to_vec()).await.unwrap();
        assert_eq!(store.download("c-1/doc.json").await.unwrap(), b"body");
    }

    #[tokio::test]
    async fn download_of_missing_object_is_not_found() {
        let store = InMemoryObjectStore::new();
        let err = store.download("absent").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }
}
