//! One executor per task kind. Executors are safe to re-run under
//! at-least-once delivery: object uploads overwrite, store updates are
//! field-scoped and last-write-wins.

mod absent;
mod ack;
mod document;
mod send_core;
mod send_document;
mod structured;

use std::sync::Arc;

use ehrflow_core::Result;
use ehrflow_storage::ConversationStore;

use crate::collaborators::{ObjectStore, RecordClient, TemplateRenderer, TransportClient};
use crate::definitions::TaskDefinition;
use crate::dispatcher::TaskDispatcher;
use crate::triggers::CompletionTriggers;

/// Shared executor wiring: the store, the external collaborators and the
/// dispatcher used for follow-up tasks.
pub struct TaskExecutors {
    pub(crate) store: Arc<dyn ConversationStore>,
    pub(crate) records: Arc<dyn RecordClient>,
    pub(crate) transport: Arc<dyn TransportClient>,
    pub(crate) objects: Arc<dyn ObjectStore>,
    pub(crate) templates: Arc<dyn TemplateRenderer>,
    pub(crate) dispatcher: TaskDispatcher,
    pub(crate) triggers: CompletionTriggers,
    /// Attachment payloads above this many bytes are chunked before sending.
    pub(crate) large_attachment_threshold: usize,
}

impl TaskExecutors {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn ConversationStore>,
        records: Arc<dyn RecordClient>,
        transport: Arc<dyn TransportClient>,
        objects: Arc<dyn ObjectStore>,
        templates: Arc<dyn TemplateRenderer>,
        dispatcher: TaskDispatcher,
        large_attachment_threshold: usize,
    ) -> Self {
        let triggers = CompletionTriggers::new(dispatcher.clone());
        Self {
            store,
            records,
            transport,
            objects,
            templates,
            dispatcher,
            triggers,
            large_attachment_threshold,
        }
    }

    pub async fn execute(&self, task: &TaskDefinition) -> Result<()> {
        match task {
            TaskDefinition::GetStructuredRecord(t) => self.get_structured_record(t).await,
            TaskDefinition::GetDocument(t) => self.get_document(t).await,
            TaskDefinition::SendAbsentAttachment(t) => self.send_absent_attachment(t).await,
            TaskDefinition::SendCore(t) => self.send_core(t).await,
            TaskDefinition::SendDocument(t) => self.send_document(t).await,
            TaskDefinition::SendAcknowledgement(t) => self.send_acknowledgement(t).await,
        }
    }
}

/// Object-storage name of the staged structured record.
pub fn structured_record_object(conversation_id: &str) -> String {
    format!("{conversation_id}/structured_record.json")
}

/// Object-storage name of a staged document envelope.
pub fn document_object(conversation_id: &str, document_id: &str) -> String {
    format!("{conversation_id}/{document_id}.json")
}
