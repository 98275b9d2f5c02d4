use tracing::info;

use ehrflow_core::{DocumentAccess, Result};

use crate::definitions::{GetStructuredRecordTask, TaskDefinition};
use crate::envelope::OutboundEnvelope;
use crate::executors::{TaskExecutors, structured_record_object};

impl TaskExecutors {
    /// Fetches the structured clinical record, stages it as an outbound
    /// envelope and dispatches one fetch task per discovered document.
    pub(super) async fn get_structured_record(
        &self,
        task: &GetStructuredRecordTask,
    ) -> Result<()> {
        let record = self.records.fetch_structured_record(task).await?;

        let envelope = OutboundEnvelope {
            payload: record.payload,
            attachments: Vec::new(),
            external_attachments: Vec::new(),
        };
        let object_name = structured_record_object(&task.conversation_id);
        self.objects
            .upload(&object_name, serde_json::to_vec(&envelope)?)
            .await?;

        // Register the discovered documents before marking structured access,
        // so the completion check below sees the full document list.
        if !record.documents.is_empty() {
            let entries = record
                .documents
                .iter()
                .map(|d| DocumentAccess::new(&d.document_id, &d.access_url))
                .collect();
            self.store
                .add_document_entries(&task.conversation_id, entries)
                .await?;
        }

        let state = self
            .store
            .update_structured_record_access(&task.conversation_id, &task.task_id, &object_name)
            .await?;

        info!(
            conversation_id = %task.conversation_id,
            documents = record.documents.len(),
            "structured record stored"
        );

        let request = &state.request;
        for document in &record.documents {
            let fetch = TaskDefinition::document_fetch(
                &task.conversation_id,
                request,
                &document.document_id,
                &document.access_url,
            );
            self.dispatcher.dispatch(&fetch).await?;
        }

        self.triggers.on_preparing_data_updated(&state).await
    }
}
