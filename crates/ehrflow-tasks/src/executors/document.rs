use tracing::{info, warn};

use ehrflow_core::{CoreError, Result};

use crate::definitions::{GetDocumentTask, TaskDefinition};
use crate::envelope::{Attachment, AttachmentDescription, OutboundEnvelope};
use crate::executors::{TaskExecutors, document_object};

impl TaskExecutors {
    /// Fetches a binary document and stages it as a single-attachment
    /// envelope. A document the provider no longer holds is substituted with
    /// an absent-attachment placeholder instead of failing the transfer.
    pub(super) async fn get_document(&self, task: &GetDocumentTask) -> Result<()> {
        let document = match self.records.fetch_document(task).await {
            Ok(document) => document,
            Err(err @ CoreError::NotFound { .. }) => {
                warn!(
                    conversation_id = %task.conversation_id,
                    document_id = %task.document_id,
                    "document unavailable, substituting absent attachment"
                );
                let state = self
                    .store
                    .get(&task.conversation_id)
                    .await?
                    .ok_or_else(|| {
                        CoreError::not_found("Conversation", &task.conversation_id)
                    })?;
                let absent = TaskDefinition::absent_attachment(
                    &task.conversation_id,
                    &state.request,
                    &task.document_id,
                    &task.message_id,
                    &err.to_string(),
                );
                return self.dispatcher.dispatch(&absent).await;
            }
            Err(err) => return Err(err),
        };

        let object_name = document_object(&task.conversation_id, &task.document_id);
        let content_length = document.base64_content.len();
        let envelope = OutboundEnvelope {
            payload: String::new(),
            attachments: vec![Attachment {
                content_type: document.content_type.clone(),
                is_base64: true,
                description: AttachmentDescription {
                    filename: format!("{}.messageattachment", task.document_id),
                    content_type: document.content_type.clone(),
                    compressed: false,
                    large_attachment: content_length > self.large_attachment_threshold,
                    original_base64: true,
                    length: content_length,
                },
                payload: document.base64_content,
            }],
            external_attachments: Vec::new(),
        };
        self.objects
            .upload(&object_name, serde_json::to_vec(&envelope)?)
            .await?;

        let state = self
            .store
            .update_document_access(
                &task.conversation_id,
                &task.document_id,
                &object_name,
                content_length,
                &document.content_type,
                &task.task_id,
                &task.message_id,
            )
            .await?;

        info!(
            conversation_id = %task.conversation_id,
            document_id = %task.document_id,
            content_length,
            "document stored"
        );

        self.triggers.on_preparing_data_updated(&state).await
    }
}
