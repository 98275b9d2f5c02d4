use tracing::info;

use ehrflow_core::Result;

use crate::collaborators::{AbsentAttachmentParameters, PayloadTemplate};
use crate::definitions::SendAbsentAttachmentTask;
use crate::envelope::{Attachment, AttachmentDescription, OutboundEnvelope};
use crate::executors::{TaskExecutors, document_object};

impl TaskExecutors {
    /// Renders a placeholder for a document that could not be retrieved and
    /// stages it in place of the real attachment. The document entry records
    /// the substitution reason so the transfer can still complete.
    pub(super) async fn send_absent_attachment(
        &self,
        task: &SendAbsentAttachmentTask,
    ) -> Result<()> {
        let placeholder =
            self.templates
                .render(&PayloadTemplate::AbsentAttachment(AbsentAttachmentParameters {
                    document_id: task.document_id.clone(),
                    reason: task.reason.clone(),
                }))?;

        let object_name = document_object(&task.conversation_id, &task.document_id);
        let envelope = OutboundEnvelope {
            payload: String::new(),
            attachments: vec![Attachment {
                content_type: "text/plain".into(),
                is_base64: false,
                description: AttachmentDescription {
                    filename: format!("AbsentAttachment{}.txt", task.document_id),
                    content_type: "text/plain".into(),
                    compressed: false,
                    large_attachment: false,
                    original_base64: false,
                    length: placeholder.len(),
                },
                payload: placeholder,
            }],
            external_attachments: Vec::new(),
        };
        self.objects
            .upload(&object_name, serde_json::to_vec(&envelope)?)
            .await?;

        let state = self
            .store
            .update_document_absent(
                &task.conversation_id,
                &task.document_id,
                &object_name,
                &task.reason,
                &task.task_id,
            )
            .await?;

        info!(
            conversation_id = %task.conversation_id,
            document_id = %task.document_id,
            reason = %task.reason,
            "absent attachment substituted"
        );

        self.triggers.on_preparing_data_updated(&state).await
    }
}
