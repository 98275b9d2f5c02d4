use tracing::info;

use ehrflow_core::{CoreError, Result, new_id, now_utc};

use crate::chunk::chunk_payload;
use crate::collaborators::{DocumentPartParameters, PayloadTemplate, TransportCorrelation};
use crate::definitions::SendDocumentTask;
use crate::envelope::{AttachmentDescription, ExternalAttachment, OutboundEnvelope};
use crate::executors::TaskExecutors;

impl TaskExecutors {
    /// Sends a staged document envelope. Attachments above the configured
    /// threshold are split into chunks, each wrapped as its own transport
    /// unit with a fresh message id; the main envelope then references them
    /// as external attachments. All resulting message ids are recorded
    /// against the document entry.
    pub(super) async fn send_document(&self, task: &SendDocumentTask) -> Result<()> {
        let bytes = self.objects.download(&task.document_name).await?;
        let envelope: OutboundEnvelope = serde_json::from_slice(&bytes)?;
        if envelope.attachments.len() != 1 {
            return Err(CoreError::invalid_transition(format!(
                "stored envelope for document {} must contain exactly one attachment, found {}",
                task.document_id,
                envelope.attachments.len()
            )));
        }

        let correlation = |message_id: &str| TransportCorrelation {
            conversation_id: task.conversation_id.clone(),
            message_id: message_id.to_string(),
            from_ods_code: task.from_ods_code.clone(),
        };

        let attachment = &envelope.attachments[0];
        let mut message_ids = vec![task.message_id.clone()];

        if attachment.payload.len() > self.large_attachment_threshold {
            let chunks = chunk_payload(&attachment.payload, self.large_attachment_threshold)?;
            let mut parts = Vec::with_capacity(chunks.len());
            let mut external_attachments = Vec::with_capacity(chunks.len());
            for (index, chunk) in chunks.into_iter().enumerate() {
                let part_message_id = new_id();
                let filename = format!("{}_{}.messageattachment", task.document_id, index);
                external_attachments.push(ExternalAttachment {
                    document_id: task.document_id.clone(),
                    message_id: part_message_id.clone(),
                    description: AttachmentDescription::for_chunk(
                        &filename,
                        &attachment.content_type,
                        chunk.len(),
                    ),
                });
                parts.push(DocumentPartParameters {
                    message_id: part_message_id,
                    filename,
                    content: chunk,
                });
            }

            let main = OutboundEnvelope {
                payload: envelope.payload.clone(),
                attachments: Vec::new(),
                external_attachments,
            };
            self.transport
                .send_to_transport(
                    &serde_json::to_string(&main)?,
                    &correlation(&task.message_id),
                )
                .await?;

            for part in parts {
                let payload = self
                    .templates
                    .render(&PayloadTemplate::DocumentPart(part.clone()))?;
                self.transport
                    .send_to_transport(&payload, &correlation(&part.message_id))
                    .await?;
                message_ids.push(part.message_id);
            }
        } else {
            let payload = String::from_utf8(bytes).map_err(|err| {
                CoreError::unclassified(format!("stored envelope not UTF-8: {err}"))
            })?;
            self.transport
                .send_to_transport(&payload, &correlation(&task.message_id))
                .await?;
        }

        let state = self
            .store
            .update_document_sent(
                &task.conversation_id,
                &task.document_id,
                message_ids.clone(),
                &task.task_id,
                now_utc(),
            )
            .await?;

        info!(
            conversation_id = %task.conversation_id,
            document_id = %task.document_id,
            transport_units = message_ids.len(),
            "document sent"
        );

        self.triggers.on_document_sent(&state).await
    }
}
