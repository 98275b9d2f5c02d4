use tracing::info;

use ehrflow_core::{Result, new_id, now_utc};

use crate::collaborators::{AckTemplateParameters, PayloadTemplate, TransportCorrelation};
use crate::definitions::SendAcknowledgementTask;
use crate::executors::TaskExecutors;

impl TaskExecutors {
    /// Renders and sends an acknowledgement to the requester, then records
    /// the outbound message id. Negative acknowledgements run even against a
    /// terminal conversation; the consumer guarantees they are redelivered
    /// rather than dropped on failure.
    pub(super) async fn send_acknowledgement(
        &self,
        task: &SendAcknowledgementTask,
    ) -> Result<()> {
        let ack_message_id = new_id();
        let type_code = task.ack_type.type_code();

        let payload = self
            .templates
            .render(&PayloadTemplate::Acknowledgement(AckTemplateParameters {
                message_id: ack_message_id.clone(),
                message_ref: task.message_ref.clone(),
                type_code: type_code.to_string(),
                from_asid: task.from_asid.clone(),
                to_asid: task.to_asid.clone(),
                reason_code: task.reason_code.clone(),
                detail: task.detail.clone(),
            }))?;

        self.transport
            .send_to_transport(
                &payload,
                &TransportCorrelation {
                    conversation_id: task.conversation_id.clone(),
                    message_id: ack_message_id.clone(),
                    from_ods_code: task.from_ods_code.clone(),
                },
            )
            .await?;

        self.store
            .update_ack_pending(
                &task.conversation_id,
                &task.task_id,
                &ack_message_id,
                type_code,
                now_utc(),
            )
            .await?;
        self.store
            .update_ack_to_requester(
                &task.conversation_id,
                &task.task_id,
                &ack_message_id,
                type_code,
                task.reason_code.as_deref(),
                task.detail.as_deref(),
            )
            .await?;

        info!(
            conversation_id = %task.conversation_id,
            type_code,
            message_id = %ack_message_id,
            "acknowledgement sent"
        );
        Ok(())
    }
}
