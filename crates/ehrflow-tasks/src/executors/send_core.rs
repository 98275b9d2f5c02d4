use tracing::info;

use ehrflow_core::{CoreError, Result, now_utc};

use crate::collaborators::TransportCorrelation;
use crate::definitions::SendCoreTask;
use crate::executors::{TaskExecutors, structured_record_object};

impl TaskExecutors {
    /// Sends the staged core extract. `core_pending` is recorded before the
    /// transport call so the ack-timeout reconciler covers a send whose
    /// confirmation write is lost to a crash.
    pub(super) async fn send_core(&self, task: &SendCoreTask) -> Result<()> {
        let object_name = structured_record_object(&task.conversation_id);
        let bytes = self.objects.download(&object_name).await?;
        let payload = String::from_utf8(bytes)
            .map_err(|err| CoreError::unclassified(format!("stored core not UTF-8: {err}")))?;

        self.store
            .update_core_pending(&task.conversation_id, &task.task_id, now_utc())
            .await?;

        self.transport
            .send_to_transport(
                &payload,
                &TransportCorrelation {
                    conversation_id: task.conversation_id.clone(),
                    message_id: task.message_id.clone(),
                    from_ods_code: task.from_ods_code.clone(),
                },
            )
            .await?;

        self.store
            .update_core_sent(&task.conversation_id, &task.task_id, now_utc())
            .await?;

        info!(
            conversation_id = %task.conversation_id,
            message_id = %task.message_id,
            "core extract sent"
        );
        Ok(())
    }
}
