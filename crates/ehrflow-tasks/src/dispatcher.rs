use std::sync::Arc;

use tracing::debug;

use ehrflow_core::{CoreError, Result};

use crate::definitions::TaskDefinition;
use crate::queue::MessageQueue;

/// Serializes task definitions and enqueues them with their type tag.
#[derive(Clone)]
pub struct TaskDispatcher {
    queue: Arc<dyn MessageQueue>,
}

impl TaskDispatcher {
    pub fn new(queue: Arc<dyn MessageQueue>) -> Self {
        Self { queue }
    }

    pub async fn dispatch(&self, task: &TaskDefinition) -> Result<()> {
        let (tag, body) = task.to_parts()?;
        debug!(
            task_type = tag,
            task_id = task.task_id(),
            conversation_id = task.conversation_id(),
            "dispatching task"
        );
        self.queue
            .send(tag, &body)
            .await
            .map_err(|err| CoreError::unclassified(format!("queue send failed: {err}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::InMemoryQueue;

    use ehrflow_core::TransferRequest;

    fn request() -> TransferRequest {
        TransferRequest {
            request_id: "r-1".into(),
            nhs_number: "9690937286".into(),
            from_asid: "200000000359".into(),
            to_asid: "918999198738".into(),
            from_ods_code: "GPC001".into(),
            to_ods_code: "B86041".into(),
            message_id: "m-1".into(),
        }
    }

    #[tokio::test]
    async fn dispatch_enqueues_tagged_message() {
        let queue = Arc::new(InMemoryQueue::new());
        let dispatcher = TaskDispatcher::new(queue.clone());

        let task = TaskDefinition::structured_record_fetch("c-1", &request());
        dispatcher.dispatch(&task).await.unwrap();

        let message = queue.receive().await.unwrap();
        assert_eq!(message.tag, "GET_STRUCTURED_RECORD");
        let back = TaskDefinition::from_parts(&message.tag, &message.payload).unwrap();
        assert_eq!(back.conversation_id(), "c-1");
    }

    #[tokio::test]
    async fn dispatch_to_closed_queue_fails() {
        let queue = Arc::new(InMemoryQueue::new());
        queue.close();
        let dispatcher = TaskDispatcher::new(queue);

        let task = TaskDefinition::structured_record_fetch("c-1", &request());
        let err = dispatcher.dispatch(&task).await.unwrap_err();
        assert!(matches!(err, CoreError::Unclassified(_)));
    }
}
