use std::sync::Arc;

use tracing::{error, info, warn};

use ehrflow_core::{CoreError, Result, TransferError, now_utc};
use ehrflow_storage::{ConversationStore, ErrorOutcome};

use crate::definitions::TaskDefinition;
use crate::dispatcher::TaskDispatcher;
use crate::queue::{MessageQueue, QueueError, ReceivedMessage};

pub use crate::executors::TaskExecutors;

/// Pulls task messages off the queue, routes them to the matching executor
/// and settles them according to the failure contract:
///
/// - deserialization failure: never executed, never acknowledged;
/// - terminal conversation and the task is not an outbound negative
///   acknowledgement: skipped and acknowledged;
/// - executor success: acknowledged;
/// - retryable transport failure: returned for redelivery, no state mutation;
/// - failing negative acknowledgement: returned for redelivery, notifying the
///   counterpart is mandatory;
/// - any other executor failure: conversation marked terminal, a negative
///   acknowledgement enqueued, message acknowledged.
pub struct TaskConsumer {
    queue: Arc<dyn MessageQueue>,
    store: Arc<dyn ConversationStore>,
    dispatcher: TaskDispatcher,
    executors: Arc<TaskExecutors>,
}

impl TaskConsumer {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        store: Arc<dyn ConversationStore>,
        executors: Arc<TaskExecutors>,
    ) -> Self {
        let dispatcher = TaskDispatcher::new(queue.clone());
        Self {
            queue,
            store,
            dispatcher,
            executors,
        }
    }

    /// Consumes until the queue closes. Per-message failures are logged and
    /// never abort the loop.
    pub async fn run(&self) {
        loop {
            let message = match self.queue.receive().await {
                Ok(message) => message,
                Err(QueueError::Closed) => {
                    info!("task queue closed, consumer stopping");
                    return;
                }
                Err(err) => {
                    error!(error = %err, "task queue receive failed, consumer stopping");
                    return;
                }
            };
            if let Err(err) = self.process_one(&message).await {
                error!(
                    error = %err,
                    task_type = %message.tag,
                    "task processing aborted"
                );
            }
        }
    }

    /// Processes a single queued message, including settlement.
    pub async fn process_one(&self, message: &ReceivedMessage) -> Result<()> {
        let task = match TaskDefinition::from_parts(&message.tag, &message.payload) {
            Ok(task) => task,
            Err(err) => {
                error!(
                    error = %err,
                    task_type = %message.tag,
                    "unreadable task message, leaving for redelivery"
                );
                return self.nack(message).await;
            }
        };

        let conversation_id = task.conversation_id().to_string();
        let state = self.store.get(&conversation_id).await.map_err(CoreError::from)?;
        let Some(state) = state else {
            warn!(
                conversation_id = %conversation_id,
                task_type = %task.task_type(),
                "task references an unknown conversation, dropping"
            );
            return self.ack(message).await;
        };

        if state.is_terminal() && !task.is_negative_ack() {
            warn!(
                conversation_id = %conversation_id,
                task_type = %task.task_type(),
                "conversation already terminal, skipping task"
            );
            return self.ack(message).await;
        }

        match self.executors.execute(&task).await {
            Ok(()) => self.ack(message).await,
            Err(err) if task.is_negative_ack() => {
                error!(
                    conversation_id = %conversation_id,
                    error = %err,
                    "negative acknowledgement send failed, leaving for redelivery"
                );
                self.nack(message).await
            }
            Err(err) if err.is_retryable() => {
                warn!(
                    conversation_id = %conversation_id,
                    task_type = %task.task_type(),
                    error = %err,
                    "transport failure, leaving for redelivery"
                );
                self.nack(message).await
            }
            Err(err) => {
                self.fail_process(&task, &err).await?;
                self.ack(message).await
            }
        }
    }

    /// Marks the conversation terminal with the task's failure and enqueues
    /// the negative acknowledgement that closes the transfer towards the
    /// requester. If a terminal state already landed, the write is discarded
    /// and no duplicate acknowledgement is enqueued.
    async fn fail_process(&self, task: &TaskDefinition, err: &CoreError) -> Result<()> {
        let conversation_id = task.conversation_id();
        error!(
            conversation_id = %conversation_id,
            task_type = %task.task_type(),
            error = %err,
            "task failed, closing conversation"
        );

        let outcome = self
            .store
            .update_error(
                conversation_id,
                TransferError {
                    code: err.reason_code().to_string(),
                    message: err.to_string(),
                    task_type: task.task_type().as_str().to_string(),
                    occurred_at: now_utc(),
                },
            )
            .await
            .map_err(CoreError::from)?;
        if outcome == ErrorOutcome::Discarded {
            warn!(
                conversation_id = %conversation_id,
                "conversation already terminal, error discarded"
            );
            return Ok(());
        }

        let state = self
            .store
            .get(conversation_id)
            .await
            .map_err(CoreError::from)?
            .ok_or_else(|| CoreError::not_found("Conversation", conversation_id))?;
        let negative_ack = TaskDefinition::negative_acknowledgement(
            conversation_id,
            &state.request,
            err.reason_code(),
            err.reason_detail(),
        );
        self.dispatcher.dispatch(&negative_ack).await
    }

    async fn ack(&self, message: &ReceivedMessage) -> Result<()> {
        self.queue
            .ack(message)
            .await
            .map_err(|err| CoreError::unclassified(format!("queue ack failed: {err}")))
    }

    async fn nack(&self, message: &ReceivedMessage) -> Result<()> {
        self.queue
            .nack(message)
            .await
            .map_err(|err| CoreError::unclassified(format!("queue nack failed: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use ehrflow_core::{ConversationState, TransferRequest, now_utc};
    use ehrflow_db_memory::InMemoryConversationStore;

    use super::*;
    use crate::collaborators::{
        DocumentPayload, DocumentReference, InMemoryObjectStore, PayloadTemplate, RecordClient,
        StructuredRecord, TemplateRenderer, TransportClient, TransportCorrelation,
    };
    use crate::definitions::{GetDocumentTask, GetStructuredRecordTask, TaskType};
    use crate::queue::InMemoryQueue;

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

    #[derive(Default)]
    struct StubRecordClient {
        structured: Option<StructuredRecord>,
        fail_with: Mutex<Option<CoreError>>,
    }

    #[async_trait]
    impl RecordClient for StubRecordClient {
        async fn fetch_structured_record(
            &self,
            _task: &GetStructuredRecordTask,
        ) -> Result<StructuredRecord> {
            if let Some(err) = self.fail_with.lock().unwrap().take() {
                return Err(err);
            }
            Ok(self.structured.clone().unwrap_or(StructuredRecord {
                payload: "<record/>".into(),
                documents: vec![],
            }))
        }

        async fn fetch_document(&self, _task: &GetDocumentTask) -> Result<DocumentPayload> {
            if let Some(err) = self.fail_with.lock().unwrap().take() {
                return Err(err);
            }
            Ok(DocumentPayload {
                content_type: "application/pdf".into(),
                base64_content: "YWJj".into(),
            })
        }
    }

    #[derive(Default)]
    struct StubTransport {
        sent: Mutex<Vec<(String, String)>>,
        fail_with: Mutex<Option<CoreError>>,
    }

    #[async_trait]
    impl TransportClient for StubTransport {
        async fn send_to_transport(
            &self,
            payload: &str,
            correlation: &TransportCorrelation,
        ) -> Result<()> {
            if let Some(err) = self.fail_with.lock().unwrap().take() {
                return Err(err);
            }
            self.sent
                .lock()
                .unwrap()
                .push((correlation.message_id.clone(), payload.to_string()));
            Ok(())
        }
    }

    struct StubRenderer;

    impl TemplateRenderer for StubRenderer {
        fn render(&self, template: &PayloadTemplate) -> Result<String> {
            Ok(match template {
                PayloadTemplate::Acknowledgement(p) => format!("ack:{}", p.type_code),
                PayloadTemplate::AbsentAttachment(p) => format!("absent:{}", p.document_id),
                PayloadTemplate::DocumentPart(p) => format!("part:{}", p.filename),
            })
        }
    }

    struct Harness {
        queue: Arc<InMemoryQueue>,
        store: Arc<InMemoryConversationStore>,
        records: Arc<StubRecordClient>,
        transport: Arc<StubTransport>,
        consumer: TaskConsumer,
        dispatcher: TaskDispatcher,
    }

    fn harness(records: StubRecordClient) -> Harness {
        let queue = Arc::new(InMemoryQueue::new());
        let store = Arc::new(InMemoryConversationStore::new());
        let records = Arc::new(records);
        let transport = Arc::new(StubTransport::default());
        let dispatcher = TaskDispatcher::new(queue.clone());
        let executors = Arc::new(TaskExecutors::new(
            store.clone(),
            records.clone(),
            transport.clone(),
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(StubRenderer),
            dispatcher.clone(),
            1024,
        ));
        let consumer = TaskConsumer::new(queue.clone(), store.clone(), executors);
        Harness {
            queue,
            store,
            records,
            transport,
            consumer,
            dispatcher,
        }
    }

    async fn seed_conversation(store: &InMemoryConversationStore, id: &str) {
        store
            .create(ConversationState::new(id, request(), now_utc()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unreadable_message_is_left_for_redelivery() {
        let h = harness(StubRecordClient::default());
        h.queue.send("GET_STRUCTURED_RECORD", "{broken").await.unwrap();

        let message = h.queue.receive().await.unwrap();
        h.consumer.process_one(&message).await.unwrap();

        assert_eq!(h.queue.depth(), 1);
    }

    #[tokio::test]
    async fn terminal_conversation_skips_non_negative_ack_task() {
        let h = harness(StubRecordClient::default());
        seed_conversation(&h.store, "c-1").await;
        h.store
            .update_error(
                "c-1",
                TransferError {
                    code: "99".into(),
                    message: "boom".into(),
                    task_type: "SEND_CORE".into(),
                    occurred_at: now_utc(),
                },
            )
            .await
            .unwrap();

        let task = TaskDefinition::structured_record_fetch("c-1", &request());
        h.dispatcher.dispatch(&task).await.unwrap();
        let message = h.queue.receive().await.unwrap();
        h.consumer.process_one(&message).await.unwrap();

        // Skipped without execution: no record fetched, nothing enqueued.
        assert_eq!(h.queue.depth(), 0);
        let state = h.store.get("c-1").await.unwrap().unwrap();
        assert!(state.structured_record_access.is_none());
    }

    #[tokio::test]
    async fn successful_structured_fetch_triggers_core_send() {
        let h = harness(StubRecordClient::default());
        seed_conversation(&h.store, "c-1").await;

        let task = TaskDefinition::structured_record_fetch("c-1", &request());
        h.dispatcher.dispatch(&task).await.unwrap();
        let message = h.queue.receive().await.unwrap();
        h.consumer.process_one(&message).await.unwrap();

        let state = h.store.get("c-1").await.unwrap().unwrap();
        assert!(state.structured_record_access.is_some());

        // No documents: preparing-data finished, SendCore dispatched.
        let next = h.queue.receive().await.unwrap();
        assert_eq!(next.tag, TaskType::SendCore.as_str());
    }

    #[tokio::test]
    async fn executor_failure_closes_conversation_and_enqueues_negative_ack() {
        let records = StubRecordClient::default();
        *records.fail_with.lock().unwrap() =
            Some(CoreError::invalid_argument("generation failed"));
        let h = harness(records);
        seed_conversation(&h.store, "c-1").await;

        let task = TaskDefinition::structured_record_fetch("c-1", &request());
        h.dispatcher.dispatch(&task).await.unwrap();
        let message = h.queue.receive().await.unwrap();
        h.consumer.process_one(&message).await.unwrap();

        let state = h.store.get("c-1").await.unwrap().unwrap();
        let error = state.error.expect("error should be recorded");
        assert_eq!(error.code, "10");
        assert_eq!(error.task_type, "GET_STRUCTURED_RECORD");

        let next = h.queue.receive().await.unwrap();
        let follow_up = TaskDefinition::from_parts(&next.tag, &next.payload).unwrap();
        assert!(follow_up.is_negative_ack());
    }

    #[tokio::test]
    async fn transport_failure_is_redelivered_without_state_mutation() {
        let h = harness(StubRecordClient::default());
        seed_conversation(&h.store, "c-1").await;
        *h.transport.fail_with.lock().unwrap() =
            Some(CoreError::TransportConnection("connection refused".into()));

        // Stage the core object, then drive the SendCore task to a transport
        // failure.
        let fetch = TaskDefinition::structured_record_fetch("c-1", &request());
        h.dispatcher.dispatch(&fetch).await.unwrap();
        let message = h.queue.receive().await.unwrap();
        h.consumer.process_one(&message).await.unwrap();

        let send_core = h.queue.receive().await.unwrap();
        assert_eq!(send_core.tag, TaskType::SendCore.as_str());
        h.consumer.process_one(&send_core).await.unwrap();

        // Redelivered, conversation still open.
        assert_eq!(h.queue.depth(), 1);
        let state = h.store.get("c-1").await.unwrap().unwrap();
        assert!(state.error.is_none());
        assert!(state.core.is_none());
    }

    #[tokio::test]
    async fn failing_negative_ack_is_never_dropped() {
        let h = harness(StubRecordClient::default());
        seed_conversation(&h.store, "c-1").await;
        *h.transport.fail_with.lock().unwrap() =
            Some(CoreError::TransportServer("boom".into()));

        let task =
            TaskDefinition::negative_acknowledgement("c-1", &request(), "99", "detail");
        h.dispatcher.dispatch(&task).await.unwrap();
        let message = h.queue.receive().await.unwrap();
        h.consumer.process_one(&message).await.unwrap();

        assert_eq!(h.queue.depth(), 1);
    }

    #[tokio::test]
    async fn negative_ack_executes_against_terminal_conversation() {
        let h = harness(StubRecordClient::default());
        seed_conversation(&h.store, "c-1").await;
        h.store
            .update_error(
                "c-1",
                TransferError {
                    code: "10".into(),
                    message: "boom".into(),
                    task_type: "GET_STRUCTURED_RECORD".into(),
                    occurred_at: now_utc(),
                },
            )
            .await
            .unwrap();

        let task =
            TaskDefinition::negative_acknowledgement("c-1", &request(), "10", "detail");
        h.dispatcher.dispatch(&task).await.unwrap();
        let message = h.queue.receive().await.unwrap();
        h.consumer.process_one(&message).await.unwrap();

        assert_eq!(h.transport.sent.lock().unwrap().len(), 1);
        let state = h.store.get("c-1").await.unwrap().unwrap();
        let ack = state.ack_to_requester.expect("ack should be recorded");
        assert_eq!(ack.type_code, "AE");
        assert_eq!(ack.reason_code.as_deref(), Some("10"));
    }
}
