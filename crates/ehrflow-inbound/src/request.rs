use std::sync::Arc;

use tracing::{info, warn};

use ehrflow_core::{ConversationState, CoreError, Result, TransferRequest, now_utc};
use ehrflow_storage::{ConversationStore, StorageError};
use ehrflow_tasks::{TaskDefinition, TaskDispatcher};

use crate::xml::XmlCursor;

pub const EXTRACT_REQUEST_INTERACTION: &str = "RCMR_IN010000UK05";
pub const CONTINUE_INTERACTION: &str = "COPC_IN000001UK01";

const CONTINUE_MARKER: &str = "Continue Acknowledgement";

pub(crate) const CONVERSATION_ID_PATH: &str = "/Envelope/Header/MessageHeader/ConversationId";
const MESSAGE_ID_PATH: &str = "/Envelope/Header/MessageHeader/MessageData/MessageId";

const REQUEST_ID_PATH: &str = "/RCMR_IN010000UK05/ControlActEvent/subject/EhrRequest/id/@root";
const NHS_NUMBER_PATH: &str =
    "/RCMR_IN010000UK05/ControlActEvent/subject/EhrRequest/recordTarget/patient/id/@extension";
const FROM_ASID_PATH: &str = "/RCMR_IN010000UK05/communicationFunctionSnd/device/id/@extension";
const TO_ASID_PATH: &str = "/RCMR_IN010000UK05/communicationFunctionRcv/device/id/@extension";
const FROM_ODS_CODE_PATH: &str = "/RCMR_IN010000UK05/ControlActEvent/subject/EhrRequest/author/AgentOrgSDS/agentOrganizationSDS/id/@extension";
const TO_ODS_CODE_PATH: &str = "/RCMR_IN010000UK05/ControlActEvent/subject/EhrRequest/destination/AgentOrgSDS/agentOrganizationSDS/id/@extension";

/// Handles the extract request that opens a conversation, and the continue
/// message that releases the document sends.
pub struct ExtractRequestHandler {
    store: Arc<dyn ConversationStore>,
    dispatcher: TaskDispatcher,
    xml: Arc<dyn XmlCursor>,
}

impl ExtractRequestHandler {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        dispatcher: TaskDispatcher,
        xml: Arc<dyn XmlCursor>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            xml,
        }
    }

    /// Creates the conversation from the request's correlation fields and
    /// enqueues the first fetch task. A duplicate request is treated as a
    /// replay: logged and ignored without new tasks.
    pub async fn handle(&self, ebxml: &str, payload: &str) -> Result<()> {
        let conversation_id = self.required_value(ebxml, CONVERSATION_ID_PATH)?;
        let request = TransferRequest {
            request_id: self.required_value(payload, REQUEST_ID_PATH)?,
            nhs_number: self.required_value(payload, NHS_NUMBER_PATH)?,
            from_asid: self.required_value(payload, FROM_ASID_PATH)?,
            to_asid: self.required_value(payload, TO_ASID_PATH)?,
            from_ods_code: self.required_value(payload, FROM_ODS_CODE_PATH)?,
            to_ods_code: self.required_value(payload, TO_ODS_CODE_PATH)?,
            message_id: self.required_value(ebxml, MESSAGE_ID_PATH)?,
        };

        let state = ConversationState::new(&conversation_id, request, now_utc());
        match self.store.create(state.clone()).await {
            Ok(()) => {}
            Err(StorageError::AlreadyExists { .. }) => {
                warn!(
                    conversation_id = %conversation_id,
                    "duplicate extract request received and ignored"
                );
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        }

        info!(
            conversation_id = %conversation_id,
            "conversation created, starting record fetch"
        );
        let fetch = TaskDefinition::structured_record_fetch(&conversation_id, &state.request);
        self.dispatcher.dispatch(&fetch).await
    }

    /// Records the counterpart's continue acknowledgement and enqueues one
    /// send task per stored document entry.
    pub async fn handle_continue(&self, conversation_id: &str, payload: &str) -> Result<()> {
        if !payload.contains(CONTINUE_MARKER) {
            return Err(CoreError::invalid_inbound_message(format!(
                "Continue message did not have Continue Acknowledgement, conversation_id: {conversation_id}"
            )));
        }

        if self.store.get(conversation_id).await?.is_none() {
            return Err(CoreError::extract_not_recognised(conversation_id));
        }

        let state = self
            .store
            .update_continue_received(conversation_id, now_utc())
            .await?;

        info!(
            conversation_id = %conversation_id,
            documents = state.document_access.len(),
            "continue received, dispatching document sends"
        );

        for document in &state.document_access {
            let Some(object_reference) = document.object_reference.as_deref() else {
                warn!(
                    conversation_id = %conversation_id,
                    document_id = %document.document_id,
                    "document has no stored object yet, send skipped"
                );
                continue;
            };
            let send = TaskDefinition::document_send(
                conversation_id,
                &state.request,
                &document.document_id,
                object_reference,
                document.message_id.as_deref(),
            );
            self.dispatcher.dispatch(&send).await?;
        }
        Ok(())
    }

    fn required_value(&self, xml: &str, path: &str) -> Result<String> {
        match self.xml.node_value(xml, path)? {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(CoreError::MissingValue {
                interaction: EXTRACT_REQUEST_INTERACTION.to_string(),
                xpath: path.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ehrflow_db_memory::InMemoryConversationStore;
    use ehrflow_tasks::{InMemoryQueue, MessageQueue, TaskType};

    use super::*;
    use crate::xml::testing::StubCursor;

    struct Fixture {
        handler: ExtractRequestHandler,
        store: Arc<InMemoryConversationStore>,
        queue: Arc<InMemoryQueue>,
        cursor: Arc<StubCursor>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryConversationStore::new());
        let queue = Arc::new(InMemoryQueue::new());
        let cursor = Arc::new(StubCursor::new());
        let handler = ExtractRequestHandler::new(
            store.clone(),
            TaskDispatcher::new(queue.clone()),
            cursor.clone(),
        );
        Fixture {
            handler,
            store,
            queue,
            cursor,
        }
    }

    fn seed_request_paths(cursor: &StubCursor) {
        cursor.set(CONVERSATION_ID_PATH, "c-1");
        cursor.set(MESSAGE_ID_PATH, "m-1");
        cursor.set(REQUEST_ID_PATH, "r-1");
        cursor.set(NHS_NUMBER_PATH, "9690937286");
        cursor.set(FROM_ASID_PATH, "200000000359");
        cursor.set(TO_ASID_PATH, "918999198738");
        cursor.set(FROM_ODS_CODE_PATH, "GPC001");
        cursor.set(TO_ODS_CODE_PATH, "B86041");
    }

    #[tokio::test]
    async fn extract_request_creates_conversation_and_first_fetch_task() {
        let f = fixture();
        seed_request_paths(&f.cursor);

        f.handler.handle("<ebxml/>", "<payload/>").await.unwrap();

        let state = f.store.get("c-1").await.unwrap().unwrap();
        assert_eq!(state.request.nhs_number, "9690937286");
        assert_eq!(state.request.message_id, "m-1");

        let message = f.queue.receive().await.unwrap();
        assert_eq!(message.tag, TaskType::GetStructuredRecord.as_str());
    }

    #[tokio::test]
    async fn duplicate_extract_request_skips_task_creation() {
        let f = fixture();
        seed_request_paths(&f.cursor);

        f.handler.handle("<ebxml/>", "<payload/>").await.unwrap();
        let _first = f.queue.receive().await.unwrap();

        f.handler.handle("<ebxml/>", "<payload/>").await.unwrap();
        assert_eq!(f.queue.depth(), 0);
    }

    #[tokio::test]
    async fn blank_required_value_is_rejected_with_its_path() {
        let f = fixture();
        seed_request_paths(&f.cursor);
        f.cursor.set(NHS_NUMBER_PATH, "   ");

        let err = f.handler.handle("<ebxml/>", "<payload/>").await.unwrap_err();
        match err {
            CoreError::MissingValue { interaction, xpath } => {
                assert_eq!(interaction, EXTRACT_REQUEST_INTERACTION);
                assert_eq!(xpath, NHS_NUMBER_PATH);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(f.store.get("c-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn continue_without_marker_is_invalid_and_names_the_conversation() {
        let f = fixture();
        let err = f
            .handler
            .handle_continue("c-77", "<COPC_IN000001UK01/>")
            .await
            .unwrap_err();
        match err {
            CoreError::InvalidInboundMessage(message) => assert!(message.contains("c-77")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn continue_for_unknown_conversation_is_not_recognised() {
        let f = fixture();
        let err = f
            .handler
            .handle_continue("c-77", "Continue Acknowledgement")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ExtractNotRecognised { .. }));
    }

    #[tokio::test]
    async fn continue_records_receipt_and_dispatches_document_sends() {
        let f = fixture();
        seed_request_paths(&f.cursor);
        f.handler.handle("<ebxml/>", "<payload/>").await.unwrap();
        let _fetch = f.queue.receive().await.unwrap();

        f.store
            .add_document_entries(
                "c-1",
                vec![ehrflow_core::DocumentAccess::new(
                    "d1",
                    "https://gpc.example/Binary/d1",
                )],
            )
            .await
            .unwrap();
        f.store
            .update_document_access("c-1", "d1", "c-1/d1.json", 3, "application/pdf", "t-1", "dm-1")
            .await
            .unwrap();

        f.handler
            .handle_continue("c-1", "Continue Acknowledgement")
            .await
            .unwrap();

        let state = f.store.get("c-1").await.unwrap().unwrap();
        assert!(state.continue_received.is_some());

        let message = f.queue.receive().await.unwrap();
        assert_eq!(message.tag, TaskType::SendDocument.as_str());
        let task = TaskDefinition::from_parts(&message.tag, &message.payload).unwrap();
        match task {
            TaskDefinition::SendDocument(t) => {
                assert_eq!(t.document_name, "c-1/d1.json");
                assert_eq!(t.message_id, "dm-1");
            }
            other => panic!("unexpected task: {:?}", other.task_type()),
        }
    }
}
