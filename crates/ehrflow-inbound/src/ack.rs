use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use ehrflow_core::{AckError, CoreError, ReceivedAcknowledgement, Result, now_utc};
use ehrflow_storage::{AckOutcome, ConversationStore};

use crate::xml::XmlCursor;

pub const ACK_INTERACTION: &str = "MCCI_IN010000UK13";

const TYPE_CODE_PATH: &str = "//MCCI_IN010000UK13/acknowledgement/@typeCode";
const MESSAGE_REF_PATH: &str = "//MCCI_IN010000UK13/acknowledgement/messageRef/id/@root";
const ROOT_ID_PATH: &str = "//MCCI_IN010000UK13/id/@root";
const BUSINESS_ERROR_DETAILS_PATH: &str = "//justifyingDetectedIssueEvent/code";
const REJECTED_DETAILS_PATH: &str = "//MCCI_IN010000UK13/acknowledgement/acknowledgementDetail/code";

const TYPE_CODE_OK: &str = "AA";
const TYPE_CODE_BUSINESS_ERROR: &str = "AE";
const TYPE_CODE_REJECTED: &str = "AR";

const CODE_ATTRIBUTE: &str = "code";
const DISPLAY_ATTRIBUTE: &str = "displayName";

/// Handles the counterpart's final acknowledgement of the transfer.
pub struct AckHandler {
    store: Arc<dyn ConversationStore>,
    xml: Arc<dyn XmlCursor>,
}

impl AckHandler {
    pub fn new(store: Arc<dyn ConversationStore>, xml: Arc<dyn XmlCursor>) -> Self {
        Self { store, xml }
    }

    /// Parses the acknowledgement and applies it to the conversation. A
    /// positive type code closes the conversation cleanly; a business error
    /// or rejection carries one or more `{code, display}` entries. The store
    /// discards the update if the conversation is already terminal.
    pub async fn handle(&self, conversation_id: &str, xml: &str) -> Result<()> {
        let type_code = self
            .xml
            .node_value(xml, TYPE_CODE_PATH)?
            .unwrap_or_default();
        let message_ref = self
            .xml
            .node_value(xml, MESSAGE_REF_PATH)?
            .unwrap_or_default();
        let root_id = self.xml.node_value(xml, ROOT_ID_PATH)?.unwrap_or_default();

        let errors = match type_code.as_str() {
            TYPE_CODE_OK => {
                info!(
                    conversation_id = %conversation_id,
                    message_ref = %message_ref,
                    "positive acknowledgement received"
                );
                None
            }
            TYPE_CODE_BUSINESS_ERROR => {
                info!(
                    conversation_id = %conversation_id,
                    message_ref = %message_ref,
                    "acknowledgement business error received"
                );
                Some(self.extract_errors(xml, BUSINESS_ERROR_DETAILS_PATH)?)
            }
            TYPE_CODE_REJECTED => {
                info!(
                    conversation_id = %conversation_id,
                    message_ref = %message_ref,
                    "acknowledgement rejection received"
                );
                Some(self.extract_errors(xml, REJECTED_DETAILS_PATH)?)
            }
            other => {
                return Err(CoreError::invalid_inbound_message(format!(
                    "Unsupported {TYPE_CODE_PATH}: {other}"
                )));
            }
        };

        let now = now_utc();
        let ack = ReceivedAcknowledgement {
            root_id,
            message_ref,
            received: now,
            conversation_closed: now,
            errors,
        };

        match self
            .store
            .apply_received_acknowledgement(conversation_id, ack)
            .await?
        {
            AckOutcome::Applied => Ok(()),
            AckOutcome::DiscardedTerminal => {
                warn!(
                    conversation_id = %conversation_id,
                    "conversation already terminal, acknowledgement discarded"
                );
                Ok(())
            }
        }
    }

    fn extract_errors(&self, xml: &str, path: &str) -> Result<Vec<AckError>> {
        let entries = self.xml.node_entries(xml, path)?;
        Ok(entries.iter().map(Self::to_ack_error).collect())
    }

    fn to_ack_error(attributes: &HashMap<String, String>) -> AckError {
        AckError {
            code: attributes.get(CODE_ATTRIBUTE).cloned().unwrap_or_default(),
            display: attributes
                .get(DISPLAY_ATTRIBUTE)
                .cloned()
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ehrflow_core::{ConversationState, TransferError, TransferRequest, now_utc};
    use ehrflow_db_memory::InMemoryConversationStore;

    use super::*;
    use crate::xml::testing::StubCursor;

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

    struct Fixture {
        handler: AckHandler,
        store: Arc<InMemoryConversationStore>,
        cursor: Arc<StubCursor>,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryConversationStore::new());
        store
            .create(ConversationState::new("c-1", request(), now_utc()))
            .await
            .unwrap();
        let cursor = Arc::new(StubCursor::new());
        cursor.set(MESSAGE_REF_PATH, "m-1");
        cursor.set(ROOT_ID_PATH, "ack-root-1");
        let handler = AckHandler::new(store.clone(), cursor.clone());
        Fixture {
            handler,
            store,
            cursor,
        }
    }

    fn error_entry(code: &str, display: &str) -> HashMap<String, String> {
        HashMap::from([
            (CODE_ATTRIBUTE.to_string(), code.to_string()),
            (DISPLAY_ATTRIBUTE.to_string(), display.to_string()),
        ])
    }

    #[tokio::test]
    async fn positive_ack_closes_conversation() {
        let f = fixture().await;
        f.cursor.set(TYPE_CODE_PATH, "AA");

        f.handler.handle("c-1", "<ack/>").await.unwrap();

        let state = f.store.get("c-1").await.unwrap().unwrap();
        let ack = state.received_acknowledgement.as_ref().expect("ack applied");
        assert_eq!(ack.root_id, "ack-root-1");
        assert_eq!(ack.message_ref, "m-1");
        assert_eq!(ack.received, ack.conversation_closed);
        assert!(!ack.is_negative());
        assert!(state.is_terminal());
    }

    #[tokio::test]
    async fn business_error_ack_carries_error_details() {
        let f = fixture().await;
        f.cursor.set(TYPE_CODE_PATH, "AE");
        f.cursor.set_entries(
            BUSINESS_ERROR_DETAILS_PATH,
            vec![
                error_entry("99", "Unexpected condition"),
                error_entry("30", "LM general failure"),
            ],
        );

        f.handler.handle("c-1", "<ack/>").await.unwrap();

        let state = f.store.get("c-1").await.unwrap().unwrap();
        let ack = state.received_acknowledgement.as_ref().expect("ack applied");
        let errors = ack.errors.as_ref().expect("errors present");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].code, "99");
        assert_eq!(errors[1].display, "LM general failure");
        assert!(state.is_resendable());
    }

    #[tokio::test]
    async fn rejection_ack_reads_details_from_acknowledgement_detail() {
        let f = fixture().await;
        f.cursor.set(TYPE_CODE_PATH, "AR");
        f.cursor
            .set_entries(REJECTED_DETAILS_PATH, vec![error_entry("02", "Rejected")]);

        f.handler.handle("c-1", "<ack/>").await.unwrap();

        let state = f.store.get("c-1").await.unwrap().unwrap();
        let errors = state
            .received_acknowledgement
            .unwrap()
            .errors
            .expect("errors present");
        assert_eq!(errors[0].code, "02");
    }

    #[tokio::test]
    async fn unsupported_type_code_is_invalid() {
        let f = fixture().await;
        f.cursor.set(TYPE_CODE_PATH, "XX");

        let err = f.handler.handle("c-1", "<ack/>").await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidInboundMessage(_)));

        let state = f.store.get("c-1").await.unwrap().unwrap();
        assert!(state.received_acknowledgement.is_none());
    }

    #[tokio::test]
    async fn ack_against_terminal_conversation_is_discarded() {
        let f = fixture().await;
        f.store
            .update_error(
                "c-1",
                TransferError {
                    code: "99".into(),
                    message: "timed out".into(),
                    task_type: "ACK_TIMEOUT".into(),
                    occurred_at: now_utc(),
                },
            )
            .await
            .unwrap();
        f.cursor.set(TYPE_CODE_PATH, "AA");

        f.handler.handle("c-1", "<ack/>").await.unwrap();

        let state = f.store.get("c-1").await.unwrap().unwrap();
        assert!(state.received_acknowledgement.is_none());
        assert!(state.error.is_some());
    }
}
