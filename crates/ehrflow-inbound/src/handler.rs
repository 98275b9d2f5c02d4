use std::sync::Arc;

use tracing::{error, warn};

use ehrflow_core::{CoreError, Result, TransferError, now_utc};
use ehrflow_storage::{ConversationStore, ErrorOutcome};
use ehrflow_tasks::{TaskDefinition, TaskDispatcher};

use crate::ack::{ACK_INTERACTION, AckHandler};
use crate::envelope::InboundMessage;
use crate::request::{
    CONTINUE_INTERACTION, CONVERSATION_ID_PATH, EXTRACT_REQUEST_INTERACTION,
    ExtractRequestHandler,
};
use crate::xml::XmlCursor;

const ACTION_PATH: &str = "/Envelope/Header/MessageHeader/Action";

/// How the messaging layer should settle the inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundDisposition {
    /// Fully handled, or the failure was recorded against the conversation.
    Acknowledge,
    /// Unreadable or unrecoverable; left for broker redelivery.
    Reject,
}

/// Classifies an inbound message by its action identifier and routes it to
/// the matching handler. Mirrors the task consumer's failure contract: a
/// handler error closes the conversation and enqueues a negative
/// acknowledgement; an unreadable message is never acknowledged.
pub struct InboundHandler {
    store: Arc<dyn ConversationStore>,
    dispatcher: TaskDispatcher,
    xml: Arc<dyn XmlCursor>,
    extract_request: ExtractRequestHandler,
    ack: AckHandler,
}

impl InboundHandler {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        dispatcher: TaskDispatcher,
        xml: Arc<dyn XmlCursor>,
    ) -> Self {
        let extract_request =
            ExtractRequestHandler::new(store.clone(), dispatcher.clone(), xml.clone());
        let ack = AckHandler::new(store.clone(), xml.clone());
        Self {
            store,
            dispatcher,
            xml,
            extract_request,
            ack,
        }
    }

    /// Entry point for the messaging layer.
    pub async fn process(&self, raw: &str) -> InboundDisposition {
        let message: InboundMessage = match serde_json::from_str(raw) {
            Ok(message) => message,
            Err(err) => {
                error!(error = %err, "inbound message is not valid JSON, leaving for redelivery");
                return InboundDisposition::Reject;
            }
        };

        match self.dispatch(&message).await {
            Ok(()) => InboundDisposition::Acknowledge,
            Err(err) => match self.fail(&message, &err).await {
                Ok(()) => InboundDisposition::Acknowledge,
                Err(fail_err) => {
                    error!(
                        error = %err,
                        follow_up_error = %fail_err,
                        "inbound failure could not be recorded, leaving for redelivery"
                    );
                    InboundDisposition::Reject
                }
            },
        }
    }

    async fn dispatch(&self, message: &InboundMessage) -> Result<()> {
        let interaction_id = self
            .xml
            .node_value(&message.ebxml, ACTION_PATH)?
            .unwrap_or_default();

        match interaction_id.as_str() {
            EXTRACT_REQUEST_INTERACTION => {
                self.extract_request
                    .handle(&message.ebxml, &message.payload)
                    .await
            }
            CONTINUE_INTERACTION => {
                let conversation_id = self.conversation_id(message)?;
                self.extract_request
                    .handle_continue(&conversation_id, &message.payload)
                    .await
            }
            ACK_INTERACTION => {
                let conversation_id = self.conversation_id(message)?;
                self.ack.handle(&conversation_id, &message.payload).await
            }
            other => Err(CoreError::invalid_inbound_message(format!(
                "Unsupported interaction id: {other}"
            ))),
        }
    }

    /// Closes the conversation named by the failed message and enqueues a
    /// negative acknowledgement. When the conversation is unknown or already
    /// terminal there is nothing to record; the message is acknowledged with
    /// no further action.
    async fn fail(&self, message: &InboundMessage, err: &CoreError) -> Result<()> {
        let conversation_id = match self.conversation_id(message) {
            Ok(id) => id,
            Err(_) => {
                warn!(
                    error = %err,
                    "inbound message failed without an identifiable conversation"
                );
                return Ok(());
            }
        };

        error!(
            conversation_id = %conversation_id,
            error = %err,
            "inbound handling failed, closing conversation"
        );

        let Some(state) = self.store.get(&conversation_id).await? else {
            warn!(
                conversation_id = %conversation_id,
                "failed inbound message references an unknown conversation"
            );
            return Ok(());
        };

        let outcome = self
            .store
            .update_error(
                &conversation_id,
                TransferError {
                    code: err.reason_code().to_string(),
                    message: err.to_string(),
                    task_type: "INBOUND".to_string(),
                    occurred_at: now_utc(),
                },
            )
            .await?;
        if outcome == ErrorOutcome::Discarded {
            warn!(
                conversation_id = %conversation_id,
                "conversation already terminal, inbound failure discarded"
            );
            return Ok(());
        }

        let negative_ack = TaskDefinition::negative_acknowledgement(
            &conversation_id,
            &state.request,
            err.reason_code(),
            err.reason_detail(),
        );
        self.dispatcher.dispatch(&negative_ack).await
    }

    fn conversation_id(&self, message: &InboundMessage) -> Result<String> {
        match self.xml.node_value(&message.ebxml, CONVERSATION_ID_PATH)? {
            Some(id) if !id.trim().is_empty() => Ok(id),
            _ => Err(CoreError::invalid_inbound_message(
                "inbound message has no conversation id",
            )),
        }
    }
}
