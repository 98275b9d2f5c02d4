use tracing::info;

use ehrflow_core::{ConversationState, Result};

use crate::definitions::TaskDefinition;
use crate::dispatcher::TaskDispatcher;

/// Stage-completion detection. Each check is a pure predicate over the
/// freshly-updated conversation state paired with a dispatch side effect, and
/// is re-evaluated after every mutation that could flip it.
#[derive(Clone)]
pub struct CompletionTriggers {
    dispatcher: TaskDispatcher,
}

impl CompletionTriggers {
    pub fn new(dispatcher: TaskDispatcher) -> Self {
        Self { dispatcher }
    }

    /// Called after any preparing-data mutation (structured record stored,
    /// document stored, absent-attachment placeholder substituted). Dispatches
    /// the core-extract send once the whole stage is finished.
    pub async fn on_preparing_data_updated(&self, state: &ConversationState) -> Result<()> {
        if !state.is_preparing_data_finished() {
            return Ok(());
        }
        info!(
            conversation_id = %state.conversation_id,
            "preparing-data stage finished, dispatching core extract send"
        );
        let task = TaskDefinition::core_send(&state.conversation_id, &state.request);
        self.dispatcher.dispatch(&task).await
    }

    /// Called after a document send lands. Dispatches the positive
    /// acknowledgement to the requester once every document is sent.
    pub async fn on_document_sent(&self, state: &ConversationState) -> Result<()> {
        if !state.are_all_documents_sent() {
            return Ok(());
        }
        info!(
            conversation_id = %state.conversation_id,
            "all documents sent, dispatching positive acknowledgement"
        );
        let task =
            TaskDefinition::positive_acknowledgement(&state.conversation_id, &state.request);
        self.dispatcher.dispatch(&task).await
    }
}
