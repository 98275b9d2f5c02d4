use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use ehrflow_core::{
    AckPending, AckToRequester, ConversationState, CoreTaskReference, DocumentAccess,
    ReceivedAcknowledgement, SentToTransport, StructuredRecordAccess, TransferError, now_utc,
};
use ehrflow_storage::{AckOutcome, ConversationStore, ErrorOutcome, StorageError};

/// In-memory conversation store keyed by conversation id.
#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    data: RwLock<HashMap<String, ConversationState>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic find-and-modify: runs `mutate` under the write lock and bumps
    /// `updated_at` when the mutation succeeds.
    async fn modify<R>(
        &self,
        conversation_id: &str,
        mutate: impl FnOnce(&mut ConversationState) -> Result<R, StorageError>,
    ) -> Result<R, StorageError> {
        let mut data = self.data.write().await;
        let state = data
            .get_mut(conversation_id)
            .ok_or_else(|| StorageError::not_found(conversation_id))?;
        let result = mutate(state)?;
        state.updated_at = now_utc();
        Ok(result)
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create(&self, state: ConversationState) -> Result<(), StorageError> {
        let mut data = self.data.write().await;
        if data.contains_key(&state.conversation_id) {
            return Err(StorageError::already_exists(&state.conversation_id));
        }
        data.insert(state.conversation_id.clone(), state);
        Ok(())
    }

    async fn get(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationState>, StorageError> {
        let data = self.data.read().await;
        Ok(data.get(conversation_id).cloned())
    }

    async fn find_in_progress(&self) -> Result<Vec<ConversationState>, StorageError> {
        let data = self.data.read().await;
        Ok(data
            .values()
            .filter(|state| state.is_in_progress())
            .cloned()
            .collect())
    }

    async fn update_structured_record_access(
        &self,
        conversation_id: &str,
        task_id: &str,
        object_reference: &str,
    ) -> Result<ConversationState, StorageError> {
        self.modify(conversation_id, |state| {
            state.structured_record_access = Some(StructuredRecordAccess {
                object_reference: object_reference.to_string(),
                accessed_at: now_utc(),
                task_id: task_id.to_string(),
            });
            Ok(state.clone())
        })
        .await
    }

    async fn add_document_entries(
        &self,
        conversation_id: &str,
        entries: Vec<DocumentAccess>,
    ) -> Result<ConversationState, StorageError> {
        self.modify(conversation_id, |state| {
            for entry in entries {
                let exists = state
                    .document_access
                    .iter()
                    .any(|d| d.document_id == entry.document_id);
                if !exists {
                    state.document_access.push(entry);
                }
            }
            Ok(state.clone())
        })
        .await
    }

    async fn update_document_access(
        &self,
        conversation_id: &str,
        document_id: &str,
        object_reference: &str,
        content_length: usize,
        content_type: &str,
        task_id: &str,
        message_id: &str,
    ) -> Result<ConversationState, StorageError> {
        self.modify(conversation_id, |state| {
            let doc = find_document(state, document_id)?;
            doc.object_reference = Some(object_reference.to_string());
            doc.content_length = Some(content_length);
            doc.content_type = Some(content_type.to_string());
            doc.task_id = Some(task_id.to_string());
            doc.message_id = Some(message_id.to_string());
            Ok(state.clone())
        })
        .await
    }

    async fn update_document_absent(
        &self,
        conversation_id: &str,
        document_id: &str,
        object_reference: &str,
        error_reason: &str,
        task_id: &str,
    ) -> Result<ConversationState, StorageError> {
        self.modify(conversation_id, |state| {
            let doc = find_document(state, document_id)?;
            doc.object_reference = Some(object_reference.to_string());
            doc.error_reason = Some(error_reason.to_string());
            doc.task_id = Some(task_id.to_string());
            Ok(state.clone())
        })
        .await
    }

    async fn update_core_pending(
        &self,
        conversation_id: &str,
        task_id: &str,
        sent_at: OffsetDateTime,
    ) -> Result<(), StorageError> {
        self.modify(conversation_id, |state| {
            state.core_pending = Some(CoreTaskReference {
                sent_at,
                task_id: task_id.to_string(),
            });
            Ok(())
        })
        .await
    }

    async fn update_core_sent(
        &self,
        conversation_id: &str,
        task_id: &str,
        sent_at: OffsetDateTime,
    ) -> Result<(), StorageError> {
        self.modify(conversation_id, |state| {
            state.core = Some(CoreTaskReference {
                sent_at,
                task_id: task_id.to_string(),
            });
            Ok(())
        })
        .await
    }

    async fn update_continue_received(
        &self,
        conversation_id: &str,
        at: OffsetDateTime,
    ) -> Result<ConversationState, StorageError> {
        self.modify(conversation_id, |state| {
            state.continue_received = Some(at);
            Ok(state.clone())
        })
        .await
    }

    async fn update_document_sent(
        &self,
        conversation_id: &str,
        document_id: &str,
        message_ids: Vec<String>,
        task_id: &str,
        sent_at: OffsetDateTime,
    ) -> Result<ConversationState, StorageError> {
        self.modify(conversation_id, |state| {
            let doc = find_document(state, document_id)?;
            doc.sent_to_transport = Some(SentToTransport {
                message_ids,
                sent_at,
                task_id: task_id.to_string(),
            });
            Ok(state.clone())
        })
        .await
    }

    async fn update_ack_pending(
        &self,
        conversation_id: &str,
        task_id: &str,
        message_id: &str,
        type_code: &str,
        at: OffsetDateTime,
    ) -> Result<(), StorageError> {
        self.modify(conversation_id, |state| {
            state.ack_pending = Some(AckPending {
                task_id: task_id.to_string(),
                message_id: message_id.to_string(),
                type_code: type_code.to_string(),
                updated_at: at,
            });
            Ok(())
        })
        .await
    }

    async fn update_ack_to_requester(
        &self,
        conversation_id: &str,
        task_id: &str,
        message_id: &str,
        type_code: &str,
        reason_code: Option<&str>,
        detail: Option<&str>,
    ) -> Result<(), StorageError> {
        self.modify(conversation_id, |state| {
            state.ack_to_requester = Some(AckToRequester {
                task_id: task_id.to_string(),
                message_id: message_id.to_string(),
                type_code: type_code.to_string(),
                reason_code: reason_code.map(str::to_string),
                detail: detail.map(str::to_string),
            });
            Ok(())
        })
        .await
    }

    async fn apply_received_acknowledgement(
        &self,
        conversation_id: &str,
        ack: ReceivedAcknowledgement,
    ) -> Result<AckOutcome, StorageError> {
        self.modify(conversation_id, |state| {
            if state.is_terminal() {
                return Ok(AckOutcome::DiscardedTerminal);
            }
            state.ack_history.push(ack.clone());
            state.received_acknowledgement = Some(ack);
            Ok(AckOutcome::Applied)
        })
        .await
    }

    async fn update_error(
        &self,
        conversation_id: &str,
        error: TransferError,
    ) -> Result<ErrorOutcome, StorageError> {
        self.modify(conversation_id, |state| {
            if state.is_terminal() {
                return Ok(ErrorOutcome::Discarded);
            }
            state.error = Some(error);
            Ok(ErrorOutcome::Applied)
        })
        .await
    }

    async fn reset_for_resend(&self, conversation_id: &str) -> Result<(), StorageError> {
        self.modify(conversation_id, |state| {
            state.structured_record_access = None;
            state.document_access.clear();
            state.core_pending = None;
            state.core = None;
            state.continue_received = None;
            state.ack_pending = None;
            state.ack_to_requester = None;
            state.received_acknowledgement = None;
            state.error = None;
            Ok(())
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

fn find_document<'a>(
    state: &'a mut ConversationState,
    document_id: &str,
) -> Result<&'a mut DocumentAccess, StorageError> {
    let conversation_id = state.conversation_id.clone();
    state
        .document_access
        .iter_mut()
        .find(|d| d.document_id == document_id)
        .ok_or_else(|| {
            StorageError::invalid_transition(format!(
                "document {document_id} is not present in conversation {conversation_id}"
            ))
        })
}
