use async_trait::async_trait;
use time::OffsetDateTime;

use ehrflow_core::{
    ConversationState, DocumentAccess, ReceivedAcknowledgement, TransferError,
};

use crate::error::StorageError;

/// Result of applying a received acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The acknowledgement was recorded and mirrored into
    /// `received_acknowledgement`.
    Applied,
    /// The conversation was already terminal; nothing was mutated. The caller
    /// logs the discard for audit.
    DiscardedTerminal,
}

/// Result of applying a terminal error marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOutcome {
    Applied,
    /// A terminal state (error or final acknowledgement) was already present;
    /// the write lost the race and was discarded.
    Discarded,
}

/// The conversation state store.
///
/// Implementations must be thread-safe (`Send + Sync`) and perform every
/// update as an atomic find-and-modify on the keyed record. Each update is
/// scoped to one pipeline stage and takes only the fields it writes.
///
/// # Errors
///
/// Unless stated otherwise, operations return [`StorageError::NotFound`] when
/// the conversation id is unknown and [`StorageError::InvalidTransition`]
/// when a stage precondition is violated.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Persists a newly created conversation.
    ///
    /// Returns [`StorageError::AlreadyExists`] for a duplicate conversation
    /// id; the caller treats the duplicate extract request as a replay and
    /// skips task creation.
    async fn create(&self, state: ConversationState) -> Result<(), StorageError>;

    async fn get(&self, conversation_id: &str)
    -> Result<Option<ConversationState>, StorageError>;

    /// Conversations with no terminal error and no final acknowledgement
    /// resolution. Swept by the ack-timeout reconciler.
    async fn find_in_progress(&self) -> Result<Vec<ConversationState>, StorageError>;

    /// Records that the structured record was fetched and stored.
    async fn update_structured_record_access(
        &self,
        conversation_id: &str,
        task_id: &str,
        object_reference: &str,
    ) -> Result<ConversationState, StorageError>;

    /// Appends newly discovered document entries. Entries whose document id
    /// is already present are left untouched (set semantics, safe to re-run).
    async fn add_document_entries(
        &self,
        conversation_id: &str,
        entries: Vec<DocumentAccess>,
    ) -> Result<ConversationState, StorageError>;

    /// Records a fetched and stored document.
    async fn update_document_access(
        &self,
        conversation_id: &str,
        document_id: &str,
        object_reference: &str,
        content_length: usize,
        content_type: &str,
        task_id: &str,
        message_id: &str,
    ) -> Result<ConversationState, StorageError>;

    /// Substitutes an absent-attachment placeholder for a document that could
    /// not be retrieved.
    async fn update_document_absent(
        &self,
        conversation_id: &str,
        document_id: &str,
        object_reference: &str,
        error_reason: &str,
        task_id: &str,
    ) -> Result<ConversationState, StorageError>;

    async fn update_core_pending(
        &self,
        conversation_id: &str,
        task_id: &str,
        sent_at: OffsetDateTime,
    ) -> Result<(), StorageError>;

    async fn update_core_sent(
        &self,
        conversation_id: &str,
        task_id: &str,
        sent_at: OffsetDateTime,
    ) -> Result<(), StorageError>;

    /// Records receipt of a continue message. A replayed continue overwrites
    /// the previous timestamp.
    async fn update_continue_received(
        &self,
        conversation_id: &str,
        at: OffsetDateTime,
    ) -> Result<ConversationState, StorageError>;

    /// Records the outbound message ids produced by a document send task.
    async fn update_document_sent(
        &self,
        conversation_id: &str,
        document_id: &str,
        message_ids: Vec<String>,
        task_id: &str,
        sent_at: OffsetDateTime,
    ) -> Result<ConversationState, StorageError>;

    async fn update_ack_pending(
        &self,
        conversation_id: &str,
        task_id: &str,
        message_id: &str,
        type_code: &str,
        at: OffsetDateTime,
    ) -> Result<(), StorageError>;

    async fn update_ack_to_requester(
        &self,
        conversation_id: &str,
        task_id: &str,
        message_id: &str,
        type_code: &str,
        reason_code: Option<&str>,
        detail: Option<&str>,
    ) -> Result<(), StorageError>;

    /// Applies an acknowledgement received from the counterpart.
    ///
    /// When the conversation is already terminal the acknowledgement is
    /// discarded without mutation and [`AckOutcome::DiscardedTerminal`] is
    /// returned. Otherwise the acknowledgement is appended to `ack_history`
    /// and mirrored into `received_acknowledgement`.
    async fn apply_received_acknowledgement(
        &self,
        conversation_id: &str,
        ack: ReceivedAcknowledgement,
    ) -> Result<AckOutcome, StorageError>;

    /// Marks the conversation terminal with a failure.
    ///
    /// The write is conditional: if an error or a final acknowledgement has
    /// already landed, the update is discarded so a late timeout sweep can
    /// never resurrect or overwrite a resolved conversation.
    async fn update_error(
        &self,
        conversation_id: &str,
        error: TransferError,
    ) -> Result<ErrorOutcome, StorageError>;

    /// Admin resend preparation: clears every per-attempt stage field
    /// (structured record access, document entries, core send markers,
    /// continue receipt, acknowledgements, error) so the pipeline can run
    /// again from the record fetch.
    async fn reset_for_resend(&self, conversation_id: &str) -> Result<(), StorageError>;

    /// Backend name for logging.
    fn backend_name(&self) -> &'static str;
}
