use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Durable per-conversation aggregate. One record per `conversation_id`,
/// created when an extract request arrives and mutated field-by-field by the
/// task executors and inbound handlers until the transfer completes or fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub conversation_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// Correlation fields fixed at creation.
    pub request: TransferRequest,
    /// Present once the structured clinical record has been fetched and
    /// stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_record_access: Option<StructuredRecordAccess>,
    /// Per-document fetch/send progress, ordered as discovered.
    #[serde(default)]
    pub document_access: Vec<DocumentAccess>,
    /// Set when the core extract send is dispatched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub core_pending: Option<CoreTaskReference>,
    /// Set once the transport confirms the core extract send.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub core: Option<CoreTaskReference>,
    /// When the counterpart's continue message arrived. A replayed continue
    /// overwrites this value.
    #[serde(with = "time::serde::rfc3339::option", default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continue_received: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ack_pending: Option<AckPending>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ack_to_requester: Option<AckToRequester>,
    /// Latest acknowledgement received from the counterpart; mirrors the tail
    /// of `ack_history`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_acknowledgement: Option<ReceivedAcknowledgement>,
    /// Append-only audit log of every acknowledgement received.
    #[serde(default)]
    pub ack_history: Vec<ReceivedAcknowledgement>,
    /// Terminal failure marker. Monotonic: once set, never cleared by a later
    /// pipeline stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TransferError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub request_id: String,
    pub nhs_number: String,
    pub from_asid: String,
    pub to_asid: String,
    pub from_ods_code: String,
    pub to_ods_code: String,
    pub message_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredRecordAccess {
    /// Object-storage reference of the stored structured record.
    pub object_reference: String,
    #[serde(with = "time::serde::rfc3339")]
    pub accessed_at: OffsetDateTime,
    pub task_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentAccess {
    pub document_id: String,
    pub access_url: String,
    /// Filled in when the fetch/translate task completes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Set instead of `object_reference` when an absent-attachment
    /// placeholder was substituted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_to_transport: Option<SentToTransport>,
}

impl DocumentAccess {
    pub fn new(document_id: impl Into<String>, access_url: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            access_url: access_url.into(),
            object_reference: None,
            content_length: None,
            content_type: None,
            error_reason: None,
            task_id: None,
            message_id: None,
            sent_to_transport: None,
        }
    }

    /// A document is prepared when it has either been stored or substituted
    /// with an absent-attachment placeholder.
    pub fn is_prepared(&self) -> bool {
        self.object_reference
            .as_deref()
            .is_some_and(|r| !r.trim().is_empty())
            || self.error_reason.is_some()
    }

    pub fn is_sent(&self) -> bool {
        self.sent_to_transport
            .as_ref()
            .is_some_and(|s| !s.message_ids.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentToTransport {
    /// Message ids of the main outbound unit plus any chunk units.
    pub message_ids: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: OffsetDateTime,
    pub task_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreTaskReference {
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: OffsetDateTime,
    pub task_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckPending {
    pub task_id: String,
    pub message_id: String,
    pub type_code: String,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckToRequester {
    pub task_id: String,
    pub message_id: String,
    pub type_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceivedAcknowledgement {
    pub root_id: String,
    pub message_ref: String,
    #[serde(with = "time::serde::rfc3339")]
    pub received: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub conversation_closed: OffsetDateTime,
    /// None for a positive acknowledgement; one or more entries otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<AckError>>,
}

impl ReceivedAcknowledgement {
    pub fn is_negative(&self) -> bool {
        self.errors.as_ref().is_some_and(|e| !e.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckError {
    pub code: String,
    pub display: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferError {
    pub code: String,
    pub message: String,
    pub task_type: String,
    #[serde(with = "time::serde::rfc3339")]
    pub occurred_at: OffsetDateTime,
}

impl ConversationState {
    pub fn new(
        conversation_id: impl Into<String>,
        request: TransferRequest,
        at: OffsetDateTime,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            created: at,
            updated_at: at,
            request,
            structured_record_access: None,
            document_access: Vec::new(),
            core_pending: None,
            core: None,
            continue_received: None,
            ack_pending: None,
            ack_to_requester: None,
            received_acknowledgement: None,
            ack_history: Vec::new(),
            error: None,
        }
    }

    /// Preparing-data stage is finished when the structured record is stored
    /// and every document has either an object reference or an error reason.
    /// An empty document list counts as satisfied.
    pub fn is_preparing_data_finished(&self) -> bool {
        let structured_present = self
            .structured_record_access
            .as_ref()
            .is_some_and(|a| !a.object_reference.trim().is_empty());
        structured_present && self.document_access.iter().all(DocumentAccess::is_prepared)
    }

    /// All documents sent once every entry's send task has recorded its
    /// outbound message ids.
    pub fn are_all_documents_sent(&self) -> bool {
        self.document_access.iter().all(DocumentAccess::is_sent)
    }

    pub fn has_failed(&self) -> bool {
        self.error.is_some()
    }

    /// A conversation is terminal once an error landed or a final
    /// acknowledgement has been received.
    pub fn is_terminal(&self) -> bool {
        self.error.is_some() || self.received_acknowledgement.is_some()
    }

    /// In-progress conversations are swept by the ack-timeout reconciler.
    pub fn is_in_progress(&self) -> bool {
        self.error.is_none()
            && self.received_acknowledgement.is_none()
            && self.ack_to_requester.is_none()
    }

    /// Whether an admin-triggered resend is allowed: only after the transfer
    /// failed (error set or a negative acknowledgement received).
    pub fn is_resendable(&self) -> bool {
        let nack_received = self
            .received_acknowledgement
            .as_ref()
            .is_some_and(ReceivedAcknowledgement::is_negative);
        self.error.is_some() || nack_received
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{new_id, now_utc};

    fn request() -> TransferRequest {
        TransferRequest {
            request_id: new_id(),
            nhs_number: "9690937286".into(),
            from_asid: "200000000359".into(),
            to_asid: "918999198738".into(),
            from_ods_code: "GPC001".into(),
            to_ods_code: "B86041".into(),
            message_id: new_id(),
        }
    }

    fn state() -> ConversationState {
        ConversationState::new(new_id(), request(), now_utc())
    }

    fn prepared_document(id: &str) -> DocumentAccess {
        DocumentAccess {
            object_reference: Some(format!("{id}.json")),
            ..DocumentAccess::new(id, format!("https://gpc.example/Binary/{id}"))
        }
    }

    #[test]
    fn preparing_data_finished_with_structured_record_and_no_documents() {
        let mut state = state();
        assert!(!state.is_preparing_data_finished());

        state.structured_record_access = Some(StructuredRecordAccess {
            object_reference: "structured.json".into(),
            accessed_at: now_utc(),
            task_id: new_id(),
        });
        assert!(state.is_preparing_data_finished());
    }

    #[test]
    fn preparing_data_finished_when_all_documents_have_object_references() {
        let mut state = state();
        state.structured_record_access = Some(StructuredRecordAccess {
            object_reference: "structured.json".into(),
            accessed_at: now_utc(),
            task_id: new_id(),
        });
        state.document_access = vec![prepared_document("d1"), prepared_document("d2")];
        assert!(state.is_preparing_data_finished());
    }

    #[test]
    fn preparing_data_not_finished_when_a_document_lacks_reference_and_reason() {
        let mut state = state();
        state.structured_record_access = Some(StructuredRecordAccess {
            object_reference: "structured.json".into(),
            accessed_at: now_utc(),
            task_id: new_id(),
        });
        state.document_access = vec![
            prepared_document("d1"),
            DocumentAccess::new("d2", "https://gpc.example/Binary/d2"),
        ];
        assert!(!state.is_preparing_data_finished());
    }

    #[test]
    fn absent_attachment_reason_counts_as_prepared() {
        let mut doc = DocumentAccess::new("d1", "url");
        doc.error_reason = Some("Download failed".into());
        assert!(doc.is_prepared());
    }

    #[test]
    fn blank_object_reference_is_not_prepared() {
        let mut doc = DocumentAccess::new("d1", "url");
        doc.object_reference = Some("  ".into());
        assert!(!doc.is_prepared());
    }

    #[test]
    fn all_documents_sent_tracks_transport_message_ids() {
        let mut state = state();
        let mut doc = prepared_document("d1");
        assert!(!doc.is_sent());
        doc.sent_to_transport = Some(SentToTransport {
            message_ids: vec![new_id()],
            sent_at: now_utc(),
            task_id: new_id(),
        });
        state.document_access = vec![doc];
        assert!(state.are_all_documents_sent());
    }

    #[test]
    fn error_makes_conversation_terminal_and_resendable() {
        let mut state = state();
        assert!(state.is_in_progress());
        state.error = Some(TransferError {
            code: "99".into(),
            message: "boom".into(),
            task_type: "SEND_CORE".into(),
            occurred_at: now_utc(),
        });
        assert!(state.is_terminal());
        assert!(!state.is_in_progress());
        assert!(state.is_resendable());
    }

    #[test]
    fn positive_ack_is_terminal_but_not_resendable() {
        let mut state = state();
        state.received_acknowledgement = Some(ReceivedAcknowledgement {
            root_id: new_id(),
            message_ref: new_id(),
            received: now_utc(),
            conversation_closed: now_utc(),
            errors: None,
        });
        assert!(state.is_terminal());
        assert!(!state.is_resendable());
    }

    #[test]
    fn negative_ack_is_resendable() {
        let mut state = state();
        state.received_acknowledgement = Some(ReceivedAcknowledgement {
            root_id: new_id(),
            message_ref: new_id(),
            received: now_utc(),
            conversation_closed: now_utc(),
            errors: Some(vec![AckError {
                code: "99".into(),
                display: "Unexpected condition".into(),
            }]),
        });
        assert!(state.is_resendable());
    }

    #[test]
    fn serde_round_trip_preserves_optional_stages() {
        let mut state = state();
        state.continue_received = Some(now_utc());
        let json = serde_json::to_string(&state).unwrap();
        let back: ConversationState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.conversation_id, state.conversation_id);
        assert!(back.continue_received.is_some());
        assert!(back.error.is_none());
    }
}
