use serde::{Deserialize, Serialize};

use ehrflow_core::{CoreError, Result, TransferRequest, new_id};

/// Wire-level task kind. The queue message carries this as an explicit type
/// tag alongside the serialized definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskType {
    GetStructuredRecord,
    GetDocument,
    SendCore,
    SendDocument,
    SendAcknowledgement,
    SendAbsentAttachment,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetStructuredRecord => "GET_STRUCTURED_RECORD",
            Self::GetDocument => "GET_DOCUMENT",
            Self::SendCore => "SEND_CORE",
            Self::SendDocument => "SEND_DOCUMENT",
            Self::SendAcknowledgement => "SEND_ACKNOWLEDGEMENT",
            Self::SendAbsentAttachment => "SEND_ABSENT_ATTACHMENT",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "GET_STRUCTURED_RECORD" => Some(Self::GetStructuredRecord),
            "GET_DOCUMENT" => Some(Self::GetDocument),
            "SEND_CORE" => Some(Self::SendCore),
            "SEND_DOCUMENT" => Some(Self::SendDocument),
            "SEND_ACKNOWLEDGEMENT" => Some(Self::SendAcknowledgement),
            "SEND_ABSENT_ATTACHMENT" => Some(Self::SendAbsentAttachment),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of task definitions, one case per task kind. Each variant
/// carries the conversation id, its own task id and the correlation fields
/// needed to execute without a prior read of the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskDefinition {
    GetStructuredRecord(GetStructuredRecordTask),
    GetDocument(GetDocumentTask),
    SendCore(SendCoreTask),
    SendDocument(SendDocumentTask),
    SendAcknowledgement(SendAcknowledgementTask),
    SendAbsentAttachment(SendAbsentAttachmentTask),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetStructuredRecordTask {
    pub task_id: String,
    pub conversation_id: String,
    pub request_id: String,
    pub nhs_number: String,
    pub from_asid: String,
    pub to_asid: String,
    pub from_ods_code: String,
    pub to_ods_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetDocumentTask {
    pub task_id: String,
    pub conversation_id: String,
    pub document_id: String,
    pub access_url: String,
    pub message_id: String,
    pub from_asid: String,
    pub to_asid: String,
    pub from_ods_code: String,
    pub to_ods_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendCoreTask {
    pub task_id: String,
    pub conversation_id: String,
    pub request_id: String,
    pub message_id: String,
    pub from_asid: String,
    pub to_asid: String,
    pub from_ods_code: String,
    pub to_ods_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendDocumentTask {
    pub task_id: String,
    pub conversation_id: String,
    pub document_id: String,
    /// Object-storage reference of the stored outbound envelope.
    pub document_name: String,
    pub message_id: String,
    pub from_asid: String,
    pub to_asid: String,
    pub from_ods_code: String,
    pub to_ods_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckType {
    Positive,
    Negative,
}

impl AckType {
    /// Protocol type code carried in the acknowledgement payload.
    pub fn type_code(&self) -> &'static str {
        match self {
            Self::Positive => "AA",
            Self::Negative => "AE",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendAcknowledgementTask {
    pub task_id: String,
    pub conversation_id: String,
    pub ack_type: AckType,
    /// Message id of the request being acknowledged.
    pub message_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub from_asid: String,
    pub to_asid: String,
    pub from_ods_code: String,
    pub to_ods_code: String,
}

impl SendAcknowledgementTask {
    pub fn is_negative(&self) -> bool {
        self.ack_type == AckType::Negative
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendAbsentAttachmentTask {
    pub task_id: String,
    pub conversation_id: String,
    pub document_id: String,
    pub message_id: String,
    /// Why the real attachment could not be retrieved.
    pub reason: String,
    pub from_asid: String,
    pub to_asid: String,
    pub from_ods_code: String,
    pub to_ods_code: String,
}

impl TaskDefinition {
    pub fn task_type(&self) -> TaskType {
        match self {
            Self::GetStructuredRecord(_) => TaskType::GetStructuredRecord,
            Self::GetDocument(_) => TaskType::GetDocument,
            Self::SendCore(_) => TaskType::SendCore,
            Self::SendDocument(_) => TaskType::SendDocument,
            Self::SendAcknowledgement(_) => TaskType::SendAcknowledgement,
            Self::SendAbsentAttachment(_) => TaskType::SendAbsentAttachment,
        }
    }

    pub fn conversation_id(&self) -> &str {
        match self {
            Self::GetStructuredRecord(t) => &t.conversation_id,
            Self::GetDocument(t) => &t.conversation_id,
            Self::SendCore(t) => &t.conversation_id,
            Self::SendDocument(t) => &t.conversation_id,
            Self::SendAcknowledgement(t) => &t.conversation_id,
            Self::SendAbsentAttachment(t) => &t.conversation_id,
        }
    }

    pub fn task_id(&self) -> &str {
        match self {
            Self::GetStructuredRecord(t) => &t.task_id,
            Self::GetDocument(t) => &t.task_id,
            Self::SendCore(t) => &t.task_id,
            Self::SendDocument(t) => &t.task_id,
            Self::SendAcknowledgement(t) => &t.task_id,
            Self::SendAbsentAttachment(t) => &t.task_id,
        }
    }

    /// Outbound negative acknowledgements still execute against terminal
    /// conversations and are never silently dropped.
    pub fn is_negative_ack(&self) -> bool {
        matches!(self, Self::SendAcknowledgement(t) if t.is_negative())
    }

    /// Splits the definition into the wire type tag and the serialized body.
    pub fn to_parts(&self) -> Result<(&'static str, String)> {
        let tag = self.task_type().as_str();
        let body = match self {
            Self::GetStructuredRecord(t) => serde_json::to_string(t)?,
            Self::GetDocument(t) => serde_json::to_string(t)?,
            Self::SendCore(t) => serde_json::to_string(t)?,
            Self::SendDocument(t) => serde_json::to_string(t)?,
            Self::SendAcknowledgement(t) => serde_json::to_string(t)?,
            Self::SendAbsentAttachment(t) => serde_json::to_string(t)?,
        };
        Ok((tag, body))
    }

    /// Rebuilds a definition from the type tag and serialized body of a
    /// queued message.
    pub fn from_parts(tag: &str, body: &str) -> Result<Self> {
        let task_type = TaskType::from_tag(tag).ok_or_else(|| {
            CoreError::invalid_inbound_message(format!("unknown task type tag: {tag}"))
        })?;
        let task = match task_type {
            TaskType::GetStructuredRecord => {
                Self::GetStructuredRecord(serde_json::from_str(body)?)
            }
            TaskType::GetDocument => Self::GetDocument(serde_json::from_str(body)?),
            TaskType::SendCore => Self::SendCore(serde_json::from_str(body)?),
            TaskType::SendDocument => Self::SendDocument(serde_json::from_str(body)?),
            TaskType::SendAcknowledgement => {
                Self::SendAcknowledgement(serde_json::from_str(body)?)
            }
            TaskType::SendAbsentAttachment => {
                Self::SendAbsentAttachment(serde_json::from_str(body)?)
            }
        };
        Ok(task)
    }

    /// First fetch task of the pipeline, built from the stored correlation
    /// fields. Used on extract-request receipt and on admin resend.
    pub fn structured_record_fetch(
        conversation_id: &str,
        request: &TransferRequest,
    ) -> Self {
        Self::GetStructuredRecord(GetStructuredRecordTask {
            task_id: new_id(),
            conversation_id: conversation_id.to_string(),
            request_id: request.request_id.clone(),
            nhs_number: request.nhs_number.clone(),
            from_asid: request.from_asid.clone(),
            to_asid: request.to_asid.clone(),
            from_ods_code: request.from_ods_code.clone(),
            to_ods_code: request.to_ods_code.clone(),
        })
    }

    /// Per-document fetch task, dispatched as documents are discovered in the
    /// structured record.
    pub fn document_fetch(
        conversation_id: &str,
        request: &TransferRequest,
        document_id: &str,
        access_url: &str,
    ) -> Self {
        Self::GetDocument(GetDocumentTask {
            task_id: new_id(),
            conversation_id: conversation_id.to_string(),
            document_id: document_id.to_string(),
            access_url: access_url.to_string(),
            message_id: new_id(),
            from_asid: request.from_asid.clone(),
            to_asid: request.to_asid.clone(),
            from_ods_code: request.from_ods_code.clone(),
            to_ods_code: request.to_ods_code.clone(),
        })
    }

    /// Placeholder-substitution task for a document that could not be
    /// retrieved.
    pub fn absent_attachment(
        conversation_id: &str,
        request: &TransferRequest,
        document_id: &str,
        message_id: &str,
        reason: &str,
    ) -> Self {
        Self::SendAbsentAttachment(SendAbsentAttachmentTask {
            task_id: new_id(),
            conversation_id: conversation_id.to_string(),
            document_id: document_id.to_string(),
            message_id: message_id.to_string(),
            reason: reason.to_string(),
            from_asid: request.from_asid.clone(),
            to_asid: request.to_asid.clone(),
            from_ods_code: request.from_ods_code.clone(),
            to_ods_code: request.to_ods_code.clone(),
        })
    }

    /// Document send task built from a stored document entry once the
    /// counterpart's continue message arrives.
    pub fn document_send(
        conversation_id: &str,
        request: &TransferRequest,
        document_id: &str,
        document_name: &str,
        message_id: Option<&str>,
    ) -> Self {
        Self::SendDocument(SendDocumentTask {
            task_id: new_id(),
            conversation_id: conversation_id.to_string(),
            document_id: document_id.to_string(),
            document_name: document_name.to_string(),
            message_id: message_id.map(str::to_string).unwrap_or_else(new_id),
            from_asid: request.from_asid.clone(),
            to_asid: request.to_asid.clone(),
            from_ods_code: request.from_ods_code.clone(),
            to_ods_code: request.to_ods_code.clone(),
        })
    }

    /// Core-extract send task, dispatched once the preparing-data stage is
    /// finished. The outbound message id is minted here.
    pub fn core_send(conversation_id: &str, request: &TransferRequest) -> Self {
        Self::SendCore(SendCoreTask {
            task_id: new_id(),
            conversation_id: conversation_id.to_string(),
            request_id: request.request_id.clone(),
            message_id: new_id(),
            from_asid: request.from_asid.clone(),
            to_asid: request.to_asid.clone(),
            from_ods_code: request.from_ods_code.clone(),
            to_ods_code: request.to_ods_code.clone(),
        })
    }

    pub fn positive_acknowledgement(conversation_id: &str, request: &TransferRequest) -> Self {
        Self::SendAcknowledgement(SendAcknowledgementTask {
            task_id: new_id(),
            conversation_id: conversation_id.to_string(),
            ack_type: AckType::Positive,
            message_ref: request.message_id.clone(),
            reason_code: None,
            detail: None,
            from_asid: request.from_asid.clone(),
            to_asid: request.to_asid.clone(),
            from_ods_code: request.from_ods_code.clone(),
            to_ods_code: request.to_ods_code.clone(),
        })
    }

    pub fn negative_acknowledgement(
        conversation_id: &str,
        request: &TransferRequest,
        reason_code: &str,
        detail: &str,
    ) -> Self {
        Self::SendAcknowledgement(SendAcknowledgementTask {
            task_id: new_id(),
            conversation_id: conversation_id.to_string(),
            ack_type: AckType::Negative,
            message_ref: request.message_id.clone(),
            reason_code: Some(reason_code.to_string()),
            detail: Some(detail.to_string()),
            from_asid: request.from_asid.clone(),
            to_asid: request.to_asid.clone(),
            from_ods_code: request.from_ods_code.clone(),
            to_ods_code: request.to_ods_code.clone(),
        })
    }
}
