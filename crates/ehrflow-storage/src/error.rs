use ehrflow_core::CoreError;
use thiserror::Error;

/// Errors that can occur during conversation store operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The referenced conversation does not exist.
    #[error("Conversation not found: {conversation_id}")]
    NotFound { conversation_id: String },

    /// A conversation with this id already exists.
    #[error("Conversation already exists: {conversation_id}")]
    AlreadyExists { conversation_id: String },

    /// A stage precondition was violated, e.g. acknowledging a document id
    /// that is not present in the document access list.
    #[error("Invalid transition: {message}")]
    InvalidTransition { message: String },

    /// Backend infrastructure failure.
    #[error("Storage internal error: {message}")]
    Internal { message: String },
}

impl StorageError {
    pub fn not_found(conversation_id: impl Into<String>) -> Self {
        Self::NotFound {
            conversation_id: conversation_id.into(),
        }
    }

    pub fn already_exists(conversation_id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            conversation_id: conversation_id.into(),
        }
    }

    pub fn invalid_transition(message: impl Into<String>) -> Self {
        Self::InvalidTransition {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { conversation_id } => {
                CoreError::not_found("Conversation", conversation_id)
            }
            StorageError::InvalidTransition { message } => CoreError::invalid_transition(message),
            other => CoreError::unclassified(other.to_string()),
        }
    }
}
