use thiserror::Error;

/// Error taxonomy shared by the task pipeline and the inbound protocol
/// handlers. Every failure that escalates to "mark terminal + notify
/// counterpart" is classified here so it can be mapped to a protocol
/// reason code.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid inbound message: {0}")]
    InvalidInboundMessage(String),

    #[error("Extract not recognised for conversation_id: {conversation_id}")]
    ExtractNotRecognised { conversation_id: String },

    #[error("{what} not found: {id}")]
    NotFound { what: String, id: String },

    #[error("Transport connection error: {0}")]
    TransportConnection(String),

    #[error("Transport server error: {0}")]
    TransportServer(String),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Missing value for interaction {interaction} at {xpath}")]
    MissingValue { interaction: String, xpath: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Task processing error: {0}")]
    Unclassified(String),
}

impl CoreError {
    pub fn invalid_inbound_message(message: impl Into<String>) -> Self {
        Self::InvalidInboundMessage(message.into())
    }

    pub fn extract_not_recognised(conversation_id: impl Into<String>) -> Self {
        Self::ExtractNotRecognised {
            conversation_id: conversation_id.into(),
        }
    }

    pub fn not_found(what: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            what: what.into(),
            id: id.into(),
        }
    }

    pub fn invalid_transition(message: impl Into<String>) -> Self {
        Self::InvalidTransition(message.into())
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn unclassified(message: impl Into<String>) -> Self {
        Self::Unclassified(message.into())
    }

    /// Protocol reason code sent in a negative acknowledgement when a task
    /// failing with this error closes the conversation.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::InvalidInboundMessage(_) | Self::MissingValue { .. } => "18",
            Self::NotFound { .. } => "06",
            Self::TransportConnection(_) | Self::TransportServer(_) => "20",
            Self::InvalidArgument(_) => "10",
            Self::ExtractNotRecognised { .. }
            | Self::InvalidTransition(_)
            | Self::Json(_)
            | Self::Unclassified(_) => "99",
        }
    }

    /// Human readable detail paired with [`reason_code`](Self::reason_code).
    pub fn reason_detail(&self) -> &'static str {
        match self.reason_code() {
            "18" => "Request message not well-formed or not able to be processed",
            "06" => "Patient not at surgery",
            "20" => "Spine system responded with an error",
            "10" => "Failed to successfully generate EHR Extract",
            _ => "An error occurred when executing a task",
        }
    }

    /// Retryable errors rely on broker redelivery instead of closing the
    /// conversation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportConnection(_) | Self::TransportServer(_))
    }
}

/// Convenience result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
