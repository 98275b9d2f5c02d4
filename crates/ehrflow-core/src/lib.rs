pub mod conversation;
pub mod error;
pub mod id;
pub mod time;

pub use conversation::{
    AckError, AckPending, AckToRequester, ConversationState, CoreTaskReference, DocumentAccess,
    ReceivedAcknowledgement, SentToTransport, StructuredRecordAccess, TransferError,
    TransferRequest,
};
pub use error::{CoreError, Result};
pub use id::new_id;
pub use time::now_utc;
