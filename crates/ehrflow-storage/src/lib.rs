//! Storage abstraction for the conversation state store.
//!
//! Defines the contract every backend must implement: keyed lookup plus a
//! family of stage-scoped conditional updates, each performed as an atomic
//! find-and-modify so that concurrent tasks updating sibling fields of the
//! same conversation never lose an update.

pub mod error;
pub mod traits;

pub use error::StorageError;
pub use traits::{AckOutcome, ConversationStore, ErrorOutcome};
