//! In-memory [`ConversationStore`] backend.
//!
//! Each operation takes the map's write lock for the duration of its
//! find-and-modify, which provides the per-conversation atomicity the store
//! contract requires. Suitable for tests and single-process deployments; a
//! document database with a TTL index replaces it in production.

mod store;

pub use store::InMemoryConversationStore;
