use uuid::Uuid;

/// Generates a random identifier for conversations, tasks and outbound
/// message ids. UUIDv4, lowercase hyphenated.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
