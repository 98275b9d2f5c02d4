use time::OffsetDateTime;

/// Current UTC timestamp. All persisted timestamps go through this so tests
/// can reason about ordering.
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Formats a timestamp the way outbound payload templates expect (RFC 3339).
pub fn to_rfc3339(at: OffsetDateTime) -> String {
    at.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn formats_rfc3339() {
        let at = datetime!(2023-05-15 14:30:00 UTC);
        assert_eq!(to_rfc3339(at), "2023-05-15T14:30:00Z");
    }

    #[test]
    fn now_is_monotonic_enough() {
        let a = now_utc();
        let b = now_utc();
        assert!(b >= a);
    }
}
