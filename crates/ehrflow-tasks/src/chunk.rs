use ehrflow_core::{CoreError, Result};

/// Splits a payload into consecutive chunks of at most `size_threshold`
/// bytes, cutting only on UTF-8 character boundaries. Concatenating the
/// chunks reproduces the input byte-for-byte.
///
/// Thresholds of four bytes or less are rejected: a single character may
/// occupy four bytes, so such a threshold cannot guarantee progress.
pub fn chunk_payload(payload: &str, size_threshold: usize) -> Result<Vec<String>> {
    if size_threshold <= 4 {
        return Err(CoreError::invalid_argument(format!(
            "SizeThreshold must be larger 4 bytes to hold at least one UTF-16 character, but is {size_threshold}"
        )));
    }

    let mut chunks = Vec::new();
    let mut remaining = payload;
    while !remaining.is_empty() {
        let mut cut = size_threshold.min(remaining.len());
        while !remaining.is_char_boundary(cut) {
            cut -= 1;
        }
        let (chunk, rest) = remaining.split_at(cut);
        chunks.push(chunk.to_string());
        remaining = rest;
    }
    Ok(chunks)
}
