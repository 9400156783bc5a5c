//! Deterministic truncation of captured command output.

/// Appended after the kept prefix whenever output exceeds the cap.
pub const TRUNCATION_MARKER: &str = "\n[output truncated]";

/// Output after applying the character cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CappedOutput {
    pub text: String,
    pub truncated: bool,
}

/// Keep the first `cap` characters of `text`, appending [`TRUNCATION_MARKER`]
/// if anything was dropped. Counts `char`s, never splitting a code point.
pub fn cap_output(text: String, cap: usize) -> CappedOutput {
    match text.char_indices().nth(cap) {
        None => CappedOutput {
            text,
            truncated: false,
        },
        Some((cut, _)) => {
            let mut kept = text;
            kept.truncate(cut);
            kept.push_str(TRUNCATION_MARKER);
            CappedOutput {
                text: kept,
                truncated: true,
            }
        }
    }
}

/// Byte budget that guarantees at least `cap + 1` characters of a stream are
/// captured whenever the stream is longer than `cap` characters.
pub fn capture_budget_bytes(cap: usize) -> usize {
    cap.saturating_add(1).saturating_mul(4)
}
