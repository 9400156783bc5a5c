//! Ledger invariants checked when a history is reloaded from disk.

use crate::core::types::HistoryEntry;

/// Check invariants the JSON shape alone cannot express:
/// - Event `index` values in each iteration are `0..n` in order
/// - No open iteration other than the tail entry
pub fn validate_history(entries: &[HistoryEntry]) -> Vec<String> {
    let mut errors = Vec::new();
    let last = entries.len().saturating_sub(1);

    for (position, entry) in entries.iter().enumerate() {
        let Some(iteration) = entry.as_iteration() else {
            continue;
        };

        for (expected, event) in iteration.events.iter().enumerate() {
            if event.index as usize != expected {
                errors.push(format!(
                    "entry {position}: event index {} at position {expected}",
                    event.index
                ));
            }
        }

        if iteration.is_open() && position != last {
            errors.push(format!(
                "entry {position}: open iteration is not the tail of history"
            ));
        }

        if iteration.commit_id.as_deref().is_some_and(str::is_empty) {
            errors.push(format!("entry {position}: empty commit_id"));
        }
    }

    errors
}
