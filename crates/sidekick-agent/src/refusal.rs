//! Capability-refusal detection.
//!
//! Models sometimes claim they cannot touch files or run commands even
//! though the session grants exactly those tools. A turn matching one
//! of the configured phrases is corrected instead of dispatched, and
//! the check runs before tool-call parsing so a refusal wrapped around
//! a half-hearted call is still caught.

/// Case-insensitive substring scan over the configured phrase list.
pub fn is_refusal(text: &str, phrases: &[String]) -> bool {
    let lowered = text.to_lowercase();
    phrases
        .iter()
        .filter(|p| !p.is_empty())
        .any(|p| lowered.contains(&p.to_lowercase()))
}
