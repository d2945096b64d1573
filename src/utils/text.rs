//! Text processing utilities.

/// True when `text` is empty or consists only of whitespace.
pub fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

/// Collapse runs of whitespace (arXiv abstracts are hard-wrapped) into single spaces.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First `max_chars` characters of `text`, with an ellipsis when truncated.
pub fn preview(text: &str, max_chars: usize) -> String {
    let collapsed = collapse_whitespace(text);
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let head: String = collapsed.chars().take(max_chars).collect();
    format!("{}...", head.trim_end())
}
