//! Prompt fragments shared by every feature that calls the text model.

/// Instruction appended to every candidate-evaluation prompt.
pub const FAIRNESS_INSTRUCTION: &str = "\
    Evaluate only job-relevant evidence present in the provided material. \
    Ignore name, gender, age, ethnicity, nationality, disability and any other \
    protected characteristic. Do NOT infer facts that are not stated.";

/// Truncates prompt input to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("short", 100), "short");
    }
}
