//! `@handle` extraction from comment content. A mention is an `@` followed
//! by at least one `[A-Za-z0-9_]` character; anything else ends the handle.

use std::collections::HashSet;

fn is_handle_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Scan `content` for mentions, returning handles in first-appearance order
/// with duplicates collapsed.
pub fn extract_mentions(content: &str) -> Vec<String> {
    let mut handles = Vec::new();
    let mut seen = HashSet::new();
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '@' {
            continue;
        }
        let mut handle = String::new();
        while let Some(&next) = chars.peek() {
            if !is_handle_char(next) {
                break;
            }
            handle.push(next);
            chars.next();
        }
        if !handle.is_empty() && seen.insert(handle.clone()) {
            handles.push(handle);
        }
    }
    handles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_in_order() {
        assert_eq!(
            extract_mentions("@bob @carol thoughts?"),
            vec!["bob".to_string(), "carol".to_string()]
        );
    }

    #[test]
    fn collapses_duplicates() {
        assert_eq!(extract_mentions("@bob and again @bob"), vec!["bob".to_string()]);
    }

    #[test]
    fn punctuation_ends_a_handle() {
        assert_eq!(
            extract_mentions("ping @ann_lee, then @bob!"),
            vec!["ann_lee".to_string(), "bob".to_string()]
        );
    }

    #[test]
    fn bare_at_signs_are_ignored() {
        assert!(extract_mentions("a @ b @@ c").is_empty());
        assert!(extract_mentions("no mentions here").is_empty());
    }

    #[test]
    fn handles_at_string_edges() {
        assert_eq!(extract_mentions("@start"), vec!["start".to_string()]);
        assert_eq!(extract_mentions("end @fin"), vec!["fin".to_string()]);
        assert!(extract_mentions("@").is_empty());
    }
}
