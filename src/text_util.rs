/// Bytes of note content considered for scoring and snippets.
pub const CONTENT_PREFIX_BYTES: usize = 10 * 1024;

/// Default maximum characters in a snippet before truncation.
pub const DEFAULT_SNIPPET_LENGTH: usize = 200;

/// Maximum number of snippets extracted per note.
pub const MAX_SNIPPETS: usize = 3;

/// Longest prefix of `text` that fits in `max_bytes` without splitting a
/// character.
pub fn prefix_at_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Truncate to at most `max_chars` characters, appending `...` when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", text[..idx].trim_end()),
        None => text.to_string(),
    }
}

/// Split text into trimmed, non-empty sentences on `.`, `!`, `?` and line
/// breaks.
pub fn split_sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Remove markdown markup and control characters, collapsing whitespace.
pub fn strip_markdown(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '#' | '*' | '_' | '`' | '[' | ']' | '>' | '|' | '~' => ' ',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Pick up to [`MAX_SNIPPETS`] sentences from the start of `content` that
/// mention any of `tokens` (case-insensitive; tokens of two characters or
/// fewer are ignored).
///
/// Each snippet is cleaned of markdown and cut to `max_chars`.
pub fn extract_snippets(content: &str, tokens: &[String], max_chars: usize) -> Vec<String> {
    let needles: Vec<String> = tokens
        .iter()
        .filter(|t| t.chars().count() > 2)
        .map(|t| t.to_lowercase())
        .collect();
    if needles.is_empty() {
        return Vec::new();
    }

    let mut snippets = Vec::new();
    for sentence in split_sentences(prefix_at_boundary(content, CONTENT_PREFIX_BYTES)) {
        let lower = sentence.to_lowercase();
        if !needles.iter().any(|n| lower.contains(n.as_str())) {
            continue;
        }
        let cleaned = strip_markdown(sentence);
        if cleaned.is_empty() {
            continue;
        }
        snippets.push(truncate_chars(&cleaned, max_chars));
        if snippets.len() == MAX_SNIPPETS {
            break;
        }
    }
    snippets
}
