//! Link and hashtag extraction.
//!
//! Enrichment is best-effort: it never fails, and a note that cannot be
//! scanned is indexed exactly as parsed.

use std::sync::LazyLock;

use regex::Regex;

use crate::document::VaultFile;

struct Patterns {
    wiki: Regex,
    markdown: Regex,
    hashtag: Regex,
}

static PATTERNS: LazyLock<Option<Patterns>> = LazyLock::new(|| {
    let compiled = (|| -> Result<Patterns, regex::Error> {
        Ok(Patterns {
            // [[target]], [[target#heading]], [[target|alias]]
            wiki: Regex::new(r"\[\[([^\]\|#]+)(?:#[^\]\|]*)?(?:\|[^\]]*)?\]\]")?,
            // [label](target "optional title")
            markdown: Regex::new(r#"\[([^\]]*)\]\(\s*([^)\s]+)(?:\s+"[^"]*")?\s*\)"#)?,
            hashtag: Regex::new(r"(?m)(?:^|[^\w&/#\]])#([\w-]+)")?,
        })
    })();
    match compiled {
        Ok(p) => Some(p),
        Err(e) => {
            tracing::warn!(error = %e, "link patterns failed to compile");
            None
        }
    }
});

/// Links and hashtags discovered in a note body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub links: Vec<String>,
    pub hashtags: Vec<String>,
}

/// Scan markdown for wiki links, markdown links and hashtags.
///
/// Returns `None` only when the patterns are unavailable.
pub fn extract(content: &str) -> Option<Extracted> {
    let patterns = PATTERNS.as_ref()?;
    let mut out = Extracted::default();

    for cap in patterns.wiki.captures_iter(content) {
        if let Some(target) = cap.get(1) {
            push_unique(&mut out.links, target.as_str().trim());
        }
    }

    for cap in patterns.markdown.captures_iter(content) {
        let (Some(whole), Some(target)) = (cap.get(0), cap.get(2)) else {
            continue;
        };
        // Image embeds are not links.
        if content[..whole.start()].ends_with('!') {
            continue;
        }
        push_unique(&mut out.links, target.as_str().trim());
    }

    for line in prose_lines(content) {
        for cap in patterns.hashtag.captures_iter(line) {
            let Some(tag) = cap.get(1) else { continue };
            let tag = tag.as_str();
            if tag.chars().all(|c| c.is_ascii_digit() || c == '-') {
                continue;
            }
            push_unique(&mut out.hashtags, tag);
        }
    }

    Some(out)
}

/// Enrich a note with its links and the union of frontmatter tags and
/// inline hashtags. Tags are compared case-sensitively.
pub fn enhance(mut file: VaultFile) -> VaultFile {
    let Some(found) = extract(&file.content) else {
        return file;
    };

    let mut links = file.links.clone();
    for link in found.links {
        push_unique(&mut links, &link);
    }
    let mut tags = file.tags.clone();
    for tag in found.hashtags {
        push_unique(&mut tags, &tag);
    }

    file.links = links;
    file.tags = tags;
    file
}

fn push_unique(list: &mut Vec<String>, item: &str) {
    if !item.is_empty() && !list.iter().any(|existing| existing == item) {
        list.push(item.to_string());
    }
}

/// Lines outside fenced code blocks.
fn prose_lines(content: &str) -> impl Iterator<Item = &str> {
    let mut in_fence = false;
    content.lines().filter(move |line| {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            return false;
        }
        !in_fence
    })
}
