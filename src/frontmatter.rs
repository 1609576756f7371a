//! Frontmatter splitting and typed access.
//!
//! A note may open with a YAML block fenced by `---` or a TOML block fenced
//! by `+++`. The block is parsed into an ordered, string-keyed map of JSON
//! values so that arbitrary user schemas survive untouched; the accessors on
//! [`Frontmatter`] look up the handful of keys the indexer cares about and
//! fall back quietly when a key is missing or oddly shaped.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Frontmatter keys consulted, in priority order, for a note's effective date.
pub const DATE_FIELDS: &[&str] =
    &["date", "created", "updated", "modified", "timestamp"];

const YAML_FENCE: &str = "---";
const YAML_END_ALT: &str = "...";
const TOML_FENCE: &str = "+++";

/// Parsed frontmatter, keys kept in document order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Frontmatter(Map<String, Value>);

impl Frontmatter {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Non-empty string value for `key`. Numbers are not coerced.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// The `title` key, falling back to `name`.
    pub fn title(&self) -> Option<&str> {
        self.get_str("title").or_else(|| self.get_str("name"))
    }

    /// Tags from the `tags` key (or `tag`), accepted either as a list or as
    /// a comma/space separated string. Leading `#` is stripped.
    pub fn tags(&self) -> Vec<String> {
        self.0
            .get("tags")
            .or_else(|| self.0.get("tag"))
            .map(string_list)
            .unwrap_or_default()
    }

    pub fn aliases(&self) -> Vec<String> {
        self.0
            .get("aliases")
            .or_else(|| self.0.get("alias"))
            .map(string_list)
            .unwrap_or_default()
    }

    /// First parseable value among [`DATE_FIELDS`].
    pub fn effective_date(&self) -> Option<DateTime<Utc>> {
        DATE_FIELDS
            .iter()
            .filter_map(|key| self.0.get(*key))
            .find_map(parse_date_value)
    }

    /// Flatten to `key value key value ...` for full-text indexing.
    pub fn to_search_text(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.0 {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(key);
            flatten_value(value, &mut out);
        }
        out
    }
}

fn flatten_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => {}
        Value::String(s) => {
            out.push(' ');
            out.push_str(s);
        }
        Value::Bool(b) => {
            out.push(' ');
            out.push_str(if *b { "true" } else { "false" });
        }
        Value::Number(n) => {
            out.push(' ');
            out.push_str(&n.to_string());
        }
        Value::Array(items) => {
            for item in items {
                flatten_value(item, out);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                out.push(' ');
                out.push_str(key);
                flatten_value(item, out);
            }
        }
    }
}

fn string_list(value: &Value) -> Vec<String> {
    let raw: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Value::String(s) if s.contains(',') => {
            s.split(',').map(str::to_string).collect()
        }
        Value::String(s) => s.split_whitespace().map(str::to_string).collect(),
        _ => Vec::new(),
    };

    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for item in raw {
        let cleaned = item.trim().trim_start_matches('#').trim();
        if !cleaned.is_empty() && !out.iter().any(|t| t == cleaned) {
            out.push(cleaned.to_string());
        }
    }
    out
}

/// Interpret a frontmatter value as a timestamp.
///
/// Accepts RFC 3339, `YYYY-MM-DD[ HH:MM[:SS]]`, `YYYY/MM/DD`, and integer
/// Unix timestamps in seconds or milliseconds.
pub fn parse_date_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_date_str(s.trim()),
        Value::Number(n) => {
            let raw = n.as_i64()?;
            if raw.abs() > 100_000_000_000 {
                DateTime::from_timestamp_millis(raw)
            } else {
                DateTime::from_timestamp(raw, 0)
            }
        }
        _ => None,
    }
}

fn parse_date_str(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|n| n.and_utc());
        }
    }
    if let Ok(raw) = s.parse::<i64>() {
        return parse_date_value(&Value::from(raw));
    }
    None
}

/// Split a raw note into frontmatter and body.
///
/// A note without a fence, or with an opening fence that is never closed,
/// has empty frontmatter and its whole text as the body. A closed block
/// that fails to parse is an error.
pub fn split(raw: &str) -> Result<(Frontmatter, &str), String> {
    let text = raw.strip_prefix('\u{feff}').unwrap_or(raw);

    let Some((first_line, rest)) = split_line(text) else {
        return Ok((Frontmatter::default(), text));
    };
    let fence = first_line.trim_end();
    let is_yaml = fence == YAML_FENCE;
    if !is_yaml && fence != TOML_FENCE {
        return Ok((Frontmatter::default(), text));
    }

    let mut offset = 0;
    let mut remaining = rest;
    while let Some((line, after)) = split_line(remaining) {
        let trimmed = line.trim_end();
        if trimmed == fence || (is_yaml && trimmed == YAML_END_ALT) {
            let block = &rest[..offset];
            let map = if is_yaml {
                parse_yaml(block)?
            } else {
                parse_toml(block)?
            };
            return Ok((Frontmatter::new(map), after));
        }
        offset += remaining.len() - after.len();
        remaining = after;
    }

    Ok((Frontmatter::default(), text))
}

/// Returns `(line, rest)` where `line` excludes the terminator.
fn split_line(text: &str) -> Option<(&str, &str)> {
    if text.is_empty() {
        return None;
    }
    match text.find('\n') {
        Some(idx) => {
            let line = &text[..idx];
            let line = line.strip_suffix('\r').unwrap_or(line);
            Some((line, &text[idx + 1..]))
        }
        None => Some((text, "")),
    }
}

fn parse_yaml(block: &str) -> Result<Map<String, Value>, String> {
    if block.trim().is_empty() {
        return Ok(Map::new());
    }
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(block).map_err(|e| e.to_string())?;
    match yaml {
        serde_yaml::Value::Null => Ok(Map::new()),
        serde_yaml::Value::Mapping(mapping) => {
            let mut map = Map::new();
            for (key, value) in mapping {
                let key = match key {
                    serde_yaml::Value::String(s) => s,
                    serde_yaml::Value::Number(n) => n.to_string(),
                    serde_yaml::Value::Bool(b) => b.to_string(),
                    _ => continue,
                };
                let value =
                    serde_json::to_value(&value).map_err(|e| e.to_string())?;
                map.insert(key, value);
            }
            Ok(map)
        }
        _ => Err("frontmatter is not a key/value mapping".to_string()),
    }
}

fn parse_toml(block: &str) -> Result<Map<String, Value>, String> {
    let table: toml::Table = toml::from_str(block).map_err(|e| e.to_string())?;
    Ok(table
        .into_iter()
        .map(|(key, value)| (key, toml_to_json(value)))
        .collect())
}

fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => Value::from(f),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => {
            Value::Array(items.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(key, value)| (key, toml_to_json(value)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};

    use super::*;

    #[test]
    fn no_frontmatter() {
        let (fm, body) = split("# Title\n\nBody").unwrap();
        assert!(fm.is_empty());
        assert_eq!(body, "# Title\n\nBody");
    }

    #[test]
    fn yaml_frontmatter_is_stripped() {
        let raw = "---\ntitle: Acme Kickoff\ntags: [acme, kickoff]\n---\nBody text\n";
        let (fm, body) = split(raw).unwrap();
        assert_eq!(fm.title(), Some("Acme Kickoff"));
        assert_eq!(fm.tags(), vec!["acme", "kickoff"]);
        assert_eq!(body, "Body text\n");
    }

    #[test]
    fn keys_keep_document_order() {
        let raw = "---\nzeta: 1\nalpha: 2\nmid: 3\n---\n";
        let (fm, _) = split(raw).unwrap();
        let keys: Vec<_> = fm.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn crlf_line_endings() {
        let raw = "---\r\ntitle: Windows\r\n---\r\nBody";
        let (fm, body) = split(raw).unwrap();
        assert_eq!(fm.title(), Some("Windows"));
        assert_eq!(body, "Body");
    }

    #[test]
    fn toml_frontmatter() {
        let raw = "+++\ntitle = \"Planning\"\ntags = [\"q3\", \"roadmap\"]\ndate = 2024-03-01\n+++\nBody";
        let (fm, body) = split(raw).unwrap();
        assert_eq!(fm.title(), Some("Planning"));
        assert_eq!(fm.tags(), vec!["q3", "roadmap"]);
        let date = fm.effective_date().unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2024, 3, 1));
        assert_eq!(body, "Body");
    }

    #[test]
    fn unterminated_fence_is_body() {
        let raw = "---\ntitle: never closed\nstill going";
        let (fm, body) = split(raw).unwrap();
        assert!(fm.is_empty());
        assert_eq!(body, raw);
    }

    #[test]
    fn malformed_yaml_is_error() {
        let raw = "---\ntitle: [unclosed\n---\nBody";
        assert!(split(raw).is_err());
    }

    #[test]
    fn scalar_yaml_is_error() {
        let raw = "---\njust a string\n---\nBody";
        assert!(split(raw).is_err());
    }

    #[test]
    fn empty_block_is_empty_map() {
        let (fm, body) = split("---\n---\nBody").unwrap();
        assert!(fm.is_empty());
        assert_eq!(body, "Body");
    }

    #[test]
    fn name_is_title_fallback() {
        let (fm, _) = split("---\nname: Jane's notes\n---\n").unwrap();
        assert_eq!(fm.title(), Some("Jane's notes"));
    }

    #[test]
    fn comma_separated_tags() {
        let (fm, _) = split("---\ntags: \"#alpha, beta ,alpha\"\n---\n").unwrap();
        assert_eq!(fm.tags(), vec!["alpha", "beta"]);
    }

    #[test]
    fn space_separated_tags() {
        let (fm, _) = split("---\ntags: \"#one #two\"\n---\n").unwrap();
        assert_eq!(fm.tags(), vec!["one", "two"]);
    }

    #[test]
    fn date_field_priority() {
        let raw = "---\nupdated: 2024-05-05\ndate: 2023-01-02\n---\n";
        let (fm, _) = split(raw).unwrap();
        let date = fm.effective_date().unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2023, 1, 2));
    }

    #[test]
    fn unparseable_date_falls_through() {
        let raw = "---\ndate: sometime soon\ncreated: 2022-07-08 09:10\n---\n";
        let (fm, _) = split(raw).unwrap();
        let date = fm.effective_date().unwrap();
        assert_eq!((date.year(), date.month(), date.hour()), (2022, 7, 9));
    }

    #[test]
    fn numeric_timestamps() {
        let secs = parse_date_value(&Value::from(1_700_000_000_i64)).unwrap();
        let millis =
            parse_date_value(&Value::from(1_700_000_000_000_i64)).unwrap();
        assert_eq!(secs, millis);
    }

    #[test]
    fn search_text_flattens_values() {
        let raw = "---\nproject: Apollo\nowners: [jane, raj]\n---\n";
        let (fm, _) = split(raw).unwrap();
        assert_eq!(fm.to_search_text(), "project Apollo owners jane raj");
    }
}
