//! Composite relevance scoring for retrieval candidates.
//!
//! A candidate's score is a weighted sum of normalized signals, each in
//! `[0, 1]`:
//!
//! - a flat bonus for being returned by the full-text index at all,
//! - a recency bonus that steps down at 7, 30 and 90 days,
//! - Jaccard similarity of the query words with the title, the start of the
//!   content and the tags,
//! - whether attendee names appear in the title or content.
//!
//! The sum is clamped to `[0, 1]` whatever the weights are.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    document::VaultFile,
    query::SearchQuery,
    text_util::{CONTENT_PREFIX_BYTES, prefix_at_boundary},
};

/// Weights of the relevance signals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelevanceWeights {
    pub title: f64,
    pub content: f64,
    pub tags: f64,
    pub attendees: f64,
    pub flex_search_bonus: f64,
    pub recency_bonus: f64,
}

impl Default for RelevanceWeights {
    fn default() -> Self {
        Self {
            title: 0.35,
            content: 0.2,
            tags: 0.15,
            attendees: 0.15,
            flex_search_bonus: 0.1,
            recency_bonus: 0.05,
        }
    }
}

impl RelevanceWeights {
    /// Negative and non-finite weights become zero.
    pub fn sanitized(&self) -> Self {
        let clean = |w: f64| if w.is_finite() && w > 0.0 { w } else { 0.0 };
        Self {
            title: clean(self.title),
            content: clean(self.content),
            tags: clean(self.tags),
            attendees: clean(self.attendees),
            flex_search_bonus: clean(self.flex_search_bonus),
            recency_bonus: clean(self.recency_bonus),
        }
    }
}

/// A note field that contributed to a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchedField {
    Title,
    Content,
    Tags,
}

impl std::fmt::Display for MatchedField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Title => "title",
            Self::Content => "content",
            Self::Tags => "tags",
        })
    }
}

/// Per-signal sub-scores and the clamped total.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBreakdown {
    pub title: f64,
    pub content: f64,
    pub tags: f64,
    pub attendees: f64,
    pub recency: f64,
    pub total: f64,
    pub matched_fields: Vec<MatchedField>,
}

/// Lowercased words longer than two characters, split on anything that is
/// not alphanumeric.
pub fn word_set(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2)
        .map(str::to_lowercase)
        .collect()
}

/// Intersection over union. Zero when both sets are empty.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Recency factor for a note dated `date`, as seen at `now`.
pub fn recency_factor(date: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    // Future dates count as fresh.
    let days = (now - date).num_days().max(0);
    match days {
        0..=7 => 1.0,
        8..=30 => 0.7,
        31..=90 => 0.4,
        _ => 0.0,
    }
}

/// Average over attendees of 1.0 for a name in the title, 0.5 for a name
/// only in the content, else 0. Also reports whether any name hit the
/// title. Both haystacks must already be lowercase.
pub fn attendee_score(names: &[String], title: &str, content: &str) -> (f64, bool) {
    let names: Vec<String> = names
        .iter()
        .map(|n| n.trim().to_lowercase())
        .filter(|n| n.chars().count() > 2)
        .collect();
    if names.is_empty() {
        return (0.0, false);
    }

    let mut sum = 0.0;
    let mut in_title = false;
    for name in &names {
        if title.contains(name.as_str()) {
            sum += 1.0;
            in_title = true;
        } else if content.contains(name.as_str()) {
            sum += 0.5;
        }
    }
    (sum / names.len() as f64, in_title)
}

/// Score a candidate note against the query.
pub fn score(
    file: &VaultFile,
    query: &SearchQuery,
    weights: &RelevanceWeights,
    now: DateTime<Utc>,
) -> ScoreBreakdown {
    let w = weights.sanitized();
    let query_words: HashSet<String> =
        query.tokens.iter().flat_map(|t| word_set(t)).collect();

    let content = prefix_at_boundary(&file.content, CONTENT_PREFIX_BYTES);
    let title_score = jaccard(&query_words, &word_set(&file.title));
    let content_score = jaccard(&query_words, &word_set(content));
    let tags_score = jaccard(&query_words, &word_set(&file.tags.join(" ")));
    let (attendee_score, attendee_in_title) = attendee_score(
        &query.attendee_names,
        &file.title.to_lowercase(),
        &content.to_lowercase(),
    );
    let recency = recency_factor(file.effective_date(), now);

    let raw = w.flex_search_bonus
        + w.recency_bonus * recency
        + w.title * title_score
        + w.content * content_score
        + w.tags * tags_score
        + w.attendees * attendee_score;
    let total = if raw.is_finite() { raw.clamp(0.0, 1.0) } else { 0.0 };

    let mut matched_fields = Vec::new();
    if title_score > 0.0 || attendee_in_title {
        matched_fields.push(MatchedField::Title);
    }
    if content_score > 0.0 {
        matched_fields.push(MatchedField::Content);
    }
    if tags_score > 0.0 {
        matched_fields.push(MatchedField::Tags);
    }

    ScoreBreakdown {
        title: title_score,
        content: content_score,
        tags: tags_score,
        attendees: attendee_score,
        recency,
        total,
        matched_fields,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::Duration;
    use proptest::prelude::*;

    use super::*;
    use crate::frontmatter::Frontmatter;

    fn file(title: &str, content: &str, tags: &[&str], modified: DateTime<Utc>) -> VaultFile {
        VaultFile {
            path: PathBuf::from(format!("/v/{title}.md")),
            title: title.to_string(),
            content: content.to_string(),
            frontmatter: Frontmatter::default(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            links: Vec::new(),
            created: modified,
            modified,
            size: content.len() as u64,
        }
    }

    fn query(tokens: &[&str], names: &[&str]) -> SearchQuery {
        SearchQuery {
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            attendee_names: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    #[test]
    fn jaccard_basics() {
        let a = word_set("acme kickoff notes");
        let b = word_set("Acme, kickoff!");
        assert!((jaccard(&a, &b) - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(jaccard(&HashSet::new(), &HashSet::new()), 0.0);
    }

    #[test]
    fn word_set_drops_short_words() {
        let words = word_set("a to the Q3 plan");
        assert_eq!(words, HashSet::from(["the".to_string(), "plan".to_string()]));
    }

    #[test]
    fn recency_bands() {
        let now = Utc::now();
        assert_eq!(recency_factor(now - Duration::days(2), now), 1.0);
        assert_eq!(recency_factor(now - Duration::days(7), now), 1.0);
        assert_eq!(recency_factor(now - Duration::days(20), now), 0.7);
        assert_eq!(recency_factor(now - Duration::days(60), now), 0.4);
        assert_eq!(recency_factor(now - Duration::days(200), now), 0.0);
        assert_eq!(recency_factor(now + Duration::days(5), now), 1.0);
    }

    #[test]
    fn attendee_in_title_beats_content() {
        let names = vec!["Jane Doe".to_string()];
        assert_eq!(attendee_score(&names, "1:1 jane doe", ""), (1.0, true));
        assert_eq!(attendee_score(&names, "sync", "met jane doe"), (0.5, false));
        assert_eq!(attendee_score(&names, "sync", "nobody"), (0.0, false));
        assert_eq!(attendee_score(&[], "jane doe", ""), (0.0, false));
    }

    #[test]
    fn matched_fields_reflect_hits() {
        let now = Utc::now();
        let f = file("Acme Kickoff", "unrelated body", &["acme", "kickoff"], now);
        let s = score(&f, &query(&["Acme", "Kickoff"], &[]), &RelevanceWeights::default(), now);
        assert_eq!(s.matched_fields, vec![MatchedField::Title, MatchedField::Tags]);
        assert_eq!(s.title, 1.0);
    }

    #[test]
    fn recent_file_outranks_old_twin() {
        let now = Utc::now();
        let fresh = file("Plan", "roadmap review", &[], now - Duration::days(2));
        let stale = file("Plan", "roadmap review", &[], now - Duration::days(200));
        let q = query(&["roadmap"], &[]);
        let w = RelevanceWeights::default();
        assert!(score(&fresh, &q, &w, now).total > score(&stale, &q, &w, now).total);
    }

    #[test]
    fn negative_weights_are_ignored() {
        let now = Utc::now();
        let f = file("Plan", "roadmap", &[], now);
        let w = RelevanceWeights {
            title: -5.0,
            content: f64::NAN,
            ..RelevanceWeights::default()
        };
        let s = score(&f, &query(&["plan", "roadmap"], &[]), &w, now);
        assert!(s.total >= 0.0);
        assert_eq!(w.sanitized().title, 0.0);
        assert_eq!(w.sanitized().content, 0.0);
    }

    #[test]
    fn oversized_weights_are_capped() {
        let now = Utc::now();
        let f = file("Plan", "plan", &["plan"], now);
        let w = RelevanceWeights {
            title: 10.0,
            content: 10.0,
            tags: 10.0,
            attendees: 10.0,
            flex_search_bonus: 10.0,
            recency_bonus: 10.0,
        };
        assert_eq!(score(&f, &query(&["plan"], &[]), &w, now).total, 1.0);
    }

    proptest! {
        #[test]
        fn score_is_bounded(
            title in "[a-zA-Z ]{0,40}",
            content in "[a-zA-Z .!]{0,400}",
            tokens in proptest::collection::vec("[a-zA-Z]{1,10}", 0..8),
            age_days in -30i64..1000,
            weight in -2.0f64..5.0,
        ) {
            let now = Utc::now();
            let f = file(&title, &content, &["tag"], now - Duration::days(age_days));
            let q = SearchQuery { tokens, attendee_names: vec![title.clone()] };
            let w = RelevanceWeights { title: weight, content: weight, ..RelevanceWeights::default() };
            let s = score(&f, &q, &w, now);
            prop_assert!((0.0..=1.0).contains(&s.total));
        }

        #[test]
        fn jaccard_is_a_ratio(a in "[a-z ]{0,60}", b in "[a-z ]{0,60}") {
            let j = jaccard(&word_set(&a), &word_set(&b));
            prop_assert!((0.0..=1.0).contains(&j));
        }
    }
}
