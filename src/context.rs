//! Meeting context retrieval.
//!
//! [`ContextRetriever::find_relevant_context`] turns a meeting into a query,
//! pulls candidates from the index, re-scores them with the composite
//! relevance score and returns the best matches with snippets. Retrieval is
//! best-effort: it never returns an error.

use std::{
    collections::HashSet,
    path::PathBuf,
    time::Instant,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    error::Result,
    indexer::{IndexHandle, ScoredFile},
    query::{self, SearchQuery},
    scoring::{self, MatchedField, RelevanceWeights},
    text_util::{self, DEFAULT_SNIPPET_LENGTH},
};

/// Individual tokens tried when the full query finds nothing.
const FALLBACK_TERMS: usize = 3;

/// Fallback searches stop once this many candidates are collected.
const FALLBACK_CANDIDATES: usize = 10;

/// A calendar event, as supplied by the calendar integration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Meeting {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    /// `Name <email>`, a bare email, or a bare name.
    pub attendees: Vec<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Tuning for retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub max_results: usize,
    pub min_relevance_score: f64,
    pub snippet_length: usize,
    pub weights: RelevanceWeights,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_results: 5,
            min_relevance_score: 0.2,
            snippet_length: DEFAULT_SNIPPET_LENGTH,
            weights: RelevanceWeights::default(),
        }
    }
}

/// A note judged relevant to a meeting. Refers to the note by path; read it
/// again through the vault manager for current content.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextMatch {
    pub path: PathBuf,
    pub title: String,
    pub relevance_score: f64,
    pub matched_fields: Vec<MatchedField>,
    pub snippets: Vec<String>,
    pub matched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextRetrievalResult {
    pub matches: Vec<ContextMatch>,
    /// Candidates that passed the score threshold, before truncation.
    pub total_matches: usize,
    pub search_time_ms: u64,
    pub retrieved_at: DateTime<Utc>,
}

impl ContextRetrievalResult {
    fn empty(started: Instant, retrieved_at: DateTime<Utc>) -> Self {
        Self {
            matches: Vec::new(),
            total_matches: 0,
            search_time_ms: elapsed_ms(started),
            retrieved_at,
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Finds vault notes relevant to a meeting. Reads the index only.
#[derive(Debug, Clone)]
pub struct ContextRetriever {
    index: IndexHandle,
    config: RetrievalConfig,
}

impl ContextRetriever {
    pub fn new(index: IndexHandle, config: RetrievalConfig) -> Self {
        Self { index, config }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Ranked notes relevant to `meeting`.
    ///
    /// Any failure along the way is logged and yields an empty result.
    pub fn find_relevant_context(&self, meeting: &Meeting) -> ContextRetrievalResult {
        let started = Instant::now();
        let now = Utc::now();

        match self.retrieve(meeting, now) {
            Ok((matches, total_matches)) => {
                debug!(
                    title = %meeting.title,
                    returned = matches.len(),
                    total = total_matches,
                    "context retrieved"
                );
                ContextRetrievalResult {
                    matches,
                    total_matches,
                    search_time_ms: elapsed_ms(started),
                    retrieved_at: now,
                }
            }
            Err(e) => {
                warn!(title = %meeting.title, error = %e, "context retrieval failed");
                ContextRetrievalResult::empty(started, now)
            }
        }
    }

    fn retrieve(
        &self,
        meeting: &Meeting,
        now: DateTime<Utc>,
    ) -> Result<(Vec<ContextMatch>, usize)> {
        let max_results = self.config.max_results;
        if max_results == 0 || !self.index.is_indexed()? {
            return Ok((Vec::new(), 0));
        }

        let query = query::build_query(meeting);
        if query.is_empty() {
            return Ok((Vec::new(), 0));
        }

        let candidates = self.candidates(&query, max_results.saturating_mul(2))?;

        let mut scored: Vec<_> = candidates
            .into_iter()
            .map(|c| {
                let breakdown =
                    scoring::score(&c.file, &query, &self.config.weights, now);
                (c.file, breakdown)
            })
            .filter(|(_, b)| b.total >= self.config.min_relevance_score)
            .collect();
        scored.sort_by(|a, b| b.1.total.total_cmp(&a.1.total));

        let total = scored.len();
        let matches = scored
            .into_iter()
            .take(max_results)
            .map(|(file, breakdown)| ContextMatch {
                snippets: text_util::extract_snippets(
                    &file.content,
                    &query.tokens,
                    self.config.snippet_length,
                ),
                path: file.path,
                title: file.title,
                relevance_score: breakdown.total,
                matched_fields: breakdown.matched_fields,
                matched_at: now,
            })
            .collect();

        Ok((matches, total))
    }

    /// Search with the whole query, widening to single tokens when that
    /// finds nothing.
    fn candidates(&self, query: &SearchQuery, limit: usize) -> Result<Vec<ScoredFile>> {
        let hits = self.index.search(&query.text(), limit)?;
        if !hits.is_empty() || query.tokens.len() < 2 {
            return Ok(hits);
        }

        debug!(tokens = query.tokens.len(), "widening search to single tokens");
        let mut seen = HashSet::new();
        let mut union = Vec::new();
        for token in query.tokens.iter().take(FALLBACK_TERMS) {
            for hit in self.index.search(token, limit)? {
                if seen.insert(hit.file.path.clone()) {
                    union.push(hit);
                }
            }
            if union.len() >= FALLBACK_CANDIDATES {
                break;
            }
        }
        Ok(union)
    }
}
