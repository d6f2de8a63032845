//! Near-duplicate text detection.
//!
//! The matcher compares a piece of query text against stored documents of
//! the same type and reports those that are likely the same document.
//!
//! # Algorithm
//!
//! 1. Normalize the query ([`normalize`]). Queries shorter than
//!    `min_text_length` characters are too short to judge and return nothing.
//! 2. Ask the store for candidates whose content length is within
//!    `[length_ratio_min, length_ratio_max]` × the query length, newest first,
//!    at most `candidate_limit` rows.
//! 3. Score each candidate; the first rule that applies wins:
//!    - **exact**: identical normalized text → `1.0`
//!    - **fingerprint**: identical once whitespace is removed → `0.995`
//!    - **token_overlap**: both sides have at least `min_tokens` tokens, the
//!      length ratio is at least `token_length_ratio`, and the token-set
//!      coverage `|Q ∩ C| / min(|Q|, |C|)` is at least `coverage_threshold`
//!      → `min(0.99, coverage_weight × coverage + length_weight × ratio)`
//! 4. Sort by score (desc), then document id (desc); keep `match_limit`.

use std::collections::HashSet;

use crate::models::{DocumentType, DuplicateCandidate, MatchType};
use crate::normalize::{compact, normalize, token_set};
use crate::store::{CandidateQuery, Store};

pub const EXACT_SCORE: f64 = 1.0;
pub const FINGERPRINT_SCORE: f64 = 0.995;
pub const TOKEN_OVERLAP_CAP: f64 = 0.99;

pub const DEFAULT_CANDIDATE_LIMIT: usize = 280;
pub const DEFAULT_MATCH_LIMIT: usize = 8;
pub const CANDIDATE_LIMIT_RANGE: (usize, usize) = (50, 500);
pub const MATCH_LIMIT_RANGE: (usize, usize) = (1, 20);

/// Matching thresholds and weights, decoupled from application config.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateParams {
    pub min_text_length: usize,
    pub length_ratio_min: f64,
    pub length_ratio_max: f64,
    pub min_tokens: usize,
    pub token_length_ratio: f64,
    pub coverage_threshold: f64,
    pub coverage_weight: f64,
    pub length_weight: f64,
}

impl Default for DuplicateParams {
    fn default() -> Self {
        Self {
            min_text_length: 80,
            length_ratio_min: 0.55,
            length_ratio_max: 1.60,
            min_tokens: 12,
            token_length_ratio: 0.85,
            coverage_threshold: 0.92,
            coverage_weight: 0.85,
            length_weight: 0.15,
        }
    }
}

/// Bundles the inputs of a single duplicate check.
#[derive(Debug, Clone)]
pub struct DuplicateRequest<'a> {
    pub document_type: DocumentType,
    pub text: &'a str,
    /// The document being edited, which must not match itself.
    pub exclude_document_id: Option<i64>,
    pub candidate_limit: usize,
    pub match_limit: usize,
}

impl<'a> DuplicateRequest<'a> {
    pub fn new(document_type: DocumentType, text: &'a str) -> Self {
        Self {
            document_type,
            text,
            exclude_document_id: None,
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
            match_limit: DEFAULT_MATCH_LIMIT,
        }
    }
}

/// Normalized text with the derived forms the scorer compares.
#[derive(Debug, Clone)]
pub struct PreparedText {
    pub normalized: String,
    pub compact: String,
    pub tokens: HashSet<String>,
    /// Length of `normalized` in characters.
    pub length: usize,
}

impl PreparedText {
    pub fn new(raw: &str) -> Self {
        let normalized = normalize(raw);
        Self {
            compact: compact(&normalized),
            tokens: token_set(&normalized),
            length: normalized.chars().count(),
            normalized,
        }
    }
}

/// Score one candidate against the query, or `None` if it is not a
/// duplicate.
pub fn score_candidate(
    query: &PreparedText,
    candidate: &PreparedText,
    params: &DuplicateParams,
) -> Option<(f64, MatchType)> {
    if candidate.normalized.is_empty() {
        return None;
    }
    if candidate.normalized == query.normalized {
        return Some((EXACT_SCORE, MatchType::Exact));
    }
    if candidate.compact == query.compact {
        return Some((FINGERPRINT_SCORE, MatchType::Fingerprint));
    }

    if query.tokens.len() < params.min_tokens {
        return None;
    }
    let ratio = length_ratio(query.length, candidate.length);
    if ratio < params.token_length_ratio {
        return None;
    }
    if candidate.tokens.len() < params.min_tokens {
        return None;
    }

    let coverage = coverage(&query.tokens, &candidate.tokens);
    if coverage < params.coverage_threshold {
        return None;
    }
    let score = (params.coverage_weight * coverage + params.length_weight * ratio)
        .min(TOKEN_OVERLAP_CAP);
    Some((score, MatchType::TokenOverlap))
}

/// `min(a, b) / max(a, b)`, or 0 when either side is empty.
pub fn length_ratio(a: usize, b: usize) -> f64 {
    if a == 0 || b == 0 {
        return 0.0;
    }
    a.min(b) as f64 / a.max(b) as f64
}

/// Token-set coverage: intersection size over the smaller set's size.
pub fn coverage(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if small.is_empty() {
        return 0.0;
    }
    let shared = small.iter().filter(|t| large.contains(*t)).count();
    shared as f64 / small.len() as f64
}

/// Find stored documents that duplicate `req.text`.
///
/// Never fails: store errors are logged and produce an empty result, so a
/// broken duplicate check cannot block a save.
pub async fn find_duplicates<S: Store + ?Sized>(
    store: &S,
    req: &DuplicateRequest<'_>,
    params: &DuplicateParams,
) -> Vec<DuplicateCandidate> {
    let query = PreparedText::new(req.text);
    if query.length < params.min_text_length {
        tracing::debug!(
            length = query.length,
            min = params.min_text_length,
            "query text too short for duplicate check"
        );
        return Vec::new();
    }

    let candidate_limit = req
        .candidate_limit
        .clamp(CANDIDATE_LIMIT_RANGE.0, CANDIDATE_LIMIT_RANGE.1);
    let match_limit = req.match_limit.clamp(MATCH_LIMIT_RANGE.0, MATCH_LIMIT_RANGE.1);

    let candidate_query = CandidateQuery {
        document_type: req.document_type,
        min_length: (query.length as f64 * params.length_ratio_min).floor() as usize,
        max_length: (query.length as f64 * params.length_ratio_max).ceil() as usize,
        exclude_document_id: req.exclude_document_id,
        limit: candidate_limit,
    };

    let rows = match store.duplicate_candidates(&candidate_query).await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(
                document_type = %req.document_type,
                error = %e,
                "duplicate candidate query failed"
            );
            return Vec::new();
        }
    };

    let mut matches: Vec<DuplicateCandidate> = rows
        .iter()
        .filter(|row| Some(row.id) != req.exclude_document_id)
        .filter_map(|row| {
            let prepared = PreparedText::new(&row.content);
            score_candidate(&query, &prepared, params).map(|(score, match_type)| {
                DuplicateCandidate {
                    document_id: row.id,
                    title: row.title.clone(),
                    score,
                    match_type,
                }
            })
        })
        .collect();

    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.document_id.cmp(&a.document_id))
    });
    matches.truncate(match_limit);

    tracing::debug!(
        document_type = %req.document_type,
        candidates = rows.len(),
        matches = matches.len(),
        "duplicate check finished"
    );
    matches
}
