//! K-mer Lineage Matcher
//!
//! Catalog signatures are canonical, ordered lists of mutation notations.
//! A signature k-mer is a window of up to `k` consecutive notations; the
//! index maps the hash of each window to the catalog entries containing it,
//! so a query only scores entries that share at least one window with it.
//!
//! Windows of every length `1..=k` are posted. Any entry with a non-zero
//! Jaccard score shares at least one single-notation window with the query,
//! so short queries and queries whose shared mutations are interleaved with
//! private ones still reach every entry they overlap.
//!
//! # Scoring
//! - Similarity: Jaccard index over mutation sets (two empty sets score 1.0)
//! - Ties: more mutations shared with high-severity rules first, then the
//!   lexicographically smallest lineage label
//! - Confidence: similarity x aligned coverage, clamped to [0, 1]

use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use serde::Serialize;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use crate::config::MatcherConfig;
use crate::reference::{ReferenceModel, VariantCatalogEntry};

// ============================================================================
// Index
// ============================================================================

/// Inverted index: signature window hash -> catalog entry ids (ascending).
#[derive(Debug, Clone, Default)]
pub struct KmerIndex {
    k: usize,
    postings: FxHashMap<u64, Vec<usize>>,
}

impl KmerIndex {
    pub fn build(entries: &[VariantCatalogEntry], k: usize) -> Self {
        let k = k.max(1);
        let mut postings: FxHashMap<u64, Vec<usize>> = FxHashMap::default();

        for entry in entries {
            for hash in signature_kmers(&entry.signature, k) {
                let ids = postings.entry(hash).or_default();
                if ids.last() != Some(&entry.id) {
                    ids.push(entry.id);
                }
            }
        }

        Self { k, postings }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of distinct windows.
    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    /// Catalog entries sharing at least one window with `signature`.
    pub fn candidates(&self, signature: &[String]) -> Vec<usize> {
        let mut ids: Vec<usize> = signature_kmers(signature, self.k)
            .into_iter()
            .filter_map(|hash| self.postings.get(&hash))
            .flatten()
            .copied()
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// Hashes every window of 1 to `k` consecutive tokens.
///
/// Window length is capped at the signature length. The empty signature
/// maps to the hash of the empty window.
pub fn signature_kmers(signature: &[String], k: usize) -> Vec<u64> {
    if signature.is_empty() {
        return vec![kmer_hash(signature)];
    }
    (1..=k.min(signature.len()))
        .flat_map(|w| signature.windows(w).map(kmer_hash))
        .collect()
}

fn kmer_hash(window: &[String]) -> u64 {
    let mut hasher = FxHasher::default();
    window.hash(&mut hasher);
    hasher.finish()
}

// ============================================================================
// Matching
// ============================================================================

/// One scored catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineageMatch {
    pub accession: String,
    pub lineage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub who_label: Option<String>,
    pub similarity: f64,
    #[serde(skip)]
    high_severity_shared: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchOutcome {
    /// Best candidate, `None` when nothing reaches the similarity threshold.
    pub identified: Option<LineageMatch>,
    pub confidence: f64,
    /// Ranked candidates at or above the threshold.
    pub top_matches: Vec<LineageMatch>,
    pub candidates_considered: usize,
}

/// Ranks catalog lineages against a detected mutation set.
///
/// `detected` must be in canonical order (as produced by the mutation caller).
pub fn match_lineage(
    model: &ReferenceModel,
    detected: &[String],
    coverage: f64,
    config: &MatcherConfig,
) -> MatchOutcome {
    let candidate_ids = model.kmer_index().candidates(detected);
    let detected_set: FxHashSet<&str> = detected.iter().map(String::as_str).collect();
    let entries = model.catalog_entries();

    let mut scored: Vec<LineageMatch> = candidate_ids
        .par_iter()
        .map(|&id| score_entry(model, &entries[id], &detected_set))
        .filter(|m| m.similarity >= config.min_similarity)
        .collect();

    scored.sort_by(rank_order);

    let candidates_considered = candidate_ids.len();
    let identified = scored.first().cloned();
    let confidence = identified
        .as_ref()
        .map(|m| (m.similarity * coverage).clamp(0.0, 1.0))
        .unwrap_or(0.0);

    scored.truncate(config.top_matches);

    MatchOutcome {
        identified,
        confidence,
        top_matches: scored,
        candidates_considered,
    }
}

fn score_entry(
    model: &ReferenceModel,
    entry: &VariantCatalogEntry,
    detected: &FxHashSet<&str>,
) -> LineageMatch {
    let mut shared = 0usize;
    let mut high_severity_shared = 0usize;
    for token in &entry.signature {
        if detected.contains(token.as_str()) {
            shared += 1;
            if model.is_high_severity(token) {
                high_severity_shared += 1;
            }
        }
    }

    let union = detected.len() + entry.signature.len() - shared;
    let similarity = if union == 0 {
        1.0
    } else {
        shared as f64 / union as f64
    };

    LineageMatch {
        accession: entry.accession.clone(),
        lineage: entry.lineage.clone(),
        who_label: entry.who_label.clone(),
        similarity,
        high_severity_shared,
    }
}

fn rank_order(a: &LineageMatch, b: &LineageMatch) -> Ordering {
    b.similarity
        .partial_cmp(&a.similarity)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.high_severity_shared.cmp(&a.high_severity_shared))
        .then_with(|| a.lineage.cmp(&b.lineage))
        .then_with(|| a.accession.cmp(&b.accession))
}
