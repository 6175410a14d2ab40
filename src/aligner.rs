//! Anchor-Based Aligner
//!
//! Maps query positions onto reference coordinates without genome-wide
//! dynamic programming.
//!
//! # Method
//! 1. Cut the reference into non-overlapping seed windows of `seed_len` bp
//! 2. Find each seed in the query within `drift` bp of the position implied
//!    by the previous hit, allowing up to `max_seed_mismatches`
//! 3. Chain the hits into the longest co-linear, non-overlapping series
//! 4. Fill the gaps between chained anchors: equal-length gaps map 1:1
//!    (substitutions only), unequal gaps are extended from both flanks with
//!    an x-drop and the indel in the middle stays unaligned
//! 5. Extend the outermost anchors towards the sequence ends
//!
//! Coverage is the fraction of reference positions with a query position.

use log::debug;

use crate::config::AlignerConfig;
use crate::error::{AnalysisError, Result};

/// How many earlier hits a hit may chain back to.
const MAX_CHAIN_LOOKBACK: usize = 64;

const MATCH_SCORE: i32 = 1;
const MISMATCH_SCORE: i32 = -2;

// ============================================================================
// Data Structures
// ============================================================================

/// A seed window located in the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    /// Seed start in the reference (0-based).
    pub ref_start: usize,
    /// Matching start in the query (0-based).
    pub query_start: usize,
    pub len: usize,
    pub mismatches: usize,
}

impl Anchor {
    fn diagonal(&self) -> i64 {
        self.query_start as i64 - self.ref_start as i64
    }
}

/// Reference position -> query position, `None` where unaligned.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateMap {
    positions: Vec<Option<usize>>,
}

impl CoordinateMap {
    fn unaligned(ref_len: usize) -> Self {
        Self {
            positions: vec![None; ref_len],
        }
    }

    pub fn from_positions(positions: Vec<Option<usize>>) -> Self {
        Self { positions }
    }

    /// Query position aligned to the 0-based reference position.
    #[inline]
    pub fn query_pos(&self, ref_pos: usize) -> Option<usize> {
        self.positions.get(ref_pos).copied().flatten()
    }

    pub fn aligned_positions(&self) -> usize {
        self.positions.iter().filter(|p| p.is_some()).count()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    fn set_run(&mut self, ref_start: usize, query_start: usize, len: usize) {
        for t in 0..len {
            self.positions[ref_start + t] = Some(query_start + t);
        }
    }
}

#[derive(Debug, Clone)]
pub struct Alignment {
    pub map: CoordinateMap,
    /// Fraction of reference positions aligned (0-1).
    pub coverage: f64,
    pub seeds_total: usize,
    pub anchors: Vec<Anchor>,
}

impl Alignment {
    pub fn seed_fraction(&self) -> f64 {
        if self.seeds_total == 0 {
            return 0.0;
        }
        self.anchors.len() as f64 / self.seeds_total as f64
    }
}

// ============================================================================
// Alignment
// ============================================================================

/// Aligns an uppercase query to an uppercase reference.
///
/// # Errors
/// `AnalysisError::Alignment` when fewer than `min_seed_fraction` of the
/// seeds end up in the anchor chain.
pub fn align(reference: &[u8], query: &[u8], config: &AlignerConfig) -> Result<Alignment> {
    let w = config.seed_len;
    let seeds_total = reference.len() / w;
    if seeds_total == 0 {
        return Err(AnalysisError::Alignment(format!(
            "reference ({} bp) is shorter than one {} bp seed",
            reference.len(),
            w
        )));
    }

    let hits = find_seed_hits(reference, query, config);
    let anchors = chain_hits(&hits, config.drift);

    let seed_fraction = anchors.len() as f64 / seeds_total as f64;
    debug!(
        "Seeds: {} total, {} hits, {} chained ({:.1}%)",
        seeds_total,
        hits.len(),
        anchors.len(),
        seed_fraction * 100.0
    );

    if seed_fraction < config.min_seed_fraction {
        return Err(AnalysisError::Alignment(format!(
            "only {}/{} seeds anchored ({:.1}%, minimum {:.1}%); sequence too divergent or fragmented",
            anchors.len(),
            seeds_total,
            seed_fraction * 100.0,
            config.min_seed_fraction * 100.0
        )));
    }

    let map = build_map(reference, query, &anchors, config.xdrop);
    let coverage = map.aligned_positions() as f64 / reference.len() as f64;

    Ok(Alignment {
        map,
        coverage,
        seeds_total,
        anchors,
    })
}

/// Locates each reference seed window in the query.
///
/// The search is centred on the diagonal of the most recent hit.
fn find_seed_hits(reference: &[u8], query: &[u8], config: &AlignerConfig) -> Vec<Anchor> {
    let w = config.seed_len;
    let mut hits = Vec::new();
    if query.len() < w {
        return hits;
    }
    let last_start = query.len() - w;
    let mut diagonal: i64 = 0;

    for seed_idx in 0..reference.len() / w {
        let ref_start = seed_idx * w;
        let seed = &reference[ref_start..ref_start + w];
        if seed.contains(&b'N') {
            continue;
        }

        let expected = ref_start as i64 + diagonal;
        let lo = (expected - config.drift as i64).max(0);
        let hi = (expected + config.drift as i64).min(last_start as i64);
        if lo > hi {
            continue;
        }

        let mut best: Option<(usize, u64, usize)> = None;
        for q in lo as usize..=hi as usize {
            let limit = best.map(|b| b.0).unwrap_or(config.max_seed_mismatches);
            if let Some(mm) = count_mismatches(seed, &query[q..q + w], limit) {
                let distance = (q as i64 - expected).unsigned_abs();
                let better = match best {
                    None => true,
                    Some((bm, bd, _)) => mm < bm || (mm == bm && distance < bd),
                };
                if better {
                    best = Some((mm, distance, q));
                }
            }
        }

        if let Some((mismatches, _, query_start)) = best {
            let hit = Anchor {
                ref_start,
                query_start,
                len: w,
                mismatches,
            };
            diagonal = hit.diagonal();
            hits.push(hit);
        }
    }

    hits
}

/// Counts mismatches, giving up once `limit` is exceeded.
#[inline]
fn count_mismatches(a: &[u8], b: &[u8], limit: usize) -> Option<usize> {
    let mut mm = 0;
    for (x, y) in a.iter().zip(b) {
        if x != y || *y == b'N' {
            mm += 1;
            if mm > limit {
                return None;
            }
        }
    }
    Some(mm)
}

/// Selects the longest co-linear chain of non-overlapping hits.
///
/// Hits arrive in reference order. Chained hits must also advance in the
/// query by at least a full seed and stay within `drift` of each other's
/// diagonal.
fn chain_hits(hits: &[Anchor], drift: usize) -> Vec<Anchor> {
    if hits.is_empty() {
        return Vec::new();
    }

    let mut score = vec![1usize; hits.len()];
    let mut prev: Vec<Option<usize>> = vec![None; hits.len()];

    for i in 0..hits.len() {
        let lookback = i.saturating_sub(MAX_CHAIN_LOOKBACK);
        for j in (lookback..i).rev() {
            let compatible = hits[j].query_start + hits[j].len <= hits[i].query_start
                && (hits[i].diagonal() - hits[j].diagonal()).unsigned_abs() <= drift as u64;
            if compatible && score[j] + 1 > score[i] {
                score[i] = score[j] + 1;
                prev[i] = Some(j);
            }
        }
    }

    // Earliest end wins ties
    let mut end = 0;
    for i in 1..hits.len() {
        if score[i] > score[end] {
            end = i;
        }
    }

    let mut chain = Vec::with_capacity(score[end]);
    let mut cursor = Some(end);
    while let Some(i) = cursor {
        chain.push(hits[i]);
        cursor = prev[i];
    }
    chain.reverse();
    chain
}

fn build_map(reference: &[u8], query: &[u8], anchors: &[Anchor], xdrop: i32) -> CoordinateMap {
    let mut map = CoordinateMap::unaligned(reference.len());

    for anchor in anchors {
        map.set_run(anchor.ref_start, anchor.query_start, anchor.len);
    }

    for pair in anchors.windows(2) {
        let (left, right) = (pair[0], pair[1]);
        let ref_gap_start = left.ref_start + left.len;
        let query_gap_start = left.query_start + left.len;
        let ref_gap = right.ref_start - ref_gap_start;
        let query_gap = right.query_start - query_gap_start;

        if ref_gap == query_gap {
            map.set_run(ref_gap_start, query_gap_start, ref_gap);
            continue;
        }

        let limit = ref_gap.min(query_gap);
        let forward = extend(reference, query, ref_gap_start, query_gap_start, limit, true, xdrop);
        map.set_run(ref_gap_start, query_gap_start, forward);

        let backward = extend(
            reference,
            query,
            right.ref_start,
            right.query_start,
            limit - forward,
            false,
            xdrop,
        );
        map.set_run(right.ref_start - backward, right.query_start - backward, backward);
    }

    if let Some(first) = anchors.first() {
        let limit = first.ref_start.min(first.query_start);
        let back = extend(reference, query, first.ref_start, first.query_start, limit, false, xdrop);
        map.set_run(first.ref_start - back, first.query_start - back, back);
    }

    if let Some(last) = anchors.last() {
        let ref_end = last.ref_start + last.len;
        let query_end = last.query_start + last.len;
        let limit = (reference.len() - ref_end).min(query.len() - query_end);
        let fwd = extend(reference, query, ref_end, query_end, limit, true, xdrop);
        map.set_run(ref_end, query_end, fwd);
    }

    map
}

/// Ungapped x-drop extension.
///
/// Forward extension starts at (`ref_pos`, `query_pos`); backward extension
/// covers the bases just before them. Returns the extension length with the
/// best score. `N` scores zero.
fn extend(
    reference: &[u8],
    query: &[u8],
    ref_pos: usize,
    query_pos: usize,
    limit: usize,
    forward: bool,
    xdrop: i32,
) -> usize {
    let mut score = 0i32;
    let mut best = 0i32;
    let mut best_len = 0usize;

    for t in 0..limit {
        let (r, q) = if forward {
            (reference[ref_pos + t], query[query_pos + t])
        } else {
            (reference[ref_pos - 1 - t], query[query_pos - 1 - t])
        };

        score += if r == b'N' || q == b'N' {
            0
        } else if r == q {
            MATCH_SCORE
        } else {
            MISMATCH_SCORE
        };

        if score > best {
            best = score;
            best_len = t + 1;
        } else if best - score > xdrop {
            break;
        }
    }

    best_len
}
