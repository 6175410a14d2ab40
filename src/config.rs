//! Engine Configuration
//!
//! Tunable thresholds for every pipeline stage. All values have defaults;
//! a JSON file may override any subset of keys, and the CLI layers its flags
//! on top of that.
//!
//! ```json
//! { "matcher": { "kmer_size": 3 }, "workers": 4 }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

// ============================================================================
// Stage Configurations
// ============================================================================

/// Input quality gates applied by the sequence validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Maximum tolerated fraction of `N` bases (0-1).
    pub max_ambiguous_fraction: f64,
    /// Minimum sequence length in bp.
    pub min_length: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_ambiguous_fraction: 0.05,
            min_length: 1000,
        }
    }
}

/// Anchor-based aligner parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignerConfig {
    /// Length of each non-overlapping reference seed window.
    pub seed_len: usize,
    /// Maximum query offset drift searched around the expected seed position.
    pub drift: usize,
    /// Mismatches tolerated for a near-exact seed hit.
    pub max_seed_mismatches: usize,
    /// Fraction of seeds that must anchor for the alignment to be usable.
    pub min_seed_fraction: f64,
    /// X-drop used when extending anchors across gaps and into the ends.
    pub xdrop: i32,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            seed_len: 50,
            drift: 200,
            max_seed_mismatches: 2,
            min_seed_fraction: 0.6,
            xdrop: 10,
        }
    }
}

/// Lineage matcher parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Number of mutation tokens per signature k-mer.
    pub kmer_size: usize,
    /// Candidates scoring below this Jaccard similarity are never reported.
    pub min_similarity: f64,
    /// Number of ranked candidates echoed in the result.
    pub top_matches: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            kmer_size: 4,
            min_similarity: 0.3,
            top_matches: 5,
        }
    }
}

// ============================================================================
// Engine Configuration
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub validator: ValidatorConfig,
    pub aligner: AlignerConfig,
    pub matcher: MatcherConfig,
    /// Worker threads; 0 selects the number of available cores.
    pub workers: usize,
}

impl EngineConfig {
    /// Reads a (possibly partial) JSON configuration file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
        let config: EngineConfig = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config JSON: {}", path.as_ref().display()))?;
        Ok(config)
    }

    /// Worker count with the 0 = all cores convention resolved.
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.workers
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        check_fraction("max_ambiguous_fraction", self.validator.max_ambiguous_fraction)?;
        check_fraction("min_seed_fraction", self.aligner.min_seed_fraction)?;
        check_fraction("min_similarity", self.matcher.min_similarity)?;

        if self.validator.min_length == 0 {
            return Err(ConfigError::Zero("min_length"));
        }
        if self.aligner.seed_len == 0 {
            return Err(ConfigError::Zero("seed_len"));
        }
        if self.aligner.xdrop <= 0 {
            return Err(ConfigError::Zero("xdrop"));
        }
        if self.matcher.kmer_size == 0 {
            return Err(ConfigError::Zero("kmer_size"));
        }
        if self.aligner.max_seed_mismatches >= self.aligner.seed_len {
            return Err(ConfigError::OutOfRange {
                field: "max_seed_mismatches",
                min: 0.0,
                max: (self.aligner.seed_len - 1) as f64,
                value: self.aligner.max_seed_mismatches as f64,
            });
        }
        if self.workers > num_cpus::get() * 4 {
            log::warn!(
                "Requested {} workers on {} cores; jobs are CPU bound",
                self.workers,
                num_cpus::get()
            );
        }
        Ok(())
    }
}

fn check_fraction(field: &'static str, value: f64) -> std::result::Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::OutOfRange {
            field,
            min: 0.0,
            max: 1.0,
            value,
        });
    }
    Ok(())
}
