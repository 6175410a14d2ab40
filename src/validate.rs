//! Sequence Loader & Validator
//!
//! Turns an uploaded FASTA payload into normalized nucleotide sequences.
//!
//! # Checks (in order)
//! 1. Format: at least one header with a non-empty sequence
//! 2. Alphabet: only A/C/G/T/N, case-insensitive
//! 3. Quality: `N` fraction and minimum length gates from [`ValidatorConfig`]
//!
//! The loader is stateless; it never touches shared data.

use serde::Serialize;

use crate::config::ValidatorConfig;
use crate::error::{AnalysisError, Result};
use crate::seqio::{FastaReader, FastaRecord};

/// A record that passed every validation gate.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSequence {
    pub id: String,
    pub description: String,
    /// Uppercase nucleotides, A/C/G/T/N only.
    pub seq: Vec<u8>,
    pub ambiguous_fraction: f64,
}

impl ValidatedSequence {
    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    pub fn summary(&self) -> SequenceSummary {
        SequenceSummary {
            id: self.id.clone(),
            description: self.description.clone(),
            length: self.seq.len(),
        }
    }
}

/// Basic metadata echoed in analysis results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequenceSummary {
    pub id: String,
    pub description: String,
    pub length: usize,
}

/// Parses and validates every record of a FASTA payload.
pub fn load_sequences(payload: &[u8], config: &ValidatorConfig) -> Result<Vec<ValidatedSequence>> {
    if payload.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(AnalysisError::Format("input is empty".to_string()));
    }

    let records: Vec<FastaRecord> = FastaReader::from_bytes(payload)
        .collect::<anyhow::Result<Vec<_>>>()
        .map_err(|e| AnalysisError::Format(e.to_string()))?;

    if records.is_empty() {
        return Err(AnalysisError::Format("no FASTA header found".to_string()));
    }

    records
        .into_iter()
        .map(|record| validate_record(record, config))
        .collect()
}

/// Validates a single parsed record.
pub fn validate_record(record: FastaRecord, config: &ValidatorConfig) -> Result<ValidatedSequence> {
    if record.seq.is_empty() {
        return Err(AnalysisError::Format(format!(
            "record '{}' has no sequence",
            record.name
        )));
    }

    let seq = normalize_nucleotides(&record.seq)
        .map_err(|msg| AnalysisError::Alphabet(format!("record '{}': {}", record.name, msg)))?;

    if seq.len() < config.min_length {
        return Err(AnalysisError::LowQuality(format!(
            "record '{}' is {} bp, minimum is {} bp",
            record.name,
            seq.len(),
            config.min_length
        )));
    }

    let ambiguous_fraction = ambiguous_fraction(&seq);
    if ambiguous_fraction > config.max_ambiguous_fraction {
        return Err(AnalysisError::LowQuality(format!(
            "record '{}' has {:.2}% ambiguous bases, maximum is {:.2}%",
            record.name,
            ambiguous_fraction * 100.0,
            config.max_ambiguous_fraction * 100.0
        )));
    }

    Ok(ValidatedSequence {
        id: record.name,
        description: record.description,
        seq,
        ambiguous_fraction,
    })
}

/// Uppercases raw nucleotide bytes, rejecting anything outside A/C/G/T/N.
///
/// The error names the first offending byte and its 1-based position.
pub fn normalize_nucleotides(seq: &[u8]) -> std::result::Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(seq.len());
    for (i, &b) in seq.iter().enumerate() {
        match b.to_ascii_uppercase() {
            n @ (b'A' | b'C' | b'G' | b'T' | b'N') => out.push(n),
            other if other.is_ascii_graphic() => {
                return Err(format!(
                    "unexpected character '{}' at position {}",
                    other as char,
                    i + 1
                ))
            }
            other => return Err(format!("unexpected byte 0x{:02X} at position {}", other, i + 1)),
        }
    }
    Ok(out)
}

/// Fraction of `N` bases in an uppercase sequence.
pub fn ambiguous_fraction(seq: &[u8]) -> f64 {
    if seq.is_empty() {
        return 0.0;
    }
    let n_count = seq.iter().filter(|&&b| b == b'N').count();
    n_count as f64 / seq.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn small_config() -> ValidatorConfig {
        ValidatorConfig {
            max_ambiguous_fraction: 0.05,
            min_length: 20,
        }
    }

    #[test]
    fn test_valid_records_are_normalized() {
        let payload = b">q1 first\nacgtacgtac\nGTACGTACGT\n>q2\nACGTACGTACGTACGTACGTAC\n";
        let seqs = load_sequences(payload, &small_config()).unwrap();
        assert_eq!(seqs.len(), 2);
        assert_eq!(seqs[0].id, "q1");
        assert_eq!(seqs[0].description, "q1 first");
        assert_eq!(seqs[0].seq, b"ACGTACGTACGTACGTACGT".to_vec());
        assert_eq!(seqs[1].summary().length, 22);
    }

    #[test]
    fn test_format_errors() {
        let cfg = small_config();
        assert_eq!(load_sequences(b"", &cfg).unwrap_err().kind(), ErrorKind::FormatError);
        assert_eq!(load_sequences(b"  \n", &cfg).unwrap_err().kind(), ErrorKind::FormatError);
        assert_eq!(load_sequences(b"ACGT\n", &cfg).unwrap_err().kind(), ErrorKind::FormatError);
        assert_eq!(load_sequences(b">only_header\n", &cfg).unwrap_err().kind(), ErrorKind::FormatError);
    }

    #[test]
    fn test_alphabet_error() {
        let err = load_sequences(b">q\nACGTACGTACGTRCGTACGTACGT\n", &small_config()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlphabetError);
        assert!(err.to_string().contains("position 13"));
    }

    #[test]
    fn test_non_ascii_byte_is_alphabet_error() {
        let err = load_sequences(b">q\nACGTACGTAC\xFFGTACGTACGTACGT\n", &small_config()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlphabetError);
        assert!(err.to_string().contains("0xFF at position 11"), "{}", err);
    }

    #[test]
    fn test_low_quality_errors() {
        let cfg = small_config();
        let short = load_sequences(b">q\nACGT\n", &cfg).unwrap_err();
        assert_eq!(short.kind(), ErrorKind::LowQualityError);

        // 2 of 20 bases ambiguous = 10%
        let ambiguous = load_sequences(b">q\nNNACGTACGTACGTACGTAC\n", &cfg).unwrap_err();
        assert_eq!(ambiguous.kind(), ErrorKind::LowQualityError);

        // exactly 5% is accepted
        let ok = load_sequences(b">q\nNACGTACGTACGTACGTACG\n", &cfg).unwrap();
        assert!((ok[0].ambiguous_fraction - 0.05).abs() < 1e-12);
    }
}
