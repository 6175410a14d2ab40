//! Mutation Notation Module
//!
//! Amino-acid substitutions are written `gene:RefPosAlt`, e.g. `S:E484K`:
//! - `gene`: Gene name from the annotation table (e.g. "S", "ORF1ab")
//! - `Ref`: Reference amino acid (single letter)
//! - `Pos`: 1-based position in the translated gene
//! - `Alt`: Alternate amino acid (single letter, `*` for a stop gain)

use serde::Serialize;
use std::fmt;

use crate::codon::{is_amino_acid, STOP};

/// A parsed mutation notation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Notation {
    pub gene: String,
    pub ref_aa: char,
    pub position: usize,
    pub alt_aa: char,
}

impl Notation {
    /// Parses `gene:RefPosAlt`.
    ///
    /// # Examples
    /// ```
    /// use covar::mutation::Notation;
    ///
    /// let n = Notation::parse("S:E484K").unwrap();
    /// assert_eq!(n.gene, "S");
    /// assert_eq!(n.ref_aa, 'E');
    /// assert_eq!(n.position, 484);
    /// assert_eq!(n.alt_aa, 'K');
    /// ```
    pub fn parse(text: &str) -> Option<Notation> {
        let (gene, change) = text.trim().split_once(':')?;
        if gene.is_empty() || change.len() < 3 {
            return None;
        }

        let chars: Vec<char> = change.chars().collect();
        let ref_aa = chars[0].to_ascii_uppercase();
        let alt_aa = chars[chars.len() - 1].to_ascii_uppercase();
        if !is_amino_acid(ref_aa) || !(is_amino_acid(alt_aa) || alt_aa == STOP) {
            return None;
        }

        let pos_str: String = chars[1..chars.len() - 1].iter().collect();
        if !pos_str.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let position: usize = pos_str.parse().ok()?;
        if position == 0 {
            return None;
        }

        Some(Notation {
            gene: gene.to_string(),
            ref_aa,
            position,
            alt_aa,
        })
    }
}

impl fmt::Display for Notation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}{}{}", self.gene, self.ref_aa, self.position, self.alt_aa)
    }
}

/// An amino-acid substitution found in an analysed sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DetectedMutation {
    pub gene: String,
    pub position: usize,
    #[serde(rename = "ref_aa")]
    pub ref_aa: char,
    #[serde(rename = "alt_aa")]
    pub alt_aa: char,
    pub notation: String,
}

impl DetectedMutation {
    pub fn new(gene: &str, position: usize, ref_aa: char, alt_aa: char) -> Self {
        Self {
            gene: gene.to_string(),
            position,
            ref_aa,
            alt_aa,
            notation: format!("{}:{}{}{}", gene, ref_aa, position, alt_aa),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_notation() {
        let n = Notation::parse("S:N501Y").unwrap();
        assert_eq!(n.gene, "S");
        assert_eq!(n.position, 501);
        assert_eq!(n.to_string(), "S:N501Y");

        let n = Notation::parse("ORF8:Q27*").unwrap();
        assert_eq!(n.alt_aa, '*');

        let n = Notation::parse("ORF1ab:t1001i").unwrap();
        assert_eq!(n.to_string(), "ORF1ab:T1001I");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Notation::parse("E484K").is_none());
        assert!(Notation::parse(":E484K").is_none());
        assert!(Notation::parse("S:E0K").is_none());
        assert!(Notation::parse("S:484K").is_none());
        assert!(Notation::parse("S:E48+4K").is_none());
        assert!(Notation::parse("S:*484K").is_none());
        assert!(Notation::parse("S:EK").is_none());
    }

    #[test]
    fn test_detected_notation() {
        let m = DetectedMutation::new("S", 484, 'E', 'K');
        assert_eq!(m.notation, "S:E484K");
        assert_eq!(Notation::parse(&m.notation).unwrap().position, 484);
    }
}
