//! Standard genetic code.
//!
//! Codons are indexed in TCAG order, so the 64-residue string below is the
//! textbook codon wheel read row by row (TTT, TTC, TTA, TTG, TCT, ...).

/// Residues for all 64 codons in TCAG order. `*` marks stop codons.
const STANDARD_CODE: &[u8; 64] =
    b"FFLLSSSSYY**CC*WLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG";

pub const STOP: char = '*';

#[inline]
fn base_index(b: u8) -> Option<usize> {
    match b.to_ascii_uppercase() {
        b'T' => Some(0),
        b'C' => Some(1),
        b'A' => Some(2),
        b'G' => Some(3),
        _ => None,
    }
}

/// Translates a codon (3 nucleotides) to its amino acid.
///
/// Returns `None` for codons containing anything other than A/C/G/T
/// (ambiguous `N` included) or of the wrong length.
pub fn translate_codon(codon: &[u8]) -> Option<char> {
    if codon.len() != 3 {
        return None;
    }
    let idx = base_index(codon[0])? * 16 + base_index(codon[1])? * 4 + base_index(codon[2])?;
    Some(STANDARD_CODE[idx] as char)
}

/// Translates a coding sequence codon by codon, stopping before the first
/// stop codon. Trailing bases that do not form a full codon are ignored.
///
/// Untranslatable codons become `X`.
pub fn translate(cds: &[u8]) -> String {
    let mut protein = String::with_capacity(cds.len() / 3);
    for codon in cds.chunks_exact(3) {
        match translate_codon(codon) {
            Some(STOP) => break,
            Some(aa) => protein.push(aa),
            None => protein.push('X'),
        }
    }
    protein
}

/// Checks if a character is a valid amino acid single-letter code.
pub fn is_amino_acid(c: char) -> bool {
    matches!(c, 'A' | 'C' | 'D' | 'E' | 'F' | 'G' | 'H' | 'I' | 'K' | 'L' |
                'M' | 'N' | 'P' | 'Q' | 'R' | 'S' | 'T' | 'V' | 'W' | 'Y')
}
