//! Mutation Caller
//!
//! Walks every annotated gene codon by codon, translates the aligned query
//! codon and reports amino-acid differences against the reference protein.
//!
//! A codon is compared only when its three reference bases map to three
//! consecutive query bases and none of them is `N`. A query stop codon is
//! reported as `*` and ends the comparison for that gene.

use rayon::prelude::*;

use crate::aligner::CoordinateMap;
use crate::codon::{translate_codon, STOP};
use crate::mutation::DetectedMutation;
use crate::reference::{GeneAnnotation, ReferenceModel};

/// Calls amino-acid substitutions in every gene of the snapshot.
///
/// The result is ordered by (gene order, position) and holds no duplicates.
pub fn call_mutations(model: &ReferenceModel, map: &CoordinateMap, query: &[u8]) -> Vec<DetectedMutation> {
    let per_gene: Vec<Vec<DetectedMutation>> = model
        .genes()
        .par_iter()
        .enumerate()
        .map(|(idx, gene)| call_gene(gene, model.protein(idx), map, query))
        .collect();

    per_gene.into_iter().flatten().collect()
}

fn call_gene(gene: &GeneAnnotation, protein: &str, map: &CoordinateMap, query: &[u8]) -> Vec<DetectedMutation> {
    let mut found = Vec::new();
    let gene_start = gene.range().start;

    for (i, ref_aa) in protein.chars().enumerate() {
        if ref_aa == 'X' {
            continue;
        }
        let codon_start = gene_start + 3 * i;
        let Some(codon) = query_codon(map, query, codon_start) else {
            continue;
        };
        let Some(alt_aa) = translate_codon(codon) else {
            continue;
        };

        if alt_aa != ref_aa {
            found.push(DetectedMutation::new(&gene.name, i + 1, ref_aa, alt_aa));
        }
        if alt_aa == STOP {
            break;
        }
    }

    found
}

/// Query bases for the reference codon starting at `ref_pos`, if the codon
/// is aligned contiguously and unambiguous.
fn query_codon<'a>(map: &CoordinateMap, query: &'a [u8], ref_pos: usize) -> Option<&'a [u8]> {
    let q0 = map.query_pos(ref_pos)?;
    if map.query_pos(ref_pos + 1)? != q0 + 1 || map.query_pos(ref_pos + 2)? != q0 + 2 {
        return None;
    }
    let codon = query.get(q0..q0 + 3)?;
    if codon.contains(&b'N') {
        return None;
    }
    Some(codon)
}
