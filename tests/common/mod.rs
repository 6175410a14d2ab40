// Shared fixtures: a synthetic, deterministic reference genome paired with
// the rule table shipped in data/catalog.json.
//
// Layout (1-based, inclusive):
//   1..200      5' UTR
//   201..1400   ORF1a (399 aa + stop)
//   1401..1500  spacer
//   1501..3660  S     (719 aa + stop)
//   3661..3700  spacer
//   3701..4600  N     (299 aa + stop)
//   4601..4800  3' UTR

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::OnceLock;

use covar::codon::{translate_codon, STOP};
use covar::config::EngineConfig;
use covar::reference::{CatalogPayload, GeneAnnotation, ReferenceModel, ReferencePayload, VariantPayload};

pub const ACCESSION: &str = "SYNTH.1";
pub const GENOME_LEN: usize = 4800;

pub const GENES: &[(&str, usize, usize)] = &[("ORF1a", 201, 1400), ("S", 1501, 3660), ("N", 3701, 4600)];

/// Reference residues the catalog and rules refer to.
const FIXED_RESIDUES: &[(&str, usize, char)] = &[
    ("S", 19, 'T'), ("S", 67, 'A'), ("S", 80, 'D'), ("S", 95, 'T'), ("S", 142, 'G'),
    ("S", 215, 'D'), ("S", 339, 'G'), ("S", 371, 'S'), ("S", 373, 'S'), ("S", 375, 'S'),
    ("S", 417, 'K'), ("S", 440, 'N'), ("S", 446, 'G'), ("S", 452, 'L'), ("S", 477, 'S'),
    ("S", 478, 'T'), ("S", 484, 'E'), ("S", 493, 'Q'), ("S", 496, 'G'), ("S", 498, 'Q'),
    ("S", 501, 'N'), ("S", 505, 'Y'), ("S", 570, 'A'), ("S", 614, 'D'), ("S", 655, 'H'),
    ("S", 679, 'N'), ("S", 681, 'P'), ("S", 701, 'A'), ("N", 3, 'D'), ("N", 235, 'S'),
];

pub const OMICRON_RBD: &[&str] = &[
    "S:G339D", "S:S371L", "S:S373P", "S:S375F", "S:K417N", "S:N440K", "S:G446S", "S:S477N",
    "S:T478K", "S:E484A", "S:Q493R", "S:G496S", "S:Q498R", "S:N501Y", "S:Y505H",
];

const LINEAGES: &[(&str, &str, &str, &[&str])] = &[
    ("SYN-ALPHA", "B.1.1.7", "Alpha", &["S:N501Y", "S:A570D", "S:D614G", "S:P681H", "N:D3L", "N:S235F"]),
    ("SYN-BETA", "B.1.351", "Beta", &["S:D80A", "S:D215G", "S:K417N", "S:E484K", "S:N501Y", "S:D614G", "S:A701V"]),
    ("SYN-DELTA", "B.1.617.2", "Delta", &["S:T19R", "S:G142D", "S:L452R", "S:T478K", "S:D614G", "S:P681R"]),
    (
        "SYN-OMICRON",
        "B.1.1.529",
        "Omicron",
        &[
            "S:A67V", "S:T95I", "S:G142D", "S:G339D", "S:S371L", "S:S373P", "S:S375F", "S:K417N",
            "S:N440K", "S:G446S", "S:S477N", "S:T478K", "S:E484A", "S:Q493R", "S:G496S", "S:Q498R",
            "S:N501Y", "S:Y505H", "S:D614G", "S:H655Y", "S:N679K", "S:P681H",
        ],
    ),
];

struct XorShift(u64);

impl XorShift {
    fn next_base(&mut self) -> u8 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        b"ACGT"[(self.0 >> 33) as usize % 4]
    }

    fn sense_codon(&mut self) -> [u8; 3] {
        loop {
            let codon = [self.next_base(), self.next_base(), self.next_base()];
            if translate_codon(&codon) != Some(STOP) {
                return codon;
            }
        }
    }
}

/// One codon for each residue.
pub fn codon_for(aa: char) -> &'static [u8; 3] {
    match aa {
        'A' => b"GCT",
        'C' => b"TGT",
        'D' => b"GAT",
        'E' => b"GAA",
        'F' => b"TTT",
        'G' => b"GGT",
        'H' => b"CAT",
        'I' => b"ATT",
        'K' => b"AAA",
        'L' => b"CTG",
        'M' => b"ATG",
        'N' => b"AAT",
        'P' => b"CCT",
        'Q' => b"CAA",
        'R' => b"CGT",
        'S' => b"TCT",
        'T' => b"ACT",
        'V' => b"GTT",
        'W' => b"TGG",
        'Y' => b"TAT",
        '*' => b"TAA",
        other => panic!("no codon for {}", other),
    }
}

fn gene_start(gene: &str) -> usize {
    GENES
        .iter()
        .find(|(name, _, _)| *name == gene)
        .map(|(_, start, _)| *start)
        .unwrap_or_else(|| panic!("unknown gene {}", gene))
}

/// 0-based offset of the first base of codon `position` in `gene`.
pub fn codon_offset(gene: &str, position: usize) -> usize {
    gene_start(gene) - 1 + 3 * (position - 1)
}

pub fn reference_seq() -> &'static [u8] {
    static SEQ: OnceLock<Vec<u8>> = OnceLock::new();
    SEQ.get_or_init(|| {
        let mut rng = XorShift(0x9E37_79B9_7F4A_7C15);
        let mut seq: Vec<u8> = (0..GENOME_LEN).map(|_| rng.next_base()).collect();

        for &(_, start, end) in GENES {
            let first = start - 1;
            let last_codon = end - 3;
            seq[first..first + 3].copy_from_slice(b"ATG");
            let mut pos = first + 3;
            while pos < last_codon {
                seq[pos..pos + 3].copy_from_slice(&rng.sense_codon());
                pos += 3;
            }
            seq[last_codon..end].copy_from_slice(b"TAA");
        }

        for &(gene, position, aa) in FIXED_RESIDUES {
            let at = codon_offset(gene, position);
            seq[at..at + 3].copy_from_slice(codon_for(aa));
        }
        seq
    })
}

/// Reference with the given `gene:RefPosAlt` substitutions applied.
pub fn mutated(notations: &[&str]) -> Vec<u8> {
    let mut seq = reference_seq().to_vec();
    for text in notations {
        let (gene, change) = text.split_once(':').expect("gene:change");
        let alt = change.chars().last().expect("alt residue");
        let position: usize = change[1..change.len() - 1].parse().expect("position");
        let at = codon_offset(gene, position);
        seq[at..at + 3].copy_from_slice(codon_for(alt));
    }
    seq
}

pub fn fasta(name: &str, seq: &[u8]) -> Vec<u8> {
    let mut out = format!(">{} synthetic sample\n", name).into_bytes();
    for line in seq.chunks(70) {
        out.extend_from_slice(line);
        out.push(b'\n');
    }
    out
}

pub fn shipped_catalog_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data").join("catalog.json")
}

/// Synthetic genome and lineages with the shipped rule table.
pub fn payload() -> CatalogPayload {
    let text = std::fs::read_to_string(shipped_catalog_path()).expect("shipped catalog");
    let shipped: CatalogPayload = serde_json::from_str(&text).expect("shipped catalog parses");

    CatalogPayload {
        version: Some("synthetic-1".to_string()),
        reference: ReferencePayload {
            accession: ACCESSION.to_string(),
            sequence: Some(String::from_utf8(reference_seq().to_vec()).expect("ascii")),
            sequence_file: None,
            organism: Some("synthetic".to_string()),
        },
        genes: GENES
            .iter()
            .map(|&(name, start, end)| GeneAnnotation {
                name: name.to_string(),
                start,
                end,
                product: None,
            })
            .collect(),
        variants: LINEAGES
            .iter()
            .map(|&(accession, lineage, who, mutations)| VariantPayload {
                accession: accession.to_string(),
                lineage: lineage.to_string(),
                who_label: Some(who.to_string()),
                mutations: mutations.iter().map(|m| m.to_string()).collect(),
                collection_date: None,
                country: None,
            })
            .collect(),
        rules: shipped.rules,
    }
}

pub fn model() -> &'static ReferenceModel {
    static MODEL: OnceLock<ReferenceModel> = OnceLock::new();
    MODEL.get_or_init(|| {
        ReferenceModel::build(payload(), EngineConfig::default().matcher.kmer_size).expect("synthetic model")
    })
}

pub fn owned_model() -> ReferenceModel {
    ReferenceModel::build(payload(), EngineConfig::default().matcher.kmer_size).expect("synthetic model")
}
