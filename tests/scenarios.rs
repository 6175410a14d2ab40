mod common;

use covar::config::EngineConfig;
use covar::engine::analyze;
use covar::error::ErrorKind;
use covar::reference::{ReferenceModel, Severity};
use proptest::prelude::*;

use common::*;

fn notations(result: &covar::engine::AnalysisResult) -> Vec<&str> {
    result.detected_mutations.iter().map(|m| m.notation.as_str()).collect()
}

fn rule_names(result: &covar::engine::AnalysisResult) -> Vec<&str> {
    result.satisfied_rules.iter().map(|r| r.name.as_str()).collect()
}

#[test]
fn shipped_catalog_rules_are_well_formed() {
    let model = model();
    assert_eq!(model.rules().len(), 7);
    assert!(model.rules().iter().any(|r| r.name == "Omicron RBD Signature" && r.mutations.len() == 15));
    assert!(model.is_high_severity("S:N501Y"));
    assert!(!model.is_high_severity("S:D614G"));
}

#[test]
fn scenario_a_reference_verbatim() {
    let result = analyze(model(), &EngineConfig::default(), &fasta("wuhan", reference_seq())).unwrap();

    assert!(result.detected_mutations.is_empty());
    assert!(result.satisfied_rules.is_empty());
    assert_eq!(result.aligned_coverage, 1.0);
    let lineage = result.identified_lineage.as_ref().unwrap();
    assert_eq!(lineage.accession, ACCESSION);
    assert!((result.confidence - 1.0).abs() < 1e-9);
    assert_eq!(result.query.length, GENOME_LEN);
}

#[test]
fn scenario_b_e484k() {
    let result = analyze(model(), &EngineConfig::default(), &fasta("e484k", &mutated(&["S:E484K"]))).unwrap();

    assert_eq!(notations(&result), vec!["S:E484K"]);
    let escape = result
        .satisfied_rules
        .iter()
        .find(|r| r.name == "E484K Immune Escape")
        .expect("E484K rule satisfied");
    assert_eq!(escape.severity, Severity::Medium);
    assert!(!rule_names(&result).contains(&"RBD Triple Mutation (Beta-like)"));
}

#[test]
fn scenario_c_too_many_ambiguous_bases() {
    let mut seq = reference_seq().to_vec();
    for base in &mut seq[1000..1300] {
        *base = b'N';
    }
    let err = analyze(model(), &EngineConfig::default(), &fasta("ambiguous", &seq)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LowQualityError);
}

#[test]
fn scenario_d_omicron_rbd() {
    let result = analyze(model(), &EngineConfig::default(), &fasta("omicron", &mutated(OMICRON_RBD))).unwrap();

    assert_eq!(notations(&result), OMICRON_RBD.to_vec());
    let omicron = result
        .satisfied_rules
        .iter()
        .find(|r| r.name == "Omicron RBD Signature")
        .expect("Omicron rule satisfied");
    assert_eq!(omicron.severity, Severity::High);
    assert!(rule_names(&result).contains(&"N501Y Enhanced Binding"));
    assert!(!rule_names(&result).contains(&"E484K Immune Escape"));

    let lineage = result.identified_lineage.as_ref().unwrap();
    assert_eq!(lineage.accession, "SYN-OMICRON");
    assert_eq!(lineage.who_label.as_deref(), Some("Omicron"));
    assert!(result.confidence > 0.3);
    assert_eq!(result.summary.who_label.as_deref(), Some("Omicron"));
    assert_eq!(result.summary.mutations_found, 15);
}

#[test]
fn full_lineage_signature_matches_exactly() {
    let beta = ["S:D80A", "S:D215G", "S:K417N", "S:E484K", "S:N501Y", "S:D614G", "S:A701V"];
    let result = analyze(model(), &EngineConfig::default(), &fasta("beta", &mutated(&beta))).unwrap();

    let lineage = result.identified_lineage.as_ref().unwrap();
    assert_eq!(lineage.lineage, "B.1.351");
    assert_eq!(lineage.similarity, 1.0);
    assert!(rule_names(&result).contains(&"RBD Triple Mutation (Beta-like)"));
    assert!(rule_names(&result).contains(&"D614G Transmission"));
}

#[test]
fn partial_signature_recovers_lineage() {
    let config = EngineConfig::default();

    // Fewer mutations than the window size
    let three = analyze(model(), &config, &fasta("three", &mutated(&["S:K417N", "S:E484K", "S:N501Y"]))).unwrap();
    let lineage = three.identified_lineage.as_ref().unwrap();
    assert_eq!(lineage.accession, "SYN-BETA");
    assert!((lineage.similarity - 3.0 / 7.0).abs() < 1e-9);

    // Shared mutations not contiguous in the catalog signature
    let four = analyze(
        model(),
        &config,
        &fasta("four", &mutated(&["S:K417N", "S:E484K", "S:N501Y", "S:A701V"])),
    )
    .unwrap();
    let lineage = four.identified_lineage.as_ref().unwrap();
    assert_eq!(lineage.accession, "SYN-BETA");
    assert!((lineage.similarity - 4.0 / 7.0).abs() < 1e-9);
    assert!((four.confidence - 4.0 / 7.0).abs() < 1e-9);
}

#[test]
fn stop_gain_in_gene() {
    let result = analyze(model(), &EngineConfig::default(), &fasta("stop", &mutated(&["N:S235*"]))).unwrap();
    assert_eq!(notations(&result), vec!["N:S235*"]);
}

#[test]
fn insertion_outside_genes_keeps_coordinates() {
    let mut seq = mutated(&["S:E484K", "N:D3L"]);
    seq.splice(1450..1450, b"GATTACA".iter().copied());
    let result = analyze(model(), &EngineConfig::default(), &fasta("insertion", &seq)).unwrap();

    assert_eq!(notations(&result), vec!["S:E484K", "N:D3L"]);
    assert!(result.aligned_coverage > 0.99);
}

#[test]
fn partial_genome_with_trimmed_ends() {
    let seq = mutated(&["S:N501Y"]);
    let trimmed = &seq[150..GENOME_LEN - 150];
    let result = analyze(model(), &EngineConfig::default(), &fasta("trimmed", trimmed)).unwrap();

    assert_eq!(notations(&result), vec!["S:N501Y"]);
    assert!((result.aligned_coverage - 4500.0 / 4800.0).abs() < 1e-9);
}

#[test]
fn unrelated_sequence_fails_alignment() {
    let mut state = 0xDEAD_BEEFu64;
    let seq: Vec<u8> = (0..GENOME_LEN)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            b"ACGT"[(state >> 33) as usize % 4]
        })
        .collect();
    let err = analyze(model(), &EngineConfig::default(), &fasta("unrelated", &seq)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlignmentError);
}

#[test]
fn format_and_alphabet_errors() {
    let config = EngineConfig::default();
    assert_eq!(analyze(model(), &config, b"").unwrap_err().kind(), ErrorKind::FormatError);
    assert_eq!(analyze(model(), &config, b"ACGT\n").unwrap_err().kind(), ErrorKind::FormatError);

    let mut seq = reference_seq().to_vec();
    seq[2000] = b'U';
    assert_eq!(
        analyze(model(), &config, &fasta("rna", &seq)).unwrap_err().kind(),
        ErrorKind::AlphabetError
    );

    seq[2000] = 0xFF;
    let err = analyze(model(), &config, &fasta("binary", &seq)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlphabetError);
    assert!(err.to_string().contains("position 2001"), "{}", err);
}

#[test]
fn no_confident_match_is_a_result() {
    // Mutations no catalog lineage carries
    let config = EngineConfig::default();
    let result = analyze(model(), &config, &fasta("novel", &mutated(&["S:S477N", "S:G496S", "N:D3L"]))).unwrap();
    assert!(result.identified_lineage.is_none());
    assert_eq!(result.confidence, 0.0);
    assert!(result.summary.identified_lineage.is_none());
    assert_eq!(result.detected_mutations.len(), 3);
}

#[test]
fn shipped_catalog_loads_with_separate_reference() {
    let dir = tempfile::tempdir().unwrap();
    let reference = dir.path().join("reference.fasta");
    std::fs::write(&reference, fasta("NC_045512.2", &vec![b'A'; 29903])).unwrap();

    // The shipped gene table fits a 29903 bp genome
    let model = ReferenceModel::from_json_file(shipped_catalog_path(), Some(&reference), 4).unwrap();
    assert_eq!(model.reference().accession, "NC_045512.2");
    assert_eq!(model.genes().len(), 12);
    assert_eq!(model.catalog_entries().len(), 6);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn repeated_runs_are_byte_identical(
        picks in prop::collection::btree_set(0usize..OMICRON_RBD.len(), 0..OMICRON_RBD.len())
    ) {
        let chosen: Vec<&str> = picks.iter().map(|&i| OMICRON_RBD[i]).collect();
        let payload = fasta("pick", &mutated(&chosen));
        let config = EngineConfig::default();

        let first = serde_json::to_string(&analyze(model(), &config, &payload).unwrap()).unwrap();
        let second = serde_json::to_string(&analyze(model(), &config, &payload).unwrap()).unwrap();
        prop_assert_eq!(&first, &second);

        let result = analyze(model(), &config, &payload).unwrap();
        prop_assert_eq!(notations(&result), chosen);
    }
}
