//! Reference Model
//!
//! One immutable snapshot of everything an analysis reads: the reference
//! genome, its gene annotations, the variant lineage catalog, the
//! concerning-mutation rules and the signature k-mer index derived from the
//! catalog.
//!
//! A snapshot is validated completely when it is built and is never mutated
//! afterwards. Reloading builds a new snapshot; jobs keep the `Arc` they
//! started with, so an index is always paired with the catalog it came from.
//!
//! # Catalog Payload
//! ```text
//! {
//!   "version": "...",
//!   "reference": {"accession", "sequence" | "sequence_file", "organism"},
//!   "genes":     [{"name", "start", "end", "product"}],     1-based inclusive
//!   "variants":  [{"accession", "lineage", "who_label", "mutations": ["S:E484K"], ...}],
//!   "rules":     [{"name", "mutations", "severity", "description", "reference_url"}]
//! }
//! ```

use log::{info, warn};
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::codon;
use crate::error::CatalogError;
use crate::kmer_index::KmerIndex;
use crate::mutation::Notation;
use crate::seqio;
use crate::validate::normalize_nucleotides;

type Result<T> = std::result::Result<T, CatalogError>;

fn invalid<T>(msg: String) -> Result<T> {
    Err(CatalogError::Invalid(msg))
}

// ============================================================================
// Payload Records
// ============================================================================

/// Coding region of one gene, 1-based inclusive coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneAnnotation {
    pub name: String,
    pub start: usize,
    pub end: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
}

impl GeneAnnotation {
    /// 0-based half-open nucleotide range.
    pub fn range(&self) -> std::ops::Range<usize> {
        (self.start - 1)..self.end
    }

    pub fn len(&self) -> usize {
        self.end + 1 - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReferencePayload {
    pub accession: String,
    #[serde(default)]
    pub sequence: Option<String>,
    #[serde(default)]
    pub sequence_file: Option<PathBuf>,
    #[serde(default)]
    pub organism: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VariantPayload {
    pub accession: String,
    pub lineage: String,
    #[serde(default)]
    pub who_label: Option<String>,
    #[serde(default)]
    pub mutations: Vec<String>,
    #[serde(default)]
    pub collection_date: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RulePayload {
    pub name: String,
    pub mutations: Vec<String>,
    pub severity: Severity,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub reference_url: Option<String>,
}

/// Raw catalog document as supplied by the provisioning side.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogPayload {
    #[serde(default)]
    pub version: Option<String>,
    pub reference: ReferencePayload,
    pub genes: Vec<GeneAnnotation>,
    #[serde(default)]
    pub variants: Vec<VariantPayload>,
    #[serde(default)]
    pub rules: Vec<RulePayload>,
}

// ============================================================================
// Validated Records
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceGenome {
    pub accession: String,
    pub organism: Option<String>,
    /// Uppercase nucleotides.
    pub seq: Vec<u8>,
}

impl ReferenceGenome {
    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }
}

/// A catalogued lineage with its canonical mutation signature.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantCatalogEntry {
    /// Position in the catalog; the id stored in the k-mer index.
    pub id: usize,
    pub accession: String,
    pub lineage: String,
    pub who_label: Option<String>,
    /// Notations in canonical order (gene order, position, alternate).
    pub signature: Vec<String>,
    pub collection_date: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MutationRule {
    pub name: String,
    /// Required notations in canonical order; all must be present.
    pub mutations: Vec<String>,
    pub severity: Severity,
    pub description: String,
    pub reference_url: Option<String>,
}

// ============================================================================
// Reference Model
// ============================================================================

pub struct ReferenceModel {
    version: String,
    reference: ReferenceGenome,
    genes: Vec<GeneAnnotation>,
    gene_order: FxHashMap<String, usize>,
    /// Reference translation of each gene, truncated before the first stop.
    proteins: Vec<String>,
    catalog: Vec<VariantCatalogEntry>,
    rules: Vec<MutationRule>,
    high_severity: FxHashSet<String>,
    kmer_index: KmerIndex,
}

impl std::fmt::Debug for ReferenceModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceModel")
            .field("version", &self.version)
            .field("accession", &self.reference.accession)
            .field("length", &self.reference.len())
            .field("genes", &self.genes.len())
            .field("catalog", &self.catalog.len())
            .field("rules", &self.rules.len())
            .finish()
    }
}

impl ReferenceModel {
    /// Loads a catalog JSON file.
    ///
    /// `reference_fasta`, when given, supplies the reference sequence and
    /// takes precedence over anything named in the payload. A relative
    /// `sequence_file` resolves against the catalog's directory.
    pub fn from_json_file<P: AsRef<Path>>(
        path: P,
        reference_fasta: Option<&Path>,
        kmer_size: usize,
    ) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut payload: CatalogPayload = serde_json::from_str(&text)?;

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let fasta = match reference_fasta {
            Some(p) => Some(p.to_path_buf()),
            None if payload.reference.sequence.is_none() => payload
                .reference
                .sequence_file
                .as_ref()
                .map(|f| if f.is_absolute() { f.clone() } else { base_dir.join(f) }),
            None => None,
        };

        if let Some(fasta_path) = fasta {
            payload.reference.sequence = Some(read_reference_fasta(&fasta_path)?);
        }

        Self::build(payload, kmer_size)
    }

    /// Validates a payload and builds the snapshot with its k-mer index.
    pub fn build(payload: CatalogPayload, kmer_size: usize) -> Result<Self> {
        let CatalogPayload {
            version,
            reference,
            genes,
            variants,
            rules,
        } = payload;

        let reference = build_reference(reference)?;
        let gene_order = validate_genes(&genes, reference.len())?;

        let proteins: Vec<String> = genes
            .par_iter()
            .map(|g| codon::translate(&reference.seq[g.range()]))
            .collect();

        let ctx = NotationContext {
            genes: &genes,
            gene_order: &gene_order,
            proteins: &proteins,
        };

        let mut catalog = Vec::with_capacity(variants.len() + 1);
        let mut seen_accessions = FxHashSet::default();
        for variant in variants {
            if variant.accession.trim().is_empty() || variant.lineage.trim().is_empty() {
                return invalid("variant entries need a non-empty accession and lineage".to_string());
            }
            if !seen_accessions.insert(variant.accession.clone()) {
                return invalid(format!("duplicate variant accession '{}'", variant.accession));
            }
            let signature = ctx.canonicalize(&variant.mutations, &variant.accession)?;
            catalog.push(VariantCatalogEntry {
                id: catalog.len(),
                accession: variant.accession,
                lineage: variant.lineage,
                who_label: variant.who_label,
                signature,
                collection_date: variant.collection_date,
                country: variant.country,
            });
        }

        if !seen_accessions.contains(&reference.accession) {
            catalog.push(VariantCatalogEntry {
                id: catalog.len(),
                accession: reference.accession.clone(),
                lineage: reference.accession.clone(),
                who_label: None,
                signature: Vec::new(),
                collection_date: None,
                country: None,
            });
        }

        let mut validated_rules = Vec::with_capacity(rules.len());
        let mut seen_rules = FxHashSet::default();
        for rule in rules {
            if rule.name.trim().is_empty() {
                return invalid("rule names must be non-empty".to_string());
            }
            if !seen_rules.insert(rule.name.clone()) {
                return invalid(format!("duplicate rule '{}'", rule.name));
            }
            if rule.mutations.is_empty() {
                return invalid(format!("rule '{}' requires no mutations", rule.name));
            }
            let mutations = ctx.canonicalize(&rule.mutations, &rule.name)?;
            validated_rules.push(MutationRule {
                name: rule.name,
                mutations,
                severity: rule.severity,
                description: rule.description,
                reference_url: rule.reference_url,
            });
        }

        let high_severity: FxHashSet<String> = validated_rules
            .iter()
            .filter(|r| r.severity == Severity::High)
            .flat_map(|r| r.mutations.iter().cloned())
            .collect();

        let kmer_index = KmerIndex::build(&catalog, kmer_size);

        if catalog.len() == 1 {
            warn!("Variant catalog holds only the reference entry");
        }

        let version = version.unwrap_or_else(|| reference.accession.clone());
        info!(
            "Loaded reference snapshot {}: {} ({} bp), {} genes, {} lineages, {} rules, {} k-mers",
            version,
            reference.accession,
            reference.len(),
            genes.len(),
            catalog.len(),
            validated_rules.len(),
            kmer_index.len()
        );

        Ok(Self {
            version,
            reference,
            genes,
            gene_order,
            proteins,
            catalog,
            rules: validated_rules,
            high_severity,
            kmer_index,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn reference(&self) -> &ReferenceGenome {
        &self.reference
    }

    pub fn genes(&self) -> &[GeneAnnotation] {
        &self.genes
    }

    pub fn catalog_entries(&self) -> &[VariantCatalogEntry] {
        &self.catalog
    }

    pub fn rules(&self) -> &[MutationRule] {
        &self.rules
    }

    pub fn kmer_index(&self) -> &KmerIndex {
        &self.kmer_index
    }

    /// Reference protein of the gene at `idx` in annotation order.
    pub fn protein(&self, idx: usize) -> &str {
        &self.proteins[idx]
    }

    pub fn gene_index(&self, name: &str) -> Option<usize> {
        self.gene_order.get(name).copied()
    }

    /// True if the notation is required by any high-severity rule.
    pub fn is_high_severity(&self, notation: &str) -> bool {
        self.high_severity.contains(notation)
    }
}

// ============================================================================
// Validation Helpers
// ============================================================================

fn read_reference_fasta(path: &Path) -> Result<String> {
    let records = seqio::read_fasta_file(path).map_err(|e| CatalogError::Invalid(format!("{:#}", e)))?;
    match records.into_iter().next() {
        Some(record) => Ok(String::from_utf8_lossy(&record.seq).into_owned()),
        None => invalid(format!("reference FASTA {} holds no records", path.display())),
    }
}

fn build_reference(payload: ReferencePayload) -> Result<ReferenceGenome> {
    if payload.accession.trim().is_empty() {
        return invalid("reference accession is empty".to_string());
    }
    let raw = match payload.sequence {
        Some(s) => s,
        None => return invalid(format!("no sequence supplied for reference {}", payload.accession)),
    };
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let seq = normalize_nucleotides(compact.as_bytes())
        .map_err(|msg| CatalogError::Invalid(format!("reference {}: {}", payload.accession, msg)))?;
    if seq.is_empty() {
        return invalid(format!("reference {} has an empty sequence", payload.accession));
    }
    Ok(ReferenceGenome {
        accession: payload.accession,
        organism: payload.organism,
        seq,
    })
}

fn validate_genes(genes: &[GeneAnnotation], ref_len: usize) -> Result<FxHashMap<String, usize>> {
    if genes.is_empty() {
        return invalid("gene annotation table is empty".to_string());
    }
    let mut order = FxHashMap::default();
    for (idx, gene) in genes.iter().enumerate() {
        if gene.name.trim().is_empty() || gene.name.contains(':') {
            return invalid(format!("invalid gene name '{}'", gene.name));
        }
        if gene.start == 0 || gene.start > gene.end || gene.end > ref_len {
            return invalid(format!(
                "gene {} has invalid coordinates {}..{} for a {} bp reference",
                gene.name, gene.start, gene.end, ref_len
            ));
        }
        if gene.len() < 3 {
            return invalid(format!("gene {} is shorter than one codon", gene.name));
        }
        if gene.len() % 3 != 0 {
            warn!(
                "Gene {} length {} is not a multiple of 3; trailing bases are ignored",
                gene.name,
                gene.len()
            );
        }
        if order.insert(gene.name.clone(), idx).is_some() {
            return invalid(format!("duplicate gene '{}'", gene.name));
        }
    }
    Ok(order)
}

struct NotationContext<'a> {
    genes: &'a [GeneAnnotation],
    gene_order: &'a FxHashMap<String, usize>,
    proteins: &'a [String],
}

impl NotationContext<'_> {
    /// Parses, checks and orders a list of notations; duplicates collapse.
    fn canonicalize(&self, notations: &[String], owner: &str) -> Result<Vec<String>> {
        let mut parsed: Vec<(usize, Notation)> = Vec::with_capacity(notations.len());
        for text in notations {
            let notation = match Notation::parse(text) {
                Some(n) => n,
                None => return invalid(format!("{}: malformed mutation notation '{}'", owner, text)),
            };
            let gene_idx = match self.gene_order.get(&notation.gene) {
                Some(&idx) => idx,
                None => return invalid(format!("{}: unknown gene in '{}'", owner, text)),
            };
            let protein = &self.proteins[gene_idx];
            let max_codons = self.genes[gene_idx].len() / 3;
            if notation.position > max_codons {
                return invalid(format!(
                    "{}: position {} is beyond gene {} ({} codons)",
                    owner, notation.position, notation.gene, max_codons
                ));
            }
            if let Some(actual) = protein.chars().nth(notation.position - 1) {
                if actual != notation.ref_aa {
                    warn!(
                        "{}: {} expects reference {} but the reference translation has {}",
                        owner, text, notation.ref_aa, actual
                    );
                }
            }
            parsed.push((gene_idx, notation));
        }

        parsed.sort_by(|a, b| {
            (a.0, a.1.position, a.1.alt_aa).cmp(&(b.0, b.1.position, b.1.alt_aa))
        });
        let mut out: Vec<String> = parsed.into_iter().map(|(_, n)| n.to_string()).collect();
        out.dedup();
        Ok(out)
    }
}
