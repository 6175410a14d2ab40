//! covar - Viral Variant Identification Engine
//!
//! Identifies which catalogued lineage an assembled viral genome most
//! closely matches, which amino-acid mutations it carries relative to the
//! reference, and which concerning-mutation rules those mutations satisfy.
//!
//! # Pipeline
//! FASTA payload -> validation -> anchor alignment -> mutation calling
//! -> {k-mer lineage matching, rule evaluation} -> result
//!
//! # Modules
//! - `seqio`: FASTA reading from bytes and files (plain or gzip)
//! - `validate`: Format, alphabet and quality gates for uploaded sequences
//! - `codon`: Standard genetic code
//! - `mutation`: `gene:RefPosAlt` notation and detected mutations
//! - `reference`: Immutable reference snapshot and catalog loading
//! - `aligner`: Seed-and-chain alignment to reference coordinates
//! - `caller`: Codon-level amino-acid substitution calling
//! - `kmer_index`: Signature k-mer index and lineage matching
//! - `rules`: Concerning-mutation rule evaluation
//! - `job`: Job state machine and status snapshots
//! - `engine`: Worker pool, job submission and status queries
//! - `config`: Tunable thresholds
//! - `error`: Error taxonomy

pub mod seqio;
pub mod validate;
pub mod codon;
pub mod mutation;
pub mod reference;
pub mod aligner;
pub mod caller;
pub mod kmer_index;
pub mod rules;
pub mod job;
pub mod engine;
pub mod config;
pub mod error;
