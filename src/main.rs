use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{info, warn};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use covar::config::EngineConfig;
use covar::engine::Engine;
use covar::job::{JobState, JobStatus};
use covar::reference::ReferenceModel;
use covar::seqio;

fn parse_fraction(s: &str) -> Result<f64, String> {
    let val: f64 = s.parse().map_err(|_| format!("Invalid number: {}", s))?;
    if !(0.0..=1.0).contains(&val) {
        Err(format!("Value must be between 0.0 and 1.0, got {}", val))
    } else {
        Ok(val)
    }
}

fn parse_positive(s: &str) -> Result<usize, String> {
    let val: usize = s.parse().map_err(|_| format!("Invalid integer: {}", s))?;
    if val == 0 {
        Err("Value must be greater than 0".to_string())
    } else {
        Ok(val)
    }
}

#[derive(Parser)]
#[command(name = "covar")]
#[command(version)]
#[command(about = "Viral lineage identification and mutation calling from assembled genomes")]
#[command(long_about = r#"
covar - Variant identification against a reference genome and lineage catalog

For every FASTA record in the input:
  1. Validates format, alphabet and quality (ambiguous bases, length)
  2. Aligns to the reference with seed anchors (no full dynamic programming)
  3. Calls amino-acid substitutions in each annotated gene
  4. Matches the mutation set against catalogued lineage signatures
  5. Reports concerning-mutation rules satisfied by the mutation set

LINEAGE TIE-BREAKING (for equal similarity):
  Priority: Jaccard similarity (higher first) → Mutations required by
            high-severity rules (more first) → Lineage label (alphabetical)

OUTPUT:
  JSON array, one entry per input record:
    {job_id, record, status, progress, result | error, timestamps}

EXAMPLES:
  # Catalog with the reference sequence supplied separately
  covar -c data/catalog.json -r NC_045512.2.fasta -i samples.fasta.gz -o results.json

  # Validate a catalog without analysing anything
  covar -c data/catalog.json -r NC_045512.2.fasta --check-catalog
"#)]
struct Args {
    #[arg(short = 'c', long, value_name = "FILE", help_heading = "Reference")]
    catalog: PathBuf,

    #[arg(short = 'r', long, value_name = "FILE", help_heading = "Reference")]
    reference: Option<PathBuf>,

    #[arg(long = "check-catalog", help_heading = "Reference")]
    check_catalog: bool,

    #[arg(short = 'i', long, value_name = "FILE", required_unless_present = "check_catalog", help_heading = "Input")]
    input: Option<PathBuf>,

    #[arg(short = 'o', long, value_name = "FILE", help_heading = "Output")]
    output: Option<PathBuf>,

    #[arg(short = 'v', long, help_heading = "Output")]
    verbose: bool,

    #[arg(long, value_name = "FILE", help_heading = "Settings")]
    config: Option<PathBuf>,

    #[arg(long = "kmer-size", value_name = "NUM", value_parser = parse_positive, help_heading = "Settings")]
    kmer_size: Option<usize>,

    #[arg(long = "min-similarity", value_name = "FLOAT", value_parser = parse_fraction, help_heading = "Settings")]
    min_similarity: Option<f64>,

    #[arg(long = "max-ambiguous", value_name = "FLOAT", value_parser = parse_fraction, help_heading = "Settings")]
    max_ambiguous: Option<f64>,

    #[arg(long = "min-length", value_name = "BP", value_parser = parse_positive, help_heading = "Settings")]
    min_length: Option<usize>,

    #[arg(long, value_name = "BP", help_heading = "Settings")]
    drift: Option<usize>,

    #[arg(long = "min-seed-fraction", value_name = "FLOAT", value_parser = parse_fraction, help_heading = "Settings")]
    min_seed_fraction: Option<f64>,

    #[arg(short = 't', long, value_name = "NUM", help_heading = "Runtime")]
    threads: Option<usize>,

    #[arg(long, value_name = "SECS", default_value = "600", help_heading = "Runtime")]
    timeout: u64,
}

impl Args {
    /// Config file values with command-line flags layered on top.
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_json_file(path)?,
            None => EngineConfig::default(),
        };

        if let Some(k) = self.kmer_size {
            config.matcher.kmer_size = k;
        }
        if let Some(s) = self.min_similarity {
            config.matcher.min_similarity = s;
        }
        if let Some(f) = self.max_ambiguous {
            config.validator.max_ambiguous_fraction = f;
        }
        if let Some(l) = self.min_length {
            config.validator.min_length = l;
        }
        if let Some(d) = self.drift {
            config.aligner.drift = d;
        }
        if let Some(f) = self.min_seed_fraction {
            config.aligner.min_seed_fraction = f;
        }
        if let Some(t) = self.threads {
            config.workers = t;
        }

        config.validate().context("Invalid engine configuration")?;
        Ok(config)
    }
}

#[derive(Serialize)]
struct RecordReport<'a> {
    record: String,
    #[serde(flatten)]
    status: &'a JobStatus,
}

/// First word of a record's header line.
fn record_name(chunk: &[u8]) -> String {
    let header = chunk.split(|&b| b == b'\n').next().unwrap_or_default();
    String::from_utf8_lossy(header)
        .trim_start_matches('>')
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string()
}

fn main() -> Result<()> {
    let args = Args::parse();
    let start_time = Instant::now();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    let config = args.engine_config()?;

    let model = ReferenceModel::from_json_file(&args.catalog, args.reference.as_deref(), config.matcher.kmer_size)
        .with_context(|| format!("Failed to load catalog: {}", args.catalog.display()))?;

    if args.check_catalog {
        println!("Reference:  {} ({} bp)", model.reference().accession, model.reference().len());
        println!("Version:    {}", model.version());
        println!("Genes:      {}", model.genes().len());
        println!("Lineages:   {}", model.catalog_entries().len());
        println!("Rules:      {}", model.rules().len());
        println!("Index:      {} k-mers (k = {})", model.kmer_index().len(), model.kmer_index().k());
        return Ok(());
    }

    let input = match &args.input {
        Some(path) => path,
        None => anyhow::bail!("--input is required for analysis"),
    };
    let payload = seqio::read_payload(input)?;
    let records = seqio::split_records(&payload);
    if records.is_empty() {
        anyhow::bail!("No FASTA records found in {}", input.display());
    }

    let engine = Engine::new(model, config).context("Invalid engine configuration")?;
    info!("Analysing {} record(s) from {}", records.len(), input.display());

    let submitted: Vec<_> = records
        .into_iter()
        .map(|chunk| {
            let name = record_name(&chunk);
            (name, engine.submit_analysis(chunk))
        })
        .collect();

    let timeout = Duration::from_secs(args.timeout);
    let mut statuses = Vec::with_capacity(submitted.len());
    for (name, id) in submitted {
        let status = engine
            .wait(id, timeout)
            .with_context(|| format!("{} disappeared from the job table", id))?;
        if !status.state.is_terminal() {
            warn!("{} ({}) did not finish within {} s", id, name, args.timeout);
        }
        statuses.push((name, status));
    }
    engine.shutdown();

    let reports: Vec<RecordReport> = statuses
        .iter()
        .map(|(name, status)| RecordReport {
            record: name.clone(),
            status: status.as_ref(),
        })
        .collect();

    let writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(File::create(path).with_context(|| format!("Failed to create {}", path.display()))?),
        None => Box::new(io::stdout()),
    };
    let mut writer = BufWriter::new(writer);
    serde_json::to_writer_pretty(&mut writer, &reports)?;
    writeln!(writer)?;
    writer.flush()?;

    let failed = statuses.iter().filter(|(_, s)| s.state != JobState::Succeeded).count();
    info!(
        "Done: {} succeeded, {} failed in {:.1}s",
        statuses.len() - failed,
        failed,
        start_time.elapsed().as_secs_f64()
    );

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
