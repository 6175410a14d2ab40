//! Sequence I/O Module
//!
//! FASTA reading for uploaded payloads (in-memory bytes) and for files on
//! disk, including gzip-compressed files.
//!
//! # Examples
//! ```no_run
//! use covar::seqio::FastaFile;
//!
//! let mut reader = FastaFile::open("sample.fasta.gz").unwrap();
//! while let Some(record) = reader.read_next().unwrap() {
//!     println!("{}: {} bp", record.name, record.seq.len());
//! }
//! ```

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

// ============================================================================
// FASTA Record
// ============================================================================

/// A FASTA record as read from the input, before any validation.
///
/// # Fields
/// - `name`: Sequence identifier (text after '>' up to first whitespace)
/// - `description`: Full header text after '>'
/// - `seq`: Raw sequence bytes (all sequence lines concatenated, whitespace removed)
#[derive(Debug, Clone, PartialEq)]
pub struct FastaRecord {
    /// Sequence identifier extracted from the header line.
    pub name: String,
    /// Complete header line without the leading '>'.
    pub description: String,
    /// Raw sequence bytes, case preserved. Not checked for any alphabet.
    pub seq: Vec<u8>,
}

// ============================================================================
// FASTA Reader
// ============================================================================

/// Sequential FASTA reader over any `Read` source.
///
/// Reads records one at a time. Blank lines are ignored; any non-blank
/// content before the first header is a format error.
pub struct FastaReader<R: Read> {
    reader: BufReader<R>,
    line_buf: Vec<u8>,
    current_header: Option<String>,
    started: bool,
}

impl<'a> FastaReader<&'a [u8]> {
    /// Reads FASTA text held in memory (e.g. an uploaded payload).
    pub fn from_bytes(bytes: &'a [u8]) -> Self {
        FastaReader::new(bytes)
    }
}

impl<R: Read> FastaReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::with_capacity(256 * 1024, inner),
            line_buf: Vec::with_capacity(256),
            current_header: None,
            started: false,
        }
    }

    /// Advances to the first header line, rejecting leading sequence data.
    fn read_first_header(&mut self) -> Result<()> {
        self.started = true;
        loop {
            self.line_buf.clear();
            if self.reader.read_until(b'\n', &mut self.line_buf)? == 0 {
                return Ok(());
            }
            let line = self.line_buf.trim_ascii();
            if line.is_empty() {
                continue;
            }
            if let Some(header) = line.strip_prefix(b">") {
                self.current_header = Some(header_text(header));
                return Ok(());
            }
            anyhow::bail!("sequence data found before the first '>' header");
        }
    }

    /// Reads the next FASTA record.
    ///
    /// # Returns
    /// - `Ok(Some(record))` - Successfully read a record
    /// - `Ok(None)` - End of input reached
    /// - `Err(e)` - I/O error or malformed input
    pub fn read_next(&mut self) -> Result<Option<FastaRecord>> {
        if !self.started {
            self.read_first_header()?;
        }

        let header = match self.current_header.take() {
            Some(h) => h,
            None => return Ok(None),
        };

        let mut seq = Vec::with_capacity(32 * 1024);

        loop {
            self.line_buf.clear();
            if self.reader.read_until(b'\n', &mut self.line_buf)? == 0 {
                break;
            }

            if let Some(next) = self.line_buf.strip_prefix(b">") {
                self.current_header = Some(header_text(next));
                break;
            }

            seq.extend(self.line_buf.iter().filter(|b| !b.is_ascii_whitespace()));
        }

        let name = header.split_whitespace().next().unwrap_or("").to_string();

        Ok(Some(FastaRecord {
            name,
            description: header,
            seq,
        }))
    }
}

/// Header text with invalid UTF-8 replaced; sequence bytes are left raw.
fn header_text(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw.trim_ascii()).into_owned()
}

impl<R: Read> Iterator for FastaReader<R> {
    type Item = Result<FastaRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

// ============================================================================
// FASTA Files
// ============================================================================

/// Auto-detecting FASTA file reader.
///
/// Files ending in `.gz` are treated as gzip-compressed.
pub enum FastaFile {
    /// Plain text FASTA file.
    Plain(FastaReader<File>),
    /// Gzip-compressed FASTA file.
    Gzipped(FastaReader<MultiGzDecoder<File>>),
}

impl FastaFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open FASTA: {}", path.display()))?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        if ext == "gz" {
            Ok(FastaFile::Gzipped(FastaReader::new(MultiGzDecoder::new(file))))
        } else {
            Ok(FastaFile::Plain(FastaReader::new(file)))
        }
    }

    pub fn read_next(&mut self) -> Result<Option<FastaRecord>> {
        match self {
            FastaFile::Plain(r) => r.read_next(),
            FastaFile::Gzipped(r) => r.read_next(),
        }
    }
}

/// Reads every record of a FASTA file.
pub fn read_fasta_file<P: AsRef<Path>>(path: P) -> Result<Vec<FastaRecord>> {
    let path = path.as_ref();
    let mut reader = FastaFile::open(path)?;
    let mut records = Vec::new();
    while let Some(record) = reader
        .read_next()
        .with_context(|| format!("Failed to parse FASTA: {}", path.display()))?
    {
        records.push(record);
    }
    Ok(records)
}

/// Reads a whole file into memory, decompressing `.gz` files.
pub fn read_payload<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let mut file = File::open(path)
        .with_context(|| format!("Failed to open input: {}", path.display()))?;
    let mut buf = Vec::new();
    if path.extension().and_then(|e| e.to_str()) == Some("gz") {
        MultiGzDecoder::new(file).read_to_end(&mut buf)?;
    } else {
        file.read_to_end(&mut buf)?;
    }
    Ok(buf)
}

/// Splits a multi-record FASTA payload into one payload per record.
///
/// Each returned chunk starts at its '>' header line. Content before the
/// first header is returned as its own chunk so the analysis of that chunk
/// reports the format problem instead of silently dropping it.
pub fn split_records(payload: &[u8]) -> Vec<Vec<u8>> {
    let mut chunks: Vec<Vec<u8>> = Vec::new();
    let mut current: Vec<u8> = Vec::new();

    for line in payload.split_inclusive(|&b| b == b'\n') {
        if line.first() == Some(&b'>') && current.iter().any(|b| !b.is_ascii_whitespace()) {
            chunks.push(std::mem::take(&mut current));
        }
        current.extend_from_slice(line);
    }
    if current.iter().any(|b| !b.is_ascii_whitespace()) {
        chunks.push(current);
    }

    chunks
}
