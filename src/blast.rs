//! Boundary to the external aligner (`blastp`) and database builder
//! (`makeblastdb`).
//!
//! Any non-empty error stream from either tool is fatal: a silently
//! incomplete alignment pass would corrupt the homology-exclusion
//! guarantee, so there is no partial-result path and no retry.

use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::num::ParseFloatError;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug)]
pub enum ParseErr {
    NotEnoughFields,
    InvalidScore(ParseFloatError),
    UnknownIdentifier(String),
    IoError(io::Error),
}

impl std::fmt::Display for ParseErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseErr::NotEnoughFields => write!(f, "Not enough fields in alignment record"),
            ParseErr::InvalidScore(e) => write!(f, "Invalid alignment score: {}", e),
            ParseErr::UnknownIdentifier(id) => {
                write!(f, "Alignment record references unknown identifier: {}", id)
            }
            ParseErr::IoError(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for ParseErr {}

impl From<ParseErr> for io::Error {
    fn from(e: ParseErr) -> Self {
        match e {
            ParseErr::IoError(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentHit {
    pub query: String,
    pub subject: String,
    pub score: f64,
}

pub struct BlastTools {
    pub makeblastdb: PathBuf,
    pub blastp: PathBuf,
}

impl BlastTools {
    /// Resolve the tool paths, from a directory when given, otherwise
    /// through `PATH`.
    pub fn resolve(blast_path: Option<&Path>) -> Self {
        match blast_path {
            Some(dir) => BlastTools {
                makeblastdb: dir.join("makeblastdb"),
                blastp: dir.join("blastp"),
            },
            None => BlastTools {
                makeblastdb: PathBuf::from("makeblastdb"),
                blastp: PathBuf::from("blastp"),
            },
        }
    }

    /// Build a protein database from `fasta` at `out_db`.
    pub fn make_db(&self, fasta: &Path, out_db: &Path) -> io::Result<()> {
        let output = Command::new(&self.makeblastdb)
            .arg("-in")
            .arg(fasta)
            .arg("-out")
            .arg(out_db)
            .arg("-parse_seqids")
            .arg("-dbtype")
            .arg("prot")
            .output()
            .map_err(|e| {
                io::Error::new(
                    e.kind(),
                    format!("failed to run {}: {}", self.makeblastdb.display(), e),
                )
            })?;
        check_tool_output("makeblastdb", &output)
    }

    /// Align `query` against `db`, writing `qseqid sseqid score` rows to
    /// `out`. One thread per invocation; parallelism lives at the
    /// caller's batch level.
    pub fn align(&self, db: &Path, query: &Path, out: &Path) -> io::Result<()> {
        let output = Command::new(&self.blastp)
            .arg("-db")
            .arg(db)
            .arg("-query")
            .arg(query)
            .arg("-out")
            .arg(out)
            .arg("-outfmt")
            .arg("6 qseqid sseqid score")
            .arg("-max_hsps")
            .arg("1")
            .arg("-num_threads")
            .arg("1")
            .arg("-evalue")
            .arg("0.001")
            .output()
            .map_err(|e| {
                io::Error::new(
                    e.kind(),
                    format!("failed to run {}: {}", self.blastp.display(), e),
                )
            })?;
        check_tool_output("blastp", &output)
    }
}

fn check_tool_output(tool: &str, output: &std::process::Output) -> io::Result<()> {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() || !stderr.trim().is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("{} reported an error: {}", tool, stderr.trim()),
        ));
    }
    Ok(())
}

/// Write records under synthetic `seq_<n>` headers, returning the
/// injective map from synthetic header back to the original identifier.
/// The remapping keeps aligner input free of long headers and special
/// characters; it must never leak past [`parse_alignments`].
pub fn write_integer_headers(
    records: &[(String, String)],
    out: &Path,
) -> io::Result<FxHashMap<String, String>> {
    let mut writer = BufWriter::new(File::create(out)?);
    let mut id_map = FxHashMap::default();
    for (n, (id, seq)) in records.iter().enumerate() {
        let synthetic = format!("seq_{}", n);
        writeln!(writer, ">{}", synthetic)?;
        writeln!(writer, "{}", seq)?;
        id_map.insert(synthetic, id.clone());
    }
    writer.flush()?;
    Ok(id_map)
}

/// Parse tabular alignment rows, mapping synthetic headers straight back
/// to the original identifiers.
pub fn parse_alignments(
    path: &Path,
    id_map: &FxHashMap<String, String>,
) -> Result<Vec<AlignmentHit>, ParseErr> {
    let reader = BufReader::new(File::open(path).map_err(ParseErr::IoError)?);
    let mut hits = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(ParseErr::IoError)?;
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        let query = fields.next().ok_or(ParseErr::NotEnoughFields)?;
        let subject = fields.next().ok_or(ParseErr::NotEnoughFields)?;
        let score = fields
            .next()
            .ok_or(ParseErr::NotEnoughFields)?
            .trim()
            .parse::<f64>()
            .map_err(ParseErr::InvalidScore)?;
        let query = id_map
            .get(query)
            .ok_or_else(|| ParseErr::UnknownIdentifier(query.to_string()))?;
        let subject = id_map
            .get(subject)
            .ok_or_else(|| ParseErr::UnknownIdentifier(subject.to_string()))?;
        hits.push(AlignmentHit {
            query: query.clone(),
            subject: subject.clone(),
            score,
        });
    }
    Ok(hits)
}
