//! Boundary to the external CDS predictor (Prodigal).
//!
//! A single genome's failure is a value, never an error: the pipeline
//! decides what to do with the reduced genome set.

use crate::fasta;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionMode {
    Single,
    Meta,
}

impl PredictionMode {
    pub fn as_arg(&self) -> &'static str {
        match self {
            PredictionMode::Single => "single",
            PredictionMode::Meta => "meta",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CdsCoordinate {
    pub genome: String,
    pub contig: String,
    pub start: u64,
    pub stop: u64,
    pub protein_id: String,
    pub strand: i8,
}

#[derive(Debug)]
pub struct PredictionFailure {
    pub genome: String,
    pub reason: String,
}

#[derive(Debug)]
pub struct PredictionOutcome {
    pub genome: String,
    pub cds_file: PathBuf,
    pub cds_count: usize,
    pub coordinates: Vec<CdsCoordinate>,
}

pub struct PredictorConfig {
    pub executable: PathBuf,
    pub translation_table: u8,
    pub mode: PredictionMode,
    pub training_file: Option<PathBuf>,
}

/// Run the predictor on one genome, writing the extracted coding
/// sequences with canonical `<prefix>-protein_<n>` headers to
/// `<out_dir>/<prefix>.fasta`.
pub fn predict_genes(
    genome_path: &Path,
    prefix: &str,
    out_dir: &Path,
    config: &PredictorConfig,
) -> io::Result<Result<PredictionOutcome, PredictionFailure>> {
    let raw_cds = out_dir.join(format!("{}_cds_raw.fasta", prefix));
    let gene_file = out_dir.join(format!("{}_genes.sco", prefix));

    let mut command = Command::new(&config.executable);
    command
        .arg("-i")
        .arg(genome_path)
        .arg("-d")
        .arg(&raw_cds)
        .arg("-o")
        .arg(&gene_file)
        .arg("-f")
        .arg("sco")
        .arg("-g")
        .arg(config.translation_table.to_string())
        .arg("-p")
        .arg(config.mode.as_arg())
        .arg("-q");
    // Prodigal only honors a training file in single mode; in meta mode a
    // provided file is noted upstream and left out of the invocation.
    if config.mode == PredictionMode::Single {
        if let Some(training) = &config.training_file {
            command.arg("-t").arg(training);
        }
    }

    let output = match command.output() {
        Ok(output) => output,
        Err(e) => {
            return Ok(Err(PredictionFailure {
                genome: prefix.to_string(),
                reason: format!("failed to run {}: {}", config.executable.display(), e),
            }))
        }
    };
    if !output.status.success() {
        return Ok(Err(PredictionFailure {
            genome: prefix.to_string(),
            reason: stderr_tail(&output.stderr),
        }));
    }

    let records = fasta::read_raw_headers(&raw_cds)?;
    if records.is_empty() {
        return Ok(Err(PredictionFailure {
            genome: prefix.to_string(),
            reason: "no coding sequences predicted".to_string(),
        }));
    }

    let mut renamed: Vec<(String, String)> = Vec::with_capacity(records.len());
    let mut coordinates = Vec::with_capacity(records.len());
    for (n, (header, seq)) in records.into_iter().enumerate() {
        let protein_id = format!("{}-protein_{}", prefix, n + 1);
        if let Some(coordinate) = parse_header_coordinates(&header, prefix, &protein_id) {
            coordinates.push(coordinate);
        }
        renamed.push((protein_id, seq));
    }

    let cds_file = out_dir.join(format!("{}.fasta", prefix));
    fasta::write_records(&cds_file, renamed.iter().map(|(h, s)| (h.as_str(), s.as_str())))?;
    std::fs::remove_file(&raw_cds)?;
    let _ = std::fs::remove_file(&gene_file);

    Ok(Ok(PredictionOutcome {
        genome: prefix.to_string(),
        cds_count: renamed.len(),
        cds_file,
        coordinates,
    }))
}

/// Predictor CDS headers carry `<contig>_<n> # start # stop # strand # ...`.
fn parse_header_coordinates(header: &str, genome: &str, protein_id: &str) -> Option<CdsCoordinate> {
    let mut fields = header.split(" # ");
    let id = fields.next()?;
    let start: u64 = fields.next()?.trim().parse().ok()?;
    let stop: u64 = fields.next()?.trim().parse().ok()?;
    let strand: i8 = fields.next()?.trim().parse().ok()?;
    let contig = id.rsplit_once('_').map(|(c, _)| c).unwrap_or(id);
    Some(CdsCoordinate {
        genome: genome.to_string(),
        contig: contig.to_string(),
        start,
        stop,
        protein_id: protein_id.to_string(),
        strand,
    })
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let tail = lines.iter().rev().take(3).rev().cloned().collect::<Vec<_>>();
    if tail.is_empty() {
        "predictor exited with a non-zero status".to_string()
    } else {
        tail.join("; ")
    }
}
