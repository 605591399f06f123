//! CDS acquisition: run the external predictor per genome, or rename
//! pre-extracted coding sequences, then pool everything into a bounded
//! number of chunk files.

use crate::fasta;
use crate::predictor::{self, PredictionFailure, PredictionOutcome, PredictorConfig};
use crate::registry::GenomeRegistry;
use log::{info, warn};
use rayon::prelude::*;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Chunk-file cap; keeps descriptor and per-file size overhead bounded
/// no matter how many genomes come in.
pub const MAX_CHUNKS: usize = 15;

pub struct AcquisitionResult {
    pub chunk_files: Vec<PathBuf>,
    pub total_cds: usize,
    pub failed_genomes: Vec<String>,
    pub coordinates_file: Option<PathBuf>,
}

/// Predict coding sequences for every registered genome in parallel.
///
/// Per-genome failures are collected and reported to
/// `gene_prediction_failures.tsv`; the stage only fails when no genome at
/// all produced usable output.
pub fn acquire_predicted(
    registry: &GenomeRegistry,
    config: &PredictorConfig,
    work_dir: &Path,
    chunk_dir: &Path,
) -> io::Result<AcquisitionResult> {
    let genomes: Vec<(u32, &Path, &str)> = (0..registry.len() as u32)
        .map(|id| {
            (
                id,
                registry.get_path(id).unwrap(),
                registry.get_prefix(id).unwrap(),
            )
        })
        .collect();

    let results: Vec<Result<PredictionOutcome, PredictionFailure>> = genomes
        .par_iter()
        .map(|(_, path, prefix)| predictor::predict_genes(path, prefix, work_dir, config))
        .collect::<io::Result<Vec<_>>>()?;

    let mut outcomes = Vec::new();
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(outcome) => outcomes.push(outcome),
            Err(failure) => failures.push(failure),
        }
    }

    if !failures.is_empty() {
        let failures_file = work_dir.join("gene_prediction_failures.tsv");
        let mut writer = BufWriter::new(File::create(&failures_file)?);
        writeln!(writer, "Genome\tReason")?;
        for failure in &failures {
            writeln!(writer, "{}\t{}", failure.genome, failure.reason)?;
            warn!(
                "Gene prediction failed for {}: {}",
                failure.genome, failure.reason
            );
        }
        writer.flush()?;
    }
    if outcomes.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            "Gene prediction failed for every input genome; nothing to process",
        ));
    }

    let coordinates_file = work_dir.join("cds_coordinates.tsv");
    {
        let mut writer = BufWriter::new(File::create(&coordinates_file)?);
        writeln!(writer, "Genome\tContig\tStart\tStop\tProtein_ID\tCoding_Strand")?;
        for outcome in &outcomes {
            for c in &outcome.coordinates {
                writeln!(
                    writer,
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    c.genome, c.contig, c.start, c.stop, c.protein_id, c.strand
                )?;
            }
        }
        writer.flush()?;
    }

    let total_cds: usize = outcomes.iter().map(|o| o.cds_count).sum();
    info!(
        "Predicted {} coding sequences across {} genomes ({} failed)",
        total_cds,
        outcomes.len(),
        failures.len()
    );

    let per_genome: Vec<PathBuf> = outcomes.into_iter().map(|o| o.cds_file).collect();
    let chunk_files = chunk_files(&per_genome, chunk_dir)?;
    Ok(AcquisitionResult {
        chunk_files,
        total_cds,
        failed_genomes: failures.into_iter().map(|f| f.genome).collect(),
        coordinates_file: Some(coordinates_file),
    })
}

/// Pass-through mode: input files already hold coding sequences; only the
/// headers are rewritten into the canonical `<prefix>-protein_<n>` scheme
/// so provenance tracking works uniformly downstream.
pub fn acquire_cds_input(
    registry: &GenomeRegistry,
    work_dir: &Path,
    chunk_dir: &Path,
) -> io::Result<AcquisitionResult> {
    let genomes: Vec<(u32, &Path, &str)> = (0..registry.len() as u32)
        .map(|id| {
            (
                id,
                registry.get_path(id).unwrap(),
                registry.get_prefix(id).unwrap(),
            )
        })
        .collect();

    let renamed: Vec<(PathBuf, usize)> = genomes
        .par_iter()
        .map(|(_, path, prefix)| rename_cds_headers(path, prefix, work_dir))
        .collect::<io::Result<Vec<_>>>()?;

    let total_cds: usize = renamed.iter().map(|(_, n)| n).sum();
    info!(
        "Renamed {} coding sequences from {} input files",
        total_cds,
        renamed.len()
    );

    let per_genome: Vec<PathBuf> = renamed.into_iter().map(|(f, _)| f).collect();
    let chunk_files = chunk_files(&per_genome, chunk_dir)?;
    Ok(AcquisitionResult {
        chunk_files,
        total_cds,
        failed_genomes: Vec::new(),
        coordinates_file: None,
    })
}

fn rename_cds_headers(path: &Path, prefix: &str, out_dir: &Path) -> io::Result<(PathBuf, usize)> {
    let out = out_dir.join(format!("{}.fasta", prefix));
    let mut writer = BufWriter::new(File::create(&out)?);
    let mut n = 0usize;
    fasta::each_record(path, |_, seq| {
        n += 1;
        writeln!(writer, ">{}-protein_{}", prefix, n)?;
        writeln!(writer, "{}", seq)?;
        Ok(())
    })?;
    writer.flush()?;
    Ok((out, n))
}

/// Concatenate the per-genome files into at most [`MAX_CHUNKS`] chunk
/// files, deleting the per-genome files afterwards. Assignment is
/// contiguous over the input order, so the chunk contents are stable.
fn chunk_files(per_genome: &[PathBuf], chunk_dir: &Path) -> io::Result<Vec<PathBuf>> {
    let chunk_count = per_genome.len().min(MAX_CHUNKS).max(1);
    let per_chunk = per_genome.len().div_ceil(chunk_count);
    let mut chunks = Vec::with_capacity(chunk_count);
    for (i, group) in per_genome.chunks(per_chunk).enumerate() {
        let chunk = chunk_dir.join(format!("coding_sequences_{}.fasta", i));
        fasta::concatenate(group, &chunk)?;
        chunks.push(chunk);
    }
    for file in per_genome {
        std::fs::remove_file(file)?;
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn pass_through_renames_and_chunks() {
        let dir = TempDir::new().unwrap();
        let input_dir = dir.path().join("input");
        let work = dir.path().join("work");
        let chunks = dir.path().join("chunks");
        std::fs::create_dir_all(&input_dir).unwrap();
        std::fs::create_dir_all(&work).unwrap();
        std::fs::create_dir_all(&chunks).unwrap();

        let a = input_dir.join("genA.fasta");
        let b = input_dir.join("genB.fasta");
        fasta::write_records(&a, [("orig|header 1", "ATGAAATAA"), ("other", "ATGCCCTAA")])
            .unwrap();
        fasta::write_records(&b, [("x", "ATGAAATAA")]).unwrap();

        let registry = GenomeRegistry::from_paths(&[a, b]).unwrap();
        let result = acquire_cds_input(&registry, &work, &chunks).unwrap();
        assert_eq!(result.total_cds, 3);
        assert!(result.failed_genomes.is_empty());
        assert_eq!(result.chunk_files.len(), 2);

        let mut ids = Vec::new();
        for chunk in &result.chunk_files {
            for (id, _) in fasta::read_records(chunk).unwrap() {
                ids.push(id);
            }
        }
        ids.sort();
        assert_eq!(
            ids,
            vec!["genA-protein_1", "genA-protein_2", "genB-protein_1"]
        );
        // Per-genome intermediates are gone.
        assert!(!work.join("genA.fasta").exists());
    }

    #[test]
    fn chunk_count_is_capped() {
        let dir = TempDir::new().unwrap();
        let mut files = Vec::new();
        for i in 0..40 {
            let f = dir.path().join(format!("g{}.fasta", i));
            fasta::write_records(&f, [("x", "ATG")]).unwrap();
            files.push(f);
        }
        let chunk_dir = dir.path().join("chunks");
        std::fs::create_dir_all(&chunk_dir).unwrap();
        let chunks = chunk_files(&files, &chunk_dir).unwrap();
        assert!(chunks.len() <= MAX_CHUNKS);
        let total: usize = chunks
            .iter()
            .map(|c| fasta::read_records(c).unwrap().len())
            .sum();
        assert_eq!(total, 40);
    }
}
