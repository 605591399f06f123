//! Schema directory assembly and configuration persistence.
//!
//! The directory pair written here is the schema's on-disk contract:
//! one FASTA per locus with a canonical allele-1 header, mirrored into a
//! `short/` subdirectory holding the representative, plus the serialized
//! `.schema_config` and `.genes_list` files.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

pub const CONFIG_FILE: &str = ".schema_config";
pub const GENES_LIST_FILE: &str = ".genes_list";

/// Parameters persisted with the schema. `size_threshold` is carried for
/// later allele calling and is not applied while building the seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub bsr: f64,
    pub translation_table: u8,
    pub minimum_locus_length: usize,
    pub size_threshold: f64,
    pub word_size: usize,
    pub window_size: usize,
    pub cluster_sim: f64,
    pub representative_filter: f64,
    pub intra_filter: f64,
    /// SHA-256 of the predictor training file, when one was provided.
    pub training_file_hash: Option<String>,
    pub version: String,
}

/// Replace identifier characters that are unsafe in file names: `|` and
/// `_` become `-`; parentheses, quotes and colons are deleted.
pub fn sanitize_locus_name(id: &str) -> String {
    id.chars()
        .filter_map(|c| match c {
            '|' | '_' => Some('-'),
            '(' | ')' | '\'' | '"' | ':' => None,
            other => Some(other),
        })
        .collect()
}

/// Write one locus file per entry into `schema_dir` and its `short/`
/// mirror. Entries are `(locus_name, nucleotide_sequence)`; the locus
/// name must already be sanitized. Returns the number of loci written.
pub fn write_schema(schema_dir: &Path, entries: &[(String, String)]) -> io::Result<usize> {
    let short_dir = schema_dir.join("short");
    std::fs::create_dir_all(&short_dir)?;
    for (locus, sequence) in entries {
        let mut writer = BufWriter::new(File::create(schema_dir.join(format!("{}.fasta", locus)))?);
        writeln!(writer, ">{}_1", locus)?;
        writeln!(writer, "{}", sequence)?;
        writer.flush()?;

        let mut writer =
            BufWriter::new(File::create(short_dir.join(format!("{}_short.fasta", locus)))?);
        writeln!(writer, ">{}_1", locus)?;
        writeln!(writer, "{}", sequence)?;
        writer.flush()?;
    }
    Ok(entries.len())
}

pub fn write_config(schema_dir: &Path, config: &SchemaConfig) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(schema_dir.join(CONFIG_FILE))?);
    bincode::serde::encode_into_std_write(config, &mut writer, bincode::config::standard())
        .map_err(|e| {
            io::Error::new(
                io::ErrorKind::Other,
                format!("Failed to serialize schema config: {}", e),
            )
        })?;
    writer.flush()
}

pub fn read_config(schema_dir: &Path) -> io::Result<SchemaConfig> {
    let mut reader = BufReader::new(File::open(schema_dir.join(CONFIG_FILE))?);
    bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard()).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Failed to deserialize schema config: {}", e),
        )
    })
}

pub fn write_genes_list(schema_dir: &Path, loci: &[String]) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(schema_dir.join(GENES_LIST_FILE))?);
    bincode::serde::encode_into_std_write(loci, &mut writer, bincode::config::standard()).map_err(
        |e| {
            io::Error::new(
                io::ErrorKind::Other,
                format!("Failed to serialize genes list: {}", e),
            )
        },
    )?;
    writer.flush()
}

pub fn read_genes_list(schema_dir: &Path) -> io::Result<Vec<String>> {
    let mut reader = BufReader::new(File::open(schema_dir.join(GENES_LIST_FILE))?);
    bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard()).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Failed to deserialize genes list: {}", e),
        )
    })
}

/// Copy the predictor training file next to the schema and return its
/// content hash for the config.
pub fn import_training_file(training: &Path, schema_dir: &Path) -> io::Result<String> {
    let name = training.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Invalid training file path: {}", training.display()),
        )
    })?;
    std::fs::copy(training, schema_dir.join(name))?;
    file_sha256(training)
}

pub fn file_sha256(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fasta;
    use tempfile::TempDir;

    #[test]
    fn sanitization_replacement_table() {
        assert_eq!(sanitize_locus_name("genA-protein_1"), "genA-protein-1");
        assert_eq!(sanitize_locus_name("a|b_c(d)'e\":f"), "a-b-cdef");
    }

    #[test]
    fn schema_and_short_mirror_agree() {
        let dir = TempDir::new().unwrap();
        let schema = dir.path().join("schema_seed");
        let entries = vec![
            ("genA-protein-1".to_string(), "ATGAAATAA".to_string()),
            ("genC-protein-2".to_string(), "ATGCCCTAA".to_string()),
        ];
        assert_eq!(write_schema(&schema, &entries).unwrap(), 2);

        let main = fasta::read_records(&schema.join("genA-protein-1.fasta")).unwrap();
        assert_eq!(main, vec![("genA-protein-1_1".to_string(), "ATGAAATAA".to_string())]);
        let short =
            fasta::read_records(&schema.join("short").join("genA-protein-1_short.fasta")).unwrap();
        assert_eq!(main, short);
    }

    #[test]
    fn config_round_trip() {
        let dir = TempDir::new().unwrap();
        let config = SchemaConfig {
            bsr: 0.6,
            translation_table: 11,
            minimum_locus_length: 201,
            size_threshold: 0.2,
            word_size: 5,
            window_size: 5,
            cluster_sim: 0.2,
            representative_filter: 0.9,
            intra_filter: 0.9,
            training_file_hash: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        };
        write_config(dir.path(), &config).unwrap();
        assert_eq!(read_config(dir.path()).unwrap(), config);

        let loci = vec!["locusA".to_string(), "locusB".to_string()];
        write_genes_list(dir.path(), &loci).unwrap();
        assert_eq!(read_genes_list(dir.path()).unwrap(), loci);
    }

    #[test]
    fn training_file_hash_is_content_hash() {
        let dir = TempDir::new().unwrap();
        let training = dir.path().join("species.trn");
        std::fs::write(&training, b"training bytes").unwrap();
        let schema = dir.path().join("schema_seed");
        std::fs::create_dir_all(&schema).unwrap();
        let hash = import_training_file(&training, &schema).unwrap();
        assert_eq!(hash, file_sha256(&training).unwrap());
        assert!(schema.join("species.trn").exists());
    }
}
