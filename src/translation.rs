//! Genetic-code translation and the invalid-sequence filters.
//!
//! Exclusions made here are diagnostics, not errors: the pipeline keeps
//! going and only the `id<TAB>reason` report records why a sequence left
//! the candidate pool.

use crate::fasta;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Amino acids for every codon in TCAG order, standard code.
const STANDARD_CODE: &[u8; 64] =
    b"FFLLSSSSYY**CC*WLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG";

/// Supported genetic-code tables: 1 (standard), 4 (TGA = Trp),
/// 11 (bacterial, same codons as 1), 25 (TGA = Gly).
pub const SUPPORTED_TABLES: [u8; 4] = [1, 4, 11, 25];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneticCode {
    table: u8,
}

impl GeneticCode {
    pub fn new(table: u8) -> Option<Self> {
        SUPPORTED_TABLES
            .contains(&table)
            .then_some(GeneticCode { table })
    }

    pub fn table(&self) -> u8 {
        self.table
    }

    fn base_index(base: u8) -> Option<usize> {
        match base {
            b'T' => Some(0),
            b'C' => Some(1),
            b'A' => Some(2),
            b'G' => Some(3),
            _ => None,
        }
    }

    /// Amino acid for a codon, `*` for stop; `None` on non-ACGT bases.
    pub fn translate_codon(&self, codon: &[u8]) -> Option<u8> {
        let index = Self::base_index(codon[0])? * 16
            + Self::base_index(codon[1])? * 4
            + Self::base_index(codon[2])?;
        let aa = STANDARD_CODE[index];
        // TGA is reassigned in tables 4 and 25.
        if index == 14 {
            return Some(match self.table {
                4 => b'W',
                25 => b'G',
                _ => aa,
            });
        }
        Some(aa)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationError {
    InvalidBase(char),
    NotMultipleOfThree,
    InternalStop,
    BelowMinimumLength(usize),
}

impl fmt::Display for TranslationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslationError::InvalidBase(c) => {
                write!(f, "ambiguous or invalid base {:?}", c)
            }
            TranslationError::NotMultipleOfThree => {
                write!(f, "sequence length is not a multiple of 3")
            }
            TranslationError::InternalStop => write!(f, "internal stop codon"),
            TranslationError::BelowMinimumLength(min_len) => {
                write!(f, "sequence shorter than {} nucleotides", min_len)
            }
        }
    }
}

impl std::error::Error for TranslationError {}

/// Translate a coding sequence, rejecting anything that does not read as a
/// clean single open frame. The terminal stop codon, when present, is
/// trimmed from the returned protein.
pub fn translate_cds(
    seq: &str,
    code: GeneticCode,
    min_len: usize,
) -> Result<String, TranslationError> {
    if seq.len() < min_len {
        return Err(TranslationError::BelowMinimumLength(min_len));
    }
    if seq.len() % 3 != 0 {
        return Err(TranslationError::NotMultipleOfThree);
    }
    let upper = seq.to_ascii_uppercase();
    let bytes = upper.as_bytes();
    let codons = bytes.len() / 3;
    let mut protein = String::with_capacity(codons);
    for (i, codon) in bytes.chunks_exact(3).enumerate() {
        let aa = code.translate_codon(codon).ok_or_else(|| {
            let bad = codon
                .iter()
                .find(|&&b| GeneticCode::base_index(b).is_none())
                .copied()
                .unwrap_or(b'?');
            TranslationError::InvalidBase(bad as char)
        })?;
        if aa == b'*' {
            if i + 1 < codons {
                return Err(TranslationError::InternalStop);
            }
            break;
        }
        protein.push(aa as char);
    }
    Ok(protein)
}

/// Exclude sequences below the minimum nucleotide length. Length is raw
/// base count, no gap or ambiguity correction.
pub fn exclude_small(file: &Path, min_len: usize) -> io::Result<(Vec<String>, Vec<String>)> {
    let mut excluded = Vec::new();
    let mut report_lines = Vec::new();
    fasta::each_record(file, |header, seq| {
        if seq.len() < min_len {
            let id = fasta::id_token(header);
            report_lines.push(format!(
                "{}\t{}",
                id,
                TranslationError::BelowMinimumLength(min_len)
            ));
            excluded.push(id.to_string());
        }
        Ok(())
    })?;
    Ok((excluded, report_lines))
}

pub struct TranslationOutcome {
    pub protein_file: PathBuf,
    /// Translated protein per surviving identifier.
    pub proteins: FxHashMap<String, String>,
    pub untranslatable: Vec<String>,
    pub report_lines: Vec<String>,
}

/// Translate the surviving sequences of `file`, in the order given by
/// `ids`, writing the proteins to `out`. Translation runs on the worker
/// pool; outputs are assembled serially in input order so the protein file
/// is identical for any worker count.
pub fn translate_records(
    ids: &[String],
    file: &Path,
    code: GeneticCode,
    min_len: usize,
    out: &Path,
) -> io::Result<TranslationOutcome> {
    let wanted: FxHashSet<String> = ids.iter().cloned().collect();
    let by_id: FxHashMap<String, String> =
        fasta::select_records(file, &wanted)?.into_iter().collect();

    let results: Vec<(String, Result<String, TranslationError>)> = ids
        .par_iter()
        .filter_map(|id| {
            by_id
                .get(id)
                .map(|seq| (id.clone(), translate_cds(seq, code, min_len)))
        })
        .collect();

    let mut proteins = FxHashMap::default();
    let mut translated: Vec<(String, String)> = Vec::new();
    let mut untranslatable = Vec::new();
    let mut report_lines = Vec::new();
    for (id, result) in results {
        match result {
            Ok(protein) => {
                proteins.insert(id.clone(), protein.clone());
                translated.push((id, protein));
            }
            Err(reason) => {
                report_lines.push(format!("{}\t{}", id, reason));
                untranslatable.push(id);
            }
        }
    }

    fasta::write_records(out, translated.iter().map(|(id, p)| (id.as_str(), p.as_str())))?;

    Ok(TranslationOutcome {
        protein_file: out.to_path_buf(),
        proteins,
        untranslatable,
        report_lines,
    })
}
