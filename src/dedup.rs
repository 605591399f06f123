//! Exact-duplicate elimination with genome-membership tracking.

use crate::fasta;
use crate::membership::GenomeMembership;
use crate::registry::GenomeRegistry;
use rustc_hash::FxHashMap;
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};

pub struct DedupResult {
    /// Canonical surviving identifiers, in first-encountered order.
    pub distinct_ids: Vec<String>,
    pub distinct_file: PathBuf,
    pub removed: usize,
    /// Accumulated genome membership per surviving identifier.
    pub membership: FxHashMap<String, GenomeMembership>,
}

/// Collapse sequences with identical content into one record each.
///
/// Files are streamed in the given order and the first-encountered
/// identifier per content digest becomes the canonical one; every later
/// duplicate only contributes its genome to the survivor's membership set.
/// The surviving records are written to `out`, annotated with the encoded
/// membership, exactly one record per distinct digest.
///
/// The same routine serves nucleotide-level and protein-level
/// deduplication; `key_fn` picks the content that defines identity.
pub fn exclude_duplicates<F>(
    files: &[PathBuf],
    out: &Path,
    registry: &GenomeRegistry,
    key_fn: F,
) -> io::Result<DedupResult>
where
    F: Fn(&str) -> String,
{
    let mut by_digest: FxHashMap<String, usize> = FxHashMap::default();
    let mut survivors: Vec<(String, String, GenomeMembership)> = Vec::new();
    let mut removed = 0usize;

    for file in files {
        fasta::each_record(file, |header, seq| {
            let id = fasta::id_token(header);
            let genome = registry.genome_of_sequence(id).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Sequence identifier without genome provenance: {}", id),
                )
            })?;
            let digest = sha256_hex(key_fn(seq).as_bytes());
            match by_digest.get(&digest) {
                Some(&pos) => {
                    survivors[pos].2.insert(genome);
                    removed += 1;
                }
                None => {
                    by_digest.insert(digest, survivors.len());
                    survivors.push((
                        id.to_string(),
                        seq.to_string(),
                        GenomeMembership::from_id(genome),
                    ));
                }
            }
            Ok(())
        })?;
    }

    {
        let annotated: Vec<(String, String)> = survivors
            .iter()
            .map(|(id, seq, membership)| {
                (format!("{} {}", id, membership.encode()), seq.clone())
            })
            .collect();
        fasta::write_records(
            out,
            annotated.iter().map(|(h, s)| (h.as_str(), s.as_str())),
        )?;
    }

    let mut distinct_ids = Vec::with_capacity(survivors.len());
    let mut membership = FxHashMap::default();
    for (id, _, m) in survivors {
        membership.insert(id.clone(), m);
        distinct_ids.push(id);
    }

    Ok(DedupResult {
        distinct_ids,
        distinct_file: out.to_path_buf(),
        removed,
        membership,
    })
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
