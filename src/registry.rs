use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

const FASTA_EXTENSIONS: [&str; 8] = [
    ".fasta", ".fa", ".fna", ".ffn", ".fasta.gz", ".fa.gz", ".fna.gz", ".ffn.gz",
];

/// Case-insensitive total order over identifiers, with a byte-wise
/// tie-break so distinct strings never compare equal.
pub fn id_cmp(a: &str, b: &str) -> Ordering {
    let la = a.to_ascii_lowercase();
    let lb = b.to_ascii_lowercase();
    la.cmp(&lb).then_with(|| a.cmp(b))
}

/// Maps each input genome to a stable string prefix and a dense integer id.
///
/// Integer ids are assigned in sorted-prefix order so reruns over the same
/// input set produce the same mapping regardless of directory listing order.
#[derive(Debug)]
pub struct GenomeRegistry {
    prefix_to_id: FxHashMap<String, u32>,
    id_to_prefix: Vec<String>,
    id_to_path: Vec<PathBuf>,
}

impl GenomeRegistry {
    /// Build the registry from an ordered list of genome file paths.
    ///
    /// The external id of each genome is its filename prefix up to the first
    /// `.`. Any duplicated prefix makes provenance ambiguous downstream, so
    /// the full set of offenders is reported and the build fails before any
    /// expensive work starts.
    pub fn from_paths(paths: &[PathBuf]) -> io::Result<Self> {
        let mut entries: Vec<(String, PathBuf)> = Vec::with_capacity(paths.len());
        for path in paths {
            entries.push((genome_prefix(path)?, path.clone()));
        }

        let mut counts: FxHashMap<&str, usize> = FxHashMap::default();
        for (prefix, _) in &entries {
            *counts.entry(prefix.as_str()).or_insert(0) += 1;
        }
        let mut duplicated: Vec<String> = counts
            .iter()
            .filter(|(_, &n)| n > 1)
            .map(|(prefix, &n)| format!("{} ({} files)", prefix, n))
            .collect();
        if !duplicated.is_empty() {
            duplicated.sort();
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Input files with duplicated prefixes would merge distinct genomes: {}",
                    duplicated.join(", ")
                ),
            ));
        }

        entries.sort_by(|a, b| id_cmp(&a.0, &b.0));

        let mut prefix_to_id = FxHashMap::default();
        let mut id_to_prefix = Vec::with_capacity(entries.len());
        let mut id_to_path = Vec::with_capacity(entries.len());
        for (id, (prefix, path)) in entries.into_iter().enumerate() {
            prefix_to_id.insert(prefix.clone(), id as u32);
            id_to_prefix.push(prefix);
            id_to_path.push(path);
        }

        Ok(GenomeRegistry {
            prefix_to_id,
            id_to_prefix,
            id_to_path,
        })
    }

    pub fn len(&self) -> usize {
        self.id_to_prefix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_prefix.is_empty()
    }

    pub fn get_id(&self, prefix: &str) -> Option<u32> {
        self.prefix_to_id.get(prefix).copied()
    }

    pub fn get_prefix(&self, id: u32) -> Option<&str> {
        self.id_to_prefix.get(id as usize).map(|s| s.as_str())
    }

    pub fn get_path(&self, id: u32) -> Option<&Path> {
        self.id_to_path.get(id as usize).map(|p| p.as_path())
    }

    /// Genome integer id encoded in a canonical `<prefix>-protein_<n>`
    /// sequence identifier.
    pub fn genome_of_sequence(&self, seqid: &str) -> Option<u32> {
        let (prefix, _) = seqid.rsplit_once("-protein_")?;
        self.get_id(prefix)
    }
}

fn genome_prefix(path: &Path) -> io::Result<String> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Invalid input file name: {}", path.display()),
            )
        })?;
    let prefix = name.split('.').next().unwrap_or(name);
    if prefix.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Input file name has an empty prefix: {}", path.display()),
        ));
    }
    Ok(prefix.to_string())
}

/// Resolve the input argument into the ordered list of genome files.
///
/// A directory is scanned for FASTA files (optionally gzipped); anything
/// else is read as a text file listing one path per line. The result is
/// sorted case-insensitively so downstream processing order is stable.
pub fn collect_input_files(input: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if input.is_dir() {
        for entry in std::fs::read_dir(input)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_ascii_lowercase(),
                None => continue,
            };
            if FASTA_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
                files.push(path);
            }
        }
    } else {
        let reader = BufReader::new(File::open(input)?);
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let path = PathBuf::from(line);
            if !path.is_file() {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("Listed input file does not exist: {}", line),
                ));
            }
            files.push(path);
        }
    }

    if files.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("No FASTA input files found in {}", input.display()),
        ));
    }
    files.sort_by(|a, b| {
        let na = a.file_name().and_then(|n| n.to_str()).unwrap_or("");
        let nb = b.file_name().and_then(|n| n.to_str()).unwrap_or("");
        id_cmp(na, nb)
    });
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn ids_follow_sorted_prefix_order() {
        let registry =
            GenomeRegistry::from_paths(&paths(&["b_genome.fasta", "a_genome.fasta", "C.fna"]))
                .unwrap();
        assert_eq!(registry.get_id("a_genome"), Some(0));
        assert_eq!(registry.get_id("b_genome"), Some(1));
        assert_eq!(registry.get_id("C"), Some(2));
        assert_eq!(registry.get_prefix(1), Some("b_genome"));
    }

    #[test]
    fn duplicate_prefixes_reported_together() {
        let err = GenomeRegistry::from_paths(&paths(&[
            "dir1/s1.fasta",
            "dir2/s1.fna",
            "s2.fasta",
            "other/s2.fa",
        ]))
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("s1 (2 files)"));
        assert!(msg.contains("s2 (2 files)"));
    }

    #[test]
    fn sequence_id_maps_back_to_genome() {
        let registry = GenomeRegistry::from_paths(&paths(&["gca-1.fasta", "gca-2.fasta"])).unwrap();
        assert_eq!(registry.genome_of_sequence("gca-2-protein_17"), Some(1));
        assert_eq!(registry.genome_of_sequence("unknown-protein_1"), None);
        assert_eq!(registry.genome_of_sequence("no_marker"), None);
    }

    #[test]
    fn id_cmp_is_total() {
        assert_eq!(id_cmp("abc", "ABC").is_eq(), false);
        assert!(id_cmp("ABC", "abd").is_lt());
        assert!(id_cmp("b", "A").is_gt());
    }
}
