//! FASTA streaming and writing helpers shared by all pipeline stages.

use needletail::parse_fastx_file;
use rustc_hash::FxHashSet;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Stream every record of a (possibly gzipped) FASTA file through `f`,
/// passing the full header line and the sequence. Empty files yield no
/// records instead of a parse error.
pub fn each_record<F>(path: &Path, mut f: F) -> io::Result<()>
where
    F: FnMut(&str, &str) -> io::Result<()>,
{
    if std::fs::metadata(path)?.len() == 0 {
        return Ok(());
    }
    let mut reader = parse_fastx_file(path)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    while let Some(record) = reader.next() {
        let record =
            record.map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        let header = String::from_utf8_lossy(record.id()).into_owned();
        let seq = String::from_utf8_lossy(&record.seq()).into_owned();
        f(&header, &seq)?;
    }
    Ok(())
}

/// First whitespace-delimited token of a header line.
pub fn id_token(header: &str) -> &str {
    header.split_whitespace().next().unwrap_or(header)
}

/// Read all records as `(identifier, sequence)` pairs, dropping any header
/// description after the identifier.
pub fn read_records(path: &Path) -> io::Result<Vec<(String, String)>> {
    let mut records = Vec::new();
    each_record(path, |header, seq| {
        records.push((id_token(header).to_string(), seq.to_string()));
        Ok(())
    })?;
    Ok(records)
}

/// Read all records keeping the full header line, for callers that parse
/// header annotations.
pub fn read_raw_headers(path: &Path) -> io::Result<Vec<(String, String)>> {
    let mut records = Vec::new();
    each_record(path, |header, seq| {
        records.push((header.to_string(), seq.to_string()));
        Ok(())
    })?;
    Ok(records)
}

/// Read only the records whose identifier is in `wanted`.
pub fn select_records(
    path: &Path,
    wanted: &FxHashSet<String>,
) -> io::Result<Vec<(String, String)>> {
    let mut records = Vec::new();
    each_record(path, |header, seq| {
        let id = id_token(header);
        if wanted.contains(id) {
            records.push((id.to_string(), seq.to_string()));
        }
        Ok(())
    })?;
    Ok(records)
}

/// Write records as single-line FASTA.
pub fn write_records<'a, I>(path: &Path, records: I) -> io::Result<()>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut writer = BufWriter::new(File::create(path)?);
    for (header, seq) in records {
        writeln!(writer, ">{}", header)?;
        writeln!(writer, "{}", seq)?;
    }
    writer.flush()
}

/// Concatenate whole files into `out`, in the given order.
pub fn concatenate(files: &[std::path::PathBuf], out: &Path) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(out)?);
    for file in files {
        let mut reader = File::open(file)?;
        io::copy(&mut reader, &mut writer)?;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_then_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.fasta");
        write_records(&path, [("g1-protein_1 extra notes", "ATGAAATAA"), ("g1-protein_2", "ATGTAA")])
            .unwrap();
        let records = read_records(&path).unwrap();
        assert_eq!(
            records,
            vec![
                ("g1-protein_1".to_string(), "ATGAAATAA".to_string()),
                ("g1-protein_2".to_string(), "ATGTAA".to_string()),
            ]
        );
    }

    #[test]
    fn select_keeps_only_wanted_ids() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.fasta");
        write_records(&path, [("a", "AAA"), ("b", "CCC"), ("c", "GGG")]).unwrap();
        let wanted: FxHashSet<String> = ["a".to_string(), "c".to_string()].into_iter().collect();
        let records = select_records(&path, &wanted).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, "a");
        assert_eq!(records[1].0, "c");
    }

    #[test]
    fn empty_file_yields_no_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.fasta");
        File::create(&path).unwrap();
        assert!(read_records(&path).unwrap().is_empty());
    }
}
