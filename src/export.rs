//! Protein export: GenBank record file to a FASTA file of CDS translations.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::features::find_coding_features;
use crate::genbank::read_records;
use crate::seqio::FastaWriter;

/// Extension of exported protein files.
pub const FASTA_EXTENSION: &str = "fa";

/// Name of the FASTA file exported for `path`: its base name with the last
/// extension replaced. Directory components are dropped.
///
/// ```
/// use match_ids::export::derive_fasta_name;
///
/// assert_eq!(derive_fasta_name("data/NC_000913.gbk"), "NC_000913.fa");
/// ```
pub fn derive_fasta_name<P: AsRef<Path>>(path: P) -> String {
    let stem = path
        .as_ref()
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}.{}", stem, FASTA_EXTENSION)
}

/// Writes one FASTA entry per CDS of `path` (locus tag as header, protein as
/// sequence) to `workdir`, overwriting any previous export.
///
/// # Returns
/// Path of the written FASTA file.
pub fn dump_fasta<P: AsRef<Path>>(path: P, workdir: &Path) -> Result<PathBuf> {
    let path = path.as_ref();
    let records = read_records(path)?;
    let coding = find_coding_features(&records)
        .with_context(|| format!("Failed to collect CDS features from {}", path.display()))?;

    let fasta_path = workdir.join(derive_fasta_name(path));
    let mut writer = FastaWriter::create(&fasta_path)?;
    for feature in &coding {
        writer.write_record(&feature.locus_tag, &feature.protein)?;
    }
    let written = writer.finish()?;

    log::info!(
        "Exported {} proteins from {} record(s) of {} to {}",
        written,
        records.len(),
        path.display(),
        fasta_path.display()
    );

    Ok(fasta_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const GENOME: &str = "\
LOCUS       SEQ1                      24 bp    DNA     linear   BCT 01-JAN-2024
FEATURES             Location/Qualifiers
     CDS             1..12
                     /locus_tag=\"SEQ1_0001\"
                     /codon_start=1
     CDS             complement(13..24)
                     /locus_tag=\"SEQ1_0002\"
ORIGIN
        1 atgaaaccct aattagggtt tcat
//
";

    #[test]
    fn test_derive_fasta_name() {
        assert_eq!(derive_fasta_name("genome.gbk"), "genome.fa");
        assert_eq!(derive_fasta_name("/data/run1/genome.gbk"), "genome.fa");
        assert_eq!(derive_fasta_name("relative/dir/a.b.gbff"), "a.b.fa");
        assert_eq!(derive_fasta_name("noext"), "noext.fa");
        assert_eq!(derive_fasta_name("dir/.hidden"), ".hidden.fa");
    }

    #[test]
    fn test_dump_fasta() {
        let input_dir = tempfile::tempdir().unwrap();
        let work_dir = tempfile::tempdir().unwrap();
        let input = input_dir.path().join("genome.gbk");
        fs::write(&input, GENOME).unwrap();

        let fasta = dump_fasta(&input, work_dir.path()).unwrap();
        assert_eq!(fasta, work_dir.path().join("genome.fa"));

        let contents = fs::read_to_string(&fasta).unwrap();
        let headers: Vec<&str> = contents.lines().filter(|l| l.starts_with('>')).collect();
        assert_eq!(headers, vec![">SEQ1_0001", ">SEQ1_0002"]);
        assert_eq!(contents, ">SEQ1_0001\nMKP\n>SEQ1_0002\nMKP\n");
    }

    #[test]
    fn test_dump_fasta_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("genome.gbk");
        fs::write(&input, GENOME).unwrap();
        fs::write(dir.path().join("genome.fa"), ">stale\nAAAA\n>stale2\nCC\n>stale3\nG\n").unwrap();

        let fasta = dump_fasta(&input, dir.path()).unwrap();
        let contents = fs::read_to_string(fasta).unwrap();
        assert_eq!(contents, ">SEQ1_0001\nMKP\n>SEQ1_0002\nMKP\n");
    }

    #[test]
    fn test_dump_fasta_missing_locus_tag() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("genome.gbk");
        fs::write(&input, GENOME.replace("/locus_tag=\"SEQ1_0002\"", "/gene=\"abc\"")).unwrap();

        let err = dump_fasta(&input, dir.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("locus_tag"));
    }

    #[test]
    fn test_dump_fasta_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        assert!(dump_fasta(dir.path().join("missing.gbk"), dir.path()).is_err());
    }
}
