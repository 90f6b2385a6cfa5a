//! Reference/query comparison pipeline.
//!
//! ```text
//! reference.gbk → reference.fa → diamond makedb → reference.dmnd ─┐
//! query.gbk     → query.fa     ─────────────────→ diamond blastp ─┴→ filter → report
//! ```
//!
//! Intermediate files are written to the working directory under fixed names
//! and removed after a successful run unless they are kept.

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::diamond::{database_file, Diamond, REFERENCE_DB_NAME};
use crate::export::{derive_fasta_name, dump_fasta};
use crate::matches::{find_matches, write_report, MatchCollection};

/// Default minimum percent identity for a reported hit.
pub const DEFAULT_SIMILARITY: f64 = 90.0;

/// Options of one comparison run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// GenBank file used to build the database.
    pub reference: PathBuf,
    /// GenBank file searched against the database.
    pub query: PathBuf,
    /// Minimum percent identity (inclusive).
    pub similarity: f64,
    /// Keep the exported FASTA files and the database.
    pub keep: bool,
    /// Directory receiving intermediate files; DIAMOND runs here.
    pub workdir: PathBuf,
}

impl RunConfig {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(reference: P, query: Q) -> Self {
        Self {
            reference: reference.into(),
            query: query.into(),
            similarity: DEFAULT_SIMILARITY,
            keep: false,
            workdir: PathBuf::from("."),
        }
    }

    /// Intermediate files of this run: both FASTA exports and the database.
    pub fn intermediate_files(&self) -> Vec<PathBuf> {
        let mut files = vec![
            self.workdir.join(derive_fasta_name(&self.reference)),
            self.workdir.join(derive_fasta_name(&self.query)),
            self.workdir.join(database_file(REFERENCE_DB_NAME)),
        ];
        files.dedup();
        files
    }
}

/// Runs export, DIAMOND and filtering, writing the report to `out` and
/// malformed-line diagnostics to `diagnostics`.
///
/// A failure after export leaves intermediate files in place.
pub fn run<W: Write, E: Write>(
    config: &RunConfig,
    diamond: &Diamond,
    out: &mut W,
    diagnostics: &mut E,
) -> Result<MatchCollection> {
    log::info!("[1/3] Exporting proteins...");
    let reference_fasta = dump_fasta(&config.reference, &config.workdir)?;
    let query_fasta = dump_fasta(&config.query, &config.workdir)?;
    if reference_fasta == query_fasta {
        log::warn!(
            "Reference and query both export to {}; the query proteins replaced the reference proteins",
            reference_fasta.display()
        );
    }

    log::info!("[2/3] Building DIAMOND database '{}'...", REFERENCE_DB_NAME);
    let build = diamond.makedb(&relative_name(&reference_fasta)?, REFERENCE_DB_NAME, &config.workdir)?;
    log_tool_stderr("makedb", &build.stderr);

    log::info!("[3/3] Searching query proteins...");
    let search = diamond.blastp(REFERENCE_DB_NAME, &relative_name(&query_fasta)?, &config.workdir)?;
    log_tool_stderr("blastp", &search.stderr);

    let matches = find_matches(&search.stdout, config.similarity, diagnostics)?;
    write_report(&matches, out)?;

    if config.keep {
        log::info!("Keeping intermediate files in {}", config.workdir.display());
    } else {
        for path in config.intermediate_files() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
            log::debug!("Removed {}", path.display());
        }
    }

    Ok(matches)
}

fn log_tool_stderr(step: &str, stderr: &str) {
    for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
        log::debug!("diamond {}: {}", step, line);
    }
}

/// File name of a path inside the working directory, as passed to DIAMOND.
fn relative_name(path: &Path) -> Result<PathBuf> {
    path.file_name()
        .map(PathBuf::from)
        .ok_or_else(|| anyhow::anyhow!("Not a file path: {}", path.display()))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::diamond::DiamondError;
    use std::io;
    use std::os::unix::fs::PermissionsExt;

    fn genome(name: &str, tag_prefix: &str) -> String {
        format!(
            "\
LOCUS       {name}                    24 bp    DNA     linear   BCT 01-JAN-2024
FEATURES             Location/Qualifiers
     CDS             1..12
                     /locus_tag=\"{tag_prefix}_0001\"
     CDS             complement(13..24)
                     /locus_tag=\"{tag_prefix}_0002\"
ORIGIN
        1 atgaaaccct aattagggtt tcat
//
"
        )
    }

    /// Fake DIAMOND: records its arguments, creates the database on makedb
    /// and prints canned hits on blastp.
    fn fake_diamond(dir: &Path, blastp_body: &str) -> Diamond {
        let path = dir.join("fake-diamond");
        let script = format!(
            "#!/bin/sh\n\
             echo \"$@\" >> calls.log\n\
             if [ \"$1\" = makedb ]; then\n\
               touch \"$5.dmnd\"\n\
               exit 0\n\
             fi\n\
             {}\n",
            blastp_body
        );
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        Diamond::new(path)
    }

    struct Fixture {
        _inputs: tempfile::TempDir,
        work: tempfile::TempDir,
        tools: tempfile::TempDir,
        config: RunConfig,
    }

    fn fixture() -> Fixture {
        let inputs = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let tools = tempfile::tempdir().unwrap();
        let reference = inputs.path().join("ref_genome.gbk");
        let query = inputs.path().join("query_genome.gbk");
        fs::write(&reference, genome("REF", "REF")).unwrap();
        fs::write(&query, genome("QRY", "QRY")).unwrap();

        let mut config = RunConfig::new(reference, query);
        config.workdir = work.path().to_path_buf();
        Fixture { _inputs: inputs, work, tools, config }
    }

    const HITS: &str = "printf 'QRY_0002\\tREF_0001\\t91.0\\t1e-20\\t80.0\\n\
QRY_0001\\tREF_0001\\t100.0\\t2.5e-30\\t99.44\\n\
QRY_0002\\tREF_0002\\t85.0\\t1e-5\\t40.0\\n\
garbage line\\n\
QRY_0002\\tREF_0002\\t99.0\\t0.0\\t120.0\\n'";

    #[test]
    fn test_run_reports_and_cleans_up() {
        let fx = fixture();
        let diamond = fake_diamond(fx.tools.path(), HITS);

        let mut out = Vec::new();
        let mut diag = Vec::new();
        let matches = run(&fx.config, &diamond, &mut out, &mut diag).unwrap();

        assert_eq!(matches.len(), 2);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "QRY_0002\tREF_0001\t91.0\t1e-20\t80.0\n\
             QRY_0002\tREF_0002\t99.0\t0.0\t120.0\n\
             QRY_0001\tREF_0001\t100.0\t2.5e-30\t99.4\n"
        );
        assert_eq!(String::from_utf8(diag).unwrap(), "failed to split garbage line\n");

        let calls = fs::read_to_string(fx.work.path().join("calls.log")).unwrap();
        assert_eq!(
            calls,
            "makedb --in ref_genome.fa --db reference\n\
             blastp --db reference --query query_genome.fa --outfmt 6 qseqid sseqid pident evalue bitscore\n"
        );

        for path in fx.config.intermediate_files() {
            assert!(!path.exists(), "{} should be removed", path.display());
        }
    }

    #[test]
    fn test_run_keeps_intermediate_files() {
        let mut fx = fixture();
        fx.config.keep = true;
        let diamond = fake_diamond(fx.tools.path(), HITS);

        run(&fx.config, &diamond, &mut io::sink(), &mut io::sink()).unwrap();

        let work = fx.work.path();
        assert!(work.join("ref_genome.fa").exists());
        assert!(work.join("query_genome.fa").exists());
        assert!(work.join("reference.dmnd").exists());
        assert_eq!(
            fs::read_to_string(work.join("ref_genome.fa")).unwrap(),
            ">REF_0001\nMKP\n>REF_0002\nMKP\n"
        );
    }

    #[test]
    fn test_similarity_threshold() {
        let mut fx = fixture();
        fx.config.similarity = 99.5;
        let diamond = fake_diamond(fx.tools.path(), HITS);

        let mut out = Vec::new();
        run(&fx.config, &diamond, &mut out, &mut io::sink()).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "QRY_0001\tREF_0001\t100.0\t2.5e-30\t99.4\n");
    }

    #[test]
    fn test_search_failure_is_fatal_and_leaves_files() {
        let fx = fixture();
        let diamond = fake_diamond(fx.tools.path(), "echo 'Error: out of memory' >&2\nexit 2");

        let mut out = Vec::new();
        let err = run(&fx.config, &diamond, &mut out, &mut io::sink()).unwrap_err();

        let tool_error = err.downcast_ref::<DiamondError>().expect("aligner failure");
        assert!(matches!(tool_error, DiamondError::ToolFailed { step: "blastp", code: Some(2), .. }));
        assert!(out.is_empty());
        assert!(fx.work.path().join("reference.dmnd").exists());
        assert!(fx.work.path().join("query_genome.fa").exists());
    }

    #[test]
    fn test_export_failure_stops_before_diamond() {
        let fx = fixture();
        fs::write(&fx.config.query, "not a genbank file\n").unwrap();
        let diamond = fake_diamond(fx.tools.path(), HITS);

        assert!(run(&fx.config, &diamond, &mut io::sink(), &mut io::sink()).is_err());
        assert!(!fx.work.path().join("calls.log").exists());
    }

    #[test]
    fn test_intermediate_files() {
        let mut config = RunConfig::new("/data/a/genome.gbk", "b/other.gbff");
        config.workdir = PathBuf::from("/tmp/run");
        assert_eq!(
            config.intermediate_files(),
            vec![
                PathBuf::from("/tmp/run/genome.fa"),
                PathBuf::from("/tmp/run/other.fa"),
                PathBuf::from("/tmp/run/reference.dmnd"),
            ]
        );
    }
}
