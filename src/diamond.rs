//! DIAMOND Driver Module
//!
//! Runs the two DIAMOND steps used for protein matching:
//!
//! ```text
//! diamond makedb --in <reference.fa> --db reference
//! diamond blastp --db reference --query <query.fa> --outfmt 6 qseqid sseqid pident evalue bitscore
//! ```
//!
//! Both calls block until DIAMOND exits. Output is captured in full, and a
//! non-zero exit surfaces as [`DiamondError::ToolFailed`].

use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Executable name looked up on PATH.
pub const DIAMOND: &str = "diamond";
/// Database name passed to `--db`.
pub const REFERENCE_DB_NAME: &str = "reference";
/// Extension DIAMOND appends to database files.
pub const DB_EXTENSION: &str = "dmnd";
/// Tabular columns requested from `blastp`, in output order.
pub const OUTPUT_COLUMNS: [&str; 5] = ["qseqid", "sseqid", "pident", "evalue", "bitscore"];

/// Failure to run a DIAMOND step.
#[derive(Debug, thiserror::Error)]
pub enum DiamondError {
    /// The executable could not be started at all.
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// DIAMOND ran and exited unsuccessfully.
    #[error("diamond {step} failed (exit code: {code:?}): {stderr}")]
    ToolFailed {
        step: &'static str,
        code: Option<i32>,
        stderr: String,
    },
}

impl DiamondError {
    /// Process exit code to report for this failure: DIAMOND's own code when
    /// it fits, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        match self {
            DiamondError::ToolFailed { code: Some(code), .. } => {
                u8::try_from(*code).ok().filter(|c| *c != 0).unwrap_or(1)
            }
            _ => 1,
        }
    }
}

/// Captured output of a successful DIAMOND process.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    /// DIAMOND's progress log.
    pub stderr: String,
}

/// Handle on a DIAMOND executable.
#[derive(Debug, Clone)]
pub struct Diamond {
    executable: PathBuf,
}

impl Diamond {
    pub fn new<P: Into<PathBuf>>(executable: P) -> Self {
        Self { executable: executable.into() }
    }

    /// Finds `diamond` on PATH.
    pub fn locate() -> anyhow::Result<Self> {
        Ok(Self::new(find_executable(DIAMOND)?))
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Builds database `db_name` from a protein FASTA file. Runs in `workdir`,
    /// so relative paths resolve there.
    pub fn makedb(&self, fasta: &Path, db_name: &str, workdir: &Path) -> Result<ToolOutput, DiamondError> {
        let args: [&OsStr; 5] = [
            OsStr::new("makedb"),
            OsStr::new("--in"),
            fasta.as_os_str(),
            OsStr::new("--db"),
            OsStr::new(db_name),
        ];
        self.run("makedb", &args, workdir)
    }

    /// Searches `query` against database `db_name` and returns the tabular
    /// hits in `stdout`.
    pub fn blastp(&self, db_name: &str, query: &Path, workdir: &Path) -> Result<ToolOutput, DiamondError> {
        let mut args: Vec<&OsStr> = vec![
            OsStr::new("blastp"),
            OsStr::new("--db"),
            OsStr::new(db_name),
            OsStr::new("--query"),
            query.as_os_str(),
            OsStr::new("--outfmt"),
            OsStr::new("6"),
        ];
        args.extend(OUTPUT_COLUMNS.map(OsStr::new));
        self.run("blastp", &args, workdir)
    }

    fn run(&self, step: &'static str, args: &[&OsStr], workdir: &Path) -> Result<ToolOutput, DiamondError> {
        log::debug!("Running {} {:?} in {}", self.executable.display(), args, workdir.display());

        let output = Command::new(&self.executable)
            .args(args)
            .current_dir(workdir)
            .output()
            .map_err(|source| DiamondError::Spawn {
                program: self.executable.display().to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(DiamondError::ToolFailed {
                step,
                code: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(ToolOutput { stdout, stderr })
    }
}

/// File name of the database DIAMOND writes for `db_name`.
pub fn database_file(db_name: &str) -> String {
    format!("{}.{}", db_name, DB_EXTENSION)
}

/// Resolves an executable: absolute paths are taken as-is, bare names are
/// searched on PATH.
pub fn find_executable(name: &str) -> anyhow::Result<PathBuf> {
    let path = Path::new(name);
    if path.is_absolute() && path.exists() {
        return Ok(path.to_path_buf());
    }

    if let Ok(paths) = env::var("PATH") {
        for dir in env::split_paths(&paths) {
            let full_path = dir.join(name);
            if full_path.is_file() {
                return Ok(full_path);
            }
        }
    }

    anyhow::bail!("{} not found in PATH. Please install it or add it to your PATH.", name)
}
