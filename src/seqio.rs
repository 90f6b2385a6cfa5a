//! Sequence I/O Module
//!
//! FASTA output for the protein files handed to the aligner.
//!
//! # Examples
//! ```no_run
//! use match_ids::seqio::FastaWriter;
//!
//! let mut writer = FastaWriter::create("proteins.fa").unwrap();
//! writer.write_record("b0001", "MKRISTTITTTITITTGNGAG").unwrap();
//! assert_eq!(writer.finish().unwrap(), 1);
//! ```

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Buffered FASTA writer, one header and one sequence line per record.
pub struct FastaWriter<W: Write> {
    writer: BufWriter<W>,
    count: usize,
}

impl FastaWriter<File> {
    /// Creates (or truncates) a FASTA file.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create FASTA: {}", path.as_ref().display()))?;
        Ok(Self::new(file))
    }
}

impl<W: Write> FastaWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { writer: BufWriter::new(inner), count: 0 }
    }

    pub fn write_record(&mut self, name: &str, seq: &str) -> Result<()> {
        writeln!(self.writer, ">{}\n{}", name, seq)?;
        self.count += 1;
        Ok(())
    }

    /// Flushes buffered output and returns the number of records written.
    pub fn finish(mut self) -> Result<usize> {
        self.writer.flush()?;
        Ok(self.count)
    }
}
