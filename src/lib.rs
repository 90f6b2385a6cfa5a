//! match-ids - Protein identifier matching between annotated genomes
//!
//! Exports the CDS proteins of a reference and a query GenBank file, aligns
//! them with DIAMOND and reports, for each query protein, the reference
//! proteins it matches above a percent-identity threshold.
//!
//! # Modules
//! - `genbank`: GenBank flat file parsing (plain or gzip)
//! - `translate`: Codon table and CDS translation
//! - `features`: CDS feature collection
//! - `seqio`: FASTA writing
//! - `export`: GenBank to protein FASTA export
//! - `diamond`: DIAMOND makedb/blastp driver
//! - `matches`: Tabular hit filtering, grouping and reporting
//! - `pipeline`: End-to-end comparison run

pub mod genbank;
pub mod translate;
pub mod features;
pub mod seqio;
pub mod export;
pub mod diamond;
pub mod matches;
pub mod pipeline;
