//! Nucleotide Translation Module
//!
//! Converts coding DNA into protein using the standard genetic code.
//! Bacterial annotations (NCBI table 11) share the amino-acid assignments
//! of table 1, so one table serves both.
//!
//! # Conventions
//! - Codons with ambiguous bases (N, R, Y, ...) translate to `X`
//! - A trailing partial codon is dropped and reported back to the caller
//! - A single terminal stop codon is removed, internal stops stay as `*`

use rustc_hash::FxHashMap;
use std::sync::LazyLock;

// ============================================================================
// Codon Table
// ============================================================================

/// Standard genetic code codon table.
static CODON_TABLE: LazyLock<FxHashMap<[u8; 3], char>> = LazyLock::new(|| {
    let mut table = FxHashMap::default();
    let mut add = |codons: &[&[u8; 3]], aa: char| {
        for codon in codons {
            table.insert(**codon, aa);
        }
    };
    add(&[b"TTT", b"TTC"], 'F');
    add(&[b"TTA", b"TTG", b"CTT", b"CTC", b"CTA", b"CTG"], 'L');
    add(&[b"ATT", b"ATC", b"ATA"], 'I');
    add(&[b"ATG"], 'M');
    add(&[b"GTT", b"GTC", b"GTA", b"GTG"], 'V');
    add(&[b"TCT", b"TCC", b"TCA", b"TCG", b"AGT", b"AGC"], 'S');
    add(&[b"CCT", b"CCC", b"CCA", b"CCG"], 'P');
    add(&[b"ACT", b"ACC", b"ACA", b"ACG"], 'T');
    add(&[b"GCT", b"GCC", b"GCA", b"GCG"], 'A');
    add(&[b"TAT", b"TAC"], 'Y');
    add(&[b"TAA", b"TAG", b"TGA"], '*');
    add(&[b"CAT", b"CAC"], 'H');
    add(&[b"CAA", b"CAG"], 'Q');
    add(&[b"AAT", b"AAC"], 'N');
    add(&[b"AAA", b"AAG"], 'K');
    add(&[b"GAT", b"GAC"], 'D');
    add(&[b"GAA", b"GAG"], 'E');
    add(&[b"TGT", b"TGC"], 'C');
    add(&[b"TGG"], 'W');
    add(&[b"CGT", b"CGC", b"CGA", b"CGG", b"AGA", b"AGG"], 'R');
    add(&[b"GGT", b"GGC", b"GGA", b"GGG"], 'G');
    table
});

/// Translates a codon (3 nucleotides) to amino acid.
///
/// Case-insensitive; `U` is read as `T`. Returns `None` for anything that is
/// not an unambiguous codon.
pub fn translate_codon(codon: &[u8]) -> Option<char> {
    if codon.len() != 3 {
        return None;
    }
    let mut key = [0u8; 3];
    for (slot, base) in key.iter_mut().zip(codon) {
        *slot = match base.to_ascii_uppercase() {
            b'U' => b'T',
            other => other,
        };
    }
    CODON_TABLE.get(&key).copied()
}

// ============================================================================
// Translation
// ============================================================================

/// Protein translated from a coding sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    /// Amino-acid sequence, terminal stop removed.
    pub protein: String,
    /// Number of nucleotides left over after the last complete codon.
    pub trailing_bases: usize,
}

/// Translates a coding sequence in the frame given by `codon_start` (1-based,
/// as in the GenBank qualifier).
pub fn translate(dna: &[u8], codon_start: usize) -> Translation {
    let offset = codon_start.saturating_sub(1).min(dna.len());
    let frame = &dna[offset..];

    let codons = frame.chunks_exact(3);
    let trailing_bases = codons.remainder().len();
    let mut protein: String = codons
        .map(|codon| translate_codon(codon).unwrap_or('X'))
        .collect();

    if protein.ends_with('*') {
        protein.pop();
    }

    Translation { protein, trailing_bases }
}

/// Reverse complement of a nucleotide sequence (IUPAC aware, case preserving).
pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&b| complement(b)).collect()
}

fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T', b'a' => b't',
        b'T' | b'U' => b'A', b't' | b'u' => b'a',
        b'G' => b'C', b'g' => b'c',
        b'C' => b'G', b'c' => b'g',
        b'R' => b'Y', b'r' => b'y',
        b'Y' => b'R', b'y' => b'r',
        b'K' => b'M', b'k' => b'm',
        b'M' => b'K', b'm' => b'k',
        b'B' => b'V', b'b' => b'v',
        b'V' => b'B', b'v' => b'b',
        b'D' => b'H', b'd' => b'h',
        b'H' => b'D', b'h' => b'd',
        other => other,
    }
}
