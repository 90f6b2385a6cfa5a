//! Tabular Hit Filtering Module
//!
//! Parses DIAMOND tabular output (`--outfmt 6`) restricted to five columns,
//! keeps hits at or above a percent-identity threshold and groups them by
//! query protein.
//!
//! # Columns
//! ```text
//! Col  Type    Description
//! 1    string  Query sequence id (qseqid)
//! 2    string  Reference sequence id (sseqid)
//! 3    float   Percent identity (pident)
//! 4    float   Expect value (evalue)
//! 5    float   Bit score (bitscore)
//! ```
//!
//! # Example Usage
//! ```
//! use match_ids::matches::find_matches;
//!
//! let output = "Q1\tR1\t95.5\t1e-10\t120.3\nQ1\tR2\t42.0\t0.5\t30.1\n";
//! let mut diagnostics = Vec::new();
//! let matches = find_matches(output, 90.0, &mut diagnostics).unwrap();
//! assert_eq!(matches.get("Q1").unwrap().len(), 1);
//! ```

use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use std::io::Write;

/// Prefix of the diagnostic written for every unusable line.
pub const DIAGNOSTIC_PREFIX: &str = "failed to split";

/// Number of tab-separated fields in a hit line.
pub const FIELD_COUNT: usize = 5;

// ============================================================================
// Tabular Record
// ============================================================================

/// One parsed line of tabular output.
#[derive(Debug, Clone, PartialEq)]
pub struct TabularRecord {
    pub query_id: String,
    pub reference_id: String,
    pub pident: f64,
    pub evalue: f64,
    pub bitscore: f64,
}

impl TabularRecord {
    /// Parses a tab-separated line.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The line does not have exactly 5 fields
    /// - Any numeric field cannot be parsed
    pub fn parse_line(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != FIELD_COUNT {
            anyhow::bail!("expected {} fields, found {}", FIELD_COUNT, fields.len());
        }

        Ok(Self {
            query_id: fields[0].to_string(),
            reference_id: fields[1].to_string(),
            pident: parse_float(fields[2]).context("Invalid percent identity")?,
            evalue: parse_float(fields[3]).context("Invalid e-value")?,
            bitscore: parse_float(fields[4]).context("Invalid bit score")?,
        })
    }

    fn into_match(self) -> (String, Match) {
        let hit = Match {
            reference_id: self.reference_id,
            pident: self.pident,
            evalue: self.evalue,
            bitscore: self.bitscore,
        };
        (self.query_id, hit)
    }
}

fn parse_float(field: &str) -> Result<f64> {
    field
        .trim()
        .parse::<f64>()
        .with_context(|| format!("'{}' is not a number", field))
}

// ============================================================================
// Matches
// ============================================================================

/// A reference protein hit for one query protein.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub reference_id: String,
    pub pident: f64,
    pub evalue: f64,
    pub bitscore: f64,
}

impl Match {
    /// Report columns: reference id, identity (1 decimal), e-value (shortest
    /// form), bit score (1 decimal).
    pub fn to_table(&self) -> [String; 4] {
        [
            self.reference_id.clone(),
            one_decimal(self.pident),
            shortest_repr(self.evalue),
            one_decimal(self.bitscore),
        ]
    }
}

/// Matches grouped by query id.
///
/// Query ids iterate in the order they were first seen; matches keep the
/// order they were added in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchCollection {
    groups: Vec<(String, Vec<Match>)>,
    index: FxHashMap<String, usize>,
}

impl MatchCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a match, opening a new group on first sight of `query_id`.
    pub fn push(&mut self, query_id: String, hit: Match) {
        match self.index.get(&query_id) {
            Some(&slot) => self.groups[slot].1.push(hit),
            None => {
                self.index.insert(query_id.clone(), self.groups.len());
                self.groups.push((query_id, vec![hit]));
            }
        }
    }

    pub fn get(&self, query_id: &str) -> Option<&[Match]> {
        self.index.get(query_id).map(|&slot| self.groups[slot].1.as_slice())
    }

    /// Number of distinct query ids.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of matches across all query ids.
    pub fn total_matches(&self) -> usize {
        self.groups.iter().map(|(_, hits)| hits.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Match])> {
        self.groups.iter().map(|(qid, hits)| (qid.as_str(), hits.as_slice()))
    }
}

/// Filters tabular output down to hits with `pident >= similarity`.
///
/// Lines are split with [`split_lines`]. Lines that do not split into five
/// fields, or whose numeric fields do not parse, are skipped; each one is
/// reported on `diagnostics` as `failed to split <line>`.
pub fn find_matches<W: Write>(output: &str, similarity: f64, diagnostics: &mut W) -> Result<MatchCollection> {
    let mut matches = MatchCollection::new();
    let mut below_threshold = 0usize;
    let mut malformed = 0usize;

    for line in split_lines(output) {
        match TabularRecord::parse_line(line) {
            Ok(record) if record.pident >= similarity => {
                let (query_id, hit) = record.into_match();
                matches.push(query_id, hit);
            }
            Ok(_) => below_threshold += 1,
            Err(e) => {
                malformed += 1;
                log::debug!("Skipping line {:?}: {:#}", line, e);
                writeln!(diagnostics, "{} {}", DIAGNOSTIC_PREFIX, line)
                    .context("Failed to write diagnostic")?;
            }
        }
    }

    log::info!(
        "{} matches for {} query proteins ({} below {}% identity, {} malformed lines)",
        matches.total_matches(),
        matches.len(),
        below_threshold,
        similarity,
        malformed
    );

    Ok(matches)
}

/// Writes one `query, reference, pident, evalue, bitscore` line per match.
pub fn write_report<W: Write>(matches: &MatchCollection, out: &mut W) -> Result<()> {
    for (query_id, hits) in matches.iter() {
        for hit in hits {
            let [reference_id, pident, evalue, bitscore] = hit.to_table();
            writeln!(out, "{}\t{}\t{}\t{}\t{}", query_id, reference_id, pident, evalue, bitscore)?;
        }
    }
    out.flush()?;
    Ok(())
}

/// Splits text at every line boundary: `\n`, `\r\n`, a lone `\r`, vertical
/// tab, form feed, the `\x1c`..`\x1e` separators, NEL, U+2028 and U+2029.
/// A trailing boundary does not produce an empty last line.
pub fn split_lines(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '\r' => {
                if let Some((_, '\n')) = chars.peek() {
                    chars.next();
                }
            }
            '\n' | '\x0b' | '\x0c' | '\x1c' | '\x1d' | '\x1e' | '\u{85}' | '\u{2028}' | '\u{2029}' => {}
            _ => continue,
        }
        lines.push(&text[start..i]);
        start = chars.peek().map_or(text.len(), |&(j, _)| j);
    }

    if start < text.len() {
        lines.push(&text[start..]);
    }
    lines
}

/// Fixed one-decimal text; NaN prints as `nan` like the other non-finite values.
fn one_decimal(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else {
        format!("{:.1}", value)
    }
}

/// Shortest round-trip text for a float.
///
/// Scientific notation below 1e-4 and from 1e16 up, with a signed exponent of
/// at least two digits (`1e-10`, `5e-05`, `1e+16`). Plain decimal otherwise,
/// always with a fractional part (`0.0`, `0.003`).
pub fn shortest_repr(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return (if value > 0.0 { "inf" } else { "-inf" }).to_string();
    }
    if value == 0.0 {
        return (if value.is_sign_negative() { "-0.0" } else { "0.0" }).to_string();
    }

    let scientific = format!("{:e}", value);
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if (-4..16).contains(&exponent) {
        let fixed = value.to_string();
        if fixed.contains('.') {
            fixed
        } else {
            format!("{}.0", fixed)
        }
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    }
}
