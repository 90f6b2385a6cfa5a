//! GenBank Flat File Module
//!
//! Minimal reader for annotated GenBank records, covering what protein export
//! needs: the LOCUS name, the feature table and the ORIGIN sequence.
//! Plain and gzip-compressed files are supported.
//!
//! # Record Layout
//! ```text
//! LOCUS       NC_000913   4641652 bp    DNA     circular BCT 09-MAR-2022
//! ...
//! FEATURES             Location/Qualifiers
//!      CDS             complement(190..255)
//!                      /locus_tag="b0001"
//!                      /translation="MKRISTTITTTITITTGNGAG"
//! ORIGIN
//!         1 agcttttcat tctgactgca acgggcaata tgtctctgtg
//! //
//! ```
//! Feature keys start at column 6, locations and qualifiers at column 22.
//!
//! # Example Usage
//! ```no_run
//! use match_ids::genbank::GenbankFile;
//!
//! let mut reader = GenbankFile::open("genome.gbk").unwrap();
//! while let Some(record) = reader.read_next().unwrap() {
//!     println!("{}: {} features", record.name, record.features.len());
//! }
//! ```

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::features::CODING_FEATURE;
use crate::translate::reverse_complement;

// ============================================================================
// Locations
// ============================================================================

/// A feature location.
///
/// Coordinates are 0-based and half-open; GenBank text is 1-based inclusive.
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    /// Contiguous span, `<` / `>` markers recorded as partial ends.
    Range {
        start: usize,
        end: usize,
        partial_start: bool,
        partial_end: bool,
    },
    /// Site between two bases (`a^b`), stored as the left base.
    Between(usize),
    /// Reverse strand of the inner location.
    Complement(Box<Location>),
    /// `join(...)` or `order(...)`, parts kept in written order.
    Join(Vec<Location>),
}

impl Location {
    /// Parses a GenBank location string. Whitespace is ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let mut parser = LocationParser { text: &compact, pos: 0 };
        let location = parser.parse_location()?;
        if parser.pos != compact.len() {
            anyhow::bail!("Unexpected text '{}' in location '{}'", parser.rest(), compact);
        }
        Ok(location)
    }

    /// Extracts the nucleotides covered by this location.
    pub fn extract(&self, sequence: &[u8]) -> Result<Vec<u8>> {
        match self {
            Location::Range { start, end, .. } => {
                if *end > sequence.len() {
                    anyhow::bail!(
                        "Location {}..{} exceeds sequence length {}",
                        start + 1,
                        end,
                        sequence.len()
                    );
                }
                Ok(sequence[*start..*end].to_vec())
            }
            Location::Between(_) => Ok(Vec::new()),
            Location::Complement(inner) => Ok(reverse_complement(&inner.extract(sequence)?)),
            Location::Join(parts) => {
                let mut joined = Vec::new();
                for part in parts {
                    joined.extend(part.extract(sequence)?);
                }
                Ok(joined)
            }
        }
    }

    /// Strand of the location: '-' if every part is complemented.
    pub fn strand(&self) -> char {
        match self {
            Location::Complement(_) => '-',
            Location::Join(parts) if !parts.is_empty() && parts.iter().all(|p| p.strand() == '-') => '-',
            _ => '+',
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Range { start, end, partial_start, partial_end } => {
                let lt = if *partial_start { "<" } else { "" };
                if end - start == 1 && partial_start == partial_end {
                    write!(f, "{}{}", lt, end)
                } else {
                    let gt = if *partial_end { ">" } else { "" };
                    write!(f, "{}{}..{}{}", lt, start + 1, gt, end)
                }
            }
            Location::Between(pos) => write!(f, "{}^{}", pos, pos + 1),
            Location::Complement(inner) => write!(f, "complement({})", inner),
            Location::Join(parts) => {
                write!(f, "join(")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", part)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Recursive descent over a whitespace-free location string.
struct LocationParser<'a> {
    text: &'a str,
    pos: usize,
}

impl LocationParser<'_> {
    fn rest(&self) -> &str {
        &self.text[self.pos..]
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> Result<()> {
        if !self.eat(token) {
            anyhow::bail!("Expected '{}' at '{}' in location '{}'", token, self.rest(), self.text);
        }
        Ok(())
    }

    fn parse_location(&mut self) -> Result<Location> {
        if self.eat("complement(") {
            let inner = self.parse_location()?;
            self.expect(")")?;
            return Ok(Location::Complement(Box::new(inner)));
        }
        if self.eat("join(") || self.eat("order(") {
            let mut parts = vec![self.parse_location()?];
            while self.eat(",") {
                parts.push(self.parse_location()?);
            }
            self.expect(")")?;
            return Ok(Location::Join(parts));
        }
        self.parse_span()
    }

    fn parse_position(&mut self) -> Result<(usize, bool)> {
        let partial = self.eat("<") || self.eat(">");
        let digits = self.rest().bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            anyhow::bail!("Expected a position at '{}' in location '{}'", self.rest(), self.text);
        }
        let value: usize = self.rest()[..digits]
            .parse()
            .with_context(|| format!("Invalid position in location '{}'", self.text))?;
        self.pos += digits;
        Ok((value, partial))
    }

    fn parse_span(&mut self) -> Result<Location> {
        let (first, partial_start) = self.parse_position()?;
        if first == 0 {
            anyhow::bail!("Positions are 1-based, found 0 in location '{}'", self.text);
        }

        if self.eat("..") {
            let (last, partial_end) = self.parse_position()?;
            if last < first {
                anyhow::bail!("Span {}..{} runs backwards in location '{}'", first, last, self.text);
            }
            Ok(Location::Range { start: first - 1, end: last, partial_start, partial_end })
        } else if self.eat("^") {
            self.parse_position()?;
            Ok(Location::Between(first))
        } else {
            Ok(Location::Range {
                start: first - 1,
                end: first,
                partial_start,
                partial_end: partial_start,
            })
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// A feature from the FEATURES table.
#[derive(Debug, Clone)]
pub struct Feature {
    /// Feature key, e.g. `CDS` or `gene`.
    pub kind: String,
    pub location: Location,
    /// Qualifiers in file order; bare flags such as `/pseudo` have no value.
    pub qualifiers: Vec<(String, Option<String>)>,
}

impl Feature {
    /// First value of a qualifier.
    pub fn first_qualifier(&self, key: &str) -> Option<&str> {
        self.qualifiers
            .iter()
            .filter(|(k, _)| k == key)
            .find_map(|(_, v)| v.as_deref())
    }
}

/// One annotated sequence record (LOCUS to `//`).
#[derive(Debug, Clone)]
pub struct GenbankRecord {
    /// LOCUS name.
    pub name: String,
    /// Uppercase nucleotide sequence from the ORIGIN block.
    pub sequence: Vec<u8>,
    pub features: Vec<Feature>,
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Header,
    Features,
    Origin,
}

/// Column where locations and qualifiers start.
const QUALIFIER_COLUMN: usize = 21;
/// Column where feature keys start.
const KEY_COLUMN: usize = 5;

/// Feature under construction while its lines are being read.
struct PendingFeature {
    kind: String,
    location: String,
    qualifiers: Vec<(String, Option<String>)>,
    open_quote: bool,
    line_no: usize,
}

impl PendingFeature {
    fn new(kind: &str, location: &str, line_no: usize) -> Self {
        Self {
            kind: kind.to_string(),
            location: location.to_string(),
            qualifiers: Vec::new(),
            open_quote: false,
            line_no,
        }
    }

    fn push_line(&mut self, content: &str) {
        if self.open_quote {
            self.continue_value(content);
            return;
        }
        if let Some(qualifier) = content.strip_prefix('/') {
            let (key, value) = match qualifier.split_once('=') {
                Some((k, v)) => (k.to_string(), Some(v.to_string())),
                None => (qualifier.to_string(), None),
            };
            self.open_quote = value
                .as_deref()
                .and_then(|v| v.strip_prefix('"'))
                .is_some_and(|after| !quote_closed(after));
            self.qualifiers.push((key, value));
        } else if self.qualifiers.is_empty() {
            self.location.push_str(content);
        } else {
            self.continue_value(content);
        }
    }

    fn continue_value(&mut self, content: &str) {
        let Some((key, value)) = self.qualifiers.last_mut() else {
            return;
        };
        let value = value.get_or_insert_with(String::new);
        if key.as_str() != "translation" && !value.is_empty() {
            value.push(' ');
        }
        value.push_str(content);
        if let Some(after) = value.strip_prefix('"') {
            self.open_quote = !quote_closed(after);
        }
    }

    /// Builds the feature. Non-coding features with a location this reader
    /// cannot resolve (e.g. remote `ACC:1..10`) are dropped with a warning.
    fn finish(self, source: &str) -> Result<Option<Feature>> {
        let location = match Location::parse(&self.location) {
            Ok(location) => location,
            Err(e) if self.kind != CODING_FEATURE => {
                log::warn!("{}:{}: skipping {} feature: {:#}", source, self.line_no, self.kind, e);
                return Ok(None);
            }
            Err(e) => {
                return Err(e.context(format!("{}:{}: invalid {} location", source, self.line_no, self.kind)))
            }
        };
        let qualifiers = self
            .qualifiers
            .into_iter()
            .map(|(key, value)| (key, value.map(|v| unquote(&v))))
            .collect();
        Ok(Some(Feature { kind: self.kind, location, qualifiers }))
    }
}

/// True if the text following an opening quote contains its closing quote.
fn quote_closed(after_open: &str) -> bool {
    after_open.replace("\"\"", "").ends_with('"')
}

fn unquote(value: &str) -> String {
    match value.strip_prefix('"') {
        Some(inner) => inner.strip_suffix('"').unwrap_or(inner).replace("\"\"", "\""),
        None => value.to_string(),
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Sequential reader for GenBank files over any Read source.
pub struct GenbankReader<R: Read> {
    reader: BufReader<R>,
    source: String,
    line_no: usize,
}

impl<R: Read> GenbankReader<R> {
    /// Wraps a reader; `source` names it in error messages.
    pub fn new(reader: R, source: &str) -> Self {
        Self {
            reader: BufReader::with_capacity(1024 * 1024, reader),
            source: source.to_string(),
            line_no: 0,
        }
    }

    /// Reads the next record.
    ///
    /// # Returns
    /// - `Ok(Some(record))` - Successfully read a record
    /// - `Ok(None)` - End of file reached
    /// - `Err(e)` - I/O or format error
    pub fn read_next(&mut self) -> Result<Option<GenbankRecord>> {
        let mut line = String::with_capacity(128);
        let mut name: Option<String> = None;
        let mut sequence = Vec::new();
        let mut features = Vec::new();
        let mut pending: Option<PendingFeature> = None;
        let mut section = Section::Header;

        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                return match name {
                    None => Ok(None),
                    Some(name) => anyhow::bail!(
                        "{}: unexpected end of file in record '{}' (missing '//')",
                        self.source,
                        name
                    ),
                };
            }
            self.line_no += 1;
            let text = line.trim_end_matches(['\n', '\r']);
            if text.trim().is_empty() {
                continue;
            }

            if name.is_none() {
                if text.starts_with("LOCUS") {
                    name = Some(text.split_whitespace().nth(1).unwrap_or("").to_string());
                    continue;
                }
                anyhow::bail!("{}:{}: expected LOCUS line, found '{}'", self.source, self.line_no, text);
            }

            if text.starts_with("//") {
                if let Some(feature) = pending.take() {
                    features.extend(feature.finish(&self.source)?);
                }
                return Ok(Some(GenbankRecord {
                    name: name.unwrap_or_default(),
                    sequence,
                    features,
                }));
            }

            if !text.starts_with(' ') {
                if let Some(feature) = pending.take() {
                    features.extend(feature.finish(&self.source)?);
                }
                section = if text.starts_with("FEATURES") {
                    Section::Features
                } else if text.starts_with("ORIGIN") {
                    Section::Origin
                } else {
                    Section::Header
                };
                continue;
            }

            match section {
                Section::Header => {}
                Section::Origin => sequence.extend(
                    text.bytes()
                        .filter(u8::is_ascii_alphabetic)
                        .map(|b| b.to_ascii_uppercase()),
                ),
                Section::Features => {
                    let indent = text.len() - text.trim_start().len();
                    if indent < QUALIFIER_COLUMN {
                        if indent != KEY_COLUMN {
                            log::debug!("{}:{}: feature key at column {}", self.source, self.line_no, indent + 1);
                        }
                        if let Some(feature) = pending.take() {
                            features.extend(feature.finish(&self.source)?);
                        }
                        let body = text.trim();
                        let (kind, location) = match body.split_once(char::is_whitespace) {
                            Some((kind, rest)) => (kind, rest.trim()),
                            None => (body, ""),
                        };
                        pending = Some(PendingFeature::new(kind, location, self.line_no));
                    } else {
                        match pending.as_mut() {
                            Some(feature) => feature.push_line(text.trim()),
                            None => anyhow::bail!(
                                "{}:{}: qualifier line outside of a feature",
                                self.source,
                                self.line_no
                            ),
                        }
                    }
                }
            }
        }
    }
}

impl<R: Read> Iterator for GenbankReader<R> {
    type Item = Result<GenbankRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().transpose()
    }
}

impl GenbankReader<File> {
    /// Opens a plain GenBank file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())
            .with_context(|| format!("Failed to open GenBank: {}", path.as_ref().display()))?;
        Ok(Self::new(file, &path.as_ref().display().to_string()))
    }
}

impl GenbankReader<MultiGzDecoder<File>> {
    /// Opens a gzip-compressed GenBank file.
    pub fn open_gz<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())
            .with_context(|| format!("Failed to open GenBank.gz: {}", path.as_ref().display()))?;
        Ok(Self::new(MultiGzDecoder::new(file), &path.as_ref().display().to_string()))
    }
}

/// Auto-detecting GenBank file reader.
///
/// Files ending in `.gz` are treated as gzip-compressed.
pub enum GenbankFile {
    Plain(GenbankReader<File>),
    Gzipped(GenbankReader<MultiGzDecoder<File>>),
}

impl GenbankFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        if ext == "gz" {
            Ok(GenbankFile::Gzipped(GenbankReader::open_gz(path)?))
        } else {
            Ok(GenbankFile::Plain(GenbankReader::open(path)?))
        }
    }

    pub fn read_next(&mut self) -> Result<Option<GenbankRecord>> {
        match self {
            GenbankFile::Plain(r) => r.read_next(),
            GenbankFile::Gzipped(r) => r.read_next(),
        }
    }
}

/// Reads every record of a GenBank file. An empty file is an error.
pub fn read_records<P: AsRef<Path>>(path: P) -> Result<Vec<GenbankRecord>> {
    let path = path.as_ref();
    let mut reader = GenbankFile::open(path)?;
    let mut records = Vec::new();
    while let Some(record) = reader.read_next()? {
        records.push(record);
    }
    if records.is_empty() {
        anyhow::bail!("No GenBank records found in {}", path.display());
    }
    Ok(records)
}
