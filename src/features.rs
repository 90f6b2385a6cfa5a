//! Coding Feature Module
//!
//! Collects the CDS features of GenBank records together with their locus
//! tags and translated protein sequences.

use anyhow::{Context, Result};

use crate::genbank::{Feature, GenbankRecord};
use crate::translate::translate;

/// Feature key of protein-coding features.
pub const CODING_FEATURE: &str = "CDS";

/// A CDS feature resolved to its sequences.
#[derive(Debug, Clone)]
pub struct CodingFeature {
    /// First `/locus_tag` value.
    pub locus_tag: String,
    /// Amino-acid translation of the feature's nucleotides.
    pub protein: String,
}

/// Finds all CDS features across `records`, in file order.
///
/// # Errors
/// Fails if a feature has no `locus_tag` qualifier or its location does not
/// fit the record sequence.
pub fn find_coding_features(records: &[GenbankRecord]) -> Result<Vec<CodingFeature>> {
    let mut coding = Vec::new();

    for record in records {
        for feature in record.features.iter().filter(|f| f.kind == CODING_FEATURE) {
            coding.push(resolve(record, feature)?);
        }
    }

    Ok(coding)
}

fn resolve(record: &GenbankRecord, feature: &Feature) -> Result<CodingFeature> {
    let locus_tag = feature.first_qualifier("locus_tag").ok_or_else(|| {
        anyhow::anyhow!(
            "CDS at {} in record '{}' has no locus_tag qualifier",
            feature.location,
            record.name
        )
    })?;

    let dna = feature
        .location
        .extract(&record.sequence)
        .with_context(|| format!("Failed to extract CDS {} from record '{}'", locus_tag, record.name))?;

    let codon_start = feature
        .first_qualifier("codon_start")
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|v| (1..=3).contains(v))
        .unwrap_or(1);

    let translation = translate(&dna, codon_start);
    if translation.trailing_bases > 0 {
        log::debug!(
            "{}: partial codon ({} trailing bases) dropped from translation",
            locus_tag,
            translation.trailing_bases
        );
    }

    log::debug!(
        "{} ({} strand, {} nt) -> {} aa",
        locus_tag,
        feature.location.strand(),
        dna.len(),
        translation.protein.len()
    );

    Ok(CodingFeature {
        locus_tag: locus_tag.to_string(),
        protein: translation.protein,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genbank::Location;

    fn feature(kind: &str, location: &str, qualifiers: &[(&str, &str)]) -> Feature {
        Feature {
            kind: kind.to_string(),
            location: Location::parse(location).unwrap(),
            qualifiers: qualifiers
                .iter()
                .map(|(k, v)| (k.to_string(), Some(v.to_string())))
                .collect(),
        }
    }

    fn record(features: Vec<Feature>) -> GenbankRecord {
        GenbankRecord {
            name: "rec".to_string(),
            // ATG AAA CCC TAA | TTA GGG TTT CAT (revcomp: ATG AAA CCC TAA)
            sequence: b"ATGAAACCCTAATTAGGGTTTCAT".to_vec(),
            features,
        }
    }

    #[test]
    fn test_find_coding_features() {
        let rec = record(vec![
            feature("gene", "1..12", &[("locus_tag", "g1")]),
            feature("CDS", "1..12", &[("locus_tag", "g1")]),
            feature("CDS", "complement(13..24)", &[("locus_tag", "g2")]),
        ]);

        let coding = find_coding_features(&[rec]).unwrap();
        assert_eq!(coding.len(), 2, "only CDS features are exported");

        assert_eq!(coding[0].locus_tag, "g1");
        assert_eq!(coding[0].protein, "MKP");

        assert_eq!(coding[1].locus_tag, "g2");
        assert_eq!(coding[1].protein, "MKP");
    }

    #[test]
    fn test_first_locus_tag_wins() {
        let rec = record(vec![feature(
            "CDS",
            "1..12",
            &[("locus_tag", "first"), ("locus_tag", "second")],
        )]);
        let coding = find_coding_features(&[rec]).unwrap();
        assert_eq!(coding[0].locus_tag, "first");
    }

    #[test]
    fn test_codon_start() {
        let rec = record(vec![feature(
            "CDS",
            "<3..12",
            &[("locus_tag", "g1"), ("codon_start", "2")],
        )]);
        let coding = find_coding_features(&[rec]).unwrap();
        // GAAACCCTAA read from its 2nd base: AAA CCC TAA
        assert_eq!(coding[0].protein, "KP");
    }

    #[test]
    fn test_missing_locus_tag() {
        let rec = record(vec![feature("CDS", "1..12", &[("product", "x")])]);
        let err = find_coding_features(&[rec]).unwrap_err();
        assert!(err.to_string().contains("locus_tag"));
    }

    #[test]
    fn test_location_out_of_range() {
        let rec = record(vec![feature("CDS", "1..30", &[("locus_tag", "g1")])]);
        assert!(find_coding_features(&[rec]).is_err());
    }
}
