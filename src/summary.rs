use crate::interval::GenomicInterval;
use crate::pairing::LtrPair;
use crate::presence::PresenceRecord;
use crate::repeats::RepeatFeature;
use crate::species::{SpeciesInfo, SpeciesRanking};
use rustc_hash::{FxHashMap, FxHashSet};
use std::io::{self, Write};

const NA: &str = "NA";
/// Written in place of a species when only the reference carries the insertion
pub const REFERENCE_ONLY: &str = "reference_only";

fn fraction(value: Option<f64>) -> String {
    value.map_or_else(|| NA.to_string(), |v| format!("{:.3}", v))
}

/// One ERV insertion: pair similarity joined with the presence of both LTRs
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub locus_id: String,
    pub interval: GenomicInterval,
    pub family: String,
    pub similarity: Option<f64>,
    pub most_distant: Option<SpeciesInfo>,
    /// Species with presence at either LTR, closest first
    pub present_species: Vec<String>,
    pub left_id: String,
    pub right_id: String,
}

pub fn summarize(
    pairs: &[LtrPair],
    presence: &[PresenceRecord],
    ranking: &SpeciesRanking,
) -> Vec<SummaryRow> {
    let mut present_at: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
    for record in presence.iter().filter(|r| r.covered) {
        present_at
            .entry(record.locus_id.as_str())
            .or_default()
            .push(record.species.as_str());
    }

    pairs
        .iter()
        .map(|pair| {
            let left_id = pair.left.locus_id();
            let right_id = pair.right.locus_id();
            let species: FxHashSet<&str> = [left_id.as_str(), right_id.as_str()]
                .iter()
                .filter_map(|id| present_at.get(id))
                .flatten()
                .copied()
                .collect();

            let mut present_species: Vec<String> = ranking
                .iter()
                .filter(|s| species.contains(s.id.as_str()))
                .map(|s| s.id.clone())
                .collect();
            // unranked species go last, in natural order
            let mut unranked: Vec<&str> = species
                .iter()
                .copied()
                .filter(|s| !ranking.contains(s))
                .collect();
            unranked.sort_by(|a, b| natord::compare(a, b));
            present_species.extend(unranked.into_iter().map(str::to_string));

            SummaryRow {
                locus_id: pair.locus_id(),
                interval: pair.interval(),
                family: pair.left.name.clone(),
                similarity: pair.similarity,
                most_distant: ranking.most_distant(species.iter().copied()).cloned(),
                present_species,
                left_id,
                right_id,
            }
        })
        .collect()
}

pub fn write_pairs<W: Write>(out: &mut W, pairs: &[LtrPair]) -> io::Result<()> {
    writeln!(
        out,
        "locus_id\tchrom\tleft_start\tleft_end\tright_start\tright_end\tstrand\tfamily\tleft_len\tright_len\tgap_len\tsimilarity\tleft_id\tright_id"
    )?;
    for pair in pairs {
        let (left, right) = (&pair.left.interval, &pair.right.interval);
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            pair.locus_id(),
            left.chrom,
            left.start,
            left.end,
            right.start,
            right.end,
            pair.interval().strand,
            pair.left.name,
            left.len(),
            right.len(),
            pair.gap_len,
            fraction(pair.similarity),
            pair.left.locus_id(),
            pair.right.locus_id()
        )?;
    }
    Ok(())
}

pub fn write_solos<W: Write>(out: &mut W, solos: &[RepeatFeature]) -> io::Result<()> {
    writeln!(out, "feature_id\tchrom\tstart\tend\tstrand\tfamily")?;
    for feature in solos {
        let iv = &feature.interval;
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}",
            feature.locus_id(),
            iv.chrom,
            iv.start,
            iv.end,
            iv.strand,
            feature.name
        )?;
    }
    Ok(())
}

pub fn write_presence<W: Write>(out: &mut W, records: &[PresenceRecord]) -> io::Result<()> {
    writeln!(
        out,
        "locus_id\tchrom\tstart\tend\tspecies\taligned_bases\tlocus_len\tcoverage\tcovered\tidentity"
    )?;
    for r in records {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{:.3}\t{}\t{}",
            r.locus_id,
            r.interval.chrom,
            r.interval.start,
            r.interval.end,
            r.species,
            r.aligned_bases,
            r.locus_len,
            r.coverage,
            r.covered,
            fraction(r.identity)
        )?;
    }
    Ok(())
}

pub fn write_summary<W: Write>(out: &mut W, rows: &[SummaryRow]) -> io::Result<()> {
    writeln!(
        out,
        "locus_id\tchrom\tstart\tend\tfamily\tsimilarity\tmost_distant_species\tmost_distant_name\tmost_distant_rank\tmost_distant_mya\tpresent_count\tpresent_species\tleft_id\tright_id"
    )?;
    for row in rows {
        let (species, name, rank, mya) = match &row.most_distant {
            Some(s) if !s.common_name.is_empty() => {
                (s.id.as_str(), s.common_name.as_str(), s.rank, s.lca_mya)
            }
            Some(s) => (s.id.as_str(), NA, s.rank, s.lca_mya),
            None => (REFERENCE_ONLY, NA, 0, 0.0),
        };
        let present = if row.present_species.is_empty() {
            NA.to_string()
        } else {
            row.present_species.join(",")
        };
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            row.locus_id,
            row.interval.chrom,
            row.interval.start,
            row.interval.end,
            row.family,
            fraction(row.similarity),
            species,
            name,
            rank,
            mya,
            row.present_species.len(),
            present,
            row.left_id,
            row.right_id
        )?;
    }
    Ok(())
}
