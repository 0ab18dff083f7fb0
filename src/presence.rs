//! Cross-species presence: how much of each LTR locus other species align to,
//! and how similar their aligned bases are to the reference.

use crate::interval::{normalize_chrom, to_tree_range, GenomicInterval};
use crate::maf::{is_gap, AlignmentBlock};
use crate::similarity::is_ambiguous;
use coitrees::{BasicCOITree, Interval, IntervalTree};
use log::{debug, warn};
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct PresenceRecord {
    pub locus_id: String,
    pub interval: GenomicInterval,
    pub species: String,
    /// Reference positions of the locus with a non-gap base in this species
    pub aligned_bases: u64,
    pub locus_len: u64,
    pub coverage: f64,
    pub covered: bool,
    /// Defined only for covered loci with at least one comparable column
    pub identity: Option<f64>,
}

/// Per (locus, species) accumulator; each reference position counts once even
/// when several blocks or components cover it
struct Tally {
    seen: Vec<bool>,
    aligned: u64,
    compared: u64,
    matches: u64,
}

impl Tally {
    fn new(len: u64) -> Self {
        Self {
            seen: vec![false; len as usize],
            aligned: 0,
            compared: 0,
            matches: 0,
        }
    }

    fn observe(&mut self, offset: usize, reference: u8, base: u8) {
        if self.seen[offset] {
            return;
        }
        self.seen[offset] = true;
        self.aligned += 1;
        if !is_ambiguous(reference) && !is_ambiguous(base) {
            self.compared += 1;
            if reference.eq_ignore_ascii_case(&base) {
                self.matches += 1;
            }
        }
    }
}

#[derive(Debug, Default)]
struct PresenceStats {
    blocks: usize,
    /// Blocks overlapping at least one locus
    informative_blocks: usize,
}

pub struct PresenceChecker {
    loci: Vec<GenomicInterval>,
    trees: FxHashMap<String, BasicCOITree<u32, u32>>,
    species: Vec<String>,
    species_index: FxHashMap<String, usize>,
    tallies: FxHashMap<(usize, usize), Tally>,
    coverage_threshold: f64,
    stats: PresenceStats,
}

impl PresenceChecker {
    /// `species` are the target species ids, in output order. Identical loci are merged.
    pub fn new<I>(loci: I, species: &[String], coverage_threshold: f64) -> Self
    where
        I: IntoIterator<Item = GenomicInterval>,
    {
        let mut unique: Vec<GenomicInterval> = Vec::new();
        let mut seen: FxHashMap<(String, u64, u64), usize> = FxHashMap::default();
        for locus in loci {
            let key = (
                normalize_chrom(&locus.chrom).to_string(),
                locus.start,
                locus.end,
            );
            seen.entry(key).or_insert_with(|| {
                unique.push(locus);
                unique.len() - 1
            });
        }
        unique.sort_by(|a, b| {
            natord::compare(normalize_chrom(&a.chrom), normalize_chrom(&b.chrom))
                .then(a.start.cmp(&b.start))
                .then(a.end.cmp(&b.end))
        });

        let mut by_chrom: FxHashMap<String, Vec<Interval<u32>>> = FxHashMap::default();
        for (idx, locus) in unique.iter().enumerate() {
            let Some((first, last)) = to_tree_range(locus.start, locus.end) else {
                warn!("Locus {} does not fit the index, it will be reported uncovered", locus);
                continue;
            };
            by_chrom
                .entry(normalize_chrom(&locus.chrom).to_string())
                .or_default()
                .push(Interval {
                    first,
                    last,
                    metadata: idx as u32,
                });
        }
        let trees = by_chrom
            .into_iter()
            .map(|(chrom, nodes)| (chrom, BasicCOITree::new(nodes.as_slice())))
            .collect();

        let species_index = species
            .iter()
            .enumerate()
            .map(|(idx, s)| (s.clone(), idx))
            .collect();

        Self {
            loci: unique,
            trees,
            species: species.to_vec(),
            species_index,
            tallies: FxHashMap::default(),
            coverage_threshold,
            stats: PresenceStats::default(),
        }
    }

    /// Fold one alignment block into the per-locus tallies
    pub fn observe(&mut self, block: &AlignmentBlock) {
        self.stats.blocks += 1;
        let reference_interval = block.reference_interval();
        let Some(tree) = self.trees.get(normalize_chrom(&reference_interval.chrom)) else {
            return;
        };
        let Some((first, last)) = to_tree_range(reference_interval.start, reference_interval.end)
        else {
            return;
        };
        let mut hits: Vec<usize> = Vec::new();
        tree.query(first, last, |node| hits.push(node.metadata as usize));
        if hits.is_empty() {
            return;
        }
        self.stats.informative_blocks += 1;

        let coordinates = block.reference_coordinates();
        let reference_text = &block.reference().text;
        for (component_idx, component) in block.components.iter().enumerate() {
            if component_idx == block.reference {
                continue;
            }
            let Some(&species_idx) = self.species_index.get(component.species()) else {
                continue;
            };
            for &locus_idx in &hits {
                let locus = &self.loci[locus_idx];
                let tally = self
                    .tallies
                    .entry((locus_idx, species_idx))
                    .or_insert_with(|| Tally::new(locus.end - locus.start));
                for (column, pos) in coordinates.iter().enumerate() {
                    let Some(pos) = *pos else { continue };
                    if pos < locus.start || pos >= locus.end {
                        continue;
                    }
                    let base = component.text[column];
                    if !is_gap(base) {
                        tally.observe((pos - locus.start) as usize, reference_text[column], base);
                    }
                }
            }
        }
    }

    /// One record per (locus, species); loci without any overlapping block are uncovered
    pub fn finish(self) -> Vec<PresenceRecord> {
        debug!(
            "Presence: {} of {} blocks overlapped {} loci",
            self.stats.informative_blocks,
            self.stats.blocks,
            self.loci.len()
        );
        let mut records = Vec::with_capacity(self.loci.len() * self.species.len());
        for (locus_idx, locus) in self.loci.iter().enumerate() {
            let locus_len = locus.len();
            for (species_idx, species) in self.species.iter().enumerate() {
                let (aligned, compared, matches) = self
                    .tallies
                    .get(&(locus_idx, species_idx))
                    .map_or((0, 0, 0), |t| (t.aligned, t.compared, t.matches));
                let coverage = aligned as f64 / locus_len as f64;
                let covered = coverage > self.coverage_threshold;
                let identity = if covered && compared > 0 {
                    Some(matches as f64 / compared as f64)
                } else {
                    None
                };
                records.push(PresenceRecord {
                    locus_id: locus.locus_id(),
                    interval: locus.clone(),
                    species: species.clone(),
                    aligned_bases: aligned,
                    locus_len,
                    coverage,
                    covered,
                    identity,
                });
            }
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::Strand;
    use crate::maf::MafReader;
    use std::io::Cursor;

    fn locus(start: u64, end: u64) -> GenomicInterval {
        GenomicInterval::new("chr1", start, end, Strand::Forward).unwrap()
    }

    fn blocks(text: &str) -> Vec<AlignmentBlock> {
        MafReader::new(Cursor::new(text.as_bytes().to_vec()), Some("hg38"))
            .map(|b| b.unwrap())
            .collect()
    }

    fn species() -> Vec<String> {
        vec!["panTro5".to_string(), "rheMac8".to_string()]
    }

    fn run(loci: Vec<GenomicInterval>, maf: &str, threshold: f64) -> Vec<PresenceRecord> {
        let mut checker = PresenceChecker::new(loci, &species(), threshold);
        for block in blocks(maf) {
            checker.observe(&block);
        }
        checker.finish()
    }

    #[test]
    fn test_fully_gapped_species_is_uncovered() {
        let maf = "a score=1
s hg38.chr1    1000 10 + 100000 ACGTACGTAC
s panTro5.chr1 2000  0 + 100000 ----------
s rheMac8.chr1 3000 10 + 100000 ACGTACGTAA
";
        let records = run(vec![locus(1000, 1010)], maf, 0.1);
        assert_eq!(records.len(), 2);

        let chimp = &records[0];
        assert_eq!(chimp.species, "panTro5");
        assert!(!chimp.covered);
        assert_eq!(chimp.coverage, 0.0);
        assert_eq!(chimp.identity, None);

        let macaque = &records[1];
        assert!(macaque.covered);
        assert_eq!(macaque.aligned_bases, 10);
        assert_eq!(macaque.coverage, 1.0);
        assert_eq!(macaque.identity, Some(0.9));
    }

    #[test]
    fn test_no_overlapping_block() {
        let maf = "a score=1
s hg38.chr1    5000 4 + 100000 ACGT
s panTro5.chr1 5000 4 + 100000 ACGT
";
        let records = run(vec![locus(1000, 1010), locus(1000, 1010)], maf, 0.1);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| !r.covered && r.aligned_bases == 0));
        assert!(records.iter().all(|r| r.locus_len == 10));
    }

    #[test]
    fn test_partial_coverage_across_blocks() {
        // locus 100..110; first block covers 95..105, second 105..108 with a reference gap
        let maf = "a score=1
s hg38.chr1    95 10 + 1000 AAAAACCCCC
s panTro5.chr1 10  8 + 1000 AAAAACC--C
a score=2
s hg38.chr1    105 3 + 1000 GG-G
s panTro5.chr1 20  4 + 1000 GGTN
";
        let records = run(vec![locus(100, 110)], maf, 0.5);
        let chimp = &records[0];
        // columns 100..105: C C - - C -> 3 aligned, 105..108: G G N -> 3 aligned
        assert_eq!(chimp.aligned_bases, 6);
        assert!((chimp.coverage - 0.6).abs() < 1e-9);
        assert!(chimp.covered);
        // the N is aligned but not compared
        assert_eq!(chimp.identity, Some(1.0));
        assert!(!records[1].covered);
    }

    #[test]
    fn test_threshold_is_strict() {
        let maf = "a score=1
s hg38.chr1    0 10 + 1000 AAAAAAAAAA
s panTro5.chr1 0  1 + 1000 A---------
";
        let records = run(vec![locus(0, 10)], maf, 0.1);
        assert!((records[0].coverage - 0.1).abs() < 1e-9);
        assert!(!records[0].covered);
    }

    #[test]
    fn test_coverage_is_monotonic() {
        let template = |chimp: &str| {
            format!(
                "a score=1\ns hg38.chr1 0 10 + 1000 ACGTACGTAC\ns panTro5.chr1 0 {} + 1000 {}\n",
                chimp.bytes().filter(|&b| b != b'-').count(),
                chimp
            )
        };
        let mut previous = 0.0;
        for chimp in ["----------", "AC--------", "ACG---GTA-", "ACGTACGTAC"] {
            let records = run(vec![locus(0, 10)], &template(chimp), 0.1);
            assert!(records[0].coverage >= previous);
            previous = records[0].coverage;
        }
        assert_eq!(previous, 1.0);
    }

    #[test]
    fn test_reverse_strand_reference() {
        // reverse strand start 990 of 1000 => forward 0..10
        let maf = "a score=1
s hg38.chr1    990 10 - 1000 ACGTACGTAC
s panTro5.chr1   0  5 + 1000 ACGTA-----
";
        let records = run(vec![locus(5, 10)], maf, 0.1);
        // the first five columns map to forward positions 9..5
        assert_eq!(records[0].aligned_bases, 5);
        assert_eq!(records[0].identity, Some(1.0));
    }
}
