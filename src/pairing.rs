use crate::interval::{normalize_chrom, GenomicInterval, Strand};
use crate::repeats::{RepeatFeature, RepeatKind};
use crate::sequence_index::SequenceSource;
use crate::similarity::{pairwise_similarity, SimilarityMode};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairingParams {
    /// Largest accepted distance between the two LTRs (bp)
    pub max_gap: u64,
    pub min_gap: u64,
    /// Demand at least one internal element strictly between the two LTRs
    pub require_internal: bool,
}

impl Default for PairingParams {
    fn default() -> Self {
        Self {
            max_gap: 10_000,
            min_gap: 0,
            require_internal: false,
        }
    }
}

/// The two flanking LTRs of one ERV insertion
#[derive(Debug, Clone, PartialEq)]
pub struct LtrPair {
    pub left: RepeatFeature,
    pub right: RepeatFeature,
    pub gap_len: u64,
    pub similarity: Option<f64>,
    pub family_consistent: bool,
}

impl LtrPair {
    fn new(left: &RepeatFeature, right: &RepeatFeature) -> Self {
        Self {
            gap_len: right.interval.start - left.interval.end,
            family_consistent: left.family == right.family,
            left: left.clone(),
            right: right.clone(),
            similarity: None,
        }
    }

    /// Whole insertion, from the start of the left LTR to the end of the right one
    pub fn interval(&self) -> GenomicInterval {
        let strand = match self.left.interval.strand {
            Strand::Unknown => self.right.interval.strand,
            known => known,
        };
        GenomicInterval {
            chrom: self.left.interval.chrom.clone(),
            start: self.left.interval.start,
            end: self.right.interval.end,
            strand,
        }
    }

    pub fn locus_id(&self) -> String {
        self.interval().locus_id()
    }
}

#[derive(Debug, Default)]
pub struct PairingResult {
    pub pairs: Vec<LtrPair>,
    /// LTRs left without a partner
    pub solos: Vec<RepeatFeature>,
}

fn feature_order(a: &RepeatFeature, b: &RepeatFeature) -> Ordering {
    a.interval
        .start
        .cmp(&b.interval.start)
        .then(a.interval.end.cmp(&b.interval.end))
        .then(a.interval.strand.cmp(&b.interval.strand))
        .then_with(|| a.name.cmp(&b.name))
        .then(a.uid.cmp(&b.uid))
}

/// Internal elements of one chromosome, sorted by start
struct Internals<'a>(Vec<&'a RepeatFeature>);

impl Internals<'_> {
    fn any_between(&self, left_end: u64, right_start: u64) -> bool {
        let from = self.0.partition_point(|f| f.interval.start < left_end);
        self.0[from..]
            .iter()
            .take_while(|f| f.interval.start < right_start)
            .any(|f| f.interval.end <= right_start)
    }
}

fn pair_chromosome(
    mut ltrs: Vec<&RepeatFeature>,
    mut internals: Vec<&RepeatFeature>,
    params: &PairingParams,
    result: &mut PairingResult,
) {
    ltrs.sort_by(|a, b| feature_order(a, b));
    internals.sort_by(|a, b| feature_order(a, b));
    let internals = Internals(internals);
    let mut consumed = vec![false; ltrs.len()];

    for i in 0..ltrs.len() {
        if consumed[i] {
            continue;
        }
        let feature = ltrs[i];
        let window_end = feature.interval.end.saturating_add(params.max_gap);

        // nearest compatible downstream LTR; sort order breaks ties on the smaller coordinate
        let mut best: Option<(u64, usize)> = None;
        for (j, candidate) in ltrs.iter().enumerate().skip(i + 1) {
            if candidate.interval.start > window_end {
                break;
            }
            if consumed[j]
                || candidate.family != feature.family
                || !feature.interval.strand.is_compatible(candidate.interval.strand)
                || candidate.interval.start < feature.interval.end
            {
                continue;
            }
            let gap = candidate.interval.start - feature.interval.end;
            if gap < params.min_gap || gap > params.max_gap {
                continue;
            }
            if best.is_some_and(|(best_gap, _)| best_gap <= gap) {
                continue;
            }
            if params.require_internal
                && !internals.any_between(feature.interval.end, candidate.interval.start)
            {
                continue;
            }
            best = Some((gap, j));
        }

        if let Some((_, j)) = best {
            consumed[i] = true;
            consumed[j] = true;
            result.pairs.push(LtrPair::new(feature, ltrs[j]));
        }
    }

    result.solos.extend(
        ltrs.iter()
            .zip(&consumed)
            .filter(|(_, used)| !**used)
            .map(|(f, _)| (*f).clone()),
    );
}

/// Greedy nearest-neighbour pairing of same-family LTRs.
///
/// Features are processed per chromosome in coordinate order; each LTR takes the
/// closest unconsumed partner downstream within `[min_gap, max_gap]`, and a
/// feature belongs to at most one pair. The result does not depend on input order.
pub fn pair_features(features: &[RepeatFeature], params: &PairingParams) -> PairingResult {
    let mut by_chrom: BTreeMap<&str, (Vec<&RepeatFeature>, Vec<&RepeatFeature>)> =
        BTreeMap::new();
    for feature in features {
        let entry = by_chrom
            .entry(normalize_chrom(&feature.interval.chrom))
            .or_default();
        match feature.kind {
            RepeatKind::Ltr => entry.0.push(feature),
            RepeatKind::Internal => entry.1.push(feature),
        }
    }

    let mut chroms: Vec<&str> = by_chrom.keys().copied().collect();
    chroms.sort_by(|a, b| natord::compare(a, b));

    let mut result = PairingResult::default();
    for chrom in chroms {
        if let Some((ltrs, internals)) = by_chrom.remove(chrom) {
            pair_chromosome(ltrs, internals, params, &mut result);
        }
    }

    info!(
        "Paired {} LTRs into {} pairs, {} solo LTRs",
        result.pairs.len() * 2,
        result.pairs.len(),
        result.solos.len()
    );
    result
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ScoreStats {
    pub scored: usize,
    /// Pairs whose sequence carried no informative base
    pub undefined: usize,
    /// Pairs whose sequence could not be fetched
    pub failed: usize,
}

fn fetch_feature<S: SequenceSource + ?Sized>(
    source: &S,
    feature: &RepeatFeature,
) -> std::io::Result<Vec<u8>> {
    let iv = &feature.interval;
    source.fetch_sequence(&iv.chrom, iv.start, iv.end)
}

/// Fill in `similarity` for every pair, in parallel on the global rayon pool
pub fn score_pairs<S: SequenceSource + ?Sized>(
    pairs: &mut [LtrPair],
    source: &S,
    mode: SimilarityMode,
) -> ScoreStats {
    let undefined = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    pairs.par_iter_mut().for_each(|pair| {
        let sequences = fetch_feature(source, &pair.left)
            .and_then(|left| Ok((left, fetch_feature(source, &pair.right)?)));
        match sequences {
            Ok((left, right)) => {
                pair.similarity = pairwise_similarity(&left, &right, mode);
                if pair.similarity.is_none() {
                    debug!("No informative bases for pair {}", pair.locus_id());
                    undefined.fetch_add(1, AtomicOrdering::Relaxed);
                }
            }
            Err(e) => {
                warn!("Cannot score pair {}: {}", pair.locus_id(), e);
                pair.similarity = None;
                failed.fetch_add(1, AtomicOrdering::Relaxed);
            }
        }
    });

    let undefined = undefined.into_inner();
    let failed = failed.into_inner();
    ScoreStats {
        scored: pairs.len() - undefined - failed,
        undefined,
        failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::FamilyId;
    use crate::sequence_index::MemorySequences;

    fn feature(uid: u64, start: u64, end: u64, strand: Strand, family: u32) -> RepeatFeature {
        let name = format!("LTR{}", family);
        RepeatFeature {
            uid,
            interval: GenomicInterval::new("chr1", start, end, strand).unwrap(),
            kind: RepeatKind::Ltr,
            family: FamilyId(family),
            repeat_class: "LTR".to_string(),
            name,
        }
    }

    fn internal(uid: u64, start: u64, end: u64) -> RepeatFeature {
        RepeatFeature {
            kind: RepeatKind::Internal,
            name: "HERVH-int".to_string(),
            family: FamilyId(99),
            ..feature(uid, start, end, Strand::Forward, 99)
        }
    }

    fn uid_pairs(result: &PairingResult) -> Vec<(u64, u64)> {
        let mut pairs: Vec<_> = result
            .pairs
            .iter()
            .map(|p| (p.left.uid, p.right.uid))
            .collect();
        pairs.sort();
        pairs
    }

    #[test]
    fn test_pair_within_window() {
        let features = vec![
            feature(1, 1000, 1300, Strand::Forward, 0),
            feature(2, 5100, 5400, Strand::Forward, 0),
        ];
        let result = pair_features(&features, &PairingParams::default());
        assert_eq!(result.pairs.len(), 1);
        assert!(result.solos.is_empty());

        let pair = &result.pairs[0];
        assert_eq!(pair.gap_len, 3800);
        assert!(pair.family_consistent);
        assert!(pair.left.interval.end <= pair.right.interval.start);
        assert_eq!(pair.locus_id(), "chr1:1000-5400");
    }

    #[test]
    fn test_gap_bounds() {
        let features = vec![
            feature(1, 1000, 1300, Strand::Forward, 0),
            feature(2, 5100, 5400, Strand::Forward, 0),
        ];
        let tight = PairingParams {
            max_gap: 3799,
            ..Default::default()
        };
        let result = pair_features(&features, &tight);
        assert!(result.pairs.is_empty());
        assert_eq!(result.solos.len(), 2);

        let wide_min = PairingParams {
            min_gap: 4000,
            ..Default::default()
        };
        assert!(pair_features(&features, &wide_min).pairs.is_empty());
    }

    #[test]
    fn test_nearest_partner_and_one_to_one() {
        let features = vec![
            feature(1, 1000, 1300, Strand::Forward, 0),
            feature(2, 1800, 2100, Strand::Forward, 0),
            feature(3, 1400, 1700, Strand::Forward, 0),
            feature(4, 3000, 3300, Strand::Forward, 0),
        ];
        let result = pair_features(&features, &PairingParams::default());
        // 1 takes 3 (gap 100); 2 then takes 4
        assert_eq!(uid_pairs(&result), vec![(1, 3), (2, 4)]);
        assert!(result.solos.is_empty());
    }

    #[test]
    fn test_family_strand_and_overlap_rules() {
        let features = vec![
            feature(1, 1000, 1300, Strand::Forward, 0),
            feature(2, 1200, 1500, Strand::Forward, 0),
            feature(3, 2000, 2300, Strand::Reverse, 0),
            feature(4, 2500, 2800, Strand::Forward, 1),
        ];
        let result = pair_features(&features, &PairingParams::default());
        assert!(result.pairs.is_empty());
        assert_eq!(result.solos.len(), 4);

        let unknown = vec![
            feature(1, 1000, 1300, Strand::Forward, 0),
            feature(2, 2000, 2300, Strand::Unknown, 0),
        ];
        assert_eq!(
            pair_features(&unknown, &PairingParams::default()).pairs[0].interval().strand,
            Strand::Forward
        );
    }

    #[test]
    fn test_tie_break_prefers_smaller_coordinate() {
        let features = vec![
            feature(3, 2000, 2400, Strand::Forward, 0),
            feature(2, 2000, 2300, Strand::Forward, 0),
            feature(1, 1000, 1300, Strand::Forward, 0),
        ];
        let result = pair_features(&features, &PairingParams::default());
        assert_eq!(uid_pairs(&result), vec![(1, 2)]);
        assert_eq!(result.solos.len(), 1);
        assert_eq!(result.solos[0].uid, 3);
    }

    #[test]
    fn test_order_independent() {
        let mut features: Vec<RepeatFeature> = (0..20)
            .map(|k| feature(k, 1000 + k * 700, 1300 + k * 700, Strand::Forward, (k % 3) as u32))
            .collect();
        let expected = uid_pairs(&pair_features(&features, &PairingParams::default()));
        assert!(!expected.is_empty());

        features.reverse();
        assert_eq!(
            uid_pairs(&pair_features(&features, &PairingParams::default())),
            expected
        );
        features.rotate_left(7);
        assert_eq!(
            uid_pairs(&pair_features(&features, &PairingParams::default())),
            expected
        );
    }

    #[test]
    fn test_require_internal() {
        let params = PairingParams {
            require_internal: true,
            ..Default::default()
        };
        let bare = vec![
            feature(1, 1000, 1300, Strand::Forward, 0),
            feature(2, 5100, 5400, Strand::Forward, 0),
        ];
        let result = pair_features(&bare, &params);
        assert!(result.pairs.is_empty());
        assert_eq!(result.solos.len(), 2);

        let mut with_internal = bare.clone();
        with_internal.push(internal(3, 1300, 5100));
        let result = pair_features(&with_internal, &params);
        assert_eq!(uid_pairs(&result), vec![(1, 2)]);
        // internal elements are never reported as solo LTRs
        assert!(result.solos.is_empty());
    }

    #[test]
    fn test_score_pairs() {
        let mut genome = vec![b'A'; 6000];
        genome[1000..1300].copy_from_slice(&b"ACGT".repeat(75));
        genome[5100..5400].copy_from_slice(&b"ACGT".repeat(75));
        genome[2000..2300].fill(b'N');
        let source = MemorySequences::default().with("chr1", &genome);

        let features = vec![
            feature(1, 1000, 1300, Strand::Forward, 0),
            feature(2, 5100, 5400, Strand::Forward, 0),
            feature(3, 2000, 2300, Strand::Forward, 1),
            feature(4, 2400, 2700, Strand::Forward, 1),
            feature(5, 5500, 5800, Strand::Forward, 2),
            feature(6, 5900, 6200, Strand::Forward, 2),
        ];
        let mut result = pair_features(&features, &PairingParams::default());
        assert_eq!(result.pairs.len(), 3);
        let stats = score_pairs(&mut result.pairs, &source, SimilarityMode::Identity);
        assert_eq!(
            stats,
            ScoreStats {
                scored: 1,
                undefined: 1,
                failed: 1
            }
        );

        let by_left: Vec<_> = result
            .pairs
            .iter()
            .map(|p| (p.left.uid, p.similarity))
            .collect();
        assert_eq!(by_left, vec![(1, Some(1.0)), (3, None), (5, None)]);
    }
}
