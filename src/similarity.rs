//! Pairwise similarity of two LTR copies from a global alignment.
//!
//! Scoring is match 1, mismatch 0, gap open -5, gap extend -0.5 (affine, the
//! opening column included in the open penalty), doubled to integers for the
//! aligner. Ambiguous bases never score as a match.

use bio::alignment::pairwise::Aligner;
use bio::alignment::AlignmentOperation::*;

const MATCH: i32 = 2;
const MISMATCH: i32 = 0;
// rust-bio charges open + extend * len for a gap of len columns
const GAP_OPEN: i32 = -9;
const GAP_EXTEND: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SimilarityMode {
    /// Matches over aligned columns, terminal gaps and ambiguous columns excluded
    #[default]
    Identity,
    /// Every gap run counts as a single difference, terminal runs included
    GapCompressed,
}

pub fn is_ambiguous(base: u8) -> bool {
    !matches!(base.to_ascii_uppercase(), b'A' | b'C' | b'G' | b'T')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Pair(u8, u8),
    GapInX,
    GapInY,
}

impl Column {
    fn is_gap(&self) -> bool {
        !matches!(self, Column::Pair(..))
    }
}

fn align_columns(x: &[u8], y: &[u8]) -> Vec<Column> {
    let score = |a: u8, b: u8| {
        if a == b && !is_ambiguous(a) {
            MATCH
        } else {
            MISMATCH
        }
    };
    let mut aligner = Aligner::with_capacity(x.len(), y.len(), GAP_OPEN, GAP_EXTEND, &score);
    let alignment = aligner.global(x, y);

    let mut columns = Vec::with_capacity(alignment.operations.len());
    let (mut i, mut j) = (alignment.xstart, alignment.ystart);
    for op in &alignment.operations {
        match *op {
            Match | Subst => {
                columns.push(Column::Pair(x[i], y[j]));
                i += 1;
                j += 1;
            }
            Del => {
                columns.push(Column::GapInX);
                j += 1;
            }
            Ins => {
                columns.push(Column::GapInY);
                i += 1;
            }
            Xclip(n) => i += n,
            Yclip(n) => j += n,
        }
    }
    columns
}

fn identity(columns: &[Column]) -> Option<f64> {
    let first = columns.iter().position(|c| !c.is_gap())?;
    let last = columns.iter().rposition(|c| !c.is_gap())?;

    let mut matches = 0usize;
    let mut aligned = 0usize;
    for column in &columns[first..=last] {
        match *column {
            Column::Pair(a, b) if is_ambiguous(a) || is_ambiguous(b) => {}
            Column::Pair(a, b) => {
                aligned += 1;
                if a == b {
                    matches += 1;
                }
            }
            Column::GapInX | Column::GapInY => aligned += 1,
        }
    }

    if aligned == 0 {
        None
    } else {
        Some(matches as f64 / aligned as f64)
    }
}

fn gap_compressed(columns: &[Column]) -> Option<f64> {
    let mut length = 0usize;
    let mut differences = 0usize;
    let mut previous: Option<Column> = None;
    for &column in columns {
        match column {
            Column::Pair(a, b) => {
                length += 1;
                if a != b {
                    differences += 1;
                }
            }
            gap => {
                if previous != Some(gap) {
                    length += 1;
                    differences += 1;
                }
            }
        }
        previous = Some(column).filter(Column::is_gap);
    }

    if length == 0 {
        None
    } else {
        Some((length - differences) as f64 / length as f64)
    }
}

/// Similarity in [0, 1], or `None` when either sequence has no informative base
pub fn pairwise_similarity(x: &[u8], y: &[u8], mode: SimilarityMode) -> Option<f64> {
    if x.iter().all(|&b| is_ambiguous(b)) || y.iter().all(|&b| is_ambiguous(b)) {
        return None;
    }
    let x = x.to_ascii_uppercase();
    let y = y.to_ascii_uppercase();
    let columns = align_columns(&x, &y);
    match mode {
        SimilarityMode::Identity => identity(&columns),
        SimilarityMode::GapCompressed => gap_compressed(&columns),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Option<f64>, b: f64) -> bool {
        a.is_some_and(|a| (a - b).abs() < 1e-9)
    }

    #[test]
    fn test_identical_and_mismatch() {
        let x = b"ACGTACGTAC";
        assert!(close(pairwise_similarity(x, x, SimilarityMode::Identity), 1.0));
        assert!(close(
            pairwise_similarity(x, b"acgtaggtac", SimilarityMode::Identity),
            0.9
        ));
        assert!(close(
            pairwise_similarity(x, b"ACGTAGGTAC", SimilarityMode::GapCompressed),
            0.9
        ));
    }

    #[test]
    fn test_internal_gap_run() {
        let x = b"AAAACCCCGGGGTTTT";
        let y = b"AAAACCCCTTTT";
        assert!(close(pairwise_similarity(x, y, SimilarityMode::Identity), 0.75));
        assert!(close(
            pairwise_similarity(x, y, SimilarityMode::GapCompressed),
            12.0 / 13.0
        ));
    }

    #[test]
    fn test_terminal_gaps() {
        let x = b"ACGTACGT";
        let y = b"TTACGTACGT";
        assert!(close(pairwise_similarity(x, y, SimilarityMode::Identity), 1.0));
        assert!(close(
            pairwise_similarity(x, y, SimilarityMode::GapCompressed),
            8.0 / 9.0
        ));
    }

    #[test]
    fn test_uninformative_sequences() {
        assert_eq!(pairwise_similarity(b"NNNN", b"ACGT", SimilarityMode::Identity), None);
        assert_eq!(pairwise_similarity(b"ACGT", b"", SimilarityMode::Identity), None);
        assert_eq!(pairwise_similarity(b"", b"", SimilarityMode::GapCompressed), None);
    }

    #[test]
    fn test_ambiguous_columns_not_counted() {
        // one N column out of ten
        let score = pairwise_similarity(b"ACGTNCGTAC", b"ACGTACGTAC", SimilarityMode::Identity);
        assert!(close(score, 1.0));
    }
}
