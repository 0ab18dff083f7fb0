use std::fmt;

/// Strand orientation of an annotated feature or an aligned component
#[derive(Default, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug)]
#[repr(u8)]
pub enum Strand {
    Forward,
    Reverse,
    #[default]
    Unknown,
}

impl Strand {
    /// Parse a strand column. `.`/`?` and the empty string mean unknown.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "+" => Some(Strand::Forward),
            "-" => Some(Strand::Reverse),
            "." | "?" | "" => Some(Strand::Unknown),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            Strand::Forward => '+',
            Strand::Reverse => '-',
            Strand::Unknown => '.',
        }
    }

    /// Two strands are compatible unless both are known and differ
    pub fn is_compatible(&self, other: Strand) -> bool {
        *self == Strand::Unknown || other == Strand::Unknown || *self == other
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Half-open, 0-based interval on a reference chromosome
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenomicInterval {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
    pub strand: Strand,
}

impl GenomicInterval {
    /// Build an interval, rejecting empty or inverted coordinates
    pub fn new(chrom: &str, start: u64, end: u64, strand: Strand) -> Option<Self> {
        if start >= end || chrom.is_empty() {
            return None;
        }
        Some(Self {
            chrom: chrom.to_string(),
            start,
            end,
            strand,
        })
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Locus label used in every output table, e.g. `chr1:1000-1300`
    pub fn locus_id(&self) -> String {
        format!("{}:{}-{}", self.chrom, self.start, self.end)
    }
}

impl fmt::Display for GenomicInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}({})", self.chrom, self.start, self.end, self.strand)
    }
}

/// Chromosome key with any leading `chr` removed, so that `chr1` and `1` agree
pub fn normalize_chrom(chrom: &str) -> &str {
    chrom.strip_prefix("chr").unwrap_or(chrom)
}

pub fn same_chrom(a: &str, b: &str) -> bool {
    normalize_chrom(a) == normalize_chrom(b)
}

/// `true` when no chromosome is selected or `chrom` is the selected one
pub fn chrom_selected(selected: Option<&str>, chrom: &str) -> bool {
    selected.map_or(true, |wanted| same_chrom(wanted, chrom))
}

/// Convert a half-open coordinate pair into the closed `i32` range used by the interval trees
pub fn to_tree_range(start: u64, end: u64) -> Option<(i32, i32)> {
    if start >= end {
        return None;
    }
    let first = i32::try_from(start).ok()?;
    let last = i32::try_from(end - 1).ok()?;
    Some((first, last))
}
