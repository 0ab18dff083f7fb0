use crate::interval::{chrom_selected, normalize_chrom, to_tree_range, GenomicInterval, Strand};
use crate::io::{open_reader, read_raw_line};
use crate::maf::{AlignmentBlock, MafError, MafWriter};
use coitrees::{BasicCOITree, Interval, IntervalTree};
use log::{debug, warn};
use rustc_hash::FxHashMap;
use std::io::{self, BufRead, Write};
use std::path::Path;

/// Regions of interest, one interval tree per (normalized) chromosome
pub struct RegionSet {
    trees: FxHashMap<String, BasicCOITree<u32, u32>>,
    region_count: usize,
}

impl RegionSet {
    /// Index `intervals`, each widened by `margin` on both sides
    pub fn from_intervals<'a, I>(intervals: I, margin: u64) -> Self
    where
        I: IntoIterator<Item = &'a GenomicInterval>,
    {
        let mut by_chrom: FxHashMap<String, Vec<Interval<u32>>> = FxHashMap::default();
        let mut region_count = 0;
        for interval in intervals {
            let start = interval.start.saturating_sub(margin);
            let end = interval.end.saturating_add(margin);
            let Some((first, last)) = to_tree_range(start, end) else {
                warn!("Region {} does not fit the index, ignoring it", interval);
                continue;
            };
            by_chrom
                .entry(normalize_chrom(&interval.chrom).to_string())
                .or_default()
                .push(Interval {
                    first,
                    last,
                    metadata: region_count as u32,
                });
            region_count += 1;
        }

        let trees = by_chrom
            .into_iter()
            .map(|(chrom, nodes)| (chrom, BasicCOITree::new(nodes.as_slice())))
            .collect();

        Self {
            trees,
            region_count,
        }
    }

    pub fn len(&self) -> usize {
        self.region_count
    }

    pub fn is_empty(&self) -> bool {
        self.region_count == 0
    }

    pub fn overlaps(&self, interval: &GenomicInterval) -> bool {
        let Some(tree) = self.trees.get(normalize_chrom(&interval.chrom)) else {
            return false;
        };
        match to_tree_range(interval.start, interval.end) {
            Some((first, last)) => tree.query_count(first, last) > 0,
            None => false,
        }
    }
}

/// Rows kept from a BED file plus the number of rows that could not be parsed
pub struct BedRegions {
    pub intervals: Vec<GenomicInterval>,
    pub skipped: usize,
}

/// Parse BED rows (chrom, start, end, ...), keeping only `chrom` when given
pub fn parse_bed_regions<R: BufRead>(
    mut reader: R,
    chrom: Option<&str>,
) -> io::Result<BedRegions> {
    let mut intervals = Vec::new();
    let mut skipped = 0;
    let mut buf = Vec::new();
    let mut line_no = 0;

    while read_raw_line(&mut reader, &mut buf)? {
        line_no += 1;
        let Ok(line) = std::str::from_utf8(&buf) else {
            warn!("Skipping BED row {}: not valid UTF-8", line_no);
            skipped += 1;
            continue;
        };
        let trimmed = line.trim();
        if trimmed.is_empty()
            || trimmed.starts_with('#')
            || trimmed.starts_with("track")
            || trimmed.starts_with("browser")
        {
            continue;
        }

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        let parsed = if fields.len() >= 3 {
            match (fields[1].parse::<u64>(), fields[2].parse::<u64>()) {
                (Ok(start), Ok(end)) => GenomicInterval::new(fields[0], start, end, Strand::Unknown),
                _ => None,
            }
        } else {
            None
        };

        match parsed {
            Some(interval) => {
                if chrom_selected(chrom, &interval.chrom) {
                    intervals.push(interval);
                }
            }
            None => {
                warn!("Skipping malformed BED row {}: '{}'", line_no, trimmed);
                skipped += 1;
            }
        }
    }

    Ok(BedRegions { intervals, skipped })
}

pub fn load_bed_regions(path: &Path, chrom: Option<&str>) -> io::Result<BedRegions> {
    let regions = parse_bed_regions(open_reader(path)?, chrom)?;
    debug!(
        "Loaded {} regions from {} ({} rows skipped)",
        regions.intervals.len(),
        path.display(),
        regions.skipped
    );
    Ok(regions)
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct FilterStats {
    pub seen: usize,
    pub kept: usize,
}

/// Passes through every block whose reference span touches a region, whole and untrimmed
pub struct RegionFilter<'a, I> {
    blocks: I,
    regions: &'a RegionSet,
    stats: FilterStats,
}

impl<'a, I> RegionFilter<'a, I>
where
    I: Iterator<Item = Result<AlignmentBlock, MafError>>,
{
    pub fn new(blocks: I, regions: &'a RegionSet) -> Self {
        Self {
            blocks,
            regions,
            stats: FilterStats::default(),
        }
    }

    pub fn stats(&self) -> &FilterStats {
        &self.stats
    }
}

impl<I> Iterator for RegionFilter<'_, I>
where
    I: Iterator<Item = Result<AlignmentBlock, MafError>>,
{
    type Item = Result<AlignmentBlock, MafError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let block = match self.blocks.next()? {
                Ok(block) => block,
                Err(e) => return Some(Err(e)),
            };
            self.stats.seen += 1;
            if self.regions.overlaps(&block.reference_interval()) {
                self.stats.kept += 1;
                return Some(Ok(block));
            }
        }
    }
}

/// Filter `blocks` against `regions` and write the survivors as MAF
pub fn write_filtered<I, W>(
    header: &[String],
    blocks: I,
    regions: &RegionSet,
    writer: W,
) -> Result<FilterStats, MafError>
where
    I: Iterator<Item = Result<AlignmentBlock, MafError>>,
    W: Write,
{
    let mut writer = MafWriter::new(writer);
    writer.write_header(header)?;
    let mut filter = RegionFilter::new(blocks, regions);
    for block in filter.by_ref() {
        writer.write_block(&block?)?;
    }
    Ok(filter.stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maf::MafReader;
    use std::io::Cursor;

    fn iv(chrom: &str, start: u64, end: u64) -> GenomicInterval {
        GenomicInterval::new(chrom, start, end, Strand::Unknown).unwrap()
    }

    const MAF: &str = "##maf version=1

a score=1
s hg38.chr1 100 4 + 10000 ACGT
s panTro5.chr1 100 4 + 10000 ACGT

a score=2
s hg38.chr1 500 4 + 10000 ACGT

a score=3
s hg38.chr1 990 20 + 10000 ACGTACGTACGTACGTACGT
s panTro5.chr1 990 20 + 10000 ACGTACGTACGTACGTACGT

a score=4
s hg38.chr1 5000 4 + 10000 ACGT
";

    fn filtered(text: &str, regions: &RegionSet) -> (Vec<u8>, FilterStats) {
        let mut reader = MafReader::new(Cursor::new(text.as_bytes().to_vec()), Some("hg38"));
        let header = reader.read_header().unwrap().to_vec();
        let mut out = Vec::new();
        let stats = write_filtered(&header, reader.by_ref(), regions, &mut out).unwrap();
        reader.finish().unwrap();
        (out, stats)
    }

    #[test]
    fn test_region_overlap_with_margin() {
        let regions = RegionSet::from_intervals(&[iv("1", 1000, 1300)], 50);
        assert_eq!(regions.len(), 1);
        assert!(!regions.is_empty());
        assert!(regions.overlaps(&iv("chr1", 949, 951)));
        assert!(!regions.overlaps(&iv("chr1", 900, 950)));
        assert!(regions.overlaps(&iv("chr1", 1349, 1400)));
        assert!(!regions.overlaps(&iv("chr1", 1350, 1400)));
        assert!(!regions.overlaps(&iv("chr2", 1000, 1300)));
    }

    #[test]
    fn test_partial_overlap_keeps_whole_block() {
        let regions = RegionSet::from_intervals(&[iv("chr1", 1000, 1300)], 0);
        let (out, stats) = filtered(MAF, &regions);
        assert_eq!(stats, FilterStats { seen: 4, kept: 1 });

        let blocks: Vec<_> = MafReader::new(Cursor::new(out), Some("hg38"))
            .map(|b| b.unwrap())
            .collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].reference_interval().start, 990);
        assert_eq!(blocks[0].block_length, 20);
    }

    #[test]
    fn test_filter_is_idempotent() {
        let regions =
            RegionSet::from_intervals(&[iv("chr1", 1000, 1300), iv("chr1", 90, 101)], 10);
        let (once, _) = filtered(MAF, &regions);
        let (twice, stats) = filtered(std::str::from_utf8(&once).unwrap(), &regions);
        assert_eq!(once, twice);
        assert_eq!(stats.seen, stats.kept);
        assert_eq!(stats.kept, 2);
    }

    #[test]
    fn test_parse_bed_regions() {
        let bed = "track name=erv\n1\t100\t200\tERV1\t0\t+\nchr2\t5\t10\n1\tx\t9\n1\t50\t50\n";
        let regions = parse_bed_regions(Cursor::new(bed), Some("chr1")).unwrap();
        assert_eq!(regions.intervals, vec![iv("1", 100, 200)]);
        assert_eq!(regions.skipped, 2);

        let mut bytes = b"1\t100\t200\n1\t\xfe\t9\n".to_vec();
        bytes.extend_from_slice(b"1\t300\t400\n");
        let lossy = parse_bed_regions(Cursor::new(bytes), None).unwrap();
        assert_eq!(lossy.intervals.len(), 2);
        assert_eq!(lossy.skipped, 1);

        let all = parse_bed_regions(Cursor::new(bed), None).unwrap();
        assert_eq!(all.intervals.len(), 2);
    }
}
