//! MAF (Multiple Alignment Format) reading and writing
//!
//! Blocks are produced lazily, one `a` paragraph at a time, so a whole
//! chromosome alignment is never held in memory. Blocks that fail validation
//! are logged, counted in [`MafStats`] and skipped; only I/O failures and files
//! with no readable block at all are fatal.

use crate::interval::{GenomicInterval, Strand};
use crate::io::read_raw_line;
use log::{debug, warn};
use std::io::{self, BufRead, Write};

#[derive(Debug)]
pub enum MafError {
    Io(io::Error),
    NotEnoughFields { line: usize },
    InvalidField { line: usize, field: &'static str },
    InvalidStrand { line: usize },
    EmptyBlock { line: usize },
    UnequalLengths { line: usize, expected: usize, found: usize },
    SizeMismatch { line: usize, declared: u64, ungapped: u64 },
    OutOfBounds { line: usize },
    MissingReference { line: usize, species: String },
    InvalidEncoding { line: usize },
    Unreadable(String),
}

impl std::fmt::Display for MafError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MafError::Io(e) => write!(f, "IO error: {}", e),
            MafError::NotEnoughFields { line } => {
                write!(f, "line {}: sequence line needs 7 fields", line)
            }
            MafError::InvalidField { line, field } => {
                write!(f, "line {}: invalid {} field", line, field)
            }
            MafError::InvalidStrand { line } => write!(f, "line {}: invalid strand", line),
            MafError::EmptyBlock { line } => {
                write!(f, "block at line {} has no sequence lines", line)
            }
            MafError::UnequalLengths {
                line,
                expected,
                found,
            } => write!(
                f,
                "line {}: aligned text has {} columns, block has {}",
                line, found, expected
            ),
            MafError::SizeMismatch {
                line,
                declared,
                ungapped,
            } => write!(
                f,
                "line {}: declared size {} but {} ungapped bases",
                line, declared, ungapped
            ),
            MafError::OutOfBounds { line } => {
                write!(f, "line {}: aligned range exceeds source size", line)
            }
            MafError::MissingReference { line, species } => {
                write!(f, "block at line {} has no '{}' component", line, species)
            }
            MafError::InvalidEncoding { line } => write!(f, "line {}: not valid UTF-8", line),
            MafError::Unreadable(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for MafError {}

impl From<io::Error> for MafError {
    fn from(e: io::Error) -> Self {
        MafError::Io(e)
    }
}

pub fn is_gap(base: u8) -> bool {
    base == b'-' || base == b'.'
}

/// One `s` line of a block
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedComponent {
    /// `species.chrom` as written in the file
    pub src: String,
    pub start: u64,
    pub size: u64,
    pub strand: Strand,
    pub src_size: u64,
    pub text: Vec<u8>,
}

impl AlignedComponent {
    pub fn species(&self) -> &str {
        self.src.split_once('.').map_or(self.src.as_str(), |(s, _)| s)
    }

    pub fn chrom(&self) -> &str {
        self.src.split_once('.').map_or(self.src.as_str(), |(_, c)| c)
    }

    /// Aligned range in forward-strand coordinates of the source sequence
    pub fn forward_range(&self) -> (u64, u64) {
        match self.strand {
            Strand::Reverse => (
                self.src_size - self.start - self.size,
                self.src_size - self.start,
            ),
            _ => (self.start, self.start + self.size),
        }
    }

    pub fn ungapped_len(&self) -> u64 {
        self.text.iter().filter(|&&b| !is_gap(b)).count() as u64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentBlock {
    pub score: Option<f64>,
    pub components: Vec<AlignedComponent>,
    /// Index of the reference component in `components`
    pub reference: usize,
    pub block_length: usize,
    /// The paragraph as read (`a`, `s`, `i`, `e` and `q` lines), written back verbatim
    pub lines: Vec<String>,
}

impl AlignmentBlock {
    pub fn reference(&self) -> &AlignedComponent {
        &self.components[self.reference]
    }

    pub fn reference_interval(&self) -> GenomicInterval {
        let reference = self.reference();
        let (start, end) = reference.forward_range();
        GenomicInterval {
            chrom: reference.chrom().to_string(),
            start,
            end,
            strand: reference.strand,
        }
    }

    /// Forward-strand reference coordinate of every column, `None` where the reference has a gap
    pub fn reference_coordinates(&self) -> Vec<Option<u64>> {
        let reference = self.reference();
        let (fwd_start, fwd_end) = reference.forward_range();
        let mut offset = 0;
        reference
            .text
            .iter()
            .map(|&base| {
                if is_gap(base) {
                    return None;
                }
                let pos = match reference.strand {
                    Strand::Reverse => fwd_end - 1 - offset,
                    _ => fwd_start + offset,
                };
                offset += 1;
                Some(pos)
            })
            .collect()
    }
}

/// Counters reported once a file has been consumed
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MafStats {
    pub blocks: usize,
    pub malformed: usize,
    pub missing_reference: usize,
    /// Non-comment lines found outside any block
    pub stray_lines: usize,
}

/// Lazy, single-pass block producer. Restart by opening the file again.
pub struct MafReader<R> {
    reader: R,
    reference: Option<String>,
    line_no: usize,
    buf: Vec<u8>,
    /// Line read ahead of the current paragraph: (line number, text, valid UTF-8)
    pending: Option<(usize, String, bool)>,
    header: Vec<String>,
    stats: MafStats,
    failed: bool,
}

/// Raw lines of one `a` paragraph
struct Paragraph {
    start: usize,
    lines: Vec<String>,
    /// First line that was not valid UTF-8
    invalid_line: Option<usize>,
}

impl<R: BufRead> MafReader<R> {
    /// `reference` selects the reference component by species; `None` uses the first `s` line
    pub fn new(reader: R, reference: Option<&str>) -> Self {
        Self {
            reader,
            reference: reference.map(str::to_string),
            line_no: 0,
            buf: Vec::new(),
            pending: None,
            header: Vec::new(),
            stats: MafStats::default(),
            failed: false,
        }
    }

    pub fn stats(&self) -> &MafStats {
        &self.stats
    }

    /// Consume the reader, failing if the input never yielded a usable block
    /// although it contained data.
    pub fn finish(self) -> Result<MafStats, MafError> {
        let stats = self.stats;
        if stats.blocks == 0 && (stats.malformed > 0 || stats.stray_lines > 0) {
            return Err(MafError::Unreadable(format!(
                "no valid alignment block ({} malformed blocks, {} stray lines)",
                stats.malformed, stats.stray_lines
            )));
        }
        Ok(stats)
    }

    /// Leading `#` lines of the file (`##maf ...` and comments), to be called before
    /// the first block is read
    pub fn read_header(&mut self) -> Result<&[String], MafError> {
        if self.line_no == 0 {
            while let Some((line, valid)) = self.next_line()? {
                if line.starts_with('#') {
                    if valid {
                        self.header.push(line);
                    }
                    continue;
                }
                if !line.trim().is_empty() {
                    self.pending = Some((self.line_no, line, valid));
                    break;
                }
            }
        }
        Ok(&self.header)
    }

    /// Next line without its terminator, and whether it was valid UTF-8
    fn next_line(&mut self) -> io::Result<Option<(String, bool)>> {
        if !read_raw_line(&mut self.reader, &mut self.buf)? {
            return Ok(None);
        }
        self.line_no += 1;
        let line = match std::str::from_utf8(&self.buf) {
            Ok(line) => (line.to_string(), true),
            Err(_) => (String::from_utf8_lossy(&self.buf).into_owned(), false),
        };
        Ok(Some(line))
    }

    fn read_ahead(&mut self) -> io::Result<Option<(usize, String, bool)>> {
        if let Some(pending) = self.pending.take() {
            return Ok(Some(pending));
        }
        Ok(self
            .next_line()?
            .map(|(line, valid)| (self.line_no, line, valid)))
    }

    fn next_paragraph(&mut self) -> io::Result<Option<Paragraph>> {
        let (start, header, valid) = loop {
            let Some((line_no, line, valid)) = self.read_ahead()? else {
                return Ok(None);
            };
            if is_line_of(&line, 'a') {
                break (line_no, line, valid);
            }
            if !line.trim().is_empty() && !line.starts_with('#') {
                self.stats.stray_lines += 1;
            }
        };

        let mut invalid_line = (!valid).then_some(start);
        let mut lines = vec![header];
        while let Some((line, valid)) = self.next_line()? {
            if line.trim().is_empty() {
                break;
            }
            if is_line_of(&line, 'a') {
                self.pending = Some((self.line_no, line, valid));
                break;
            }
            if !valid {
                invalid_line.get_or_insert(self.line_no);
            }
            lines.push(line);
        }
        Ok(Some(Paragraph {
            start,
            lines,
            invalid_line,
        }))
    }
}

impl<R: BufRead> Iterator for MafReader<R> {
    type Item = Result<AlignmentBlock, MafError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            let paragraph = match self.next_paragraph() {
                Ok(Some(paragraph)) => paragraph,
                Ok(None) => return None,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(MafError::Io(e)));
                }
            };

            let parsed = match paragraph.invalid_line {
                Some(line) => Err(MafError::InvalidEncoding { line }),
                None => parse_block(paragraph.start, paragraph.lines, self.reference.as_deref()),
            };
            match parsed {
                Ok(block) => {
                    self.stats.blocks += 1;
                    return Some(Ok(block));
                }
                Err(e @ MafError::MissingReference { .. }) => {
                    debug!("Skipping alignment block: {}", e);
                    self.stats.missing_reference += 1;
                }
                Err(e) => {
                    warn!("Skipping malformed alignment block: {}", e);
                    self.stats.malformed += 1;
                }
            }
        }
    }
}

fn is_line_of(line: &str, kind: char) -> bool {
    let mut chars = line.chars();
    chars.next() == Some(kind) && chars.next().map_or(true, char::is_whitespace)
}

fn parse_score(header: &str) -> Option<f64> {
    header
        .split_whitespace()
        .filter_map(|kv| kv.strip_prefix("score="))
        .find_map(|v| v.parse::<f64>().ok())
}

fn parse_component(line_no: usize, line: &str) -> Result<AlignedComponent, MafError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 7 {
        return Err(MafError::NotEnoughFields { line: line_no });
    }
    let number = |field: &'static str, value: &str| {
        value
            .parse::<u64>()
            .map_err(|_| MafError::InvalidField {
                line: line_no,
                field,
            })
    };
    let start = number("start", fields[2])?;
    let size = number("size", fields[3])?;
    let strand = match fields[4] {
        "+" => Strand::Forward,
        "-" => Strand::Reverse,
        _ => return Err(MafError::InvalidStrand { line: line_no }),
    };
    let src_size = number("srcSize", fields[5])?;

    let component = AlignedComponent {
        src: fields[1].to_string(),
        start,
        size,
        strand,
        src_size,
        text: fields[6].as_bytes().to_vec(),
    };

    let ungapped = component.ungapped_len();
    if ungapped != size {
        return Err(MafError::SizeMismatch {
            line: line_no,
            declared: size,
            ungapped,
        });
    }
    if start.checked_add(size).map_or(true, |end| end > src_size) {
        return Err(MafError::OutOfBounds { line: line_no });
    }
    Ok(component)
}

/// Validate one paragraph. `lines[0]` is the `a` line found at `start`.
fn parse_block(
    start: usize,
    lines: Vec<String>,
    reference: Option<&str>,
) -> Result<AlignmentBlock, MafError> {
    let score = parse_score(&lines[0]);
    let mut components = Vec::new();
    let mut block_length = None;

    for (offset, line) in lines.iter().enumerate().skip(1) {
        let line_no = start + offset;
        // i, e and q lines carry no aligned bases
        if !is_line_of(line, 's') {
            continue;
        }
        let component = parse_component(line_no, line)?;
        match block_length {
            None => block_length = Some(component.text.len()),
            Some(expected) if expected != component.text.len() => {
                return Err(MafError::UnequalLengths {
                    line: line_no,
                    expected,
                    found: component.text.len(),
                })
            }
            Some(_) => {}
        }
        components.push(component);
    }

    let Some(block_length) = block_length else {
        return Err(MafError::EmptyBlock { line: start });
    };

    let reference = match reference {
        Some(species) => components
            .iter()
            .position(|c| c.species() == species)
            .ok_or_else(|| MafError::MissingReference {
                line: start,
                species: species.to_string(),
            })?,
        None => 0,
    };
    if components[reference].size == 0 {
        return Err(MafError::EmptyBlock { line: start });
    }

    Ok(AlignmentBlock {
        score,
        components,
        reference,
        block_length,
        lines,
    })
}

pub struct MafWriter<W: Write> {
    writer: W,
}

impl<W: Write> MafWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Header lines of the source file; a `##maf version=1` line is supplied when missing
    pub fn write_header(&mut self, header: &[String]) -> io::Result<()> {
        if !header.first().is_some_and(|line| line.starts_with("##maf")) {
            writeln!(self.writer, "##maf version=1")?;
        }
        for line in header {
            writeln!(self.writer, "{}", line)?;
        }
        writeln!(self.writer)
    }

    /// Write the block's paragraph exactly as it was read
    pub fn write_block(&mut self, block: &AlignmentBlock) -> io::Result<()> {
        for line in &block.lines {
            writeln!(self.writer, "{}", line)?;
        }
        writeln!(self.writer)
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const TWO_BLOCKS: &str = "##maf version=1 scoring=roast.v3.3
# comment

a score=23262.0
s hg38.chr1     1000 10 + 248956422 ACGTACGTAC
s panTro5.chr1  2000 8 - 224244399 ACG--CGTAC
i panTro5.chr1  C 0 C 0

a score=5
s hg38.chr1     1010 4 + 248956422 AC-GT
s gorGor5.chr1   500 5 + 228908115 ACTGT
";

    fn read_all(text: &str, reference: Option<&str>) -> (Vec<AlignmentBlock>, MafStats) {
        let mut reader = MafReader::new(Cursor::new(text.as_bytes().to_vec()), reference);
        let blocks: Vec<_> = reader.by_ref().map(|b| b.unwrap()).collect();
        let stats = reader.finish().unwrap();
        (blocks, stats)
    }

    #[test]
    fn test_parse_two_blocks() {
        let (blocks, stats) = read_all(TWO_BLOCKS, Some("hg38"));
        assert_eq!(stats.blocks, 2);
        assert_eq!(stats.malformed, 0);

        let first = &blocks[0];
        assert_eq!(first.score, Some(23262.0));
        assert_eq!(first.block_length, 10);
        assert_eq!(first.components.len(), 2);
        let interval = first.reference_interval();
        assert_eq!((interval.chrom.as_str(), interval.start, interval.end), ("chr1", 1000, 1010));
        assert_eq!(first.components[1].chrom(), "chr1");

        let second = &blocks[1];
        assert_eq!(second.block_length, 5);
        assert_eq!(
            second.reference_coordinates(),
            vec![Some(1010), Some(1011), None, Some(1012), Some(1013)]
        );
    }

    #[test]
    fn test_block_invariants_hold() {
        let (blocks, _) = read_all(TWO_BLOCKS, Some("hg38"));
        for block in &blocks {
            for comp in &block.components {
                assert_eq!(comp.text.len(), block.block_length);
            }
            assert_eq!(
                block.reference().ungapped_len(),
                block.reference_interval().len()
            );
        }
    }

    #[test]
    fn test_reverse_strand_reference() {
        let text = "a score=1\ns hg38.chr1 90 4 - 100 AC-GT\n";
        let (blocks, _) = read_all(text, Some("hg38"));
        let block = &blocks[0];
        let interval = block.reference_interval();
        assert_eq!((interval.start, interval.end), (6, 10));
        assert_eq!(
            block.reference_coordinates(),
            vec![Some(9), Some(8), None, Some(7), Some(6)]
        );
    }

    #[test]
    fn test_only_malformed_blocks_is_unreadable() {
        let text = "a score=1
s hg38.chr1 0 4 + 100 ACGT
s panTro5.chr1 0 4 + 100 ACG

a score=2
s hg38.chr1 10 5 + 100 ACGT

a score=3
s hg38.chr1 20 x + 100 ACGT

a score=4
s hg38.chr1 30 4 + 100 ACGT
s panTro5.chr1 30 4 + 100 AC-T
";
        let mut reader = MafReader::new(Cursor::new(text.as_bytes().to_vec()), Some("hg38"));
        // skipped blocks never surface as items
        assert_eq!(reader.by_ref().count(), 0);
        assert_eq!(reader.stats().malformed, 4);
        assert!(matches!(reader.finish(), Err(MafError::Unreadable(_))));
    }

    #[test]
    fn test_good_block_after_bad_block() {
        let text = "a score=1
s hg38.chr1 0 4 + 100 ACGT
s panTro5.chr1 0 4 + 100 ACG
a score=2
s hg38.chr1 10 4 + 100 ACGT
";
        let (blocks, stats) = read_all(text, Some("hg38"));
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].reference().start, 10);
        assert_eq!(stats.malformed, 1);
    }

    #[test]
    fn test_missing_reference_is_counted() {
        let text = "a score=1\ns panTro5.chr1 0 4 + 100 ACGT\n\na score=2\ns hg38.chr1 0 4 + 100 ACGT\n";
        let (blocks, stats) = read_all(text, Some("hg38"));
        assert_eq!(blocks.len(), 1);
        assert_eq!(stats.missing_reference, 1);
        assert_eq!(stats.malformed, 0);
    }

    #[test]
    fn test_garbage_is_unreadable() {
        let mut reader = MafReader::new(Cursor::new(b"not\nan\nalignment\n".to_vec()), None);
        assert!(reader.next().is_none());
        assert!(matches!(reader.finish(), Err(MafError::Unreadable(_))));
    }

    #[test]
    fn test_empty_input_is_not_an_error() {
        let (blocks, stats) = read_all("##maf version=1\n", None);
        assert!(blocks.is_empty());
        assert_eq!(stats, MafStats::default());
    }

    #[test]
    fn test_invalid_utf8_block_is_skipped() {
        let mut text = b"a score=1\ns hg38.chr1 0 4 + 100 ACGT\ni hg38.chr1 \xff\n\n".to_vec();
        text.extend_from_slice(b"a score=2\ns hg38.chr1 10 4 + 100 ACGT\n");
        let mut reader = MafReader::new(Cursor::new(text), Some("hg38"));
        let blocks: Vec<_> = reader.by_ref().map(|b| b.unwrap()).collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].reference().start, 10);
        assert_eq!(reader.finish().unwrap().malformed, 1);
    }

    #[test]
    fn test_writer_passes_blocks_through() {
        let text = "##maf version=1 scoring=roast.v3.3
# hg38 chr1

a score=23262.0
s hg38.chr1     1000 10 + 248956422 ACGTACGTAC
s panTro5.chr1  2000 8 - 224244399 ACG--CGTAC
i panTro5.chr1  C 0 C 0
q panTro5.chr1                      99--999999
e gorGor5.chr1   500 20 + 228908115 I

a score=5
s hg38.chr1     1010 4 + 248956422 AC-GT
s gorGor5.chr1   500 5 + 228908115 ACTGT
";
        let mut reader = MafReader::new(Cursor::new(text.as_bytes().to_vec()), Some("hg38"));
        let header = reader.read_header().unwrap().to_vec();
        assert_eq!(header.len(), 2);

        let mut writer = MafWriter::new(Vec::new());
        writer.write_header(&header).unwrap();
        for block in reader.by_ref() {
            writer.write_block(&block.unwrap()).unwrap();
        }
        assert_eq!(reader.finish().unwrap().blocks, 2);

        let written = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(written, text.to_string() + "\n");
    }

    #[test]
    fn test_writer_output_parses_back() {
        let (blocks, _) = read_all(TWO_BLOCKS, Some("hg38"));
        let mut writer = MafWriter::new(Vec::new());
        writer.write_header(&[]).unwrap();
        for block in &blocks {
            writer.write_block(block).unwrap();
        }
        let written = String::from_utf8(writer.into_inner()).unwrap();
        assert!(written.starts_with("##maf version=1\n"));
        let (reparsed, _) = read_all(&written, Some("hg38"));
        assert_eq!(reparsed, blocks);
    }
}
