//! Repeat annotation loading (RepeatMasker `rmsk.txt` or a BED6-like table)
//!
//! Bad rows are skipped and counted; they never abort the load.

use crate::error::ErvError;
use crate::families::{FamilyId, FamilyIndex};
use crate::interval::{same_chrom, GenomicInterval, Strand};
use crate::io::{open_reader, read_raw_line};
use log::{debug, info, warn};
use std::io::{self, BufRead};
use std::path::Path;

/// Column layout of the annotation table
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum AnnotationLayout {
    /// UCSC rmsk.txt: bin, swScore, milliDiv, milliDel, milliIns, genoName, genoStart,
    /// genoEnd, genoLeft, strand, repName, repClass, repFamily, repStart, repEnd, repLeft, id
    Rmsk,
    /// chrom, start, end, strand, name, class[, ...]
    Bed6,
}

struct Columns {
    min_fields: usize,
    max_fields: Option<usize>,
    chrom: usize,
    start: usize,
    end: usize,
    strand: usize,
    name: usize,
    class: usize,
}

impl AnnotationLayout {
    fn columns(&self) -> Columns {
        match self {
            AnnotationLayout::Rmsk => Columns {
                min_fields: 17,
                max_fields: Some(17),
                chrom: 5,
                start: 6,
                end: 7,
                strand: 9,
                name: 10,
                class: 11,
            },
            AnnotationLayout::Bed6 => Columns {
                min_fields: 6,
                max_fields: None,
                chrom: 0,
                start: 1,
                end: 2,
                strand: 3,
                name: 4,
                class: 5,
            },
        }
    }
}

/// LTR ends versus internal (`*-int`) parts of an ERV
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RepeatKind {
    Ltr,
    Internal,
}

impl RepeatKind {
    pub fn from_name(name: &str) -> Self {
        if name.contains("-int") {
            RepeatKind::Internal
        } else {
            RepeatKind::Ltr
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RepeatFeature {
    /// 1-based row number in the annotation file, unique per file
    pub uid: u64,
    pub interval: GenomicInterval,
    pub name: String,
    pub family: FamilyId,
    pub repeat_class: String,
    pub kind: RepeatKind,
}

impl RepeatFeature {
    pub fn locus_id(&self) -> String {
        self.interval.locus_id()
    }
}

#[derive(Debug)]
pub enum RowError {
    ColumnCount(usize),
    InvalidCoordinate(&'static str),
    InvalidStrand(String),
    EmptyInterval,
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowError::ColumnCount(found) => write!(f, "unexpected column count {}", found),
            RowError::InvalidCoordinate(which) => write!(f, "non-numeric {} coordinate", which),
            RowError::InvalidStrand(s) => write!(f, "invalid strand '{}'", s),
            RowError::EmptyInterval => write!(f, "start is not before end"),
        }
    }
}

impl std::error::Error for RowError {}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct LoadStats {
    /// Data rows read (comments and blank lines excluded)
    pub rows: usize,
    pub loaded: usize,
    /// Malformed rows
    pub skipped: usize,
    pub other_chrom: usize,
    pub other_class: usize,
}

pub struct RepeatAnnotations {
    pub features: Vec<RepeatFeature>,
    pub families: FamilyIndex,
    pub stats: LoadStats,
}

impl RepeatAnnotations {
    pub fn family_name(&self, family: FamilyId) -> &str {
        self.families.get_name(family).unwrap_or("?")
    }
}

pub struct AnnotationLoader<'a> {
    pub layout: AnnotationLayout,
    pub repeat_class: &'a str,
    /// Keep only this chromosome, compared without a `chr` prefix
    pub chrom: Option<&'a str>,
}

enum Row {
    Feature(RepeatFeature, String),
    OtherChrom,
    OtherClass,
}

impl AnnotationLoader<'_> {
    fn parse_row(&self, uid: u64, line: &str) -> Result<Row, RowError> {
        let columns = self.layout.columns();
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < columns.min_fields
            || columns.max_fields.is_some_and(|max| fields.len() > max)
        {
            return Err(RowError::ColumnCount(fields.len()));
        }

        let start = fields[columns.start]
            .trim()
            .parse::<u64>()
            .map_err(|_| RowError::InvalidCoordinate("start"))?;
        let end = fields[columns.end]
            .trim()
            .parse::<u64>()
            .map_err(|_| RowError::InvalidCoordinate("end"))?;
        let strand_field = fields[columns.strand].trim();
        let strand = Strand::parse(strand_field)
            .ok_or_else(|| RowError::InvalidStrand(strand_field.to_string()))?;
        let chrom = fields[columns.chrom];
        let interval =
            GenomicInterval::new(chrom, start, end, strand).ok_or(RowError::EmptyInterval)?;

        // selection only applies to rows that parse
        if let Some(wanted) = self.chrom {
            if !same_chrom(wanted, chrom) {
                return Ok(Row::OtherChrom);
            }
        }
        if fields[columns.class] != self.repeat_class {
            return Ok(Row::OtherClass);
        }

        let name = fields[columns.name].trim().to_string();
        let feature = RepeatFeature {
            uid,
            interval,
            kind: RepeatKind::from_name(&name),
            family: FamilyId(0),
            repeat_class: fields[columns.class].to_string(),
            name: name.clone(),
        };
        Ok(Row::Feature(feature, name))
    }

    pub fn load<R: BufRead>(&self, mut reader: R) -> io::Result<RepeatAnnotations> {
        let mut families = FamilyIndex::new();
        let mut features = Vec::new();
        let mut stats = LoadStats::default();
        let mut buf = Vec::new();
        let mut uid = 0u64;

        while read_raw_line(&mut reader, &mut buf)? {
            uid += 1;
            let Ok(line) = std::str::from_utf8(&buf) else {
                debug!("Skipping annotation row {}: not valid UTF-8", uid);
                stats.rows += 1;
                stats.skipped += 1;
                continue;
            };
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            stats.rows += 1;
            match self.parse_row(uid, line) {
                Ok(Row::Feature(mut feature, name)) => {
                    feature.family = families.get_or_insert_id(&name);
                    features.push(feature);
                    stats.loaded += 1;
                }
                Ok(Row::OtherChrom) => stats.other_chrom += 1,
                Ok(Row::OtherClass) => stats.other_class += 1,
                Err(e) => {
                    debug!("Skipping annotation row {}: {}", uid, e);
                    stats.skipped += 1;
                }
            }
        }

        if stats.skipped > 0 {
            warn!("Skipped {} malformed annotation rows", stats.skipped);
        }

        Ok(RepeatAnnotations {
            features,
            families,
            stats,
        })
    }

    pub fn load_path(&self, path: &Path) -> Result<RepeatAnnotations, ErvError> {
        let reader = open_reader(path).map_err(|e| ErvError::resource(path, e))?;
        let annotations = self.load(reader)?;
        let stats = &annotations.stats;
        if stats.rows > 0 && stats.skipped == stats.rows {
            return Err(ErvError::Format(format!(
                "no parsable annotation row in '{}' ({} rows)",
                path.display(),
                stats.rows
            )));
        }
        info!(
            "Loaded {} {} features from {} ({} families, {} malformed rows skipped)",
            stats.loaded,
            self.repeat_class,
            path.display(),
            annotations.families.len(),
            stats.skipped
        );
        Ok(annotations)
    }
}
