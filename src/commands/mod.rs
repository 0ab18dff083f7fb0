//! Per-chromosome drivers. Each one owns its inputs and outputs; nothing is
//! shared between chromosomes except read-only input files.

pub mod filter;
pub mod pairs;
pub mod run;

use crate::config::AnalysisConfig;
use crate::error::{ErvError, Result};
use crate::faidx::FastaIndex;
use crate::interval::normalize_chrom;
use crate::io::{open_reader, ArtifactWriter};
use crate::maf::MafReader;
use crate::region_filter::{load_bed_regions, RegionSet};
use crate::repeats::{AnnotationLoader, RepeatAnnotations};
use log::{info, warn};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

/// Artifact path for one chromosome, e.g. `out/chr1.pairs.tsv`
pub fn output_path(output_dir: &Path, chrom: &str, suffix: &str) -> PathBuf {
    output_dir.join(format!("{}.{}", chrom, suffix))
}

pub fn filtered_maf_path(output_dir: &Path, chrom: &str) -> PathBuf {
    output_path(output_dir, chrom, "ERV.maf.gz")
}

/// `<maf_dir>/<chrom>.maf.gz` or `<maf_dir>/<chrom>.maf`, also trying the name with
/// the `chr` prefix added or removed
pub fn locate_maf(maf_dir: &Path, chrom: &str) -> Result<PathBuf> {
    let bare = normalize_chrom(chrom);
    let mut names = vec![chrom.to_string()];
    for alias in [bare.to_string(), format!("chr{}", bare)] {
        if !names.contains(&alias) {
            names.push(alias);
        }
    }

    names
        .iter()
        .flat_map(|name| {
            [
                maf_dir.join(format!("{}.maf.gz", name)),
                maf_dir.join(format!("{}.maf", name)),
            ]
        })
        .find(|path| path.is_file())
        .ok_or_else(|| {
            ErvError::resource(
                &maf_dir.join(format!("{}.maf.gz", chrom)),
                io::Error::new(io::ErrorKind::NotFound, "alignment file not found"),
            )
        })
}

pub fn open_maf(path: &Path, config: &AnalysisConfig) -> Result<MafReader<Box<dyn BufRead>>> {
    let reader = open_reader(path).map_err(|e| ErvError::resource(path, e))?;
    Ok(MafReader::new(reader, Some(&config.reference)))
}

pub fn load_annotations(
    path: &Path,
    chrom: &str,
    config: &AnalysisConfig,
) -> Result<RepeatAnnotations> {
    let loader = AnnotationLoader {
        layout: config.layout,
        repeat_class: &config.repeat_class,
        chrom: Some(chrom),
    };
    let annotations = loader.load_path(path)?;
    if annotations.features.is_empty() {
        warn!(
            "No {} annotation on {} in {}",
            config.repeat_class,
            chrom,
            path.display()
        );
    }
    Ok(annotations)
}

/// Regions of interest for the alignment filter: the ERV regions and the loaded
/// repeat features, whichever are given
pub fn regions_of_interest(
    erv_regions: Option<&Path>,
    annotations: Option<&RepeatAnnotations>,
    chrom: &str,
    margin: u64,
) -> Result<RegionSet> {
    if erv_regions.is_none() && annotations.is_none() {
        return Err(ErvError::Configuration(
            "either --erv-regions or --annotations is required".to_string(),
        ));
    }

    let mut intervals = Vec::new();
    if let Some(path) = erv_regions {
        let bed = load_bed_regions(path, Some(chrom)).map_err(|e| ErvError::resource(path, e))?;
        if bed.skipped > 0 {
            warn!("Skipped {} malformed rows in {}", bed.skipped, path.display());
        }
        intervals.extend(bed.intervals);
    }
    if let Some(annotations) = annotations {
        intervals.extend(annotations.features.iter().map(|f| f.interval.clone()));
    }

    let regions = RegionSet::from_intervals(&intervals, margin);
    if regions.is_empty() {
        warn!("No region of interest on {}, every alignment block will be dropped", chrom);
    }
    info!("Filtering against {} regions (margin {} bp)", regions.len(), margin);
    Ok(regions)
}

pub fn open_genome(path: &Path, chrom: &str) -> Result<FastaIndex> {
    let genome = FastaIndex::build_from_files(&[path.to_path_buf()])
        .map_err(|e| ErvError::resource(path, e))?;
    if genome.resolve_name(chrom).is_none() {
        return Err(ErvError::resource(
            path,
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("sequence '{}' not found in the genome index", chrom),
            ),
        ));
    }
    Ok(genome)
}

/// Write a whole table through a temporary file, renaming it into place on success
pub fn write_table<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut ArtifactWriter) -> io::Result<()>,
{
    let mut writer = ArtifactWriter::create(path)?;
    write(&mut writer)?;
    writer.flush()?;
    writer.commit()?;
    info!("Wrote {}", path.display());
    Ok(())
}
