use crate::commands::{
    filtered_maf_path, load_annotations, locate_maf, open_maf, regions_of_interest,
};
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::io::ArtifactWriter;
use crate::region_filter::{write_filtered, FilterStats};
use log::info;
use std::path::{Path, PathBuf};

pub struct FilterInputs<'a> {
    pub maf_dir: &'a Path,
    pub erv_regions: Option<&'a Path>,
    pub annotations: Option<&'a Path>,
}

/// Reduce one chromosome's alignment to the blocks touching its regions of interest
pub fn run_filter(
    chrom: &str,
    inputs: &FilterInputs,
    config: &AnalysisConfig,
    output_dir: &Path,
) -> Result<(PathBuf, FilterStats)> {
    let maf_path = locate_maf(inputs.maf_dir, chrom)?;

    // the region file wins; annotations are only read when there is none
    let annotations = match (inputs.erv_regions, inputs.annotations) {
        (None, Some(path)) => Some(load_annotations(path, chrom, config)?),
        _ => None,
    };
    let regions = regions_of_interest(
        inputs.erv_regions,
        annotations.as_ref(),
        chrom,
        config.margin,
    )?;

    let mut reader = open_maf(&maf_path, config)?;
    let header = reader.read_header()?.to_vec();
    let mut artifact = ArtifactWriter::create(&filtered_maf_path(output_dir, chrom))?;
    let stats = write_filtered(&header, reader.by_ref(), &regions, &mut artifact)?;
    let maf_stats = reader.finish()?;
    let path = artifact.commit()?;

    info!(
        "Kept {} of {} alignment blocks for {} ({} malformed, {} without {}) -> {}",
        stats.kept,
        stats.seen,
        chrom,
        maf_stats.malformed,
        maf_stats.missing_reference,
        config.reference,
        path.display()
    );
    Ok((path, stats))
}
