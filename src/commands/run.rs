use crate::commands::pairs::{pair_and_score, write_pair_tables};
use crate::commands::{
    filtered_maf_path, load_annotations, locate_maf, open_genome, open_maf, output_path,
    regions_of_interest, write_table,
};
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::io::ArtifactWriter;
use crate::maf::MafWriter;
use crate::presence::PresenceChecker;
use crate::region_filter::RegionFilter;
use crate::summary::{summarize, write_presence, write_summary};
use log::info;
use std::path::Path;

pub struct RunInputs<'a> {
    pub maf_dir: &'a Path,
    pub annotations: &'a Path,
    pub genome: &'a Path,
    pub erv_regions: Option<&'a Path>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunReport {
    pub pairs: usize,
    pub solos: usize,
    pub blocks_kept: usize,
    pub presence_records: usize,
}

/// Whole pipeline for one chromosome: pair and score LTRs, then stream the alignment
/// once, writing the filtered blocks while tallying presence at every LTR locus.
pub fn run_chromosome(
    chrom: &str,
    inputs: &RunInputs,
    config: &AnalysisConfig,
    output_dir: &Path,
) -> Result<RunReport> {
    // every input is checked before anything is written
    let maf_path = locate_maf(inputs.maf_dir, chrom)?;
    let annotations = load_annotations(inputs.annotations, chrom, config)?;
    let genome = open_genome(inputs.genome, chrom)?;
    let regions =
        regions_of_interest(inputs.erv_regions, Some(&annotations), chrom, config.margin)?;

    let pairing = pair_and_score(&annotations, &genome, config);

    let loci = pairing
        .pairs
        .iter()
        .flat_map(|p| [p.left.interval.clone(), p.right.interval.clone()])
        .chain(pairing.solos.iter().map(|f| f.interval.clone()));
    let mut checker = PresenceChecker::new(loci, &config.species, config.coverage_threshold);

    let mut reader = open_maf(&maf_path, config)?;
    let header = reader.read_header()?.to_vec();
    let artifact = ArtifactWriter::create(&filtered_maf_path(output_dir, chrom))?;
    let mut writer = MafWriter::new(artifact);
    writer.write_header(&header)?;

    let mut filter = RegionFilter::new(reader.by_ref(), &regions);
    for block in filter.by_ref() {
        let block = block?;
        writer.write_block(&block)?;
        checker.observe(&block);
    }
    let filter_stats = filter.stats().clone();
    let maf_stats = reader.finish()?;
    let artifact_path = writer.into_inner().commit()?;
    info!(
        "Kept {} of {} alignment blocks for {} ({} malformed) -> {}",
        filter_stats.kept,
        filter_stats.seen,
        chrom,
        maf_stats.malformed,
        artifact_path.display()
    );

    let presence = checker.finish();
    let summary = summarize(&pairing.pairs, &presence, &config.ranking);

    write_pair_tables(&pairing, chrom, output_dir)?;
    write_table(&output_path(output_dir, chrom, "presence.tsv"), |out| {
        write_presence(out, &presence)
    })?;
    write_table(&output_path(output_dir, chrom, "summary.tsv"), |out| {
        write_summary(out, &summary)
    })?;

    Ok(RunReport {
        pairs: pairing.pairs.len(),
        solos: pairing.solos.len(),
        blocks_kept: filter_stats.kept,
        presence_records: presence.len(),
    })
}
