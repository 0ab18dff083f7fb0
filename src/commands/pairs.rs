use crate::commands::{load_annotations, open_genome, output_path, write_table};
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::pairing::{pair_features, score_pairs, PairingResult};
use crate::repeats::RepeatAnnotations;
use crate::sequence_index::SequenceSource;
use crate::summary::{write_pairs, write_solos};
use log::info;
use std::path::Path;

pub struct PairInputs<'a> {
    pub annotations: &'a Path,
    pub genome: &'a Path,
}

/// Pair the LTRs of `annotations` and score every pair against `genome`
pub fn pair_and_score<S: SequenceSource + ?Sized>(
    annotations: &RepeatAnnotations,
    genome: &S,
    config: &AnalysisConfig,
) -> PairingResult {
    let mut result = pair_features(&annotations.features, &config.pairing);
    let stats = score_pairs(&mut result.pairs, genome, config.similarity_mode);
    info!(
        "Scored {} pairs ({} without informative bases, {} not retrievable)",
        stats.scored, stats.undefined, stats.failed
    );
    result
}

pub fn write_pair_tables(result: &PairingResult, chrom: &str, output_dir: &Path) -> Result<()> {
    write_table(&output_path(output_dir, chrom, "pairs.tsv"), |out| {
        write_pairs(out, &result.pairs)
    })?;
    write_table(&output_path(output_dir, chrom, "solo.tsv"), |out| {
        write_solos(out, &result.solos)
    })
}

pub fn run_pairs(
    chrom: &str,
    inputs: &PairInputs,
    config: &AnalysisConfig,
    output_dir: &Path,
) -> Result<PairingResult> {
    let annotations = load_annotations(inputs.annotations, chrom, config)?;
    let genome = open_genome(inputs.genome, chrom)?;
    let result = pair_and_score(&annotations, &genome, config);
    write_pair_tables(&result, chrom, output_dir)?;
    Ok(result)
}
