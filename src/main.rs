use clap::Parser;
use ervage::commands::filter::{run_filter, FilterInputs};
use ervage::commands::pairs::{run_pairs, PairInputs};
use ervage::commands::run::{run_chromosome, RunInputs};
use ervage::config::{resolve_species, AnalysisConfig};
use ervage::error::{ErvError, Result};
use ervage::pairing::PairingParams;
use ervage::repeats::AnnotationLayout;
use ervage::similarity::SimilarityMode;
use ervage::species::SpeciesRanking;
use log::info;
use rayon::ThreadPoolBuilder;
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Common options shared between all commands
#[derive(Parser, Debug)]
struct CommonOpts {
    /// Directory receiving the per-chromosome artifacts
    #[clap(short = 'o', long, value_parser, default_value = ".")]
    output_dir: PathBuf,

    /// Number of threads for parallel processing.
    #[clap(short = 't', long, value_parser, default_value_t = NonZeroUsize::new(4).unwrap())]
    threads: NonZeroUsize,

    /// Verbosity level (0 = error, 1 = info, 2 = debug)
    #[clap(short, long, default_value = "0")]
    verbose: u8,
}

/// Analysis policy; validated before any input is opened
#[derive(Parser, Debug)]
struct AnalysisOpts {
    /// Maximum distance between the two LTRs of a pair (bp)
    #[clap(long, value_parser, default_value_t = 10_000)]
    max_gap: u64,

    /// Minimum distance between the two LTRs of a pair (bp)
    #[clap(long, value_parser, default_value_t = 0)]
    min_gap: u64,

    /// Only pair LTRs with an internal (`*-int`) element between them
    #[clap(long, action)]
    require_internal: bool,

    /// Repeat class kept from the annotation
    #[clap(long, value_parser, default_value = "LTR")]
    repeat_class: String,

    /// Layout of the annotation table
    #[clap(long, value_enum, default_value_t = AnnotationLayout::Rmsk)]
    annotation_layout: AnnotationLayout,

    /// A species is present at a locus when its coverage is above this fraction
    #[clap(long, value_parser, default_value_t = 0.1)]
    coverage_threshold: f64,

    /// Padding added around each region of interest before filtering alignment blocks (bp)
    #[clap(long, value_parser, default_value_t = 2000)]
    margin: u64,

    /// Reference species id, as in the `species.chrom` names of the alignment
    #[clap(long, value_parser, default_value = "hg38")]
    reference: String,

    /// Comma-separated target species (default: every species of the ranking)
    #[clap(long, value_parser, value_delimiter = ',')]
    species: Vec<String>,

    /// Species ranking table (species, rank, lca_mya, common name); default: built-in primates
    #[clap(long, value_parser)]
    species_ranking: Option<PathBuf>,

    /// How LTR pair similarity is computed
    #[clap(long, value_enum, default_value_t = SimilarityMode::Identity)]
    similarity_mode: SimilarityMode,
}

/// ERV age estimation from LTR divergence and cross-species presence.
#[derive(Parser, Debug)]
#[command(author, version, about, disable_help_subcommand = true)]
enum Args {
    /// Keep the alignment blocks of a chromosome that touch ERV regions
    Filter {
        /// Chromosome to process
        chrom: String,

        #[clap(flatten)]
        common: CommonOpts,

        #[clap(flatten)]
        analysis: AnalysisOpts,

        /// Directory with the per-chromosome alignments (<CHROM>.maf.gz or <CHROM>.maf)
        #[clap(long, value_parser)]
        maf_dir: PathBuf,

        /// BED file with ERV regions
        #[clap(long, value_parser, required_unless_present = "annotations")]
        erv_regions: Option<PathBuf>,

        /// Repeat annotation; its features are the regions when no --erv-regions is given
        #[clap(short = 'a', long, value_parser)]
        annotations: Option<PathBuf>,
    },
    /// Pair the LTRs of a chromosome and score their similarity
    Pairs {
        /// Chromosome to process
        chrom: String,

        #[clap(flatten)]
        common: CommonOpts,

        #[clap(flatten)]
        analysis: AnalysisOpts,

        /// Repeat annotation (rmsk.txt or BED6-like, optionally gzipped)
        #[clap(short = 'a', long, value_parser)]
        annotations: PathBuf,

        /// Indexed reference genome FASTA
        #[clap(short = 'g', long, value_parser)]
        genome: PathBuf,
    },
    /// Filter, pair, check presence and summarize one chromosome
    Run {
        /// Chromosome to process
        chrom: String,

        #[clap(flatten)]
        common: CommonOpts,

        #[clap(flatten)]
        analysis: AnalysisOpts,

        /// Directory with the per-chromosome alignments (<CHROM>.maf.gz or <CHROM>.maf)
        #[clap(long, value_parser)]
        maf_dir: PathBuf,

        /// Repeat annotation (rmsk.txt or BED6-like, optionally gzipped)
        #[clap(short = 'a', long, value_parser)]
        annotations: PathBuf,

        /// Indexed reference genome FASTA
        #[clap(short = 'g', long, value_parser)]
        genome: PathBuf,

        /// BED file with ERV regions, added to the LTR loci when filtering
        #[clap(long, value_parser)]
        erv_regions: Option<PathBuf>,
    },
}

impl Args {
    fn chrom(&self) -> &str {
        match self {
            Args::Filter { chrom, .. } | Args::Pairs { chrom, .. } | Args::Run { chrom, .. } => {
                chrom
            }
        }
    }
}

fn main() {
    let args = Args::parse();
    let chrom = args.chrom().to_string();

    if let Err(e) = run(args) {
        eprintln!("ervage: error [{}]: {}", chrom, e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    match args {
        Args::Filter {
            chrom,
            common,
            analysis,
            maf_dir,
            erv_regions,
            annotations,
        } => {
            let config = initialize(&common, analysis)?;
            let inputs = FilterInputs {
                maf_dir: &maf_dir,
                erv_regions: erv_regions.as_deref(),
                annotations: annotations.as_deref(),
            };
            run_filter(&chrom, &inputs, &config, &common.output_dir)?;
        }
        Args::Pairs {
            chrom,
            common,
            analysis,
            annotations,
            genome,
        } => {
            let config = initialize(&common, analysis)?;
            let inputs = PairInputs {
                annotations: &annotations,
                genome: &genome,
            };
            let result = run_pairs(&chrom, &inputs, &config, &common.output_dir)?;
            info!(
                "{}: {} pairs, {} solo LTRs",
                chrom,
                result.pairs.len(),
                result.solos.len()
            );
        }
        Args::Run {
            chrom,
            common,
            analysis,
            maf_dir,
            annotations,
            genome,
            erv_regions,
        } => {
            let config = initialize(&common, analysis)?;
            let inputs = RunInputs {
                maf_dir: &maf_dir,
                annotations: &annotations,
                genome: &genome,
                erv_regions: erv_regions.as_deref(),
            };
            let report = run_chromosome(&chrom, &inputs, &config, &common.output_dir)?;
            info!(
                "{}: {} pairs, {} solo LTRs, {} alignment blocks kept, {} presence records",
                chrom, report.pairs, report.solos, report.blocks_kept, report.presence_records
            );
        }
    }

    Ok(())
}

/// Set up logging and the thread pool, then build and validate the analysis configuration
fn initialize(common: &CommonOpts, analysis: AnalysisOpts) -> Result<AnalysisConfig> {
    // Initialize logger based on verbosity
    env_logger::Builder::new()
        .filter_level(match common.verbose {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .init();

    // Configure thread pool
    ThreadPoolBuilder::new()
        .num_threads(common.threads.into())
        .build_global()
        .map_err(|e| ErvError::Configuration(format!("cannot start thread pool: {}", e)))?;

    let ranking = match &analysis.species_ranking {
        Some(path) => SpeciesRanking::load(path)?,
        None => SpeciesRanking::builtin(),
    };
    let config = AnalysisConfig {
        pairing: PairingParams {
            max_gap: analysis.max_gap,
            min_gap: analysis.min_gap,
            require_internal: analysis.require_internal,
        },
        coverage_threshold: analysis.coverage_threshold,
        margin: analysis.margin,
        reference: analysis.reference,
        repeat_class: analysis.repeat_class,
        layout: analysis.annotation_layout,
        similarity_mode: analysis.similarity_mode,
        species: resolve_species(&analysis.species, &ranking),
        ranking,
    };
    config.validate()?;

    std::fs::create_dir_all(&common.output_dir)?;
    Ok(config)
}
