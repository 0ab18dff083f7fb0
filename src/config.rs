use crate::error::ErvError;
use crate::pairing::PairingParams;
use crate::repeats::AnnotationLayout;
use crate::similarity::SimilarityMode;
use crate::species::SpeciesRanking;
use rustc_hash::FxHashSet;

/// Policy knobs shared by every per-chromosome stage
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub pairing: PairingParams,
    /// A species is present at a locus when its coverage is strictly above this
    pub coverage_threshold: f64,
    /// Padding around each region of interest when filtering alignment blocks
    pub margin: u64,
    /// Species id of the reference in the MAF `src` field
    pub reference: String,
    pub repeat_class: String,
    pub layout: AnnotationLayout,
    pub similarity_mode: SimilarityMode,
    pub ranking: SpeciesRanking,
    /// Target species, in output order
    pub species: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let ranking = SpeciesRanking::builtin();
        Self {
            pairing: PairingParams::default(),
            coverage_threshold: 0.1,
            margin: 2000,
            reference: "hg38".to_string(),
            repeat_class: "LTR".to_string(),
            layout: AnnotationLayout::Rmsk,
            similarity_mode: SimilarityMode::Identity,
            species: resolve_species(&[], &ranking),
            ranking,
        }
    }
}

/// The requested species with duplicates dropped, or every ranked species when none is requested
pub fn resolve_species(requested: &[String], ranking: &SpeciesRanking) -> Vec<String> {
    if requested.is_empty() {
        return ranking.iter().map(|s| s.id.clone()).collect();
    }
    let mut seen = FxHashSet::default();
    requested
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

impl AnalysisConfig {
    /// Reject unusable settings before any input is opened
    pub fn validate(&self) -> Result<(), ErvError> {
        let fail = |msg: String| Err(ErvError::Configuration(msg));

        if self.pairing.max_gap == 0 {
            return fail("--max-gap must be greater than 0".to_string());
        }
        if self.pairing.min_gap > self.pairing.max_gap {
            return fail(format!(
                "--min-gap ({}) exceeds --max-gap ({})",
                self.pairing.min_gap, self.pairing.max_gap
            ));
        }
        if !(0.0..1.0).contains(&self.coverage_threshold) {
            return fail(format!(
                "--coverage-threshold must be in [0, 1), got {}",
                self.coverage_threshold
            ));
        }
        if self.reference.trim().is_empty() {
            return fail("--reference must not be empty".to_string());
        }
        if self.repeat_class.trim().is_empty() {
            return fail("--repeat-class must not be empty".to_string());
        }
        if self.species.is_empty() {
            return fail("no target species".to_string());
        }
        for species in &self.species {
            if species == &self.reference {
                return fail(format!(
                    "reference species '{}' cannot be a target species",
                    species
                ));
            }
            if !self.ranking.contains(species) {
                return fail(format!(
                    "unknown species id '{}' (not in the species ranking)",
                    species
                ));
            }
        }
        Ok(())
    }
}
