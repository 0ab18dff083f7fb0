//! Species distance ranking used to date an insertion by the most distant
//! species that still carries it.

use crate::error::ErvError;
use crate::io::open_reader;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Ordering;
use std::io::BufRead;
use std::path::Path;

// species, rank (larger = more distant from the reference), LCA age in MYA, common name
const PRIMATE_RANKING: &str = "\
#species\trank\tlca_mya\tcommon_name
panTro5\t1\t6\tChimpanzee
panPan2\t1\t6\tBonobo
gorGor5\t1\t7\tGorilla
ponAbe2\t2\t13\tSumatran orangutan
nomLeu3\t3\t19\tNorthern white-cheeked gibbon
chlSab2\t4\t23\tGreen monkey
colAng1\t4\t23\tAngolan colobus
macFas5\t4\t23\tCrab-eating macaque
macNem1\t4\t23\tPig-tailed macaque
manLeu1\t4\t23\tDrill
nasLar1\t4\t23\tProboscis monkey
papAnu3\t4\t23\tOlive baboon
rheMac8\t4\t23\tRhesus macaque
rhiBie1\t4\t23\tBlack snub-nosed monkey
rhiRox1\t4\t23\tGolden snub-nosed monkey
cerAty1\t5\t33\tSooty mangabey
aotNan1\t5\t33\tMa's night monkey
calJac3\t5\t33\tCommon marmoset
cebCap1\t5\t33\tCapuchin monkey
saiBol1\t5\t33\tBolivian squirrel monkey
";

#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesInfo {
    pub id: String,
    pub rank: u32,
    pub lca_mya: f64,
    pub common_name: String,
}

/// Orders by distance: rank, then LCA age, then the natural order of the id (reversed,
/// so the first id alphabetically is the maximum among equals)
fn distance_order(a: &SpeciesInfo, b: &SpeciesInfo) -> Ordering {
    a.rank
        .cmp(&b.rank)
        .then(a.lca_mya.total_cmp(&b.lca_mya))
        .then_with(|| natord::compare(&b.id, &a.id))
}

#[derive(Debug, Clone)]
pub struct SpeciesRanking {
    species: Vec<SpeciesInfo>,
    by_id: FxHashMap<String, usize>,
}

impl SpeciesRanking {
    /// Primates of the UCSC 30-way alignment relative to hg38
    pub fn builtin() -> Self {
        Self::parse(PRIMATE_RANKING.as_bytes()).unwrap_or_else(|_| Self::from_species(Vec::new()))
    }

    fn from_species(mut species: Vec<SpeciesInfo>) -> Self {
        // closest first
        species.sort_by(|a, b| {
            a.rank
                .cmp(&b.rank)
                .then(a.lca_mya.total_cmp(&b.lca_mya))
                .then_with(|| natord::compare(&a.id, &b.id))
        });
        let by_id = species
            .iter()
            .enumerate()
            .map(|(idx, s)| (s.id.clone(), idx))
            .collect();
        Self { species, by_id }
    }

    /// Parse a `species<TAB>rank<TAB>lca_mya[<TAB>common name]` table; `#` lines are comments
    pub fn parse<R: BufRead>(reader: R) -> Result<Self, ErvError> {
        let mut species = Vec::new();
        let mut seen = FxHashSet::default();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim_end();
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            let bad_row = |what: &str| {
                ErvError::Configuration(format!(
                    "species ranking line {}: {} in '{}'",
                    idx + 1,
                    what,
                    line
                ))
            };
            if fields.len() < 3 {
                return Err(bad_row("expected at least 3 columns"));
            }
            let rank = fields[1]
                .trim()
                .parse::<u32>()
                .map_err(|_| bad_row("invalid rank"))?;
            let lca_mya = fields[2]
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v >= 0.0)
                .ok_or_else(|| bad_row("invalid LCA age"))?;
            let id = fields[0].trim().to_string();
            if id.is_empty() {
                return Err(bad_row("empty species id"));
            }
            if !seen.insert(id.clone()) {
                return Err(bad_row("duplicate species id"));
            }
            species.push(SpeciesInfo {
                id,
                rank,
                lca_mya,
                common_name: fields.get(3).map(|s| s.trim()).unwrap_or("").to_string(),
            });
        }
        if species.is_empty() {
            return Err(ErvError::Configuration(
                "species ranking contains no species".to_string(),
            ));
        }
        Ok(Self::from_species(species))
    }

    pub fn load(path: &Path) -> Result<Self, ErvError> {
        let reader = open_reader(path).map_err(|e| ErvError::resource(path, e))?;
        Self::parse(reader)
    }

    pub fn get(&self, id: &str) -> Option<&SpeciesInfo> {
        self.by_id.get(id).map(|&idx| &self.species[idx])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Species from closest to most distant
    pub fn iter(&self) -> impl Iterator<Item = &SpeciesInfo> {
        self.species.iter()
    }

    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    /// Most distant ranked species among `present`; unranked ids are ignored
    pub fn most_distant<'a, I>(&self, present: I) -> Option<&SpeciesInfo>
    where
        I: IntoIterator<Item = &'a str>,
    {
        present
            .into_iter()
            .filter_map(|id| self.get(id))
            .max_by(|a, b| distance_order(a, b))
    }
}
