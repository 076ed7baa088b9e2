use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use super::delta::{ConstructPrediction, DeltaKey, FluxDelta, PairKey, PairwiseInteraction};
use crate::agent::Compartment;
use crate::error::CacheError;

const SINGLES_FILE: &str = "single_deltas.json";
const PAIRS_FILE: &str = "pairwise_interactions.json";
const SUMMARY_FILE: &str = "cache_summary.json";

/// Confidence multiplier applied for every intervention missing from the cache.
const MISSING_CONFIDENCE_FACTOR: f64 = 0.8;
/// Confidence reported when more than half of a construct is unknown.
const LOW_CONFIDENCE: f64 = 0.1;

/// Human-readable overview written next to the cache files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSummary {
    pub single_deltas: usize,
    pub pairwise_interactions: usize,
    pub interventions: Vec<String>,
}

/// Store of single-intervention deltas and pairwise corrections.
///
/// Predictions for a whole construct are composed from the stored pieces
/// instead of simulating every combination.
#[derive(Debug, Default)]
pub struct DeltaCache {
    dir: Option<PathBuf>,
    singles: HashMap<DeltaKey, FluxDelta>,
    pairs: HashMap<PairKey, f64>,
}

impl DeltaCache {
    /// A cache that is never persisted.
    pub fn in_memory() -> Self {
        DeltaCache::default()
    }

    /// Open a persistent cache, loading whatever is already in `dir`.
    ///
    /// Unreadable files are logged and treated as empty.
    pub fn open(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let mut cache = DeltaCache {
            dir: Some(dir.clone()),
            ..Default::default()
        };

        if let Some(deltas) = load_json::<Vec<FluxDelta>>(&dir.join(SINGLES_FILE)) {
            for delta in deltas {
                cache.insert(delta);
            }
            info!(count = cache.singles.len(), "loaded single-intervention deltas");
        }
        if let Some(pairs) = load_json::<Vec<PairwiseInteraction>>(&dir.join(PAIRS_FILE)) {
            for interaction in pairs {
                cache.pairs.insert(interaction.pair, interaction.correction);
            }
            info!(count = cache.pairs.len(), "loaded pairwise interactions");
        }
        cache
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Write the store to its directory. In-memory caches are left alone.
    pub fn save(&self) -> Result<(), CacheError> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        fs::create_dir_all(dir).map_err(|source| CacheError::Persist {
            path: dir.clone(),
            source,
        })?;

        let mut singles: Vec<&FluxDelta> = self.singles.values().collect();
        singles.sort_by(|a, b| a.key().cmp(&b.key()));
        write_json(&dir.join(SINGLES_FILE), &singles)?;

        let mut pairs: Vec<PairwiseInteraction> = self
            .pairs
            .iter()
            .map(|(pair, &correction)| PairwiseInteraction {
                pair: pair.clone(),
                correction,
            })
            .collect();
        pairs.sort_by(|a, b| a.pair.cmp(&b.pair));
        write_json(&dir.join(PAIRS_FILE), &pairs)?;

        write_json(&dir.join(SUMMARY_FILE), &self.summary())?;
        Ok(())
    }

    pub fn insert(&mut self, delta: FluxDelta) {
        self.singles.insert(delta.key(), delta);
    }

    pub fn get(&self, key: &DeltaKey) -> Option<&FluxDelta> {
        self.singles.get(key)
    }

    /// Whether the base-magnitude delta for this intervention is stored.
    pub fn contains(&self, intervention: &str, compartment: Compartment) -> bool {
        self.singles
            .contains_key(&DeltaKey::base(intervention, compartment))
    }

    pub fn len(&self) -> usize {
        self.singles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.singles.is_empty()
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    pub fn insert_interaction(&mut self, a: &str, b: &str, correction: f64) {
        self.pairs.insert(PairKey::new(a, b), correction);
    }

    pub fn interaction(&self, a: &str, b: &str) -> Option<f64> {
        self.pairs.get(&PairKey::new(a, b)).copied()
    }

    /// Distinct intervention ids with at least one stored delta.
    pub fn interventions(&self) -> BTreeSet<String> {
        self.singles
            .values()
            .map(|d| d.intervention.clone())
            .collect()
    }

    /// Every (intervention, compartment) from `library` without a stored delta.
    pub fn missing_singles(&self, library: &[String]) -> Vec<(String, Compartment)> {
        library
            .iter()
            .flat_map(|id| Compartment::ALL.into_iter().map(move |c| (id, c)))
            .filter(|(id, c)| !self.contains(id, *c))
            .map(|(id, c)| (id.clone(), c))
            .collect()
    }

    /// Unordered pairs of cached interventions with no stored correction.
    pub fn missing_pairs(&self) -> Vec<PairKey> {
        let ids: Vec<String> = self.interventions().into_iter().collect();
        let mut missing = Vec::new();
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                let key = PairKey::new(a.as_str(), b.as_str());
                if !self.pairs.contains_key(&key) {
                    missing.push(key);
                }
            }
        }
        missing
    }

    /// Estimate the outcome of applying several interventions together.
    ///
    /// The three slices are read in lockstep; entries past the shortest are
    /// ignored everywhere, including the missing-count cutoff. Each
    /// cached delta is scaled by its magnitude and composed: the primary
    /// outcome adds up while growth and cofactor ratio multiply by
    /// `1 + delta`. Pairwise corrections then scale the primary outcome.
    /// Every missing intervention costs confidence; when more than half are
    /// missing the baseline is returned with low confidence.
    pub fn get_construct_prediction<S: AsRef<str>>(
        &self,
        interventions: &[S],
        compartments: &[Compartment],
        magnitudes: &[u32],
    ) -> ConstructPrediction {
        let count = interventions.len().min(compartments.len()).min(magnitudes.len());
        if count != interventions.len() || count != compartments.len() || count != magnitudes.len() {
            warn!(
                interventions = interventions.len(),
                compartments = compartments.len(),
                magnitudes = magnitudes.len(),
                "construct slices differ in length, using the first {count}"
            );
        }
        let interventions = &interventions[..count];

        let mut prediction = ConstructPrediction::baseline();
        let mut effects = Vec::new();
        let mut missing = 0usize;

        for ((id, &compartment), &magnitude) in interventions.iter().zip(compartments).zip(magnitudes) {
            match self.singles.get(&DeltaKey::base(id.as_ref(), compartment)) {
                Some(delta) => effects.push(delta.scale(magnitude as f64)),
                None => {
                    missing += 1;
                    prediction.confidence *= MISSING_CONFIDENCE_FACTOR;
                }
            }
        }

        if missing > interventions.len() / 2 {
            prediction.confidence = LOW_CONFIDENCE;
            return prediction;
        }

        for effect in &effects {
            prediction.primary_outcome += effect.primary_delta;
            prediction.growth_rate *= 1.0 + effect.growth_delta;
            prediction.cofactor_ratio *= 1.0 + effect.cofactor_delta;
        }

        for (i, a) in interventions.iter().enumerate() {
            for b in &interventions[i + 1..] {
                if let Some(correction) = self.interaction(a.as_ref(), b.as_ref()) {
                    prediction.primary_outcome *= 1.0 + correction;
                }
            }
        }

        prediction.clamped()
    }

    pub fn summary(&self) -> CacheSummary {
        CacheSummary {
            single_deltas: self.singles.len(),
            pairwise_interactions: self.pairs.len(),
            interventions: self.interventions().into_iter().collect(),
        }
    }
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    if !path.exists() {
        return None;
    }
    let parsed = fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|text| serde_json::from_str(&text).map_err(|e| e.to_string()));
    match parsed {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load cache file, starting empty");
            None
        }
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), CacheError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).map_err(|source| CacheError::Persist {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(id: &str, compartment: Compartment, primary: f64, growth: f64, cofactor: f64) -> FluxDelta {
        FluxDelta {
            intervention: id.into(),
            compartment,
            magnitude: 1,
            primary_delta: primary,
            growth_delta: growth,
            cofactor_delta: cofactor,
            top_flux_deltas: Vec::new(),
        }
    }

    fn sample_cache() -> DeltaCache {
        let mut cache = DeltaCache::in_memory();
        cache.insert(delta("A", Compartment::Cytosol, -1.0, -0.1, 0.2));
        cache.insert(delta("B", Compartment::Mitochondria, -0.5, 0.0, -0.5));
        cache
    }

    #[test]
    fn test_empty_construct_is_baseline() {
        let cache = sample_cache();
        let empty: [&str; 0] = [];
        let prediction = cache.get_construct_prediction(&empty, &[], &[]);
        assert_eq!(prediction, ConstructPrediction::baseline());
    }

    #[test]
    fn test_composition_scales_and_multiplies() {
        let cache = sample_cache();
        let prediction = cache.get_construct_prediction(
            &["A", "B"],
            &[Compartment::Cytosol, Compartment::Mitochondria],
            &[2, 1],
        );
        // A scaled by 2: primary -2.0, growth -0.2, cofactor +0.4
        assert!((prediction.primary_outcome + 2.5).abs() < 1e-9);
        assert!((prediction.growth_rate - 0.8).abs() < 1e-9);
        assert!((prediction.cofactor_ratio - 1.4 * 0.5).abs() < 1e-9);
        assert_eq!(prediction.confidence, 1.0);
    }

    #[test]
    fn test_pairwise_correction_scales_primary_only() {
        let mut cache = sample_cache();
        cache.insert_interaction("B", "A", 0.5);
        let prediction = cache.get_construct_prediction(
            &["A", "B"],
            &[Compartment::Cytosol, Compartment::Mitochondria],
            &[1, 1],
        );
        assert!((prediction.primary_outcome + 1.5 * 1.5).abs() < 1e-9);
        assert!((prediction.growth_rate - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_unequal_slices_use_common_prefix() {
        let mut cache = sample_cache();
        cache.insert_interaction("A", "B", 0.5);

        // One looked-up entry, and it is missing: more than half of those read
        let prediction = cache.get_construct_prediction(&["C", "A", "B"], &[Compartment::Cytosol], &[1, 1, 1]);
        assert_eq!(prediction.confidence, 0.1);
        assert_eq!(prediction.primary_outcome, 0.0);

        // B is never read, so its pairwise correction does not apply
        let prediction = cache.get_construct_prediction(
            &["A", "B"],
            &[Compartment::Cytosol, Compartment::Mitochondria],
            &[1],
        );
        assert!((prediction.primary_outcome + 1.0).abs() < 1e-9);
        assert_eq!(prediction.confidence, 1.0);
    }

    #[test]
    fn test_missing_interventions_reduce_confidence() {
        let cache = sample_cache();
        let one_missing = cache.get_construct_prediction(
            &["A", "B", "C"],
            &[Compartment::Cytosol, Compartment::Mitochondria, Compartment::Cytosol],
            &[1, 1, 1],
        );
        assert!((one_missing.confidence - 0.8).abs() < 1e-12);

        // Same id in the wrong compartment counts as missing
        let two_missing = cache.get_construct_prediction(
            &["A", "B", "C"],
            &[Compartment::Cytosol, Compartment::Peroxisome, Compartment::Cytosol],
            &[1, 1, 1],
        );
        assert_eq!(two_missing.confidence, 0.1);
        assert_eq!(two_missing.primary_outcome, 0.0);
        assert_eq!(two_missing.growth_rate, 1.0);
        assert!(two_missing.confidence < one_missing.confidence);
    }

    #[test]
    fn test_single_missing_intervention_short_circuits() {
        let cache = sample_cache();
        let prediction = cache.get_construct_prediction(&["Z"], &[Compartment::Cytosol], &[1]);
        assert_eq!(prediction.confidence, 0.1);
        assert_eq!(prediction.primary_outcome, 0.0);
    }

    #[test]
    fn test_outputs_stay_in_range() {
        let mut cache = DeltaCache::in_memory();
        cache.insert(delta("X", Compartment::Cytosol, 1e9, 1e9, -1.0));
        cache.insert(delta("Y", Compartment::Cytosol, -1e300, -2.0, 1e300));
        for ids in [vec!["X"], vec!["Y"], vec!["X", "Y"]] {
            let n = ids.len();
            let p = cache.get_construct_prediction(&ids, &vec![Compartment::Cytosol; n], &vec![8; n]);
            assert!((-10.0..=10.0).contains(&p.primary_outcome), "{p:?}");
            assert!((0.0..=1.5).contains(&p.growth_rate), "{p:?}");
            assert!((0.1..=10.0).contains(&p.cofactor_ratio), "{p:?}");
            assert!((0.0..=1.0).contains(&p.confidence));
        }
    }

    #[test]
    fn test_missing_singles_and_pairs() {
        let mut cache = sample_cache();
        let library = vec!["A".to_string(), "B".to_string()];
        let missing = cache.missing_singles(&library);
        assert_eq!(missing.len(), 4);
        assert!(!missing.contains(&("A".to_string(), Compartment::Cytosol)));
        assert!(missing.contains(&("A".to_string(), Compartment::Peroxisome)));

        assert_eq!(cache.missing_pairs(), vec![PairKey::new("A", "B")]);
        cache.insert_interaction("A", "B", -0.1);
        assert!(cache.missing_pairs().is_empty());
    }

    #[test]
    fn test_save_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = DeltaCache::open(dir.path());
        assert!(cache.is_empty());
        cache.insert(delta("A", Compartment::Cytosol, -1.0, -0.1, 0.2));
        cache.insert_interaction("A", "B", 0.25);
        cache.save().unwrap();
        assert!(dir.path().join("cache_summary.json").exists());

        let reopened = DeltaCache::open(dir.path());
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.interaction("B", "A"), Some(0.25));
        assert!(reopened.contains("A", Compartment::Cytosol));
        assert_eq!(reopened.summary().interventions, vec!["A".to_string()]);
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(SINGLES_FILE), "{not json").unwrap();
        let cache = DeltaCache::open(dir.path());
        assert!(cache.is_empty());
    }
}
