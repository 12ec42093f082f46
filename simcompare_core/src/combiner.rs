//! Score combination laws for composite runs.
//!
//! Every law is a pure function over the per-mode result maps. Modes are
//! visited in `CompareMode` order so floating point sums are reproducible.

use simcompare_common::{CombinationLogic, CompareMode, ScoreMap};
use std::collections::{BTreeMap, HashMap};

/// Per-mode flat results of one composite run
pub type ModeResults = BTreeMap<CompareMode, ScoreMap>;

/// Combine per-mode results under `logic`.
///
/// `weights` is only read by the weighted law; modes missing from it count
/// with weight 1.0.
pub fn combine(
    logic: CombinationLogic,
    results: &ModeResults,
    weights: &HashMap<CompareMode, f64>,
) -> ScoreMap {
    match logic {
        CombinationLogic::And => combine_and(results),
        CombinationLogic::Or => combine_or(results),
        CombinationLogic::Weighted => combine_weighted(results, weights),
    }
}

/// Intersection of all modes, keeping the minimum score
pub fn combine_and(results: &ModeResults) -> ScoreMap {
    let mut maps = results.values();
    let Some(first) = maps.next() else {
        return ScoreMap::new();
    };

    let mut combined = first.clone();
    for scores in maps {
        combined.retain(|file, combined_score| match scores.get(file) {
            Some(score) => {
                *combined_score = combined_score.min(*score);
                true
            }
            None => false,
        });
        if combined.is_empty() {
            break;
        }
    }
    combined
}

/// Union of all modes, keeping the maximum score
pub fn combine_or(results: &ModeResults) -> ScoreMap {
    let mut combined = ScoreMap::new();
    for scores in results.values() {
        for (file, score) in scores {
            combined
                .entry(file.clone())
                .and_modify(|existing| *existing = existing.max(*score))
                .or_insert(*score);
        }
    }
    combined
}

/// Union of all modes, each file scored by the weighted mean over the modes
/// that contain it. A zero weight sum scores the file 0.0.
pub fn combine_weighted(results: &ModeResults, weights: &HashMap<CompareMode, f64>) -> ScoreMap {
    let mut sums: HashMap<&std::path::Path, (f64, f64)> = HashMap::new();
    for (mode, scores) in results {
        let weight = weights.get(mode).copied().unwrap_or(1.0);
        for (file, score) in scores {
            let entry = sums.entry(file.as_path()).or_insert((0.0, 0.0));
            entry.0 += score * weight;
            entry.1 += weight;
        }
    }

    sums.into_iter()
        .map(|(file, (weighted_sum, weight_sum))| {
            let combined = if weight_sum == 0.0 {
                0.0
            } else {
                weighted_sum / weight_sum
            };
            (file.to_path_buf(), combined)
        })
        .collect()
}
