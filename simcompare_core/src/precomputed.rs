use crate::comparator::{Comparator, CompareOutcome};
use serde::Deserialize;
use simcompare_common::{CompareArgs, CompareMode, Result, ScoreMap, SimCompareError, SortDirection};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// On-disk score file layouts
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScoreFile {
    Grouped {
        /// Group keys are decimal strings in JSON
        groups: BTreeMap<String, HashMap<PathBuf, f64>>,
        #[serde(default)]
        duplicates: Vec<(PathBuf, PathBuf)>,
    },
    Flat(HashMap<PathBuf, f64>),
}

/// Comparator that serves scores computed ahead of time and stored as JSON.
///
/// Either a flat `{"file": score}` object or
/// `{"groups": {"0": {"file": score}}, "duplicates": [["a", "b"]]}`.
/// Relative file paths resolve against the run's base directory.
#[derive(Debug, Clone)]
pub struct PrecomputedComparator {
    mode: CompareMode,
    base_dir: PathBuf,
    score_file: PathBuf,
    filter_by_threshold: bool,
    removed: HashSet<PathBuf>,
    /// File to group key from the last grouped run
    last_groups: HashMap<PathBuf, usize>,
}

impl PrecomputedComparator {
    pub fn new(mode: CompareMode, base_dir: impl Into<PathBuf>, score_file: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            base_dir: base_dir.into(),
            score_file: score_file.into(),
            filter_by_threshold: false,
            removed: HashSet::new(),
            last_groups: HashMap::new(),
        }
    }

    /// Drop flat scores that fall on the wrong side of the run threshold
    pub fn with_threshold_filter(mut self, enabled: bool) -> Self {
        self.filter_by_threshold = enabled;
        self
    }

    fn load(&self) -> Result<ScoreFile> {
        let content = fs::read_to_string(&self.score_file)?;
        serde_json::from_str(&content).map_err(|e| {
            SimCompareError::Serialization(format!(
                "Failed to parse score file {}: {}",
                self.score_file.display(),
                e
            ))
        })
    }

    fn resolve_scores(&self, scores: HashMap<PathBuf, f64>, base_dir: &Path) -> ScoreMap {
        scores
            .into_iter()
            .map(|(file, score)| (resolve(base_dir, file), score))
            .filter(|(file, _)| !self.removed.contains(file))
            .collect()
    }

    fn passes_threshold(&self, score: f64, threshold: f64) -> bool {
        match self.mode.sort_direction() {
            SortDirection::Descending => score >= threshold,
            SortDirection::Ascending => score <= threshold,
        }
    }
}

fn resolve(base_dir: &Path, file: PathBuf) -> PathBuf {
    if file.is_absolute() {
        file
    } else {
        base_dir.join(file)
    }
}

impl Comparator for PrecomputedComparator {
    fn mode(&self) -> CompareMode {
        self.mode
    }

    fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn run(&mut self, args: &CompareArgs, cancel: Option<&AtomicBool>) -> Result<CompareOutcome> {
        if let Some(flag) = cancel {
            if flag.load(Ordering::Relaxed) {
                return Err(SimCompareError::Cancelled);
            }
        }
        info!(
            "Loading {} scores from {}",
            self.mode,
            self.score_file.display()
        );

        match self.load()? {
            ScoreFile::Flat(scores) => {
                let mut scores = self.resolve_scores(scores, &args.base_dir);
                if self.filter_by_threshold {
                    scores.retain(|_, score| self.passes_threshold(*score, args.threshold));
                }
                debug!("{} scores loaded", scores.len());
                Ok(CompareOutcome::Search(scores))
            }
            ScoreFile::Grouped { groups, duplicates } => {
                let mut parsed: BTreeMap<usize, ScoreMap> = BTreeMap::new();
                for (key, scores) in groups {
                    let index = key.parse::<usize>().map_err(|_| {
                        SimCompareError::Serialization(format!("Invalid group key '{}'", key))
                    })?;
                    let scores = self.resolve_scores(scores, &args.base_dir);
                    if !scores.is_empty() {
                        parsed.insert(index, scores);
                    }
                }
                let groups = parsed;
                let duplicates: Vec<(PathBuf, PathBuf)> = duplicates
                    .into_iter()
                    .map(|(first, second)| (resolve(&args.base_dir, first), resolve(&args.base_dir, second)))
                    .filter(|(first, second)| !self.removed.contains(first) && !self.removed.contains(second))
                    .collect();

                self.last_groups = groups
                    .iter()
                    .flat_map(|(key, scores)| scores.keys().map(move |file| (file.clone(), *key)))
                    .collect();
                debug!("{} groups loaded", groups.len());
                Ok(CompareOutcome::Groups { groups, duplicates })
            }
        }
    }

    fn remove_files(&mut self, files: &[PathBuf]) {
        self.removed.extend(files.iter().cloned());
    }

    fn readd_files(&mut self, files: &[PathBuf]) {
        for file in files {
            self.removed.remove(file);
        }
    }

    fn is_related(&self, first: &Path, second: &Path) -> bool {
        match (self.last_groups.get(first), self.last_groups.get(second)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_flat_scores_resolve_against_base_dir() {
        let temp = TempDir::new().unwrap();
        let file = write(&temp, "clip.json", r#"{"a.png": 0.95, "/abs/b.png": 0.5}"#);
        let mut comparator = PrecomputedComparator::new(CompareMode::ClipEmbedding, temp.path(), file);
        let args = CompareArgs::new(temp.path());

        let outcome = comparator.run(&args, None).unwrap();
        let scores = outcome.into_flat_scores();
        assert_eq!(scores[&temp.path().join("a.png")], 0.95);
        assert_eq!(scores[Path::new("/abs/b.png")], 0.5);
    }

    #[test]
    fn test_grouped_scores_and_relations() {
        let temp = TempDir::new().unwrap();
        let file = write(
            &temp,
            "color.json",
            r#"{"groups": {"0": {"a.png": 0.0, "b.png": 2.0}, "4": {"c.png": 1.0}},
                "duplicates": [["a.png", "b.png"]]}"#,
        );
        let mut comparator = PrecomputedComparator::new(CompareMode::ColorMatching, temp.path(), file);
        let outcome = comparator.run(&CompareArgs::new(temp.path()), None).unwrap();

        match outcome {
            CompareOutcome::Groups { groups, duplicates } => {
                assert_eq!(groups.len(), 2);
                assert_eq!(groups[&4].len(), 1);
                assert_eq!(duplicates.len(), 1);
            }
            other => panic!("expected groups, got {:?}", other),
        }
        let a = temp.path().join("a.png");
        let b = temp.path().join("b.png");
        let c = temp.path().join("c.png");
        assert!(comparator.is_related(&a, &b));
        assert!(!comparator.is_related(&a, &c));
    }

    #[test]
    fn test_removed_files_are_filtered_until_readded() {
        let temp = TempDir::new().unwrap();
        let file = write(&temp, "clip.json", r#"{"a.png": 0.9, "b.png": 0.8}"#);
        let mut comparator = PrecomputedComparator::new(CompareMode::ClipEmbedding, temp.path(), file);
        let args = CompareArgs::new(temp.path());
        let a = temp.path().join("a.png");

        comparator.remove_files(&[a.clone()]);
        let scores = comparator.run(&args, None).unwrap().into_flat_scores();
        assert!(!scores.contains_key(&a));

        comparator.readd_files(&[a.clone()]);
        let scores = comparator.run(&args, None).unwrap().into_flat_scores();
        assert!(scores.contains_key(&a));
    }

    #[test]
    fn test_threshold_filter_follows_sort_direction() {
        let temp = TempDir::new().unwrap();
        let file = write(&temp, "color.json", r#"{"near.png": 3.0, "far.png": 25.0}"#);
        let mut comparator =
            PrecomputedComparator::new(CompareMode::ColorMatching, temp.path(), file).with_threshold_filter(true);
        let mut args = CompareArgs::new(temp.path());
        args.threshold = 15.0;

        let scores = comparator.run(&args, None).unwrap().into_flat_scores();
        assert_eq!(scores.len(), 1);
        assert!(scores.contains_key(&temp.path().join("near.png")));
    }

    #[test]
    fn test_invalid_score_file() {
        let temp = TempDir::new().unwrap();
        let file = write(&temp, "broken.json", "not json");
        let mut comparator = PrecomputedComparator::new(CompareMode::ClipEmbedding, temp.path(), file);
        let result = comparator.run(&CompareArgs::new(temp.path()), None);
        assert!(matches!(result, Err(SimCompareError::Serialization(_))));

        let mut missing =
            PrecomputedComparator::new(CompareMode::ClipEmbedding, temp.path(), temp.path().join("none.json"));
        assert!(matches!(
            missing.run(&CompareArgs::new(temp.path()), None),
            Err(SimCompareError::Io(_))
        ));
    }

    #[test]
    fn test_cancelled_before_loading() {
        let temp = TempDir::new().unwrap();
        let file = write(&temp, "clip.json", r#"{"a.png": 0.9}"#);
        let mut comparator = PrecomputedComparator::new(CompareMode::ClipEmbedding, temp.path(), file);
        let cancel = AtomicBool::new(true);
        let result = comparator.run(&CompareArgs::new(temp.path()), Some(&cancel));
        assert!(matches!(result, Err(SimCompareError::Cancelled)));
    }
}
