use simcompare_common::{CompareArgs, CompareMode, Result, ScoreMap};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

/// Result of one comparator pass
#[derive(Debug, Clone, PartialEq)]
pub enum CompareOutcome {
    /// Files ranked against a search image or text, reported as group 0
    Search(ScoreMap),
    /// Partition of the directory into groups keyed by group index
    Groups {
        groups: BTreeMap<usize, ScoreMap>,
        /// Pairs the comparator considers probable duplicates
        duplicates: Vec<(PathBuf, PathBuf)>,
    },
}

impl CompareOutcome {
    pub fn empty_search() -> Self {
        CompareOutcome::Search(ScoreMap::new())
    }

    /// Flat `file -> score` view of the result: the contents of group 0,
    /// or nothing when the comparator produced no group 0.
    pub fn flat_scores(&self) -> ScoreMap {
        match self {
            CompareOutcome::Search(scores) => scores.clone(),
            CompareOutcome::Groups { groups, .. } => groups.get(&0).cloned().unwrap_or_default(),
        }
    }

    pub fn into_flat_scores(self) -> ScoreMap {
        match self {
            CompareOutcome::Search(scores) => scores,
            CompareOutcome::Groups { mut groups, .. } => groups.remove(&0).unwrap_or_default(),
        }
    }
}

/// One comparison algorithm bound to a base directory.
///
/// Implementations compute the scores; the engine only consumes the shape of
/// the result. Returning an empty outcome is not an error.
pub trait Comparator: Send {
    fn mode(&self) -> CompareMode;

    /// Directory the comparator gathered its data from
    fn base_dir(&self) -> &Path;

    /// Execute one comparison pass. Implementations that can stop mid-flight
    /// should poll `cancel` and return `SimCompareError::Cancelled`.
    fn run(&mut self, args: &CompareArgs, cancel: Option<&AtomicBool>) -> Result<CompareOutcome>;

    /// Drop any cached data for files that left the file set
    fn remove_files(&mut self, _files: &[PathBuf]) {}

    /// Restore files previously passed to `remove_files`
    fn readd_files(&mut self, _files: &[PathBuf]) {}

    /// Whether two files are related enough to be skipped over when browsing
    fn is_related(&self, _first: &Path, _second: &Path) -> bool {
        false
    }
}

/// Creates the comparator for a mode on first use
pub type ComparatorFactory =
    Box<dyn Fn(CompareMode, &CompareArgs) -> Result<Box<dyn Comparator>> + Send + Sync>;
