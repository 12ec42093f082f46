use crate::{CombinationLogic, CompareMode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Per-file scores produced by one comparison pass
pub type ScoreMap = HashMap<PathBuf, f64>;

pub const DEFAULT_COLOR_DIFF_THRESHOLD: f64 = 15.0;
pub const DEFAULT_EMBEDDING_SIMILARITY_THRESHOLD: f64 = 0.9;
pub const DEFAULT_FILE_COUNTER_LIMIT: usize = 40_000;

/// Navigation context of the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppMode {
    #[default]
    Browse,
    Search,
    Group,
    Duplicates,
}

/// One configured comparison mode in the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeConfig {
    pub mode: CompareMode,
    /// Only used under weighted combination
    pub weight: f64,
    /// Overrides the run threshold for this mode
    pub threshold: Option<f64>,
    pub enabled: bool,
    /// Replaces the run's positive search text for this mode
    pub search_text: Option<String>,
    /// Replaces the run's negative search text for this mode
    pub search_text_negative: Option<String>,
}

impl ModeConfig {
    pub fn new(mode: CompareMode) -> Self {
        Self {
            mode,
            weight: 1.0,
            threshold: None,
            enabled: true,
            search_text: None,
            search_text_negative: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_threshold(mut self, threshold: Option<f64>) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_search_text(mut self, positive: Option<String>, negative: Option<String>) -> Self {
        self.search_text = positive;
        self.search_text_negative = negative;
        self
    }
}

/// Arguments for a single comparison run.
///
/// Fields other than the mode, threshold and the scalar settings are passed
/// through to the comparator untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareArgs {
    pub base_dir: PathBuf,
    pub mode: CompareMode,
    pub recursive: bool,
    pub searching_image: bool,
    pub search_file_path: Option<PathBuf>,
    pub search_text: Option<String>,
    pub search_text_negative: Option<String>,
    pub find_duplicates: bool,
    pub counter_limit: usize,
    pub threshold: f64,
    pub compare_faces: bool,
    pub inclusion_pattern: Option<String>,
    pub include_videos: bool,
    pub overwrite: bool,
    pub store_checkpoints: bool,
}

impl CompareArgs {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    /// True when the run ranks files against a search image or search text
    /// rather than grouping the whole directory.
    pub fn is_search(&self) -> bool {
        self.searching_image || self.search_text.is_some()
    }
}

impl Default for CompareArgs {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            mode: CompareMode::ClipEmbedding,
            recursive: true,
            searching_image: false,
            search_file_path: None,
            search_text: None,
            search_text_negative: None,
            find_duplicates: false,
            counter_limit: DEFAULT_FILE_COUNTER_LIMIT,
            threshold: DEFAULT_EMBEDDING_SIMILARITY_THRESHOLD,
            compare_faces: false,
            inclusion_pattern: None,
            include_videos: false,
            overwrite: false,
            store_checkpoints: false,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Mode the orchestrator starts with
    pub default_compare_mode: Option<CompareMode>,

    /// Combination logic for composite runs
    pub combination_logic: CombinationLogic,

    /// Fallback threshold for color-distance modes
    pub color_diff_threshold: f64,

    /// Fallback threshold for embedding/similarity modes
    pub embedding_similarity_threshold: f64,

    /// Maximum number of files a comparison scans
    pub file_counter_limit: usize,

    /// Whether comparators store intermediate checkpoints
    pub store_checkpoints: bool,

    /// Enable portable mode (config alongside binary)
    pub portable_mode: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_compare_mode: Some(CompareMode::ClipEmbedding),
            combination_logic: CombinationLogic::And,
            color_diff_threshold: DEFAULT_COLOR_DIFF_THRESHOLD,
            embedding_similarity_threshold: DEFAULT_EMBEDDING_SIMILARITY_THRESHOLD,
            file_counter_limit: DEFAULT_FILE_COUNTER_LIMIT,
            store_checkpoints: false,
            portable_mode: false,
        }
    }
}
