use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::SimCompareError;

/// Comparison algorithm tag.
///
/// Variants are declared in lexicographic order of their names so that the
/// derived `Ord` matches name order; maps keyed by mode iterate that way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareMode {
    AlignEmbedding,
    ClipEmbedding,
    ColorMatching,
    FlavaEmbedding,
    LaionEmbedding,
    ModelMatching,
    SiglipEmbedding,
    SizeMatching,
}

impl CompareMode {
    pub const ALL: [CompareMode; 8] = [
        CompareMode::AlignEmbedding,
        CompareMode::ClipEmbedding,
        CompareMode::ColorMatching,
        CompareMode::FlavaEmbedding,
        CompareMode::LaionEmbedding,
        CompareMode::ModelMatching,
        CompareMode::SiglipEmbedding,
        CompareMode::SizeMatching,
    ];

    /// Static metadata for this mode, looked up in [`MODE_TABLE`].
    pub fn metadata(self) -> &'static ModeMetadata {
        &MODE_TABLE[self as usize]
    }

    /// Snake-case identifier, as used in config files and on the command line
    pub fn name(self) -> &'static str {
        self.metadata().name
    }

    pub fn is_embedding(self) -> bool {
        self.metadata().is_embedding
    }

    pub fn sort_direction(self) -> SortDirection {
        self.metadata().sort_direction
    }
}

impl fmt::Display for CompareMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.metadata().label)
    }
}

impl FromStr for CompareMode {
    type Err = SimCompareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        MODE_TABLE
            .iter()
            .find(|meta| {
                meta.name.eq_ignore_ascii_case(wanted) || meta.label.eq_ignore_ascii_case(wanted)
            })
            .map(|meta| meta.mode)
            .ok_or_else(|| SimCompareError::Config(format!("Not a valid compare mode: {}", s)))
    }
}

/// Order in which a mode's scores rank files, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    /// Lower score is better (distance-style modes)
    Ascending,
    /// Higher score is better (similarity-style modes)
    Descending,
}

impl SortDirection {
    /// Ordering of two scores, best first
    pub fn compare_scores(self, a: f64, b: f64) -> Ordering {
        match self {
            SortDirection::Ascending => a.total_cmp(&b),
            SortDirection::Descending => b.total_cmp(&a),
        }
    }
}

/// Which configured fallback threshold applies when none is set explicitly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdCategory {
    ColorDistance,
    EmbeddingSimilarity,
}

#[derive(Debug)]
pub struct ModeMetadata {
    pub mode: CompareMode,
    pub name: &'static str,
    pub label: &'static str,
    pub threshold_label: &'static str,
    pub is_embedding: bool,
    pub sort_direction: SortDirection,
    pub threshold_category: ThresholdCategory,
    pub threshold_values: &'static [f64],
}

const COLOR_THRESHOLDS: &[f64] = &[
    0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0,
    17.0, 18.0, 19.0, 20.0, 21.0, 22.0, 23.0, 24.0, 25.0, 26.0, 27.0, 28.0, 29.0, 30.0,
];

const EMBEDDING_THRESHOLDS: &[f64] = &[
    0.5, 0.55, 0.6, 0.65, 0.7, 0.75, 0.8, 0.85, 0.9, 0.925, 0.95, 0.98, 0.99,
];

const SIZE_TOLERANCES: &[f64] = &[0.0, 1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0, 256.0, 512.0];

const fn embedding(mode: CompareMode, name: &'static str, label: &'static str) -> ModeMetadata {
    ModeMetadata {
        mode,
        name,
        label,
        threshold_label: "Embedding similarity threshold",
        is_embedding: true,
        sort_direction: SortDirection::Descending,
        threshold_category: ThresholdCategory::EmbeddingSimilarity,
        threshold_values: EMBEDDING_THRESHOLDS,
    }
}

/// Per-mode metadata, indexed by `CompareMode as usize`.
pub static MODE_TABLE: [ModeMetadata; 8] = [
    embedding(CompareMode::AlignEmbedding, "align_embedding", "ALIGN Embedding"),
    embedding(CompareMode::ClipEmbedding, "clip_embedding", "CLIP Embedding"),
    ModeMetadata {
        mode: CompareMode::ColorMatching,
        name: "color_matching",
        label: "Color Matching",
        threshold_label: "Color diff threshold",
        is_embedding: false,
        sort_direction: SortDirection::Ascending,
        threshold_category: ThresholdCategory::ColorDistance,
        threshold_values: COLOR_THRESHOLDS,
    },
    embedding(CompareMode::FlavaEmbedding, "flava_embedding", "FLAVA Embedding"),
    embedding(CompareMode::LaionEmbedding, "laion_embedding", "LAION Embedding"),
    ModeMetadata {
        mode: CompareMode::ModelMatching,
        name: "model_matching",
        label: "Model Matching",
        threshold_label: "Model similarity threshold",
        is_embedding: false,
        sort_direction: SortDirection::Descending,
        threshold_category: ThresholdCategory::EmbeddingSimilarity,
        threshold_values: EMBEDDING_THRESHOLDS,
    },
    embedding(CompareMode::SiglipEmbedding, "siglip_embedding", "SigLIP Embedding"),
    ModeMetadata {
        mode: CompareMode::SizeMatching,
        name: "size_matching",
        label: "Size Matching",
        threshold_label: "Size tolerance (pixels)",
        is_embedding: false,
        sort_direction: SortDirection::Descending,
        threshold_category: ThresholdCategory::EmbeddingSimilarity,
        threshold_values: SIZE_TOLERANCES,
    },
];

/// How per-mode scores are merged in a composite run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombinationLogic {
    /// File must match every mode; keeps the minimum score
    #[default]
    And,
    /// File must match any mode; keeps the maximum score
    Or,
    /// Weighted mean of the scores of the modes containing the file
    Weighted,
}

impl fmt::Display for CombinationLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CombinationLogic::And => "AND",
            CombinationLogic::Or => "OR",
            CombinationLogic::Weighted => "WEIGHTED",
        })
    }
}

impl FromStr for CombinationLogic {
    type Err = SimCompareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "and" => Ok(CombinationLogic::And),
            "or" => Ok(CombinationLogic::Or),
            "weighted" => Ok(CombinationLogic::Weighted),
            other => Err(SimCompareError::Config(format!(
                "Not a valid combination logic: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_table_matches_declaration_order() {
        for (index, mode) in CompareMode::ALL.iter().enumerate() {
            assert_eq!(MODE_TABLE[index].mode, *mode);
            assert_eq!(*mode as usize, index);
        }
    }

    #[test]
    fn test_mode_order_is_lexicographic() {
        let mut names: Vec<&str> = CompareMode::ALL.iter().map(|m| m.name()).collect();
        let declared = names.clone();
        names.sort();
        assert_eq!(names, declared);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("clip_embedding".parse::<CompareMode>().unwrap(), CompareMode::ClipEmbedding);
        assert_eq!("Color Matching".parse::<CompareMode>().unwrap(), CompareMode::ColorMatching);
        assert!("nope".parse::<CompareMode>().is_err());
    }

    #[test]
    fn test_sort_direction() {
        assert_eq!(CompareMode::ColorMatching.sort_direction(), SortDirection::Ascending);
        assert_eq!(CompareMode::ClipEmbedding.sort_direction(), SortDirection::Descending);
        assert_eq!(SortDirection::Descending.compare_scores(0.9, 0.5), Ordering::Less);
        assert_eq!(SortDirection::Ascending.compare_scores(0.9, 0.5), Ordering::Greater);
        assert!(CompareMode::SiglipEmbedding.is_embedding());
        assert!(!CompareMode::SizeMatching.is_embedding());
    }

    #[test]
    fn test_combination_logic_parse() {
        assert_eq!("WEIGHTED".parse::<CombinationLogic>().unwrap(), CombinationLogic::Weighted);
        assert_eq!(CombinationLogic::Or.to_string(), "OR");
        assert!("xor".parse::<CombinationLogic>().is_err());
    }
}
