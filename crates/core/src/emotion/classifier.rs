use crate::emotion::EmotionCode;
use crate::features::FeatureVector;
use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum ModelLoadError {
    #[error("cannot read model artifact {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model artifact is not valid: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unsupported model format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("model expects {model} features but the extractor produces {expected}")]
    WidthMismatch { model: usize, expected: usize },

    #[error("inconsistent model artifact: {0}")]
    Inconsistent(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("feature vector has {got} values, model expects {expected}")]
    FeatureShapeMismatch { expected: usize, got: usize },
}

/// A loaded, read-only model mapping one feature vector to one label.
///
/// Implementations must not mutate state on `predict`; the same vector
/// always yields the same label.
pub trait EmotionClassifier: Send + Sync {
    fn input_width(&self) -> usize;

    fn predict(&self, features: &FeatureVector) -> Result<EmotionCode, ClassifyError>;
}
