mod classifier;
mod svm;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use classifier::{ClassifyError, EmotionClassifier, ModelLoadError};
pub use svm::{Kernel, Scaler, SvmArtifact, SvmClassifier, SVM_FORMAT_VERSION};

/// The closed set of labels the classifier can emit, keyed by their
/// two-digit dataset codes.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EmotionCode {
    #[serde(rename = "01")]
    Neutral,
    #[serde(rename = "02")]
    Happy,
    #[serde(rename = "03")]
    Surprise,
    #[serde(rename = "04")]
    Disgust,
    #[serde(rename = "05")]
    Disappointed,
}

impl EmotionCode {
    pub const ALL: [EmotionCode; 5] = [
        EmotionCode::Neutral,
        EmotionCode::Happy,
        EmotionCode::Surprise,
        EmotionCode::Disgust,
        EmotionCode::Disappointed,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            EmotionCode::Neutral => "01",
            EmotionCode::Happy => "02",
            EmotionCode::Surprise => "03",
            EmotionCode::Disgust => "04",
            EmotionCode::Disappointed => "05",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EmotionCode::Neutral => "neutral",
            EmotionCode::Happy => "happy",
            EmotionCode::Surprise => "surprise",
            EmotionCode::Disgust => "disgust",
            EmotionCode::Disappointed => "disappointed",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            EmotionCode::Neutral => "😐",
            EmotionCode::Happy => "😄",
            EmotionCode::Surprise => "😲",
            EmotionCode::Disgust => "🤢",
            EmotionCode::Disappointed => "😤",
        }
    }
}

impl fmt::Display for EmotionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.code(), self.name(), self.emoji())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_as_dataset_identifiers() {
        let json = serde_json::to_string(&EmotionCode::ALL).unwrap();
        assert_eq!(json, r#"["01","02","03","04","05"]"#);
        let back: Vec<EmotionCode> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EmotionCode::ALL.to_vec());
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert!(serde_json::from_str::<EmotionCode>(r#""06""#).is_err());
    }

    #[test]
    fn display_includes_code_and_name() {
        assert_eq!(EmotionCode::Surprise.to_string(), "03 surprise 😲");
        for e in EmotionCode::ALL {
            assert_eq!(e.code().len(), 2);
        }
    }
}
