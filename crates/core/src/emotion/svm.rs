//! One-vs-one support vector classifier loaded from a JSON artifact.
//!
//! The artifact mirrors the libsvm model layout exported by common training
//! toolkits: support vectors grouped by class, `n_classes - 1` rows of dual
//! coefficients and one intercept per class pair. For the pair `(i, j)` with
//! `i < j` the decision value is
//!
//! ```text
//! sum_{sv in i} dual_coef[j - 1][sv] * K(sv, x)
//!   + sum_{sv in j} dual_coef[i][sv] * K(sv, x) + intercept[pair]
//! ```
//!
//! and a positive value is a vote for `i`. Ties go to the lower class index.

use crate::emotion::classifier::{ClassifyError, EmotionClassifier, ModelLoadError};
use crate::emotion::EmotionCode;
use crate::features::FeatureVector;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const SVM_FORMAT_VERSION: u32 = 1;
const LOG_TARGET: &str = "emotion::svm";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Kernel {
    Linear,
    Rbf { gamma: f64 },
    Poly { gamma: f64, coef0: f64, degree: i32 },
    Sigmoid { gamma: f64, coef0: f64 },
}

impl Kernel {
    fn eval(&self, a: &[f64], b: &[f64]) -> f64 {
        match *self {
            Kernel::Linear => dot(a, b),
            Kernel::Rbf { gamma } => {
                let dist: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
                (-gamma * dist).exp()
            }
            Kernel::Poly {
                gamma,
                coef0,
                degree,
            } => (gamma * dot(a, b) + coef0).powi(degree),
            Kernel::Sigmoid { gamma, coef0 } => (gamma * dot(a, b) + coef0).tanh(),
        }
    }

    fn params_are_finite(&self) -> bool {
        match *self {
            Kernel::Linear => true,
            Kernel::Rbf { gamma } => gamma.is_finite(),
            Kernel::Poly { gamma, coef0, .. } | Kernel::Sigmoid { gamma, coef0 } => {
                gamma.is_finite() && coef0.is_finite()
            }
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Standardisation applied to the features before the kernel.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Scaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl Scaler {
    fn apply(&self, x: &mut [f64]) {
        for ((v, m), s) in x.iter_mut().zip(&self.mean).zip(&self.scale) {
            *v = (*v - m) / s;
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SvmArtifact {
    pub format_version: u32,
    pub n_features: usize,
    pub classes: Vec<EmotionCode>,
    pub kernel: Kernel,
    pub support_vectors: Vec<Vec<f64>>,
    pub n_support: Vec<usize>,
    pub dual_coef: Vec<Vec<f64>>,
    pub intercept: Vec<f64>,
    #[serde(default)]
    pub scaler: Option<Scaler>,
}

impl SvmArtifact {
    pub fn validate(&self) -> Result<(), ModelLoadError> {
        if self.format_version != SVM_FORMAT_VERSION {
            return Err(ModelLoadError::UnsupportedVersion {
                found: self.format_version,
                expected: SVM_FORMAT_VERSION,
            });
        }

        let n_classes = self.classes.len();
        if n_classes < 2 {
            return Err(inconsistent(format!(
                "need at least two classes, found {n_classes}"
            )));
        }
        for (i, a) in self.classes.iter().enumerate() {
            if self.classes[i + 1..].contains(a) {
                return Err(inconsistent(format!("class {} listed twice", a.code())));
            }
        }
        if self.n_support.len() != n_classes {
            return Err(inconsistent(format!(
                "n_support has {} entries for {n_classes} classes",
                self.n_support.len()
            )));
        }

        let n_sv: usize = self.n_support.iter().sum();
        if n_sv != self.support_vectors.len() {
            return Err(inconsistent(format!(
                "n_support sums to {n_sv} but {} support vectors are stored",
                self.support_vectors.len()
            )));
        }
        if let Some(bad) = self
            .support_vectors
            .iter()
            .position(|sv| sv.len() != self.n_features)
        {
            return Err(inconsistent(format!(
                "support vector {bad} does not have {} features",
                self.n_features
            )));
        }

        if self.dual_coef.len() != n_classes - 1 || self.dual_coef.iter().any(|r| r.len() != n_sv)
        {
            return Err(inconsistent(format!(
                "dual_coef must be {} rows of {n_sv} values",
                n_classes - 1
            )));
        }

        let n_pairs = n_classes * (n_classes - 1) / 2;
        if self.intercept.len() != n_pairs {
            return Err(inconsistent(format!(
                "expected {n_pairs} intercepts, found {}",
                self.intercept.len()
            )));
        }

        if !self.kernel.params_are_finite() {
            return Err(inconsistent("kernel parameters must be finite".to_owned()));
        }

        if let Some(scaler) = &self.scaler {
            if scaler.mean.len() != self.n_features || scaler.scale.len() != self.n_features {
                return Err(inconsistent(format!(
                    "scaler must have {} means and scales",
                    self.n_features
                )));
            }
            if scaler.scale.iter().any(|s| *s == 0.0 || !s.is_finite()) {
                return Err(inconsistent(
                    "scaler scales must be finite and non-zero".to_owned(),
                ));
            }
        }

        Ok(())
    }
}

fn inconsistent(msg: String) -> ModelLoadError {
    ModelLoadError::Inconsistent(msg)
}

#[derive(Clone, Debug)]
pub struct SvmClassifier {
    artifact: SvmArtifact,
    offsets: Vec<usize>,
}

impl SvmClassifier {
    /// Reads and validates an artifact. `expected_width` is the length of the
    /// feature vectors the extractor will produce.
    pub fn load(path: &Path, expected_width: usize) -> Result<Self, ModelLoadError> {
        let json = std::fs::read_to_string(path).map_err(|source| ModelLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let model = Self::from_json(&json, expected_width)?;
        tracing::info!(
            target: LOG_TARGET,
            path = %path.display(),
            classes = model.artifact.classes.len(),
            support_vectors = model.artifact.support_vectors.len(),
            "loaded svm model"
        );
        Ok(model)
    }

    pub fn from_json(json: &str, expected_width: usize) -> Result<Self, ModelLoadError> {
        let artifact: SvmArtifact = serde_json::from_str(json)?;
        Self::from_artifact(artifact, expected_width)
    }

    pub fn from_artifact(
        artifact: SvmArtifact,
        expected_width: usize,
    ) -> Result<Self, ModelLoadError> {
        artifact.validate()?;
        if artifact.n_features != expected_width {
            return Err(ModelLoadError::WidthMismatch {
                model: artifact.n_features,
                expected: expected_width,
            });
        }

        let mut offsets = Vec::with_capacity(artifact.n_support.len() + 1);
        offsets.push(0);
        for n in &artifact.n_support {
            let last = offsets[offsets.len() - 1];
            offsets.push(last + n);
        }

        Ok(Self { artifact, offsets })
    }

    pub fn classes(&self) -> &[EmotionCode] {
        &self.artifact.classes
    }

    fn votes(&self, x: &[f64]) -> Vec<usize> {
        let a = &self.artifact;
        let kvals: Vec<f64> = a.support_vectors.iter().map(|sv| a.kernel.eval(sv, x)).collect();

        let n_classes = a.classes.len();
        let mut votes = vec![0usize; n_classes];
        let mut pair = 0;
        for i in 0..n_classes {
            for j in i + 1..n_classes {
                let mut decision = a.intercept[pair];
                for k in self.offsets[i]..self.offsets[i + 1] {
                    decision += a.dual_coef[j - 1][k] * kvals[k];
                }
                for k in self.offsets[j]..self.offsets[j + 1] {
                    decision += a.dual_coef[i][k] * kvals[k];
                }
                if decision > 0.0 {
                    votes[i] += 1;
                } else {
                    votes[j] += 1;
                }
                pair += 1;
            }
        }
        votes
    }
}

impl EmotionClassifier for SvmClassifier {
    fn input_width(&self) -> usize {
        self.artifact.n_features
    }

    fn predict(&self, features: &FeatureVector) -> Result<EmotionCode, ClassifyError> {
        if features.len() != self.artifact.n_features {
            return Err(ClassifyError::FeatureShapeMismatch {
                expected: self.artifact.n_features,
                got: features.len(),
            });
        }

        let mut x: Vec<f64> = features.as_slice().iter().map(|&v| f64::from(v)).collect();
        if let Some(scaler) = &self.artifact.scaler {
            scaler.apply(&mut x);
        }

        let votes = self.votes(&x);
        let mut best = 0;
        for (idx, &v) in votes.iter().enumerate().skip(1) {
            if v > votes[best] {
                best = idx;
            }
        }
        Ok(self.artifact.classes[best])
    }
}
