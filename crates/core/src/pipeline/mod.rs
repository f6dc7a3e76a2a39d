use crate::clip::{ClipNormalizer, NormalizedClip, Rejection};
use crate::config::{ClipPolicy, ExtractionParams, AUDIO_EXTENSION};
use crate::decode::{AudioDecoder, DecodeError, Waveform};
use crate::emotion::{ClassifyError, EmotionClassifier, EmotionCode};
use crate::features::{FeatureVector, MfccExtractor};
use std::fmt;
use std::path::{Path, PathBuf};

const LOG_TARGET: &str = "pipeline";

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("extractor produces {extractor} coefficients but the model expects {model}")]
    WidthMismatch { extractor: usize, model: usize },

    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error("cannot list {}: {source}", .path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClipSource {
    File(PathBuf),
    Memory { name: String, bytes: Vec<u8> },
}

impl ClipSource {
    pub fn name(&self) -> String {
        match self {
            ClipSource::File(path) => path.display().to_string(),
            ClipSource::Memory { name, .. } => name.clone(),
        }
    }
}

impl From<PathBuf> for ClipSource {
    fn from(path: PathBuf) -> Self {
        ClipSource::File(path)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RejectReason {
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Duration(#[from] Rejection),
}

impl RejectReason {
    /// Stable machine-readable name, used in JSON reports.
    pub fn kind(&self) -> &'static str {
        match self {
            RejectReason::Decode(_) => "decode",
            RejectReason::Duration(Rejection::InsufficientDuration { .. }) => "too_short",
        }
    }

    /// Source duration, when the clip got far enough to have one.
    pub fn duration_s(&self) -> Option<f64> {
        match self {
            RejectReason::Decode(_) => None,
            RejectReason::Duration(Rejection::InsufficientDuration { duration_s, .. }) => {
                Some(*duration_s)
            }
        }
    }
}

#[derive(Debug)]
pub struct Classification {
    pub emotion: EmotionCode,
    pub features: FeatureVector,
    pub clip: NormalizedClip,
}

#[derive(Debug)]
pub enum ClipOutcome {
    Classified(Classification),
    Rejected(RejectReason),
}

impl ClipOutcome {
    pub fn is_classified(&self) -> bool {
        matches!(self, ClipOutcome::Classified(_))
    }
}

#[derive(Debug)]
pub struct ClipReport {
    pub source: String,
    pub outcome: ClipOutcome,
}

impl fmt::Display for ClipReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            ClipOutcome::Classified(c) => write!(
                f,
                "{}: {} ({:.2} s)",
                self.source,
                c.emotion,
                c.clip.source_duration_s()
            ),
            ClipOutcome::Rejected(reason) => write!(f, "{}: rejected: {reason}", self.source),
        }
    }
}

/// Decode → normalize → extract → classify, one clip at a time.
pub struct ClipPipeline<D, C> {
    decoder: D,
    normalizer: ClipNormalizer,
    extractor: MfccExtractor,
    classifier: C,
}

impl<D, C> ClipPipeline<D, C>
where
    D: AudioDecoder,
    C: EmotionClassifier,
{
    pub fn new(
        decoder: D,
        classifier: C,
        extraction: ExtractionParams,
        clip: ClipPolicy,
    ) -> Result<Self, PipelineError> {
        if extraction.n_mfcc != classifier.input_width() {
            return Err(PipelineError::WidthMismatch {
                extractor: extraction.n_mfcc,
                model: classifier.input_width(),
            });
        }
        Ok(Self {
            decoder,
            normalizer: ClipNormalizer::new(clip),
            extractor: MfccExtractor::new(extraction),
            classifier,
        })
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Classifies an already decoded waveform. A too-short clip is an
    /// `Ok(Rejected)`; only a classifier failure is an error.
    pub fn classify_waveform(&self, waveform: &Waveform) -> Result<ClipOutcome, ClassifyError> {
        let clip = match self.normalizer.normalize(waveform) {
            Ok(clip) => clip,
            Err(rejection) => return Ok(ClipOutcome::Rejected(rejection.into())),
        };
        let features = self.extractor.extract(&clip);
        let emotion = self.classifier.predict(&features)?;
        Ok(ClipOutcome::Classified(Classification {
            emotion,
            features,
            clip,
        }))
    }

    pub fn process(&self, source: &ClipSource) -> Result<ClipReport, PipelineError> {
        let name = source.name();
        let decoded = match source {
            ClipSource::File(path) => self.decoder.decode_file(path),
            ClipSource::Memory { name, bytes } => self.decoder.decode_bytes(name, bytes.clone()),
        };

        let outcome = match decoded {
            Ok(waveform) => {
                tracing::debug!(
                    target: LOG_TARGET,
                    source = %name,
                    duration_s = waveform.duration_secs(),
                    "decoded clip"
                );
                self.classify_waveform(&waveform)?
            }
            Err(e) => ClipOutcome::Rejected(e.into()),
        };

        match &outcome {
            ClipOutcome::Classified(c) => {
                tracing::info!(
                    target: LOG_TARGET,
                    source = %name,
                    emotion = c.emotion.code(),
                    "classified clip"
                );
            }
            ClipOutcome::Rejected(reason) => {
                tracing::warn!(target: LOG_TARGET, source = %name, %reason, "clip skipped");
            }
        }

        Ok(ClipReport {
            source: name,
            outcome,
        })
    }

    /// Lazily processes `sources` in order. Rejections are reported as items
    /// and never stop the iteration; an `Err` item means the model itself
    /// cannot be used and the caller should stop.
    pub fn run<'a>(
        &'a self,
        sources: &'a [ClipSource],
    ) -> impl Iterator<Item = Result<ClipReport, PipelineError>> + 'a {
        sources.iter().map(move |source| self.process(source))
    }

    /// Same as [`run`](Self::run) but spreads clips across the rayon pool.
    /// Reports come back in source order.
    #[cfg(feature = "parallel")]
    pub fn run_parallel(
        &self,
        sources: &[ClipSource],
    ) -> Vec<Result<ClipReport, PipelineError>> {
        use rayon::prelude::*;
        sources.par_iter().map(|source| self.process(source)).collect()
    }
}

/// Audio files directly inside `dir` (no recursion), sorted by path.
pub fn list_audio_files(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let read_dir_err = |source| PipelineError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_dir_err)? {
        let path = entry.map_err(read_dir_err)?.path();
        if path.is_file() && has_audio_extension(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub fn has_audio_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(AUDIO_EXTENSION))
        .unwrap_or(false)
}
