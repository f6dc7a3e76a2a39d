use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL_PATH: &str = "model/svm_mfcc.json";
pub const DEFAULT_N_MFCC: usize = 20;
pub const DEFAULT_N_MELS: usize = 128;
pub const DEFAULT_FRAME_LENGTH_S: f64 = 0.025;
pub const DEFAULT_HOP_LENGTH_S: f64 = 0.01;
pub const DEFAULT_PREEMPHASIS: f32 = 0.97;
pub const DEFAULT_MIN_DURATION_S: f64 = 2.0;
pub const DEFAULT_TARGET_DURATION_S: u32 = 3;
pub const AUDIO_EXTENSION: &str = "wav";
pub const ENV_MODEL_PATH: &str = "SPEECH_EMOTION_MODEL";
pub const ENV_DIAGNOSTICS_DIR: &str = "SPEECH_EMOTION_DIAGNOSTICS_DIR";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum InputSource {
    File(PathBuf),
    Directory(PathBuf),
    Stdin,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelPath(PathBuf);

impl ModelPath {
    pub fn new<S: Into<String>>(value: S) -> Result<Self, ConfigError> {
        let v = value.into();
        if v.trim().is_empty() {
            return Err(ConfigError::EmptyModelPath);
        }
        Ok(Self(PathBuf::from(v)))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl Default for ModelPath {
    fn default() -> Self {
        Self(PathBuf::from(DEFAULT_MODEL_PATH))
    }
}

/// Parameters of the MFCC front-end. Frame and hop lengths are in seconds and
/// are turned into sample counts per clip.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExtractionParams {
    pub n_mfcc: usize,
    pub n_mels: usize,
    pub frame_length_s: f64,
    pub hop_length_s: f64,
    pub preemphasis: f32,
}

impl ExtractionParams {
    pub fn new(
        n_mfcc: usize,
        frame_length_s: f64,
        hop_length_s: f64,
        preemphasis: f32,
    ) -> Result<Self, ConfigError> {
        let params = Self {
            n_mfcc,
            frame_length_s,
            hop_length_s,
            preemphasis,
            ..Self::default()
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_mfcc == 0 {
            return Err(ConfigError::ZeroCoefficients);
        }
        if self.n_mfcc > self.n_mels {
            return Err(ConfigError::TooManyCoefficients {
                n_mfcc: self.n_mfcc,
                n_mels: self.n_mels,
            });
        }
        if !(self.frame_length_s > 0.0 && self.frame_length_s.is_finite()) {
            return Err(ConfigError::InvalidFrameLength(self.frame_length_s));
        }
        if !(self.hop_length_s > 0.0 && self.hop_length_s.is_finite()) {
            return Err(ConfigError::InvalidHopLength(self.hop_length_s));
        }
        if !self.preemphasis.is_finite() {
            return Err(ConfigError::InvalidPreemphasis(self.preemphasis));
        }
        Ok(())
    }

    /// Window and hop sizes in samples for a clip recorded at `sample_rate_hz`.
    /// Truncates toward zero; never returns less than one sample.
    pub fn frame_sizes(&self, sample_rate_hz: u32) -> (usize, usize) {
        let sr = f64::from(sample_rate_hz);
        let n_fft = (self.frame_length_s * sr) as usize;
        let hop = (self.hop_length_s * sr) as usize;
        (n_fft.max(1), hop.max(1))
    }
}

impl Default for ExtractionParams {
    fn default() -> Self {
        Self {
            n_mfcc: DEFAULT_N_MFCC,
            n_mels: DEFAULT_N_MELS,
            frame_length_s: DEFAULT_FRAME_LENGTH_S,
            hop_length_s: DEFAULT_HOP_LENGTH_S,
            preemphasis: DEFAULT_PREEMPHASIS,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct ClipPolicy {
    pub min_duration_s: f64,
    pub target_duration_s: u32,
}

impl ClipPolicy {
    pub fn new(min_duration_s: f64, target_duration_s: u32) -> Result<Self, ConfigError> {
        if target_duration_s == 0 {
            return Err(ConfigError::ZeroTargetDuration);
        }
        if !(min_duration_s >= 0.0 && min_duration_s.is_finite()) {
            return Err(ConfigError::InvalidMinDuration(min_duration_s));
        }
        Ok(Self {
            min_duration_s,
            target_duration_s,
        })
    }

    pub fn target_samples(&self, sample_rate_hz: u32) -> usize {
        let sr = sample_rate_hz as usize;
        sr.saturating_mul(self.target_duration_s as usize)
    }
}

impl Default for ClipPolicy {
    fn default() -> Self {
        Self {
            min_duration_s: DEFAULT_MIN_DURATION_S,
            target_duration_s: DEFAULT_TARGET_DURATION_S,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub input: InputSource,
    pub model_path: ModelPath,
    pub extraction: ExtractionParams,
    pub clip: ClipPolicy,
    pub output: OutputFormat,
    pub diagnostics_dir: Option<PathBuf>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("model path must not be empty")]
    EmptyModelPath,
    #[error("n_mfcc must be > 0")]
    ZeroCoefficients,
    #[error("n_mfcc ({n_mfcc}) must not exceed the number of mel bands ({n_mels})")]
    TooManyCoefficients { n_mfcc: usize, n_mels: usize },
    #[error("frame length must be a positive number of seconds, got {0}")]
    InvalidFrameLength(f64),
    #[error("hop length must be a positive number of seconds, got {0}")]
    InvalidHopLength(f64),
    #[error("pre-emphasis coefficient must be finite, got {0}")]
    InvalidPreemphasis(f32),
    #[error("target clip duration must be > 0 s")]
    ZeroTargetDuration,
    #[error("minimum clip duration must be >= 0 s, got {0}")]
    InvalidMinDuration(f64),
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn resolve_model_path(
    cli_value: Option<String>,
    env: &impl Env,
) -> Result<ModelPath, ConfigError> {
    ModelPath::new(resolve_string_with_default(
        cli_value,
        ENV_MODEL_PATH,
        env,
        DEFAULT_MODEL_PATH,
    ))
}

pub fn resolve_string_with_default(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
    default: &str,
) -> String {
    match cli_value {
        Some(v) => v,
        None => env.var(env_key).unwrap_or_else(|| default.to_owned()),
    }
}

pub fn resolve_optional_string(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Option<String> {
    match cli_value {
        Some(v) => Some(v),
        None => env.var(env_key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_path_cli_takes_precedence_over_env() {
        let env = MapEnv::default().with_var(ENV_MODEL_PATH, "env.json");
        let path = resolve_model_path(Some("cli.json".to_owned()), &env).expect("valid path");
        assert_eq!(path.as_path(), Path::new("cli.json"));
    }

    #[test]
    fn model_path_env_used_when_cli_missing() {
        let env = MapEnv::default().with_var(ENV_MODEL_PATH, "env.json");
        let path = resolve_model_path(None, &env).expect("valid path");
        assert_eq!(path.as_path(), Path::new("env.json"));
    }

    #[test]
    fn model_path_default_used_when_both_missing() {
        let path = resolve_model_path(None, &MapEnv::default()).expect("valid path");
        assert_eq!(path, ModelPath::default());
    }

    #[test]
    fn blank_model_path_rejected() {
        let err = resolve_model_path(Some("  ".to_owned()), &MapEnv::default()).unwrap_err();
        assert_eq!(err, ConfigError::EmptyModelPath);
    }

    #[test]
    fn optional_string_falls_back_to_env() {
        let env = MapEnv::default().with_var(ENV_DIAGNOSTICS_DIR, "plots");
        assert_eq!(
            resolve_optional_string(None, ENV_DIAGNOSTICS_DIR, &env),
            Some("plots".to_owned())
        );
        assert_eq!(
            resolve_optional_string(None, ENV_DIAGNOSTICS_DIR, &MapEnv::default()),
            None
        );
    }

    #[test]
    fn frame_sizes_follow_sample_rate() {
        let p = ExtractionParams::default();
        assert_eq!(p.frame_sizes(16_000), (400, 160));
        assert_eq!(p.frame_sizes(8_000), (200, 80));
        assert_eq!(p.frame_sizes(44_100), (1102, 441));
        assert_eq!(p.frame_sizes(22_050), (551, 220));
    }

    #[test]
    fn frame_sizes_never_zero() {
        let p = ExtractionParams::default();
        assert_eq!(p.frame_sizes(10), (1, 1));
    }

    #[test]
    fn extraction_params_reject_bad_values() {
        assert_eq!(
            ExtractionParams::new(0, 0.025, 0.01, 0.97).unwrap_err(),
            ConfigError::ZeroCoefficients
        );
        assert!(matches!(
            ExtractionParams::new(200, 0.025, 0.01, 0.97).unwrap_err(),
            ConfigError::TooManyCoefficients { n_mfcc: 200, .. }
        ));
        assert!(matches!(
            ExtractionParams::new(20, 0.0, 0.01, 0.97).unwrap_err(),
            ConfigError::InvalidFrameLength(_)
        ));
        assert!(matches!(
            ExtractionParams::new(20, 0.025, -1.0, 0.97).unwrap_err(),
            ConfigError::InvalidHopLength(_)
        ));
    }

    #[test]
    fn clip_policy_target_samples() {
        let policy = ClipPolicy::default();
        assert_eq!(policy.target_samples(8_000), 24_000);
        assert_eq!(policy.target_samples(44_100), 132_300);
        assert_eq!(
            ClipPolicy::new(2.0, 0).unwrap_err(),
            ConfigError::ZeroTargetDuration
        );
    }
}
