pub mod mel;
pub mod spectrogram;

use crate::clip::NormalizedClip;
use crate::config::ExtractionParams;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

pub use spectrogram::{mel_spectrogram_db, MelSpectrogram};

const LOG_TARGET: &str = "features";

/// Time-averaged MFCCs of one clip; the only thing the classifier sees.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// First-order high-pass: `y[0] = x[0]`, `y[i] = x[i] - coef * x[i - 1]`.
pub fn preemphasis(samples: &[f32], coef: f32) -> Vec<f32> {
    let Some(&first) = samples.first() else {
        return Vec::new();
    };
    let mut out = Vec::with_capacity(samples.len());
    out.push(first);
    out.extend(samples.windows(2).map(|w| w[1] - coef * w[0]));
    out
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MfccExtractor {
    params: ExtractionParams,
}

impl MfccExtractor {
    pub fn new(params: ExtractionParams) -> Self {
        Self { params }
    }

    /// Per-frame MFCCs with shape `(n_mfcc, n_frames)` for an already
    /// pre-emphasized signal.
    pub fn mfcc_frames(&self, signal: &[f32], sample_rate: u32) -> Array2<f32> {
        let (n_fft, hop) = self.params.frame_sizes(sample_rate);
        let power = mel::power_spectrogram(signal, n_fft, hop);
        let filters = mel::mel_filterbank(sample_rate, n_fft, self.params.n_mels);
        let mel_power = filters.dot(&power);
        let log_mel = mel::power_to_db(&mel_power, 1.0, Some(mel::TOP_DB));
        mel::dct_matrix(self.params.n_mfcc, self.params.n_mels).dot(&log_mel)
    }

    pub fn extract(&self, clip: &NormalizedClip) -> FeatureVector {
        let emphasized = preemphasis(clip.samples(), self.params.preemphasis);
        let frames = self.mfcc_frames(&emphasized, clip.sample_rate());
        let n_frames = frames.ncols();

        let means = frames
            .rows()
            .into_iter()
            .map(|row| {
                if n_frames == 0 {
                    return 0.0;
                }
                let sum: f64 = row.iter().map(|&v| f64::from(v)).sum();
                (sum / n_frames as f64) as f32
            })
            .collect();

        tracing::debug!(
            target: LOG_TARGET,
            sample_rate = clip.sample_rate(),
            frames = n_frames,
            n_mfcc = self.params.n_mfcc,
            "extracted mfcc"
        );

        FeatureVector::new(means)
    }
}

/// Convenience wrapper around [`MfccExtractor::extract`].
pub fn extract_mfcc(clip: &NormalizedClip, params: &ExtractionParams) -> FeatureVector {
    MfccExtractor::new(*params).extract(clip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::ClipNormalizer;
    use crate::decode::Waveform;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn noise_clip(sample_rate: u32, seconds: f64, seed: u64) -> NormalizedClip {
        let mut rng = StdRng::seed_from_u64(seed);
        let len = (seconds * f64::from(sample_rate)) as usize;
        let samples = (0..len).map(|_| rng.random_range(-0.5f32..0.5)).collect();
        ClipNormalizer::default()
            .normalize(&Waveform::new(samples, sample_rate).unwrap())
            .unwrap()
    }

    #[test]
    fn preemphasis_keeps_first_sample() {
        assert_eq!(preemphasis(&[5.0], 0.97), vec![5.0]);
        assert!(preemphasis(&[], 0.97).is_empty());
    }

    #[test]
    fn preemphasis_filters_following_samples() {
        let out = preemphasis(&[1.0, 1.0, 0.0, 2.0], 0.5);
        assert_eq!(out, vec![1.0, 0.5, -0.5, 2.0]);
    }

    #[test]
    fn feature_vector_has_n_mfcc_entries() {
        let extractor = MfccExtractor::default();
        for &sr in &[8_000u32, 16_000, 22_050] {
            let features = extractor.extract(&noise_clip(sr, 2.5, 7));
            assert_eq!(features.len(), 20, "sr={sr}");
            assert!(features.as_slice().iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn custom_coefficient_count() {
        let params = ExtractionParams::new(13, 0.025, 0.01, 0.97).unwrap();
        let features = extract_mfcc(&noise_clip(8_000, 3.0, 1), &params);
        assert_eq!(features.len(), 13);
    }

    #[test]
    fn extraction_is_deterministic() {
        let clip = noise_clip(16_000, 3.4, 42);
        let extractor = MfccExtractor::default();
        let a = extractor.extract(&clip);
        let b = extractor.extract(&clip.clone());
        let a_bits: Vec<u32> = a.as_slice().iter().map(|v| v.to_bits()).collect();
        let b_bits: Vec<u32> = b.as_slice().iter().map(|v| v.to_bits()).collect();
        assert_eq!(a_bits, b_bits);
    }

    #[test]
    fn frame_layout_matches_clip_rate() {
        let extractor = MfccExtractor::default();
        let clip = noise_clip(8_000, 3.0, 3);
        let frames = extractor.mfcc_frames(clip.samples(), clip.sample_rate());
        assert_eq!(frames.dim(), (20, 301));
    }

    #[test]
    fn louder_signal_raises_first_coefficient() {
        let extractor = MfccExtractor::default();
        let quiet = noise_clip(8_000, 3.0, 9);
        let loud_samples: Vec<f32> = quiet.samples().iter().map(|s| s * 4.0).collect();
        let loud = ClipNormalizer::default()
            .normalize(&Waveform::new(loud_samples, 8_000).unwrap())
            .unwrap();
        let q = extractor.extract(&quiet);
        let l = extractor.extract(&loud);
        assert!(l.as_slice()[0] > q.as_slice()[0]);
    }
}
