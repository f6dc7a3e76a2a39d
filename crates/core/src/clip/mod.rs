use crate::config::ClipPolicy;
use crate::decode::Waveform;
use serde::{Deserialize, Serialize};

/// A waveform cut or zero-padded to exactly the analysis window. Only
/// [`ClipNormalizer::normalize`] builds one.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedClip {
    samples: Vec<f32>,
    sample_rate: u32,
    source_duration_s: f64,
}

impl NormalizedClip {
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration of the waveform before truncation or padding.
    pub fn source_duration_s(&self) -> f64 {
        self.source_duration_s
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Rejection {
    #[error("clip is {duration_s:.3} s long, at least {min_s} s required")]
    InsufficientDuration { duration_s: f64, min_s: f64 },
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ClipNormalizer {
    policy: ClipPolicy,
}

impl ClipNormalizer {
    pub fn new(policy: ClipPolicy) -> Self {
        Self { policy }
    }

    pub fn normalize(&self, waveform: &Waveform) -> Result<NormalizedClip, Rejection> {
        let duration_s = waveform.duration_secs();
        if duration_s < self.policy.min_duration_s {
            return Err(Rejection::InsufficientDuration {
                duration_s,
                min_s: self.policy.min_duration_s,
            });
        }

        let target = self.policy.target_samples(waveform.sample_rate());
        Ok(NormalizedClip {
            samples: fit_to_length(waveform.samples(), target),
            sample_rate: waveform.sample_rate(),
            source_duration_s: duration_s,
        })
    }
}

/// Keeps the first `target_len` samples, right-padding with zeros when short.
pub fn fit_to_length(samples: &[f32], target_len: usize) -> Vec<f32> {
    let keep = samples.len().min(target_len);
    let mut out = Vec::with_capacity(target_len);
    out.extend_from_slice(&samples[..keep]);
    out.resize(target_len, 0.0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waveform(len: usize, sample_rate: u32, value: f32) -> Waveform {
        Waveform::new(vec![value; len], sample_rate).unwrap()
    }

    #[test]
    fn longer_clip_is_truncated() {
        let clip = ClipNormalizer::default()
            .normalize(&waveform(5 * 8_000, 8_000, 0.5))
            .unwrap();
        assert_eq!(clip.len(), 24_000);
        assert_eq!(clip.sample_rate(), 8_000);
        assert!(clip.samples().iter().all(|&s| s == 0.5));
        assert!((clip.source_duration_s() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn short_clip_is_zero_padded() {
        let clip = ClipNormalizer::default()
            .normalize(&waveform(20_000, 8_000, 1.0))
            .unwrap();
        assert_eq!(clip.len(), 24_000);
        assert!(clip.samples()[..20_000].iter().all(|&s| s == 1.0));
        assert!(clip.samples()[20_000..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn length_invariant_across_rates() {
        let normalizer = ClipNormalizer::default();
        for &sr in &[8_000u32, 16_000, 22_050, 44_100, 48_000] {
            for &secs in &[2.0f64, 2.5, 3.0, 4.2] {
                let len = (secs * f64::from(sr)).ceil() as usize;
                let clip = normalizer.normalize(&waveform(len, sr, 0.1)).unwrap();
                assert_eq!(clip.len(), 3 * sr as usize, "sr={sr} secs={secs}");
            }
        }
    }

    #[test]
    fn rejection_boundary_is_strict() {
        let normalizer = ClipNormalizer::default();
        let err = normalizer.normalize(&waveform(1_999, 1_000, 0.1)).unwrap_err();
        assert!(matches!(
            err,
            Rejection::InsufficientDuration { min_s, .. } if min_s == 2.0
        ));
        assert!(normalizer.normalize(&waveform(2_000, 1_000, 0.1)).is_ok());
    }

    #[test]
    fn empty_waveform_is_rejected() {
        let err = ClipNormalizer::default()
            .normalize(&waveform(0, 16_000, 0.0))
            .unwrap_err();
        assert_eq!(
            err,
            Rejection::InsufficientDuration {
                duration_s: 0.0,
                min_s: 2.0
            }
        );
    }

    #[test]
    fn one_second_of_ones_padded_to_three() {
        let clip = fit_to_length(&[1.0; 8_000], 24_000);
        assert_eq!(clip.len(), 24_000);
        assert!(clip[..8_000].iter().all(|&s| s == 1.0));
        assert!(clip[8_000..].iter().all(|&s| s == 0.0));

        let ungated = ClipNormalizer::new(ClipPolicy::new(0.0, 3).unwrap());
        let clip = ungated.normalize(&waveform(8_000, 8_000, 1.0)).unwrap();
        assert_eq!(clip.len(), 24_000);
        assert!(clip.samples()[8_000..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn custom_policy() {
        let normalizer = ClipNormalizer::new(ClipPolicy::new(0.5, 1).unwrap());
        let clip = normalizer.normalize(&waveform(600, 1_000, 0.2)).unwrap();
        assert_eq!(clip.len(), 1_000);
    }
}
