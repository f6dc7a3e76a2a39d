use crate::clip::NormalizedClip;
use crate::features::mel;
use serde::{Deserialize, Serialize};

pub const DISPLAY_N_FFT: usize = 2048;
pub const DISPLAY_HOP: usize = 512;
pub const DISPLAY_N_MELS: usize = 128;

/// Mel power in dB relative to the loudest bin, one row per mel band.
/// Only meant for plotting; the classifier never sees it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MelSpectrogram {
    pub sample_rate: u32,
    pub hop_length: usize,
    pub n_mels: usize,
    pub n_frames: usize,
    pub db: Vec<Vec<f32>>,
}

pub fn mel_spectrogram_db(clip: &NormalizedClip) -> MelSpectrogram {
    let power = mel::power_spectrogram(clip.samples(), DISPLAY_N_FFT, DISPLAY_HOP);
    let mel_power =
        mel::mel_filterbank(clip.sample_rate(), DISPLAY_N_FFT, DISPLAY_N_MELS).dot(&power);
    let peak = mel_power.iter().copied().fold(0.0f32, f32::max);
    let db = mel::power_to_db(&mel_power, peak, Some(mel::TOP_DB));

    MelSpectrogram {
        sample_rate: clip.sample_rate(),
        hop_length: DISPLAY_HOP,
        n_mels: DISPLAY_N_MELS,
        n_frames: db.ncols(),
        db: db.rows().into_iter().map(|row| row.to_vec()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::ClipNormalizer;
    use crate::decode::Waveform;

    #[test]
    fn spectrogram_is_relative_to_peak() {
        let sr = 16_000u32;
        let samples: Vec<f32> = (0..3 * sr as usize)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sr as f32).sin())
            .collect();
        let clip = ClipNormalizer::default()
            .normalize(&Waveform::new(samples, sr).unwrap())
            .unwrap();

        let spec = mel_spectrogram_db(&clip);
        assert_eq!(spec.n_mels, 128);
        assert_eq!(spec.db.len(), 128);
        assert_eq!(spec.n_frames, 1 + 48_000 / 512);
        let max = spec
            .db
            .iter()
            .flatten()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max);
        let min = spec.db.iter().flatten().copied().fold(f32::INFINITY, f32::min);
        assert!(max.abs() < 1e-3);
        assert!(min >= -80.0 - 1e-3);
    }
}
